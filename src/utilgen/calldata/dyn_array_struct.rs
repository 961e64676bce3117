// SPDX-License-Identifier: Apache-2.0

use crate::cairo::imports::UINT256;
use crate::cairo::struct_def;
use crate::cairo::types::{CairoType, TypeConversionContext};
use crate::sema::ast::{Namespace, Type};
use crate::utilgen::base::{
    unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult, Synthesized,
};
use crate::utilgen::storage::code_uses_uint256;
use solang_parser::pt;

/// Definitions of the `cd_dynarray_<elem>` structs through which dynamic arrays are passed
/// by value: `struct cd_dynarray_felt { len: felt, ptr: felt*, }`. Resolving returns the
/// struct name; structs of nested dynamic arrays are defined too.
pub struct DynArrayStructGen {
    cache: FunctionCache,
}

util_gen!(DynArrayStructGen, "calldata.dyn_array_struct_constructor");

impl DynArrayStructGen {
    pub fn new() -> Self {
        DynArrayStructGen {
            cache: FunctionCache::new("cd_dynarray", FragmentKind::TypeDefinition),
        }
    }

    /// Define the structs of any dynamic arrays nested in `ty`
    fn nested(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult<()> {
        match ty {
            _ if ty.is_dynamic_array() => {
                self.resolve(ty, loc, ns)?;
            }
            Type::Array(elem, _) => self.nested(elem, loc, ns)?,
            Type::Struct(n) => {
                for field in &ns.structs[*n].fields {
                    self.nested(&field.ty, loc, ns)?;
                }
            }
            _ => (),
        }

        Ok(())
    }
}

impl Resolve for DynArrayStructGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        if !ty.is_dynamic_array() {
            return Err(unsupported(loc, ty, ns, "not a dynamic array"));
        }

        let cairo_ty = CairoType::from_sol(ty, ns, TypeConversionContext::CallDataRef)
            .map_err(|e| unsupported(loc, ty, ns, &e))?;

        let CairoType::DynArray { elem } = &cairo_ty else {
            unreachable!("dynamic arrays are passed as cd_dynarray structs");
        };

        let name = cairo_ty.to_string();

        self.cache.get_or_create_named(&cairo_ty.mangled(), &name, |name| {
            self.nested(&ty.array_elem(), loc, ns)?;

            let code = struct_def(
                name,
                &[
                    ("len".to_string(), "felt".to_string()),
                    ("ptr".to_string(), format!("{elem}*")),
                ],
            );

            let synthesized = Synthesized::new(code);

            Ok(if code_uses_uint256(elem) {
                synthesized.import(UINT256)
            } else {
                synthesized
            })
        })
    }
}
