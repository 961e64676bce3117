// SPDX-License-Identifier: Apache-2.0

//! Validation of the arguments of external functions. Felts arriving from outside may hold
//! any field element, so every value is checked against the range of its Solidity type.

use crate::cairo::imports::{IS_LE_FELT, LIB_INPUT_CHECKS, UINT256};
use crate::cairo::types::{CairoType, TypeConversionContext};
use crate::cairo::{function, Implicits};
use crate::sema::ast::{ArrayLength, Namespace, Type};
use crate::utilgen::base::{
    unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult, Synthesized,
};
use crate::utilgen::calldata::DynArrayStructGen;
use crate::utilgen::storage::code_uses_uint256;
use num_traits::ToPrimitive;
use solang_parser::pt;
use std::rc::Rc;

/// Check that a felt is a valid value of an enum: `(arg: felt)`
pub struct EnumInputCheckGen {
    cache: FunctionCache,
}

util_gen!(EnumInputCheckGen, "bound_checks.enums");

impl EnumInputCheckGen {
    pub fn new() -> Self {
        EnumInputCheckGen {
            cache: FunctionCache::new("enum_bound_check", FragmentKind::FunctionDefinition),
        }
    }
}

impl Resolve for EnumInputCheckGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let Type::Enum(n) = ty else {
            return Err(unsupported(loc, ty, ns, "not an enum"));
        };

        self.cache.get_or_create(&ty.mangled(ns), "felt", |name| {
            let max = ns.enums[*n].values.len().saturating_sub(1);

            let body = vec![
                format!("let in_range = is_le_felt(arg, {max});"),
                format!(
                    "with_attr error_message(\"Error: value out-of-bounds. Values passed to must be in enum range (0, {max}]\") {{"
                ),
                "    assert 1 = in_range;".to_string(),
                "}".to_string(),
                "return ();".to_string(),
            ];

            Ok(
                Synthesized::new(function(name, Implicits::RangeCheck, "arg: felt", "", &body))
                    .import(IS_LE_FELT),
            )
        })
    }
}

/// Range check for an argument of an external function: `(arg: T)`. Value types are checked
/// by the runtime library; aggregates get a routine checking each member.
pub struct InputCheckGen {
    cache: FunctionCache,
    enums: Rc<EnumInputCheckGen>,
    dyn_array_struct: Rc<DynArrayStructGen>,
}

util_gen!(InputCheckGen, "bound_checks.input_check", [enums, dyn_array_struct]);

impl InputCheckGen {
    pub fn new(enums: Rc<EnumInputCheckGen>, dyn_array_struct: Rc<DynArrayStructGen>) -> Self {
        InputCheckGen {
            cache: FunctionCache::new("external_input_check", FragmentKind::FunctionDefinition),
            enums,
            dyn_array_struct,
        }
    }
}

impl Resolve for InputCheckGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        match ty {
            Type::Enum(_) => {
                let check = self.enums.resolve(ty, loc, ns)?;
                return Ok(self.cache.delegate(check));
            }
            Type::Bool => {
                return Ok(self
                    .cache
                    .use_library_symbol(LIB_INPUT_CHECKS, "warp_external_input_check_bool"))
            }
            Type::Address => {
                return Ok(self
                    .cache
                    .use_library_symbol(LIB_INPUT_CHECKS, "warp_external_input_check_address"))
            }
            Type::Int(_) | Type::Uint(_) | Type::Bytes(_) => {
                let symbol = format!("warp_external_input_check_int{}", ty.bits(ns));

                return Ok(self.cache.use_library_symbol(LIB_INPUT_CHECKS, &symbol));
            }
            Type::Mapping(..) => {
                return Err(unsupported(
                    loc,
                    ty,
                    ns,
                    "mappings cannot be passed to external functions",
                ))
            }
            _ => (),
        }

        let cairo_ty = CairoType::from_sol(ty, ns, TypeConversionContext::CallDataRef)
            .map_err(|e| unsupported(loc, ty, ns, &e))?;

        self.cache
            .get_or_create(&ty.mangled(ns), &cairo_ty.to_string(), |name| {
                let params = format!("arg: {cairo_ty}");

                let code = match ty {
                    Type::Struct(n) => {
                        let mut body = Vec::new();

                        for field in &ns.structs[*n].fields {
                            let check = self.resolve(&field.ty, loc, ns)?;
                            body.push(format!("{check}(arg.{});", field.name));
                        }

                        body.push("return ();".to_string());

                        function(name, Implicits::RangeCheck, &params, "", &body)
                    }
                    Type::Array(elem, ArrayLength::Fixed(len)) => {
                        let check = self.resolve(elem, loc, ns)?;
                        let len = len
                            .to_usize()
                            .ok_or_else(|| unsupported(loc, ty, ns, "array too large"))?;

                        let mut body: Vec<String> =
                            (0..len).map(|i| format!("{check}(arg[{i}]);")).collect();
                        body.push("return ();".to_string());

                        function(name, Implicits::RangeCheck, &params, "", &body)
                    }
                    _ => {
                        self.dyn_array_struct.resolve(ty, loc, ns)?;

                        let elem = ty.array_elem();
                        let check = self.resolve(&elem, loc, ns)?;
                        let CairoType::DynArray { elem: elem_cairo } = &cairo_ty else {
                            unreachable!();
                        };
                        let elem_name = format!("{name}_elem");

                        [
                            function(
                                &elem_name,
                                Implicits::RangeCheck,
                                &format!("length: felt, ptr: {elem_cairo}*, index: felt"),
                                "",
                                &[
                                    "if (index == length) {".to_string(),
                                    "    return ();".to_string(),
                                    "}".to_string(),
                                    format!("{check}(ptr[index]);"),
                                    format!("return {elem_name}(length, ptr, index + 1);"),
                                ],
                            ),
                            function(
                                name,
                                Implicits::RangeCheck,
                                &params,
                                "",
                                &[
                                    format!("{elem_name}(arg.len, arg.ptr, 0);"),
                                    "return ();".to_string(),
                                ],
                            ),
                        ]
                        .join("\n\n")
                    }
                };

                let synthesized = Synthesized::new(code);

                Ok(if code_uses_uint256(&cairo_ty) {
                    synthesized.import(UINT256)
                } else {
                    synthesized
                })
            })
    }
}
