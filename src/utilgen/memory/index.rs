// SPDX-License-Identifier: Apache-2.0

use crate::cairo::imports::{UINT256, WM_DYN_ARRAY_LENGTH, WM_INDEX_STATIC};
use crate::cairo::{function, Implicits};
use crate::layout::{memory_key, memory_member_offset, memory_slot_width};
use crate::sema::ast::{Namespace, Type};
use crate::utilgen::base::{
    uint256_literal, unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult,
    Synthesized,
};
use solang_parser::pt;

/// Location of a struct member in memory: `(loc: felt) -> (res: felt)`
pub struct MemoryMemberAccessGen {
    cache: FunctionCache,
}

util_gen!(MemoryMemberAccessGen, "memory.member_access");

impl MemoryMemberAccessGen {
    pub fn new() -> Self {
        MemoryMemberAccessGen {
            cache: FunctionCache::new("WM_MEMBER", FragmentKind::FunctionDefinition),
        }
    }
}

impl Resolve for MemoryMemberAccessGen {
    /// Struct number and field number
    type Shape = (usize, usize);

    fn resolve(
        &self,
        &(struct_no, field): &(usize, usize),
        _loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult {
        let key = format!(
            "{}_{}",
            Type::Struct(struct_no).mangled(ns),
            ns.structs[struct_no].fields[field].name
        );
        let offset = memory_member_offset(struct_no, field, ns);

        self.cache.get_or_create(&key, &offset.to_string(), |name| {
            Ok(Synthesized::new(function(
                name,
                Implicits::None,
                "loc: felt",
                "res: felt",
                &[format!("return (loc + {offset},);")],
            )))
        })
    }
}

/// Slot of an element of a memory static array: `(loc: felt, index: Uint256) -> (res: felt)`
pub struct MemoryStaticArrayIndexAccessGen {
    cache: FunctionCache,
    bounds_checks: bool,
}

util_gen!(MemoryStaticArrayIndexAccessGen, "memory.static_array_index_access");

impl MemoryStaticArrayIndexAccessGen {
    pub fn new(bounds_checks: bool) -> Self {
        MemoryStaticArrayIndexAccessGen {
            cache: FunctionCache::new("WM_INDEX", FragmentKind::FunctionDefinition),
            bounds_checks,
        }
    }
}

impl Resolve for MemoryStaticArrayIndexAccessGen {
    type Shape = Type;

    fn resolve(&self, array: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let Some(len) = array.array_length() else {
            return Err(unsupported(loc, array, ns, "not a static array"));
        };

        let width = memory_slot_width(&array.array_elem());

        self.cache
            .get_or_create(&memory_key(array, ns), &width.to_string(), |name| {
                let (body, synthesized) = if self.bounds_checks {
                    (
                        format!(
                            "return wm_index_static(loc, index, {}, {});",
                            uint256_literal(&width),
                            uint256_literal(len)
                        ),
                        Synthesized::default().import(WM_INDEX_STATIC),
                    )
                } else {
                    (
                        format!("return (loc + (index.low + index.high * 2 ** 128) * {width},);"),
                        Synthesized::default(),
                    )
                };

                let code = function(
                    name,
                    Implicits::RangeCheck,
                    "loc: felt, index: Uint256",
                    "res: felt",
                    &[body],
                );

                Ok(Synthesized {
                    code,
                    imports: synthesized.imports,
                }
                .import(UINT256))
            })
    }
}

/// `.length` of a memory dynamic array; read from its header by the runtime library
pub struct MemoryDynArrayLengthGen {
    cache: FunctionCache,
}

util_gen!(MemoryDynArrayLengthGen, "memory.dyn_array_length");

impl MemoryDynArrayLengthGen {
    pub fn new() -> Self {
        MemoryDynArrayLengthGen {
            cache: FunctionCache::new("WM_LENGTH", FragmentKind::FunctionDefinition),
        }
    }
}

impl Resolve for MemoryDynArrayLengthGen {
    type Shape = Type;

    fn resolve(&self, array: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        if !array.is_dynamic_array() {
            return Err(unsupported(loc, array, ns, "not a dynamic array"));
        }

        Ok(self.cache.use_library(WM_DYN_ARRAY_LENGTH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sema::ast::ArrayLength;
    use crate::utilgen::base::UtilGen;
    use crate::Target;
    use pretty_assertions::assert_eq;

    #[test]
    fn member_offsets_count_pointers() {
        let mut ns = Namespace::new(Target::Starknet);
        let s = ns.add_struct(
            "Order",
            pt::Loc::Builtin,
            vec![
                ("items", Type::Array(Box::new(Type::Uint(256)), ArrayLength::Dynamic)),
                ("price", Type::Uint(256)),
                ("paid", Type::Bool),
            ],
        );

        let gen = MemoryMemberAccessGen::new();
        gen.resolve(&(s, 2), &pt::Loc::Builtin, &ns).unwrap();

        assert!(gen.generated_code()[0].code.contains("return (loc + 3,);"));
    }

    #[test]
    fn checked_static_index_uses_the_library() {
        let ns = Namespace::new(Target::Starknet);
        let gen = MemoryStaticArrayIndexAccessGen::new(true);

        let array = Type::Array(Box::new(Type::Int(256)), ArrayLength::Fixed(3.into()));
        gen.resolve(&array, &pt::Loc::Builtin, &ns).unwrap();

        assert_eq!(
            gen.generated_code()[0].code.lines().nth(2).unwrap().trim(),
            "return wm_index_static(loc, index, Uint256(2, 0), Uint256(3, 0));"
        );
    }

    #[test]
    fn length_of_static_array_is_rejected() {
        let ns = Namespace::new(Target::Starknet);
        let gen = MemoryDynArrayLengthGen::new();

        let array = Type::Array(Box::new(Type::Bool), ArrayLength::Fixed(3.into()));
        assert!(gen.resolve(&array, &pt::Loc::Builtin, &ns).is_err());
        assert_eq!(
            gen.resolve(&Type::DynamicBytes, &pt::Loc::Builtin, &ns).unwrap(),
            "wm_dyn_array_length"
        );
    }
}
