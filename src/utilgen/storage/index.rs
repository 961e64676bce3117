// SPDX-License-Identifier: Apache-2.0

use super::dyn_array::{allocate_on_first_use, DynArrayGen};
use crate::cairo::imports::{HASH2, STRING_HASH, UINT256, UINT256_LT, WARP_USED_STORAGE};
use crate::cairo::types::{CairoType, TypeConversionContext};
use crate::cairo::{function, storage_var, Implicits};
use crate::layout::{storage_key, storage_member_offset, storage_width, ArrayLayout};
use crate::sema::ast::{Namespace, Type};
use crate::utilgen::base::{
    uint256_literal, unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult,
    Synthesized,
};
use solang_parser::pt;
use std::rc::Rc;

const OUT_OF_BOUNDS: &str = "Index out of bounds";

/// Bounds check of a `Uint256` index against an expression of type `Uint256`
fn bounds_check(length: &str) -> Vec<String> {
    vec![
        format!("let (in_range) = uint256_lt(index, {length});"),
        format!("with_attr error_message(\"{OUT_OF_BOUNDS}\") {{"),
        "    assert in_range = 1;".to_string(),
        "}".to_string(),
    ]
}

/// Location of a struct member: `(loc: felt) -> (res: felt)`
pub struct StorageMemberAccessGen {
    cache: FunctionCache,
}

util_gen!(StorageMemberAccessGen, "storage.member_access");

impl StorageMemberAccessGen {
    pub fn new() -> Self {
        StorageMemberAccessGen {
            cache: FunctionCache::new("WSM", FragmentKind::FunctionDefinition),
        }
    }
}

impl Resolve for StorageMemberAccessGen {
    /// Struct number and field number
    type Shape = (usize, usize);

    fn resolve(
        &self,
        &(struct_no, field): &(usize, usize),
        _loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult {
        let decl = &ns.structs[struct_no];
        let key = format!(
            "{}_{}",
            Type::Struct(struct_no).mangled(ns),
            decl.fields[field].name
        );
        let offset = storage_member_offset(struct_no, field, ns);

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

/// Element location in a storage static array: `(loc: felt, index: Uint256) -> (res: felt)`
pub struct StorageStaticArrayIndexAccessGen {
    cache: FunctionCache,
    bounds_checks: bool,
}

util_gen!(StorageStaticArrayIndexAccessGen, "storage.static_array_index_access");

impl StorageStaticArrayIndexAccessGen {
    pub fn new(bounds_checks: bool) -> Self {
        StorageStaticArrayIndexAccessGen {
            cache: FunctionCache::new("WS_INDEX", FragmentKind::FunctionDefinition),
            bounds_checks,
        }
    }
}

impl Resolve for StorageStaticArrayIndexAccessGen {
    type Shape = Type;

    fn resolve(&self, array: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let Some(len) = array.array_length() else {
            return Err(unsupported(loc, array, ns, "not a static array"));
        };

        let width = storage_width(&array.array_elem(), ns);

        self.cache
            .get_or_create(&storage_key(array, ns), &width.to_string(), |name| {
                let mut body = Vec::new();

                if self.bounds_checks {
                    body.extend(bounds_check(&uint256_literal(len)));
                }

                body.push(format!(
                    "return (loc + (index.low + index.high * 2 ** 128) * {width},);"
                ));

                let synthesized = Synthesized::new(function(
                    name,
                    Implicits::RangeCheck,
                    "loc: felt, index: Uint256",
                    "res: felt",
                    &body,
                ))
                .import(UINT256);

                Ok(if self.bounds_checks {
                    synthesized.import(UINT256_LT)
                } else {
                    synthesized
                })
            })
    }
}

/// Element location in a storage dynamic array: `(loc: felt, index: Uint256) -> (res: felt)`
pub struct StorageDynArrayIndexAccessGen {
    cache: FunctionCache,
    dyn_array: Rc<DynArrayGen>,
    bounds_checks: bool,
}

util_gen!(StorageDynArrayIndexAccessGen, "storage.dyn_array_index_access", [dyn_array]);

impl StorageDynArrayIndexAccessGen {
    pub fn new(dyn_array: Rc<DynArrayGen>, bounds_checks: bool) -> Self {
        StorageDynArrayIndexAccessGen {
            cache: FunctionCache::new("WS_DYN_INDEX", FragmentKind::FunctionDefinition),
            dyn_array,
            bounds_checks,
        }
    }
}

impl Resolve for StorageDynArrayIndexAccessGen {
    type Shape = Type;

    fn resolve(&self, array: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let fns = self.dyn_array.layout_of(array, loc, ns)?;

        if !self.bounds_checks {
            return Ok(self.cache.delegate(fns.elem_loc));
        }

        self.cache
            .get_or_create(&storage_key(array, ns), &fns.elem_loc, |name| {
                let mut body = vec![format!("let (length) = {}(loc);", fns.length)];
                body.extend(bounds_check("length"));
                body.push(format!("return {}(loc, index);", fns.elem_loc));

                Ok(Synthesized::new(function(
                    name,
                    Implicits::Storage,
                    "loc: felt, index: Uint256",
                    "res: felt",
                    &body,
                ))
                .implicits(Implicits::Storage)
                .imports(&[UINT256, UINT256_LT]))
            })
    }
}

/// Location of the value stored under a key: `(loc: felt, key: K) -> (res: felt)`.
///
/// String and bytes keys are memory pointers and are hashed first.
pub struct MappingIndexAccessGen {
    cache: FunctionCache,
}

util_gen!(MappingIndexAccessGen, "storage.mapping_index_access");

impl MappingIndexAccessGen {
    pub fn new() -> Self {
        MappingIndexAccessGen {
            cache: FunctionCache::new("WS_MAP", FragmentKind::FunctionDefinition),
        }
    }
}

impl Resolve for MappingIndexAccessGen {
    type Shape = Type;

    fn resolve(&self, mapping: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let Type::Mapping(key_ty, value_ty) = mapping else {
            return Err(unsupported(loc, mapping, ns, "not a mapping"));
        };

        let hashed_key = matches!(**key_ty, Type::String | Type::DynamicBytes);

        if !hashed_key && !key_ty.is_value_type() {
            return Err(unsupported(
                loc,
                mapping,
                ns,
                "mapping keys must be value types, strings or bytes",
            ));
        }

        let key_cairo = CairoType::from_sol(key_ty, ns, TypeConversionContext::Ref)
            .map_err(|e| unsupported(loc, mapping, ns, &e))?;
        let layout = ns.target.array_layout();
        let width = storage_width(value_ty, ns);

        self.cache.get_or_create(
            &storage_key(mapping, ns),
            &format!("{layout}/{width}"),
            |name| {
                let mut body = Vec::new();
                let mut implicits = Implicits::Storage;
                let mut synthesized = Synthesized::default();

                let key = if hashed_key {
                    implicits = Implicits::StorageMemory;
                    synthesized = synthesized.import(STRING_HASH);
                    body.push("let (key_hash) = string_hash(key);".to_string());
                    "key_hash"
                } else {
                    "key"
                };

                let tables = match layout {
                    ArrayLayout::Strided => {
                        synthesized = synthesized.import(HASH2);

                        if key_cairo.is_uint256() {
                            body.push(format!(
                                "let (low) = hash2{{hash_ptr=pedersen_ptr}}(loc, {key}.low);"
                            ));
                            body.push(format!(
                                "let (res) = hash2{{hash_ptr=pedersen_ptr}}(low, {key}.high);"
                            ));
                        } else {
                            body.push(format!(
                                "let (res) = hash2{{hash_ptr=pedersen_ptr}}(loc, {key});"
                            ));
                        }
                        body.push("return (res,);".to_string());

                        None
                    }
                    ArrayLayout::Indexed => {
                        synthesized = synthesized.import(WARP_USED_STORAGE);

                        let table = format!("{name}_TABLE");
                        body.extend(allocate_on_first_use(
                            &table,
                            &format!("loc, {key}"),
                            &width,
                        ));

                        Some(storage_var(
                            &table,
                            &format!("loc: felt, key: {key_cairo}"),
                            "res_loc: felt",
                        ))
                    }
                };

                let func = function(
                    name,
                    implicits,
                    &format!("loc: felt, key: {key_cairo}"),
                    "res: felt",
                    &body,
                );

                let code = match tables {
                    Some(table) => format!("{table}\n\n{func}"),
                    None => func,
                };

                let synthesized = Synthesized {
                    code,
                    imports: synthesized.imports,
                }
                .implicits(implicits);

                Ok(if key_cairo.is_uint256() {
                    synthesized.import(UINT256)
                } else {
                    synthesized
                })
            },
        )
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
    fn member_offsets() {
        let mut ns = Namespace::new(Target::Starknet);
        let s = ns.add_struct(
            "Pair",
            pt::Loc::Builtin,
            vec![("a", Type::Uint(256)), ("b", Type::Bool)],
        );

        let gen = StorageMemberAccessGen::new();
        let name = gen.resolve(&(s, 1), &pt::Loc::Builtin, &ns).unwrap();

        assert_eq!(name, "WSM0_S4Pair_b");
        assert!(gen.generated_code()[0].code.contains("return (loc + 2,);"));
    }

    #[test]
    fn static_index_checks_can_be_disabled() {
        let ns = Namespace::new(Target::Starknet);
        let array = Type::Array(Box::new(Type::Uint(256)), ArrayLength::Fixed(4.into()));

        let checked = StorageStaticArrayIndexAccessGen::new(true);
        checked.resolve(&array, &pt::Loc::Builtin, &ns).unwrap();
        let code = &checked.generated_code()[0].code;
        assert!(code.contains("let (in_range) = uint256_lt(index, Uint256(4, 0));"));
        assert!(code.contains("* 2,);"));

        let unchecked = StorageStaticArrayIndexAccessGen::new(false);
        unchecked.resolve(&array, &pt::Loc::Builtin, &ns).unwrap();
        assert!(!unchecked.generated_code()[0].code.contains("uint256_lt"));
    }

    #[test]
    fn unchecked_dynamic_index_is_the_layout() {
        let ns = Namespace::new(Target::Starknet);
        let dyn_array = Rc::new(DynArrayGen::new());
        let gen = StorageDynArrayIndexAccessGen::new(dyn_array, false);

        let array = Type::Array(Box::new(Type::Address), ArrayLength::Dynamic);
        let name = gen.resolve(&array, &pt::Loc::Builtin, &ns).unwrap();

        assert_eq!(name, "WARP_DARRAY0_felt_IDX");
        assert!(gen.is_used());
        assert!(gen.generated_code().is_empty());
    }

    #[test]
    fn wide_keys_hash_twice() {
        let ns = Namespace::new(Target::Starknet);
        let gen = MappingIndexAccessGen::new();

        let mapping = Type::Mapping(Box::new(Type::Uint(256)), Box::new(Type::Bool));
        gen.resolve(&mapping, &pt::Loc::Builtin, &ns).unwrap();

        let code = &gen.generated_code()[0].code;
        assert!(code.contains("let (low) = hash2{hash_ptr=pedersen_ptr}(loc, key.low);"));
        assert!(code.contains("let (res) = hash2{hash_ptr=pedersen_ptr}(low, key.high);"));
    }

    #[test]
    fn string_keys_are_hashed_in_indexed_tables() {
        let ns = Namespace::new(Target::StarknetIndexed);
        let gen = MappingIndexAccessGen::new();

        let mapping = Type::Mapping(Box::new(Type::String), Box::new(Type::Uint(256)));
        let name = gen.resolve(&mapping, &pt::Loc::Builtin, &ns).unwrap();

        let code = &gen.generated_code()[0].code;
        assert!(code.starts_with(&format!(
            "@storage_var\nfunc {name}_TABLE(loc: felt, key: felt)"
        )));
        assert!(code.contains("let (key_hash) = string_hash(key);"));
        assert!(code.contains("let res_loc = used + 1;"));
        assert!(code.contains("WARP_USED_STORAGE.write(used + 2);"));
        assert!(code.contains(&format!("{name}_TABLE.write(loc, key_hash, res_loc);")));
    }
}
