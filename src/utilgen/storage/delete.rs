// SPDX-License-Identifier: Apache-2.0

use super::access::StorageWriteGen;
use super::dyn_array::DynArrayGen;
use crate::cairo::imports::{UINT256, UINT256_ADD, UINT256_LE};
use crate::cairo::{function, Implicits};
use crate::layout::{storage_key, storage_member_offset, storage_width};
use crate::sema::ast::{ArrayLength, Namespace, Type};
use crate::utilgen::base::{
    unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult, Synthesized,
};
use num_traits::Zero;
use solang_parser::pt;
use std::rc::Rc;

/// `delete x` on storage: `(loc: felt)`. Every cell is zeroed; dynamic arrays have their
/// elements deleted and their length reset. Mappings are skipped.
pub struct StorageDeleteGen {
    cache: FunctionCache,
    dyn_array: Rc<DynArrayGen>,
    storage_write: Rc<StorageWriteGen>,
}

util_gen!(StorageDeleteGen, "storage.delete", [dyn_array, storage_write]);

impl StorageDeleteGen {
    pub fn new(dyn_array: Rc<DynArrayGen>, storage_write: Rc<StorageWriteGen>) -> Self {
        StorageDeleteGen {
            cache: FunctionCache::new("WS_DELETE", FragmentKind::FunctionDefinition),
            dyn_array,
            storage_write,
        }
    }

    /// The routine deleting the elements `[from, to)` of a storage dynamic array:
    /// `(loc: felt, from: Uint256, to: Uint256)`
    pub fn resolve_elements(&self, array: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        if !array.is_dynamic_array() {
            return Err(unsupported(loc, array, ns, "not a dynamic array"));
        }

        let name = self.resolve(array, loc, ns)?;

        Ok(format!("{name}_elem"))
    }

    /// Statements deleting the value of type `ty` at `at`
    fn delete_at(&self, ty: &Type, at: &str, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        match ty {
            Type::Mapping(..) => Ok(String::new()),
            _ if ty.is_value_type() => self.storage_write.zero(ty, at, loc, ns),
            _ => {
                let delete = self.resolve(ty, loc, ns)?;
                Ok(format!("{delete}({at});"))
            }
        }
    }

    fn delete_struct(
        &self,
        name: &str,
        struct_no: usize,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<Synthesized> {
        let mut body = Vec::new();

        for (field_no, field) in ns.structs[struct_no].fields.iter().enumerate() {
            let offset = storage_member_offset(struct_no, field_no, ns);
            let at = if offset.is_zero() {
                "loc".to_string()
            } else {
                format!("loc + {offset}")
            };

            let stmt = self.delete_at(&field.ty, &at, loc, ns)?;
            if !stmt.is_empty() {
                body.push(stmt);
            }
        }

        body.push("return ();".to_string());

        Ok(Synthesized::new(function(name, Implicits::Storage, "loc: felt", "", &body))
            .implicits(Implicits::Storage))
    }

    fn delete_static_array(
        &self,
        name: &str,
        elem: &Type,
        len: &num_bigint::BigInt,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<Synthesized> {
        let width = storage_width(elem, ns);
        let elem_name = format!("{name}_elem");
        let delete = self.delete_at(elem, "elem_loc", loc, ns)?;

        let code = [
            function(
                &elem_name,
                Implicits::Storage,
                "loc: felt, index: felt",
                "",
                &[
                    format!("if (index == {len}) {{"),
                    "    return ();".to_string(),
                    "}".to_string(),
                    format!("let elem_loc = loc + index * {width};"),
                    delete,
                    format!("return {elem_name}(loc, index + 1);"),
                ],
            ),
            function(
                name,
                Implicits::Storage,
                "loc: felt",
                "",
                &[format!("return {elem_name}(loc, 0);")],
            ),
        ]
        .join("\n\n");

        Ok(Synthesized::new(code).implicits(Implicits::Storage))
    }

    fn delete_dyn_array(
        &self,
        name: &str,
        array: &Type,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<Synthesized> {
        let elem = array.array_elem();
        let fns = self.dyn_array.layout(&elem, loc, ns)?;
        let elem_name = format!("{name}_elem");
        let delete = self.delete_at(&elem, "elem_loc", loc, ns)?;

        let code = [
            function(
                &elem_name,
                Implicits::Storage,
                "loc: felt, index: Uint256, length: Uint256",
                "",
                &[
                    "let (done) = uint256_le(length, index);".to_string(),
                    "if (done == 1) {".to_string(),
                    "    return ();".to_string(),
                    "}".to_string(),
                    format!("let (elem_loc) = {}(loc, index);", fns.elem_loc),
                    delete,
                    "let (next, _) = uint256_add(index, Uint256(1, 0));".to_string(),
                    format!("return {elem_name}(loc, next, length);"),
                ],
            ),
            function(
                name,
                Implicits::Storage,
                "loc: felt",
                "",
                &[
                    format!("let (length) = {}(loc);", fns.length),
                    format!("{}(loc, Uint256(0, 0));", fns.set_length),
                    format!("return {elem_name}(loc, Uint256(0, 0), length);"),
                ],
            ),
        ]
        .join("\n\n");

        Ok(Synthesized::new(code)
            .implicits(Implicits::Storage)
            .imports(&[UINT256, UINT256_ADD, UINT256_LE]))
    }
}

impl Resolve for StorageDeleteGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        self.cache
            .get_or_create(&storage_key(ty, ns), "loc", |name| match ty {
                Type::Struct(n) => self.delete_struct(name, *n, loc, ns),
                Type::Array(elem, ArrayLength::Fixed(len)) => {
                    self.delete_static_array(name, elem, len, loc, ns)
                }
                Type::Array(_, ArrayLength::Dynamic) | Type::DynamicBytes | Type::String => {
                    self.delete_dyn_array(name, ty, loc, ns)
                }
                Type::Mapping(..) => Ok(Synthesized::new(function(
                    name,
                    Implicits::None,
                    "loc: felt",
                    "",
                    &["return ();".to_string()],
                ))),
                _ => {
                    let zero = self.storage_write.zero(ty, "loc", loc, ns)?;

                    Ok(Synthesized::new(function(
                        name,
                        Implicits::Storage,
                        "loc: felt",
                        "",
                        &[zero, "return ();".to_string()],
                    ))
                    .implicits(Implicits::Storage))
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilgen::base::UtilGen;
    use crate::Target;
    use pretty_assertions::assert_eq;

    fn generators() -> (Rc<DynArrayGen>, Rc<StorageWriteGen>, StorageDeleteGen) {
        let dyn_array = Rc::new(DynArrayGen::new());
        let write = Rc::new(StorageWriteGen::new());
        let delete = StorageDeleteGen::new(dyn_array.clone(), write.clone());

        (dyn_array, write, delete)
    }

    #[test]
    fn struct_skips_mappings() {
        let mut ns = Namespace::new(Target::Starknet);
        let s = ns.add_struct(
            "Account",
            pt::Loc::Builtin,
            vec![
                ("balance", Type::Uint(256)),
                (
                    "allowance",
                    Type::Mapping(Box::new(Type::Address), Box::new(Type::Uint(256))),
                ),
                ("nonce", Type::Uint(64)),
            ],
        );

        let (_, write, delete) = generators();
        delete
            .resolve(&Type::Struct(s), &pt::Loc::Builtin, &ns)
            .unwrap();

        let code = &delete.generated_code()[0].code;
        assert!(code.contains("WS_WRITE0_Uint256(loc, Uint256(0, 0));"));
        assert!(code.contains("WS_WRITE1_felt(loc + 3, 0);"));
        assert!(!code.contains("loc + 2"));
        assert_eq!(write.generated_code().len(), 2);
    }

    #[test]
    fn structs_of_different_contracts_are_deleted_separately() {
        let mut ns = Namespace::new(Target::Starknet);

        // A.B_C and A_B.C
        let small = ns.add_struct("B_C", pt::Loc::Builtin, vec![("flag", Type::Bool)]);
        ns.structs[small].contract = Some("A".into());
        let large = ns.add_struct(
            "C",
            pt::Loc::Builtin,
            vec![("a", Type::Uint(256)), ("b", Type::Uint(256))],
        );
        ns.structs[large].contract = Some("A_B".into());

        let (_, _, delete) = generators();
        let first = delete
            .resolve(&Type::Struct(small), &pt::Loc::Builtin, &ns)
            .unwrap();
        let second = delete
            .resolve(&Type::Struct(large), &pt::Loc::Builtin, &ns)
            .unwrap();

        assert_eq!(first, "WS_DELETE0_S1A3B_C");
        assert_eq!(second, "WS_DELETE1_S3A_B1C");

        let records = delete.generated_code();
        assert_eq!(records.len(), 2);
        assert!(records[0].code.contains("WS_WRITE0_felt(loc, 0);"));
        assert!(records[1].code.contains("WS_WRITE1_Uint256(loc, Uint256(0, 0));"));
        assert!(records[1]
            .code
            .contains("WS_WRITE1_Uint256(loc + 2, Uint256(0, 0));"));
    }

    #[test]
    fn nested_dynamic_arrays_delete_recursively() {
        let ns = Namespace::new(Target::Starknet);
        let (dyn_array, _, delete) = generators();

        let inner = Type::Array(Box::new(Type::Bool), ArrayLength::Dynamic);
        let outer = Type::Array(Box::new(inner.clone()), ArrayLength::Dynamic);

        let name = delete.resolve(&outer, &pt::Loc::Builtin, &ns).unwrap();
        let tail = delete
            .resolve_elements(&inner, &pt::Loc::Builtin, &ns)
            .unwrap();

        assert_eq!(name, "WS_DELETE0_D_D_felt");
        assert_eq!(tail, "WS_DELETE1_D_felt_elem");
        assert_eq!(delete.generated_code().len(), 2);
        assert_eq!(dyn_array.generated_code().len(), 2);
        assert!(delete.generated_code()[0]
            .code
            .contains("WS_DELETE1_D_felt(elem_loc);"));
    }
}
