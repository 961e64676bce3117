// SPDX-License-Identifier: Apache-2.0

use super::access::MemoryReadGen;
use crate::cairo::imports::{
    ALLOC, FELT_TO_UINT256, NARROW_SAFE, UINT256, UINT256_ADD, UINT256_EQ, WM_DYN_ARRAY_LENGTH,
    WM_INDEX_DYN,
};
use crate::cairo::types::{CairoType, TypeConversionContext};
use crate::cairo::{function, Implicits};
use crate::layout::{
    memory_key, memory_member_offset, memory_slot_width, storage_key, storage_member_offset,
    storage_width,
};
use crate::sema::ast::{ArrayLength, Namespace, Type};
use crate::utilgen::base::{
    uint256_literal, unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult,
    Synthesized,
};
use crate::utilgen::calldata::DynArrayStructGen;
use crate::utilgen::storage::{
    code_uses_uint256, offset, DynArrayGen, StorageDeleteGen, StorageWriteGen,
};
use itertools::Itertools;
use num_traits::ToPrimitive;
use solang_parser::pt;
use std::rc::Rc;

/// Copy a memory value of reference type into storage:
/// `(loc: felt, mem_loc: felt) -> (loc: felt)`.
///
/// Dynamic arrays take the length of the source; elements past it are deleted.
pub struct MemoryToStorageGen {
    cache: FunctionCache,
    dyn_array: Rc<DynArrayGen>,
    storage_delete: Rc<StorageDeleteGen>,
    storage_write: Rc<StorageWriteGen>,
    memory_read: Rc<MemoryReadGen>,
}

util_gen!(
    MemoryToStorageGen,
    "memory.to_storage",
    [dyn_array, storage_delete, storage_write, memory_read]
);

impl MemoryToStorageGen {
    pub fn new(
        dyn_array: Rc<DynArrayGen>,
        storage_delete: Rc<StorageDeleteGen>,
        storage_write: Rc<StorageWriteGen>,
        memory_read: Rc<MemoryReadGen>,
    ) -> Self {
        MemoryToStorageGen {
            cache: FunctionCache::new("WM_TO_STORAGE", FragmentKind::FunctionDefinition),
            dyn_array,
            storage_delete,
            storage_write,
            memory_read,
        }
    }

    /// Statements copying the memory slot `from` into storage at `to`
    fn copy_slot(
        &self,
        ty: &Type,
        to: &str,
        from: &str,
        var: &str,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<Vec<String>> {
        let read = self.memory_read.resolve(ty, loc, ns)?;

        let store = if ty.is_value_type() {
            let write = self.storage_write.resolve(ty, loc, ns)?;
            format!("{write}({to}, {var});")
        } else {
            let copy = self.resolve(ty, loc, ns)?;
            format!("{copy}({to}, {var});")
        };

        Ok(vec![format!("let ({var}) = {read}({from});"), store])
    }
}

impl Resolve for MemoryToStorageGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        if ty.is_value_type() || ty.contains_mapping(ns) {
            return Err(unsupported(
                loc,
                ty,
                ns,
                "only reference types without mappings are copied from memory",
            ));
        }

        let params = "loc: felt, mem_loc: felt";

        self.cache.get_or_create(&storage_key(ty, ns), "loc, mem_loc", |name| {
            let (code, imports) = match ty {
                Type::Struct(n) => {
                    let mut body = Vec::new();

                    for (field_no, field) in ns.structs[*n].fields.iter().enumerate() {
                        body.extend(self.copy_slot(
                            &field.ty,
                            &offset("loc", &storage_member_offset(*n, field_no, ns)),
                            &offset("mem_loc", &memory_member_offset(*n, field_no, ns)),
                            &format!("m{field_no}"),
                            loc,
                            ns,
                        )?);
                    }

                    body.push("return (loc,);".to_string());

                    (
                        function(name, Implicits::StorageMemory, params, "loc: felt", &body),
                        vec![],
                    )
                }
                Type::Array(elem, ArrayLength::Fixed(len)) => {
                    let elem_name = format!("{name}_elem");
                    let mut body = vec![
                        format!("if (index == {len}) {{"),
                        "    return ();".to_string(),
                        "}".to_string(),
                    ];
                    body.extend(self.copy_slot(
                        elem,
                        &format!("loc + index * {}", storage_width(elem, ns)),
                        &format!("mem_loc + index * {}", memory_slot_width(elem)),
                        "elem",
                        loc,
                        ns,
                    )?);
                    body.push(format!("return {elem_name}(loc, mem_loc, index + 1);"));

                    (
                        [
                            function(
                                &elem_name,
                                Implicits::StorageMemory,
                                "loc: felt, mem_loc: felt, index: felt",
                                "",
                                &body,
                            ),
                            function(
                                name,
                                Implicits::StorageMemory,
                                params,
                                "loc: felt",
                                &[
                                    format!("{elem_name}(loc, mem_loc, 0);"),
                                    "return (loc,);".to_string(),
                                ],
                            ),
                        ]
                        .join("\n\n"),
                        vec![],
                    )
                }
                _ => {
                    let elem = ty.array_elem();
                    let fns = self.dyn_array.layout(&elem, loc, ns)?;
                    let delete_tail = self.storage_delete.resolve_elements(ty, loc, ns)?;
                    let slot = uint256_literal(&memory_slot_width(&elem));
                    let elem_name = format!("{name}_elem");

                    let mut body = vec![
                        "let (done) = uint256_eq(index, length);".to_string(),
                        "if (done == 1) {".to_string(),
                        "    return ();".to_string(),
                        "}".to_string(),
                        format!("let (elem_loc) = {}(loc, index);", fns.elem_loc),
                        format!("let (mem_elem) = wm_index_dyn(mem_loc, index, {slot});"),
                    ];
                    body.extend(self.copy_slot(&elem, "elem_loc", "mem_elem", "elem", loc, ns)?);
                    body.extend([
                        "let (next, _) = uint256_add(index, Uint256(1, 0));".to_string(),
                        format!("return {elem_name}(loc, mem_loc, next, length);"),
                    ]);

                    (
                        [
                            function(
                                &elem_name,
                                Implicits::StorageMemory,
                                "loc: felt, mem_loc: felt, index: Uint256, length: Uint256",
                                "",
                                &body,
                            ),
                            function(
                                name,
                                Implicits::StorageMemory,
                                params,
                                "loc: felt",
                                &[
                                    format!("let (old_length) = {}(loc);", fns.length),
                                    "let (length) = wm_dyn_array_length(mem_loc);".to_string(),
                                    format!("{}(loc, length);", fns.set_length),
                                    format!("{elem_name}(loc, mem_loc, Uint256(0, 0), length);"),
                                    format!("{delete_tail}(loc, length, old_length);"),
                                    "return (loc,);".to_string(),
                                ],
                            ),
                        ]
                        .join("\n\n"),
                        vec![UINT256, UINT256_ADD, UINT256_EQ, WM_INDEX_DYN, WM_DYN_ARRAY_LENGTH],
                    )
                }
            };

            Ok(Synthesized::new(code)
                .implicits(Implicits::StorageMemory)
                .imports(&imports))
        })
    }
}

/// Read a memory value into its by-value calldata representation:
/// `(mem_loc: felt) -> (res: T)`
pub struct MemoryToCalldataGen {
    cache: FunctionCache,
    dyn_array_struct: Rc<DynArrayStructGen>,
    memory_read: Rc<MemoryReadGen>,
}

util_gen!(
    MemoryToCalldataGen,
    "memory.to_calldata",
    [dyn_array_struct, memory_read]
);

impl MemoryToCalldataGen {
    pub fn new(dyn_array_struct: Rc<DynArrayStructGen>, memory_read: Rc<MemoryReadGen>) -> Self {
        MemoryToCalldataGen {
            cache: FunctionCache::new("WM_TO_CALLDATA", FragmentKind::FunctionDefinition),
            dyn_array_struct,
            memory_read,
        }
    }

    /// Statements binding `var` to the calldata form of the memory slot `from`
    fn read(
        &self,
        ty: &Type,
        from: &str,
        var: &str,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<Vec<String>> {
        let read = self.memory_read.resolve(ty, loc, ns)?;

        if ty.is_value_type() {
            Ok(vec![format!("let ({var}) = {read}({from});")])
        } else {
            let convert = self.resolve(ty, loc, ns)?;

            Ok(vec![
                format!("let ({var}_ptr) = {read}({from});"),
                format!("let ({var}) = {convert}({var}_ptr);"),
            ])
        }
    }
}

impl Resolve for MemoryToCalldataGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        if ty.is_value_type() {
            return Err(unsupported(loc, ty, ns, "value types are read directly"));
        }

        let cairo_ty = CairoType::from_sol(ty, ns, TypeConversionContext::CallDataRef)
            .map_err(|e| unsupported(loc, ty, ns, &e))?;

        self.cache
            .get_or_create(&memory_key(ty, ns), &cairo_ty.to_string(), |name| {
                let returns = format!("res: {cairo_ty}");

                let (code, imports) = match ty {
                    Type::Struct(n) => {
                        let mut body = Vec::new();
                        let mut members = Vec::new();

                        for (field_no, field) in ns.structs[*n].fields.iter().enumerate() {
                            let var = format!("m{field_no}");
                            body.extend(self.read(
                                &field.ty,
                                &offset("mem_loc", &memory_member_offset(*n, field_no, ns)),
                                &var,
                                loc,
                                ns,
                            )?);
                            members.push(format!("{}={var}", field.name));
                        }

                        body.push(format!("return ({cairo_ty}({}),);", members.join(", ")));

                        (
                            function(name, Implicits::Memory, "mem_loc: felt", &returns, &body),
                            vec![],
                        )
                    }
                    Type::Array(elem, ArrayLength::Fixed(len)) => {
                        let width = memory_slot_width(elem);
                        let len = len
                            .to_usize()
                            .ok_or_else(|| unsupported(loc, ty, ns, "array too large"))?;
                        let mut body = Vec::new();

                        for i in 0..len {
                            body.extend(self.read(
                                elem,
                                &offset("mem_loc", &(&width * i)),
                                &format!("e{i}"),
                                loc,
                                ns,
                            )?);
                        }

                        body.push(format!(
                            "return (({}),);",
                            (0..len).map(|i| format!("e{i}")).join(", ")
                        ));

                        (
                            function(name, Implicits::Memory, "mem_loc: felt", &returns, &body),
                            vec![],
                        )
                    }
                    _ => {
                        self.dyn_array_struct.resolve(ty, loc, ns)?;

                        let elem = ty.array_elem();
                        let elem_cairo =
                            CairoType::from_sol(&elem, ns, TypeConversionContext::CallDataRef)
                                .map_err(|e| unsupported(loc, &elem, ns, &e))?;
                        let slot = uint256_literal(&memory_slot_width(&elem));
                        let elem_name = format!("{name}_elem");

                        let mut body = vec![
                            "if (index == length) {".to_string(),
                            "    return ();".to_string(),
                            "}".to_string(),
                            "let (index256) = felt_to_uint256(index);".to_string(),
                            format!("let (mem_elem) = wm_index_dyn(mem_loc, index256, {slot});"),
                        ];
                        body.extend(self.read(&elem, "mem_elem", "elem", loc, ns)?);
                        body.extend([
                            "assert ptr[index] = elem;".to_string(),
                            format!("return {elem_name}(mem_loc, length, ptr, index + 1);"),
                        ]);

                        (
                            [
                                function(
                                    &elem_name,
                                    Implicits::Memory,
                                    &format!(
                                        "mem_loc: felt, length: felt, ptr: {elem_cairo}*, index: felt"
                                    ),
                                    "",
                                    &body,
                                ),
                                function(
                                    name,
                                    Implicits::Memory,
                                    "mem_loc: felt",
                                    &returns,
                                    &[
                                        "let (length256) = wm_dyn_array_length(mem_loc);"
                                            .to_string(),
                                        "let (length) = narrow_safe(length256);".to_string(),
                                        format!("let (ptr: {elem_cairo}*) = alloc();"),
                                        format!("{elem_name}(mem_loc, length, ptr, 0);"),
                                        format!("return ({cairo_ty}(len=length, ptr=ptr),);"),
                                    ],
                                ),
                            ]
                            .join("\n\n"),
                            vec![
                                ALLOC,
                                FELT_TO_UINT256,
                                NARROW_SAFE,
                                WM_INDEX_DYN,
                                WM_DYN_ARRAY_LENGTH,
                            ],
                        )
                    }
                };

                let synthesized = Synthesized::new(code)
                    .implicits(Implicits::Memory)
                    .imports(&imports);

                Ok(if code_uses_uint256(&cairo_ty) || ty.is_dynamic_array() {
                    synthesized.import(UINT256)
                } else {
                    synthesized
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilgen::base::UtilGen;
    use crate::Target;
    use pretty_assertions::assert_eq;

    #[test]
    fn copy_into_storage_deletes_the_tail() {
        let mut ns = Namespace::new(Target::Starknet);
        let item = ns.add_struct(
            "Item",
            pt::Loc::Builtin,
            vec![("id", Type::Uint(64)), ("weight", Type::Uint(256))],
        );

        let dyn_array = Rc::new(DynArrayGen::new());
        let write = Rc::new(StorageWriteGen::new());
        let delete = Rc::new(StorageDeleteGen::new(dyn_array.clone(), write.clone()));
        let gen = MemoryToStorageGen::new(
            dyn_array.clone(),
            delete.clone(),
            write,
            Rc::new(MemoryReadGen::new()),
        );

        let items = Type::Array(Box::new(Type::Struct(item)), ArrayLength::Dynamic);
        let name = gen.resolve(&items, &pt::Loc::Builtin, &ns).unwrap();

        assert_eq!(name, "WM_TO_STORAGE0_D_S4Item");

        let records = gen.generated_code();
        assert_eq!(records.len(), 2);
        assert!(records[0]
            .code
            .contains("WS_DELETE0_D_S4Item_elem(loc, length, old_length);"));
        assert!(records[0]
            .code
            .contains("WM_TO_STORAGE1_S4Item(elem_loc, elem);"));
        assert!(records[1]
            .code
            .contains("let (m1) = wm_read_256(mem_loc + 1);"));
        assert!(records[1].code.contains("WS_WRITE1_Uint256(loc + 1, m1);"));

        // the layout routine is shared with delete
        assert_eq!(dyn_array.generated_code().len(), 1);
        assert!(delete.is_used());
    }

    #[test]
    fn memory_to_calldata_builds_the_struct() {
        let ns = Namespace::new(Target::Starknet);
        let dyn_array_struct = Rc::new(DynArrayStructGen::new());
        let gen = MemoryToCalldataGen::new(dyn_array_struct.clone(), Rc::new(MemoryReadGen::new()));

        let ty = Type::Array(Box::new(Type::Uint(256)), ArrayLength::Dynamic);
        gen.resolve(&ty, &pt::Loc::Builtin, &ns).unwrap();

        let code = &gen.generated_code()[0].code;
        assert!(code.contains("let (ptr: Uint256*) = alloc();"));
        assert!(code.contains("return (cd_dynarray_Uint256(len=length, ptr=ptr),);"));
        assert_eq!(dyn_array_struct.generated_code()[0].name, "cd_dynarray_Uint256");
    }
}
