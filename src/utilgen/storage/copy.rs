// SPDX-License-Identifier: Apache-2.0

use super::access::{StorageReadGen, StorageWriteGen};
use super::delete::StorageDeleteGen;
use super::dyn_array::DynArrayGen;
use crate::cairo::imports::{
    ALLOC, FELT_TO_UINT256, NARROW_SAFE, UINT256, UINT256_ADD, UINT256_EQ, WM_ALLOC,
    WM_INDEX_DYN, WM_NEW,
};
use crate::cairo::types::{CairoType, TypeConversionContext};
use crate::cairo::{function, Implicits};
use crate::layout::{
    memory_allocation_width, memory_member_offset, memory_slot_width, storage_key,
    storage_member_offset, storage_width,
};
use crate::sema::ast::{ArrayLength, Namespace, Type};
use crate::utilgen::base::{
    uint256_literal, unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult,
    Synthesized,
};
use crate::utilgen::calldata::DynArrayStructGen;
use crate::utilgen::memory::MemoryWriteGen;
use itertools::Itertools;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use solang_parser::pt;
use std::rc::Rc;

/// `loc`, or `loc + offset` for a non-zero offset
pub(crate) fn offset(base: &str, offset: &BigInt) -> String {
    if offset.is_zero() {
        base.to_string()
    } else {
        format!("{base} + {offset}")
    }
}

/// Copy a storage value of reference type into a new memory allocation:
/// `(loc: felt) -> (mem_loc: felt)`
pub struct StorageToMemoryGen {
    cache: FunctionCache,
    dyn_array: Rc<DynArrayGen>,
    storage_read: Rc<StorageReadGen>,
    memory_write: Rc<MemoryWriteGen>,
}

util_gen!(
    StorageToMemoryGen,
    "storage.to_memory",
    [dyn_array, storage_read, memory_write]
);

impl StorageToMemoryGen {
    pub fn new(
        dyn_array: Rc<DynArrayGen>,
        storage_read: Rc<StorageReadGen>,
        memory_write: Rc<MemoryWriteGen>,
    ) -> Self {
        StorageToMemoryGen {
            cache: FunctionCache::new("WS_TO_MEMORY", FragmentKind::FunctionDefinition),
            dyn_array,
            storage_read,
            memory_write,
        }
    }

    /// Statements copying the value of type `ty` at storage `from` into the memory slot `to`
    fn copy_slot(
        &self,
        ty: &Type,
        from: &str,
        to: &str,
        var: &str,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<Vec<String>> {
        let write = self.memory_write.resolve(ty, loc, ns)?;

        let read = if ty.is_value_type() {
            self.storage_read.resolve(ty, loc, ns)?
        } else {
            self.resolve(ty, loc, ns)?
        };

        Ok(vec![
            format!("let ({var}) = {read}({from});"),
            format!("{write}({to}, {var});"),
        ])
    }
}

impl Resolve for StorageToMemoryGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        if ty.is_value_type() || ty.contains_mapping(ns) {
            return Err(unsupported(
                loc,
                ty,
                ns,
                "only reference types without mappings can be copied to memory",
            ));
        }

        self.cache.get_or_create(&storage_key(ty, ns), "loc", |name| {
            let imports = [UINT256, WM_ALLOC, WM_NEW, WM_INDEX_DYN, UINT256_ADD, UINT256_EQ];

            let code = match ty {
                Type::Struct(n) => {
                    let mut body = vec![format!(
                        "let (mem_start) = wm_alloc({});",
                        uint256_literal(&memory_allocation_width(ty, ns))
                    )];

                    for (field_no, field) in ns.structs[*n].fields.iter().enumerate() {
                        body.extend(self.copy_slot(
                            &field.ty,
                            &offset("loc", &storage_member_offset(*n, field_no, ns)),
                            &offset("mem_start", &memory_member_offset(*n, field_no, ns)),
                            &format!("m{field_no}"),
                            loc,
                            ns,
                        )?);
                    }

                    body.push("return (mem_start,);".to_string());

                    function(name, Implicits::StorageMemory, "loc: felt", "mem_loc: felt", &body)
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
                        &format!("mem_start + index * {}", memory_slot_width(elem)),
                        "elem",
                        loc,
                        ns,
                    )?);
                    body.push(format!("return {elem_name}(loc, mem_start, index + 1);"));

                    [
                        function(
                            &elem_name,
                            Implicits::StorageMemory,
                            "loc: felt, mem_start: felt, index: felt",
                            "",
                            &body,
                        ),
                        function(
                            name,
                            Implicits::StorageMemory,
                            "loc: felt",
                            "mem_loc: felt",
                            &[
                                format!(
                                    "let (mem_start) = wm_alloc({});",
                                    uint256_literal(&memory_allocation_width(ty, ns))
                                ),
                                format!("{elem_name}(loc, mem_start, 0);"),
                                "return (mem_start,);".to_string(),
                            ],
                        ),
                    ]
                    .join("\n\n")
                }
                _ => {
                    let elem = ty.array_elem();
                    let fns = self.dyn_array.layout(&elem, loc, ns)?;
                    let slot = uint256_literal(&memory_slot_width(&elem));
                    let elem_name = format!("{name}_elem");

                    let mut body = vec![
                        "let (done) = uint256_eq(index, length);".to_string(),
                        "if (done == 1) {".to_string(),
                        "    return ();".to_string(),
                        "}".to_string(),
                        format!("let (elem_loc) = {}(loc, index);", fns.elem_loc),
                        format!("let (mem_elem) = wm_index_dyn(mem_start, index, {slot});"),
                    ];
                    body.extend(self.copy_slot(&elem, "elem_loc", "mem_elem", "elem", loc, ns)?);
                    body.extend([
                        "let (next, _) = uint256_add(index, Uint256(1, 0));".to_string(),
                        format!("return {elem_name}(loc, mem_start, next, length);"),
                    ]);

                    [
                        function(
                            &elem_name,
                            Implicits::StorageMemory,
                            "loc: felt, mem_start: felt, index: Uint256, length: Uint256",
                            "",
                            &body,
                        ),
                        function(
                            name,
                            Implicits::StorageMemory,
                            "loc: felt",
                            "mem_loc: felt",
                            &[
                                format!("let (length) = {}(loc);", fns.length),
                                format!("let (mem_start) = wm_new(length, {slot});"),
                                format!("{elem_name}(loc, mem_start, Uint256(0, 0), length);"),
                                "return (mem_start,);".to_string(),
                            ],
                        ),
                    ]
                    .join("\n\n")
                }
            };

            Ok(Synthesized::new(code)
                .implicits(Implicits::StorageMemory)
                .imports(&imports))
        })
    }
}

/// Deep copy between storage locations of the same type: `(to_loc: felt, from_loc: felt) -> (res: felt)`
pub struct StorageToStorageGen {
    cache: FunctionCache,
    dyn_array: Rc<DynArrayGen>,
    storage_delete: Rc<StorageDeleteGen>,
    storage_read: Rc<StorageReadGen>,
    storage_write: Rc<StorageWriteGen>,
}

util_gen!(
    StorageToStorageGen,
    "storage.to_storage",
    [dyn_array, storage_delete, storage_read, storage_write]
);

impl StorageToStorageGen {
    pub fn new(
        dyn_array: Rc<DynArrayGen>,
        storage_delete: Rc<StorageDeleteGen>,
        storage_read: Rc<StorageReadGen>,
        storage_write: Rc<StorageWriteGen>,
    ) -> Self {
        StorageToStorageGen {
            cache: FunctionCache::new("WS_COPY", FragmentKind::FunctionDefinition),
            dyn_array,
            storage_delete,
            storage_read,
            storage_write,
        }
    }

    fn copy_value(
        &self,
        ty: &Type,
        to: &str,
        from: &str,
        var: &str,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<Vec<String>> {
        if ty.is_value_type() {
            let read = self.storage_read.resolve(ty, loc, ns)?;
            let write = self.storage_write.resolve(ty, loc, ns)?;

            Ok(vec![
                format!("let ({var}) = {read}({from});"),
                format!("{write}({to}, {var});"),
            ])
        } else {
            let copy = self.resolve(ty, loc, ns)?;

            Ok(vec![format!("{copy}({to}, {from});")])
        }
    }
}

impl Resolve for StorageToStorageGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        if ty.is_value_type() || ty.contains_mapping(ns) {
            return Err(unsupported(
                loc,
                ty,
                ns,
                "only reference types without mappings can be copied within storage",
            ));
        }

        self.cache.get_or_create(&storage_key(ty, ns), "to_loc, from_loc", |name| {
            let params = "to_loc: felt, from_loc: felt";

            let (code, synthesized) = match ty {
                Type::Struct(n) => {
                    let mut body = Vec::new();

                    for (field_no, field) in ns.structs[*n].fields.iter().enumerate() {
                        let at = storage_member_offset(*n, field_no, ns);

                        body.extend(self.copy_value(
                            &field.ty,
                            &offset("to_loc", &at),
                            &offset("from_loc", &at),
                            &format!("m{field_no}"),
                            loc,
                            ns,
                        )?);
                    }

                    body.push("return (to_loc,);".to_string());

                    (
                        function(name, Implicits::Storage, params, "res: felt", &body),
                        Synthesized::default(),
                    )
                }
                Type::Array(elem, ArrayLength::Fixed(len)) => {
                    let elem_name = format!("{name}_elem");
                    let width = storage_width(elem, ns);

                    let mut body = vec![
                        format!("if (index == {len}) {{"),
                        "    return ();".to_string(),
                        "}".to_string(),
                    ];
                    body.extend(self.copy_value(
                        elem,
                        &format!("to_loc + index * {width}"),
                        &format!("from_loc + index * {width}"),
                        "elem",
                        loc,
                        ns,
                    )?);
                    body.push(format!("return {elem_name}(to_loc, from_loc, index + 1);"));

                    (
                        [
                            function(
                                &elem_name,
                                Implicits::Storage,
                                "to_loc: felt, from_loc: felt, index: felt",
                                "",
                                &body,
                            ),
                            function(
                                name,
                                Implicits::Storage,
                                params,
                                "res: felt",
                                &[
                                    format!("{elem_name}(to_loc, from_loc, 0);"),
                                    "return (to_loc,);".to_string(),
                                ],
                            ),
                        ]
                        .join("\n\n"),
                        Synthesized::default(),
                    )
                }
                _ => {
                    let elem = ty.array_elem();
                    let fns = self.dyn_array.layout(&elem, loc, ns)?;
                    let delete_tail = self.storage_delete.resolve_elements(ty, loc, ns)?;
                    let elem_name = format!("{name}_elem");

                    let mut body = vec![
                        "let (done) = uint256_eq(index, length);".to_string(),
                        "if (done == 1) {".to_string(),
                        "    return ();".to_string(),
                        "}".to_string(),
                        format!("let (to_elem) = {}(to_loc, index);", fns.elem_loc),
                        format!("let (from_elem) = {}(from_loc, index);", fns.elem_loc),
                    ];
                    body.extend(self.copy_value(&elem, "to_elem", "from_elem", "elem", loc, ns)?);
                    body.extend([
                        "let (next, _) = uint256_add(index, Uint256(1, 0));".to_string(),
                        format!("return {elem_name}(to_loc, from_loc, next, length);"),
                    ]);

                    (
                        [
                            function(
                                &elem_name,
                                Implicits::Storage,
                                "to_loc: felt, from_loc: felt, index: Uint256, length: Uint256",
                                "",
                                &body,
                            ),
                            function(
                                name,
                                Implicits::Storage,
                                params,
                                "res: felt",
                                &[
                                    format!("let (old_length) = {}(to_loc);", fns.length),
                                    format!("let (length) = {}(from_loc);", fns.length),
                                    format!("{}(to_loc, length);", fns.set_length),
                                    format!(
                                        "{elem_name}(to_loc, from_loc, Uint256(0, 0), length);"
                                    ),
                                    format!("{delete_tail}(to_loc, length, old_length);"),
                                    "return (to_loc,);".to_string(),
                                ],
                            ),
                        ]
                        .join("\n\n"),
                        Synthesized::default().imports(&[UINT256, UINT256_ADD, UINT256_EQ]),
                    )
                }
            };

            Ok(Synthesized {
                code,
                imports: synthesized.imports,
            }
            .implicits(Implicits::Storage))
        })
    }
}

/// Read a storage value into its by-value calldata representation:
/// `(loc: felt) -> (res: T)`
pub struct StorageToCalldataGen {
    cache: FunctionCache,
    dyn_array: Rc<DynArrayGen>,
    storage_read: Rc<StorageReadGen>,
    dyn_array_struct: Rc<DynArrayStructGen>,
}

util_gen!(
    StorageToCalldataGen,
    "storage.to_calldata",
    [dyn_array, storage_read, dyn_array_struct]
);

impl StorageToCalldataGen {
    pub fn new(
        dyn_array: Rc<DynArrayGen>,
        storage_read: Rc<StorageReadGen>,
        dyn_array_struct: Rc<DynArrayStructGen>,
    ) -> Self {
        StorageToCalldataGen {
            cache: FunctionCache::new("WS_TO_CALLDATA", FragmentKind::FunctionDefinition),
            dyn_array,
            storage_read,
            dyn_array_struct,
        }
    }

    /// Statement binding `var` to the calldata value of type `ty` at storage `from`
    fn read(&self, ty: &Type, from: &str, var: &str, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let read = if ty.is_value_type() {
            self.storage_read.resolve(ty, loc, ns)?
        } else {
            self.resolve(ty, loc, ns)?
        };

        Ok(format!("let ({var}) = {read}({from});"))
    }
}

impl Resolve for StorageToCalldataGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        if ty.is_value_type() {
            return Err(unsupported(loc, ty, ns, "value types are read directly"));
        }

        let cairo_ty = CairoType::from_sol(ty, ns, TypeConversionContext::CallDataRef)
            .map_err(|e| unsupported(loc, ty, ns, &e))?;

        self.cache
            .get_or_create(&storage_key(ty, ns), &cairo_ty.to_string(), |name| {
                let returns = format!("res: {cairo_ty}");

                let (code, synthesized) = match ty {
                    Type::Struct(n) => {
                        let mut body = Vec::new();
                        let mut members = Vec::new();

                        for (field_no, field) in ns.structs[*n].fields.iter().enumerate() {
                            let var = format!("m{field_no}");
                            body.push(self.read(
                                &field.ty,
                                &offset("loc", &storage_member_offset(*n, field_no, ns)),
                                &var,
                                loc,
                                ns,
                            )?);
                            members.push(format!("{}={var}", field.name));
                        }

                        body.push(format!("return ({cairo_ty}({}),);", members.join(", ")));

                        (
                            function(name, Implicits::Storage, "loc: felt", &returns, &body),
                            Synthesized::default(),
                        )
                    }
                    Type::Array(elem, ArrayLength::Fixed(len)) => {
                        let width = storage_width(elem, ns);
                        let len = len
                            .to_usize()
                            .ok_or_else(|| unsupported(loc, ty, ns, "array too large"))?;
                        let mut body = Vec::new();

                        for i in 0..len {
                            body.push(self.read(
                                elem,
                                &offset("loc", &(&width * i)),
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
                            function(name, Implicits::Storage, "loc: felt", &returns, &body),
                            Synthesized::default(),
                        )
                    }
                    _ => {
                        self.dyn_array_struct.resolve(ty, loc, ns)?;

                        let elem = ty.array_elem();
                        let fns = self.dyn_array.layout(&elem, loc, ns)?;
                        let elem_cairo =
                            CairoType::from_sol(&elem, ns, TypeConversionContext::CallDataRef)
                                .map_err(|e| unsupported(loc, &elem, ns, &e))?;
                        let elem_name = format!("{name}_elem");

                        let body = vec![
                            "if (index == length) {".to_string(),
                            "    return ();".to_string(),
                            "}".to_string(),
                            "let (index256) = felt_to_uint256(index);".to_string(),
                            format!("let (elem_loc) = {}(loc, index256);", fns.elem_loc),
                            self.read(&elem, "elem_loc", "elem", loc, ns)?,
                            "assert ptr[index] = elem;".to_string(),
                            format!("return {elem_name}(loc, length, ptr, index + 1);"),
                        ];

                        (
                            [
                                function(
                                    &elem_name,
                                    Implicits::Storage,
                                    &format!(
                                        "loc: felt, length: felt, ptr: {elem_cairo}*, index: felt"
                                    ),
                                    "",
                                    &body,
                                ),
                                function(
                                    name,
                                    Implicits::Storage,
                                    "loc: felt",
                                    &returns,
                                    &[
                                        format!("let (length256) = {}(loc);", fns.length),
                                        "let (length) = narrow_safe(length256);".to_string(),
                                        format!("let (ptr: {elem_cairo}*) = alloc();"),
                                        format!("{elem_name}(loc, length, ptr, 0);"),
                                        format!("return ({cairo_ty}(len=length, ptr=ptr),);"),
                                    ],
                                ),
                            ]
                            .join("\n\n"),
                            Synthesized::default().imports(&[ALLOC, FELT_TO_UINT256, NARROW_SAFE]),
                        )
                    }
                };

                let synthesized = Synthesized {
                    code,
                    imports: synthesized.imports,
                }
                .implicits(Implicits::Storage);

                Ok(if code_uses_uint256(&cairo_ty) {
                    synthesized.import(UINT256)
                } else {
                    synthesized
                })
            })
    }
}

/// Does the by-value representation mention `Uint256` anywhere
pub(crate) fn code_uses_uint256(ty: &CairoType) -> bool {
    match ty {
        CairoType::Uint256 => true,
        CairoType::Felt => false,
        CairoType::Pointer(ty) => code_uses_uint256(ty),
        CairoType::Tuple(members) => members.iter().any(|m| code_uses_uint256(m)),
        CairoType::DynArray { elem } => code_uses_uint256(elem),
        // the struct definition imports what it needs
        CairoType::Struct { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilgen::base::UtilGen;
    use crate::Target;
    use pretty_assertions::assert_eq;

    #[test]
    fn storage_to_memory_of_nested_arrays() {
        let ns = Namespace::new(Target::Starknet);
        let dyn_array = Rc::new(DynArrayGen::new());
        let read = Rc::new(StorageReadGen::new());
        let write = Rc::new(MemoryWriteGen::new());
        let gen = StorageToMemoryGen::new(dyn_array.clone(), read, write.clone());

        let inner = Type::Array(Box::new(Type::Uint(256)), ArrayLength::Fixed(2.into()));
        let outer = Type::Array(Box::new(inner), ArrayLength::Dynamic);

        let name = gen.resolve(&outer, &pt::Loc::Builtin, &ns).unwrap();
        assert_eq!(name, "WS_TO_MEMORY0_D_A2_Uint256");

        let records = gen.generated_code();
        assert_eq!(records.len(), 2);
        assert!(records[0]
            .code
            .contains("let (mem_elem) = wm_index_dyn(mem_start, index, Uint256(1, 0));"));
        assert!(records[0]
            .code
            .contains("let (elem) = WS_TO_MEMORY1_A2_Uint256(elem_loc);"));
        assert!(records[1]
            .code
            .contains("let (mem_start) = wm_alloc(Uint256(4, 0));"));
        assert!(write.is_used());
    }

    #[test]
    fn mappings_cannot_be_copied() {
        let mut ns = Namespace::new(Target::Starknet);
        let s = ns.add_struct(
            "S",
            pt::Loc::Builtin,
            vec![(
                "m",
                Type::Mapping(Box::new(Type::Address), Box::new(Type::Bool)),
            )],
        );

        let dyn_array = Rc::new(DynArrayGen::new());
        let write = Rc::new(StorageWriteGen::new());
        let delete = Rc::new(StorageDeleteGen::new(dyn_array.clone(), write.clone()));
        let gen = StorageToStorageGen::new(
            dyn_array,
            delete,
            Rc::new(StorageReadGen::new()),
            write,
        );

        assert!(gen
            .resolve(&Type::Struct(s), &pt::Loc::Builtin, &ns)
            .is_err());
        assert!(!gen.is_used());
    }

    #[test]
    fn storage_copy_clears_the_tail() {
        let ns = Namespace::new(Target::Starknet);
        let dyn_array = Rc::new(DynArrayGen::new());
        let write = Rc::new(StorageWriteGen::new());
        let delete = Rc::new(StorageDeleteGen::new(dyn_array.clone(), write.clone()));
        let gen = StorageToStorageGen::new(
            dyn_array,
            delete,
            Rc::new(StorageReadGen::new()),
            write,
        );

        gen.resolve(&Type::String, &pt::Loc::Builtin, &ns).unwrap();

        let code = &gen.generated_code()[0].code;
        assert!(code.contains("WARP_DARRAY0_felt_SET_LENGTH(to_loc, length);"));
        assert!(code.contains("WS_DELETE0_D_felt_elem(to_loc, length, old_length);"));
    }
}
