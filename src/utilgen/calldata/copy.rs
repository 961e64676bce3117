// SPDX-License-Identifier: Apache-2.0

use super::dyn_array_struct::DynArrayStructGen;
use crate::cairo::imports::{FELT_TO_UINT256, UINT256, WM_ALLOC, WM_INDEX_DYN, WM_NEW};
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
use crate::utilgen::memory::MemoryWriteGen;
use crate::utilgen::storage::{
    code_uses_uint256, offset, DynArrayGen, StorageDeleteGen, StorageWriteGen,
};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use solang_parser::pt;
use std::rc::Rc;

/// The by-value representation of a calldata type, checked for mappings
fn calldata_type(ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult<CairoType> {
    if ty.is_value_type() {
        return Err(unsupported(loc, ty, ns, "value types are copied directly"));
    }

    CairoType::from_sol(ty, ns, TypeConversionContext::CallDataRef)
        .map_err(|e| unsupported(loc, ty, ns, &e))
}

fn static_len(ty: &Type, len: &BigInt, loc: &pt::Loc, ns: &Namespace) -> SynthResult<usize> {
    len.to_usize()
        .ok_or_else(|| unsupported(loc, ty, ns, "array too large to pass by value"))
}

/// Copy a calldata value into a new memory allocation: `(calldata: T) -> (mem_loc: felt)`
pub struct CalldataToMemoryGen {
    cache: FunctionCache,
    memory_write: Rc<MemoryWriteGen>,
    dyn_array_struct: Rc<DynArrayStructGen>,
}

util_gen!(
    CalldataToMemoryGen,
    "calldata.to_memory",
    [memory_write, dyn_array_struct]
);

impl CalldataToMemoryGen {
    pub fn new(memory_write: Rc<MemoryWriteGen>, dyn_array_struct: Rc<DynArrayStructGen>) -> Self {
        CalldataToMemoryGen {
            cache: FunctionCache::new("CD_TO_MEMORY", FragmentKind::FunctionDefinition),
            memory_write,
            dyn_array_struct,
        }
    }

    /// Statements writing the calldata value `value` into the memory slot `to`
    fn store(
        &self,
        ty: &Type,
        value: &str,
        to: &str,
        var: &str,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<Vec<String>> {
        let write = self.memory_write.resolve(ty, loc, ns)?;

        if ty.is_value_type() {
            Ok(vec![format!("{write}({to}, {value});")])
        } else {
            let copy = self.resolve(ty, loc, ns)?;

            Ok(vec![
                format!("let ({var}) = {copy}({value});"),
                format!("{write}({to}, {var});"),
            ])
        }
    }
}

impl Resolve for CalldataToMemoryGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let cairo_ty = calldata_type(ty, loc, ns)?;

        self.cache
            .get_or_create(&cairo_ty.mangled(), &cairo_ty.to_string(), |name| {
                let params = format!("calldata: {cairo_ty}");
                let alloc = format!(
                    "let (mem_start) = wm_alloc({});",
                    uint256_literal(&memory_allocation_width(ty, ns))
                );

                let code = match ty {
                    Type::Struct(n) => {
                        let mut body = vec![alloc];

                        for (field_no, field) in ns.structs[*n].fields.iter().enumerate() {
                            body.extend(self.store(
                                &field.ty,
                                &format!("calldata.{}", field.name),
                                &offset("mem_start", &memory_member_offset(*n, field_no, ns)),
                                &format!("m{field_no}"),
                                loc,
                                ns,
                            )?);
                        }

                        body.push("return (mem_start,);".to_string());

                        function(name, Implicits::Memory, &params, "mem_loc: felt", &body)
                    }
                    Type::Array(elem, ArrayLength::Fixed(len)) => {
                        let width = memory_slot_width(elem);
                        let mut body = vec![alloc];

                        for i in 0..static_len(ty, len, loc, ns)? {
                            body.extend(self.store(
                                elem,
                                &format!("calldata[{i}]"),
                                &offset("mem_start", &(&width * i)),
                                &format!("e{i}"),
                                loc,
                                ns,
                            )?);
                        }

                        body.push("return (mem_start,);".to_string());

                        function(name, Implicits::Memory, &params, "mem_loc: felt", &body)
                    }
                    _ => {
                        self.dyn_array_struct.resolve(ty, loc, ns)?;

                        let elem = ty.array_elem();
                        let CairoType::DynArray { elem: elem_cairo } = &cairo_ty else {
                            unreachable!();
                        };
                        let slot = uint256_literal(&memory_slot_width(&elem));
                        let elem_name = format!("{name}_elem");

                        let mut body = vec![
                            "if (index == length) {".to_string(),
                            "    return ();".to_string(),
                            "}".to_string(),
                            "let (index256) = felt_to_uint256(index);".to_string(),
                            format!("let (mem_elem) = wm_index_dyn(mem_start, index256, {slot});"),
                        ];
                        body.extend(self.store(&elem, "ptr[index]", "mem_elem", "elem", loc, ns)?);
                        body.push(format!(
                            "return {elem_name}(length, ptr, mem_start, index + 1);"
                        ));

                        [
                            function(
                                &elem_name,
                                Implicits::Memory,
                                &format!(
                                    "length: felt, ptr: {elem_cairo}*, mem_start: felt, index: felt"
                                ),
                                "",
                                &body,
                            ),
                            function(
                                name,
                                Implicits::Memory,
                                &params,
                                "mem_loc: felt",
                                &[
                                    "let (length256) = felt_to_uint256(calldata.len);".to_string(),
                                    format!("let (mem_start) = wm_new(length256, {slot});"),
                                    format!(
                                        "{elem_name}(calldata.len, calldata.ptr, mem_start, 0);"
                                    ),
                                    "return (mem_start,);".to_string(),
                                ],
                            ),
                        ]
                        .join("\n\n")
                    }
                };

                Ok(Synthesized::new(code)
                    .implicits(Implicits::Memory)
                    .imports(&[UINT256, WM_ALLOC, WM_NEW, WM_INDEX_DYN, FELT_TO_UINT256]))
            })
    }
}

/// Copy a calldata value into storage: `(loc: felt, calldata: T) -> (loc: felt)`
pub struct CalldataToStorageGen {
    cache: FunctionCache,
    dyn_array: Rc<DynArrayGen>,
    storage_write: Rc<StorageWriteGen>,
    dyn_array_struct: Rc<DynArrayStructGen>,
    storage_delete: Rc<StorageDeleteGen>,
}

util_gen!(
    CalldataToStorageGen,
    "calldata.to_storage",
    [dyn_array, storage_write, dyn_array_struct, storage_delete]
);

impl CalldataToStorageGen {
    pub fn new(
        dyn_array: Rc<DynArrayGen>,
        storage_write: Rc<StorageWriteGen>,
        dyn_array_struct: Rc<DynArrayStructGen>,
        storage_delete: Rc<StorageDeleteGen>,
    ) -> Self {
        CalldataToStorageGen {
            cache: FunctionCache::new("CD_TO_STORAGE", FragmentKind::FunctionDefinition),
            dyn_array,
            storage_write,
            dyn_array_struct,
            storage_delete,
        }
    }

    fn store(
        &self,
        ty: &Type,
        value: &str,
        to: &str,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult {
        let write = if ty.is_value_type() {
            self.storage_write.resolve(ty, loc, ns)?
        } else {
            self.resolve(ty, loc, ns)?
        };

        Ok(format!("{write}({to}, {value});"))
    }
}

impl Resolve for CalldataToStorageGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let cairo_ty = calldata_type(ty, loc, ns)?;

        self.cache
            .get_or_create(&storage_key(ty, ns), &cairo_ty.to_string(), |name| {
                let params = format!("loc: felt, calldata: {cairo_ty}");

                let (code, synthesized) = match ty {
                    Type::Struct(n) => {
                        let mut body = Vec::new();

                        for (field_no, field) in ns.structs[*n].fields.iter().enumerate() {
                            body.push(self.store(
                                &field.ty,
                                &format!("calldata.{}", field.name),
                                &offset("loc", &storage_member_offset(*n, field_no, ns)),
                                loc,
                                ns,
                            )?);
                        }

                        body.push("return (loc,);".to_string());

                        (
                            function(name, Implicits::Storage, &params, "loc: felt", &body),
                            Synthesized::default(),
                        )
                    }
                    Type::Array(elem, ArrayLength::Fixed(len)) => {
                        let width = storage_width(elem, ns);
                        let mut body = Vec::new();

                        for i in 0..static_len(ty, len, loc, ns)? {
                            body.push(self.store(
                                elem,
                                &format!("calldata[{i}]"),
                                &offset("loc", &(&width * i)),
                                loc,
                                ns,
                            )?);
                        }

                        body.push("return (loc,);".to_string());

                        (
                            function(name, Implicits::Storage, &params, "loc: felt", &body),
                            Synthesized::default(),
                        )
                    }
                    _ => {
                        self.dyn_array_struct.resolve(ty, loc, ns)?;

                        let elem = ty.array_elem();
                        let CairoType::DynArray { elem: elem_cairo } = &cairo_ty else {
                            unreachable!();
                        };
                        let fns = self.dyn_array.layout(&elem, loc, ns)?;
                        let delete_tail = self.storage_delete.resolve_elements(ty, loc, ns)?;
                        let elem_name = format!("{name}_elem");

                        let body = vec![
                            "if (index == length) {".to_string(),
                            "    return ();".to_string(),
                            "}".to_string(),
                            "let (index256) = felt_to_uint256(index);".to_string(),
                            format!("let (elem_loc) = {}(loc, index256);", fns.elem_loc),
                            self.store(&elem, "ptr[index]", "elem_loc", loc, ns)?,
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
                                    &params,
                                    "loc: felt",
                                    &[
                                        format!("let (old_length) = {}(loc);", fns.length),
                                        "let (length) = felt_to_uint256(calldata.len);"
                                            .to_string(),
                                        format!("{}(loc, length);", fns.set_length),
                                        format!(
                                            "{elem_name}(loc, calldata.len, calldata.ptr, 0);"
                                        ),
                                        format!("{delete_tail}(loc, length, old_length);"),
                                        "return (loc,);".to_string(),
                                    ],
                                ),
                            ]
                            .join("\n\n"),
                            Synthesized::default().imports(&[UINT256, FELT_TO_UINT256]),
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
