// SPDX-License-Identifier: Apache-2.0

use super::{members, param_type, tuple_key};
use crate::cairo::imports::{
    BYTE_ARRAY_TO_FELT_VALUE, BYTE_ARRAY_TO_UINT256_VALUE, FELT_TO_UINT256, LIB_INT_CONVERSIONS,
    MEMORY_BYTES_FROM_ENCODING, UINT256, WM_ALLOC, WM_INDEX_DYN, WM_NEW,
};
use crate::cairo::{function, Implicits};
use crate::layout::{
    abi_head_size, abi_packed_size, memory_allocation_width, memory_slot_width, ABI_WORD,
};
use crate::sema::ast::{ArrayLength, Namespace, Type};
use crate::utilgen::base::{
    uint256_literal, unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult,
    Synthesized,
};
use crate::utilgen::memory::MemoryWriteGen;
use crate::utilgen::storage::offset;
use itertools::Itertools;
use num_bigint::BigInt;
use num_traits::Zero;
use solang_parser::pt;
use std::rc::Rc;

/// `abi.decode(data, (T0, ...))`: `(mem_encoding: felt) -> (result0: T0, ...)`. Reference
/// types are decoded into fresh memory allocations.
pub struct AbiDecodeGen {
    cache: FunctionCache,
    memory_write: Rc<MemoryWriteGen>,
}

util_gen!(AbiDecodeGen, "abi.decode", [memory_write]);

impl AbiDecodeGen {
    pub fn new(memory_write: Rc<MemoryWriteGen>) -> Self {
        AbiDecodeGen {
            cache: FunctionCache::new("abi_decode", FragmentKind::FunctionDefinition),
            memory_write,
        }
    }

    /// Decoder of one value whose head is at `head_index` in a tuple starting at `tuple_start`:
    /// `(mem_encoding: felt, tuple_start: felt, head_index: felt) -> (result: T)`
    pub fn value_decoder(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let cairo_ty = param_type(ty, loc, ns)?;
        let name = format!("abi_decode_{}", ty.mangled(ns));

        self.cache.get_or_create_named(&ty.mangled(ns), &name, |name| {
            let params = "mem_encoding: felt, tuple_start: felt, head_index: felt";
            let returns = format!("result: {cairo_ty}");
            let mut synthesized = Synthesized::default()
                .implicits(Implicits::Bitwise)
                .import(BYTE_ARRAY_TO_FELT_VALUE);

            if ty.is_value_type() {
                let mut body = match ty {
                    _ if ty.is_wide() => vec![
                        "let (result) = byte_array_to_uint256_value(mem_encoding, head_index, 32);"
                            .to_string(),
                    ],
                    Type::Int(bits) => {
                        let narrow = format!("warp_int256_to_int{bits}");
                        synthesized = synthesized.symbol(LIB_INT_CONVERSIONS, &narrow);

                        vec![
                            "let (word) = byte_array_to_uint256_value(mem_encoding, head_index, 32);"
                                .to_string(),
                            format!("let (result) = {narrow}(word);"),
                        ]
                    }
                    // fixed bytes are left aligned in their word
                    Type::Bytes(n) => vec![format!(
                        "let (result) = byte_array_to_felt_value(mem_encoding, head_index, {n});"
                    )],
                    _ => {
                        let size = abi_packed_size(ty, ns).unwrap_or_else(|| ABI_WORD.into());

                        vec![format!(
                            "let (result) = byte_array_to_felt_value(mem_encoding, {}, {size});",
                            offset("head_index", &(BigInt::from(ABI_WORD) - &size))
                        )]
                    }
                };

                body.push("return (result,);".to_string());

                return Ok(Synthesized {
                    code: function(name, Implicits::Bitwise, params, &returns, &body),
                    ..synthesized
                }
                .imports(&[UINT256, BYTE_ARRAY_TO_UINT256_VALUE]));
            }

            let mut body = Vec::new();

            // where the contents start
            let start = if ty.is_dynamic(ns) {
                body.push(
                    "let (data_offset) = byte_array_to_felt_value(mem_encoding, head_index, 32);"
                        .to_string(),
                );
                body.push("let data_start = tuple_start + data_offset;".to_string());

                ("data_start", "data_start")
            } else {
                ("tuple_start", "head_index")
            };

            let mut extra = Vec::new();

            match ty {
                Type::String | Type::DynamicBytes => {
                    body.push(
                        "let (length) = byte_array_to_felt_value(mem_encoding, data_start, 32);"
                            .to_string(),
                    );
                    body.push(
                        "let (result) = memory_bytes_from_encoding(mem_encoding, data_start + 32, length);"
                            .to_string(),
                    );
                    synthesized = synthesized.import(MEMORY_BYTES_FROM_ENCODING);
                }
                Type::Array(elem, ArrayLength::Dynamic) => {
                    let decode = self.value_decoder(elem, loc, ns)?;
                    let write = self.memory_write.resolve(elem, loc, ns)?;
                    let slot = uint256_literal(&memory_slot_width(elem));
                    let elems_name = format!("{name}_elems");

                    extra.push(function(
                        &elems_name,
                        Implicits::Bitwise,
                        "mem_encoding: felt, elements_start: felt, index: felt, length: felt, result: felt",
                        "",
                        &[
                            "if (index == length) {".to_string(),
                            "    return ();".to_string(),
                            "}".to_string(),
                            format!(
                                "let (elem) = {decode}(mem_encoding, elements_start, elements_start + index * {});",
                                abi_head_size(elem, ns)
                            ),
                            "let (index256) = felt_to_uint256(index);".to_string(),
                            format!("let (elem_loc) = wm_index_dyn(result, index256, {slot});"),
                            format!("{write}(elem_loc, elem);"),
                            format!(
                                "return {elems_name}(mem_encoding, elements_start, index + 1, length, result);"
                            ),
                        ],
                    ));

                    body.extend([
                        "let (length) = byte_array_to_felt_value(mem_encoding, data_start, 32);"
                            .to_string(),
                        "let (length256) = felt_to_uint256(length);".to_string(),
                        format!("let (result) = wm_new(length256, {slot});"),
                        format!("{elems_name}(mem_encoding, data_start + 32, 0, length, result);"),
                    ]);

                    synthesized = synthesized.imports(&[
                        UINT256,
                        FELT_TO_UINT256,
                        WM_INDEX_DYN,
                        WM_NEW,
                    ]);
                }
                Type::Struct(_) | Type::Array(_, ArrayLength::Fixed(_)) => {
                    let (tuple_start, first_head) = start;

                    body.push(format!(
                        "let (result) = wm_alloc({});",
                        uint256_literal(&memory_allocation_width(ty, ns))
                    ));

                    let mut head = BigInt::zero();

                    for (i, (member, at)) in members(ty, loc, ns)?.into_iter().enumerate() {
                        let decode = self.value_decoder(&member, loc, ns)?;
                        let write = self.memory_write.resolve(&member, loc, ns)?;

                        body.push(format!(
                            "let (m{i}) = {decode}(mem_encoding, {tuple_start}, {});",
                            offset(first_head, &head)
                        ));
                        body.push(format!("{write}({}, m{i});", offset("result", &at)));

                        head += abi_head_size(&member, ns);
                    }

                    synthesized = synthesized.imports(&[UINT256, WM_ALLOC]);
                }
                _ => return Err(unsupported(loc, ty, ns, "cannot be ABI decoded")),
            }

            body.push("return (result,);".to_string());

            extra.push(function(name, Implicits::Bitwise, params, &returns, &body));

            Ok(Synthesized {
                code: extra.join("\n\n"),
                ..synthesized
            })
        })
    }
}

impl Resolve for AbiDecodeGen {
    type Shape = [Type];

    fn resolve(&self, tys: &[Type], loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let returns = tys
            .iter()
            .enumerate()
            .map(|(i, ty)| Ok(format!("result{i}: {}", param_type(ty, loc, ns)?)))
            .collect::<SynthResult<Vec<_>>>()?
            .join(", ");

        self.cache.get_or_create(&tuple_key(tys, ns), &returns, |name| {
            let mut body = Vec::new();
            let mut head = BigInt::zero();

            for (i, ty) in tys.iter().enumerate() {
                let decode = self.value_decoder(ty, loc, ns)?;

                body.push(format!("let (result{i}) = {decode}(mem_encoding, 0, {head});"));

                head += abi_head_size(ty, ns);
            }

            body.push(if tys.is_empty() {
                "return ();".to_string()
            } else {
                format!(
                    "return ({},);",
                    (0..tys.len()).map(|i| format!("result{i}")).join(", ")
                )
            });

            Ok(Synthesized::new(function(
                name,
                Implicits::Bitwise,
                "mem_encoding: felt",
                &returns,
                &body,
            ))
            .implicits(Implicits::Bitwise))
        })
    }
}
