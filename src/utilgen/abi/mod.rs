// SPDX-License-Identifier: Apache-2.0

//! Generators for the `abi.encode*` and `abi.decode` builtins.
//!
//! Encoders write one byte per felt into a scratch `felt*` array and copy the result into a
//! new memory `bytes` value at the end. The encoding follows the Solidity ABI: every value
//! takes a 32 byte head; dynamic values put their offset, relative to the start of the
//! enclosing tuple, in the head and their contents in the tail.

mod decode;
mod encode;

pub use decode::AbiDecodeGen;
pub use encode::{
    AbiEncodeGen, AbiEncodePackedGen, AbiEncodeWithSelectorGen, AbiEncodeWithSignatureGen,
};

use crate::cairo::imports::{
    FELT_ARRAY_TO_WARP_MEMORY_ARRAY, FELT_TO_UINT256, UINT256, WM_NEW,
};
use crate::cairo::types::{CairoType, TypeConversionContext};
use crate::layout::{memory_member_offset, memory_slot_width};
use crate::sema::ast::{ArrayLength, Namespace, Type};
use crate::utilgen::base::{unsupported, SynthResult, Synthesized};
use crate::utilgen::conversions::widen;
use itertools::Itertools;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use solang_parser::pt;

/// Structural key of a tuple of types
fn tuple_key(tys: &[Type], ns: &Namespace) -> String {
    format!(
        "{}{}",
        tys.len(),
        tys.iter().map(|ty| format!("_{}", ty.mangled(ns))).join("")
    )
}

/// How a value of `ty` is passed to the codec routines: value types by value, everything
/// else as a memory location
fn param_type(ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult<CairoType> {
    if ty.contains_mapping(ns) {
        return Err(unsupported(loc, ty, ns, "mappings cannot be ABI encoded"));
    }

    CairoType::from_sol(ty, ns, TypeConversionContext::Ref)
        .map_err(|e| unsupported(loc, ty, ns, &e))
}

/// Struct fields or static array elements of a value in memory, with their slot offsets
fn members(ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult<Vec<(Type, BigInt)>> {
    match ty {
        Type::Struct(n) => Ok(ns.structs[*n]
            .fields
            .iter()
            .enumerate()
            .map(|(field_no, field)| (field.ty.clone(), memory_member_offset(*n, field_no, ns)))
            .collect()),
        Type::Array(elem, ArrayLength::Fixed(len)) => {
            let width = memory_slot_width(elem);
            let len = len
                .to_usize()
                .ok_or_else(|| unsupported(loc, ty, ns, "array too large"))?;

            Ok((0..len).map(|i| ((**elem).clone(), &width * i)).collect())
        }
        _ => Ok(Vec::new()),
    }
}

/// `param0: T0, param1: T1`
fn params(tys: &[Type], loc: &pt::Loc, ns: &Namespace) -> SynthResult<Vec<String>> {
    tys.iter()
        .enumerate()
        .map(|(i, ty)| Ok(format!("param{i}: {}", param_type(ty, loc, ns)?)))
        .collect()
}

/// Statement binding `out` to the value type `value` as a 32 byte ABI word. Signed integers are
/// sign extended, fixed bytes are left aligned.
fn word(ty: &Type, value: &str, out: &str, synthesized: &mut Synthesized) -> String {
    let wide = match ty {
        Type::Int(_) => Some(Type::Int(256)),
        Type::Uint(_) => Some(Type::Uint(256)),
        Type::Bytes(_) => Some(Type::Bytes(32)),
        _ => None,
    };

    match wide.and_then(|wide| widen(ty, &wide, value, out)) {
        Some(conversion) => {
            *synthesized = conversion.imports_into(std::mem::take(synthesized));

            conversion.code
        }
        None => {
            // bool, address and enums are non-negative felts
            *synthesized = std::mem::take(synthesized).import(FELT_TO_UINT256);

            format!("let ({out}) = felt_to_uint256({value});")
        }
    }
}

/// Copy the first `length` bytes of `bytes_array` into a new memory `bytes` and return it
fn into_memory(length: &str, synthesized: Synthesized) -> (Vec<String>, Synthesized) {
    (
        vec![
            format!("let (max_length256) = felt_to_uint256({length});"),
            "let (mem_ptr) = wm_new(max_length256, Uint256(1, 0));".to_string(),
            format!("felt_array_to_warp_memory_array(0, bytes_array, 0, mem_ptr, {length});"),
            "return (mem_ptr,);".to_string(),
        ],
        synthesized.imports(&[
            UINT256,
            FELT_TO_UINT256,
            WM_NEW,
            FELT_ARRAY_TO_WARP_MEMORY_ARRAY,
        ]),
    )
}

#[cfg(test)]
mod tests;
