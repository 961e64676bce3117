// SPDX-License-Identifier: Apache-2.0

//! Physical layout of Solidity values in the flat felt model.
//!
//! Every offset and width baked into generated code comes from here, as does the
//! reference [`machine::FeltMachine`] which interprets the same layout natively.
//!
//! Storage is a single felt addressed space. Value types occupy one or two consecutive
//! cells (two for 256 bit values, low then high). Structs and static arrays are laid out
//! inline. A dynamic array keeps its length, a `Uint256`, inline; its elements live at
//! addresses derived from the array's location, as decided by the [`ArrayLayout`]. A
//! mapping reserves a single cell whose address is the base of its slots.
//!
//! Memory is a felt addressed heap. Values of value type sit inline in their slot, reference
//! types are a pointer to their own allocation. A dynamic array allocation starts with a
//! two felt length header followed by the element slots.

pub mod machine;

use crate::sema::ast::{ArrayLength, Namespace, Type};
use num_bigint::BigInt;
use num_traits::{One, Zero};
use std::fmt;

/// Felts in the length header of a dynamic array in memory
pub const MEMORY_DYN_ARRAY_HEADER: u64 = 2;

/// Felts a dynamic array keeps inline in storage
pub const STORAGE_DYN_ARRAY_INLINE: u64 = 2;

/// Bytes in one ABI word
pub const ABI_WORD: u64 = 32;

/// How the elements of storage dynamic arrays (and the slots of mappings) are addressed
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArrayLayout {
    /// Element `i` of the array whose length cell is at `loc` is at
    /// `hash2(loc, 0) + i * width`; the slot for `key` in a mapping at `loc` is
    /// `hash2(loc, key)`
    Strided,
    /// Elements and mapping slots are allocated on first use from `WARP_USED_STORAGE` and
    /// recorded in per type index tables keyed by `(loc, index)`
    Indexed,
}

impl fmt::Display for ArrayLayout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArrayLayout::Strided => write!(f, "strided"),
            ArrayLayout::Indexed => write!(f, "indexed"),
        }
    }
}

/// Number of storage cells the inline part of a value occupies
pub fn storage_width(ty: &Type, ns: &Namespace) -> BigInt {
    match ty {
        _ if ty.is_value_type() => value_width(ty),
        Type::Struct(n) => ns.structs[*n]
            .fields
            .iter()
            .map(|field| storage_width(&field.ty, ns))
            .sum(),
        Type::Array(elem, ArrayLength::Fixed(len)) => len * storage_width(elem, ns),
        Type::Array(_, ArrayLength::Dynamic) | Type::DynamicBytes | Type::String => {
            STORAGE_DYN_ARRAY_INLINE.into()
        }
        Type::Mapping(..) => BigInt::one(),
        _ => unreachable!(),
    }
}

/// Felts a value type occupies, wherever it lives
pub fn value_width(ty: &Type) -> BigInt {
    if ty.is_wide() {
        BigInt::from(2)
    } else {
        BigInt::one()
    }
}

/// Offset of a struct field from the start of the struct in storage
pub fn storage_member_offset(struct_no: usize, field: usize, ns: &Namespace) -> BigInt {
    ns.structs[struct_no].fields[..field]
        .iter()
        .map(|f| storage_width(&f.ty, ns))
        .sum()
}

/// Felts a value occupies in a memory slot: inline for value types, a pointer otherwise
pub fn memory_slot_width(ty: &Type) -> BigInt {
    if ty.is_value_type() {
        value_width(ty)
    } else {
        BigInt::one()
    }
}

/// Size of the allocation backing a reference type in memory. For dynamic arrays this is
/// the header only; the elements add `len * memory_slot_width(elem)`.
pub fn memory_allocation_width(ty: &Type, ns: &Namespace) -> BigInt {
    match ty {
        Type::Struct(n) => ns.structs[*n]
            .fields
            .iter()
            .map(|field| memory_slot_width(&field.ty))
            .sum(),
        Type::Array(elem, ArrayLength::Fixed(len)) => len * memory_slot_width(elem),
        Type::Array(_, ArrayLength::Dynamic) | Type::DynamicBytes | Type::String => {
            MEMORY_DYN_ARRAY_HEADER.into()
        }
        _ => memory_slot_width(ty),
    }
}

/// Offset of a struct field from the start of the struct's memory allocation
pub fn memory_member_offset(struct_no: usize, field: usize, ns: &Namespace) -> BigInt {
    ns.structs[struct_no].fields[..field]
        .iter()
        .map(|f| memory_slot_width(&f.ty))
        .sum()
}

/// The structural equivalence key of a type as laid out in storage. Types with the same
/// key have the same physical layout, so their storage routines can be shared: integers
/// of any width below 256 bits all sit in one felt, for example.
pub fn storage_key(ty: &Type, ns: &Namespace) -> String {
    match ty {
        _ if ty.is_value_type() => value_key(ty).to_string(),
        Type::Struct(_) => ty.mangled(ns),
        Type::Array(elem, ArrayLength::Fixed(len)) => format!("A{len}_{}", storage_key(elem, ns)),
        Type::Array(elem, ArrayLength::Dynamic) => format!("D_{}", storage_key(elem, ns)),
        // bytes and string are laid out like bytes1[]
        Type::DynamicBytes | Type::String => "D_felt".to_string(),
        Type::Mapping(key, value) => {
            format!("M_{}_{}", mapping_key(key), storage_key(value, ns))
        }
        _ => unreachable!(),
    }
}

/// Key of a type as laid out in memory. Memory slots only care about widths, except that
/// the allocation of a reference type is shaped by its contents.
pub fn memory_key(ty: &Type, ns: &Namespace) -> String {
    match ty {
        _ if ty.is_value_type() => value_key(ty).to_string(),
        Type::Struct(_) => ty.mangled(ns),
        Type::Array(elem, ArrayLength::Fixed(len)) => format!("A{len}_{}", memory_key(elem, ns)),
        Type::Array(elem, ArrayLength::Dynamic) => format!("D_{}", memory_key(elem, ns)),
        Type::DynamicBytes | Type::String => "D_felt".to_string(),
        Type::Mapping(..) => ty.mangled(ns),
        _ => unreachable!(),
    }
}

fn value_key(ty: &Type) -> &'static str {
    if ty.is_wide() {
        "Uint256"
    } else {
        "felt"
    }
}

/// Mapping keys are hashed, so strings and bytes keys share a layout
fn mapping_key(key: &Type) -> &'static str {
    match key {
        Type::String | Type::DynamicBytes => "bytes",
        _ => value_key(key),
    }
}

/// Bytes a type occupies in the head of an ABI encoding
pub fn abi_head_size(ty: &Type, ns: &Namespace) -> BigInt {
    if ty.is_dynamic(ns) {
        return ABI_WORD.into();
    }

    match ty {
        Type::Struct(n) => ns.structs[*n]
            .fields
            .iter()
            .map(|field| abi_head_size(&field.ty, ns))
            .sum(),
        Type::Array(elem, ArrayLength::Fixed(len)) => len * abi_head_size(elem, ns),
        _ => ABI_WORD.into(),
    }
}

/// Bytes a value type occupies in a packed encoding. Addresses are felts and take a full word.
pub fn abi_packed_size(ty: &Type, ns: &Namespace) -> Option<BigInt> {
    match ty {
        Type::Address => Some(ABI_WORD.into()),
        Type::Bool => Some(BigInt::one()),
        Type::Int(n) | Type::Uint(n) => Some(BigInt::from(n / 8)),
        Type::Bytes(n) => Some(BigInt::from(*n)),
        Type::Enum(_) => Some(BigInt::from(ty.bits(ns) / 8)),
        _ => None,
    }
}

/// Total of the head sizes of a tuple, i.e. where the tail starts
pub fn abi_tuple_head_size(tys: &[Type], ns: &Namespace) -> BigInt {
    tys.iter()
        .map(|ty| abi_head_size(ty, ns))
        .fold(BigInt::zero(), |acc, size| acc + size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Target;
    use pretty_assertions::assert_eq;
    use solang_parser::pt::Loc;

    #[test]
    fn storage_widths() {
        let mut ns = Namespace::new(Target::Starknet);
        let s = ns.add_struct(
            "S",
            Loc::Builtin,
            vec![
                ("a", Type::Uint(8)),
                ("b", Type::Uint(256)),
                ("c", Type::Array(Box::new(Type::Bool), ArrayLength::Dynamic)),
                (
                    "d",
                    Type::Mapping(Box::new(Type::Address), Box::new(Type::Bool)),
                ),
                (
                    "e",
                    Type::Array(Box::new(Type::Int(256)), ArrayLength::Fixed(3.into())),
                ),
            ],
        );

        assert_eq!(storage_width(&Type::Struct(s), &ns), BigInt::from(12));
        assert_eq!(storage_member_offset(s, 0, &ns), BigInt::zero());
        assert_eq!(storage_member_offset(s, 2, &ns), BigInt::from(3));
        assert_eq!(storage_member_offset(s, 3, &ns), BigInt::from(5));
        assert_eq!(storage_member_offset(s, 4, &ns), BigInt::from(6));

        assert_eq!(memory_allocation_width(&Type::Struct(s), &ns), BigInt::from(6));
        assert_eq!(memory_member_offset(s, 4, &ns), BigInt::from(5));
    }

    #[test]
    fn storage_keys_collapse_integer_widths() {
        let ns = Namespace::new(Target::Starknet);

        let a = Type::Array(Box::new(Type::Uint(8)), ArrayLength::Dynamic);
        let b = Type::Array(Box::new(Type::Int(64)), ArrayLength::Dynamic);
        let c = Type::Array(Box::new(Type::Uint(256)), ArrayLength::Dynamic);

        assert_eq!(storage_key(&a, &ns), storage_key(&b, &ns));
        assert_ne!(storage_key(&a, &ns), storage_key(&c, &ns));
        assert_eq!(storage_key(&Type::String, &ns), "D_felt");
    }

    #[test]
    fn abi_sizes() {
        let mut ns = Namespace::new(Target::Starknet);
        let s = ns.add_struct(
            "S",
            Loc::Builtin,
            vec![("a", Type::Uint(8)), ("b", Type::Bytes(32))],
        );

        let fixed = Type::Array(Box::new(Type::Struct(s)), ArrayLength::Fixed(2.into()));

        assert_eq!(abi_head_size(&fixed, &ns), BigInt::from(128));
        assert_eq!(
            abi_tuple_head_size(&[Type::Uint(256), Type::String, fixed], &ns),
            BigInt::from(192)
        );
        assert_eq!(abi_packed_size(&Type::Uint(64), &ns), Some(BigInt::from(8)));
        assert_eq!(abi_packed_size(&Type::String, &ns), None);
    }
}
