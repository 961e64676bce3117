// SPDX-License-Identifier: Apache-2.0

//! Encoding and decoding of Solidity values with the Ethereum ABI, following the same sizing
//! rules as the synthesized `abi.encode*` and `abi.decode` routines. Code generation uses it to
//! precompute constant encodings; the tests use it to state what the routines must produce.

use crate::layout::{abi_head_size, abi_packed_size, ABI_WORD};
use crate::sema::ast::{ArrayLength, Namespace, Type};
use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, ToPrimitive};
use tiny_keccak::{Hasher, Keccak};

const WORD: usize = ABI_WORD as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Bool(bool),
    /// Integers, addresses and enum values
    Int(BigInt),
    /// `bytesN`
    FixedBytes(Vec<u8>),
    /// `bytes`
    Bytes(Vec<u8>),
    String(String),
    /// Static and dynamic arrays
    Array(Vec<AbiValue>),
    /// Struct fields in declaration order
    Struct(Vec<AbiValue>),
}

/// The first four bytes of the keccak256 hash of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let mut hasher = Keccak::v256();
    hasher.update(signature.as_bytes());

    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);

    [hash[0], hash[1], hash[2], hash[3]]
}

/// The selector as it is usually written, e.g. `0xa9059cbb`
pub fn selector_hex(signature: &str) -> String {
    format!("0x{}", hex::encode(selector(signature)))
}

/// `abi.encode(values...)`
pub fn encode(tys: &[Type], values: &[AbiValue], ns: &Namespace) -> Result<Vec<u8>, String> {
    if tys.len() != values.len() {
        return Err(format!(
            "{} values given for {} types",
            values.len(),
            tys.len()
        ));
    }

    let members: Vec<(Type, &AbiValue)> = tys.iter().cloned().zip(values).collect();

    encode_tuple(&members, ns)
}

/// `abi.encodeWithSelector(selector, values...)`
pub fn encode_with_selector(
    selector: [u8; 4],
    tys: &[Type],
    values: &[AbiValue],
    ns: &Namespace,
) -> Result<Vec<u8>, String> {
    let mut out = selector.to_vec();
    out.extend(encode(tys, values, ns)?);

    Ok(out)
}

/// `abi.encodeWithSignature(signature, values...)`
pub fn encode_with_signature(
    signature: &str,
    tys: &[Type],
    values: &[AbiValue],
    ns: &Namespace,
) -> Result<Vec<u8>, String> {
    encode_with_selector(selector(signature), tys, values, ns)
}

/// `abi.encodePacked(values...)`: values take their natural size without padding, array
/// elements take a word each
pub fn encode_packed(
    tys: &[Type],
    values: &[AbiValue],
    ns: &Namespace,
) -> Result<Vec<u8>, String> {
    if tys.len() != values.len() {
        return Err(format!(
            "{} values given for {} types",
            values.len(),
            tys.len()
        ));
    }

    let mut out = Vec::new();

    for (ty, value) in tys.iter().zip(values) {
        match (ty, value) {
            _ if ty.is_value_type() => {
                let word = word(ty, value, ns)?;

                match ty {
                    // fixed bytes are left aligned
                    Type::Bytes(n) => out.extend(&word[..*n as usize]),
                    _ => {
                        let size = abi_packed_size(ty, ns)
                            .and_then(|size| size.to_usize())
                            .unwrap_or(WORD);

                        out.extend(&word[WORD - size..]);
                    }
                }
            }
            (Type::String, AbiValue::String(s)) => out.extend(s.as_bytes()),
            (Type::DynamicBytes, AbiValue::Bytes(b)) => out.extend(b),
            (Type::Array(elem, _), AbiValue::Array(_)) if elem.is_value_type() => {
                for (elem, value) in members(ty, value, ns)? {
                    out.extend(word(&elem, value, ns)?);
                }
            }
            (Type::Array(..), _) => {
                return Err(format!(
                    "{}: arrays of reference types cannot be packed",
                    ty.to_string(ns)
                ))
            }
            (Type::Struct(_), _) => {
                return Err(format!("{}: structs cannot be packed", ty.to_string(ns)))
            }
            _ => return Err(mismatch(ty, value, ns)),
        }
    }

    Ok(out)
}

/// `abi.decode(data, (types...))`
pub fn decode(tys: &[Type], data: &[u8], ns: &Namespace) -> Result<Vec<AbiValue>, String> {
    decode_tuple(tys, data, 0, ns)
}

fn mismatch(ty: &Type, value: &AbiValue, ns: &Namespace) -> String {
    format!("value {value:?} does not have type {}", ty.to_string(ns))
}

fn head_size(ty: &Type, ns: &Namespace) -> Result<usize, String> {
    abi_head_size(ty, ns)
        .to_usize()
        .ok_or_else(|| format!("{} is too large to encode", ty.to_string(ns)))
}

/// A non-negative integer as a big endian word
fn uint_word(value: &BigInt) -> Vec<u8> {
    let (_, bytes) = value.to_bytes_be();

    let mut word = vec![0u8; WORD.saturating_sub(bytes.len())];
    word.extend(bytes);

    word
}

fn check_range(ty: &Type, value: &BigInt, ns: &Namespace) -> Result<(), String> {
    let in_range = match ty {
        Type::Int(bits) => {
            let bound = BigInt::one() << (*bits - 1);

            *value >= -&bound && *value < bound
        }
        Type::Enum(n) => {
            !value.is_negative() && *value < BigInt::from(ns.enums[*n].values.len())
        }
        _ => !value.is_negative() && value.bits() <= u64::from(ty.bits(ns)),
    };

    if in_range {
        Ok(())
    } else {
        Err(format!("{value} is out of range for {}", ty.to_string(ns)))
    }
}

/// The 32 byte word of a value type. Signed integers are sign extended, fixed bytes are left
/// aligned.
fn word(ty: &Type, value: &AbiValue, ns: &Namespace) -> Result<Vec<u8>, String> {
    match (ty, value) {
        (Type::Bool, AbiValue::Bool(b)) => Ok(uint_word(&BigInt::from(u8::from(*b)))),
        (Type::Int(_), AbiValue::Int(v)) => {
            check_range(ty, v, ns)?;

            if v.is_negative() {
                Ok(uint_word(&((BigInt::one() << 256) + v)))
            } else {
                Ok(uint_word(v))
            }
        }
        (Type::Uint(_) | Type::Address | Type::Enum(_), AbiValue::Int(v)) => {
            check_range(ty, v, ns)?;

            Ok(uint_word(v))
        }
        (Type::Bytes(n), AbiValue::FixedBytes(b)) if b.len() == *n as usize => {
            let mut word = b.clone();
            word.resize(WORD, 0);

            Ok(word)
        }
        _ => Err(mismatch(ty, value, ns)),
    }
}

/// Struct fields or array elements paired with their values
fn members<'a>(
    ty: &Type,
    value: &'a AbiValue,
    ns: &Namespace,
) -> Result<Vec<(Type, &'a AbiValue)>, String> {
    match (ty, value) {
        (Type::Struct(n), AbiValue::Struct(values))
            if values.len() == ns.structs[*n].fields.len() =>
        {
            Ok(ns.structs[*n]
                .fields
                .iter()
                .map(|f| f.ty.clone())
                .zip(values)
                .collect())
        }
        (Type::Array(elem, ArrayLength::Fixed(len)), AbiValue::Array(values))
            if BigInt::from(values.len()) == *len =>
        {
            Ok(values.iter().map(|v| ((**elem).clone(), v)).collect())
        }
        (Type::Array(elem, ArrayLength::Dynamic), AbiValue::Array(values)) => {
            Ok(values.iter().map(|v| ((**elem).clone(), v)).collect())
        }
        _ => Err(mismatch(ty, value, ns)),
    }
}

/// Heads of all members followed by the tails of the dynamic ones. Offsets are relative to
/// the start of the tuple.
fn encode_tuple(members: &[(Type, &AbiValue)], ns: &Namespace) -> Result<Vec<u8>, String> {
    let mut heads_size = 0;

    for (ty, _) in members {
        heads_size += head_size(ty, ns)?;
    }

    let mut head = Vec::with_capacity(heads_size);
    let mut tail = Vec::new();

    for (ty, value) in members {
        let encoded = encode_value(ty, value, ns)?;

        if ty.is_dynamic(ns) {
            head.extend(uint_word(&BigInt::from(heads_size + tail.len())));
            tail.extend(encoded);
        } else {
            head.extend(encoded);
        }
    }

    head.extend(tail);

    Ok(head)
}

fn padded(bytes: &[u8]) -> Vec<u8> {
    let mut out = uint_word(&BigInt::from(bytes.len()));
    out.extend(bytes);
    out.resize(out.len() + (WORD - bytes.len() % WORD) % WORD, 0);

    out
}

fn encode_value(ty: &Type, value: &AbiValue, ns: &Namespace) -> Result<Vec<u8>, String> {
    match (ty, value) {
        _ if ty.is_value_type() => word(ty, value, ns),
        (Type::String, AbiValue::String(s)) => Ok(padded(s.as_bytes())),
        (Type::DynamicBytes, AbiValue::Bytes(b)) => Ok(padded(b)),
        (Type::Array(_, ArrayLength::Dynamic), _) => {
            let members = members(ty, value, ns)?;

            let mut out = uint_word(&BigInt::from(members.len()));
            out.extend(encode_tuple(&members, ns)?);

            Ok(out)
        }
        (Type::Array(..) | Type::Struct(_), _) => encode_tuple(&members(ty, value, ns)?, ns),
        (Type::Mapping(..), _) => Err(format!(
            "{} cannot be ABI encoded",
            ty.to_string(ns)
        )),
        _ => Err(mismatch(ty, value, ns)),
    }
}

fn read_word(data: &[u8], at: usize) -> Result<&[u8], String> {
    at.checked_add(WORD)
        .and_then(|end| data.get(at..end))
        .ok_or_else(|| format!("encoding too short, no word at offset {at}"))
}

fn read_usize(data: &[u8], at: usize) -> Result<usize, String> {
    BigInt::from_bytes_be(Sign::Plus, read_word(data, at)?)
        .to_usize()
        .ok_or_else(|| format!("offset or length at {at} is too large"))
}

fn decode_tuple(
    tys: &[Type],
    data: &[u8],
    start: usize,
    ns: &Namespace,
) -> Result<Vec<AbiValue>, String> {
    let mut head = start;
    let mut values = Vec::with_capacity(tys.len());

    for ty in tys {
        let value = if ty.is_dynamic(ns) {
            let offset = read_usize(data, head)?;

            decode_value(ty, data, start.saturating_add(offset), ns)?
        } else {
            decode_value(ty, data, head, ns)?
        };

        values.push(value);
        head += head_size(ty, ns)?;
    }

    Ok(values)
}

fn decode_value(ty: &Type, data: &[u8], at: usize, ns: &Namespace) -> Result<AbiValue, String> {
    match ty {
        _ if ty.is_value_type() => decode_word(ty, read_word(data, at)?, ns),
        Type::String | Type::DynamicBytes => {
            let length = read_usize(data, at)?;
            let bytes = (at + WORD)
                .checked_add(length)
                .and_then(|end| data.get(at + WORD..end))
                .ok_or_else(|| format!("encoding too short for {length} bytes at {at}"))?
                .to_vec();

            if matches!(ty, Type::String) {
                String::from_utf8(bytes)
                    .map(AbiValue::String)
                    .map_err(|_| "string is not valid utf-8".to_string())
            } else {
                Ok(AbiValue::Bytes(bytes))
            }
        }
        Type::Array(elem, ArrayLength::Dynamic) => {
            let length = read_usize(data, at)?;

            // every element takes at least one word
            if length > data.len() / WORD {
                return Err(format!("array length {length} exceeds the encoding"));
            }

            let elems = vec![(**elem).clone(); length];

            decode_tuple(&elems, data, at + WORD, ns).map(AbiValue::Array)
        }
        Type::Array(elem, ArrayLength::Fixed(len)) => {
            let length = len
                .to_usize()
                .ok_or_else(|| format!("{} is too large to decode", ty.to_string(ns)))?;
            let elems = vec![(**elem).clone(); length];

            decode_tuple(&elems, data, at, ns).map(AbiValue::Array)
        }
        Type::Struct(n) => {
            let fields: Vec<Type> = ns.structs[*n].fields.iter().map(|f| f.ty.clone()).collect();

            decode_tuple(&fields, data, at, ns).map(AbiValue::Struct)
        }
        _ => Err(format!("{} cannot be ABI decoded", ty.to_string(ns))),
    }
}

fn decode_word(ty: &Type, word: &[u8], ns: &Namespace) -> Result<AbiValue, String> {
    let unsigned = BigInt::from_bytes_be(Sign::Plus, word);

    match ty {
        Type::Bool => match unsigned.to_u8() {
            Some(0) => Ok(AbiValue::Bool(false)),
            Some(1) => Ok(AbiValue::Bool(true)),
            _ => Err(format!("{unsigned} is not a bool")),
        },
        Type::Int(_) => {
            let value = if unsigned.bit(255) {
                unsigned - (BigInt::one() << 256)
            } else {
                unsigned
            };

            check_range(ty, &value, ns)?;

            Ok(AbiValue::Int(value))
        }
        Type::Bytes(n) => {
            let n = *n as usize;

            if word[n..].iter().any(|b| *b != 0) {
                return Err(format!("{} is not left aligned", hex::encode(word)));
            }

            Ok(AbiValue::FixedBytes(word[..n].to_vec()))
        }
        _ => {
            check_range(ty, &unsigned, ns)?;

            Ok(AbiValue::Int(unsigned))
        }
    }
}

impl AbiValue {
    pub fn int(value: impl Into<BigInt>) -> Self {
        AbiValue::Int(value.into())
    }
}

#[cfg(test)]
mod tests;
