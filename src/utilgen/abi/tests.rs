// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::cairo::imports::{LIB_INT_CONVERSIONS, LIB_UTILS};
use crate::sema::ast::ArrayLength;
use crate::utilgen::base::{Resolve, UtilGen};
use crate::utilgen::memory::{MemoryReadGen, MemoryWriteGen};
use crate::Target;
use pretty_assertions::assert_eq;
use std::rc::Rc;

fn bool_array() -> Type {
    Type::Array(Box::new(Type::Bool), ArrayLength::Dynamic)
}

fn names(gen: &dyn UtilGen) -> Vec<String> {
    gen.generated_code().iter().map(|f| f.name.clone()).collect()
}

#[test]
fn encode_builds_heads_and_tails() {
    let ns = Namespace::new(Target::Starknet);
    let gen = AbiEncodeGen::new(Rc::new(MemoryReadGen::new()));

    let name = gen
        .resolve(&[Type::Uint(256), bool_array()], &pt::Loc::Builtin, &ns)
        .unwrap();
    assert_eq!(name, "abi_encode0_2_uint256_D_bool");

    assert_eq!(
        names(&gen),
        vec![
            "abi_encode0_2_uint256_D_bool",
            "abi_encode_head_uint256",
            "abi_encode_head_D_bool",
            "abi_encode_tail_D_bool",
            "abi_encode_head_bool",
        ]
    );

    let records = gen.generated_code();
    let main = &records[0].code;
    assert!(main.contains("(param0: Uint256, param1: felt) -> (result_ptr: felt)"));
    assert!(main.contains("let bytes_offset0 = 64;"));
    assert!(main.contains(
        "let (bytes_index2, bytes_offset2) = abi_encode_head_D_bool(bytes_index1, bytes_offset1, bytes_array, 0, param1);"
    ));
    assert!(main.contains("felt_array_to_warp_memory_array(0, bytes_array, 0, mem_ptr, bytes_offset2);"));

    let tail = &records[3].code;
    assert!(tail.contains("let (elem_loc) = wm_index_dyn(mem_ptr, index256, Uint256(1, 0));"));
    assert!(tail.contains("elements_start + length * 32"));

    // a second request with the same shape is a cache hit
    assert_eq!(
        gen.resolve(&[Type::Uint(256), bool_array()], &pt::Loc::Builtin, &ns)
            .unwrap(),
        name
    );
    assert_eq!(gen.generated_code().len(), 5);
}

#[test]
fn small_values_are_widened_to_words() {
    let ns = Namespace::new(Target::Starknet);
    let gen = AbiEncodeGen::new(Rc::new(MemoryReadGen::new()));

    gen.resolve(&[Type::Int(8), Type::Bytes(4)], &pt::Loc::Builtin, &ns)
        .unwrap();

    let records = gen.generated_code();
    assert!(records[1]
        .code
        .contains("let (value256) = warp_int8_to_int256(value);"));
    assert!(records[2]
        .code
        .contains("let (value256) = warp_bytes_widen_256(value, 224);"));
    assert!(gen.required_imports()[LIB_INT_CONVERSIONS].contains("warp_int8_to_int256"));
}

#[test]
fn selector_and_signature_delegate() {
    let ns = Namespace::new(Target::Starknet);
    let encode = Rc::new(AbiEncodeGen::new(Rc::new(MemoryReadGen::new())));
    let with_selector = Rc::new(AbiEncodeWithSelectorGen::new(encode.clone()));
    let with_signature = AbiEncodeWithSignatureGen::new(with_selector.clone());

    let name = with_signature
        .resolve(&[Type::Uint(256)], &pt::Loc::Builtin, &ns)
        .unwrap();

    let code = &with_signature.generated_code()[0].code;
    assert!(code.contains(&format!("func {name}{{bitwise_ptr: BitwiseBuiltin*")));
    assert!(code.contains("let (selector, _) = unsigned_div_rem(signature_hash.high, 2 ** 96);"));
    assert!(code.contains("abi_encode_with_selector0_1_uint256(selector, param0);"));

    let code = &with_selector.generated_code()[0].code;
    assert!(code.contains("fixed_bytes_to_felt_dynamic_array(0, bytes_array, 0, selector, 4);"));
    assert!(code.contains("let bytes_offset0 = 36;"));
    assert!(code.contains("abi_encode_head_uint256(bytes_index0, bytes_offset0, bytes_array, 4, param0);"));

    // the tuple function of abi.encode itself is never requested
    assert_eq!(names(&*encode), vec!["abi_encode_head_uint256"]);
}

#[test]
fn packed_encoding() {
    let mut ns = Namespace::new(Target::Starknet);
    let s = ns.add_struct("S", pt::Loc::Builtin, vec![("a", Type::Bool)]);
    let gen = AbiEncodePackedGen::new(Rc::new(MemoryReadGen::new()));

    gen.resolve(
        &[Type::Uint(16), Type::String, bool_array()],
        &pt::Loc::Builtin,
        &ns,
    )
    .unwrap();

    let code = &gen.generated_code()[0].code;
    assert!(code.contains("fixed_bytes_to_felt_dynamic_array(bytes_index0, bytes_array, 0, param0, 2);"));
    assert!(code.contains("let bytes_index2 = bytes_index1 + length1;"));
    assert!(code.contains(
        "let (bytes_index3) = abi_encode_packed_elems_bool(bytes_index2, bytes_array, 0, length2, param2 + 2);"
    ));

    let err = gen
        .resolve(&[Type::Struct(s)], &pt::Loc::Builtin, &ns)
        .unwrap_err();
    assert_eq!(err.message, "unsupported type 'struct S': structs cannot be packed");

    let nested = Type::Array(Box::new(bool_array()), ArrayLength::Dynamic);
    assert!(gen.resolve(&[nested], &pt::Loc::Builtin, &ns).is_err());
    assert_eq!(gen.generated_code().len(), 2);
}

#[test]
fn decode_reads_heads_and_follows_offsets() {
    let ns = Namespace::new(Target::Starknet);
    let gen = AbiDecodeGen::new(Rc::new(MemoryWriteGen::new()));

    let name = gen
        .resolve(&[Type::Uint(256), bool_array(), Type::Int(8)], &pt::Loc::Builtin, &ns)
        .unwrap();
    assert_eq!(name, "abi_decode0_3_uint256_D_bool_int8");

    let records = gen.generated_code();
    let main = &records[0].code;
    assert!(main.contains("(mem_encoding: felt) -> (result0: Uint256, result1: felt, result2: felt)"));
    assert!(main.contains("let (result1) = abi_decode_D_bool(mem_encoding, 0, 32);"));
    assert!(main.contains("let (result2) = abi_decode_int8(mem_encoding, 0, 64);"));
    assert!(main.contains("return (result0, result1, result2,);"));

    let array = records
        .iter()
        .find(|f| f.name == "abi_decode_D_bool")
        .unwrap();
    assert!(array.code.contains("let data_start = tuple_start + data_offset;"));
    assert!(array.code.contains("abi_decode_D_bool_elems(mem_encoding, data_start + 32, 0, length, result);"));

    let flag = records.iter().find(|f| f.name == "abi_decode_bool").unwrap();
    assert!(flag
        .code
        .contains("byte_array_to_felt_value(mem_encoding, head_index + 31, 1);"));

    let imports = gen.required_imports();
    assert!(imports[LIB_INT_CONVERSIONS].contains("warp_int256_to_int8"));
    assert!(imports[LIB_UTILS].contains("felt_to_uint256"));
}

#[test]
fn oversized_static_arrays_are_rejected() {
    let ns = Namespace::new(Target::Starknet);
    let gen = AbiEncodeGen::new(Rc::new(MemoryReadGen::new()));

    let huge = Type::Array(
        Box::new(Type::Uint(8)),
        ArrayLength::Fixed(BigInt::from(1u8) << 70),
    );

    let err = gen
        .resolve(&[huge], &pt::Loc::Builtin, &ns)
        .unwrap_err();

    assert!(err.message.ends_with(": array too large"), "{}", err.message);
    assert!(gen.generated_code().is_empty());
}
