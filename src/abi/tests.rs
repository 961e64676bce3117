// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::Target;
use pretty_assertions::assert_eq;
use solang_parser::pt::Loc;

fn words(hex_words: &[&str]) -> Vec<u8> {
    hex_words
        .iter()
        .flat_map(|w| hex::decode(format!("{w:0>64}")).unwrap())
        .collect()
}

#[test]
fn well_known_selectors() {
    assert_eq!(selector_hex("transfer(address,uint256)"), "0xa9059cbb");
    assert_eq!(selector_hex("balanceOf(address)"), "0x70a08231");
}

#[test]
fn uint_and_bool_array_round_trip() {
    let ns = Namespace::new(Target::Starknet);
    let tys = [
        Type::Uint(256),
        Type::Array(Box::new(Type::Bool), ArrayLength::Dynamic),
    ];
    let values = [
        AbiValue::int(5),
        AbiValue::Array(vec![AbiValue::Bool(true), AbiValue::Bool(false)]),
    ];

    let encoded = encode(&tys, &values, &ns).unwrap();
    assert_eq!(encoded, words(&["5", "40", "2", "1", "0"]));

    assert_eq!(decode(&tys, &encoded, &ns).unwrap(), values);
}

#[test]
fn nested_dynamic_values_round_trip() {
    let mut ns = Namespace::new(Target::Starknet);
    let s = ns.add_struct(
        "Entry",
        Loc::Builtin,
        vec![("id", Type::Int(16)), ("name", Type::String)],
    );
    let tys = [
        Type::Array(Box::new(Type::Struct(s)), ArrayLength::Dynamic),
        Type::Bytes(4),
        Type::Array(Box::new(Type::Uint(8)), ArrayLength::Fixed(2.into())),
    ];
    let values = [
        AbiValue::Array(vec![
            AbiValue::Struct(vec![AbiValue::int(-3), AbiValue::String("alpha".into())]),
            AbiValue::Struct(vec![AbiValue::int(700), AbiValue::String(String::new())]),
        ]),
        AbiValue::FixedBytes(vec![0xde, 0xad, 0xbe, 0xef]),
        AbiValue::Array(vec![AbiValue::int(1), AbiValue::int(255)]),
    ];

    let encoded = encode(&tys, &values, &ns).unwrap();

    // heads: offset, bytes4, two inline uint8 words
    assert_eq!(&encoded[..32], &words(&["80"])[..]);
    let mut bytes4 = vec![0xde, 0xad, 0xbe, 0xef];
    bytes4.resize(32, 0);
    assert_eq!(&encoded[32..64], &bytes4[..]);

    assert_eq!(decode(&tys, &encoded, &ns).unwrap(), values);
}

#[test]
fn negative_integers_are_sign_extended() {
    let ns = Namespace::new(Target::Starknet);

    let encoded = encode(&[Type::Int(8)], &[AbiValue::int(-1)], &ns).unwrap();
    assert_eq!(encoded, vec![0xff; 32]);

    assert_eq!(
        decode(&[Type::Int(8)], &encoded, &ns).unwrap(),
        vec![AbiValue::int(-1)]
    );

    // -129 does not fit
    let mut bad = encoded;
    bad[31] = 0x7f;
    assert!(decode(&[Type::Int(8)], &bad, &ns).is_err());
}

#[test]
fn values_out_of_range_are_rejected() {
    let mut ns = Namespace::new(Target::Starknet);
    let e = ns.add_enum("Side", Loc::Builtin, &["Buy", "Sell"]);

    assert!(encode(&[Type::Uint(8)], &[AbiValue::int(256)], &ns).is_err());
    assert!(encode(&[Type::Enum(e)], &[AbiValue::int(2)], &ns).is_err());
    assert!(encode(&[Type::Bool], &[AbiValue::int(1)], &ns).is_err());
    assert!(decode(&[Type::Uint(8)], &words(&["100"]), &ns).is_err());
    assert!(decode(&[Type::Bool], &words(&["2"]), &ns).is_err());
    assert!(decode(&[Type::Uint(256)], &[0u8; 31], &ns).is_err());
}

#[test]
fn packed_encoding() {
    let mut ns = Namespace::new(Target::Starknet);
    let s = ns.add_struct("S", Loc::Builtin, vec![("a", Type::Bool)]);

    let tys = [
        Type::Uint(16),
        Type::String,
        Type::Array(Box::new(Type::Bool), ArrayLength::Dynamic),
        Type::Int(8),
    ];
    let values = [
        AbiValue::int(0x1234),
        AbiValue::String("hi".into()),
        AbiValue::Array(vec![AbiValue::Bool(true)]),
        AbiValue::int(-2),
    ];

    let mut expected = vec![0x12, 0x34, b'h', b'i'];
    expected.extend(words(&["1"]));
    expected.push(0xfe);

    assert_eq!(encode_packed(&tys, &values, &ns).unwrap(), expected);

    assert_eq!(
        encode_packed(
            &[Type::Struct(s)],
            &[AbiValue::Struct(vec![AbiValue::Bool(true)])],
            &ns
        )
        .unwrap_err(),
        "struct S: structs cannot be packed"
    );
}

#[test]
fn selector_prefix() {
    let ns = Namespace::new(Target::Starknet);

    let encoded = encode_with_signature(
        "transfer(address,uint256)",
        &[Type::Address, Type::Uint(256)],
        &[AbiValue::int(0xabcd), AbiValue::int(10)],
        &ns,
    )
    .unwrap();

    assert_eq!(encoded.len(), 68);
    assert_eq!(&encoded[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
    assert_eq!(&encoded[4..], &words(&["abcd", "a"])[..]);
}
