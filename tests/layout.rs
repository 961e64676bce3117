// SPDX-License-Identifier: Apache-2.0

use num_bigint::BigInt;
use pretty_assertions::assert_eq;
use solang_parser::pt::Loc;
use solcairo::layout::machine::{hash2, FeltMachine};
use solcairo::layout::{storage_member_offset, storage_width, ArrayLayout};
use solcairo::sema::ast::{ArrayLength, Namespace, Type};
use solcairo::utilgen::base::{Resolve, UtilGen};
use solcairo::utilgen::{CairoUtilFuncGen, Options};
use solcairo::Target;

/// struct Leg { int64 price; uint256 size; }
/// struct Order { address owner; Leg[] legs; string memo; }
fn order(target: Target) -> (Namespace, Type, Type) {
    let mut ns = Namespace::new(target);

    let leg = ns.add_struct(
        "Leg",
        Loc::Builtin,
        vec![("price", Type::Int(64)), ("size", Type::Uint(256))],
    );
    let order = ns.add_struct(
        "Order",
        Loc::Builtin,
        vec![
            ("owner", Type::Address),
            (
                "legs",
                Type::Array(Box::new(Type::Struct(leg)), ArrayLength::Dynamic),
            ),
            ("memo", Type::String),
        ],
    );

    (ns, Type::Struct(order), Type::Struct(leg))
}

#[test]
fn copies_address_elements_through_one_layout() {
    for target in [Target::Starknet, Target::StarknetIndexed] {
        let (ns, order, _) = order(target);
        let gen = CairoUtilFuncGen::new(&Options::default());

        gen.storage.to_memory.resolve(&order, &Loc::Builtin, &ns).unwrap();
        gen.memory.to_storage.resolve(&order, &Loc::Builtin, &ns).unwrap();
        gen.storage.delete.resolve(&order, &Loc::Builtin, &ns).unwrap();

        // one set of routines for Leg[] and one for string
        assert_eq!(gen.storage.dyn_array().generated_code().len(), 2, "{target}");

        let code = gen.emit();
        assert!(code.contains("WARP_DARRAY0_S3Leg_IDX"), "{target}");
        assert!(code.contains("WARP_DARRAY1_felt_LENGTH"), "{target}");
    }
}

#[test]
fn storage_memory_storage_is_the_identity() {
    for layout in [ArrayLayout::Strided, ArrayLayout::Indexed] {
        let (ns, order, leg) = order(Target::Starknet);

        let loc = BigInt::from(100);
        let used = &loc + storage_width(&order, &ns) - 1;
        let mut machine = FeltMachine::new(&ns, layout).with_used_storage(used);

        let Type::Struct(order_no) = &order else {
            unreachable!()
        };
        let legs = &loc + storage_member_offset(*order_no, 1, &ns);
        let memo = &loc + storage_member_offset(*order_no, 2, &ns);

        machine.write_value(&Type::Address, &loc, &BigInt::from(0xbeef));
        machine.set_dyn_array_length(&leg, &legs, &BigInt::from(2));

        for i in 0..2u64 {
            let at = machine.dyn_array_element(&leg, &legs, &BigInt::from(i));
            machine.write_value(&Type::Int(64), &at, &BigInt::from(i * 7 + 1));
            machine.write_value(&Type::Uint(256), &(&at + 1), &(BigInt::from(i) << 130));
        }

        machine.set_dyn_array_length(&Type::Bytes(1), &memo, &BigInt::from(1));
        let first = machine.dyn_array_element(&Type::Bytes(1), &memo, &BigInt::from(0));
        machine.write_cell(&first, BigInt::from(b'x'));

        let before = machine.storage().clone();

        let ptr = machine.storage_to_memory(&order, &loc).unwrap();
        machine.storage_delete(&order, &loc);
        machine.memory_to_storage(&order, &ptr, &loc).unwrap();

        assert_eq!(&before, machine.storage(), "{layout}");
    }
}

#[test]
fn strided_addresses_match_the_generated_index_routine() {
    let (ns, _, leg) = order(Target::Starknet);
    let gen = CairoUtilFuncGen::new(&Options::default());

    let fns = gen.storage.dyn_array().layout(&leg, &Loc::Builtin, &ns).unwrap();
    let width = storage_width(&leg, &ns);
    assert_eq!(fns.elem_width, width);

    let code = &gen.storage.dyn_array().generated_code()[0].code;
    assert!(code.contains("let (base) = hash2{hash_ptr=pedersen_ptr}(loc, 0);"));
    assert!(code.contains(&format!(
        "return (base + (index.low + index.high * 2 ** 128) * {width},);"
    )));

    let mut machine = FeltMachine::new(&ns, ArrayLayout::Strided);
    let loc = BigInt::from(40);
    for i in 0..3u64 {
        assert_eq!(
            machine.dyn_array_element(&leg, &loc, &BigInt::from(i)),
            hash2(&loc, &BigInt::from(0)) + &width * i
        );
    }
}

#[test]
fn indexed_addresses_match_the_generated_allocator() {
    let (ns, _, leg) = order(Target::StarknetIndexed);
    let gen = CairoUtilFuncGen::new(&Options::default());

    gen.storage.dyn_array().layout(&leg, &Loc::Builtin, &ns).unwrap();
    let width = storage_width(&leg, &ns);

    let code = &gen.storage.dyn_array().generated_code()[0].code;
    assert!(code.contains("let (used) = WARP_USED_STORAGE.read();"));
    assert!(code.contains("let res_loc = used + 1;"));
    assert!(code.contains(&format!("WARP_USED_STORAGE.write(used + {width});")));

    // a fresh counter still never hands out location 0
    let mut machine = FeltMachine::new(&ns, ArrayLayout::Indexed);
    let loc = BigInt::from(0);
    let first = machine.dyn_array_element(&leg, &loc, &BigInt::from(0));
    assert_eq!(first, BigInt::from(1));

    let used = BigInt::from(9);
    let mut machine = FeltMachine::new(&ns, ArrayLayout::Indexed).with_used_storage(used.clone());
    let first = machine.dyn_array_element(&leg, &loc, &BigInt::from(0));
    let second = machine.dyn_array_element(&leg, &loc, &BigInt::from(1));

    assert_eq!(first, &used + 1);
    assert_eq!(second, &first + &width);
    assert_eq!(machine.used_storage(), &(&used + &width * 2));
}
