// SPDX-License-Identifier: Apache-2.0

use petgraph::algo::toposort;
use pretty_assertions::{assert_eq, assert_ne};
use std::collections::HashSet;
use solang_parser::pt::Loc;
use solcairo::sema::ast::{ArrayLength, DataLocation, Namespace, Type};
use solcairo::utilgen::base::{FragmentKind, Resolve, UtilGen};
use solcairo::utilgen::storage::PushArg;
use solcairo::utilgen::{CairoUtilFuncGen, Options};
use solcairo::{synthesize, Target};

fn dyn_array(elem: Type) -> Type {
    Type::Array(Box::new(elem), ArrayLength::Dynamic)
}

#[test]
fn storage_read_is_memoized() {
    let ns = Namespace::new(Target::Starknet);
    let gen = CairoUtilFuncGen::new(&Options::default());

    let first = gen.storage.read.resolve(&Type::Uint(8), &Loc::Builtin, &ns).unwrap();
    let second = gen.storage.read.resolve(&Type::Uint(8), &Loc::Builtin, &ns).unwrap();

    assert_eq!(first, second);
    assert_eq!(gen.storage.read.generated_code().len(), 1);

    // same physical shape, same routine
    let third = gen.storage.read.resolve(&Type::Bool, &Loc::Builtin, &ns).unwrap();
    assert_eq!(first, third);
    assert_eq!(gen.storage.read.generated_code().len(), 1);
}

#[test]
fn unused_generators_contribute_nothing() {
    let mut ns = Namespace::new(Target::Starknet);

    let module = synthesize(&mut ns, &Options::default(), |gen, ns| {
        gen.memory.read.resolve(&Type::Uint(256), &Loc::Builtin, ns)?;
        Ok(())
    })
    .unwrap();

    // memory reads are library routines
    assert_eq!(module.code, "");
    assert_eq!(module.imports.len(), 1);
    assert_eq!(
        module.render(),
        "from solcairo_lib.memory import wm_read_256"
    );
}

#[test]
fn wiring_is_acyclic() {
    let gen = CairoUtilFuncGen::new(&Options::default());
    let graph = gen.dependency_graph();

    let order = toposort(graph, None).expect("dependency cycle");
    assert_eq!(order.len(), gen.generators().len());

    // every generator is constructed after the generators it depends on
    let constructed: Vec<_> = gen.generators().iter().map(|g| g.path()).collect();
    for g in gen.generators() {
        let at = constructed.iter().position(|p| *p == g.path()).unwrap();
        for dep in g.dependencies() {
            let dep_at = constructed.iter().position(|p| *p == dep).unwrap();
            assert!(dep_at < at, "{} constructed before {dep}", g.path());
        }
    }
}

#[test]
fn struct_definitions_precede_functions() {
    let mut ns = Namespace::new(Target::Starknet);
    let s = ns.add_struct(
        "Point",
        Loc::Builtin,
        vec![("x", Type::Uint(256)), ("ys", dyn_array(Type::Uint(8)))],
    );

    let gen = CairoUtilFuncGen::new(&Options::default());

    gen.memory
        .to_calldata
        .resolve(&Type::Struct(s), &Loc::Builtin, &ns)
        .unwrap();
    gen.utils
        .encode_as_felt
        .resolve(&[Type::Struct(s), Type::String], &Loc::Builtin, &ns)
        .unwrap();
    gen.storage
        .to_calldata
        .resolve(&dyn_array(Type::Int(32)), &Loc::Builtin, &ns)
        .unwrap();

    let records: Vec<_> = gen
        .generators()
        .iter()
        .flat_map(|g| g.generated_code())
        .collect();
    let types = records
        .iter()
        .filter(|f| f.kind == FragmentKind::TypeDefinition)
        .count();
    assert_eq!(types, 1);

    let code = gen.emit();
    let fragments: Vec<_> = code.split("\n\n").collect();
    assert!(fragments[0].starts_with("struct cd_dynarray_felt {"));
    assert!(fragments[1..].iter().all(|f| !f.starts_with("struct ")));
}

#[test]
fn push_and_length_share_the_layout() {
    let ns = Namespace::new(Target::Starknet);
    let gen = CairoUtilFuncGen::new(&Options::default());

    let array = dyn_array(Type::Uint(256));

    let push = gen
        .storage
        .dyn_array_push
        .with_arg
        .resolve(
            &PushArg {
                array: array.clone(),
                value: Type::Uint(256),
                location: DataLocation::Memory,
            },
            &Loc::Builtin,
            &ns,
        )
        .unwrap();
    let length = gen
        .storage
        .dyn_array_length
        .resolve(&array, &Loc::Builtin, &ns)
        .unwrap();

    assert_eq!(length, "WARP_DARRAY0_Uint256_LENGTH");
    assert_eq!(gen.storage.dyn_array().generated_code().len(), 1);
    assert!(gen.storage.dyn_array_length.is_used());
    assert!(gen.storage.dyn_array_length.generated_code().is_empty());

    let push_code = &gen.storage.dyn_array_push.with_arg.generated_code()[0].code;
    assert!(push_code.contains(&format!("func {push}{{")));
    assert!(push_code.contains(&format!("let (len) = {length}(loc);")));
    assert!(push_code.contains("WARP_DARRAY0_Uint256_SET_LENGTH(loc, new_len);"));
    assert!(push_code.contains("let (elem_loc) = WARP_DARRAY0_Uint256_IDX(loc, len);"));
}

#[test]
fn mappings_in_dynamic_arrays_abort_synthesis() {
    let mut ns = Namespace::new(Target::Starknet);
    let mapping = Type::Mapping(Box::new(Type::Address), Box::new(Type::Uint(256)));

    let module = synthesize(&mut ns, &Options::default(), |gen, ns| {
        gen.storage.read.resolve(&Type::Uint(256), &Loc::Builtin, ns)?;
        gen.storage
            .dyn_array_index_access
            .resolve(&dyn_array(mapping.clone()), &Loc::Builtin, ns)?;
        Ok(())
    });

    assert!(module.is_none());
    assert!(ns.diagnostics.any_errors());
    assert_eq!(ns.diagnostics.len(), 1);
    assert!(ns
        .diagnostics
        .first_error()
        .contains("dynamic arrays of mappings cannot be laid out in storage"));
}

#[test]
fn runs_do_not_share_caches() {
    let ns = Namespace::new(Target::Starknet);

    let names: Vec<_> = (0..2)
        .map(|_| {
            let gen = CairoUtilFuncGen::new(&Options::default());
            gen.storage.write.resolve(&Type::Address, &Loc::Builtin, &ns).unwrap();
            gen.storage.write.resolve(&Type::Uint(256), &Loc::Builtin, &ns).unwrap()
        })
        .collect();

    assert_eq!(names[0], names[1]);
    assert_eq!(names[0], "WS_WRITE1_Uint256");
}

#[test]
fn pushes_onto_arrays_of_different_widths_are_distinct() {
    let ns = Namespace::new(Target::Starknet);
    let gen = CairoUtilFuncGen::new(&Options::default());

    let push = |elem: Type| {
        gen.storage
            .dyn_array_push
            .with_arg
            .resolve(
                &PushArg {
                    array: dyn_array(elem),
                    value: Type::Int(8),
                    location: DataLocation::Memory,
                },
                &Loc::Builtin,
                &ns,
            )
            .unwrap()
    };

    let onto_int16 = push(Type::Int(16));
    let onto_int32 = push(Type::Int(32));
    assert_ne!(onto_int16, onto_int32);
    assert_eq!(onto_int16, push(Type::Int(16)));

    let records = gen.storage.dyn_array_push.with_arg.generated_code();
    assert_eq!(records.len(), 2);
    assert!(records[0]
        .code
        .contains("let (converted) = warp_int8_to_int16(value);"));
    assert!(records[1]
        .code
        .contains("let (converted) = warp_int8_to_int32(value);"));
    assert!(!records[1].code.contains("warp_int8_to_int16"));
}

#[test]
fn width_sign_and_contract_select_distinct_routines() {
    let mut ns = Namespace::new(Target::Starknet);

    // A.B_C and A_B.C
    let first = ns.add_struct("B_C", Loc::Builtin, vec![("x", Type::Uint(8))]);
    ns.structs[first].contract = Some("A".into());
    let second = ns.add_struct("C", Loc::Builtin, vec![("x", Type::Uint(8))]);
    ns.structs[second].contract = Some("A_B".into());

    let gen = CairoUtilFuncGen::new(&Options::default());
    let sources = [Type::Int(8), Type::Uint(8), Type::Int(8)];
    let targets = [Type::Int(16), Type::Uint(16), Type::Int(32)];

    let conversions: HashSet<_> = sources
        .iter()
        .zip(&targets)
        .map(|(from, to)| {
            gen.memory
                .convert
                .resolve(&(dyn_array(from.clone()), dyn_array(to.clone())), &Loc::Builtin, &ns)
                .unwrap()
        })
        .collect();
    assert_eq!(conversions.len(), 3);

    let encoders: HashSet<_> = targets
        .iter()
        .chain([&Type::Struct(first), &Type::Struct(second)])
        .map(|ty| {
            gen.abi
                .encode
                .resolve(&[dyn_array(ty.clone())], &Loc::Builtin, &ns)
                .unwrap()
        })
        .collect();
    assert_eq!(encoders.len(), 5);

    let copies: HashSet<_> = [first, second]
        .into_iter()
        .map(|n| {
            gen.storage
                .to_memory
                .resolve(&Type::Struct(n), &Loc::Builtin, &ns)
                .unwrap()
        })
        .collect();
    assert_eq!(copies.len(), 2);

    // storage cells of a value type only depend on its width
    assert_eq!(
        gen.storage.read.resolve(&Type::Int(16), &Loc::Builtin, &ns).unwrap(),
        gen.storage.read.resolve(&Type::Uint(32), &Loc::Builtin, &ns).unwrap()
    );

    let checks: Vec<_> = [first, second]
        .into_iter()
        .map(|n| {
            gen.bound_checks
                .input_check
                .resolve(&Type::Struct(n), &Loc::Builtin, &ns)
                .unwrap()
        })
        .collect();
    assert_ne!(checks[0], checks[1]);

    let emitted = gen.emit();
    assert!(emitted.contains("(arg: A_B_C_1) {"));
    assert!(emitted.contains("(arg: A_B_C_3) {"));
}
