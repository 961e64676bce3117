// SPDX-License-Identifier: Apache-2.0

use pretty_assertions::assert_eq;
use solang_parser::pt::Loc;
use solcairo::layout::ArrayLayout;
use solcairo::sema::ast::{ArrayLength, Namespace, Type};
use solcairo::utilgen::base::Resolve;
use solcairo::utilgen::Options;
use solcairo::{synthesize, Configuration, Target};

#[test]
fn defaults() {
    let config = Configuration::from_toml("").unwrap();

    assert_eq!(config.target, Target::Starknet);
    assert!(config.options.bounds_checks);
    assert_eq!(config.target.array_layout(), ArrayLayout::Strided);
}

#[test]
fn full_configuration() {
    let config = Configuration::from_toml(
        r#"
target = "starknet_indexed"

[options]
bounds_checks = false
"#,
    )
    .unwrap();

    assert_eq!(
        config,
        Configuration {
            target: Target::StarknetIndexed,
            options: Options {
                bounds_checks: false
            },
        }
    );
    assert_eq!(config.target.to_string(), "starknet_indexed");
    assert_eq!(Target::from("starknet_indexed"), Some(config.target));
}

#[test]
fn unknown_keys_are_rejected() {
    let err = Configuration::from_toml("target = \"solana\"").unwrap_err();
    assert!(err.starts_with("invalid configuration"));

    assert!(Configuration::from_toml("[options]\noverflow_checks = true").is_err());
}

#[test]
fn bounds_checks_can_be_turned_off() {
    let config = Configuration::from_toml("[options]\nbounds_checks = false").unwrap();
    let mut ns = Namespace::new(config.target);

    let array = Type::Array(Box::new(Type::Uint(8)), ArrayLength::Dynamic);

    let module = synthesize(&mut ns, &config.options, |gen, ns| {
        let index = gen
            .storage
            .dyn_array_index_access
            .resolve(&array, &Loc::Builtin, ns)?;

        // the layout's element routine is used directly
        assert_eq!(index, "WARP_DARRAY0_felt_IDX");

        Ok(())
    })
    .unwrap();

    assert!(!module.code.contains("uint256_lt"));
    assert!(module.render().starts_with("from "));
}
