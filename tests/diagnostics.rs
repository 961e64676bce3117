// SPDX-License-Identifier: Apache-2.0

use solang_parser::pt::Loc;
use solcairo::sema::ast::{ArrayLength, Diagnostic, Namespace, Note, Type};
use solcairo::utilgen::base::Resolve;
use solcairo::utilgen::Options;
use solcairo::{synthesize, Target};

const MARKET: &str = "contract Market {
    mapping(address => uint256)[] books;
    uint256 total;
}
";

fn span(file_no: usize, needle: &str) -> Loc {
    let start = MARKET.find(needle).unwrap();
    Loc::File(file_no, start, start + needle.len())
}

#[test]
fn unsupported_shapes_point_at_their_source() {
    let mut ns = Namespace::new(Target::Starknet);
    let file_no = ns.add_file("market.sol", MARKET);

    let books = Type::Array(
        Box::new(Type::Mapping(
            Box::new(Type::Address),
            Box::new(Type::Uint(256)),
        )),
        ArrayLength::Dynamic,
    );
    let loc = span(file_no, "mapping(address => uint256)[]");

    let module = synthesize(&mut ns, &Options::default(), |gen, ns| {
        gen.storage.dyn_array_index_access.resolve(&books, &loc, ns)?;
        Ok(())
    });
    assert!(module.is_none());

    let rendered = ns.diagnostics_in_plain(false);

    assert!(rendered.starts_with("error: unsupported type 'mapping(address => uint256)[]'"));
    assert!(rendered.contains("dynamic arrays of mappings cannot be laid out in storage"));
    assert!(rendered.contains("market.sol:2:5"), "{rendered}");
    assert!(rendered.contains("mapping(address => uint256)[] books;"));
}

#[test]
fn notes_and_builtin_locations_are_rendered() {
    let mut ns = Namespace::new(Target::Starknet);
    let file_no = ns.add_file("market.sol", MARKET);

    let mut diagnostic = Diagnostic::unsupported(
        span(file_no, "uint256 total"),
        "unsupported type 'uint256': example".into(),
    );
    diagnostic.notes.push(Note {
        loc: span(file_no, "contract Market"),
        message: "declared in this contract".into(),
    });
    ns.diagnostics.push(diagnostic);
    ns.diagnostics.push(Diagnostic::unsupported(
        Loc::Builtin,
        "unsupported type 'bool': builtin".into(),
    ));

    let rendered = ns.diagnostics_in_plain(false);

    assert!(rendered.contains("market.sol:3:5"), "{rendered}");
    assert!(rendered.contains("declared in this contract"));
    assert!(rendered.contains("error: unsupported type 'bool': builtin"));
    assert_eq!(ns.diagnostics.len(), 2);
    assert!(ns.diagnostics.any_errors());
}
