// SPDX-License-Identifier: Apache-2.0

//! The target side: Cairo types, import bookkeeping and the pieces of Cairo
//! syntax shared by all generated routines.

pub mod imports;
pub mod types;

use imports::{Import, BITWISE_BUILTIN, DICT_ACCESS, HASH_BUILTIN};

/// The implicit arguments a generated function takes
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Implicits {
    None,
    RangeCheck,
    Storage,
    Memory,
    StorageMemory,
    /// ABI encoding and decoding need the bitwise builtin besides memory
    Bitwise,
    /// Bitwise plus the keccak builtin, for hashing signatures
    BitwiseKeccak,
}

impl Implicits {
    pub fn signature(&self) -> &'static str {
        match self {
            Implicits::None => "",
            Implicits::RangeCheck => "{range_check_ptr: felt}",
            Implicits::Storage => {
                "{syscall_ptr: felt*, pedersen_ptr: HashBuiltin*, range_check_ptr: felt}"
            }
            Implicits::Memory => "{range_check_ptr: felt, warp_memory: DictAccess*}",
            Implicits::StorageMemory => {
                "{syscall_ptr: felt*, pedersen_ptr: HashBuiltin*, range_check_ptr: felt, warp_memory: DictAccess*}"
            }
            Implicits::Bitwise => {
                "{bitwise_ptr: BitwiseBuiltin*, range_check_ptr: felt, warp_memory: DictAccess*}"
            }
            Implicits::BitwiseKeccak => {
                "{bitwise_ptr: BitwiseBuiltin*, range_check_ptr: felt, warp_memory: DictAccess*, keccak_ptr: felt*}"
            }
        }
    }

    pub fn imports(&self) -> &'static [Import] {
        match self {
            Implicits::None | Implicits::RangeCheck => &[],
            Implicits::Storage => &[HASH_BUILTIN],
            Implicits::Memory => &[DICT_ACCESS],
            Implicits::StorageMemory => &[HASH_BUILTIN, DICT_ACCESS],
            Implicits::Bitwise | Implicits::BitwiseKeccak => &[BITWISE_BUILTIN, DICT_ACCESS],
        }
    }
}

/// Render a Cairo function. Each body entry may span several lines; all are indented.
pub fn function(
    name: &str,
    implicits: Implicits,
    params: &str,
    returns: &str,
    body: &[String],
) -> String {
    let mut out = format!("func {name}{}({params})", implicits.signature());

    if !returns.is_empty() {
        out.push_str(&format!(" -> ({returns})"));
    }

    out.push_str(" {\n    alloc_locals;\n");

    for line in body.iter().flat_map(|stmt| stmt.lines()) {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
    }

    out.push('}');

    out
}

/// Render a Cairo struct definition
pub fn struct_def(name: &str, members: &[(String, String)]) -> String {
    let mut out = format!("struct {name} {{\n");

    for (member, ty) in members {
        out.push_str(&format!("    {member}: {ty},\n"));
    }

    out.push('}');

    out
}

/// A `@storage_var` declaration
pub fn storage_var(name: &str, params: &str, returns: &str) -> String {
    format!("@storage_var\nfunc {name}({params}) -> ({returns}) {{\n}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn render_function() {
        let code = function(
            "WS0_READ_felt",
            Implicits::Storage,
            "loc: felt",
            "val: felt",
            &[
                "let (read0) = WARP_STORAGE.read(loc);".to_string(),
                "return (read0,);".to_string(),
            ],
        );

        assert_eq!(
            code,
            "func WS0_READ_felt{syscall_ptr: felt*, pedersen_ptr: HashBuiltin*, range_check_ptr: felt}(loc: felt) -> (val: felt) {\n    \
             alloc_locals;\n    \
             let (read0) = WARP_STORAGE.read(loc);\n    \
             return (read0,);\n\
             }"
        );
    }

    #[test]
    fn render_struct() {
        assert_eq!(
            struct_def(
                "cd_dynarray_felt",
                &[
                    ("len".to_string(), "felt".to_string()),
                    ("ptr".to_string(), "felt*".to_string())
                ]
            ),
            "struct cd_dynarray_felt {\n    len: felt,\n    ptr: felt*,\n}"
        );
    }
}
