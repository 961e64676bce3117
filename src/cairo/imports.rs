// SPDX-License-Identifier: Apache-2.0

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;

/// Cairo module path to the set of symbols imported from it
pub type ImportMap = IndexMap<String, IndexSet<String>>;

/// A single symbol imported from a Cairo module
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Import {
    pub module: &'static str,
    pub symbol: &'static str,
}

impl Import {
    pub const fn new(module: &'static str, symbol: &'static str) -> Self {
        Import { module, symbol }
    }
}

pub const UINT256_MODULE: &str = "starkware.cairo.common.uint256";
pub const BUILTINS_MODULE: &str = "starkware.cairo.common.cairo_builtins";
pub const LIB_MEMORY: &str = "solcairo_lib.memory";
pub const LIB_STORAGE: &str = "solcairo_lib.storage";
pub const LIB_ABI: &str = "solcairo_lib.abi";
pub const LIB_UTILS: &str = "solcairo_lib.maths.utils";
pub const LIB_INT_CONVERSIONS: &str = "solcairo_lib.maths.int_conversions";
pub const LIB_INPUT_CHECKS: &str = "solcairo_lib.external_input_checks";
pub const LIB_BYTES_CONVERSIONS: &str = "solcairo_lib.maths.bytes_conversions";
pub const LIB_ARRAYS: &str = "solcairo_lib.dynamic_arrays_util";

pub const UINT256: Import = Import::new(UINT256_MODULE, "Uint256");
pub const UINT256_ADD: Import = Import::new(UINT256_MODULE, "uint256_add");
pub const UINT256_SUB: Import = Import::new(UINT256_MODULE, "uint256_sub");
pub const UINT256_LT: Import = Import::new(UINT256_MODULE, "uint256_lt");
pub const UINT256_EQ: Import = Import::new(UINT256_MODULE, "uint256_eq");
pub const UINT256_LE: Import = Import::new(UINT256_MODULE, "uint256_le");
pub const HASH_BUILTIN: Import = Import::new(BUILTINS_MODULE, "HashBuiltin");
pub const BITWISE_BUILTIN: Import = Import::new(BUILTINS_MODULE, "BitwiseBuiltin");
pub const DICT_ACCESS: Import = Import::new("starkware.cairo.common.dict_access", "DictAccess");
pub const DICT_WRITE: Import = Import::new("starkware.cairo.common.dict", "dict_write");
pub const ALLOC: Import = Import::new("starkware.cairo.common.alloc", "alloc");
pub const HASH2: Import = Import::new("starkware.cairo.common.hash", "hash2");
pub const IS_LE_FELT: Import = Import::new("starkware.cairo.common.math_cmp", "is_le_felt");
pub const UNSIGNED_DIV_REM: Import = Import::new("starkware.cairo.common.math", "unsigned_div_rem");

pub const WARP_STORAGE: Import = Import::new(LIB_STORAGE, "WARP_STORAGE");
pub const WARP_USED_STORAGE: Import = Import::new(LIB_STORAGE, "WARP_USED_STORAGE");

pub const WM_READ_FELT: Import = Import::new(LIB_MEMORY, "wm_read_felt");
pub const WM_READ_256: Import = Import::new(LIB_MEMORY, "wm_read_256");
pub const WM_WRITE_FELT: Import = Import::new(LIB_MEMORY, "wm_write_felt");
pub const WM_WRITE_256: Import = Import::new(LIB_MEMORY, "wm_write_256");
pub const WM_ALLOC: Import = Import::new(LIB_MEMORY, "wm_alloc");
pub const WM_NEW: Import = Import::new(LIB_MEMORY, "wm_new");
pub const WM_DYN_ARRAY_LENGTH: Import = Import::new(LIB_MEMORY, "wm_dyn_array_length");
pub const WM_INDEX_DYN: Import = Import::new(LIB_MEMORY, "wm_index_dyn");
pub const WM_INDEX_STATIC: Import = Import::new(LIB_MEMORY, "wm_index_static");

pub const FELT_TO_UINT256: Import = Import::new(LIB_UTILS, "felt_to_uint256");
pub const NARROW_SAFE: Import = Import::new(LIB_UTILS, "narrow_safe");
pub const STRING_HASH: Import = Import::new("solcairo_lib.string_hash", "string_hash");
pub const WARP_KECCAK: Import = Import::new("solcairo_lib.keccak", "warp_keccak");

pub const FIXED_BYTES256_TO_FELT_DYNAMIC_ARRAY: Import =
    Import::new(LIB_ABI, "fixed_bytes256_to_felt_dynamic_array");
pub const FIXED_BYTES_TO_FELT_DYNAMIC_ARRAY: Import =
    Import::new(LIB_ABI, "fixed_bytes_to_felt_dynamic_array");
pub const FELT_ARRAY_TO_WARP_MEMORY_ARRAY: Import =
    Import::new(LIB_ABI, "felt_array_to_warp_memory_array");
pub const BYTE_ARRAY_TO_FELT_VALUE: Import = Import::new(LIB_ABI, "byte_array_to_felt_value");
pub const BYTE_ARRAY_TO_UINT256_VALUE: Import =
    Import::new(LIB_ABI, "byte_array_to_uint256_value");
pub const BYTES_TO_FELT_DYNAMIC_ARRAY: Import = Import::new(LIB_ABI, "bytes_to_felt_dynamic_array");
pub const BYTES_TO_FELT_DYNAMIC_ARRAY_PADDED: Import =
    Import::new(LIB_ABI, "bytes_to_felt_dynamic_array_padded");
pub const MEMORY_BYTES_FROM_ENCODING: Import = Import::new(LIB_ABI, "memory_bytes_from_encoding");

pub const DYNAMIC_ARRAY_COPY_FELT: Import = Import::new(LIB_ARRAYS, "dynamic_array_copy_felt");
pub const FIXED_BYTES_TO_DYNAMIC_ARRAY: Import =
    Import::new(LIB_ARRAYS, "fixed_bytes_to_dynamic_array");
pub const FIXED_BYTES256_TO_DYNAMIC_ARRAY: Import =
    Import::new(LIB_ARRAYS, "fixed_bytes256_to_dynamic_array");

pub fn add_import(map: &mut ImportMap, import: Import) {
    add_symbol(map, import.module, import.symbol);
}

/// Add a symbol whose name is only known at synthesis time, e.g. a width specific helper
pub fn add_symbol(map: &mut ImportMap, module: &str, symbol: &str) {
    map.entry(module.to_owned())
        .or_default()
        .insert(symbol.to_owned());
}

/// Union of import maps. A symbol required by several maps is imported once.
pub fn merge_imports<'a>(maps: impl IntoIterator<Item = &'a ImportMap>) -> ImportMap {
    let mut merged = ImportMap::new();

    for map in maps {
        for (module, symbols) in map {
            merged
                .entry(module.clone())
                .or_default()
                .extend(symbols.iter().cloned());
        }
    }

    merged
}

/// Render `from module import a, b` lines, modules and symbols sorted
pub fn format_imports(map: &ImportMap) -> String {
    map.iter()
        .filter(|(_, symbols)| !symbols.is_empty())
        .sorted_by(|a, b| a.0.cmp(b.0))
        .map(|(module, symbols)| {
            format!(
                "from {} import {}",
                module,
                symbols.iter().sorted().join(", ")
            )
        })
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge_collapses_duplicates() {
        let mut a = ImportMap::new();
        add_import(&mut a, UINT256);
        add_import(&mut a, WARP_STORAGE);

        let mut b = ImportMap::new();
        add_import(&mut b, UINT256);
        add_import(&mut b, UINT256_ADD);
        add_import(&mut b, UINT256);

        let merged = merge_imports([&a, &b]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[UINT256_MODULE].len(), 2);

        assert_eq!(
            format_imports(&merged),
            "from solcairo_lib.storage import WARP_STORAGE\n\
             from starkware.cairo.common.uint256 import Uint256, uint256_add"
        );
    }

    #[test]
    fn merge_is_order_insensitive() {
        let mut a = ImportMap::new();
        add_import(&mut a, ALLOC);
        add_symbol(&mut a, LIB_INT_CONVERSIONS, "warp_int8_to_int16");

        let mut b = ImportMap::new();
        add_import(&mut b, HASH2);
        add_import(&mut b, ALLOC);

        assert_eq!(
            format_imports(&merge_imports([&a, &b])),
            format_imports(&merge_imports([&b, &a]))
        );
    }
}
