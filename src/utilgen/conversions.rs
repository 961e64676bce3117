// SPDX-License-Identifier: Apache-2.0

//! Implicit conversions between value types, shared by the generators which copy
//! values into a location of a wider type.

use super::base::Synthesized;
use crate::cairo::imports::{FELT_TO_UINT256, LIB_BYTES_CONVERSIONS, LIB_INT_CONVERSIONS};
use crate::sema::ast::Type;

/// Statements binding `out` to `arg` converted from `from` to `to`
pub(crate) struct Conversion {
    pub code: String,
    import: Option<(&'static str, String)>,
}

impl Conversion {
    fn rebind(arg: &str, out: &str) -> Self {
        Conversion {
            code: format!("let {out} = {arg};"),
            import: None,
        }
    }

    fn call(module: &'static str, function: String, args: String, out: &str) -> Self {
        Conversion {
            code: format!("let ({out}) = {function}({args});"),
            import: Some((module, function)),
        }
    }

    /// Add the import of the conversion helper, if any
    pub fn imports_into(&self, synthesized: Synthesized) -> Synthesized {
        match &self.import {
            Some((module, symbol)) => synthesized.symbol(module, symbol),
            None => synthesized,
        }
    }
}

/// The implicit conversion of a value of type `from` to `to`, or `None` if Solidity does
/// not convert implicitly between them
pub(crate) fn widen(from: &Type, to: &Type, arg: &str, out: &str) -> Option<Conversion> {
    if from == to {
        return Some(Conversion::rebind(arg, out));
    }

    match (from, to) {
        (Type::Uint(a), Type::Uint(256)) if *a < 256 => Some(Conversion {
            code: format!("let ({out}) = {}({arg});", FELT_TO_UINT256.symbol),
            import: Some((FELT_TO_UINT256.module, FELT_TO_UINT256.symbol.to_string())),
        }),
        (Type::Uint(a), Type::Uint(b)) if a < b => Some(Conversion::rebind(arg, out)),
        (Type::Int(a), Type::Int(b)) if a < b => Some(Conversion::call(
            LIB_INT_CONVERSIONS,
            format!("warp_int{a}_to_int{b}"),
            arg.to_string(),
            out,
        )),
        (Type::Bytes(a), Type::Bytes(b)) if a < b => {
            // fixed bytes are left aligned, so widening shifts them up
            let shift = (b - a) as u32 * 8;
            let function = if *b == 32 {
                "warp_bytes_widen_256"
            } else {
                "warp_bytes_widen"
            };

            Some(Conversion::call(
                LIB_BYTES_CONVERSIONS,
                function.to_string(),
                format!("{arg}, {shift}"),
                out,
            ))
        }
        _ => None,
    }
}
