// SPDX-License-Identifier: Apache-2.0

//! The resolved program as the front end hands it over: types, struct and enum
//! declarations, source files and the diagnostics collected so far.

pub mod ast;
pub mod diagnostics;
pub mod types;
