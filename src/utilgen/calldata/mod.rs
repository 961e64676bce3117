// SPDX-License-Identifier: Apache-2.0

//! Generators for values passed by value across the external interface: dynamic arrays as
//! `cd_dynarray_*` structs, static arrays as tuples and structs as Cairo structs.

mod convert;
mod copy;
mod dyn_array_struct;

pub use convert::CalldataImplicitConversionGen;
pub use copy::{CalldataToMemoryGen, CalldataToStorageGen};
pub use dyn_array_struct::DynArrayStructGen;
