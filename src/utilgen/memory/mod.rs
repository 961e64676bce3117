// SPDX-License-Identifier: Apache-2.0

//! Generators for values in memory (`warp_memory`, a felt addressed dictionary).

mod access;
mod construct;
mod convert;
mod copy;
mod index;

pub use access::{MemoryReadGen, MemoryWriteGen};
pub use construct::{ArrayLiteral, MemoryArrayLiteralGen, MemoryConcatGen, MemoryStructGen};
pub use convert::MemoryImplicitConversionGen;
pub use copy::{MemoryToCalldataGen, MemoryToStorageGen};
pub use index::{MemoryDynArrayLengthGen, MemoryMemberAccessGen, MemoryStaticArrayIndexAccessGen};
