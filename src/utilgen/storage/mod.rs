// SPDX-License-Identifier: Apache-2.0

//! Generators for values in contract storage.

mod access;
mod copy;
mod delete;
mod dyn_array;
mod index;

pub(crate) use copy::{code_uses_uint256, offset};
pub use access::{StorageReadGen, StorageWriteGen};
pub use copy::{StorageToCalldataGen, StorageToMemoryGen, StorageToStorageGen};
pub use delete::StorageDeleteGen;
pub use dyn_array::{
    DynArrayFns, DynArrayGen, DynArrayPopGen, DynArrayPushWithArgGen, DynArrayPushWithoutArgGen,
    PushArg, StorageDynArrayLengthGen,
};
pub use index::{
    MappingIndexAccessGen, StorageDynArrayIndexAccessGen, StorageMemberAccessGen,
    StorageStaticArrayIndexAccessGen,
};
