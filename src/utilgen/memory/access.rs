// SPDX-License-Identifier: Apache-2.0

use crate::cairo::imports::{WM_READ_256, WM_READ_FELT, WM_WRITE_256, WM_WRITE_FELT};
use crate::sema::ast::{Namespace, Type};
use crate::utilgen::base::{
    unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult,
};
use solang_parser::pt;

/// Read a memory slot: `(loc: felt) -> (val: T)`. Reference types read the pointer held in
/// the slot. Served by the runtime library.
pub struct MemoryReadGen {
    cache: FunctionCache,
}

util_gen!(MemoryReadGen, "memory.read");

impl MemoryReadGen {
    pub fn new() -> Self {
        MemoryReadGen {
            cache: FunctionCache::new("WM_READ", FragmentKind::FunctionDefinition),
        }
    }
}

impl Resolve for MemoryReadGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        if let Type::Mapping(..) = ty {
            return Err(unsupported(loc, ty, ns, "mappings cannot live in memory"));
        }

        Ok(if ty.is_wide() {
            self.cache.use_library(WM_READ_256)
        } else {
            self.cache.use_library(WM_READ_FELT)
        })
    }
}

/// Write a memory slot: `(loc: felt, value: T) -> (res: T)`
pub struct MemoryWriteGen {
    cache: FunctionCache,
}

util_gen!(MemoryWriteGen, "memory.write");

impl MemoryWriteGen {
    pub fn new() -> Self {
        MemoryWriteGen {
            cache: FunctionCache::new("WM_WRITE", FragmentKind::FunctionDefinition),
        }
    }
}

impl Resolve for MemoryWriteGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        if let Type::Mapping(..) = ty {
            return Err(unsupported(loc, ty, ns, "mappings cannot live in memory"));
        }

        Ok(if ty.is_wide() {
            self.cache.use_library(WM_WRITE_256)
        } else {
            self.cache.use_library(WM_WRITE_FELT)
        })
    }
}
