// SPDX-License-Identifier: Apache-2.0

use crate::cairo::imports::{UINT256, WARP_STORAGE};
use crate::cairo::types::{CairoType, TypeConversionContext};
use crate::cairo::{function, Implicits};
use crate::layout::storage_key;
use crate::sema::ast::{Namespace, Type};
use crate::utilgen::base::{
    unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult, Synthesized,
};
use solang_parser::pt;

/// Read a value type from storage: `(loc: felt) -> (val: T)`
pub struct StorageReadGen {
    cache: FunctionCache,
}

util_gen!(StorageReadGen, "storage.read");

impl StorageReadGen {
    pub fn new() -> Self {
        StorageReadGen {
            cache: FunctionCache::new("WS_READ", FragmentKind::FunctionDefinition),
        }
    }
}

impl Resolve for StorageReadGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let cairo_ty = value_type(ty, loc, ns, "read")?;

        self.cache
            .get_or_create(&storage_key(ty, ns), &cairo_ty.to_string(), |name| {
                let body = if cairo_ty.is_uint256() {
                    vec![
                        "let (read0) = WARP_STORAGE.read(loc);".to_string(),
                        "let (read1) = WARP_STORAGE.read(loc + 1);".to_string(),
                        "return (Uint256(low=read0, high=read1),);".to_string(),
                    ]
                } else {
                    vec![
                        "let (read0) = WARP_STORAGE.read(loc);".to_string(),
                        "return (read0,);".to_string(),
                    ]
                };

                let code = function(
                    name,
                    Implicits::Storage,
                    "loc: felt",
                    &format!("val: {cairo_ty}"),
                    &body,
                );

                let synthesized = Synthesized::new(code)
                    .implicits(Implicits::Storage)
                    .import(WARP_STORAGE);

                Ok(if cairo_ty.is_uint256() {
                    synthesized.import(UINT256)
                } else {
                    synthesized
                })
            })
    }
}

/// Write a value type to storage: `(loc: felt, value: T) -> (res: T)`
pub struct StorageWriteGen {
    cache: FunctionCache,
}

util_gen!(StorageWriteGen, "storage.write");

impl StorageWriteGen {
    pub fn new() -> Self {
        StorageWriteGen {
            cache: FunctionCache::new("WS_WRITE", FragmentKind::FunctionDefinition),
        }
    }

    /// Statement writing the zero value of `ty` at `at`
    pub fn zero(&self, ty: &Type, at: &str, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let write = self.resolve(ty, loc, ns)?;

        Ok(if ty.is_wide() {
            format!("{write}({at}, Uint256(0, 0));")
        } else {
            format!("{write}({at}, 0);")
        })
    }
}

impl Resolve for StorageWriteGen {
    type Shape = Type;

    fn resolve(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let cairo_ty = value_type(ty, loc, ns, "written")?;

        self.cache
            .get_or_create(&storage_key(ty, ns), &cairo_ty.to_string(), |name| {
                let mut body = if cairo_ty.is_uint256() {
                    vec![
                        "WARP_STORAGE.write(loc, value.low);".to_string(),
                        "WARP_STORAGE.write(loc + 1, value.high);".to_string(),
                    ]
                } else {
                    vec!["WARP_STORAGE.write(loc, value);".to_string()]
                };

                body.push("return (value,);".to_string());

                let code = function(
                    name,
                    Implicits::Storage,
                    &format!("loc: felt, value: {cairo_ty}"),
                    &format!("res: {cairo_ty}"),
                    &body,
                );

                let synthesized = Synthesized::new(code)
                    .implicits(Implicits::Storage)
                    .import(WARP_STORAGE);

                Ok(if cairo_ty.is_uint256() {
                    synthesized.import(UINT256)
                } else {
                    synthesized
                })
            })
    }
}

fn value_type(ty: &Type, loc: &pt::Loc, ns: &Namespace, verb: &str) -> SynthResult<CairoType> {
    if !ty.is_value_type() {
        return Err(unsupported(
            loc,
            ty,
            ns,
            &format!("only value types can be {verb} as a whole, reference types are copied"),
        ));
    }

    CairoType::from_sol(ty, ns, TypeConversionContext::Ref)
        .map_err(|e| unsupported(loc, ty, ns, &e))
}
