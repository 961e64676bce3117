// SPDX-License-Identifier: Apache-2.0

use super::access::MemoryWriteGen;
use crate::cairo::imports::{
    DYNAMIC_ARRAY_COPY_FELT, FELT_TO_UINT256, FIXED_BYTES256_TO_DYNAMIC_ARRAY,
    FIXED_BYTES_TO_DYNAMIC_ARRAY, NARROW_SAFE, UINT256, WM_ALLOC, WM_DYN_ARRAY_LENGTH, WM_NEW,
};
use crate::cairo::types::{CairoType, TypeConversionContext};
use crate::cairo::{function, Implicits};
use crate::layout::{
    memory_allocation_width, memory_key, memory_member_offset, memory_slot_width,
    MEMORY_DYN_ARRAY_HEADER,
};
use crate::sema::ast::{Namespace, Type};
use crate::utilgen::base::{
    uint256_literal, unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult,
    Synthesized,
};
use crate::utilgen::storage::offset;
use itertools::Itertools;
use num_bigint::BigInt;
use solang_parser::pt;
use std::rc::Rc;

/// Struct constructor in memory: `(member0: T0, member1: T1, ...) -> (res: felt)`.
/// Reference type members are passed as pointers.
pub struct MemoryStructGen {
    cache: FunctionCache,
    memory_write: Rc<MemoryWriteGen>,
}

util_gen!(MemoryStructGen, "memory.struct", [memory_write]);

impl MemoryStructGen {
    pub fn new(memory_write: Rc<MemoryWriteGen>) -> Self {
        MemoryStructGen {
            cache: FunctionCache::new("WM_STRUCT", FragmentKind::FunctionDefinition),
            memory_write,
        }
    }
}

impl Resolve for MemoryStructGen {
    /// The struct number
    type Shape = usize;

    fn resolve(&self, &struct_no: &usize, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let ty = Type::Struct(struct_no);

        if ty.contains_mapping(ns) {
            return Err(unsupported(loc, &ty, ns, "mappings cannot live in memory"));
        }

        self.cache.get_or_create(&memory_key(&ty, ns), "felt", |name| {
            let mut params = Vec::new();
            let mut body = vec![format!(
                "let (start) = wm_alloc({});",
                uint256_literal(&memory_allocation_width(&ty, ns))
            )];

            for (field_no, field) in ns.structs[struct_no].fields.iter().enumerate() {
                let param_ty = CairoType::from_sol(&field.ty, ns, TypeConversionContext::Ref)
                    .map_err(|e| unsupported(loc, &field.ty, ns, &e))?;
                let write = self.memory_write.resolve(&field.ty, loc, ns)?;

                params.push(format!("member{field_no}: {param_ty}"));
                body.push(format!(
                    "{write}({}, member{field_no});",
                    offset("start", &memory_member_offset(struct_no, field_no, ns))
                ));
            }

            body.push("return (start,);".to_string());

            Ok(Synthesized::new(function(
                name,
                Implicits::Memory,
                &params.join(", "),
                "res: felt",
                &body,
            ))
            .implicits(Implicits::Memory)
            .imports(&[UINT256, WM_ALLOC]))
        })
    }
}

/// Shape of an array literal
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ArrayLiteral {
    pub elem: Type,
    pub len: usize,
    /// A dynamic array gets a length header, e.g. `new uint[](3)` initialised in place
    pub dynamic: bool,
}

/// Allocate and fill an array literal: `(e0: T, e1: T, ...) -> (res: felt)`
pub struct MemoryArrayLiteralGen {
    cache: FunctionCache,
    memory_write: Rc<MemoryWriteGen>,
}

util_gen!(MemoryArrayLiteralGen, "memory.array_literal", [memory_write]);

impl MemoryArrayLiteralGen {
    pub fn new(memory_write: Rc<MemoryWriteGen>) -> Self {
        MemoryArrayLiteralGen {
            cache: FunctionCache::new("WM_ARRAY_LITERAL", FragmentKind::FunctionDefinition),
            memory_write,
        }
    }
}

impl Resolve for MemoryArrayLiteralGen {
    type Shape = ArrayLiteral;

    fn resolve(&self, literal: &ArrayLiteral, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let elem_ty = CairoType::from_sol(&literal.elem, ns, TypeConversionContext::Ref)
            .map_err(|e| unsupported(loc, &literal.elem, ns, &e))?;
        let width = memory_slot_width(&literal.elem);

        let key = format!(
            "{}{}_{}",
            if literal.dynamic { "D" } else { "A" },
            literal.len,
            memory_key(&literal.elem, ns)
        );

        self.cache.get_or_create(&key, &width.to_string(), |name| {
            let write = self.memory_write.resolve(&literal.elem, loc, ns)?;
            let len = BigInt::from(literal.len);

            let (mut body, first) = if literal.dynamic {
                (
                    vec![format!(
                        "let (start) = wm_new({}, {});",
                        uint256_literal(&len),
                        uint256_literal(&width)
                    )],
                    BigInt::from(MEMORY_DYN_ARRAY_HEADER),
                )
            } else {
                (
                    vec![format!(
                        "let (start) = wm_alloc({});",
                        uint256_literal(&(&len * &width))
                    )],
                    BigInt::from(0),
                )
            };

            for i in 0..literal.len {
                body.push(format!(
                    "{write}({}, e{i});",
                    offset("start", &(&first + &width * i))
                ));
            }

            body.push("return (start,);".to_string());

            let params = (0..literal.len)
                .map(|i| format!("e{i}: {elem_ty}"))
                .join(", ");

            Ok(
                Synthesized::new(function(name, Implicits::Memory, &params, "res: felt", &body))
                    .implicits(Implicits::Memory)
                    .imports(&[UINT256, WM_ALLOC, WM_NEW]),
            )
        })
    }
}

/// `bytes.concat` and `string.concat`: `(arg0, arg1, ...) -> (res: felt)`. Arguments are
/// memory `bytes`/`string` pointers or fixed `bytesN` values.
pub struct MemoryConcatGen {
    cache: FunctionCache,
}

util_gen!(MemoryConcatGen, "memory.concat");

impl MemoryConcatGen {
    pub fn new() -> Self {
        MemoryConcatGen {
            cache: FunctionCache::new("CONCAT", FragmentKind::FunctionDefinition),
        }
    }
}

impl Resolve for MemoryConcatGen {
    type Shape = [Type];

    fn resolve(&self, args: &[Type], loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        for arg in args {
            if !matches!(arg, Type::String | Type::DynamicBytes | Type::Bytes(_)) {
                return Err(unsupported(
                    loc,
                    arg,
                    ns,
                    "only bytes, string and fixed bytes can be concatenated",
                ));
            }
        }

        let key = if args.is_empty() {
            "empty".to_string()
        } else {
            args.iter()
                .map(|arg| match arg {
                    Type::Bytes(n) => format!("B{n}"),
                    _ => "D".to_string(),
                })
                .join("_")
        };

        self.cache.get_or_create(&key, &key, |name| {
            let mut params = Vec::new();
            let mut lengths = Vec::new();
            let mut body = Vec::new();
            let mut synthesized =
                Synthesized::default().imports(&[UINT256, WM_NEW, NARROW_SAFE]);

            for (i, arg) in args.iter().enumerate() {
                match arg {
                    Type::Bytes(n) => {
                        params.push(format!(
                            "arg{i}: {}",
                            if *n == 32 { "Uint256" } else { "felt" }
                        ));
                        lengths.push(n.to_string());
                    }
                    _ => {
                        params.push(format!("arg{i}: felt"));
                        body.push(format!("let (len{i}_256) = wm_dyn_array_length(arg{i});"));
                        body.push(format!("let (len{i}) = narrow_safe(len{i}_256);"));
                        lengths.push(format!("len{i}"));
                        synthesized = synthesized.import(WM_DYN_ARRAY_LENGTH);
                    }
                }
            }

            let total = if lengths.is_empty() {
                "0".to_string()
            } else {
                lengths.join(" + ")
            };

            body.push(format!("let total_length = {total};"));
            body.push("let (total_length_256) = felt_to_uint256(total_length);".to_string());
            body.push("let (res) = wm_new(total_length_256, Uint256(1, 0));".to_string());
            synthesized = synthesized.import(FELT_TO_UINT256);

            let mut start = "0".to_string();

            for (i, arg) in args.iter().enumerate() {
                match arg {
                    Type::Bytes(32) => {
                        body.push(format!(
                            "fixed_bytes256_to_dynamic_array(res, {start}, {start} + 32, arg{i}, 0);"
                        ));
                        synthesized = synthesized.import(FIXED_BYTES256_TO_DYNAMIC_ARRAY);
                    }
                    Type::Bytes(n) => {
                        body.push(format!(
                            "fixed_bytes_to_dynamic_array(res, {start}, {start} + {n}, arg{i}, 0, {n});"
                        ));
                        synthesized = synthesized.import(FIXED_BYTES_TO_DYNAMIC_ARRAY);
                    }
                    _ => {
                        body.push(format!(
                            "dynamic_array_copy_felt(res, {start}, {start} + len{i}, arg{i}, 0);"
                        ));
                        synthesized = synthesized.import(DYNAMIC_ARRAY_COPY_FELT);
                    }
                }

                start = format!("{start} + {}", lengths[i]);
            }

            body.push("return (res,);".to_string());

            let code = function(name, Implicits::Bitwise, &params.join(", "), "res: felt", &body);

            Ok(Synthesized {
                code,
                imports: synthesized.imports,
            }
            .implicits(Implicits::Bitwise))
        })
    }
}
