// SPDX-License-Identifier: Apache-2.0

use super::{into_memory, members, param_type, params, tuple_key, word};
use crate::cairo::imports::{
    ALLOC, BYTES_TO_FELT_DYNAMIC_ARRAY, BYTES_TO_FELT_DYNAMIC_ARRAY_PADDED,
    FIXED_BYTES256_TO_FELT_DYNAMIC_ARRAY, FIXED_BYTES_TO_FELT_DYNAMIC_ARRAY, FELT_TO_UINT256,
    NARROW_SAFE, UINT256, UNSIGNED_DIV_REM, WARP_KECCAK, WM_DYN_ARRAY_LENGTH, WM_INDEX_DYN,
};
use crate::cairo::{function, Implicits};
use crate::layout::{
    abi_head_size, abi_packed_size, abi_tuple_head_size, memory_slot_width, MEMORY_DYN_ARRAY_HEADER,
};
use crate::sema::ast::{ArrayLength, Namespace, Type};
use crate::utilgen::base::{
    uint256_literal, unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult,
    Synthesized,
};
use crate::utilgen::memory::MemoryReadGen;
use crate::utilgen::storage::offset;
use itertools::Itertools;
use num_bigint::BigInt;
use solang_parser::pt;
use std::rc::Rc;

/// `abi.encode(...)`: `(param0: T0, ...) -> (result_ptr: felt)` returning memory `bytes`
pub struct AbiEncodeGen {
    cache: FunctionCache,
    memory_read: Rc<MemoryReadGen>,
}

util_gen!(AbiEncodeGen, "abi.encode", [memory_read]);

impl AbiEncodeGen {
    pub fn new(memory_read: Rc<MemoryReadGen>) -> Self {
        AbiEncodeGen {
            cache: FunctionCache::new("abi_encode", FragmentKind::FunctionDefinition),
            memory_read,
        }
    }

    /// Encoder of one value into the head of its tuple:
    /// `(bytes_index, bytes_offset, bytes_array: felt*, element_offset, value: T) -> (bytes_index, bytes_offset)`.
    ///
    /// `bytes_index` is where the head goes, `bytes_offset` where the next tail goes and
    /// `element_offset` the start of the enclosing tuple.
    pub fn head_encoder(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let cairo_ty = param_type(ty, loc, ns)?;
        let name = format!("abi_encode_head_{}", ty.mangled(ns));

        self.cache
            .get_or_create_named(&format!("head_{}", ty.mangled(ns)), &name, |name| {
                let mut synthesized = Synthesized::default().implicits(Implicits::Bitwise);

                let mut body = Vec::new();

                if ty.is_dynamic(ns) {
                    let tail = self.tail_encoder(ty, loc, ns)?;

                    body.extend([
                        "let (offset256) = felt_to_uint256(bytes_offset - element_offset);"
                            .to_string(),
                        "fixed_bytes256_to_felt_dynamic_array(bytes_index, bytes_array, 0, offset256);"
                            .to_string(),
                        format!("let (new_offset) = {tail}(bytes_offset, bytes_array, value);"),
                        "return (bytes_index + 32, new_offset);".to_string(),
                    ]);
                } else if ty.is_value_type() {
                    body.push(word(ty, "value", "value256", &mut synthesized));
                    body.push(
                        "fixed_bytes256_to_felt_dynamic_array(bytes_index, bytes_array, 0, value256);"
                            .to_string(),
                    );
                    body.push("return (bytes_index + 32, bytes_offset);".to_string());
                } else {
                    // static structs and arrays are encoded in place
                    body.push("let bytes_index0 = bytes_index;".to_string());

                    let members = members(ty, loc, ns)?;

                    for (i, (member, at)) in members.iter().enumerate() {
                        let read = self.memory_read.resolve(member, loc, ns)?;
                        let head = self.head_encoder(member, loc, ns)?;

                        body.push(format!("let (m{i}) = {read}({});", offset("value", at)));
                        body.push(format!(
                            "let (bytes_index{}, _) = {head}(bytes_index{i}, bytes_offset, bytes_array, element_offset, m{i});",
                            i + 1
                        ));
                    }

                    body.push(format!(
                        "return (bytes_index{}, bytes_offset);",
                        members.len()
                    ));
                }

                Ok(Synthesized {
                    code: function(
                        name,
                        Implicits::Bitwise,
                        &format!(
                            "bytes_index: felt, bytes_offset: felt, bytes_array: felt*, element_offset: felt, value: {cairo_ty}"
                        ),
                        "bytes_index: felt, bytes_offset: felt",
                        &body,
                    ),
                    imports: synthesized.imports,
                }
                .imports(&[UINT256, FELT_TO_UINT256, FIXED_BYTES256_TO_FELT_DYNAMIC_ARRAY]))
            })
    }

    /// Encoder of the tail of a dynamic value at `bytes_offset`:
    /// `(bytes_offset, bytes_array: felt*, value: felt) -> (bytes_offset)`
    pub fn tail_encoder(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        if !ty.is_dynamic(ns) {
            return Err(unsupported(loc, ty, ns, "static values have no tail"));
        }

        let name = format!("abi_encode_tail_{}", ty.mangled(ns));

        self.cache
            .get_or_create_named(&format!("tail_{}", ty.mangled(ns)), &name, |name| {
                let params = "bytes_offset: felt, bytes_array: felt*, value: felt";
                let synthesized = Synthesized::default()
                    .implicits(Implicits::Bitwise)
                    .imports(&[UINT256, FELT_TO_UINT256, FIXED_BYTES256_TO_FELT_DYNAMIC_ARRAY]);

                let length = [
                    "let (length256) = wm_dyn_array_length(value);".to_string(),
                    "let (length) = narrow_safe(length256);".to_string(),
                    "fixed_bytes256_to_felt_dynamic_array(bytes_offset, bytes_array, 0, length256);"
                        .to_string(),
                ];

                let code = match ty {
                    Type::String | Type::DynamicBytes => {
                        let mut body = length.to_vec();
                        body.push(
                            "let (new_offset) = bytes_to_felt_dynamic_array_padded(bytes_offset + 32, bytes_array, value, length);"
                                .to_string(),
                        );
                        body.push("return (new_offset,);".to_string());

                        return Ok(Synthesized {
                            code: function(
                                name,
                                Implicits::Bitwise,
                                params,
                                "bytes_offset: felt",
                                &body,
                            ),
                            ..synthesized
                        }
                        .imports(&[
                            WM_DYN_ARRAY_LENGTH,
                            NARROW_SAFE,
                            BYTES_TO_FELT_DYNAMIC_ARRAY_PADDED,
                        ]));
                    }
                    Type::Array(elem, ArrayLength::Dynamic) => {
                        let read = self.memory_read.resolve(elem, loc, ns)?;
                        let head = self.head_encoder(elem, loc, ns)?;
                        let elems_name = format!("{name}_elems");

                        let elems = function(
                            &elems_name,
                            Implicits::Bitwise,
                            "bytes_index: felt, bytes_offset: felt, bytes_array: felt*, element_offset: felt, index: felt, length: felt, mem_ptr: felt",
                            "bytes_offset: felt",
                            &[
                                "if (index == length) {".to_string(),
                                "    return (bytes_offset,);".to_string(),
                                "}".to_string(),
                                "let (index256) = felt_to_uint256(index);".to_string(),
                                format!(
                                    "let (elem_loc) = wm_index_dyn(mem_ptr, index256, {});",
                                    uint256_literal(&memory_slot_width(elem))
                                ),
                                format!("let (elem) = {read}(elem_loc);"),
                                format!(
                                    "let (new_index, new_offset) = {head}(bytes_index, bytes_offset, bytes_array, element_offset, elem);"
                                ),
                                format!(
                                    "return {elems_name}(new_index, new_offset, bytes_array, element_offset, index + 1, length, mem_ptr);"
                                ),
                            ],
                        );

                        let mut body = length.to_vec();
                        body.extend([
                            "let elements_start = bytes_offset + 32;".to_string(),
                            format!(
                                "let (new_offset) = {elems_name}(elements_start, elements_start + length * {}, bytes_array, elements_start, 0, length, value);",
                                abi_head_size(elem, ns)
                            ),
                            "return (new_offset,);".to_string(),
                        ]);

                        return Ok(Synthesized {
                            code: [
                                elems,
                                function(
                                    name,
                                    Implicits::Bitwise,
                                    params,
                                    "bytes_offset: felt",
                                    &body,
                                ),
                            ]
                            .join("\n\n"),
                            ..synthesized
                        }
                        .imports(&[WM_DYN_ARRAY_LENGTH, NARROW_SAFE, WM_INDEX_DYN]));
                    }
                    _ => {
                        // dynamic structs and static arrays of dynamic values are a nested tuple
                        let members = members(ty, loc, ns)?;
                        let heads: BigInt = members
                            .iter()
                            .map(|(member, _)| abi_head_size(member, ns))
                            .sum();

                        let mut body = vec![
                            "let element_offset = bytes_offset;".to_string(),
                            "let bytes_index0 = bytes_offset;".to_string(),
                            format!("let bytes_offset0 = bytes_offset + {heads};"),
                        ];

                        for (i, (member, at)) in members.iter().enumerate() {
                            let read = self.memory_read.resolve(member, loc, ns)?;
                            let head = self.head_encoder(member, loc, ns)?;

                            body.push(format!("let (m{i}) = {read}({});", offset("value", at)));
                            body.push(format!(
                                "let (bytes_index{n}, bytes_offset{n}) = {head}(bytes_index{i}, bytes_offset{i}, bytes_array, element_offset, m{i});",
                                n = i + 1
                            ));
                        }

                        body.push(format!("return (bytes_offset{},);", members.len()));

                        function(name, Implicits::Bitwise, params, "bytes_offset: felt", &body)
                    }
                };

                Ok(Synthesized { code, ..synthesized })
            })
    }

    /// Statements encoding `param0..` as a tuple starting at byte `start` of `bytes_array`.
    /// The final length is left in the returned variable.
    pub fn encode_tuple(
        &self,
        tys: &[Type],
        start: u64,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<(Vec<String>, String)> {
        let mut body = vec![
            format!("let bytes_index0 = {start};"),
            format!(
                "let bytes_offset0 = {};",
                abi_tuple_head_size(tys, ns) + start
            ),
        ];

        for (i, ty) in tys.iter().enumerate() {
            let head = self.head_encoder(ty, loc, ns)?;

            body.push(format!(
                "let (bytes_index{n}, bytes_offset{n}) = {head}(bytes_index{i}, bytes_offset{i}, bytes_array, {start}, param{i});",
                n = i + 1
            ));
        }

        Ok((body, format!("bytes_offset{}", tys.len())))
    }
}

impl Resolve for AbiEncodeGen {
    type Shape = [Type];

    fn resolve(&self, tys: &[Type], loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let params = params(tys, loc, ns)?.join(", ");

        self.cache.get_or_create(&tuple_key(tys, ns), &params, |name| {
            let (mut body, length) = self.encode_tuple(tys, 0, loc, ns)?;
            body.insert(0, "let (bytes_array: felt*) = alloc();".to_string());

            let (end, synthesized) = into_memory(&length, Synthesized::default());
            body.extend(end);

            Ok(Synthesized {
                code: function(name, Implicits::Bitwise, &params, "result_ptr: felt", &body),
                ..synthesized
            }
            .implicits(Implicits::Bitwise)
            .import(ALLOC))
        })
    }
}

/// `abi.encodePacked(...)`: values take their natural size, bytes and strings are not padded,
/// array elements are padded to 32 bytes
pub struct AbiEncodePackedGen {
    cache: FunctionCache,
    memory_read: Rc<MemoryReadGen>,
}

util_gen!(AbiEncodePackedGen, "abi.encode_packed", [memory_read]);

impl AbiEncodePackedGen {
    pub fn new(memory_read: Rc<MemoryReadGen>) -> Self {
        AbiEncodePackedGen {
            cache: FunctionCache::new("abi_encode_packed", FragmentKind::FunctionDefinition),
            memory_read,
        }
    }

    /// Encoder of array elements as words:
    /// `(bytes_index, bytes_array: felt*, index, length, elems_start) -> (bytes_index)`
    fn elements_encoder(&self, elem: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let name = format!("abi_encode_packed_elems_{}", elem.mangled(ns));

        self.cache
            .get_or_create_named(&format!("elems_{}", elem.mangled(ns)), &name, |name| {
                let read = self.memory_read.resolve(elem, loc, ns)?;
                let mut synthesized = Synthesized::default();

                let body = vec![
                    "if (index == length) {".to_string(),
                    "    return (bytes_index,);".to_string(),
                    "}".to_string(),
                    format!(
                        "let (elem) = {read}(elems_start + index * {});",
                        memory_slot_width(elem)
                    ),
                    word(elem, "elem", "elem256", &mut synthesized),
                    "fixed_bytes256_to_felt_dynamic_array(bytes_index, bytes_array, 0, elem256);"
                        .to_string(),
                    format!(
                        "return {name}(bytes_index + 32, bytes_array, index + 1, length, elems_start);"
                    ),
                ];

                Ok(Synthesized {
                    code: function(
                        name,
                        Implicits::Bitwise,
                        "bytes_index: felt, bytes_array: felt*, index: felt, length: felt, elems_start: felt",
                        "bytes_index: felt",
                        &body,
                    ),
                    ..synthesized
                }
                .implicits(Implicits::Bitwise)
                .imports(&[UINT256, FIXED_BYTES256_TO_FELT_DYNAMIC_ARRAY]))
            })
    }

    /// Statements appending `param{i}` at `bytes_index{i}`, binding `bytes_index{i + 1}`
    fn encode_param(
        &self,
        i: usize,
        ty: &Type,
        loc: &pt::Loc,
        ns: &Namespace,
        synthesized: Synthesized,
    ) -> SynthResult<(Vec<String>, Synthesized)> {
        let (index, next, value) = (
            format!("bytes_index{i}"),
            format!("bytes_index{}", i + 1),
            format!("param{i}"),
        );

        if ty.is_wide() {
            return Ok((
                vec![
                    format!("fixed_bytes256_to_felt_dynamic_array({index}, bytes_array, 0, {value});"),
                    format!("let {next} = {index} + 32;"),
                ],
                synthesized.import(FIXED_BYTES256_TO_FELT_DYNAMIC_ARRAY),
            ));
        }

        if let Some(size) = abi_packed_size(ty, ns) {
            return Ok((
                vec![
                    format!("fixed_bytes_to_felt_dynamic_array({index}, bytes_array, 0, {value}, {size});"),
                    format!("let {next} = {index} + {size};"),
                ],
                synthesized.import(FIXED_BYTES_TO_FELT_DYNAMIC_ARRAY),
            ));
        }

        match ty {
            Type::String | Type::DynamicBytes => Ok((
                vec![
                    format!("let (length256_{i}) = wm_dyn_array_length({value});"),
                    format!("let (length{i}) = narrow_safe(length256_{i});"),
                    format!("bytes_to_felt_dynamic_array({index}, bytes_array, {value}, length{i});"),
                    format!("let {next} = {index} + length{i};"),
                ],
                synthesized.imports(&[
                    WM_DYN_ARRAY_LENGTH,
                    NARROW_SAFE,
                    BYTES_TO_FELT_DYNAMIC_ARRAY,
                ]),
            )),
            Type::Array(elem, _) if elem.is_value_type() => {
                let elems = self.elements_encoder(elem, loc, ns)?;

                let (mut body, synthesized) = match ty.array_length() {
                    Some(len) => (
                        vec![format!("let length{i} = {len};")],
                        synthesized,
                    ),
                    None => (
                        vec![
                            format!("let (length256_{i}) = wm_dyn_array_length({value});"),
                            format!("let (length{i}) = narrow_safe(length256_{i});"),
                        ],
                        synthesized.imports(&[WM_DYN_ARRAY_LENGTH, NARROW_SAFE]),
                    ),
                };

                // elements of a dynamic array follow its length header
                let elems_start = if ty.is_dynamic_array() {
                    format!("{value} + {MEMORY_DYN_ARRAY_HEADER}")
                } else {
                    value
                };

                body.push(format!(
                    "let ({next}) = {elems}({index}, bytes_array, 0, length{i}, {elems_start});"
                ));

                Ok((body, synthesized))
            }
            Type::Array(..) => Err(unsupported(
                loc,
                ty,
                ns,
                "arrays of reference types cannot be packed",
            )),
            _ => Err(unsupported(loc, ty, ns, "structs cannot be packed")),
        }
    }
}

impl Resolve for AbiEncodePackedGen {
    type Shape = [Type];

    fn resolve(&self, tys: &[Type], loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let params = params(tys, loc, ns)?.join(", ");

        self.cache.get_or_create(&tuple_key(tys, ns), &params, |name| {
            let mut body = vec![
                "let (bytes_array: felt*) = alloc();".to_string(),
                "let bytes_index0 = 0;".to_string(),
            ];
            let mut synthesized = Synthesized::default();

            for (i, ty) in tys.iter().enumerate() {
                let (stmts, next) = self.encode_param(i, ty, loc, ns, synthesized)?;
                body.extend(stmts);
                synthesized = next;
            }

            let (end, synthesized) = into_memory(&format!("bytes_index{}", tys.len()), synthesized);
            body.extend(end);

            Ok(Synthesized {
                code: function(name, Implicits::Bitwise, &params, "result_ptr: felt", &body),
                ..synthesized
            }
            .implicits(Implicits::Bitwise)
            .import(ALLOC))
        })
    }
}

/// `abi.encodeWithSelector(selector, ...)`: a 4 byte selector followed by the `abi.encode`
/// tuple, `(selector: felt, param0: T0, ...) -> (result_ptr: felt)`
pub struct AbiEncodeWithSelectorGen {
    cache: FunctionCache,
    abi_encode: Rc<AbiEncodeGen>,
}

util_gen!(AbiEncodeWithSelectorGen, "abi.encode_with_selector", [abi_encode]);

impl AbiEncodeWithSelectorGen {
    pub fn new(abi_encode: Rc<AbiEncodeGen>) -> Self {
        AbiEncodeWithSelectorGen {
            cache: FunctionCache::new("abi_encode_with_selector", FragmentKind::FunctionDefinition),
            abi_encode,
        }
    }
}

impl Resolve for AbiEncodeWithSelectorGen {
    type Shape = [Type];

    fn resolve(&self, tys: &[Type], loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let params = std::iter::once("selector: felt".to_string())
            .chain(params(tys, loc, ns)?)
            .join(", ");

        self.cache.get_or_create(&tuple_key(tys, ns), &params, |name| {
            let (tuple, length) = self.abi_encode.encode_tuple(tys, 4, loc, ns)?;

            let mut body = vec![
                "let (bytes_array: felt*) = alloc();".to_string(),
                "fixed_bytes_to_felt_dynamic_array(0, bytes_array, 0, selector, 4);".to_string(),
            ];
            body.extend(tuple);

            let (end, synthesized) = into_memory(&length, Synthesized::default());
            body.extend(end);

            Ok(Synthesized {
                code: function(name, Implicits::Bitwise, &params, "result_ptr: felt", &body),
                ..synthesized
            }
            .implicits(Implicits::Bitwise)
            .imports(&[ALLOC, FIXED_BYTES_TO_FELT_DYNAMIC_ARRAY]))
        })
    }
}

/// `abi.encodeWithSignature(signature, ...)`: the selector is the first four bytes of the keccak
/// hash of the signature string, `(signature: felt, param0: T0, ...) -> (result_ptr: felt)`
pub struct AbiEncodeWithSignatureGen {
    cache: FunctionCache,
    with_selector: Rc<AbiEncodeWithSelectorGen>,
}

util_gen!(
    AbiEncodeWithSignatureGen,
    "abi.encode_with_signature",
    [with_selector]
);

impl AbiEncodeWithSignatureGen {
    pub fn new(with_selector: Rc<AbiEncodeWithSelectorGen>) -> Self {
        AbiEncodeWithSignatureGen {
            cache: FunctionCache::new(
                "abi_encode_with_signature",
                FragmentKind::FunctionDefinition,
            ),
            with_selector,
        }
    }
}

impl Resolve for AbiEncodeWithSignatureGen {
    type Shape = [Type];

    fn resolve(&self, tys: &[Type], loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let params = std::iter::once("signature: felt".to_string())
            .chain(params(tys, loc, ns)?)
            .join(", ");

        self.cache.get_or_create(&tuple_key(tys, ns), &params, |name| {
            let with_selector = self.with_selector.resolve(tys, loc, ns)?;
            let args = std::iter::once("selector".to_string())
                .chain((0..tys.len()).map(|i| format!("param{i}")))
                .join(", ");

            let body = vec![
                "let (signature_hash) = warp_keccak(signature);".to_string(),
                "let (selector, _) = unsigned_div_rem(signature_hash.high, 2 ** 96);".to_string(),
                format!("let (result_ptr) = {with_selector}({args});"),
                "return (result_ptr,);".to_string(),
            ];

            Ok(Synthesized::new(function(
                name,
                Implicits::BitwiseKeccak,
                &params,
                "result_ptr: felt",
                &body,
            ))
            .implicits(Implicits::BitwiseKeccak)
            .imports(&[WARP_KECCAK, UNSIGNED_DIV_REM]))
        })
    }
}
