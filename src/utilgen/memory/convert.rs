// SPDX-License-Identifier: Apache-2.0

use super::access::{MemoryReadGen, MemoryWriteGen};
use crate::cairo::imports::{
    UINT256, UINT256_ADD, UINT256_EQ, WM_ALLOC, WM_DYN_ARRAY_LENGTH, WM_INDEX_DYN, WM_NEW,
};
use crate::cairo::{function, Implicits};
use crate::layout::{memory_allocation_width, memory_key, memory_slot_width};
use crate::sema::ast::{ArrayLength, Namespace, Type};
use crate::utilgen::base::{
    uint256_literal, unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult,
    Synthesized,
};
use crate::utilgen::conversions::widen;
use solang_parser::pt;
use std::rc::Rc;

/// Implicit conversion of a memory array into a new array of a wider element type, e.g.
/// `uint8[3]` to `uint256[]`: `(source: felt) -> (target: felt)`
pub struct MemoryImplicitConversionGen {
    cache: FunctionCache,
    memory_write: Rc<MemoryWriteGen>,
    memory_read: Rc<MemoryReadGen>,
}

util_gen!(MemoryImplicitConversionGen, "memory.convert", [memory_write, memory_read]);

impl MemoryImplicitConversionGen {
    pub fn new(memory_write: Rc<MemoryWriteGen>, memory_read: Rc<MemoryReadGen>) -> Self {
        MemoryImplicitConversionGen {
            cache: FunctionCache::new("WM_CONVERT", FragmentKind::FunctionDefinition),
            memory_write,
            memory_read,
        }
    }

    /// Statements converting the element in slot `from` into slot `to`
    fn convert_elem(
        &self,
        from_ty: &Type,
        to_ty: &Type,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<(Vec<String>, Synthesized)> {
        let read = self.memory_read.resolve(from_ty, loc, ns)?;
        let write = self.memory_write.resolve(to_ty, loc, ns)?;

        if from_ty.is_value_type() {
            let Some(conversion) = widen(from_ty, to_ty, "value", "converted") else {
                return Err(unsupported(
                    loc,
                    from_ty,
                    ns,
                    &format!("no implicit conversion to '{}'", to_ty.to_string(ns)),
                ));
            };

            let synthesized = conversion.imports_into(Synthesized::default());

            return Ok((
                vec![
                    format!("let (value) = {read}(from_elem);"),
                    conversion.code,
                    format!("{write}(to_elem, converted);"),
                ],
                synthesized,
            ));
        }

        let nested = self.resolve(&(from_ty.clone(), to_ty.clone()), loc, ns)?;

        Ok((
            vec![
                format!("let (value) = {read}(from_elem);"),
                format!("let (converted) = {nested}(value);"),
                format!("{write}(to_elem, converted);"),
            ],
            Synthesized::default(),
        ))
    }
}

impl Resolve for MemoryImplicitConversionGen {
    /// Source and target array types
    type Shape = (Type, Type);

    fn resolve(&self, (from, to): &(Type, Type), loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let arrays = matches!(from, Type::Array(..)) && matches!(to, Type::Array(..));

        if !arrays || from == to {
            return Err(unsupported(
                loc,
                from,
                ns,
                &format!("no implicit conversion to '{}'", to.to_string(ns)),
            ));
        }

        if let (Some(from_len), Some(to_len)) = (from.array_length(), to.array_length()) {
            if from_len != to_len {
                return Err(unsupported(loc, from, ns, "static arrays differ in length"));
            }
        }

        if from.is_dynamic_array() && !to.is_dynamic_array() {
            return Err(unsupported(
                loc,
                from,
                ns,
                "dynamic arrays cannot become static arrays",
            ));
        }

        let key = format!("{}_to_{}", from.mangled(ns), to.mangled(ns));

        self.cache.get_or_create(&key, &memory_key(to, ns), |name| {
            let from_elem = from.array_elem();
            let to_elem = to.array_elem();
            let from_slot = uint256_literal(&memory_slot_width(&from_elem));
            let to_slot = uint256_literal(&memory_slot_width(&to_elem));
            let elem_name = format!("{name}_elem");

            let (convert, synthesized) = self.convert_elem(&from_elem, &to_elem, loc, ns)?;

            let from_addr = match from {
                Type::Array(_, ArrayLength::Fixed(_)) => {
                    format!(
                        "let from_elem = source + index.low * {};",
                        memory_slot_width(&from_elem)
                    )
                }
                _ => format!("let (from_elem) = wm_index_dyn(source, index, {from_slot});"),
            };

            let to_addr = match to {
                Type::Array(_, ArrayLength::Fixed(_)) => {
                    format!(
                        "let to_elem = target + index.low * {};",
                        memory_slot_width(&to_elem)
                    )
                }
                _ => format!("let (to_elem) = wm_index_dyn(target, index, {to_slot});"),
            };

            let mut body = vec![
                "let (done) = uint256_eq(index, length);".to_string(),
                "if (done == 1) {".to_string(),
                "    return ();".to_string(),
                "}".to_string(),
                from_addr,
                to_addr,
            ];
            body.extend(convert);
            body.extend([
                "let (next, _) = uint256_add(index, Uint256(1, 0));".to_string(),
                format!("return {elem_name}(source, target, next, length);"),
            ]);

            let length = match from.array_length() {
                Some(len) => format!("let length = {};", uint256_literal(len)),
                None => "let (length) = wm_dyn_array_length(source);".to_string(),
            };

            let alloc = match to {
                Type::Array(_, ArrayLength::Fixed(_)) => format!(
                    "let (target) = wm_alloc({});",
                    uint256_literal(&memory_allocation_width(to, ns))
                ),
                _ => format!("let (target) = wm_new(length, {to_slot});"),
            };

            let code = [
                function(
                    &elem_name,
                    Implicits::Memory,
                    "source: felt, target: felt, index: Uint256, length: Uint256",
                    "",
                    &body,
                ),
                function(
                    name,
                    Implicits::Memory,
                    "source: felt",
                    "target: felt",
                    &[
                        length,
                        alloc,
                        format!("{elem_name}(source, target, Uint256(0, 0), length);"),
                        "return (target,);".to_string(),
                    ],
                ),
            ]
            .join("\n\n");

            Ok(Synthesized {
                code,
                imports: synthesized.imports,
            }
            .implicits(Implicits::Memory)
            .imports(&[
                UINT256,
                UINT256_ADD,
                UINT256_EQ,
                WM_ALLOC,
                WM_NEW,
                WM_INDEX_DYN,
                WM_DYN_ARRAY_LENGTH,
            ]))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilgen::base::UtilGen;
    use crate::Target;
    use pretty_assertions::assert_eq;

    fn gen() -> MemoryImplicitConversionGen {
        MemoryImplicitConversionGen::new(
            Rc::new(MemoryWriteGen::new()),
            Rc::new(MemoryReadGen::new()),
        )
    }

    #[test]
    fn static_to_dynamic_widening() {
        let ns = Namespace::new(Target::Starknet);
        let gen = gen();

        let from = Type::Array(Box::new(Type::Uint(8)), ArrayLength::Fixed(3.into()));
        let to = Type::Array(Box::new(Type::Uint(256)), ArrayLength::Dynamic);

        let name = gen.resolve(&(from, to), &pt::Loc::Builtin, &ns).unwrap();
        assert_eq!(name, "WM_CONVERT0_A3_uint8_to_D_uint256");

        let code = &gen.generated_code()[0].code;
        assert!(code.contains("let from_elem = source + index.low * 1;"));
        assert!(code.contains("let (to_elem) = wm_index_dyn(target, index, Uint256(2, 0));"));
        assert!(code.contains("let (converted) = felt_to_uint256(value);"));
        assert!(code.contains("let length = Uint256(3, 0);"));
    }

    #[test]
    fn nested_arrays_convert_recursively() {
        let ns = Namespace::new(Target::Starknet);
        let gen = gen();

        let from = Type::Array(
            Box::new(Type::Array(Box::new(Type::Int(8)), ArrayLength::Dynamic)),
            ArrayLength::Dynamic,
        );
        let to = Type::Array(
            Box::new(Type::Array(Box::new(Type::Int(32)), ArrayLength::Dynamic)),
            ArrayLength::Dynamic,
        );

        gen.resolve(&(from, to), &pt::Loc::Builtin, &ns).unwrap();

        assert_eq!(gen.generated_code().len(), 2);
        assert!(gen.generated_code()[1]
            .code
            .contains("let (converted) = warp_int8_to_int32(value);"));
    }

    #[test]
    fn narrowing_is_rejected() {
        let ns = Namespace::new(Target::Starknet);
        let gen = gen();

        let from = Type::Array(Box::new(Type::Uint(64)), ArrayLength::Dynamic);
        let to = Type::Array(Box::new(Type::Uint(8)), ArrayLength::Dynamic);

        assert!(gen.resolve(&(from, to), &pt::Loc::Builtin, &ns).is_err());
        assert!(!gen.generated_code().iter().any(|f| f.name.contains("uint64")));
    }
}
