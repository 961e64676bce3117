// SPDX-License-Identifier: Apache-2.0

use crate::cairo::imports::{ALLOC, UINT256};
use crate::cairo::types::{CairoType, TypeConversionContext};
use crate::cairo::{function, Implicits};
use crate::sema::ast::{ArrayLength, Namespace, Type};
use crate::utilgen::base::{
    unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult, Synthesized,
};
use crate::utilgen::calldata::DynArrayStructGen;
use itertools::Itertools;
use num_traits::ToPrimitive;
use solang_parser::pt;
use std::rc::Rc;

/// Flatten values passed by value into one `cd_dynarray_felt`, the form in which arguments
/// of an external call are sent: `(arg0: T0, ...) -> (calldata_array: cd_dynarray_felt)`
pub struct EncodeAsFeltGen {
    cache: FunctionCache,
    dyn_array_struct: Rc<DynArrayStructGen>,
}

util_gen!(EncodeAsFeltGen, "utils.encode_as_felt", [dyn_array_struct]);

impl EncodeAsFeltGen {
    pub fn new(dyn_array_struct: Rc<DynArrayStructGen>) -> Self {
        EncodeAsFeltGen {
            cache: FunctionCache::new("encode_as_felt", FragmentKind::FunctionDefinition),
            dyn_array_struct,
        }
    }

    /// Writer of one value: `(to_index: felt, to_array: felt*, arg: T) -> (to_index: felt)`
    fn value_encoder(&self, ty: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let cairo_ty = CairoType::from_sol(ty, ns, TypeConversionContext::CallDataRef)
            .map_err(|e| unsupported(loc, ty, ns, &e))?;
        let name = format!("encode_{}", ty.mangled(ns));

        self.cache.get_or_create_named(&ty.mangled(ns), &name, |name| {
            let params = format!("to_index: felt, to_array: felt*, arg: {cairo_ty}");
            let mut synthesized = Synthesized::default();

            let mut body = Vec::new();

            match ty {
                _ if ty.is_wide() => {
                    body.push("assert to_array[to_index] = arg.low;".to_string());
                    body.push("assert to_array[to_index + 1] = arg.high;".to_string());
                    body.push("return (to_index + 2,);".to_string());
                    synthesized = synthesized.import(UINT256);
                }
                _ if ty.is_value_type() => {
                    body.push("assert to_array[to_index] = arg;".to_string());
                    body.push("return (to_index + 1,);".to_string());
                }
                Type::Struct(n) => {
                    body.push("let index0 = to_index;".to_string());

                    for (i, field) in ns.structs[*n].fields.iter().enumerate() {
                        let encode = self.value_encoder(&field.ty, loc, ns)?;
                        body.push(format!(
                            "let (index{}) = {encode}(index{i}, to_array, arg.{});",
                            i + 1,
                            field.name
                        ));
                    }

                    body.push(format!("return (index{},);", ns.structs[*n].fields.len()));
                }
                Type::Array(elem, ArrayLength::Fixed(len)) => {
                    let encode = self.value_encoder(elem, loc, ns)?;
                    let len = len
                        .to_usize()
                        .ok_or_else(|| unsupported(loc, ty, ns, "array too large"))?;

                    body.push("let index0 = to_index;".to_string());

                    for i in 0..len {
                        body.push(format!(
                            "let (index{}) = {encode}(index{i}, to_array, arg[{i}]);",
                            i + 1
                        ));
                    }

                    body.push(format!("return (index{len},);"));
                }
                _ => {
                    self.dyn_array_struct.resolve(ty, loc, ns)?;

                    let elem = ty.array_elem();
                    let encode = self.value_encoder(&elem, loc, ns)?;
                    let CairoType::DynArray { elem: elem_cairo } = &cairo_ty else {
                        unreachable!();
                    };
                    let elems_name = format!("{name}_elems");

                    let elems = function(
                        &elems_name,
                        Implicits::RangeCheck,
                        &format!(
                            "to_index: felt, to_array: felt*, index: felt, length: felt, ptr: {elem_cairo}*"
                        ),
                        "to_index: felt",
                        &[
                            "if (index == length) {".to_string(),
                            "    return (to_index,);".to_string(),
                            "}".to_string(),
                            format!("let (next_index) = {encode}(to_index, to_array, ptr[index]);"),
                            format!(
                                "return {elems_name}(next_index, to_array, index + 1, length, ptr);"
                            ),
                        ],
                    );

                    body.push("assert to_array[to_index] = arg.len;".to_string());
                    body.push(format!(
                        "let (next_index) = {elems_name}(to_index + 1, to_array, 0, arg.len, arg.ptr);"
                    ));
                    body.push("return (next_index,);".to_string());

                    return Ok(Synthesized {
                        code: [
                            elems,
                            function(name, Implicits::RangeCheck, &params, "to_index: felt", &body),
                        ]
                        .join("\n\n"),
                        ..synthesized
                    });
                }
            }

            Ok(Synthesized {
                code: function(name, Implicits::RangeCheck, &params, "to_index: felt", &body),
                ..synthesized
            })
        })
    }
}

impl Resolve for EncodeAsFeltGen {
    type Shape = [Type];

    fn resolve(&self, tys: &[Type], loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let params = tys
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                CairoType::from_sol(ty, ns, TypeConversionContext::CallDataRef)
                    .map(|cairo_ty| format!("arg{i}: {cairo_ty}"))
                    .map_err(|e| unsupported(loc, ty, ns, &e))
            })
            .collect::<SynthResult<Vec<_>>>()?
            .join(", ");

        let key = format!(
            "{}{}",
            tys.len(),
            tys.iter().map(|ty| format!("_{}", ty.mangled(ns))).join("")
        );

        self.cache.get_or_create(&key, &params, |name| {
            let result = self.dyn_array_struct.resolve(&Type::DynamicBytes, loc, ns)?;

            let mut body = vec![
                "let (to_array: felt*) = alloc();".to_string(),
                "let index0 = 0;".to_string(),
            ];

            for (i, ty) in tys.iter().enumerate() {
                let encode = self.value_encoder(ty, loc, ns)?;
                body.push(format!(
                    "let (index{}) = {encode}(index{i}, to_array, arg{i});",
                    i + 1
                ));
            }

            body.push(format!(
                "let calldata_array = {result}(index{}, to_array);",
                tys.len()
            ));
            body.push("return (calldata_array,);".to_string());

            Ok(Synthesized::new(function(
                name,
                Implicits::RangeCheck,
                &params,
                &format!("calldata_array: {result}"),
                &body,
            ))
            .import(ALLOC))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilgen::base::UtilGen;
    use crate::Target;
    use pretty_assertions::assert_eq;

    #[test]
    fn flattens_nested_values() {
        let mut ns = Namespace::new(Target::Starknet);
        let s = ns.add_struct(
            "Order",
            pt::Loc::Builtin,
            vec![("amount", Type::Uint(256)), ("tags", Type::String)],
        );

        let structs = Rc::new(DynArrayStructGen::new());
        let gen = EncodeAsFeltGen::new(structs.clone());

        let name = gen
            .resolve(&[Type::Address, Type::Struct(s)], &pt::Loc::Builtin, &ns)
            .unwrap();
        assert_eq!(name, "encode_as_felt0_2_address_S5Order");

        let records = gen.generated_code();
        let main = &records[0].code;
        assert!(main.contains("(arg0: felt, arg1: Order) -> (calldata_array: cd_dynarray_felt)"));
        assert!(main.contains("let (index2) = encode_S5Order(index1, to_array, arg1);"));
        assert!(main.contains("let calldata_array = cd_dynarray_felt(index2, to_array);"));

        let order = records.iter().find(|f| f.name == "encode_S5Order").unwrap();
        assert!(order
            .code
            .contains("let (index1) = encode_uint256(index0, to_array, arg.amount);"));
        assert!(order
            .code
            .contains("let (index2) = encode_string(index1, to_array, arg.tags);"));

        let tags = records.iter().find(|f| f.name == "encode_string").unwrap();
        assert!(tags.code.contains("assert to_array[to_index] = arg.len;"));
        assert!(tags.code.contains("encode_string_elems(to_index + 1, to_array, 0, arg.len, arg.ptr);"));

        assert_eq!(structs.generated_code().len(), 1);
    }
}
