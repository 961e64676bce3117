// SPDX-License-Identifier: Apache-2.0

use super::dyn_array_struct::DynArrayStructGen;
use crate::cairo::imports::{merge_imports, FELT_TO_UINT256, UINT256};
use crate::cairo::types::{CairoType, TypeConversionContext};
use crate::cairo::{function, Implicits};
use crate::layout::storage_width;
use crate::sema::ast::{ArrayLength, Namespace, Type};
use crate::utilgen::base::{
    uint256_literal, unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult,
    Synthesized,
};
use crate::utilgen::conversions::widen;
use crate::utilgen::storage::{offset, DynArrayGen, StorageDeleteGen, StorageWriteGen};
use num_traits::ToPrimitive;
use solang_parser::pt;
use std::rc::Rc;

/// Copy a calldata array into a storage array of wider elements, e.g. `uint8[]` calldata
/// into `uint256[]` storage: `(loc: felt, calldata: T) -> (loc: felt)`
pub struct CalldataImplicitConversionGen {
    cache: FunctionCache,
    storage_write: Rc<StorageWriteGen>,
    storage_delete: Rc<StorageDeleteGen>,
    dyn_array: Rc<DynArrayGen>,
    dyn_array_struct: Rc<DynArrayStructGen>,
}

util_gen!(
    CalldataImplicitConversionGen,
    "calldata.convert",
    [storage_write, storage_delete, dyn_array, dyn_array_struct]
);

impl CalldataImplicitConversionGen {
    pub fn new(
        storage_write: Rc<StorageWriteGen>,
        storage_delete: Rc<StorageDeleteGen>,
        dyn_array: Rc<DynArrayGen>,
        dyn_array_struct: Rc<DynArrayStructGen>,
    ) -> Self {
        CalldataImplicitConversionGen {
            cache: FunctionCache::new("CD_CONVERT", FragmentKind::FunctionDefinition),
            storage_write,
            storage_delete,
            dyn_array,
            dyn_array_struct,
        }
    }

    /// Statements storing the calldata element `value` of type `from` at `to` as type `to_ty`
    fn store(
        &self,
        from: &Type,
        to_ty: &Type,
        value: &str,
        to: &str,
        var: &str,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<(Vec<String>, Synthesized)> {
        if from.is_value_type() {
            let Some(conversion) = widen(from, to_ty, value, var) else {
                return Err(unsupported(
                    loc,
                    from,
                    ns,
                    &format!("no implicit conversion to '{}'", to_ty.to_string(ns)),
                ));
            };
            let write = self.storage_write.resolve(to_ty, loc, ns)?;
            let synthesized = conversion.imports_into(Synthesized::default());

            return Ok((
                vec![conversion.code, format!("{write}({to}, {var});")],
                synthesized,
            ));
        }

        let nested = self.resolve(&(from.clone(), to_ty.clone()), loc, ns)?;

        Ok((vec![format!("{nested}({to}, {value});")], Synthesized::default()))
    }
}

impl Resolve for CalldataImplicitConversionGen {
    /// Calldata source type and storage target type
    type Shape = (Type, Type);

    fn resolve(&self, (from, to): &(Type, Type), loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let arrays = matches!(from, Type::Array(..)) && matches!(to, Type::Array(..));

        if !arrays {
            return Err(unsupported(
                loc,
                from,
                ns,
                &format!("no implicit conversion to '{}'", to.to_string(ns)),
            ));
        }

        if matches!(from.array_elem(), Type::Struct(_)) {
            return Err(unsupported(
                loc,
                from,
                ns,
                "arrays of structs are copied without conversion",
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

        let cairo_ty = CairoType::from_sol(from, ns, TypeConversionContext::CallDataRef)
            .map_err(|e| unsupported(loc, from, ns, &e))?;

        let key = format!("{}_to_{}", from.mangled(ns), to.mangled(ns));

        self.cache.get_or_create(&key, &cairo_ty.to_string(), |name| {
            let from_elem = from.array_elem();
            let to_elem = to.array_elem();
            let params = format!("loc: felt, calldata: {cairo_ty}");

            match from {
                Type::Array(_, ArrayLength::Fixed(len)) => {
                    let len = len
                        .to_usize()
                        .ok_or_else(|| unsupported(loc, from, ns, "array too large"))?;
                    let mut body = Vec::new();
                    let mut synthesized = Synthesized::default();

                    let base = if to.is_dynamic_array() {
                        let fns = self.dyn_array.layout(&to_elem, loc, ns)?;
                        let delete_tail = self.storage_delete.resolve_elements(to, loc, ns)?;
                        let length = uint256_literal(&len.into());

                        body.push(format!("let (old_length) = {}(loc);", fns.length));
                        body.push(format!("{}(loc, {length});", fns.set_length));
                        body.push(format!("{delete_tail}(loc, {length}, old_length);"));

                        for i in 0..len {
                            body.push(format!(
                                "let (elem_loc{i}) = {}(loc, {});",
                                fns.elem_loc,
                                uint256_literal(&i.into())
                            ));
                        }

                        None
                    } else {
                        Some(storage_width(&to_elem, ns))
                    };

                    for i in 0..len {
                        let at = match &base {
                            Some(width) => offset("loc", &(width * i)),
                            None => format!("elem_loc{i}"),
                        };

                        let (stmts, imports) = self.store(
                            &from_elem,
                            &to_elem,
                            &format!("calldata[{i}]"),
                            &at,
                            &format!("e{i}"),
                            loc,
                            ns,
                        )?;
                        body.extend(stmts);
                        synthesized.imports =
                            merge_imports([&synthesized.imports, &imports.imports]);
                    }

                    body.push("return (loc,);".to_string());

                    Ok(Synthesized {
                        code: function(name, Implicits::Storage, &params, "loc: felt", &body),
                        imports: synthesized.imports,
                    }
                    .implicits(Implicits::Storage)
                    .import(UINT256))
                }
                _ => {
                    self.dyn_array_struct.resolve(from, loc, ns)?;

                    let CairoType::DynArray { elem: elem_cairo } = &cairo_ty else {
                        unreachable!();
                    };
                    let fns = self.dyn_array.layout(&to_elem, loc, ns)?;
                    let delete_tail = self.storage_delete.resolve_elements(to, loc, ns)?;
                    let elem_name = format!("{name}_elem");

                    let (stmts, synthesized) = self.store(
                        &from_elem,
                        &to_elem,
                        "ptr[index]",
                        "elem_loc",
                        "elem",
                        loc,
                        ns,
                    )?;

                    let mut body = vec![
                        "if (index == length) {".to_string(),
                        "    return ();".to_string(),
                        "}".to_string(),
                        "let (index256) = felt_to_uint256(index);".to_string(),
                        format!("let (elem_loc) = {}(loc, index256);", fns.elem_loc),
                    ];
                    body.extend(stmts);
                    body.push(format!("return {elem_name}(loc, length, ptr, index + 1);"));

                    let code = [
                        function(
                            &elem_name,
                            Implicits::Storage,
                            &format!("loc: felt, length: felt, ptr: {elem_cairo}*, index: felt"),
                            "",
                            &body,
                        ),
                        function(
                            name,
                            Implicits::Storage,
                            &params,
                            "loc: felt",
                            &[
                                format!("let (old_length) = {}(loc);", fns.length),
                                "let (length) = felt_to_uint256(calldata.len);".to_string(),
                                format!("{}(loc, length);", fns.set_length),
                                format!("{elem_name}(loc, calldata.len, calldata.ptr, 0);"),
                                format!("{delete_tail}(loc, length, old_length);"),
                                "return (loc,);".to_string(),
                            ],
                        ),
                    ]
                    .join("\n\n");

                    Ok(Synthesized {
                        code,
                        imports: synthesized.imports,
                    }
                    .implicits(Implicits::Storage)
                    .imports(&[UINT256, FELT_TO_UINT256]))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilgen::base::UtilGen;
    use crate::Target;
    use pretty_assertions::assert_eq;

    fn gen() -> CalldataImplicitConversionGen {
        let dyn_array = Rc::new(DynArrayGen::new());
        let write = Rc::new(StorageWriteGen::new());
        let delete = Rc::new(StorageDeleteGen::new(dyn_array.clone(), write.clone()));

        CalldataImplicitConversionGen::new(
            write,
            delete,
            dyn_array,
            Rc::new(DynArrayStructGen::new()),
        )
    }

    #[test]
    fn widening_into_storage() {
        let ns = Namespace::new(Target::Starknet);
        let gen = gen();

        let from = Type::Array(Box::new(Type::Uint(8)), ArrayLength::Dynamic);
        let to = Type::Array(Box::new(Type::Uint(256)), ArrayLength::Dynamic);

        let name = gen.resolve(&(from, to), &pt::Loc::Builtin, &ns).unwrap();
        assert_eq!(name, "CD_CONVERT0_D_uint8_to_D_uint256");

        let code = &gen.generated_code()[0].code;
        assert!(code.contains("let (elem) = felt_to_uint256(ptr[index]);"));
        assert!(code.contains("WS_WRITE0_Uint256(elem_loc, elem);"));
    }

    #[test]
    fn static_calldata_into_dynamic_storage() {
        let ns = Namespace::new(Target::Starknet);
        let gen = gen();

        let from = Type::Array(Box::new(Type::Int(8)), ArrayLength::Fixed(2.into()));
        let to = Type::Array(Box::new(Type::Int(16)), ArrayLength::Dynamic);

        gen.resolve(&(from, to), &pt::Loc::Builtin, &ns).unwrap();

        let code = &gen.generated_code()[0].code;
        assert!(code.contains("WARP_DARRAY0_felt_SET_LENGTH(loc, Uint256(2, 0));"));
        assert!(code.contains("let (e1) = warp_int8_to_int16(calldata[1]);"));
        assert!(code.contains("WS_WRITE0_felt(elem_loc1, e1);"));
    }

    #[test]
    fn signedness_and_width_pick_distinct_routines() {
        let ns = Namespace::new(Target::Starknet);
        let gen = gen();

        let dynamic = |ty: Type| Type::Array(Box::new(ty), ArrayLength::Dynamic);

        let signed = gen
            .resolve(
                &(dynamic(Type::Int(8)), dynamic(Type::Int(16))),
                &pt::Loc::Builtin,
                &ns,
            )
            .unwrap();
        let unsigned = gen
            .resolve(
                &(dynamic(Type::Uint(8)), dynamic(Type::Uint(16))),
                &pt::Loc::Builtin,
                &ns,
            )
            .unwrap();
        let wider = gen
            .resolve(
                &(dynamic(Type::Int(8)), dynamic(Type::Int(32))),
                &pt::Loc::Builtin,
                &ns,
            )
            .unwrap();

        assert_eq!(signed, "CD_CONVERT0_D_int8_to_D_int16");
        assert_eq!(unsigned, "CD_CONVERT1_D_uint8_to_D_uint16");
        assert_eq!(wider, "CD_CONVERT2_D_int8_to_D_int32");

        let records = gen.generated_code();
        assert_eq!(records.len(), 3);
        assert!(records[0].code.contains("warp_int8_to_int16(ptr[index])"));
        assert!(!records[1].code.contains("warp_int8_to_int16"));
        assert!(records[2].code.contains("warp_int8_to_int32(ptr[index])"));
    }

    #[test]
    fn struct_elements_are_rejected() {
        let mut ns = Namespace::new(Target::Starknet);
        let s = ns.add_struct("P", pt::Loc::Builtin, vec![("x", Type::Bool)]);
        let gen = gen();

        let from = Type::Array(Box::new(Type::Struct(s)), ArrayLength::Dynamic);
        assert!(gen
            .resolve(&(from.clone(), from), &pt::Loc::Builtin, &ns)
            .is_err());
    }
}
