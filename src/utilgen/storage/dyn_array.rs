// SPDX-License-Identifier: Apache-2.0

use super::access::StorageWriteGen;
use super::copy::StorageToStorageGen;
use super::delete::StorageDeleteGen;
use crate::cairo::imports::{
    HASH2, UINT256, UINT256_ADD, UINT256_EQ, UINT256_SUB, WARP_STORAGE, WARP_USED_STORAGE,
};
use crate::cairo::types::{CairoType, TypeConversionContext};
use crate::cairo::{function, storage_var, Implicits};
use crate::layout::{storage_key, storage_width, ArrayLayout};
use crate::sema::ast::{DataLocation, Namespace, Type};
use crate::utilgen::base::{
    unsupported, util_gen, FragmentKind, FunctionCache, Resolve, SynthResult, Synthesized,
};
use crate::utilgen::calldata::{
    CalldataImplicitConversionGen, CalldataToStorageGen, DynArrayStructGen,
};
use crate::utilgen::conversions::widen;
use crate::utilgen::memory::MemoryToStorageGen;
use num_bigint::BigInt;
use num_traits::One;
use solang_parser::pt;
use std::rc::Rc;

/// The routines every storage dynamic array operation addresses elements through
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DynArrayFns {
    /// `(loc: felt, index: Uint256) -> (res: felt)`, the location of an element
    pub elem_loc: String,
    /// `(loc: felt) -> (len: Uint256)`
    pub length: String,
    /// `(loc: felt, len: Uint256)`
    pub set_length: String,
    /// Storage cells per element
    pub elem_width: BigInt,
}

/// The one implementation of the storage dynamic array layout. Resolving an element type
/// yields the base name of its routines, see [`DynArrayGen::layout`].
pub struct DynArrayGen {
    cache: FunctionCache,
}

util_gen!(DynArrayGen, "storage.dyn_array");

impl DynArrayGen {
    pub fn new() -> Self {
        DynArrayGen {
            cache: FunctionCache::new("WARP_DARRAY", FragmentKind::FunctionDefinition),
        }
    }

    /// The addressing routines for arrays with elements of type `elem`
    pub fn layout(&self, elem: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult<DynArrayFns> {
        let name = self.resolve(elem, loc, ns)?;

        Ok(Self::functions(
            &name,
            ns.target.array_layout(),
            storage_width(elem, ns),
        ))
    }

    /// The addressing routines for the dynamic array type `array` (including bytes and string)
    pub fn layout_of(
        &self,
        array: &Type,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<DynArrayFns> {
        if !array.is_dynamic_array() {
            return Err(unsupported(loc, array, ns, "not a dynamic array"));
        }

        self.layout(&array.array_elem(), loc, ns)
    }

    fn functions(name: &str, layout: ArrayLayout, elem_width: BigInt) -> DynArrayFns {
        match layout {
            ArrayLayout::Strided => DynArrayFns {
                elem_loc: format!("{name}_IDX"),
                length: format!("{name}_LENGTH"),
                set_length: format!("{name}_SET_LENGTH"),
                elem_width,
            },
            ArrayLayout::Indexed => DynArrayFns {
                elem_loc: format!("{name}_IDX"),
                length: format!("{name}_LENGTH.read"),
                set_length: format!("{name}_LENGTH.write"),
                elem_width,
            },
        }
    }

    fn strided(name: &str, width: &BigInt) -> Synthesized {
        let offset = if width.is_one() {
            "(index.low + index.high * 2 ** 128)".to_string()
        } else {
            format!("(index.low + index.high * 2 ** 128) * {width}")
        };

        let code = [
            function(
                &format!("{name}_IDX"),
                Implicits::Storage,
                "loc: felt, index: Uint256",
                "res: felt",
                &[
                    "let (base) = hash2{hash_ptr=pedersen_ptr}(loc, 0);".to_string(),
                    format!("return (base + {offset},);"),
                ],
            ),
            function(
                &format!("{name}_LENGTH"),
                Implicits::Storage,
                "loc: felt",
                "len: Uint256",
                &[
                    "let (low) = WARP_STORAGE.read(loc);".to_string(),
                    "let (high) = WARP_STORAGE.read(loc + 1);".to_string(),
                    "return (Uint256(low=low, high=high),);".to_string(),
                ],
            ),
            function(
                &format!("{name}_SET_LENGTH"),
                Implicits::Storage,
                "loc: felt, len: Uint256",
                "",
                &[
                    "WARP_STORAGE.write(loc, len.low);".to_string(),
                    "WARP_STORAGE.write(loc + 1, len.high);".to_string(),
                    "return ();".to_string(),
                ],
            ),
        ]
        .join("\n\n");

        Synthesized::new(code)
            .implicits(Implicits::Storage)
            .imports(&[HASH2, UINT256, WARP_STORAGE])
    }

    fn indexed(name: &str, width: &BigInt) -> Synthesized {
        let code = [
            storage_var(name, "loc: felt, index: Uint256", "res_loc: felt"),
            storage_var(&format!("{name}_LENGTH"), "loc: felt", "len: Uint256"),
            function(
                &format!("{name}_IDX"),
                Implicits::Storage,
                "loc: felt, index: Uint256",
                "res: felt",
                &allocate_on_first_use(name, "loc, index", width),
            ),
        ]
        .join("\n\n");

        Synthesized::new(code)
            .implicits(Implicits::Storage)
            .imports(&[UINT256, WARP_USED_STORAGE])
    }
}

impl Resolve for DynArrayGen {
    /// The element type
    type Shape = Type;

    fn resolve(&self, elem: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        if elem.contains_mapping(ns) {
            return Err(unsupported(
                loc,
                &Type::Array(Box::new(elem.clone()), crate::sema::ast::ArrayLength::Dynamic),
                ns,
                "dynamic arrays of mappings cannot be laid out in storage",
            ));
        }

        let layout = ns.target.array_layout();
        let width = storage_width(elem, ns);

        self.cache.get_or_create(
            &storage_key(elem, ns),
            &format!("{layout}/{width}"),
            |name| {
                Ok(match layout {
                    ArrayLayout::Strided => Self::strided(name, &width),
                    ArrayLayout::Indexed => Self::indexed(name, &width),
                })
            },
        )
    }
}

/// `.length` of a storage dynamic array; this is the layout's own length routine
pub struct StorageDynArrayLengthGen {
    cache: FunctionCache,
    dyn_array: Rc<DynArrayGen>,
}

util_gen!(StorageDynArrayLengthGen, "storage.dyn_array_length", [dyn_array]);

impl StorageDynArrayLengthGen {
    pub fn new(dyn_array: Rc<DynArrayGen>) -> Self {
        StorageDynArrayLengthGen {
            cache: FunctionCache::new("WS_LENGTH", FragmentKind::FunctionDefinition),
            dyn_array,
        }
    }
}

impl Resolve for StorageDynArrayLengthGen {
    type Shape = Type;

    fn resolve(&self, array: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let fns = self.dyn_array.layout_of(array, loc, ns)?;

        Ok(self.cache.delegate(fns.length))
    }
}

/// `.pop()` on a storage dynamic array: `(loc: felt)`
pub struct DynArrayPopGen {
    cache: FunctionCache,
    dyn_array: Rc<DynArrayGen>,
    storage_delete: Rc<StorageDeleteGen>,
}

util_gen!(DynArrayPopGen, "storage.dyn_array_pop", [dyn_array, storage_delete]);

impl DynArrayPopGen {
    pub fn new(dyn_array: Rc<DynArrayGen>, storage_delete: Rc<StorageDeleteGen>) -> Self {
        DynArrayPopGen {
            cache: FunctionCache::new("WS_POP", FragmentKind::FunctionDefinition),
            dyn_array,
            storage_delete,
        }
    }
}

impl Resolve for DynArrayPopGen {
    type Shape = Type;

    fn resolve(&self, array: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let fns = self.dyn_array.layout_of(array, loc, ns)?;
        let elem = array.array_elem();

        self.cache
            .get_or_create(&storage_key(array, ns), &fns.elem_loc, |name| {
                let delete = self.storage_delete.resolve(&elem, loc, ns)?;

                let code = function(
                    name,
                    Implicits::Storage,
                    "loc: felt",
                    "",
                    &[
                        format!("let (len) = {}(loc);", fns.length),
                        "let (is_empty) = uint256_eq(len, Uint256(0, 0));".to_string(),
                        "with_attr error_message(\"Tried to pop an element from an empty array\") {".to_string(),
                        "    assert is_empty = 0;".to_string(),
                        "}".to_string(),
                        "let (new_len) = uint256_sub(len, Uint256(1, 0));".to_string(),
                        format!("let (elem_loc) = {}(loc, new_len);", fns.elem_loc),
                        format!("{delete}(elem_loc);"),
                        format!("{}(loc, new_len);", fns.set_length),
                        "return ();".to_string(),
                    ],
                );

                Ok(Synthesized::new(code)
                    .implicits(Implicits::Storage)
                    .imports(&[UINT256, UINT256_EQ, UINT256_SUB]))
            })
    }
}

/// `.push()` without an argument: grows the array and returns the new element's location
pub struct DynArrayPushWithoutArgGen {
    cache: FunctionCache,
    dyn_array: Rc<DynArrayGen>,
}

util_gen!(DynArrayPushWithoutArgGen, "storage.dyn_array_push.without_arg", [dyn_array]);

impl DynArrayPushWithoutArgGen {
    pub fn new(dyn_array: Rc<DynArrayGen>) -> Self {
        DynArrayPushWithoutArgGen {
            cache: FunctionCache::new("WS_PUSH", FragmentKind::FunctionDefinition),
            dyn_array,
        }
    }
}

impl Resolve for DynArrayPushWithoutArgGen {
    type Shape = Type;

    fn resolve(&self, array: &Type, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let fns = self.dyn_array.layout_of(array, loc, ns)?;

        self.cache
            .get_or_create(&storage_key(array, ns), &fns.elem_loc, |name| {
                let mut body = grow(&fns);
                body.push("return (elem_loc,);".to_string());

                let code = function(
                    name,
                    Implicits::Storage,
                    "loc: felt",
                    "elem_loc: felt",
                    &body,
                );

                Ok(Synthesized::new(code)
                    .implicits(Implicits::Storage)
                    .imports(&[UINT256, UINT256_ADD]))
            })
    }
}

/// Body of an `Indexed` layout lookup: the location recorded in `table` under `keys`,
/// allocated from `WARP_USED_STORAGE` on first use.
///
/// `WARP_USED_STORAGE` holds the last cell in use, so a fresh allocation starts one past it
/// and location 0 is never handed out; a zero table entry always means unallocated.
pub(super) fn allocate_on_first_use(table: &str, keys: &str, width: &BigInt) -> Vec<String> {
    vec![
        format!("let (existing) = {table}.read({keys});"),
        "if (existing == 0) {".to_string(),
        "    let (used) = WARP_USED_STORAGE.read();".to_string(),
        "    let res_loc = used + 1;".to_string(),
        format!("    WARP_USED_STORAGE.write(used + {width});"),
        format!("    {table}.write({keys}, res_loc);"),
        "    return (res_loc,);".to_string(),
        "}".to_string(),
        "return (existing,);".to_string(),
    ]
}

/// Statements appending one element and binding its location to `elem_loc`
fn grow(fns: &DynArrayFns) -> Vec<String> {
    vec![
        format!("let (len) = {}(loc);", fns.length),
        "let (new_len, carry) = uint256_add(len, Uint256(1, 0));".to_string(),
        "assert carry = 0;".to_string(),
        format!("{}(loc, new_len);", fns.set_length),
        format!("let (elem_loc) = {}(loc, len);", fns.elem_loc),
    ]
}

/// What is being pushed, and from where
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct PushArg {
    /// The storage dynamic array type
    pub array: Type,
    /// Type of the pushed value
    pub value: Type,
    /// Where the value lives, if it is a reference type
    pub location: DataLocation,
}

/// `.push(value)`: `(loc: felt, value: T) -> (elem_loc: felt)`
pub struct DynArrayPushWithArgGen {
    cache: FunctionCache,
    dyn_array: Rc<DynArrayGen>,
    storage_write: Rc<StorageWriteGen>,
    memory_to_storage: Rc<MemoryToStorageGen>,
    storage_to_storage: Rc<StorageToStorageGen>,
    calldata_to_storage: Rc<CalldataToStorageGen>,
    calldata_convert: Rc<CalldataImplicitConversionGen>,
    dyn_array_struct: Rc<DynArrayStructGen>,
}

util_gen!(
    DynArrayPushWithArgGen,
    "storage.dyn_array_push.with_arg",
    [
        dyn_array,
        storage_write,
        memory_to_storage,
        storage_to_storage,
        calldata_to_storage,
        calldata_convert,
        dyn_array_struct
    ]
);

impl DynArrayPushWithArgGen {
    pub fn new(
        dyn_array: Rc<DynArrayGen>,
        storage_write: Rc<StorageWriteGen>,
        memory_to_storage: Rc<MemoryToStorageGen>,
        storage_to_storage: Rc<StorageToStorageGen>,
        calldata_to_storage: Rc<CalldataToStorageGen>,
        calldata_convert: Rc<CalldataImplicitConversionGen>,
        dyn_array_struct: Rc<DynArrayStructGen>,
    ) -> Self {
        DynArrayPushWithArgGen {
            cache: FunctionCache::new("WS_PUSH_ARG", FragmentKind::FunctionDefinition),
            dyn_array,
            storage_write,
            memory_to_storage,
            storage_to_storage,
            calldata_to_storage,
            calldata_convert,
            dyn_array_struct,
        }
    }

    /// Parameter type of the pushed value and the statements storing it at `elem_loc`
    fn store(
        &self,
        arg: &PushArg,
        elem: &Type,
        loc: &pt::Loc,
        ns: &Namespace,
    ) -> SynthResult<(String, Vec<String>, Implicits, Synthesized)> {
        let synthesized = Synthesized::default();

        if elem.is_value_type() {
            let write = self.storage_write.resolve(elem, loc, ns)?;
            let param = CairoType::from_sol(&arg.value, ns, TypeConversionContext::Ref)
                .map_err(|e| unsupported(loc, &arg.value, ns, &e))?;

            let Some(conversion) = widen(&arg.value, elem, "value", "converted") else {
                return Err(unsupported(
                    loc,
                    &arg.value,
                    ns,
                    &format!("cannot be pushed onto '{}'", arg.array.to_string(ns)),
                ));
            };

            let synthesized = conversion.imports_into(synthesized);

            return Ok((
                param.to_string(),
                vec![
                    conversion.code.clone(),
                    format!("{write}(elem_loc, converted);"),
                ],
                Implicits::Storage,
                synthesized,
            ));
        }

        match arg.location {
            DataLocation::Memory if &arg.value == elem => {
                let copy = self.memory_to_storage.resolve(elem, loc, ns)?;

                Ok((
                    "felt".to_string(),
                    vec![format!("{copy}(elem_loc, value);")],
                    Implicits::StorageMemory,
                    synthesized,
                ))
            }
            DataLocation::Storage if &arg.value == elem => {
                let copy = self.storage_to_storage.resolve(elem, loc, ns)?;

                Ok((
                    "felt".to_string(),
                    vec![format!("{copy}(elem_loc, value);")],
                    Implicits::Storage,
                    synthesized,
                ))
            }
            DataLocation::Calldata => {
                let param = CairoType::from_sol(&arg.value, ns, TypeConversionContext::CallDataRef)
                    .map_err(|e| unsupported(loc, &arg.value, ns, &e))?;

                if let CairoType::DynArray { .. } = param {
                    self.dyn_array_struct.resolve(&arg.value, loc, ns)?;
                }

                let copy = if &arg.value == elem {
                    self.calldata_to_storage.resolve(elem, loc, ns)?
                } else {
                    self.calldata_convert
                        .resolve(&(arg.value.clone(), elem.clone()), loc, ns)?
                };

                Ok((
                    param.to_string(),
                    vec![format!("{copy}(elem_loc, value);")],
                    Implicits::Storage,
                    synthesized,
                ))
            }
            _ => Err(unsupported(
                loc,
                &arg.value,
                ns,
                &format!(
                    "{} value must be converted before it is pushed onto '{}'",
                    arg.location,
                    arg.array.to_string(ns)
                ),
            )),
        }
    }
}

impl Resolve for DynArrayPushWithArgGen {
    type Shape = PushArg;

    fn resolve(&self, arg: &PushArg, loc: &pt::Loc, ns: &Namespace) -> SynthResult {
        let fns = self.dyn_array.layout_of(&arg.array, loc, ns)?;
        let elem = arg.array.array_elem();

        let location = if arg.value.is_value_type() {
            "value".to_string()
        } else {
            arg.location.to_string()
        };

        let key = format!(
            "{}_{}_{}",
            arg.array.mangled(ns),
            location,
            arg.value.mangled(ns)
        );

        self.cache.get_or_create(&key, &fns.elem_loc, |name| {
            let (param, store, implicits, synthesized) = self.store(arg, &elem, loc, ns)?;

            let mut body = grow(&fns);
            body.extend(store);
            body.push("return (elem_loc,);".to_string());

            let code = function(
                name,
                implicits,
                &format!("loc: felt, value: {param}"),
                "elem_loc: felt",
                &body,
            );

            let synthesized = Synthesized {
                code,
                imports: synthesized.imports,
            };

            Ok(synthesized
                .implicits(implicits)
                .imports(&[UINT256, UINT256_ADD]))
        })
    }
}
