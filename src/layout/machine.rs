// SPDX-License-Identifier: Apache-2.0

//! A native interpreter of the storage and memory layout.
//!
//! The generated Cairo routines and this machine compute every address from the same
//! functions in [`crate::layout`], so laws about the layout (copying storage to memory
//! and back is the identity, delete clears every cell it owns) can be checked here
//! without running Cairo. `hash2` is keccak based rather than pedersen; only the shape
//! of the address computation matters.

use super::{
    memory_member_offset, memory_slot_width, storage_key, storage_member_offset, storage_width,
    ArrayLayout, MEMORY_DYN_ARRAY_HEADER,
};
use crate::sema::ast::{ArrayLength, Namespace, Type};
use num_bigint::{BigInt, Sign};
use num_traits::{One, ToPrimitive, Zero};
use std::collections::{BTreeMap, HashMap};
use tiny_keccak::{Hasher, Keccak};

/// The Starknet field prime, 2^251 + 17 * 2^192 + 1
pub fn felt_prime() -> BigInt {
    (BigInt::one() << 251) + (BigInt::from(17) << 192) + 1
}

pub fn hash2(a: &BigInt, b: &BigInt) -> BigInt {
    let mut hasher = Keccak::v256();
    hasher.update(&word(a));
    hasher.update(&word(b));

    let mut out = [0u8; 32];
    hasher.finalize(&mut out);

    BigInt::from_bytes_be(Sign::Plus, &out) % felt_prime()
}

fn word(v: &BigInt) -> [u8; 32] {
    let (_, bytes) = v.to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}

fn split(v: &BigInt) -> (BigInt, BigInt) {
    let mask = (BigInt::one() << 128) - 1;
    (v & &mask, v >> 128)
}

pub struct FeltMachine<'a> {
    ns: &'a Namespace,
    layout: ArrayLayout,
    storage: BTreeMap<BigInt, BigInt>,
    memory: Vec<BigInt>,
    element_tables: HashMap<(String, BigInt, BigInt), BigInt>,
    length_tables: HashMap<(String, BigInt), BigInt>,
    mapping_tables: HashMap<(String, BigInt, BigInt), BigInt>,
    used_storage: BigInt,
}

impl<'a> FeltMachine<'a> {
    pub fn new(ns: &'a Namespace, layout: ArrayLayout) -> Self {
        FeltMachine {
            ns,
            layout,
            storage: BTreeMap::new(),
            // address 0 is the null pointer
            memory: vec![BigInt::zero()],
            element_tables: HashMap::new(),
            length_tables: HashMap::new(),
            mapping_tables: HashMap::new(),
            used_storage: BigInt::zero(),
        }
    }

    /// Start the `Indexed` allocator after `used`, the last cell taken by state variables,
    /// as the front end initializes `WARP_USED_STORAGE`
    pub fn with_used_storage(mut self, used: BigInt) -> Self {
        self.used_storage = used;
        self
    }

    /// The value of `WARP_USED_STORAGE`: the last cell in use
    pub fn used_storage(&self) -> &BigInt {
        &self.used_storage
    }

    /// All non-zero storage cells
    pub fn storage(&self) -> &BTreeMap<BigInt, BigInt> {
        &self.storage
    }

    pub fn read_cell(&self, loc: &BigInt) -> BigInt {
        self.storage.get(loc).cloned().unwrap_or_default()
    }

    pub fn write_cell(&mut self, loc: &BigInt, value: BigInt) {
        if value.is_zero() {
            self.storage.remove(loc);
        } else {
            self.storage.insert(loc.clone(), value);
        }
    }

    pub fn read_value(&self, ty: &Type, loc: &BigInt) -> BigInt {
        if ty.is_wide() {
            self.read_cell(loc) + (self.read_cell(&(loc + 1)) << 128)
        } else {
            self.read_cell(loc)
        }
    }

    pub fn write_value(&mut self, ty: &Type, loc: &BigInt, value: &BigInt) {
        if ty.is_wide() {
            let (low, high) = split(value);
            self.write_cell(loc, low);
            self.write_cell(&(loc + 1), high);
        } else {
            self.write_cell(loc, value.clone());
        }
    }

    pub fn dyn_array_length(&self, elem: &Type, loc: &BigInt) -> BigInt {
        match self.layout {
            ArrayLayout::Strided => self.read_value(&Type::Uint(256), loc),
            ArrayLayout::Indexed => self
                .length_tables
                .get(&(storage_key(elem, self.ns), loc.clone()))
                .cloned()
                .unwrap_or_default(),
        }
    }

    pub fn set_dyn_array_length(&mut self, elem: &Type, loc: &BigInt, len: &BigInt) {
        match self.layout {
            ArrayLayout::Strided => self.write_value(&Type::Uint(256), loc, len),
            ArrayLayout::Indexed => {
                self.length_tables
                    .insert((storage_key(elem, self.ns), loc.clone()), len.clone());
            }
        }
    }

    /// Address of element `index` of the dynamic array at `loc`
    pub fn dyn_array_element(&mut self, elem: &Type, loc: &BigInt, index: &BigInt) -> BigInt {
        let width = storage_width(elem, self.ns);

        match self.layout {
            ArrayLayout::Strided => hash2(loc, &BigInt::zero()) + index * width,
            ArrayLayout::Indexed => {
                let entry = (storage_key(elem, self.ns), loc.clone(), index.clone());

                if let Some(found) = self.element_tables.get(&entry) {
                    return found.clone();
                }

                let allocated = self.allocate(&width);
                self.element_tables.insert(entry, allocated.clone());
                allocated
            }
        }
    }

    /// Address of the value stored under `key` in the mapping at `loc`
    pub fn mapping_slot(&mut self, mapping: &Type, loc: &BigInt, key: &BigInt) -> BigInt {
        let Type::Mapping(key_ty, value_ty) = mapping else {
            panic!("{mapping:?} is not a mapping");
        };

        match self.layout {
            ArrayLayout::Strided if key_ty.is_wide() => {
                let (low, high) = split(key);
                hash2(&hash2(loc, &low), &high)
            }
            ArrayLayout::Strided => hash2(loc, key),
            ArrayLayout::Indexed => {
                let entry = (storage_key(mapping, self.ns), loc.clone(), key.clone());

                if let Some(found) = self.mapping_tables.get(&entry) {
                    return found.clone();
                }

                let allocated = self.allocate(&storage_width(value_ty, self.ns));
                self.mapping_tables.insert(entry, allocated.clone());
                allocated
            }
        }
    }

    /// Cells are allocated after the last one in use, so location 0 is never handed out
    fn allocate(&mut self, width: &BigInt) -> BigInt {
        let loc = &self.used_storage + 1;
        self.used_storage += width;
        loc
    }

    pub fn alloc(&mut self, width: &BigInt) -> BigInt {
        let ptr = BigInt::from(self.memory.len());
        let width = width.to_usize().unwrap_or_default();
        self.memory.resize(self.memory.len() + width, BigInt::zero());
        ptr
    }

    pub fn mem_read(&self, ptr: &BigInt) -> BigInt {
        ptr.to_usize()
            .and_then(|p| self.memory.get(p))
            .cloned()
            .unwrap_or_default()
    }

    pub fn mem_write(&mut self, ptr: &BigInt, value: BigInt) {
        match ptr.to_usize() {
            Some(p) if p < self.memory.len() => self.memory[p] = value,
            _ => panic!("write to unallocated memory at {ptr}"),
        }
    }

    pub fn mem_read_value(&self, ty: &Type, ptr: &BigInt) -> BigInt {
        if ty.is_wide() {
            self.mem_read(ptr) + (self.mem_read(&(ptr + 1)) << 128)
        } else {
            self.mem_read(ptr)
        }
    }

    pub fn mem_write_value(&mut self, ty: &Type, ptr: &BigInt, value: &BigInt) {
        if ty.is_wide() {
            let (low, high) = split(value);
            self.mem_write(ptr, low);
            self.mem_write(&(ptr + 1), high);
        } else {
            self.mem_write(ptr, value.clone());
        }
    }

    /// Allocate a zeroed memory dynamic array
    pub fn new_dyn_array(&mut self, elem: &Type, len: &BigInt) -> BigInt {
        let ptr = self.alloc(&(len * memory_slot_width(elem) + MEMORY_DYN_ARRAY_HEADER));
        self.mem_write_value(&Type::Uint(256), &ptr, len);
        ptr
    }

    pub fn mem_dyn_array_length(&self, ptr: &BigInt) -> BigInt {
        self.mem_read_value(&Type::Uint(256), ptr)
    }

    /// Address of the slot of element `index` of the memory dynamic array at `ptr`
    pub fn mem_dyn_array_element(elem: &Type, ptr: &BigInt, index: &BigInt) -> BigInt {
        ptr + MEMORY_DYN_ARRAY_HEADER + index * memory_slot_width(elem)
    }

    /// Copy a storage value of reference type into a fresh memory allocation
    pub fn storage_to_memory(&mut self, ty: &Type, loc: &BigInt) -> Result<BigInt, String> {
        let ns = self.ns;

        match ty {
            Type::Struct(n) => {
                let ptr = self.alloc(&super::memory_allocation_width(ty, ns));

                for (field_no, field) in ns.structs[*n].fields.iter().enumerate() {
                    let from = loc + storage_member_offset(*n, field_no, ns);
                    let to = &ptr + memory_member_offset(*n, field_no, ns);
                    self.copy_to_memory_slot(&field.ty, &from, &to)?;
                }

                Ok(ptr)
            }
            Type::Array(elem, ArrayLength::Fixed(len)) => {
                let ptr = self.alloc(&super::memory_allocation_width(ty, ns));
                let storage_stride = storage_width(elem, self.ns);
                let memory_stride = memory_slot_width(elem);

                for i in 0..count(len)? {
                    let from = loc + &storage_stride * i;
                    let to = &ptr + &memory_stride * i;
                    self.copy_to_memory_slot(elem, &from, &to)?;
                }

                Ok(ptr)
            }
            Type::Array(_, ArrayLength::Dynamic) | Type::DynamicBytes | Type::String => {
                let elem = ty.array_elem();
                let len = self.dyn_array_length(&elem, loc);
                let ptr = self.new_dyn_array(&elem, &len);

                for i in 0..count(&len)? {
                    let index = BigInt::from(i);
                    let from = self.dyn_array_element(&elem, loc, &index);
                    let to = Self::mem_dyn_array_element(&elem, &ptr, &index);
                    self.copy_to_memory_slot(&elem, &from, &to)?;
                }

                Ok(ptr)
            }
            Type::Mapping(..) => Err("mappings cannot be copied to memory".to_string()),
            _ => Err(format!("{} is not a reference type", ty.to_string(self.ns))),
        }
    }

    fn copy_to_memory_slot(&mut self, ty: &Type, from: &BigInt, to: &BigInt) -> Result<(), String> {
        if ty.is_value_type() {
            let value = self.read_value(ty, from);
            self.mem_write_value(ty, to, &value);
        } else {
            let ptr = self.storage_to_memory(ty, from)?;
            self.mem_write(to, ptr);
        }

        Ok(())
    }

    /// Copy a memory value of reference type into storage at `loc`
    pub fn memory_to_storage(
        &mut self,
        ty: &Type,
        ptr: &BigInt,
        loc: &BigInt,
    ) -> Result<(), String> {
        let ns = self.ns;

        match ty {
            Type::Struct(n) => {
                for (field_no, field) in ns.structs[*n].fields.iter().enumerate() {
                    let from = ptr + memory_member_offset(*n, field_no, ns);
                    let to = loc + storage_member_offset(*n, field_no, ns);
                    self.copy_from_memory_slot(&field.ty, &from, &to)?;
                }

                Ok(())
            }
            Type::Array(elem, ArrayLength::Fixed(len)) => {
                let storage_stride = storage_width(elem, self.ns);
                let memory_stride = memory_slot_width(elem);

                for i in 0..count(len)? {
                    let from = ptr + &memory_stride * i;
                    let to = loc + &storage_stride * i;
                    self.copy_from_memory_slot(elem, &from, &to)?;
                }

                Ok(())
            }
            Type::Array(_, ArrayLength::Dynamic) | Type::DynamicBytes | Type::String => {
                let elem = ty.array_elem();
                let new_len = self.mem_dyn_array_length(ptr);
                let old_len = self.dyn_array_length(&elem, loc);

                self.set_dyn_array_length(&elem, loc, &new_len);

                for i in 0..count(&new_len)? {
                    let index = BigInt::from(i);
                    let from = Self::mem_dyn_array_element(&elem, ptr, &index);
                    let to = self.dyn_array_element(&elem, loc, &index);
                    self.copy_from_memory_slot(&elem, &from, &to)?;
                }

                for i in count(&new_len)?..count(&old_len)? {
                    let to = self.dyn_array_element(&elem, loc, &BigInt::from(i));
                    self.storage_delete(&elem, &to);
                }

                Ok(())
            }
            Type::Mapping(..) => Err("mappings cannot be copied from memory".to_string()),
            _ => Err(format!("{} is not a reference type", ty.to_string(self.ns))),
        }
    }

    fn copy_from_memory_slot(
        &mut self,
        ty: &Type,
        from: &BigInt,
        to: &BigInt,
    ) -> Result<(), String> {
        if ty.is_value_type() {
            let value = self.mem_read_value(ty, from);
            self.write_value(ty, to, &value);
            Ok(())
        } else {
            let ptr = self.mem_read(from);
            self.memory_to_storage(ty, &ptr, to)
        }
    }

    /// Reset a storage value to its default. Mappings are left alone, their keys are unknown.
    pub fn storage_delete(&mut self, ty: &Type, loc: &BigInt) {
        let ns = self.ns;

        match ty {
            _ if ty.is_value_type() => self.write_value(ty, loc, &BigInt::zero()),
            Type::Struct(n) => {
                for (field_no, field) in ns.structs[*n].fields.iter().enumerate() {
                    let at = loc + storage_member_offset(*n, field_no, ns);
                    self.storage_delete(&field.ty, &at);
                }
            }
            Type::Array(elem, ArrayLength::Fixed(len)) => {
                let stride = storage_width(elem, self.ns);
                let mut at = loc.clone();
                let mut i = BigInt::zero();

                while &i < len {
                    self.storage_delete(elem, &at);
                    at += &stride;
                    i += 1;
                }
            }
            Type::Array(_, ArrayLength::Dynamic) | Type::DynamicBytes | Type::String => {
                let elem = ty.array_elem();
                let len = self.dyn_array_length(&elem, loc);
                let mut i = BigInt::zero();

                while i < len {
                    let at = self.dyn_array_element(&elem, loc, &i);
                    self.storage_delete(&elem, &at);
                    i += 1;
                }

                self.set_dyn_array_length(&elem, loc, &BigInt::zero());
            }
            Type::Mapping(..) => (),
            _ => unreachable!(),
        }
    }
}

fn count(len: &BigInt) -> Result<usize, String> {
    len.to_usize()
        .ok_or_else(|| format!("length {len} too large to iterate"))
}
