// SPDX-License-Identifier: Apache-2.0

//! The utility function synthesis engine. Code generation asks a generator for the routine
//! implementing an operation on a type shape, e.g. reading a `uint8[]` from storage, and
//! splices the returned name into its own output. Each generator builds a routine at most once
//! per shape. At the end of a run the orchestrator emits everything that was requested
//! together with the imports it needs.

pub mod abi;
pub mod base;
pub mod calldata;
pub mod checks;
pub(crate) mod conversions;
pub mod memory;
pub mod storage;
pub mod utils;

use crate::cairo::imports::{merge_imports, ImportMap};
use base::{FragmentKind, UtilGen};
use indexmap::IndexMap;
use itertools::Itertools;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_derive::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Check indexes into arrays against their length
    pub bounds_checks: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            bounds_checks: true,
        }
    }
}

/// Records every generator as it is constructed. A generator may only depend on generators
/// recorded before it, so the graph is acyclic.
#[derive(Default)]
struct Wiring {
    graph: DiGraph<&'static str, ()>,
    nodes: IndexMap<&'static str, NodeIndex>,
    all: Vec<Rc<dyn UtilGen>>,
}

impl Wiring {
    fn add<G: UtilGen + 'static>(&mut self, gen: G) -> Rc<G> {
        let path = gen.path();
        let node = self.graph.add_node(path);

        for dep in gen.dependencies() {
            let Some(&dep_node) = self.nodes.get(dep) else {
                panic!("{path} depends on {dep} which has not been constructed");
            };

            self.graph.add_edge(node, dep_node, ());
        }

        let previous = self.nodes.insert(path, node);
        assert!(previous.is_none(), "{path} constructed twice");

        let gen = Rc::new(gen);
        self.all.push(gen.clone());

        gen
    }
}

pub struct DynArrayPushGens {
    pub with_arg: Rc<storage::DynArrayPushWithArgGen>,
    pub without_arg: Rc<storage::DynArrayPushWithoutArgGen>,
}

pub struct StorageGens {
    pub read: Rc<storage::StorageReadGen>,
    pub write: Rc<storage::StorageWriteGen>,
    pub member_access: Rc<storage::StorageMemberAccessGen>,
    pub static_array_index_access: Rc<storage::StorageStaticArrayIndexAccessGen>,
    pub dyn_array_index_access: Rc<storage::StorageDynArrayIndexAccessGen>,
    pub dyn_array_length: Rc<storage::StorageDynArrayLengthGen>,
    pub dyn_array_pop: Rc<storage::DynArrayPopGen>,
    pub dyn_array_push: DynArrayPushGens,
    pub mapping_index_access: Rc<storage::MappingIndexAccessGen>,
    pub delete: Rc<storage::StorageDeleteGen>,
    pub to_memory: Rc<storage::StorageToMemoryGen>,
    pub to_storage: Rc<storage::StorageToStorageGen>,
    pub to_calldata: Rc<storage::StorageToCalldataGen>,
    dyn_array: Rc<storage::DynArrayGen>,
}

impl StorageGens {
    /// The layout of storage dynamic arrays, shared by every generator touching one
    pub fn dyn_array(&self) -> &storage::DynArrayGen {
        &self.dyn_array
    }
}

pub struct MemoryGens {
    pub read: Rc<memory::MemoryReadGen>,
    pub write: Rc<memory::MemoryWriteGen>,
    pub member_access: Rc<memory::MemoryMemberAccessGen>,
    pub static_array_index_access: Rc<memory::MemoryStaticArrayIndexAccessGen>,
    pub dyn_array_length: Rc<memory::MemoryDynArrayLengthGen>,
    pub r#struct: Rc<memory::MemoryStructGen>,
    pub array_literal: Rc<memory::MemoryArrayLiteralGen>,
    pub concat: Rc<memory::MemoryConcatGen>,
    pub convert: Rc<memory::MemoryImplicitConversionGen>,
    pub to_storage: Rc<memory::MemoryToStorageGen>,
    pub to_calldata: Rc<memory::MemoryToCalldataGen>,
}

pub struct CalldataGens {
    pub dyn_array_struct_constructor: Rc<calldata::DynArrayStructGen>,
    pub to_memory: Rc<calldata::CalldataToMemoryGen>,
    pub to_storage: Rc<calldata::CalldataToStorageGen>,
    pub convert: Rc<calldata::CalldataImplicitConversionGen>,
}

pub struct AbiGens {
    pub encode: Rc<abi::AbiEncodeGen>,
    pub encode_packed: Rc<abi::AbiEncodePackedGen>,
    pub encode_with_selector: Rc<abi::AbiEncodeWithSelectorGen>,
    pub encode_with_signature: Rc<abi::AbiEncodeWithSignatureGen>,
    pub decode: Rc<abi::AbiDecodeGen>,
}

pub struct BoundCheckGens {
    pub input_check: Rc<checks::InputCheckGen>,
    pub enums: Rc<checks::EnumInputCheckGen>,
}

pub struct UtilsGens {
    pub encode_as_felt: Rc<utils::EncodeAsFeltGen>,
}

/// Owns every generator of one compilation run
pub struct CairoUtilFuncGen {
    pub storage: StorageGens,
    pub memory: MemoryGens,
    pub calldata: CalldataGens,
    pub abi: AbiGens,
    pub bound_checks: BoundCheckGens,
    pub utils: UtilsGens,
    generators: Vec<Rc<dyn UtilGen>>,
    graph: DiGraph<&'static str, ()>,
}

impl CairoUtilFuncGen {
    pub fn new(opt: &Options) -> Self {
        let mut w = Wiring::default();

        // leaves
        let dyn_array = w.add(storage::DynArrayGen::new());
        let storage_read = w.add(storage::StorageReadGen::new());
        let storage_write = w.add(storage::StorageWriteGen::new());
        let memory_read = w.add(memory::MemoryReadGen::new());
        let memory_write = w.add(memory::MemoryWriteGen::new());
        let dyn_array_struct = w.add(calldata::DynArrayStructGen::new());

        let storage_delete = w.add(storage::StorageDeleteGen::new(
            dyn_array.clone(),
            storage_write.clone(),
        ));

        let storage_to_storage = w.add(storage::StorageToStorageGen::new(
            dyn_array.clone(),
            storage_delete.clone(),
            storage_read.clone(),
            storage_write.clone(),
        ));
        let memory_to_storage = w.add(memory::MemoryToStorageGen::new(
            dyn_array.clone(),
            storage_delete.clone(),
            storage_write.clone(),
            memory_read.clone(),
        ));
        let calldata_to_storage = w.add(calldata::CalldataToStorageGen::new(
            dyn_array.clone(),
            storage_write.clone(),
            dyn_array_struct.clone(),
            storage_delete.clone(),
        ));
        let calldata_convert = w.add(calldata::CalldataImplicitConversionGen::new(
            storage_write.clone(),
            storage_delete.clone(),
            dyn_array.clone(),
            dyn_array_struct.clone(),
        ));

        let storage = StorageGens {
            member_access: w.add(storage::StorageMemberAccessGen::new()),
            static_array_index_access: w.add(storage::StorageStaticArrayIndexAccessGen::new(
                opt.bounds_checks,
            )),
            dyn_array_index_access: w.add(storage::StorageDynArrayIndexAccessGen::new(
                dyn_array.clone(),
                opt.bounds_checks,
            )),
            dyn_array_length: w.add(storage::StorageDynArrayLengthGen::new(dyn_array.clone())),
            dyn_array_pop: w.add(storage::DynArrayPopGen::new(
                dyn_array.clone(),
                storage_delete.clone(),
            )),
            dyn_array_push: DynArrayPushGens {
                with_arg: w.add(storage::DynArrayPushWithArgGen::new(
                    dyn_array.clone(),
                    storage_write.clone(),
                    memory_to_storage.clone(),
                    storage_to_storage.clone(),
                    calldata_to_storage.clone(),
                    calldata_convert.clone(),
                    dyn_array_struct.clone(),
                )),
                without_arg: w.add(storage::DynArrayPushWithoutArgGen::new(dyn_array.clone())),
            },
            mapping_index_access: w.add(storage::MappingIndexAccessGen::new()),
            to_memory: w.add(storage::StorageToMemoryGen::new(
                dyn_array.clone(),
                storage_read.clone(),
                memory_write.clone(),
            )),
            to_calldata: w.add(storage::StorageToCalldataGen::new(
                dyn_array.clone(),
                storage_read.clone(),
                dyn_array_struct.clone(),
            )),
            to_storage: storage_to_storage,
            delete: storage_delete,
            read: storage_read,
            write: storage_write,
            dyn_array,
        };

        let memory = MemoryGens {
            member_access: w.add(memory::MemoryMemberAccessGen::new()),
            static_array_index_access: w.add(memory::MemoryStaticArrayIndexAccessGen::new(
                opt.bounds_checks,
            )),
            dyn_array_length: w.add(memory::MemoryDynArrayLengthGen::new()),
            r#struct: w.add(memory::MemoryStructGen::new(memory_write.clone())),
            array_literal: w.add(memory::MemoryArrayLiteralGen::new(memory_write.clone())),
            concat: w.add(memory::MemoryConcatGen::new()),
            convert: w.add(memory::MemoryImplicitConversionGen::new(
                memory_write.clone(),
                memory_read.clone(),
            )),
            to_calldata: w.add(memory::MemoryToCalldataGen::new(
                dyn_array_struct.clone(),
                memory_read.clone(),
            )),
            to_storage: memory_to_storage,
            read: memory_read.clone(),
            write: memory_write.clone(),
        };

        let calldata = CalldataGens {
            to_memory: w.add(calldata::CalldataToMemoryGen::new(
                memory_write.clone(),
                dyn_array_struct.clone(),
            )),
            to_storage: calldata_to_storage,
            convert: calldata_convert,
            dyn_array_struct_constructor: dyn_array_struct.clone(),
        };

        let encode = w.add(abi::AbiEncodeGen::new(memory_read.clone()));
        let encode_with_selector = w.add(abi::AbiEncodeWithSelectorGen::new(encode.clone()));

        let abi = AbiGens {
            encode_packed: w.add(abi::AbiEncodePackedGen::new(memory_read)),
            encode_with_signature: w.add(abi::AbiEncodeWithSignatureGen::new(
                encode_with_selector.clone(),
            )),
            decode: w.add(abi::AbiDecodeGen::new(memory_write)),
            encode,
            encode_with_selector,
        };

        let enums = w.add(checks::EnumInputCheckGen::new());

        let bound_checks = BoundCheckGens {
            input_check: w.add(checks::InputCheckGen::new(
                enums.clone(),
                dyn_array_struct.clone(),
            )),
            enums,
        };

        let utils = UtilsGens {
            encode_as_felt: w.add(utils::EncodeAsFeltGen::new(dyn_array_struct)),
        };

        debug!(generators = w.all.len(), "utility generators constructed");

        CairoUtilFuncGen {
            storage,
            memory,
            calldata,
            abi,
            bound_checks,
            utils,
            generators: w.all,
            graph: w.graph,
        }
    }

    /// Every generator, in construction order
    pub fn generators(&self) -> &[Rc<dyn UtilGen>] {
        &self.generators
    }

    /// Edges point from a generator to the generators it calls into
    pub fn dependency_graph(&self) -> &DiGraph<&'static str, ()> {
        &self.graph
    }

    /// The imports of everything synthesized so far. Symbols required by more than one
    /// generator appear once.
    pub fn collect_imports(&self) -> ImportMap {
        let imports: Vec<ImportMap> = self
            .generators
            .iter()
            .filter(|gen| gen.is_used())
            .map(|gen| gen.required_imports())
            .collect();

        merge_imports(&imports)
    }

    /// All synthesized fragments, type definitions first, separated by blank lines
    pub fn emit(&self) -> String {
        let (types, functions): (Vec<_>, Vec<_>) = self
            .generators
            .iter()
            .flat_map(|gen| gen.generated_code())
            .partition(|f| f.kind == FragmentKind::TypeDefinition);

        types
            .iter()
            .chain(functions.iter())
            .map(|f| f.code.as_str())
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sema::ast::{ArrayLength, Namespace, Type};
    use crate::utilgen::base::Resolve;
    use crate::Target;
    use pretty_assertions::assert_eq;
    use solang_parser::pt;

    #[test]
    fn nothing_requested_emits_nothing() {
        let gen = CairoUtilFuncGen::new(&Options::default());

        assert!(gen.generators().iter().all(|gen| !gen.is_used()));
        assert!(gen.collect_imports().is_empty());
        assert_eq!(gen.emit(), "");
    }

    #[test]
    fn every_generator_is_listed_once() {
        let gen = CairoUtilFuncGen::new(&Options::default());

        let paths: Vec<_> = gen.generators().iter().map(|gen| gen.path()).collect();
        assert_eq!(paths.len(), paths.iter().unique().count());
        assert_eq!(paths.len(), 38);
        assert_eq!(gen.dependency_graph().node_count(), paths.len());
    }

    #[test]
    fn type_definitions_come_first() {
        let ns = Namespace::new(Target::Starknet);
        let gen = CairoUtilFuncGen::new(&Options::default());

        let ty = Type::Array(Box::new(Type::Uint(256)), ArrayLength::Dynamic);

        // the storage copy is generated before the struct definition it needs
        gen.storage
            .to_calldata
            .resolve(&ty, &pt::Loc::Builtin, &ns)
            .unwrap();

        let code = gen.emit();
        assert!(code.starts_with("struct cd_dynarray_Uint256 {"));
        assert!(code.contains("\n\nfunc WS_TO_CALLDATA0_"));
    }
}
