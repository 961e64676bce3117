// SPDX-License-Identifier: Apache-2.0

use crate::cairo::imports::{add_import, add_symbol, merge_imports, Import, ImportMap};
use crate::cairo::Implicits;
use crate::sema::ast::{Diagnostic, Namespace, Type};
use indexmap::{IndexMap, IndexSet};
use num_bigint::BigInt;
use num_traits::One;
use solang_parser::pt;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Generated names keep at most this much of the key, the counter already makes them unique
const MAX_NAME_KEY: usize = 48;

/// Whether a fragment declares a type or a function. Type definitions are emitted first.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum FragmentKind {
    TypeDefinition,
    FunctionDefinition,
}

/// A synthesized Cairo fragment. Immutable once created.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct GeneratedFunction {
    pub name: String,
    /// Structural key of the shape it was generated for
    pub key: String,
    /// The physical contract of the fragment; equal keys must have equal signatures
    pub signature: String,
    pub kind: FragmentKind,
    pub code: String,
    pub imports: ImportMap,
}

pub type SynthResult<T = String> = Result<T, Diagnostic>;

/// The output of building one fragment
#[derive(Default, Debug)]
pub struct Synthesized {
    pub code: String,
    pub imports: ImportMap,
}

impl Synthesized {
    pub fn new(code: String) -> Self {
        Synthesized {
            code,
            imports: ImportMap::new(),
        }
    }

    pub fn import(mut self, import: Import) -> Self {
        add_import(&mut self.imports, import);
        self
    }

    pub fn imports(mut self, imports: &[Import]) -> Self {
        for import in imports {
            add_import(&mut self.imports, *import);
        }
        self
    }

    /// Import a symbol whose name depends on the shape, like a width specific helper
    pub fn symbol(mut self, module: &str, symbol: &str) -> Self {
        add_symbol(&mut self.imports, module, symbol);
        self
    }

    pub fn implicits(self, implicits: Implicits) -> Self {
        self.imports(implicits.imports())
    }
}

enum Slot {
    /// Being built; recursive shapes resolve to the reserved name
    Pending { name: String, signature: String },
    Done(Rc<GeneratedFunction>),
}

impl Slot {
    fn name(&self) -> &str {
        match self {
            Slot::Pending { name, .. } => name,
            Slot::Done(f) => &f.name,
        }
    }

    fn signature(&self) -> &str {
        match self {
            Slot::Pending { signature, .. } => signature,
            Slot::Done(f) => &f.signature,
        }
    }
}

/// Memo table of one generator: at most one fragment per structural key.
pub struct FunctionCache {
    prefix: &'static str,
    kind: FragmentKind,
    slots: RefCell<IndexMap<String, Slot>>,
    counter: Cell<usize>,
    library_imports: RefCell<ImportMap>,
    delegated: RefCell<IndexSet<String>>,
}

impl FunctionCache {
    pub fn new(prefix: &'static str, kind: FragmentKind) -> Self {
        FunctionCache {
            prefix,
            kind,
            slots: RefCell::new(IndexMap::new()),
            counter: Cell::new(0),
            library_imports: RefCell::new(ImportMap::new()),
            delegated: RefCell::new(IndexSet::new()),
        }
    }

    /// Return the name of the fragment for `key`, building it with `build` on first use.
    ///
    /// `build` receives the name the fragment must define. It may resolve other shapes,
    /// including `key` itself; those see the reserved name. If it fails nothing is
    /// recorded and the diagnostic is passed on.
    pub fn get_or_create<F>(&self, key: &str, signature: &str, build: F) -> SynthResult
    where
        F: FnOnce(&str) -> SynthResult<Synthesized>,
    {
        self.lookup_or_build(key, signature, || self.fresh_name(key), build)
    }

    /// Like [`Self::get_or_create`], for fragments whose name is fixed by the shape, such as
    /// the `cd_dynarray_*` structs. `name` must be injective in `key`.
    pub fn get_or_create_named<F>(&self, key: &str, name: &str, build: F) -> SynthResult
    where
        F: FnOnce(&str) -> SynthResult<Synthesized>,
    {
        self.lookup_or_build(key, name, || name.to_owned(), build)
    }

    fn lookup_or_build<N, F>(
        &self,
        key: &str,
        signature: &str,
        make_name: N,
        build: F,
    ) -> SynthResult
    where
        N: FnOnce() -> String,
        F: FnOnce(&str) -> SynthResult<Synthesized>,
    {
        if let Some(slot) = self.slots.borrow().get(key) {
            assert_eq!(
                slot.signature(),
                signature,
                "{} for key {key} was generated with a different layout",
                slot.name()
            );

            trace!(name = %slot.name(), "cache hit");

            return Ok(slot.name().to_owned());
        }

        let name = make_name();

        self.slots.borrow_mut().insert(
            key.to_owned(),
            Slot::Pending {
                name: name.clone(),
                signature: signature.to_owned(),
            },
        );

        match build(&name) {
            Ok(synthesized) => {
                debug!(name = %name, key, "synthesized");

                self.slots.borrow_mut().insert(
                    key.to_owned(),
                    Slot::Done(Rc::new(GeneratedFunction {
                        name: name.clone(),
                        key: key.to_owned(),
                        signature: signature.to_owned(),
                        kind: self.kind,
                        code: synthesized.code,
                        imports: synthesized.imports,
                    })),
                );

                Ok(name)
            }
            Err(diagnostic) => {
                self.slots.borrow_mut().shift_remove(key);

                Err(diagnostic)
            }
        }
    }

    fn fresh_name(&self, key: &str) -> String {
        let no = self.counter.get();
        self.counter.set(no + 1);

        let key: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .take(MAX_NAME_KEY)
            .collect();

        format!("{}{no}_{key}", self.prefix)
    }

    /// Record that a runtime library symbol is used in place of a generated function
    pub fn use_library(&self, import: Import) -> String {
        add_import(&mut self.library_imports.borrow_mut(), import);

        import.symbol.to_owned()
    }

    /// As [`Self::use_library`], for symbols whose name depends on the shape
    pub fn use_library_symbol(&self, module: &str, symbol: &str) -> String {
        add_symbol(&mut self.library_imports.borrow_mut(), module, symbol);

        symbol.to_owned()
    }

    /// Record that a request was served by a routine another generator owns
    pub fn delegate(&self, name: String) -> String {
        trace!(name = %name, "delegated");

        self.delegated.borrow_mut().insert(name.clone());

        name
    }

    pub fn records(&self) -> Vec<Rc<GeneratedFunction>> {
        self.slots
            .borrow()
            .values()
            .filter_map(|slot| match slot {
                Slot::Done(f) => Some(f.clone()),
                Slot::Pending { .. } => None,
            })
            .collect()
    }

    pub fn imports(&self) -> ImportMap {
        let records = self.records();
        let library = self.library_imports.borrow();

        merge_imports(
            records
                .iter()
                .map(|f| &f.imports)
                .chain(std::iter::once(&*library)),
        )
    }

    pub fn is_used(&self) -> bool {
        !self.slots.borrow().is_empty()
            || !self.library_imports.borrow().is_empty()
            || !self.delegated.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A generator of utility functions
pub trait UtilGen {
    /// Dotted path of the generator, e.g. `storage.read`
    fn path(&self) -> &'static str;

    fn cache(&self) -> &FunctionCache;

    /// Paths of the generators this one calls into
    fn dependencies(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn required_imports(&self) -> ImportMap {
        self.cache().imports()
    }

    fn generated_code(&self) -> Vec<Rc<GeneratedFunction>> {
        self.cache().records()
    }

    fn is_used(&self) -> bool {
        self.cache().is_used()
    }
}

/// Resolve a shape to the name of the routine implementing the operation for it
pub trait Resolve: UtilGen {
    type Shape: ?Sized;

    fn resolve(&self, shape: &Self::Shape, loc: &pt::Loc, ns: &Namespace) -> SynthResult;
}

/// Implement [`UtilGen`] for a generator struct with a `cache` field
macro_rules! util_gen {
    ($gen:ty, $path:literal) => {
        $crate::utilgen::base::util_gen!($gen, $path, []);
    };
    ($gen:ty, $path:literal, [$($dep:ident),*]) => {
        impl $crate::utilgen::base::UtilGen for $gen {
            fn path(&self) -> &'static str {
                $path
            }

            fn cache(&self) -> &$crate::utilgen::base::FunctionCache {
                &self.cache
            }

            fn dependencies(&self) -> Vec<&'static str> {
                vec![$($crate::utilgen::base::UtilGen::path(&*self.$dep)),*]
            }
        }
    };
}

pub(crate) use util_gen;

/// A `Uint256` literal for a constant
pub fn uint256_literal(value: &BigInt) -> String {
    let mask = (BigInt::one() << 128) - 1;

    format!("Uint256({}, {})", value & &mask, value >> 128)
}

/// A `Uint256` holding a felt expression known to be below 2^128
pub fn uint256_small(value: impl fmt::Display) -> String {
    format!("Uint256({value}, 0)")
}

/// Diagnostic for a shape the target cannot represent
pub fn unsupported(loc: &pt::Loc, ty: &Type, ns: &Namespace, reason: &str) -> Diagnostic {
    Diagnostic::unsupported(
        *loc,
        format!("unsupported type '{}': {reason}", ty.to_string(ns)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cairo::imports::{UINT256, UINT256_MODULE, WM_READ_FELT};
    use pretty_assertions::assert_eq;

    #[test]
    fn memoizes_by_key() {
        let cache = FunctionCache::new("WS", FragmentKind::FunctionDefinition);
        let mut builds = 0;

        let first = cache
            .get_or_create("felt", "felt", |name| {
                builds += 1;
                Ok(Synthesized::new(format!("func {name}() {{\n}}")).import(UINT256))
            })
            .unwrap();

        let second = cache
            .get_or_create("felt", "felt", |_| {
                builds += 1;
                Ok(Synthesized::default())
            })
            .unwrap();

        assert_eq!(first, "WS0_felt");
        assert_eq!(first, second);
        assert_eq!(builds, 1);
        assert_eq!(cache.records().len(), 1);
        assert_eq!(cache.imports()[UINT256_MODULE].len(), 1);
    }

    #[test]
    fn recursion_sees_reserved_name() {
        let cache = FunctionCache::new("REC", FragmentKind::FunctionDefinition);

        let name = cache
            .get_or_create("S4Node", "felt", |outer| {
                let inner = cache.get_or_create("S4Node", "felt", |_| unreachable!())?;
                assert_eq!(inner, outer);
                Ok(Synthesized::new(format!("call {inner}")))
            })
            .unwrap();

        assert_eq!(cache.records()[0].code, format!("call {name}"));
    }

    #[test]
    fn failure_leaves_no_record_and_no_reused_name() {
        let cache = FunctionCache::new("X", FragmentKind::FunctionDefinition);

        let err = cache.get_or_create("bad", "felt", |_| {
            Err(Diagnostic::unsupported(pt::Loc::Builtin, "nope".into()))
        });

        assert!(err.is_err());
        assert!(!cache.is_used());

        let ok = cache
            .get_or_create("good", "felt", |_| Ok(Synthesized::default()))
            .unwrap();
        assert_eq!(ok, "X1_good");
    }

    #[test]
    #[should_panic(expected = "different layout")]
    fn signature_mismatch_is_a_defect() {
        let cache = FunctionCache::new("X", FragmentKind::FunctionDefinition);

        cache
            .get_or_create("k", "felt", |_| Ok(Synthesized::default()))
            .unwrap();
        let _ = cache.get_or_create("k", "Uint256", |_| Ok(Synthesized::default()));
    }

    #[test]
    fn library_use_counts_as_use() {
        let cache = FunctionCache::new("WM", FragmentKind::FunctionDefinition);
        assert!(!cache.is_used());

        assert_eq!(cache.use_library(WM_READ_FELT), "wm_read_felt");
        assert!(cache.is_used());
        assert!(cache.records().is_empty());
        assert_eq!(cache.imports().len(), 1);
    }

    #[test]
    fn delegation_counts_as_use() {
        let cache = FunctionCache::new("WS_LENGTH", FragmentKind::FunctionDefinition);

        let name = cache.delegate("WARP_DARRAY0_felt_LENGTH".to_string());

        assert_eq!(name, "WARP_DARRAY0_felt_LENGTH");
        assert!(cache.is_used());
        assert!(cache.records().is_empty());
        assert!(cache.imports().is_empty());
    }
}
