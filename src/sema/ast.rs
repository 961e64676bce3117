// SPDX-License-Identifier: Apache-2.0

pub use super::diagnostics::{Diagnostic, Diagnostics, ErrorType, Level, Note};
use crate::Target;
use indexmap::IndexMap;
use num_bigint::BigInt;
use solang_parser::pt;
use std::{fmt, path::PathBuf, sync::Arc};

#[derive(PartialEq, Eq, Clone, Hash, Debug)]
pub enum Type {
    Address,
    Bool,
    Int(u16),
    Uint(u16),
    /// Fixed length `bytesN`
    Bytes(u8),
    DynamicBytes,
    String,
    Enum(usize),
    Struct(usize),
    /// One dimension; multi-dimensional arrays nest
    Array(Box<Type>, ArrayLength),
    Mapping(Box<Type>, Box<Type>),
}

#[derive(PartialEq, Eq, Clone, Hash, Debug)]
pub enum ArrayLength {
    Fixed(BigInt),
    Dynamic,
}

/// Where a value of reference type lives
#[derive(PartialEq, Eq, Clone, Copy, Hash, Debug)]
pub enum DataLocation {
    Storage,
    Memory,
    Calldata,
}

impl fmt::Display for DataLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataLocation::Storage => write!(f, "storage"),
            DataLocation::Memory => write!(f, "memory"),
            DataLocation::Calldata => write!(f, "calldata"),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Parameter {
    pub loc: pt::Loc,
    pub name: String,
    pub ty: Type,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct StructDecl {
    pub name: String,
    pub loc: pt::Loc,
    pub contract: Option<String>,
    pub fields: Vec<Parameter>,
}

/// `{tag}{len}{name}`, or `{tag}{len}{contract}{len}{name}` for declarations inside a
/// contract. Identifiers never start with a digit, so the form is self-delimiting.
fn mangle_decl(tag: char, contract: Option<&str>, name: &str) -> String {
    match contract {
        Some(contract) => format!("{tag}{}{contract}{}{name}", contract.len(), name.len()),
        None => format!("{tag}{}{name}", name.len()),
    }
}

impl StructDecl {
    /// The name of the struct in the generated Cairo module. Structs declared inside a
    /// contract are `{contract}_{name}_{len(contract)}`; the trailing length keeps
    /// `A.B_C` and `A_B.C` apart.
    pub fn cairo_name(&self) -> String {
        match &self.contract {
            Some(contract) => format!("{contract}_{}_{}", self.name, contract.len()),
            None => self.name.clone(),
        }
    }

    pub fn mangled(&self) -> String {
        mangle_decl('S', self.contract.as_deref(), &self.name)
    }
}

impl fmt::Display for StructDecl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.contract {
            Some(c) => write!(f, "{}.{}", c, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct EnumDecl {
    pub name: String,
    pub loc: pt::Loc,
    pub contract: Option<String>,
    pub values: IndexMap<String, pt::Loc>,
}

impl EnumDecl {
    pub fn mangled(&self) -> String {
        mangle_decl('E', self.contract.as_deref(), &self.name)
    }
}

impl fmt::Display for EnumDecl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.contract {
            Some(c) => write!(f, "{}.{}", c, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A source file known to the front end; only used for rendering diagnostics
#[derive(Clone, Debug)]
pub struct File {
    pub path: PathBuf,
    pub contents: Arc<str>,
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// The resolved program as handed over by the front end
pub struct Namespace {
    pub target: Target,
    pub files: Vec<File>,
    pub structs: Vec<StructDecl>,
    pub enums: Vec<EnumDecl>,
    pub diagnostics: Diagnostics,
}

impl Namespace {
    pub fn new(target: Target) -> Self {
        Namespace {
            target,
            files: Vec::new(),
            structs: Vec::new(),
            enums: Vec::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Register a source file, returning its file number for use in `pt::Loc::File`
    pub fn add_file(&mut self, path: impl Into<PathBuf>, contents: &str) -> usize {
        self.files.push(File {
            path: path.into(),
            contents: contents.into(),
        });

        self.files.len() - 1
    }

    /// Declare a struct, returning its struct number
    pub fn add_struct(&mut self, name: &str, loc: pt::Loc, fields: Vec<(&str, Type)>) -> usize {
        self.structs.push(StructDecl {
            name: name.to_owned(),
            loc,
            contract: None,
            fields: fields
                .into_iter()
                .map(|(name, ty)| Parameter {
                    loc,
                    name: name.to_owned(),
                    ty,
                })
                .collect(),
        });

        self.structs.len() - 1
    }

    /// Declare an enum, returning its enum number
    pub fn add_enum(&mut self, name: &str, loc: pt::Loc, values: &[&str]) -> usize {
        self.enums.push(EnumDecl {
            name: name.to_owned(),
            loc,
            contract: None,
            values: values.iter().map(|v| (v.to_string(), loc)).collect(),
        });

        self.enums.len() - 1
    }
}
