// SPDX-License-Identifier: Apache-2.0

use crate::sema::ast::{ArrayLength, Namespace, Type};
use num_traits::ToPrimitive;
use std::fmt;

/// A type in the generated Cairo code
#[derive(PartialEq, Eq, Clone, Hash, Debug)]
pub enum CairoType {
    Felt,
    Uint256,
    Pointer(Box<CairoType>),
    /// A Solidity struct passed by value. Members are looked up through the namespace,
    /// so recursive structs do not recurse here.
    Struct {
        name: String,
        mangled: String,
        struct_no: usize,
    },
    /// Static arrays passed by value
    Tuple(Vec<CairoType>),
    /// The calldata dynamic array struct, `cd_dynarray_<elem>` with `len` and `ptr` members
    DynArray { elem: Box<CairoType> },
}

/// How a Solidity type is represented depends on where the value is being used
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TypeConversionContext {
    /// Locals and arguments of storage/memory routines: reference types are a felt location
    Ref,
    /// Arguments and return values of external functions, passed by value
    CallDataRef,
    /// The contents of a memory allocation; nested reference types are pointers
    MemoryAllocation,
}

impl CairoType {
    pub fn from_sol(
        ty: &Type,
        ns: &Namespace,
        ctx: TypeConversionContext,
    ) -> Result<CairoType, String> {
        if ty.is_value_type() {
            return Ok(if ty.is_wide() {
                CairoType::Uint256
            } else {
                CairoType::Felt
            });
        }

        match ctx {
            TypeConversionContext::Ref => match ty {
                Type::Mapping(key, _) if key.contains_mapping(ns) => {
                    Err("mapping keys cannot be mappings".to_string())
                }
                _ => Ok(CairoType::Felt),
            },
            TypeConversionContext::CallDataRef => {
                if ty.contains_mapping(ns) {
                    return Err(format!(
                        "'{}' contains a mapping and cannot be passed by value",
                        ty.to_string(ns)
                    ));
                }

                match ty {
                    Type::Struct(n) => Ok(CairoType::Struct {
                        name: ns.structs[*n].cairo_name(),
                        mangled: ns.structs[*n].mangled(),
                        struct_no: *n,
                    }),
                    Type::Array(elem, ArrayLength::Fixed(len)) => {
                        let elem = CairoType::from_sol(elem, ns, ctx)?;
                        let len = len
                            .to_usize()
                            .ok_or_else(|| format!("array length {len} too large"))?;

                        Ok(CairoType::Tuple(vec![elem; len]))
                    }
                    Type::Array(elem, ArrayLength::Dynamic) => Ok(CairoType::DynArray {
                        elem: Box::new(CairoType::from_sol(elem, ns, ctx)?),
                    }),
                    Type::DynamicBytes | Type::String => Ok(CairoType::DynArray {
                        elem: Box::new(CairoType::Felt),
                    }),
                    _ => unreachable!(),
                }
            }
            TypeConversionContext::MemoryAllocation => match ty {
                Type::Mapping(..) => Err("mappings cannot live in memory".to_string()),
                _ if ty.contains_mapping(ns) => Err(format!(
                    "'{}' contains a mapping and cannot live in memory",
                    ty.to_string(ns)
                )),
                Type::Struct(n) => ns.structs[*n]
                    .fields
                    .iter()
                    .map(|field| CairoType::from_sol(&field.ty, ns, TypeConversionContext::Ref))
                    .collect::<Result<Vec<_>, _>>()
                    .map(CairoType::Tuple),
                Type::Array(elem, ArrayLength::Fixed(len)) => {
                    let elem = CairoType::from_sol(elem, ns, TypeConversionContext::Ref)?;
                    let len = len
                        .to_usize()
                        .ok_or_else(|| format!("array length {len} too large"))?;

                    Ok(CairoType::Tuple(vec![elem; len]))
                }
                // elements follow the length header, their count is only known at run time
                _ => Ok(CairoType::Tuple(vec![CairoType::Uint256])),
            },
        }
    }

    /// Number of felts the value occupies
    pub fn width(&self, ns: &Namespace) -> usize {
        match self {
            CairoType::Felt | CairoType::Pointer(_) => 1,
            CairoType::Uint256 | CairoType::DynArray { .. } => 2,
            CairoType::Tuple(members) => members.iter().map(|m| m.width(ns)).sum(),
            CairoType::Struct { .. } => self.members(ns).iter().map(|(_, ty)| ty.width(ns)).sum(),
        }
    }

    /// Members of a struct passed by value, in declaration order
    pub fn members(&self, ns: &Namespace) -> Vec<(String, CairoType)> {
        match self {
            CairoType::Struct { struct_no, .. } => ns.structs[*struct_no]
                .fields
                .iter()
                .map(|field| {
                    match CairoType::from_sol(&field.ty, ns, TypeConversionContext::CallDataRef) {
                        Ok(ty) => (field.name.clone(), ty),
                        Err(_) => unreachable!("struct checked for mappings on conversion"),
                    }
                })
                .collect(),
            CairoType::DynArray { elem } => vec![
                ("len".to_string(), CairoType::Felt),
                ("ptr".to_string(), CairoType::Pointer(elem.clone())),
            ],
            CairoType::Uint256 => vec![
                ("low".to_string(), CairoType::Felt),
                ("high".to_string(), CairoType::Felt),
            ],
            _ => Vec::new(),
        }
    }

    /// Self delimiting name for use inside identifiers; distinct types never share one
    pub fn mangled(&self) -> String {
        match self {
            CairoType::Felt => "felt".to_string(),
            CairoType::Uint256 => "Uint256".to_string(),
            CairoType::Pointer(ty) => format!("P_{}", ty.mangled()),
            CairoType::Struct { mangled, .. } => mangled.clone(),
            CairoType::Tuple(members) => format!(
                "T{}{}",
                members.len(),
                members
                    .iter()
                    .map(|m| format!("_{}", m.mangled()))
                    .collect::<String>()
            ),
            CairoType::DynArray { elem } => format!("D_{}", elem.mangled()),
        }
    }

    pub fn is_uint256(&self) -> bool {
        matches!(self, CairoType::Uint256)
    }
}

impl fmt::Display for CairoType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CairoType::Felt => write!(f, "felt"),
            CairoType::Uint256 => write!(f, "Uint256"),
            CairoType::Pointer(ty) => write!(f, "{ty}*"),
            CairoType::Struct { name, .. } => write!(f, "{name}"),
            CairoType::Tuple(members) => {
                write!(f, "(")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{m}")?;
                }
                write!(f, ")")
            }
            CairoType::DynArray { elem } => write!(f, "cd_dynarray_{}", elem.mangled()),
        }
    }
}
