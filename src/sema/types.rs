// SPDX-License-Identifier: Apache-2.0

use super::ast::{ArrayLength, Namespace, Type};
use num_bigint::BigInt;
use std::collections::HashSet;

/// Addresses are felts on Starknet
pub const ADDRESS_BITS: u16 = 251;

impl Type {
    /// Human readable form, used in diagnostics
    pub fn to_string(&self, ns: &Namespace) -> String {
        match self {
            Type::Bool => "bool".to_string(),
            Type::Address => "address".to_string(),
            Type::Int(n) => format!("int{n}"),
            Type::Uint(n) => format!("uint{n}"),
            Type::Bytes(n) => format!("bytes{n}"),
            Type::String => "string".to_string(),
            Type::DynamicBytes => "bytes".to_string(),
            Type::Enum(n) => format!("enum {}", ns.enums[*n]),
            Type::Struct(n) => format!("struct {}", ns.structs[*n]),
            Type::Array(ty, ArrayLength::Fixed(len)) => format!("{}[{len}]", ty.to_string(ns)),
            Type::Array(ty, ArrayLength::Dynamic) => format!("{}[]", ty.to_string(ns)),
            Type::Mapping(key, value) => {
                format!("mapping({} => {})", key.to_string(ns), value.to_string(ns))
            }
        }
    }

    /// A name for the type which is safe to use inside a Cairo identifier.
    ///
    /// Distinct types never share a mangled name: every compound form starts with a
    /// letter that no elementary name starts with, and names are self-delimiting
    /// (struct and enum names, and the contracts they are declared in, carry their length;
    /// elements are separated by `_`).
    pub fn mangled(&self, ns: &Namespace) -> String {
        match self {
            Type::Bool => "bool".to_string(),
            Type::Address => "address".to_string(),
            Type::Int(n) => format!("int{n}"),
            Type::Uint(n) => format!("uint{n}"),
            Type::Bytes(n) => format!("bytes{n}"),
            Type::String => "string".to_string(),
            Type::DynamicBytes => "bytes".to_string(),
            Type::Enum(n) => ns.enums[*n].mangled(),
            Type::Struct(n) => ns.structs[*n].mangled(),
            Type::Array(ty, ArrayLength::Fixed(len)) => format!("A{len}_{}", ty.mangled(ns)),
            Type::Array(ty, ArrayLength::Dynamic) => format!("D_{}", ty.mangled(ns)),
            Type::Mapping(key, value) => format!("M_{}_{}", key.mangled(ns), value.mangled(ns)),
        }
    }

    /// Is this a value type, i.e. does it fit in a fixed number of felts without indirection
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::Address
                | Type::Int(_)
                | Type::Uint(_)
                | Type::Bytes(_)
                | Type::Enum(_)
        )
    }

    pub fn is_reference_type(&self) -> bool {
        !self.is_value_type()
    }

    /// `bytes` and `string` are dynamic arrays of bytes1 as far as layout is concerned
    pub fn is_dynamic_array(&self) -> bool {
        matches!(
            self,
            Type::Array(_, ArrayLength::Dynamic) | Type::DynamicBytes | Type::String
        )
    }

    pub fn is_static_array(&self) -> bool {
        matches!(self, Type::Array(_, ArrayLength::Fixed(_)))
    }

    /// The element type of an array; bytes and string have byte sized elements
    pub fn array_elem(&self) -> Type {
        match self {
            Type::Array(ty, _) => *ty.clone(),
            Type::DynamicBytes | Type::String => Type::Bytes(1),
            _ => panic!("{self:?} is not an array"),
        }
    }

    pub fn array_length(&self) -> Option<&BigInt> {
        match self {
            Type::Array(_, ArrayLength::Fixed(len)) => Some(len),
            _ => None,
        }
    }

    pub fn bits(&self, ns: &Namespace) -> u16 {
        match self {
            Type::Address => ADDRESS_BITS,
            Type::Bool => 1,
            Type::Int(n) | Type::Uint(n) => *n,
            Type::Bytes(n) => *n as u16 * 8,
            Type::Enum(n) => {
                // enums are a uint8 unless there are more than 256 values
                if ns.enums[*n].values.len() > 256 {
                    16
                } else {
                    8
                }
            }
            _ => panic!("type not allowed"),
        }
    }

    pub fn is_signed_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    /// Does the type need more than one felt when stored as a value
    pub fn is_wide(&self) -> bool {
        matches!(self, Type::Int(256) | Type::Uint(256) | Type::Bytes(32))
    }

    /// Is the type dynamic in the sense of the ABI encoding, i.e. does it need an
    /// offset in the head and its contents in the tail
    pub fn is_dynamic(&self, ns: &Namespace) -> bool {
        self.is_dynamic_internal(ns, &mut HashSet::new())
    }

    fn is_dynamic_internal(&self, ns: &Namespace, structs_visited: &mut HashSet<usize>) -> bool {
        self.guarded_recursion(structs_visited, false, |structs_visited| match self {
            Type::String | Type::DynamicBytes => true,
            Type::Array(_, ArrayLength::Dynamic) => true,
            Type::Array(ty, ArrayLength::Fixed(_)) => ty.is_dynamic_internal(ns, structs_visited),
            Type::Struct(n) => ns.structs[*n]
                .fields
                .iter()
                .any(|f| f.ty.is_dynamic_internal(ns, structs_visited)),
            _ => false,
        })
    }

    /// Does this type contain any mapping
    pub fn contains_mapping(&self, ns: &Namespace) -> bool {
        self.contains_mapping_internal(ns, &mut HashSet::new())
    }

    fn contains_mapping_internal(
        &self,
        ns: &Namespace,
        structs_visited: &mut HashSet<usize>,
    ) -> bool {
        self.guarded_recursion(structs_visited, false, |structs_visited| match self {
            Type::Mapping(..) => true,
            Type::Array(ty, _) => ty.contains_mapping_internal(ns, structs_visited),
            Type::Struct(n) => ns.structs[*n]
                .fields
                .iter()
                .any(|f| f.ty.contains_mapping_internal(ns, structs_visited)),
            _ => false,
        })
    }

    /// Does this type contain a dynamic array anywhere, including itself
    pub fn contains_dynamic_array(&self, ns: &Namespace) -> bool {
        self.contains_dynamic_array_internal(ns, &mut HashSet::new())
    }

    fn contains_dynamic_array_internal(
        &self,
        ns: &Namespace,
        structs_visited: &mut HashSet<usize>,
    ) -> bool {
        self.guarded_recursion(structs_visited, false, |structs_visited| match self {
            Type::String | Type::DynamicBytes | Type::Array(_, ArrayLength::Dynamic) => true,
            Type::Array(ty, _) => ty.contains_dynamic_array_internal(ns, structs_visited),
            Type::Struct(n) => ns.structs[*n]
                .fields
                .iter()
                .any(|f| f.ty.contains_dynamic_array_internal(ns, structs_visited)),
            _ => false,
        })
    }

    fn guarded_recursion<F, O>(&self, structs_visited: &mut HashSet<usize>, bail: O, f: F) -> O
    where
        F: FnOnce(&mut HashSet<usize>) -> O,
    {
        if let Type::Struct(n) = self {
            if !structs_visited.insert(*n) {
                return bail;
            }
        }
        f(structs_visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Target;
    use solang_parser::pt::Loc;

    #[test]
    fn mangled_names_are_distinct() {
        let mut ns = Namespace::new(Target::Starknet);

        let a = ns.add_struct("A", Loc::Builtin, vec![("x", Type::Uint(8))]);
        let a1 = ns.add_struct("A1", Loc::Builtin, vec![("x", Type::Uint(8))]);

        let types = [
            Type::DynamicBytes,
            Type::Bytes(1),
            Type::Struct(a),
            Type::Struct(a1),
            Type::Array(Box::new(Type::Struct(a)), ArrayLength::Fixed(1.into())),
            Type::Array(Box::new(Type::Struct(a1)), ArrayLength::Dynamic),
            Type::Array(Box::new(Type::DynamicBytes), ArrayLength::Dynamic),
            Type::Mapping(Box::new(Type::DynamicBytes), Box::new(Type::Bytes(1))),
            Type::Mapping(Box::new(Type::Bytes(1)), Box::new(Type::DynamicBytes)),
        ];

        let names: HashSet<String> = types.iter().map(|ty| ty.mangled(&ns)).collect();

        assert_eq!(names.len(), types.len());
        assert_eq!(Type::Struct(a1).mangled(&ns), "S2A1");
        assert_eq!(
            Type::Array(Box::new(Type::Struct(a)), ArrayLength::Fixed(3.into())).mangled(&ns),
            "A3_S1A"
        );
    }

    #[test]
    fn contract_scoped_names_are_distinct() {
        let mut ns = Namespace::new(Target::Starknet);

        let first = ns.add_struct("B_C", Loc::Builtin, vec![("x", Type::Bool)]);
        ns.structs[first].contract = Some("A".into());
        let second = ns.add_struct("C", Loc::Builtin, vec![("x", Type::Uint(256))]);
        ns.structs[second].contract = Some("A_B".into());
        let free = ns.add_struct("A_B_C", Loc::Builtin, vec![("x", Type::Bool)]);

        assert_eq!(Type::Struct(first).mangled(&ns), "S1A3B_C");
        assert_eq!(Type::Struct(second).mangled(&ns), "S3A_B1C");
        assert_eq!(Type::Struct(free).mangled(&ns), "S5A_B_C");

        assert_eq!(ns.structs[first].cairo_name(), "A_B_C_1");
        assert_eq!(ns.structs[second].cairo_name(), "A_B_C_3");

        let e1 = ns.add_enum("B_C", Loc::Builtin, &["X"]);
        ns.enums[e1].contract = Some("A".into());
        let e2 = ns.add_enum("C", Loc::Builtin, &["X"]);
        ns.enums[e2].contract = Some("A_B".into());

        assert_eq!(Type::Enum(e1).mangled(&ns), "E1A3B_C");
        assert_eq!(Type::Enum(e2).mangled(&ns), "E3A_B1C");
    }

    #[test]
    fn recursive_struct_queries_terminate() {
        let mut ns = Namespace::new(Target::Starknet);

        // struct Node { uint64 value; Node[] children; }
        ns.add_struct("Node", Loc::Builtin, vec![]);
        ns.structs[0].fields = vec![
            crate::sema::ast::Parameter {
                loc: Loc::Builtin,
                name: "value".into(),
                ty: Type::Uint(64),
            },
            crate::sema::ast::Parameter {
                loc: Loc::Builtin,
                name: "children".into(),
                ty: Type::Array(Box::new(Type::Struct(0)), ArrayLength::Dynamic),
            },
        ];

        assert!(Type::Struct(0).is_dynamic(&ns));
        assert!(!Type::Struct(0).contains_mapping(&ns));
        assert!(Type::Struct(0).contains_dynamic_array(&ns));
        assert_eq!(Type::Struct(0).to_string(&ns), "struct Node");
    }

    #[test]
    fn dynamic_types() {
        let ns = Namespace::new(Target::Starknet);

        assert!(Type::String.is_dynamic(&ns));
        assert!(!Type::Array(Box::new(Type::Bool), ArrayLength::Fixed(2.into())).is_dynamic(&ns));
        assert!(
            Type::Array(Box::new(Type::String), ArrayLength::Fixed(2.into())).is_dynamic(&ns)
        );
        assert!(!Type::Mapping(Box::new(Type::Address), Box::new(Type::String)).is_dynamic(&ns));
        assert_eq!(
            Type::Mapping(Box::new(Type::Address), Box::new(Type::String)).to_string(&ns),
            "mapping(address => string)"
        );
    }
}
