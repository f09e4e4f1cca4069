//! Nominal type system for collection expressions
//!
//! Types carry their own nullability information: an array knows whether it
//! may hold null elements, a map whether it may hold null values. Map keys
//! are never null, so there is no key-side flag.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Data type of an expression or value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean value (true/false)
    Boolean,
    /// 32-bit signed integer
    Integer,
    /// 64-bit signed integer
    Long,
    /// 64-bit IEEE-754 floating point
    Double,
    /// UTF-8 string
    String,
    /// Raw byte sequence
    Binary,

    /// Variable-length array of a single element type
    Array {
        /// Element type
        element: Box<DataType>,
        /// Whether elements may be null
        contains_null: bool,
    },

    /// Key/value map; keys are never null
    Map {
        /// Key type
        key: Box<DataType>,
        /// Value type
        value: Box<DataType>,
        /// Whether values may be null
        value_contains_null: bool,
    },
}

impl DataType {
    /// Create an array type
    pub fn array(element: DataType, contains_null: bool) -> Self {
        DataType::Array {
            element: Box::new(element),
            contains_null,
        }
    }

    /// Create a map type
    pub fn map(key: DataType, value: DataType, value_contains_null: bool) -> Self {
        DataType::Map {
            key: Box::new(key),
            value: Box::new(value),
            value_contains_null,
        }
    }

    /// Structural equality, optionally ignoring nullability flags
    ///
    /// With `ignore_nullability` set, `array<int>` and `array<int?>` compare
    /// equal; the comparison recurses through nested arrays and maps.
    pub fn equals_structurally(&self, other: &DataType, ignore_nullability: bool) -> bool {
        if !ignore_nullability {
            return self == other;
        }
        match (self, other) {
            (
                DataType::Array { element: a, .. },
                DataType::Array { element: b, .. },
            ) => a.equals_structurally(b, true),
            (
                DataType::Map {
                    key: ak, value: av, ..
                },
                DataType::Map {
                    key: bk, value: bv, ..
                },
            ) => ak.equals_structurally(bk, true) && av.equals_structurally(bv, true),
            (a, b) => a == b,
        }
    }

    /// Structural equality ignoring nullability flags
    pub fn same_type(&self, other: &DataType) -> bool {
        self.equals_structurally(other, true)
    }

    /// Combine two types that differ only in nullability flags
    ///
    /// Returns the type whose flags are the union of both sides, or `None`
    /// when the two types are not structurally the same.
    pub fn common_type_ignoring_null_flags(&self, other: &DataType) -> Option<DataType> {
        match (self, other) {
            (
                DataType::Array {
                    element: a,
                    contains_null: an,
                },
                DataType::Array {
                    element: b,
                    contains_null: bn,
                },
            ) => Some(DataType::Array {
                element: Box::new(a.common_type_ignoring_null_flags(b)?),
                contains_null: *an || *bn,
            }),
            (
                DataType::Map {
                    key: ak,
                    value: av,
                    value_contains_null: an,
                },
                DataType::Map {
                    key: bk,
                    value: bv,
                    value_contains_null: bn,
                },
            ) => Some(DataType::Map {
                key: Box::new(ak.common_type_ignoring_null_flags(bk)?),
                value: Box::new(av.common_type_ignoring_null_flags(bv)?),
                value_contains_null: *an || *bn,
            }),
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }

    /// Check if this is an atomic (non-nested) type
    pub fn is_atomic(&self) -> bool {
        !matches!(self, DataType::Array { .. } | DataType::Map { .. })
    }

    /// Check if values of this type can be used as hash-table keys
    ///
    /// All atomic types except `Binary` hash; binary keys fall back to the
    /// ordering-based comparison path.
    pub fn supports_hashing(&self) -> bool {
        self.is_atomic() && !matches!(self, DataType::Binary)
    }

    /// Check if values of this type have a total order
    pub fn supports_ordering(&self) -> bool {
        match self {
            DataType::Array { element, .. } => element.supports_ordering(),
            DataType::Map { .. } => false,
            _ => true,
        }
    }

    /// Get the name of this type for display
    pub fn type_name(&self) -> String {
        match self {
            DataType::Boolean => "boolean".to_string(),
            DataType::Integer => "int".to_string(),
            DataType::Long => "bigint".to_string(),
            DataType::Double => "double".to_string(),
            DataType::String => "string".to_string(),
            DataType::Binary => "binary".to_string(),
            DataType::Array { element, .. } => format!("array<{}>", element.type_name()),
            DataType::Map { key, value, .. } => {
                format!("map<{},{}>", key.type_name(), value.type_name())
            }
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}
