//! Runtime values and container views
//!
//! Every expression evaluates to a [`Value`]. Arrays and maps are exposed
//! through read-only, cheaply clonable views ([`ArrayData`], [`MapData`])
//! backed by shared slices, so a higher-order loop can hand elements to a
//! lambda slot without copying the container.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Largest number of entries an output container may hold
///
/// Mirrors the rounded array-length limit of JVM-based columnar engines so
/// results stay exchangeable with them.
pub const MAX_ARRAY_LENGTH: usize = (i32::MAX - 15) as usize;

/// A single runtime value
///
/// `Null` doubles as the per-position null marker inside containers, which
/// keeps element access self-describing.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 32-bit signed integer
    Integer(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 64-bit floating point
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Binary(Vec<u8>),
    /// Array view
    Array(ArrayData),
    /// Map view
    Map(MapData),
}

impl Value {
    /// Check whether this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Extract a boolean, if this value is one
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Short name of the value's shape, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "int",
            Value::Long(_) => "bigint",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Long(l) => write!(f, "{l}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "'{s}'"),
            Value::Binary(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for i in 0..m.num_entries() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} -> {}", m.key_array().get(i), m.value_array().get(i))?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Total order over two non-null values of the same shape
///
/// Doubles use IEEE total ordering, binary compares lexicographically and
/// arrays element-wise with length as the tie breaker. Returns `None` for
/// nulls, maps, or mismatched shapes.
pub fn value_compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Long(x), Value::Long(y)) => Some(x.cmp(y)),
        (Value::Double(x), Value::Double(y)) => Some(x.total_cmp(y)),
        (Value::Integer(x), Value::Long(y)) => Some((*x as i64).cmp(y)),
        (Value::Long(x), Value::Integer(y)) => Some(x.cmp(&(*y as i64))),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Binary(x), Value::Binary(y)) => Some(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            for (ex, ey) in x.iter().zip(y.iter()) {
                match (ex.is_null(), ey.is_null()) {
                    // nulls sort first inside arrays
                    (true, true) => continue,
                    (true, false) => return Some(Ordering::Less),
                    (false, true) => return Some(Ordering::Greater),
                    (false, false) => match value_compare(ex, ey)? {
                        Ordering::Equal => continue,
                        other => return Some(other),
                    },
                }
            }
            Some(x.num_elements().cmp(&y.num_elements()))
        }
        _ => None,
    }
}

/// Read-only view of an array value
///
/// Backed by a shared slice so clones are reference bumps.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayData {
    elements: Arc<[Value]>,
}

impl ArrayData {
    /// Build an array from owned elements
    pub fn from_vec(elements: Vec<Value>) -> Self {
        Self {
            elements: elements.into(),
        }
    }

    /// Build an empty array
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Number of elements
    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Element at position `i`; `Value::Null` marks a null position
    pub fn get(&self, i: usize) -> &Value {
        &self.elements[i]
    }

    /// Check whether position `i` holds a null
    pub fn is_null_at(&self, i: usize) -> bool {
        self.elements[i].is_null()
    }

    /// Iterate over the elements
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.elements.iter()
    }
}

impl FromIterator<Value> for ArrayData {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

/// Read-only view of a map value
///
/// Keys and values are paired positionally; both arrays always have the
/// same length and the i-th key is never null. Duplicate keys are
/// representable, consumers decide whether the first occurrence wins.
#[derive(Debug, Clone, PartialEq)]
pub struct MapData {
    keys: ArrayData,
    values: ArrayData,
}

impl MapData {
    /// Build a map from paired key and value arrays
    pub fn new(keys: ArrayData, values: ArrayData) -> Self {
        debug_assert_eq!(keys.num_elements(), values.num_elements());
        Self { keys, values }
    }

    /// Number of entries
    pub fn num_entries(&self) -> usize {
        self.keys.num_elements()
    }

    /// The key side of the map
    pub fn key_array(&self) -> &ArrayData {
        &self.keys
    }

    /// The value side of the map
    pub fn value_array(&self) -> &ArrayData {
        &self.values
    }
}

/// One input record, treated opaquely by this crate
///
/// Higher-order nodes forward the row untouched to argument and body
/// evaluation; only [`crate::expr::BoundReference`] ever looks inside.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Build a row over the given column values
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// A row with no columns
    pub fn empty() -> Self {
        Self::default()
    }

    /// Value at column `ordinal`
    pub fn get(&self, ordinal: usize) -> &Value {
        &self.values[ordinal]
    }
}
