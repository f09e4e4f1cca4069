//! Higher-order functions over maps
//!
//! `map_filter` mirrors array filtering over entries. `map_zip_with`
//! merges two maps by key union with first-occurrence-wins semantics; the
//! key lookup runs behind [`KeyIndex`], which picks a hash table or an
//! ordering-based linear scan from the key type.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use log::trace;

use crate::error::{CheckResult, EvalError, EvalResult, TypeCheckError};
use crate::types::DataType;
use crate::value::{ArrayData, MAX_ARRAY_LENGTH, MapData, Row, Value, value_compare};

use super::Expr;
use super::higher_order::{
    HigherOrderFunction, LambdaBinder, check_boolean_body, eval_map_argument, map_entry,
    prepare_for_eval,
};
use super::lambda::LambdaFunction;

/// `map_filter(map, fn)`: keep entries the predicate accepts
///
/// The lambda sees `(key, value)`; entries are tested in map order and
/// duplicate keys pass through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct MapFilter {
    /// Map argument
    pub argument: Box<Expr>,
    /// Boolean predicate lambda over `(key, value)`
    pub function: LambdaFunction,
}

impl MapFilter {
    /// Create a map filter
    pub fn new(argument: Expr, function: LambdaFunction) -> Self {
        Self {
            argument: Box::new(argument),
            function,
        }
    }

    /// Result type: same as the argument
    pub fn data_type(&self) -> DataType {
        self.argument.data_type()
    }

    /// Null iff the map argument is null
    pub fn nullable(&self) -> bool {
        self.argument.nullable()
    }

    pub(crate) fn children(&self) -> Vec<&Expr> {
        vec![self.argument.as_ref(), self.function.body()]
    }

    /// Evaluate against one row
    pub fn eval(&self, row: &Row) -> EvalResult<Value> {
        let Some(map) = eval_map_argument(&self.argument, row, "map_filter")? else {
            return Ok(Value::Null);
        };
        let function = prepare_for_eval(&self.function)?;

        let mut keys = Vec::new();
        let mut values = Vec::new();
        for i in 0..map.num_entries() {
            function.param(0).set(map.key_array().get(i).clone());
            function.param(1).set(map.value_array().get(i).clone());
            match function.eval(row)? {
                Value::Boolean(true) => {
                    keys.push(map.key_array().get(i).clone());
                    values.push(map.value_array().get(i).clone());
                }
                Value::Boolean(false) | Value::Null => {}
                other => {
                    return Err(EvalError::UnexpectedValue {
                        expected: "boolean",
                        actual: other.kind(),
                        context: "map_filter",
                    });
                }
            }
        }
        Ok(Value::Map(MapData::new(
            ArrayData::from_vec(keys),
            ArrayData::from_vec(values),
        )))
    }
}

impl HigherOrderFunction for MapFilter {
    fn arguments(&self) -> Vec<&Expr> {
        vec![self.argument.as_ref()]
    }

    fn functions(&self) -> Vec<&LambdaFunction> {
        vec![&self.function]
    }

    fn check_argument_types(&self) -> CheckResult {
        map_entry(&self.argument.data_type(), 0)?;
        check_boolean_body(&self.function, 1)
    }

    fn bind(&self, binder: &mut LambdaBinder) -> Result<Self, TypeCheckError> {
        let (key, value, value_contains_null) = map_entry(&self.argument.data_type(), 0)?;
        let function = binder(&self.function, &[(key, false), (value, value_contains_null)])?;
        Ok(Self {
            argument: self.argument.clone(),
            function,
        })
    }
}

/// `map_zip_with(map1, map2, fn)`: merge two maps over their key union
///
/// The lambda sees `(key, value1, value2)` where either value is null for
/// keys missing on that side. Output keys follow insertion order of the
/// left scan then the right scan, with only the first occurrence of a
/// duplicate key contributing on each side.
#[derive(Debug, Clone, PartialEq)]
pub struct MapZipWith {
    /// Left map argument
    pub left: Box<Expr>,
    /// Right map argument
    pub right: Box<Expr>,
    /// Three-parameter combiner lambda
    pub function: LambdaFunction,
}

impl MapZipWith {
    /// Create a map zip
    pub fn new(left: Expr, right: Expr, function: LambdaFunction) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
            function,
        }
    }

    /// Output key type: both key types with their null flags unioned
    fn common_key_type(&self) -> Option<DataType> {
        let (lk, _, _) = map_entry(&self.left.data_type(), 0).ok()?;
        let (rk, _, _) = map_entry(&self.right.data_type(), 1).ok()?;
        lk.common_type_ignoring_null_flags(&rk)
    }

    /// Result type: map from the common key type to the body type
    ///
    /// # Panics
    ///
    /// Panics when the arguments are not maps over a shared key type;
    /// [`check_argument_types`](HigherOrderFunction::check_argument_types)
    /// reports that case first.
    pub fn data_type(&self) -> DataType {
        match self.common_key_type() {
            Some(key) => DataType::map(key, self.function.data_type(), self.function.nullable()),
            None => panic!("data_type called on map_zip_with over mismatched key types"),
        }
    }

    /// Null if either map argument may be null
    pub fn nullable(&self) -> bool {
        self.left.nullable() || self.right.nullable()
    }

    pub(crate) fn children(&self) -> Vec<&Expr> {
        vec![self.left.as_ref(), self.right.as_ref(), self.function.body()]
    }

    /// Evaluate against one row
    pub fn eval(&self, row: &Row) -> EvalResult<Value> {
        let left = eval_map_argument(&self.left, row, "map_zip_with")?;
        let right = eval_map_argument(&self.right, row, "map_zip_with")?;
        let (Some(left), Some(right)) = (left, right) else {
            return Ok(Value::Null);
        };
        let key_type = self.common_key_type().ok_or(EvalError::UnexpectedValue {
            expected: "maps over one key type",
            actual: "mismatched key types",
            context: "map_zip_with",
        })?;

        let mut index = KeyIndex::for_key_type(&key_type);
        for i in 0..left.num_entries() {
            let sides = index.slot_mut(left.key_array().get(i));
            if sides.left.is_none() {
                sides.left = Some(i);
            }
        }
        for i in 0..right.num_entries() {
            let sides = index.slot_mut(right.key_array().get(i));
            if sides.right.is_none() {
                sides.right = Some(i);
            }
        }
        if index.len() > MAX_ARRAY_LENGTH {
            return Err(EvalError::MapSizeExceeded {
                size: index.len(),
                max: MAX_ARRAY_LENGTH,
            });
        }

        let function = prepare_for_eval(&self.function)?;
        let mut keys = Vec::with_capacity(index.len());
        let mut values = Vec::with_capacity(index.len());
        for (key, sides) in index.iter() {
            function.param(0).set(key.clone());
            function.param(1).set(match sides.left {
                Some(i) => left.value_array().get(i).clone(),
                None => Value::Null,
            });
            function.param(2).set(match sides.right {
                Some(i) => right.value_array().get(i).clone(),
                None => Value::Null,
            });
            keys.push(key.clone());
            values.push(function.eval(row)?);
        }
        Ok(Value::Map(MapData::new(
            ArrayData::from_vec(keys),
            ArrayData::from_vec(values),
        )))
    }
}

impl HigherOrderFunction for MapZipWith {
    fn arguments(&self) -> Vec<&Expr> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn functions(&self) -> Vec<&LambdaFunction> {
        vec![&self.function]
    }

    fn check_argument_types(&self) -> CheckResult {
        let (lk, _, _) = map_entry(&self.left.data_type(), 0)?;
        let (rk, _, _) = map_entry(&self.right.data_type(), 1)?;
        let Some(key) = lk.common_type_ignoring_null_flags(&rk) else {
            return Err(TypeCheckError::MapKeyTypeMismatch {
                left: lk.to_string(),
                right: rk.to_string(),
            });
        };
        if !key.supports_hashing() && !key.supports_ordering() {
            return Err(TypeCheckError::MapKeyNotOrderable {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn bind(&self, binder: &mut LambdaBinder) -> Result<Self, TypeCheckError> {
        let (lk, lv, _) = map_entry(&self.left.data_type(), 0)?;
        let (rk, rv, _) = map_entry(&self.right.data_type(), 1)?;
        let key = lk
            .common_type_ignoring_null_flags(&rk)
            .ok_or(TypeCheckError::MapKeyTypeMismatch {
                left: lk.to_string(),
                right: rk.to_string(),
            })?;
        // either value slot is null for keys missing on that side
        let function = binder(&self.function, &[(key, false), (lv, true), (rv, true)])?;
        Ok(Self {
            left: self.left.clone(),
            right: self.right.clone(),
            function,
        })
    }
}

/// Which entry of each input map a distinct key points at
#[derive(Debug, Clone, Copy, Default)]
struct Sides {
    left: Option<usize>,
    right: Option<usize>,
}

/// Insertion-ordered index over distinct map keys
///
/// Hashable key types get a hash table; everything else falls back to an
/// ordering-based linear scan, quadratic in the number of distinct keys.
enum KeyIndex {
    Hashed(IndexMap<HashedKey, Sides>),
    Ordered(Vec<(Value, Sides)>),
}

impl KeyIndex {
    fn for_key_type(key: &DataType) -> Self {
        if key.supports_hashing() {
            trace!("map_zip_with: hashed key index for {key}");
            KeyIndex::Hashed(IndexMap::new())
        } else {
            trace!("map_zip_with: ordering-based key index for {key}");
            KeyIndex::Ordered(Vec::new())
        }
    }

    /// Entry slots for a key, inserting the key on first sight
    fn slot_mut(&mut self, key: &Value) -> &mut Sides {
        match self {
            KeyIndex::Hashed(map) => map.entry(HashedKey(key.clone())).or_default(),
            KeyIndex::Ordered(entries) => {
                let pos = entries
                    .iter()
                    .position(|(k, _)| value_compare(k, key) == Some(Ordering::Equal));
                match pos {
                    Some(i) => &mut entries[i].1,
                    None => {
                        entries.push((key.clone(), Sides::default()));
                        let last = entries.len() - 1;
                        &mut entries[last].1
                    }
                }
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            KeyIndex::Hashed(map) => map.len(),
            KeyIndex::Ordered(entries) => entries.len(),
        }
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&Value, Sides)> + '_> {
        match self {
            KeyIndex::Hashed(map) => Box::new(map.iter().map(|(k, s)| (&k.0, *s))),
            KeyIndex::Ordered(entries) => Box::new(entries.iter().map(|(k, s)| (k, *s))),
        }
    }
}

/// Hash wrapper over atomic key values
///
/// Doubles hash and compare by bit pattern so the table sees a coherent
/// equality. Only key types passing `supports_hashing` ever reach this.
#[derive(Debug, Clone)]
struct HashedKey(Value);

impl PartialEq for HashedKey {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl Eq for HashedKey {}

impl Hash for HashedKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Long(l) => l.hash(state),
            Value::Double(d) => d.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            other => unreachable!("non-hashable map key {}", other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::default_binder;
    use pretty_assertions::assert_eq;

    fn int_string_map(entries: &[(i32, Option<&str>)]) -> Expr {
        Expr::map(
            entries.iter().map(|(k, _)| Value::Integer(*k)).collect(),
            entries
                .iter()
                .map(|(_, v)| match v {
                    Some(s) => Value::String((*s).to_string()),
                    None => Value::Null,
                })
                .collect(),
            DataType::Integer,
            DataType::String,
        )
    }

    fn map_value(keys: Vec<Value>, values: Vec<Value>) -> Value {
        Value::Map(MapData::new(
            ArrayData::from_vec(keys),
            ArrayData::from_vec(values),
        ))
    }

    #[test]
    fn test_map_filter_by_key() {
        let body = Expr::gt(Expr::unresolved_var("k"), Expr::int(1));
        let hof = MapFilter::new(
            int_string_map(&[(1, Some("a")), (2, Some("b")), (3, Some("c"))]),
            LambdaFunction::new(body, ["k", "v"]),
        )
        .bind(&mut default_binder)
        .unwrap();
        assert_eq!(
            hof.eval(&Row::empty()).unwrap(),
            map_value(
                vec![Value::Integer(2), Value::Integer(3)],
                vec![Value::String("b".into()), Value::String("c".into())],
            )
        );
    }

    #[test]
    fn test_map_filter_null_predicate_drops_entry() {
        // v = 'a' is null for the entry whose value is null
        let body = Expr::eq(Expr::unresolved_var("v"), Expr::string("a"));
        let hof = MapFilter::new(
            int_string_map(&[(1, Some("a")), (2, None)]),
            LambdaFunction::new(body, ["k", "v"]),
        )
        .bind(&mut default_binder)
        .unwrap();
        assert_eq!(
            hof.eval(&Row::empty()).unwrap(),
            map_value(vec![Value::Integer(1)], vec![Value::String("a".into())])
        );
    }

    #[test]
    fn test_map_filter_passes_duplicate_keys_through() {
        let hof = MapFilter::new(
            int_string_map(&[(1, Some("a")), (1, Some("b"))]),
            LambdaFunction::new(Expr::boolean(true), ["k", "v"]),
        )
        .bind(&mut default_binder)
        .unwrap();
        assert_eq!(
            hof.eval(&Row::empty()).unwrap(),
            map_value(
                vec![Value::Integer(1), Value::Integer(1)],
                vec![Value::String("a".into()), Value::String("b".into())],
            )
        );
    }

    #[test]
    fn test_map_filter_null_map() {
        let hof = MapFilter::new(
            Expr::null(DataType::map(DataType::Integer, DataType::String, false)),
            LambdaFunction::new(Expr::boolean(true), ["k", "v"]),
        )
        .bind(&mut default_binder)
        .unwrap();
        assert_eq!(hof.eval(&Row::empty()).unwrap(), Value::Null);
    }

    fn concat_zip() -> LambdaFunction {
        LambdaFunction::new(
            Expr::concat(vec![Expr::unresolved_var("v1"), Expr::unresolved_var("v2")]),
            ["k", "v1", "v2"],
        )
    }

    #[test]
    fn test_zip_matching_keys() {
        let hof = MapZipWith::new(
            int_string_map(&[(1, Some("a")), (2, Some("b"))]),
            int_string_map(&[(1, Some("x")), (2, Some("y"))]),
            concat_zip(),
        )
        .bind(&mut default_binder)
        .unwrap();
        assert_eq!(
            hof.eval(&Row::empty()).unwrap(),
            map_value(
                vec![Value::Integer(1), Value::Integer(2)],
                vec![Value::String("ax".into()), Value::String("by".into())],
            )
        );
    }

    #[test]
    fn test_zip_key_union_left_then_right() {
        // coalesce each side before concatenating so missing keys survive
        let body = Expr::concat(vec![
            Expr::coalesce(vec![Expr::unresolved_var("v1"), Expr::string("?")]),
            Expr::coalesce(vec![Expr::unresolved_var("v2"), Expr::string("?")]),
        ]);
        let hof = MapZipWith::new(
            int_string_map(&[(1, Some("a"))]),
            int_string_map(&[(2, Some("b"))]),
            LambdaFunction::new(body, ["k", "v1", "v2"]),
        )
        .bind(&mut default_binder)
        .unwrap();
        assert_eq!(
            hof.eval(&Row::empty()).unwrap(),
            map_value(
                vec![Value::Integer(1), Value::Integer(2)],
                vec![Value::String("a?".into()), Value::String("?b".into())],
            )
        );
    }

    #[test]
    fn test_zip_first_occurrence_wins() {
        let hof = MapZipWith::new(
            int_string_map(&[(1, Some("a")), (1, Some("dup")), (2, Some("b"))]),
            int_string_map(&[(2, Some("y")), (2, Some("dup")), (1, Some("x"))]),
            concat_zip(),
        )
        .bind(&mut default_binder)
        .unwrap();
        // key order follows the left scan, duplicates contribute once
        assert_eq!(
            hof.eval(&Row::empty()).unwrap(),
            map_value(
                vec![Value::Integer(1), Value::Integer(2)],
                vec![Value::String("ax".into()), Value::String("by".into())],
            )
        );
    }

    #[test]
    fn test_zip_null_map_propagates() {
        let null_map = Expr::null(DataType::map(DataType::Integer, DataType::String, false));
        let hof = MapZipWith::new(
            null_map,
            int_string_map(&[(1, Some("x"))]),
            concat_zip(),
        )
        .bind(&mut default_binder)
        .unwrap();
        assert_eq!(hof.eval(&Row::empty()).unwrap(), Value::Null);
    }

    #[test]
    fn test_zip_binary_keys_use_ordering_path() {
        let m1 = Expr::map(
            vec![Value::Binary(vec![1]), Value::Binary(vec![2])],
            vec![Value::String("a".into()), Value::String("b".into())],
            DataType::Binary,
            DataType::String,
        );
        let m2 = Expr::map(
            vec![Value::Binary(vec![2]), Value::Binary(vec![1])],
            vec![Value::String("y".into()), Value::String("x".into())],
            DataType::Binary,
            DataType::String,
        );
        let hof = MapZipWith::new(m1, m2, concat_zip())
            .bind(&mut default_binder)
            .unwrap();
        assert_eq!(
            hof.eval(&Row::empty()).unwrap(),
            map_value(
                vec![Value::Binary(vec![1]), Value::Binary(vec![2])],
                vec![Value::String("ax".into()), Value::String("by".into())],
            )
        );
    }

    #[test]
    fn test_zip_rejects_mismatched_key_types() {
        let ints = int_string_map(&[(1, Some("a"))]);
        let strings = Expr::map(
            vec![Value::String("k".into())],
            vec![Value::String("v".into())],
            DataType::String,
            DataType::String,
        );
        let hof = MapZipWith::new(ints, strings, concat_zip());
        assert_eq!(
            hof.bind(&mut default_binder).unwrap_err(),
            TypeCheckError::MapKeyTypeMismatch {
                left: "int".to_string(),
                right: "string".to_string(),
            }
        );
    }

    #[test]
    fn test_zip_rejects_unorderable_keys() {
        let key_type = DataType::map(DataType::Integer, DataType::Integer, false);
        let maps = Expr::map(
            Vec::new(),
            Vec::new(),
            key_type.clone(),
            DataType::String,
        );
        let hof = MapZipWith::new(maps.clone(), maps, concat_zip());
        assert_eq!(
            hof.check_argument_types(),
            Err(TypeCheckError::MapKeyNotOrderable {
                key: key_type.to_string(),
            })
        );
    }

    #[test]
    fn test_zip_result_type() {
        let hof = MapZipWith::new(
            int_string_map(&[(1, Some("a"))]),
            int_string_map(&[(1, Some("x"))]),
            concat_zip(),
        )
        .bind(&mut default_binder)
        .unwrap();
        // the value side is nullable because either zipped value may be
        // absent for a given key
        assert_eq!(
            hof.data_type(),
            DataType::map(DataType::Integer, DataType::String, true)
        );
    }
}
