//! Higher-order functions over arrays
//!
//! Four operators share one evaluation shape: evaluate the array argument,
//! short-circuit null, then drive the lambda once per element by writing
//! its parameter slots and evaluating the body.

use crate::error::{CheckResult, EvalError, EvalResult, TypeCheckError};
use crate::types::DataType;
use crate::value::{ArrayData, Row, Value};

use super::higher_order::{
    HigherOrderFunction, LambdaBinder, ParamSchema, array_element, check_boolean_body,
    eval_array_argument, prepare_for_eval,
};
use super::lambda::LambdaFunction;
use super::Expr;

/// `transform(array, fn)`: element-wise projection
///
/// The lambda takes either `(element)` or `(element, index)`; the index
/// parameter is a non-null `int` counting from zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayTransform {
    /// Array argument
    pub argument: Box<Expr>,
    /// Projection lambda
    pub function: LambdaFunction,
}

impl ArrayTransform {
    /// Create an array transform
    pub fn new(argument: Expr, function: LambdaFunction) -> Self {
        Self {
            argument: Box::new(argument),
            function,
        }
    }

    /// Result type: array of the body type
    pub fn data_type(&self) -> DataType {
        DataType::array(self.function.data_type(), self.function.nullable())
    }

    /// Null iff the array argument is null
    pub fn nullable(&self) -> bool {
        self.argument.nullable()
    }

    pub(crate) fn children(&self) -> Vec<&Expr> {
        vec![self.argument.as_ref(), self.function.body()]
    }

    /// Evaluate against one row
    pub fn eval(&self, row: &Row) -> EvalResult<Value> {
        let Some(arr) = eval_array_argument(&self.argument, row, "transform")? else {
            return Ok(Value::Null);
        };
        let function = prepare_for_eval(&self.function)?;
        let with_index = function.arity() > 1;

        let mut out = Vec::with_capacity(arr.num_elements());
        for i in 0..arr.num_elements() {
            function.param(0).set(arr.get(i).clone());
            if with_index {
                function.param(1).set(Value::Integer(i as i32));
            }
            out.push(function.eval(row)?);
        }
        Ok(Value::Array(ArrayData::from_vec(out)))
    }
}

impl HigherOrderFunction for ArrayTransform {
    fn arguments(&self) -> Vec<&Expr> {
        vec![self.argument.as_ref()]
    }

    fn functions(&self) -> Vec<&LambdaFunction> {
        vec![&self.function]
    }

    fn check_argument_types(&self) -> CheckResult {
        array_element(&self.argument.data_type(), 0).map(|_| ())
    }

    fn bind(&self, binder: &mut LambdaBinder) -> Result<Self, TypeCheckError> {
        let (element, contains_null) = array_element(&self.argument.data_type(), 0)?;
        // a two-parameter lambda additionally receives the element index
        let expected: Vec<ParamSchema> = if self.function.arity() == 2 {
            vec![(element, contains_null), (DataType::Integer, false)]
        } else {
            vec![(element, contains_null)]
        };
        let function = binder(&self.function, &expected)?;
        Ok(Self {
            argument: self.argument.clone(),
            function,
        })
    }
}

/// `filter(array, fn)`: keep elements the predicate accepts
///
/// A null predicate result is a non-match; surviving elements keep their
/// relative order.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayFilter {
    /// Array argument
    pub argument: Box<Expr>,
    /// Boolean predicate lambda over `(element)`
    pub function: LambdaFunction,
}

impl ArrayFilter {
    /// Create an array filter
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

    /// Null iff the array argument is null
    pub fn nullable(&self) -> bool {
        self.argument.nullable()
    }

    pub(crate) fn children(&self) -> Vec<&Expr> {
        vec![self.argument.as_ref(), self.function.body()]
    }

    /// Evaluate against one row
    pub fn eval(&self, row: &Row) -> EvalResult<Value> {
        let Some(arr) = eval_array_argument(&self.argument, row, "filter")? else {
            return Ok(Value::Null);
        };
        let function = prepare_for_eval(&self.function)?;

        let mut out = Vec::new();
        for i in 0..arr.num_elements() {
            function.param(0).set(arr.get(i).clone());
            match function.eval(row)? {
                Value::Boolean(true) => out.push(arr.get(i).clone()),
                Value::Boolean(false) | Value::Null => {}
                other => {
                    return Err(EvalError::UnexpectedValue {
                        expected: "boolean",
                        actual: other.kind(),
                        context: "filter",
                    });
                }
            }
        }
        Ok(Value::Array(ArrayData::from_vec(out)))
    }
}

impl HigherOrderFunction for ArrayFilter {
    fn arguments(&self) -> Vec<&Expr> {
        vec![self.argument.as_ref()]
    }

    fn functions(&self) -> Vec<&LambdaFunction> {
        vec![&self.function]
    }

    fn check_argument_types(&self) -> CheckResult {
        array_element(&self.argument.data_type(), 0)?;
        check_boolean_body(&self.function, 1)
    }

    fn bind(&self, binder: &mut LambdaBinder) -> Result<Self, TypeCheckError> {
        let (element, contains_null) = array_element(&self.argument.data_type(), 0)?;
        let function = binder(&self.function, &[(element, contains_null)])?;
        Ok(Self {
            argument: self.argument.clone(),
            function,
        })
    }
}

/// `exists(array, fn)`: short-circuit scan for a matching element
///
/// Null predicate results are skipped; a non-null array always yields a
/// non-null boolean.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayExists {
    /// Array argument
    pub argument: Box<Expr>,
    /// Boolean predicate lambda over `(element)`
    pub function: LambdaFunction,
}

impl ArrayExists {
    /// Create an existence test
    pub fn new(argument: Expr, function: LambdaFunction) -> Self {
        Self {
            argument: Box::new(argument),
            function,
        }
    }

    /// Null iff the array argument is null
    pub fn nullable(&self) -> bool {
        self.argument.nullable()
    }

    pub(crate) fn children(&self) -> Vec<&Expr> {
        vec![self.argument.as_ref(), self.function.body()]
    }

    /// Evaluate against one row
    pub fn eval(&self, row: &Row) -> EvalResult<Value> {
        let Some(arr) = eval_array_argument(&self.argument, row, "exists")? else {
            return Ok(Value::Null);
        };
        let function = prepare_for_eval(&self.function)?;

        for i in 0..arr.num_elements() {
            function.param(0).set(arr.get(i).clone());
            match function.eval(row)? {
                Value::Boolean(true) => return Ok(Value::Boolean(true)),
                Value::Boolean(false) | Value::Null => {}
                other => {
                    return Err(EvalError::UnexpectedValue {
                        expected: "boolean",
                        actual: other.kind(),
                        context: "exists",
                    });
                }
            }
        }
        Ok(Value::Boolean(false))
    }
}

impl HigherOrderFunction for ArrayExists {
    fn arguments(&self) -> Vec<&Expr> {
        vec![self.argument.as_ref()]
    }

    fn functions(&self) -> Vec<&LambdaFunction> {
        vec![&self.function]
    }

    fn check_argument_types(&self) -> CheckResult {
        array_element(&self.argument.data_type(), 0)?;
        check_boolean_body(&self.function, 1)
    }

    fn bind(&self, binder: &mut LambdaBinder) -> Result<Self, TypeCheckError> {
        let (element, contains_null) = array_element(&self.argument.data_type(), 0)?;
        let function = binder(&self.function, &[(element, contains_null)])?;
        Ok(Self {
            argument: self.argument.clone(),
            function,
        })
    }
}

/// `aggregate(array, zero, merge[, finish])`: left fold
///
/// The accumulator starts at `zero`, `merge(acc, element)` runs once per
/// element, and `finish(acc)` shapes the final result. When no finish
/// step is given, a hidden identity lambda stands in.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayAggregate {
    /// Array argument
    pub argument: Box<Expr>,
    /// Start value of the accumulator
    pub zero: Box<Expr>,
    /// Two-parameter `(accumulator, element)` combiner
    pub merge: LambdaFunction,
    /// One-parameter result projection
    pub finish: LambdaFunction,
}

impl ArrayAggregate {
    /// Create an aggregate with the identity finish step
    pub fn new(argument: Expr, zero: Expr, merge: LambdaFunction) -> Self {
        Self::with_finish(argument, zero, merge, LambdaFunction::identity("acc"))
    }

    /// Create an aggregate with an explicit finish step
    pub fn with_finish(
        argument: Expr,
        zero: Expr,
        merge: LambdaFunction,
        finish: LambdaFunction,
    ) -> Self {
        Self {
            argument: Box::new(argument),
            zero: Box::new(zero),
            merge,
            finish,
        }
    }

    /// Result type: whatever the finish step produces
    pub fn data_type(&self) -> DataType {
        self.finish.data_type()
    }

    /// Null if the array is null or the finish step may produce null
    pub fn nullable(&self) -> bool {
        self.argument.nullable() || self.finish.nullable()
    }

    pub(crate) fn children(&self) -> Vec<&Expr> {
        vec![
            self.argument.as_ref(),
            self.zero.as_ref(),
            self.merge.body(),
            self.finish.body(),
        ]
    }

    /// Evaluate against one row
    pub fn eval(&self, row: &Row) -> EvalResult<Value> {
        let Some(arr) = eval_array_argument(&self.argument, row, "aggregate")? else {
            return Ok(Value::Null);
        };
        let merge = prepare_for_eval(&self.merge)?;
        let finish = prepare_for_eval(&self.finish)?;

        merge.param(0).set(self.zero.eval(row)?);
        for i in 0..arr.num_elements() {
            merge.param(1).set(arr.get(i).clone());
            let folded = merge.eval(row)?;
            merge.param(0).set(folded);
        }

        finish.param(0).set(merge.param(0).value());
        finish.eval(row)
    }
}

impl HigherOrderFunction for ArrayAggregate {
    fn arguments(&self) -> Vec<&Expr> {
        vec![self.argument.as_ref(), self.zero.as_ref()]
    }

    fn functions(&self) -> Vec<&LambdaFunction> {
        vec![&self.merge, &self.finish]
    }

    fn check_argument_types(&self) -> CheckResult {
        array_element(&self.argument.data_type(), 0)?;
        if !self.merge.resolved() {
            return Err(TypeCheckError::UnresolvedLambda {
                name: self.merge.to_string(),
            });
        }
        let zero = self.zero.data_type();
        let merge = self.merge.data_type();
        if !zero.equals_structurally(&merge, true) {
            return Err(TypeCheckError::AccumulatorTypeMismatch {
                zero: zero.to_string(),
                merge: merge.to_string(),
            });
        }
        Ok(())
    }

    fn bind(&self, binder: &mut LambdaBinder) -> Result<Self, TypeCheckError> {
        let (element, contains_null) = array_element(&self.argument.data_type(), 0)?;
        let zero_type = self.zero.data_type();
        // the merge result feeds back into the accumulator slot, so the
        // accumulator is conservatively nullable
        let merge = binder(
            &self.merge,
            &[(zero_type.clone(), true), (element, contains_null)],
        )?;
        let finish = binder(&self.finish, &[(zero_type, true)])?;
        Ok(Self {
            argument: self.argument.clone(),
            zero: self.zero.clone(),
            merge,
            finish,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::default_binder;
    use pretty_assertions::assert_eq;

    fn ints(xs: &[i32]) -> Expr {
        Expr::array(xs.iter().map(|&i| Value::Integer(i)).collect(), DataType::Integer)
    }

    fn eval(expr: impl FnOnce() -> EvalResult<Value>) -> Value {
        expr().unwrap()
    }

    #[test]
    fn test_transform_identity() {
        let hof = ArrayTransform::new(
            ints(&[12, 99, 1]),
            LambdaFunction::new(Expr::unresolved_var("x"), ["x"]),
        )
        .bind(&mut default_binder)
        .unwrap();
        assert_eq!(
            eval(|| hof.eval(&Row::empty())),
            Value::Array(ArrayData::from_vec(vec![
                Value::Integer(12),
                Value::Integer(99),
                Value::Integer(1),
            ]))
        );
        assert_eq!(hof.data_type(), DataType::array(DataType::Integer, false));
    }

    #[test]
    fn test_transform_preserves_nulls() {
        let arg = Expr::array(
            vec![Value::Integer(1), Value::Null],
            DataType::Integer,
        );
        let hof = ArrayTransform::new(arg, LambdaFunction::new(Expr::unresolved_var("x"), ["x"]))
            .bind(&mut default_binder)
            .unwrap();
        assert_eq!(
            eval(|| hof.eval(&Row::empty())),
            Value::Array(ArrayData::from_vec(vec![Value::Integer(1), Value::Null]))
        );
        assert_eq!(hof.data_type(), DataType::array(DataType::Integer, true));
    }

    #[test]
    fn test_transform_with_index() {
        // (y, i) -> y + i over [32, 97]
        let body = Expr::add(Expr::unresolved_var("y"), Expr::unresolved_var("i"));
        let hof = ArrayTransform::new(ints(&[32, 97]), LambdaFunction::new(body, ["y", "i"]))
            .bind(&mut default_binder)
            .unwrap();
        assert_eq!(
            eval(|| hof.eval(&Row::empty())),
            Value::Array(ArrayData::from_vec(vec![
                Value::Integer(32),
                Value::Integer(98),
            ]))
        );
    }

    #[test]
    fn test_transform_null_array() {
        let hof = ArrayTransform::new(
            Expr::null(DataType::array(DataType::Integer, false)),
            LambdaFunction::new(Expr::unresolved_var("x"), ["x"]),
        )
        .bind(&mut default_binder)
        .unwrap();
        assert_eq!(eval(|| hof.eval(&Row::empty())), Value::Null);
    }

    #[test]
    fn test_filter_keeps_order() {
        // x -> x % 2 = 1 over [1, 2, 3]
        let body = Expr::eq(
            Expr::modulo(Expr::unresolved_var("x"), Expr::int(2)),
            Expr::int(1),
        );
        let hof = ArrayFilter::new(ints(&[1, 2, 3]), LambdaFunction::new(body, ["x"]))
            .bind(&mut default_binder)
            .unwrap();
        assert_eq!(
            eval(|| hof.eval(&Row::empty())),
            Value::Array(ArrayData::from_vec(vec![
                Value::Integer(1),
                Value::Integer(3),
            ]))
        );
    }

    #[test]
    fn test_filter_null_predicate_drops() {
        // null > 0 is null for the null element, so it is dropped
        let arg = Expr::array(
            vec![Value::Integer(5), Value::Null, Value::Integer(-5)],
            DataType::Integer,
        );
        let body = Expr::gt(Expr::unresolved_var("x"), Expr::int(0));
        let hof = ArrayFilter::new(arg, LambdaFunction::new(body, ["x"]))
            .bind(&mut default_binder)
            .unwrap();
        assert_eq!(
            eval(|| hof.eval(&Row::empty())),
            Value::Array(ArrayData::from_vec(vec![Value::Integer(5)]))
        );
    }

    #[test]
    fn test_exists_short_circuits() {
        let body = Expr::eq(
            Expr::modulo(Expr::unresolved_var("x"), Expr::int(2)),
            Expr::int(0),
        );
        let hof = ArrayExists::new(ints(&[1, 2, 3]), LambdaFunction::new(body.clone(), ["x"]))
            .bind(&mut default_binder)
            .unwrap();
        assert_eq!(eval(|| hof.eval(&Row::empty())), Value::Boolean(true));

        let hof = ArrayExists::new(ints(&[1, 3, 5]), LambdaFunction::new(body, ["x"]))
            .bind(&mut default_binder)
            .unwrap();
        assert_eq!(eval(|| hof.eval(&Row::empty())), Value::Boolean(false));
    }

    #[test]
    fn test_aggregate_fold_and_finish() {
        // aggregate([1,2,3], 0, (acc, x) -> acc + x, acc -> acc * 10) = 60
        let merge = LambdaFunction::new(
            Expr::add(Expr::unresolved_var("acc"), Expr::unresolved_var("x")),
            ["acc", "x"],
        );
        let finish = LambdaFunction::new(
            Expr::mul(Expr::unresolved_var("acc"), Expr::int(10)),
            ["acc"],
        );
        let hof = ArrayAggregate::with_finish(ints(&[1, 2, 3]), Expr::int(0), merge, finish)
            .bind(&mut default_binder)
            .unwrap();
        assert_eq!(eval(|| hof.eval(&Row::empty())), Value::Integer(60));
    }

    #[test]
    fn test_aggregate_default_finish_is_identity() {
        let merge = LambdaFunction::new(
            Expr::add(Expr::unresolved_var("acc"), Expr::unresolved_var("x")),
            ["acc", "x"],
        );
        let hof = ArrayAggregate::new(ints(&[1, 2, 3]), Expr::int(0), merge)
            .bind(&mut default_binder)
            .unwrap();
        assert!(hof.finish.hidden());
        assert_eq!(eval(|| hof.eval(&Row::empty())), Value::Integer(6));
    }

    #[test]
    fn test_aggregate_empty_array_returns_zero() {
        let merge = LambdaFunction::new(
            Expr::add(Expr::unresolved_var("acc"), Expr::unresolved_var("x")),
            ["acc", "x"],
        );
        let hof = ArrayAggregate::new(
            Expr::array(Vec::new(), DataType::Integer),
            Expr::int(41),
            merge,
        )
        .bind(&mut default_binder)
        .unwrap();
        assert_eq!(eval(|| hof.eval(&Row::empty())), Value::Integer(41));
    }

    #[test]
    fn test_aggregate_accumulator_type_check() {
        // zero is bigint but the merge result is int
        let merge = LambdaFunction::new(Expr::unresolved_var("x"), ["acc", "x"]);
        let hof = ArrayAggregate::new(ints(&[1, 2]), Expr::long(0), merge)
            .bind(&mut default_binder)
            .unwrap();
        assert_eq!(
            hof.check_argument_types(),
            Err(TypeCheckError::AccumulatorTypeMismatch {
                zero: "bigint".to_string(),
                merge: "int".to_string(),
            })
        );
    }

    #[test]
    fn test_repeated_eval_overwrites_stale_slots() {
        let body = Expr::gt(Expr::unresolved_var("x"), Expr::int(1));
        let hof = ArrayFilter::new(ints(&[1, 2, 3]), LambdaFunction::new(body, ["x"]))
            .bind(&mut default_binder)
            .unwrap();
        let first = hof.eval(&Row::empty()).unwrap();
        let second = hof.eval(&Row::empty()).unwrap();
        assert_eq!(first, second);
    }
}
