//! Shared behaviour of higher-order nodes
//!
//! A higher-order node splits its children into data arguments and lambda
//! functions. Binding is two-phase: the node computes the parameter schema
//! each of its lambdas must materialise from its own argument types, and a
//! [`LambdaBinder`] supplied by the analysis driver turns the unbound
//! lambda into a bound one.

use std::collections::HashMap;

use crate::error::{CheckResult, EvalError, EvalResult, TypeCheckError};
use crate::types::DataType;
use crate::value::{ArrayData, MapData, Row, Value};

use super::lambda::{ExprId, LambdaFunction, LambdaParameter, NamedLambdaVariable};
use super::Expr;

/// Expected type and nullability of one lambda parameter
pub type ParamSchema = (DataType, bool);

/// Callback that installs typed parameters into a lambda
///
/// Receives the lambda as written plus the parameter schema the enclosing
/// node expects, and returns the bound lambda: fresh
/// [`NamedLambdaVariable`]s of the expected types, with the body rewritten
/// so parameter references point at them.
pub type LambdaBinder =
    dyn FnMut(&LambdaFunction, &[ParamSchema]) -> Result<LambdaFunction, TypeCheckError>;

/// Behaviour common to all higher-order nodes
pub trait HigherOrderFunction: Sized {
    /// Data arguments, in order
    fn arguments(&self) -> Vec<&Expr>;

    /// Lambda arguments, in order
    fn functions(&self) -> Vec<&LambdaFunction>;

    /// Analysis-time validation of argument and body types
    ///
    /// Only meaningful once the node is [`resolved`](Self::resolved).
    fn check_argument_types(&self) -> CheckResult;

    /// Rebuild this node with every lambda bound through `binder`
    ///
    /// Callers must ensure [`arguments_resolved`](Self::arguments_resolved)
    /// holds, the expected parameter schema is derived from argument types.
    fn bind(&self, binder: &mut LambdaBinder) -> Result<Self, TypeCheckError>;

    /// Whether all data arguments are resolved
    fn arguments_resolved(&self) -> bool {
        self.arguments().iter().all(|a| a.resolved())
    }

    /// Whether the node and all its lambdas are resolved
    fn resolved(&self) -> bool {
        self.arguments_resolved() && self.functions().iter().all(|f| f.resolved())
    }
}

/// Element type and null flag of an array-typed argument
pub(crate) fn array_element(dt: &DataType, index: usize) -> Result<ParamSchema, TypeCheckError> {
    match dt {
        DataType::Array {
            element,
            contains_null,
        } => Ok(((**element).clone(), *contains_null)),
        other => Err(TypeCheckError::ArgumentTypeMismatch {
            index,
            expected: "array".to_string(),
            actual: other.to_string(),
        }),
    }
}

/// Key type, value type and value-null flag of a map-typed argument
pub(crate) fn map_entry(
    dt: &DataType,
    index: usize,
) -> Result<(DataType, DataType, bool), TypeCheckError> {
    match dt {
        DataType::Map {
            key,
            value,
            value_contains_null,
        } => Ok(((**key).clone(), (**value).clone(), *value_contains_null)),
        other => Err(TypeCheckError::ArgumentTypeMismatch {
            index,
            expected: "map".to_string(),
            actual: other.to_string(),
        }),
    }
}

/// Check that a predicate lambda produces a boolean
pub(crate) fn check_boolean_body(function: &LambdaFunction, index: usize) -> CheckResult {
    if !function.resolved() {
        return Err(TypeCheckError::UnresolvedLambda {
            name: function.to_string(),
        });
    }
    if function.data_type() != DataType::Boolean {
        return Err(TypeCheckError::ArgumentTypeMismatch {
            index,
            expected: "boolean".to_string(),
            actual: function.data_type().to_string(),
        });
    }
    Ok(())
}

/// Evaluate an array argument; `None` means the array itself was null
pub(crate) fn eval_array_argument(
    expr: &Expr,
    row: &Row,
    context: &'static str,
) -> EvalResult<Option<ArrayData>> {
    match expr.eval(row)? {
        Value::Null => Ok(None),
        Value::Array(a) => Ok(Some(a)),
        other => Err(EvalError::UnexpectedValue {
            expected: "array",
            actual: other.kind(),
            context,
        }),
    }
}

/// Evaluate a map argument; `None` means the map itself was null
pub(crate) fn eval_map_argument(
    expr: &Expr,
    row: &Row,
    context: &'static str,
) -> EvalResult<Option<MapData>> {
    match expr.eval(row)? {
        Value::Null => Ok(None),
        Value::Map(m) => Ok(Some(m)),
        other => Err(EvalError::UnexpectedValue {
            expected: "map",
            actual: other.kind(),
            context,
        }),
    }
}

/// A lambda made safe for the evaluation loop
///
/// Produced by [`prepare_for_eval`]: the body is guaranteed to read the
/// exact slot instances listed in `params`, so the driver can alternate
/// slot writes with body evaluations.
#[derive(Debug)]
pub(crate) struct PreparedLambda {
    body: Expr,
    params: Vec<NamedLambdaVariable>,
}

impl PreparedLambda {
    /// Slot of the i-th parameter
    pub(crate) fn param(&self, i: usize) -> &NamedLambdaVariable {
        &self.params[i]
    }

    /// Number of parameters
    pub(crate) fn arity(&self) -> usize {
        self.params.len()
    }

    /// Evaluate the body against the current slot contents
    pub(crate) fn eval(&self, row: &Row) -> EvalResult<Value> {
        self.body.eval(row)
    }
}

/// Rewrite a lambda so body references share the parameter slots
///
/// Any variable in the body whose id matches a parameter is replaced by
/// that parameter's own instance. After this step the slot the driver
/// writes is, by construction, the slot the body reads, even if the body
/// was copied or rebuilt after binding.
pub(crate) fn prepare_for_eval(function: &LambdaFunction) -> EvalResult<PreparedLambda> {
    let Some(params) = function.bound_params() else {
        let name = function
            .params()
            .iter()
            .find_map(|p| match p {
                LambdaParameter::Named(n) => Some(n.clone()),
                LambdaParameter::Bound(_) => None,
            })
            .unwrap_or_default();
        return Err(EvalError::UnboundVariable { name });
    };

    let by_id: HashMap<ExprId, NamedLambdaVariable> =
        params.iter().map(|p| (p.id(), (*p).clone())).collect();
    let owned: Vec<NamedLambdaVariable> = params.into_iter().cloned().collect();

    let body = function.body().clone().transform_up(&mut |e| match e {
        Expr::Variable(v) => match by_id.get(&v.id()) {
            Some(param) => Expr::Variable(param.clone()),
            None => Expr::Variable(v),
        },
        other => other,
    });

    Ok(PreparedLambda {
        body,
        params: owned,
    })
}
