//! Lambda functions and their parameter slots
//!
//! A bound lambda parameter is a [`NamedLambdaVariable`]: a named, uniquely
//! identified slot the enclosing higher-order node writes before each body
//! evaluation. The slot is the only mutable state inside an expression
//! tree, shared between the driver (writer) and the body references
//! (readers) through an `Arc`.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::Expr;
use crate::error::EvalResult;
use crate::types::DataType;
use crate::value::{Row, Value};

/// Process-wide unique expression identifier
///
/// Ids are monotonically increasing; a fresh id is the identity of one
/// lambda variable instance, matching body references to the parameter
/// slot they read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u64);

impl ExprId {
    /// Allocate the next id
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        ExprId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ExprId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bound lambda parameter backed by a mutable value slot
///
/// Evaluation ignores the row entirely and returns whatever the owning
/// higher-order node last stored. Identity is the [`ExprId`]; equality
/// deliberately ignores the slot contents.
#[derive(Debug, Clone)]
pub struct NamedLambdaVariable {
    name: String,
    data_type: DataType,
    nullable: bool,
    id: ExprId,
    slot: Arc<RwLock<Value>>,
}

impl NamedLambdaVariable {
    /// Create a variable with a fresh id and an empty slot
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            id: ExprId::new(),
            slot: Arc::new(RwLock::new(Value::Null)),
        }
    }

    /// Copy of this variable with a fresh id and a fresh empty slot
    ///
    /// Required whenever an expression tree is duplicated: two live copies
    /// must never share a slot.
    pub fn new_instance(&self) -> Self {
        Self::new(self.name.clone(), self.data_type.clone(), self.nullable)
    }

    /// Variable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Whether the slot may hold null
    pub fn nullable(&self) -> bool {
        self.nullable
    }

    /// Identity of this instance
    pub fn id(&self) -> ExprId {
        self.id
    }

    /// Store a value into the slot
    pub fn set(&self, value: Value) {
        *self.slot.write() = value;
    }

    /// Current slot contents
    pub fn value(&self) -> Value {
        self.slot.read().clone()
    }
}

impl PartialEq for NamedLambdaVariable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.data_type == other.data_type
            && self.nullable == other.nullable
    }
}

impl fmt::Display for NamedLambdaVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// One lambda parameter position
///
/// Analysis produces `Named` placeholders; binding replaces them with
/// fully typed `Bound` variables.
#[derive(Debug, Clone, PartialEq)]
pub enum LambdaParameter {
    /// Placeholder carrying only the name the user wrote
    Named(String),
    /// Typed variable installed by the binder
    Bound(NamedLambdaVariable),
}

impl LambdaParameter {
    /// Parameter name, bound or not
    pub fn name(&self) -> &str {
        match self {
            LambdaParameter::Named(n) => n,
            LambdaParameter::Bound(v) => v.name(),
        }
    }
}

/// A lambda: a body expression plus its ordered parameter list
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaFunction {
    body: Box<Expr>,
    params: Vec<LambdaParameter>,
    hidden: bool,
}

impl LambdaFunction {
    /// Create an unbound lambda from a body and parameter names
    pub fn new<I, S>(body: Expr, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            body: Box::new(body),
            params: params
                .into_iter()
                .map(|n| LambdaParameter::Named(n.into()))
                .collect(),
            hidden: false,
        }
    }

    /// Create a lambda whose parameters are already bound
    pub fn bound(body: Expr, params: Vec<NamedLambdaVariable>, hidden: bool) -> Self {
        Self {
            body: Box::new(body),
            params: params.into_iter().map(LambdaParameter::Bound).collect(),
            hidden,
        }
    }

    /// The one-parameter identity lambda
    ///
    /// Used as the default finish step of `aggregate`; marked hidden so
    /// outer resolution never surfaces its bookkeeping parameter.
    pub fn identity(name: &str) -> Self {
        Self {
            body: Box::new(Expr::unresolved_var(name)),
            params: vec![LambdaParameter::Named(name.to_string())],
            hidden: true,
        }
    }

    /// The body expression
    pub fn body(&self) -> &Expr {
        &self.body
    }

    /// Ordered parameter list
    pub fn params(&self) -> &[LambdaParameter] {
        &self.params
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether this lambda exists only for bookkeeping
    pub fn hidden(&self) -> bool {
        self.hidden
    }

    /// Whether every parameter is bound and the body is resolved
    pub fn resolved(&self) -> bool {
        self.params
            .iter()
            .all(|p| matches!(p, LambdaParameter::Bound(_)))
            && self.body.resolved()
    }

    /// The bound variables, or `None` while any parameter is a placeholder
    pub fn bound_params(&self) -> Option<Vec<&NamedLambdaVariable>> {
        self.params
            .iter()
            .map(|p| match p {
                LambdaParameter::Bound(v) => Some(v),
                LambdaParameter::Named(_) => None,
            })
            .collect()
    }

    /// Result type, forwarded from the body
    pub fn data_type(&self) -> DataType {
        self.body.data_type()
    }

    /// Nullability, forwarded from the body
    pub fn nullable(&self) -> bool {
        self.body.nullable()
    }

    /// Evaluate the body against the current slot contents
    pub fn eval(&self, row: &Row) -> EvalResult<Value> {
        self.body.eval(row)
    }

    /// Rebuild this lambda with the body passed through `f`
    pub fn map_body<E>(
        self,
        f: &mut dyn FnMut(Expr) -> Result<Expr, E>,
    ) -> Result<Self, E> {
        Ok(Self {
            body: Box::new(f(*self.body)?),
            params: self.params,
            hidden: self.hidden,
        })
    }
}

impl fmt::Display for LambdaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.len() == 1 {
            write!(f, "{} -> {}", self.params[0].name(), self.body)
        } else {
            write!(f, "(")?;
            for (i, p) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", p.name())?;
            }
            write!(f, ") -> {}", self.body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slot_write_then_read() {
        let var = NamedLambdaVariable::new("x", DataType::Integer, false);
        assert_eq!(var.value(), Value::Null);
        var.set(Value::Integer(5));
        assert_eq!(var.value(), Value::Integer(5));
        // eval through the expression interface ignores the row
        let expr = Expr::Variable(var.clone());
        assert_eq!(expr.eval(&Row::empty()).unwrap(), Value::Integer(5));
    }

    #[test]
    fn test_new_instance_gets_fresh_slot() {
        let var = NamedLambdaVariable::new("x", DataType::Integer, false);
        var.set(Value::Integer(1));
        let copy = var.new_instance();
        assert_ne!(var.id(), copy.id());
        assert_eq!(copy.value(), Value::Null);
        copy.set(Value::Integer(2));
        assert_eq!(var.value(), Value::Integer(1));
    }

    #[test]
    fn test_clone_shares_slot() {
        let var = NamedLambdaVariable::new("x", DataType::Integer, false);
        let clone = var.clone();
        var.set(Value::Integer(9));
        assert_eq!(clone.value(), Value::Integer(9));
        assert_eq!(var, clone);
    }

    #[test]
    fn test_lambda_resolution() {
        let unbound = LambdaFunction::new(Expr::unresolved_var("x"), ["x"]);
        assert!(!unbound.resolved());
        assert!(unbound.bound_params().is_none());

        let var = NamedLambdaVariable::new("x", DataType::Integer, false);
        let bound = LambdaFunction::bound(Expr::Variable(var.clone()), vec![var], false);
        assert!(bound.resolved());
        assert_eq!(bound.data_type(), DataType::Integer);
    }

    #[test]
    fn test_identity_lambda() {
        let id = LambdaFunction::identity("acc");
        assert!(id.hidden());
        assert_eq!(id.arity(), 1);
        assert!(!id.resolved());
        assert_eq!(id.to_string(), "acc -> acc");
    }

    #[test]
    fn test_lambda_display() {
        let two = LambdaFunction::new(
            Expr::add(Expr::unresolved_var("x"), Expr::unresolved_var("i")),
            ["x", "i"],
        );
        assert_eq!(two.to_string(), "(x, i) -> (x + i)");
    }
}
