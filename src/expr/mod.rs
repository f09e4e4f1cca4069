//! Expression tree with self-evaluating nodes
//!
//! Every node knows its result type, nullability and children, and can
//! evaluate itself against a [`Row`]. The general-purpose nodes here are
//! the minimum a lambda body needs (literals, row references, arithmetic,
//! comparison, `concat`, `coalesce`); the interesting machinery lives in
//! the higher-order nodes of [`arrays`] and [`maps`].

pub mod arrays;
pub mod higher_order;
pub mod lambda;
pub mod maps;

use std::cmp::Ordering;
use std::fmt;

use crate::error::{EvalError, EvalResult};
use crate::types::DataType;
use crate::value::{Row, Value, value_compare};

pub use arrays::{ArrayAggregate, ArrayExists, ArrayFilter, ArrayTransform};
pub use higher_order::HigherOrderFunction;
pub use lambda::{ExprId, LambdaFunction, LambdaParameter, NamedLambdaVariable};
pub use maps::{MapFilter, MapZipWith};

/// An expression node
///
/// Trees are immutable once built; the single exception is the value slot
/// inside a [`NamedLambdaVariable`], which the owning higher-order node
/// writes between body evaluations.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant value with an explicit type
    Literal(Literal),
    /// Reference to a column of the input row
    BoundReference(BoundReference),
    /// Two-operand arithmetic or comparison
    BinaryOp(BinaryOp),
    /// String concatenation over any number of operands
    Concat(Concat),
    /// First non-null operand
    Coalesce(Coalesce),
    /// Lambda parameter reference that has not been bound yet
    UnresolvedVariable(UnresolvedVariable),
    /// Bound lambda parameter backed by a value slot
    Variable(NamedLambdaVariable),
    /// Lambda function (only valid as a higher-order node's child)
    Lambda(LambdaFunction),
    /// Element-wise array transformation
    ArrayTransform(ArrayTransform),
    /// Array filtering by predicate
    ArrayFilter(ArrayFilter),
    /// Short-circuit existence test
    ArrayExists(ArrayExists),
    /// Left fold over an array
    ArrayAggregate(ArrayAggregate),
    /// Map filtering by key/value predicate
    MapFilter(MapFilter),
    /// Key-union zip of two maps
    MapZipWith(MapZipWith),
}

/// Constant value with an explicit type
///
/// The type is explicit so null literals and empty arrays stay typed.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    /// The constant
    pub value: Value,
    /// Declared type of the constant
    pub data_type: DataType,
}

/// Reference to a column of the input row
#[derive(Debug, Clone, PartialEq)]
pub struct BoundReference {
    /// Column position
    pub ordinal: usize,
    /// Column type
    pub data_type: DataType,
    /// Whether the column may hold nulls
    pub nullable: bool,
}

/// Operator of a [`BinaryOp`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    /// Numeric addition
    Add,
    /// Numeric subtraction
    Subtract,
    /// Numeric multiplication
    Multiply,
    /// Remainder; a zero divisor yields null
    Modulo,
    /// Equality
    Eq,
    /// Less-than
    Lt,
    /// Greater-than
    Gt,
}

impl BinaryOperator {
    /// Operator symbol for display
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Eq => "=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
        }
    }

    fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq | BinaryOperator::Lt | BinaryOperator::Gt
        )
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Two-operand arithmetic or comparison, null-propagating
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOp {
    /// The operator
    pub op: BinaryOperator,
    /// Left operand
    pub left: Box<Expr>,
    /// Right operand
    pub right: Box<Expr>,
}

/// String concatenation; null if any operand is null
#[derive(Debug, Clone, PartialEq)]
pub struct Concat {
    /// Operands, all string-typed
    pub children: Vec<Expr>,
}

/// First non-null operand
#[derive(Debug, Clone, PartialEq)]
pub struct Coalesce {
    /// Operands, all of one type
    pub children: Vec<Expr>,
}

/// Lambda parameter reference before binding
///
/// The binder replaces these with [`NamedLambdaVariable`]s once the
/// enclosing higher-order node knows its parameter types.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedVariable {
    /// Parameter name as written
    pub name: String,
}

impl Expr {
    /// Result type of this expression
    ///
    /// # Panics
    ///
    /// Panics when called on an unresolved node; callers must check
    /// [`Expr::resolved`] first.
    pub fn data_type(&self) -> DataType {
        match self {
            Expr::Literal(n) => n.data_type.clone(),
            Expr::BoundReference(n) => n.data_type.clone(),
            Expr::BinaryOp(n) => {
                if n.op.is_comparison() {
                    DataType::Boolean
                } else {
                    n.left.data_type()
                }
            }
            Expr::Concat(_) => DataType::String,
            Expr::Coalesce(n) => n.children[0].data_type(),
            Expr::UnresolvedVariable(n) => {
                panic!("data_type called on unresolved lambda variable {}", n.name)
            }
            Expr::Variable(v) => v.data_type().clone(),
            Expr::Lambda(f) => f.data_type(),
            Expr::ArrayTransform(n) => n.data_type(),
            Expr::ArrayFilter(n) => n.data_type(),
            Expr::ArrayExists(_) => DataType::Boolean,
            Expr::ArrayAggregate(n) => n.data_type(),
            Expr::MapFilter(n) => n.data_type(),
            Expr::MapZipWith(n) => n.data_type(),
        }
    }

    /// Whether this expression may evaluate to null
    pub fn nullable(&self) -> bool {
        match self {
            Expr::Literal(n) => n.value.is_null(),
            Expr::BoundReference(n) => n.nullable,
            Expr::BinaryOp(n) => n.left.nullable() || n.right.nullable(),
            Expr::Concat(n) => n.children.iter().any(Expr::nullable),
            Expr::Coalesce(n) => n.children.iter().all(Expr::nullable),
            Expr::UnresolvedVariable(_) => true,
            Expr::Variable(v) => v.nullable(),
            Expr::Lambda(f) => f.nullable(),
            Expr::ArrayTransform(n) => n.nullable(),
            Expr::ArrayFilter(n) => n.nullable(),
            Expr::ArrayExists(n) => n.nullable(),
            Expr::ArrayAggregate(n) => n.nullable(),
            Expr::MapFilter(n) => n.nullable(),
            Expr::MapZipWith(n) => n.nullable(),
        }
    }

    /// Direct sub-expressions
    ///
    /// Lambda parameters are bookkeeping, not children; for a lambda the
    /// only child is its body.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal(_)
            | Expr::BoundReference(_)
            | Expr::UnresolvedVariable(_)
            | Expr::Variable(_) => Vec::new(),
            Expr::BinaryOp(n) => vec![n.left.as_ref(), n.right.as_ref()],
            Expr::Concat(n) => n.children.iter().collect(),
            Expr::Coalesce(n) => n.children.iter().collect(),
            Expr::Lambda(f) => vec![f.body()],
            Expr::ArrayTransform(n) => n.children(),
            Expr::ArrayFilter(n) => n.children(),
            Expr::ArrayExists(n) => n.children(),
            Expr::ArrayAggregate(n) => n.children(),
            Expr::MapFilter(n) => n.children(),
            Expr::MapZipWith(n) => n.children(),
        }
    }

    /// Whether this subtree is fully resolved
    pub fn resolved(&self) -> bool {
        match self {
            Expr::Literal(_) | Expr::BoundReference(_) | Expr::Variable(_) => true,
            Expr::UnresolvedVariable(_) => false,
            Expr::Lambda(f) => f.resolved(),
            Expr::ArrayTransform(n) => HigherOrderFunction::resolved(n),
            Expr::ArrayFilter(n) => HigherOrderFunction::resolved(n),
            Expr::ArrayExists(n) => HigherOrderFunction::resolved(n),
            Expr::ArrayAggregate(n) => HigherOrderFunction::resolved(n),
            Expr::MapFilter(n) => HigherOrderFunction::resolved(n),
            Expr::MapZipWith(n) => HigherOrderFunction::resolved(n),
            _ => self.children().iter().all(|c| c.resolved()),
        }
    }

    /// Evaluate this expression against one input row
    pub fn eval(&self, row: &Row) -> EvalResult<Value> {
        match self {
            Expr::Literal(n) => Ok(n.value.clone()),
            Expr::BoundReference(n) => Ok(row.get(n.ordinal).clone()),
            Expr::BinaryOp(n) => {
                let left = n.left.eval(row)?;
                let right = n.right.eval(row)?;
                eval_binary(n.op, left, right)
            }
            Expr::Concat(n) => {
                let mut out = String::new();
                for child in &n.children {
                    match child.eval(row)? {
                        Value::Null => return Ok(Value::Null),
                        Value::String(s) => out.push_str(&s),
                        other => {
                            return Err(EvalError::UnexpectedValue {
                                expected: "string",
                                actual: other.kind(),
                                context: "concat",
                            });
                        }
                    }
                }
                Ok(Value::String(out))
            }
            Expr::Coalesce(n) => {
                for child in &n.children {
                    let v = child.eval(row)?;
                    if !v.is_null() {
                        return Ok(v);
                    }
                }
                Ok(Value::Null)
            }
            Expr::UnresolvedVariable(n) => Err(EvalError::UnboundVariable {
                name: n.name.clone(),
            }),
            Expr::Variable(v) => Ok(v.value()),
            Expr::Lambda(f) => f.eval(row),
            Expr::ArrayTransform(n) => n.eval(row),
            Expr::ArrayFilter(n) => n.eval(row),
            Expr::ArrayExists(n) => n.eval(row),
            Expr::ArrayAggregate(n) => n.eval(row),
            Expr::MapFilter(n) => n.eval(row),
            Expr::MapZipWith(n) => n.eval(row),
        }
    }

    /// Rebuild this node with every direct child passed through `f`
    ///
    /// Lambda children are passed wrapped in [`Expr::Lambda`] and must come
    /// back as lambdas.
    pub fn map_children(self, f: &mut dyn FnMut(Expr) -> Expr) -> Expr {
        // infallible shim over the fallible traversal
        enum Never {}
        let result: Result<Expr, Never> = self.try_map_children(&mut |e| Ok(f(e)));
        match result {
            Ok(e) => e,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`Expr::map_children`]
    pub fn try_map_children<E>(
        self,
        f: &mut dyn FnMut(Expr) -> Result<Expr, E>,
    ) -> Result<Expr, E> {
        fn boxed<E>(
            e: Box<Expr>,
            f: &mut dyn FnMut(Expr) -> Result<Expr, E>,
        ) -> Result<Box<Expr>, E> {
            Ok(Box::new(f(*e)?))
        }
        fn each<E>(
            es: Vec<Expr>,
            f: &mut dyn FnMut(Expr) -> Result<Expr, E>,
        ) -> Result<Vec<Expr>, E> {
            es.into_iter().map(f).collect()
        }
        fn lambda<E>(
            l: LambdaFunction,
            f: &mut dyn FnMut(Expr) -> Result<Expr, E>,
        ) -> Result<LambdaFunction, E> {
            match f(Expr::Lambda(l))? {
                Expr::Lambda(l) => Ok(l),
                other => panic!("lambda position rewritten to non-lambda expression: {other}"),
            }
        }

        Ok(match self {
            Expr::Literal(_)
            | Expr::BoundReference(_)
            | Expr::UnresolvedVariable(_)
            | Expr::Variable(_) => self,
            Expr::BinaryOp(n) => Expr::BinaryOp(BinaryOp {
                op: n.op,
                left: boxed(n.left, f)?,
                right: boxed(n.right, f)?,
            }),
            Expr::Concat(n) => Expr::Concat(Concat {
                children: each(n.children, f)?,
            }),
            Expr::Coalesce(n) => Expr::Coalesce(Coalesce {
                children: each(n.children, f)?,
            }),
            Expr::Lambda(l) => Expr::Lambda(l.map_body(f)?),
            Expr::ArrayTransform(n) => Expr::ArrayTransform(ArrayTransform {
                argument: boxed(n.argument, f)?,
                function: lambda(n.function, f)?,
            }),
            Expr::ArrayFilter(n) => Expr::ArrayFilter(ArrayFilter {
                argument: boxed(n.argument, f)?,
                function: lambda(n.function, f)?,
            }),
            Expr::ArrayExists(n) => Expr::ArrayExists(ArrayExists {
                argument: boxed(n.argument, f)?,
                function: lambda(n.function, f)?,
            }),
            Expr::ArrayAggregate(n) => Expr::ArrayAggregate(ArrayAggregate {
                argument: boxed(n.argument, f)?,
                zero: boxed(n.zero, f)?,
                merge: lambda(n.merge, f)?,
                finish: lambda(n.finish, f)?,
            }),
            Expr::MapFilter(n) => Expr::MapFilter(MapFilter {
                argument: boxed(n.argument, f)?,
                function: lambda(n.function, f)?,
            }),
            Expr::MapZipWith(n) => Expr::MapZipWith(MapZipWith {
                left: boxed(n.left, f)?,
                right: boxed(n.right, f)?,
                function: lambda(n.function, f)?,
            }),
        })
    }

    /// Post-order rewrite: children first, then this node
    pub fn transform_up(self, f: &mut dyn FnMut(Expr) -> Expr) -> Expr {
        let rebuilt = self.map_children(&mut |c| c.transform_up(f));
        f(rebuilt)
    }
}

fn eval_binary(op: BinaryOperator, left: Value, right: Value) -> EvalResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    match op {
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Modulo => eval_arithmetic(op, &left, &right),
        BinaryOperator::Eq => match value_compare(&left, &right) {
            Some(ord) => Ok(Value::Boolean(ord == Ordering::Equal)),
            None if left.kind() == right.kind() => Ok(Value::Boolean(left == right)),
            None => Err(EvalError::UnexpectedValue {
                expected: "comparable operands",
                actual: right.kind(),
                context: "=",
            }),
        },
        BinaryOperator::Lt | BinaryOperator::Gt => match value_compare(&left, &right) {
            Some(ord) => Ok(Value::Boolean(if op == BinaryOperator::Lt {
                ord == Ordering::Less
            } else {
                ord == Ordering::Greater
            })),
            None => Err(EvalError::UnexpectedValue {
                expected: "orderable operands",
                actual: right.kind(),
                context: op.symbol(),
            }),
        },
    }
}

enum NumericPair {
    Int(i32, i32),
    Long(i64, i64),
    Double(f64, f64),
}

fn numeric_pair(left: &Value, right: &Value) -> Option<NumericPair> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(NumericPair::Int(*a, *b)),
        (Value::Integer(a), Value::Long(b)) => Some(NumericPair::Long(*a as i64, *b)),
        (Value::Long(a), Value::Integer(b)) => Some(NumericPair::Long(*a, *b as i64)),
        (Value::Long(a), Value::Long(b)) => Some(NumericPair::Long(*a, *b)),
        (Value::Double(a), Value::Double(b)) => Some(NumericPair::Double(*a, *b)),
        (Value::Double(a), Value::Integer(b)) => Some(NumericPair::Double(*a, *b as f64)),
        (Value::Double(a), Value::Long(b)) => Some(NumericPair::Double(*a, *b as f64)),
        (Value::Integer(a), Value::Double(b)) => Some(NumericPair::Double(*a as f64, *b)),
        (Value::Long(a), Value::Double(b)) => Some(NumericPair::Double(*a as f64, *b)),
        _ => None,
    }
}

fn eval_arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> EvalResult<Value> {
    let pair = numeric_pair(left, right).ok_or(EvalError::UnexpectedValue {
        expected: "numeric operands",
        actual: left.kind(),
        context: op.symbol(),
    })?;
    Ok(match (op, pair) {
        (BinaryOperator::Add, NumericPair::Int(a, b)) => Value::Integer(a.wrapping_add(b)),
        (BinaryOperator::Add, NumericPair::Long(a, b)) => Value::Long(a.wrapping_add(b)),
        (BinaryOperator::Add, NumericPair::Double(a, b)) => Value::Double(a + b),
        (BinaryOperator::Subtract, NumericPair::Int(a, b)) => Value::Integer(a.wrapping_sub(b)),
        (BinaryOperator::Subtract, NumericPair::Long(a, b)) => Value::Long(a.wrapping_sub(b)),
        (BinaryOperator::Subtract, NumericPair::Double(a, b)) => Value::Double(a - b),
        (BinaryOperator::Multiply, NumericPair::Int(a, b)) => Value::Integer(a.wrapping_mul(b)),
        (BinaryOperator::Multiply, NumericPair::Long(a, b)) => Value::Long(a.wrapping_mul(b)),
        (BinaryOperator::Multiply, NumericPair::Double(a, b)) => Value::Double(a * b),
        (BinaryOperator::Modulo, NumericPair::Int(_, 0)) => Value::Null,
        (BinaryOperator::Modulo, NumericPair::Long(_, 0)) => Value::Null,
        (BinaryOperator::Modulo, NumericPair::Int(a, b)) => Value::Integer(a.wrapping_rem(b)),
        (BinaryOperator::Modulo, NumericPair::Long(a, b)) => Value::Long(a.wrapping_rem(b)),
        (BinaryOperator::Modulo, NumericPair::Double(a, b)) => Value::Double(a % b),
        _ => unreachable!("comparison routed through eval_binary"),
    })
}

// Convenience constructors
impl Expr {
    /// Create a literal with an explicit type
    pub fn literal(value: Value, data_type: DataType) -> Self {
        Expr::Literal(Literal { value, data_type })
    }

    /// Integer literal
    pub fn int(value: i32) -> Self {
        Expr::literal(Value::Integer(value), DataType::Integer)
    }

    /// Long literal
    pub fn long(value: i64) -> Self {
        Expr::literal(Value::Long(value), DataType::Long)
    }

    /// Boolean literal
    pub fn boolean(value: bool) -> Self {
        Expr::literal(Value::Boolean(value), DataType::Boolean)
    }

    /// String literal
    pub fn string(value: impl Into<String>) -> Self {
        Expr::literal(Value::String(value.into()), DataType::String)
    }

    /// Typed null literal
    pub fn null(data_type: DataType) -> Self {
        Expr::literal(Value::Null, data_type)
    }

    /// Array literal; the element-null flag is inferred from the data
    pub fn array(elements: Vec<Value>, element_type: DataType) -> Self {
        let contains_null = elements.iter().any(Value::is_null);
        Expr::literal(
            Value::Array(crate::value::ArrayData::from_vec(elements)),
            DataType::array(element_type, contains_null),
        )
    }

    /// Map literal over paired keys and values
    pub fn map(
        keys: Vec<Value>,
        values: Vec<Value>,
        key_type: DataType,
        value_type: DataType,
    ) -> Self {
        let value_contains_null = values.iter().any(Value::is_null);
        Expr::literal(
            Value::Map(crate::value::MapData::new(
                crate::value::ArrayData::from_vec(keys),
                crate::value::ArrayData::from_vec(values),
            )),
            DataType::map(key_type, value_type, value_contains_null),
        )
    }

    /// Reference to a row column
    pub fn bound(ordinal: usize, data_type: DataType, nullable: bool) -> Self {
        Expr::BoundReference(BoundReference {
            ordinal,
            data_type,
            nullable,
        })
    }

    /// Unbound lambda parameter reference
    pub fn unresolved_var(name: impl Into<String>) -> Self {
        Expr::UnresolvedVariable(UnresolvedVariable { name: name.into() })
    }

    /// Binary operation
    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp(BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// Addition
    pub fn add(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOperator::Add, left, right)
    }

    /// Multiplication
    pub fn mul(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOperator::Multiply, left, right)
    }

    /// Remainder
    pub fn modulo(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOperator::Modulo, left, right)
    }

    /// Equality comparison
    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOperator::Eq, left, right)
    }

    /// Greater-than comparison
    pub fn gt(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOperator::Gt, left, right)
    }

    /// String concatenation
    pub fn concat(children: Vec<Expr>) -> Self {
        Expr::Concat(Concat { children })
    }

    /// First non-null operand
    pub fn coalesce(children: Vec<Expr>) -> Self {
        debug_assert!(!children.is_empty());
        Expr::Coalesce(Coalesce { children })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(n) => write!(f, "{}", n.value),
            Expr::BoundReference(n) => write!(f, "input[{}]", n.ordinal),
            Expr::BinaryOp(n) => write!(f, "({} {} {})", n.left, n.op, n.right),
            Expr::Concat(n) => write_call(f, "concat", &n.children),
            Expr::Coalesce(n) => write_call(f, "coalesce", &n.children),
            Expr::UnresolvedVariable(n) => write!(f, "{}", n.name),
            Expr::Variable(v) => write!(f, "{v}"),
            Expr::Lambda(l) => write!(f, "{l}"),
            Expr::ArrayTransform(n) => {
                write!(f, "transform({}, {})", n.argument, n.function)
            }
            Expr::ArrayFilter(n) => write!(f, "filter({}, {})", n.argument, n.function),
            Expr::ArrayExists(n) => write!(f, "exists({}, {})", n.argument, n.function),
            Expr::ArrayAggregate(n) => {
                write!(
                    f,
                    "aggregate({}, {}, {}, {})",
                    n.argument, n.zero, n.merge, n.finish
                )
            }
            Expr::MapFilter(n) => write!(f, "map_filter({}, {})", n.argument, n.function),
            Expr::MapZipWith(n) => {
                write!(f, "map_zip_with({}, {}, {})", n.left, n.right, n.function)
            }
        }
    }
}

fn write_call(f: &mut fmt::Formatter<'_>, name: &str, args: &[Expr]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    write!(f, ")")
}
