//! Higher-order array and map expressions
//!
//! The lambda-function core of a columnar expression evaluator: six
//! operators (`transform`, `filter`, `exists`, `aggregate` over arrays,
//! `map_filter` and `map_zip_with` over maps) that apply user-written
//! lambda expressions element-wise over structured values.
//!
//! An expression tree starts out unbound, with lambda parameters known
//! only by name. [`resolve_higher_order_functions`] stamps each parameter
//! with the type and nullability its enclosing operator derives from its
//! argument types, after which the tree evaluates row by row:
//!
//! ```
//! use colexpr::{
//!     ArrayFilter, DataType, Expr, LambdaFunction, Row, Value,
//!     resolve_higher_order_functions,
//! };
//!
//! // filter([1, 2, 3], x -> x > 1)
//! let tree = Expr::ArrayFilter(ArrayFilter::new(
//!     Expr::array(
//!         vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)],
//!         DataType::Integer,
//!     ),
//!     LambdaFunction::new(
//!         Expr::gt(Expr::unresolved_var("x"), Expr::int(1)),
//!         ["x"],
//!     ),
//! ));
//!
//! let bound = resolve_higher_order_functions(tree).unwrap();
//! let result = bound.eval(&Row::empty()).unwrap();
//! assert_eq!(result.to_string(), "[2, 3]");
//! ```

pub mod binder;
pub mod error;
pub mod expr;
pub mod types;
pub mod value;

// Re-export main types
pub use binder::{default_binder, resolve_higher_order_functions};
pub use error::{CheckResult, EvalError, EvalResult, TypeCheckError};
pub use expr::{
    ArrayAggregate, ArrayExists, ArrayFilter, ArrayTransform, BinaryOperator, Expr, ExprId,
    HigherOrderFunction, LambdaFunction, LambdaParameter, MapFilter, MapZipWith,
    NamedLambdaVariable,
};
pub use types::DataType;
pub use value::{ArrayData, MAX_ARRAY_LENGTH, MapData, Row, Value};
