//! Error types for analysis and evaluation
//!
//! Two regimes: [`TypeCheckError`] is produced while an expression tree is
//! being bound and checked, and is non-fatal to the host; [`EvalError`]
//! comes out of `eval` at runtime. Null inputs are never errors, every
//! operator short-circuits them to null results.

use thiserror::Error;

/// Result of an analysis-time check
pub type CheckResult = Result<(), TypeCheckError>;

/// Result of evaluating an expression
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors raised while binding and type-checking an expression tree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeCheckError {
    /// An argument has a type the operator cannot accept
    #[error("argument {index} requires {expected} type, got {actual}")]
    ArgumentTypeMismatch {
        /// Zero-based argument position
        index: usize,
        /// Description of the expected type
        expected: String,
        /// The type that was found
        actual: String,
    },

    /// Aggregate zero and merge result disagree (ignoring nullability)
    #[error("aggregate merge function must return {zero} (the type of the start value), got {merge}")]
    AccumulatorTypeMismatch {
        /// Type of the start value
        zero: String,
        /// Result type of the merge function
        merge: String,
    },

    /// The two maps handed to map_zip_with have incompatible key types
    #[error("map_zip_with requires maps with the same key type, got {left} and {right}")]
    MapKeyTypeMismatch {
        /// Key type of the left map
        left: String,
        /// Key type of the right map
        right: String,
    },

    /// Key type supports neither hashing nor ordering
    #[error("map_zip_with key type {key} is not orderable")]
    MapKeyNotOrderable {
        /// The offending key type
        key: String,
    },

    /// A lambda was written with the wrong number of parameters
    #[error("lambda takes {found} parameters, operator expects {expected}")]
    LambdaArityMismatch {
        /// Parameter count the operator expects
        expected: usize,
        /// Parameter count the lambda was written with
        found: usize,
    },

    /// An operator expected a lambda argument that never got bound
    #[error("lambda function {name} was not bound before checking")]
    UnresolvedLambda {
        /// Display form of the lambda
        name: String,
    },
}

/// Errors raised while evaluating a bound expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Distinct-key count of a zipped map exceeded the container limit
    #[error("cannot build a map with {size} distinct keys, exceeds the maximum of {max}")]
    MapSizeExceeded {
        /// Attempted number of entries
        size: usize,
        /// The enforced maximum
        max: usize,
    },

    /// A lambda variable was evaluated before any binder installed it
    #[error("lambda variable {name} is not bound")]
    UnboundVariable {
        /// Variable name
        name: String,
    },

    /// A value did not match the shape its static type promised
    #[error("{context}: expected {expected} value, got {actual}")]
    UnexpectedValue {
        /// Shape the operator required
        expected: &'static str,
        /// Shape that was found
        actual: &'static str,
        /// Operator or position that noticed the mismatch
        context: &'static str,
    },
}
