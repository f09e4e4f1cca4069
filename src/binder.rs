//! Analysis driver that binds lambda parameters
//!
//! Binding is two-phase. Each higher-order node computes the parameter
//! schema its lambdas must materialise from its own argument types
//! (`HigherOrderFunction::bind`), and the binder callback turns the lambda
//! as written into a bound one: fresh typed [`NamedLambdaVariable`]s, with
//! the body rewritten so parameter references point at them.
//!
//! [`resolve_higher_order_functions`] applies the default binder over a
//! whole tree to a fixpoint, so operators nested inside lambda bodies bind
//! as soon as their outer parameters carry types, then type-checks every
//! bound operator.

use std::collections::HashMap;

use log::debug;

use crate::error::{CheckResult, TypeCheckError};
use crate::expr::higher_order::{HigherOrderFunction, ParamSchema};
use crate::expr::lambda::{ExprId, LambdaFunction, LambdaParameter, NamedLambdaVariable};
use crate::expr::Expr;

/// Bind a lambda against the parameter schema its operator expects
///
/// Creates one fresh variable per expected parameter, reusing the names
/// the lambda was written with, and rewrites the body so references to
/// those names point at the new variables. Inner lambdas shadow outer
/// parameter names.
pub fn default_binder(
    lambda: &LambdaFunction,
    expected: &[ParamSchema],
) -> Result<LambdaFunction, TypeCheckError> {
    if lambda.arity() != expected.len() {
        return Err(TypeCheckError::LambdaArityMismatch {
            expected: expected.len(),
            found: lambda.arity(),
        });
    }

    let mut by_name: HashMap<String, NamedLambdaVariable> = HashMap::new();
    let mut by_id: HashMap<ExprId, NamedLambdaVariable> = HashMap::new();
    let vars: Vec<NamedLambdaVariable> = lambda
        .params()
        .iter()
        .zip(expected)
        .map(|(param, (data_type, nullable))| {
            let var = NamedLambdaVariable::new(param.name(), data_type.clone(), *nullable);
            match param {
                LambdaParameter::Named(name) => {
                    by_name.insert(name.clone(), var.clone());
                }
                // re-binding: references to the previous instance are
                // redirected by id
                LambdaParameter::Bound(old) => {
                    by_id.insert(old.id(), var.clone());
                }
            }
            var
        })
        .collect();

    let body = replace_params(lambda.body().clone(), &by_name, &by_id);

    Ok(LambdaFunction::bound(body, vars, lambda.hidden()))
}

fn replace_params(
    expr: Expr,
    by_name: &HashMap<String, NamedLambdaVariable>,
    by_id: &HashMap<ExprId, NamedLambdaVariable>,
) -> Expr {
    match expr {
        Expr::UnresolvedVariable(u) => match by_name.get(&u.name) {
            Some(var) => Expr::Variable(var.clone()),
            None => Expr::UnresolvedVariable(u),
        },
        Expr::Variable(v) => match by_id.get(&v.id()) {
            Some(var) => Expr::Variable(var.clone()),
            None => Expr::Variable(v),
        },
        Expr::Lambda(inner) => {
            // parameters of an inner lambda shadow outer names; ids are
            // unique, so the id map passes through untouched
            let visible: HashMap<String, NamedLambdaVariable> = by_name
                .iter()
                .filter(|(name, _)| inner.params().iter().all(|p| p.name() != name.as_str()))
                .map(|(name, var)| (name.clone(), var.clone()))
                .collect();
            if visible.is_empty() && by_id.is_empty() {
                return Expr::Lambda(inner);
            }
            let rebuilt = inner
                .map_body::<std::convert::Infallible>(&mut |b| {
                    Ok(replace_params(b, &visible, by_id))
                });
            match rebuilt {
                Ok(inner) => Expr::Lambda(inner),
                Err(never) => match never {},
            }
        }
        other => other.map_children(&mut |c| replace_params(c, by_name, by_id)),
    }
}

/// Bind and type-check every higher-order function in a tree
///
/// Repeats a binding sweep until the tree stops changing (an operator
/// inside a lambda body only becomes bindable once the enclosing lambda's
/// parameters carry types), then runs `check_argument_types` on every
/// operator that ended up resolved.
pub fn resolve_higher_order_functions(mut expr: Expr) -> Result<Expr, TypeCheckError> {
    loop {
        let before = expr.clone();
        expr = bind_pass(expr)?;
        if expr == before {
            break;
        }
    }
    check_all(&expr)?;
    Ok(expr)
}

fn bind_pass(expr: Expr) -> Result<Expr, TypeCheckError> {
    let expr = bind_if_ready(expr)?;
    expr.try_map_children(&mut bind_pass)
}

fn bind_if_ready(expr: Expr) -> Result<Expr, TypeCheckError> {
    Ok(match expr {
        Expr::ArrayTransform(n)
            if !HigherOrderFunction::resolved(&n) && n.arguments_resolved() =>
        {
            let bound = Expr::ArrayTransform(n.bind(&mut default_binder)?);
            debug!("bound {bound}");
            bound
        }
        Expr::ArrayFilter(n) if !HigherOrderFunction::resolved(&n) && n.arguments_resolved() => {
            let bound = Expr::ArrayFilter(n.bind(&mut default_binder)?);
            debug!("bound {bound}");
            bound
        }
        Expr::ArrayExists(n) if !HigherOrderFunction::resolved(&n) && n.arguments_resolved() => {
            let bound = Expr::ArrayExists(n.bind(&mut default_binder)?);
            debug!("bound {bound}");
            bound
        }
        Expr::ArrayAggregate(n)
            if !HigherOrderFunction::resolved(&n) && n.arguments_resolved() =>
        {
            let bound = Expr::ArrayAggregate(n.bind(&mut default_binder)?);
            debug!("bound {bound}");
            bound
        }
        Expr::MapFilter(n) if !HigherOrderFunction::resolved(&n) && n.arguments_resolved() => {
            let bound = Expr::MapFilter(n.bind(&mut default_binder)?);
            debug!("bound {bound}");
            bound
        }
        Expr::MapZipWith(n) if !HigherOrderFunction::resolved(&n) && n.arguments_resolved() => {
            let bound = Expr::MapZipWith(n.bind(&mut default_binder)?);
            debug!("bound {bound}");
            bound
        }
        other => other,
    })
}

fn check_all(expr: &Expr) -> CheckResult {
    check_if_resolved(expr)?;
    for child in expr.children() {
        check_all(child)?;
    }
    Ok(())
}

fn check_if_resolved(expr: &Expr) -> CheckResult {
    match expr {
        Expr::ArrayTransform(n) if HigherOrderFunction::resolved(n) => n.check_argument_types(),
        Expr::ArrayFilter(n) if HigherOrderFunction::resolved(n) => n.check_argument_types(),
        Expr::ArrayExists(n) if HigherOrderFunction::resolved(n) => n.check_argument_types(),
        Expr::ArrayAggregate(n) if HigherOrderFunction::resolved(n) => n.check_argument_types(),
        Expr::MapFilter(n) if HigherOrderFunction::resolved(n) => n.check_argument_types(),
        Expr::MapZipWith(n) if HigherOrderFunction::resolved(n) => n.check_argument_types(),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ArrayAggregate, ArrayFilter, ArrayTransform};
    use crate::types::DataType;
    use crate::value::{ArrayData, Row, Value};
    use pretty_assertions::assert_eq;

    fn ints(xs: &[i32]) -> Expr {
        Expr::array(xs.iter().map(|&i| Value::Integer(i)).collect(), DataType::Integer)
    }

    fn int_array(xs: &[i32]) -> Value {
        Value::Array(ArrayData::from_vec(
            xs.iter().map(|&i| Value::Integer(i)).collect(),
        ))
    }

    #[test]
    fn test_binder_installs_typed_variables() {
        let lambda = LambdaFunction::new(Expr::unresolved_var("x"), ["x"]);
        let bound = default_binder(&lambda, &[(DataType::Integer, true)]).unwrap();
        assert!(bound.resolved());
        let params = bound.bound_params().unwrap();
        assert_eq!(params[0].name(), "x");
        assert_eq!(params[0].data_type(), &DataType::Integer);
        assert!(params[0].nullable());
        assert_eq!(bound.data_type(), DataType::Integer);
    }

    #[test]
    fn test_binder_rejects_wrong_arity() {
        let lambda = LambdaFunction::new(Expr::unresolved_var("x"), ["x", "y", "z"]);
        assert_eq!(
            default_binder(&lambda, &[(DataType::Integer, false)]),
            Err(TypeCheckError::LambdaArityMismatch {
                expected: 1,
                found: 3,
            })
        );
    }

    #[test]
    fn test_resolve_simple_filter() {
        let body = Expr::gt(Expr::unresolved_var("x"), Expr::int(1));
        let tree = Expr::ArrayFilter(ArrayFilter::new(
            ints(&[1, 2, 3]),
            LambdaFunction::new(body, ["x"]),
        ));
        assert!(!tree.resolved());

        let bound = resolve_higher_order_functions(tree).unwrap();
        assert!(bound.resolved());
        assert_eq!(bound.eval(&Row::empty()).unwrap(), int_array(&[2, 3]));
    }

    #[test]
    fn test_resolve_nested_lambdas() {
        // transform([[12,99],[123,42],[1]], z -> filter(z, zz -> zz > 50))
        let inner = Expr::ArrayFilter(ArrayFilter::new(
            Expr::unresolved_var("z"),
            LambdaFunction::new(
                Expr::gt(Expr::unresolved_var("zz"), Expr::int(50)),
                ["zz"],
            ),
        ));
        let tree = Expr::ArrayTransform(ArrayTransform::new(
            Expr::array(
                vec![int_array(&[12, 99]), int_array(&[123, 42]), int_array(&[1])],
                DataType::array(DataType::Integer, false),
            ),
            LambdaFunction::new(inner, ["z"]),
        ));

        let bound = resolve_higher_order_functions(tree).unwrap();
        assert!(bound.resolved());
        assert_eq!(
            bound.eval(&Row::empty()).unwrap(),
            Value::Array(ArrayData::from_vec(vec![
                int_array(&[99]),
                int_array(&[123]),
                int_array(&[]),
            ]))
        );
    }

    #[test]
    fn test_resolve_respects_shadowing() {
        // transform([[1,2]], x -> transform(x, x -> x + 1)): the inner x is
        // the integer element, not the outer array
        let inner = Expr::ArrayTransform(ArrayTransform::new(
            Expr::unresolved_var("x"),
            LambdaFunction::new(Expr::add(Expr::unresolved_var("x"), Expr::int(1)), ["x"]),
        ));
        let tree = Expr::ArrayTransform(ArrayTransform::new(
            Expr::array(
                vec![int_array(&[1, 2])],
                DataType::array(DataType::Integer, false),
            ),
            LambdaFunction::new(inner, ["x"]),
        ));

        let bound = resolve_higher_order_functions(tree).unwrap();
        assert_eq!(
            bound.eval(&Row::empty()).unwrap(),
            Value::Array(ArrayData::from_vec(vec![int_array(&[2, 3])]))
        );
    }

    #[test]
    fn test_resolve_binds_hof_in_argument_position() {
        // filter(filter([1,2,3], x -> x > 1), y -> y > 2): the outer filter
        // only binds once the inner one has
        let inner = Expr::ArrayFilter(ArrayFilter::new(
            ints(&[1, 2, 3]),
            LambdaFunction::new(Expr::gt(Expr::unresolved_var("x"), Expr::int(1)), ["x"]),
        ));
        let outer = Expr::ArrayFilter(ArrayFilter::new(
            inner,
            LambdaFunction::new(Expr::gt(Expr::unresolved_var("y"), Expr::int(2)), ["y"]),
        ));
        let bound = resolve_higher_order_functions(outer).unwrap();
        assert_eq!(bound.eval(&Row::empty()).unwrap(), int_array(&[3]));
    }

    #[test]
    fn test_resolve_reports_accumulator_mismatch() {
        // zero is bigint but the merge result is the int element
        let merge = LambdaFunction::new(Expr::unresolved_var("x"), ["acc", "x"]);
        let tree = Expr::ArrayAggregate(ArrayAggregate::new(ints(&[1, 2]), Expr::long(0), merge));
        assert_eq!(
            resolve_higher_order_functions(tree),
            Err(TypeCheckError::AccumulatorTypeMismatch {
                zero: "bigint".to_string(),
                merge: "int".to_string(),
            })
        );
    }

    #[test]
    fn test_resolve_rejects_filter_with_two_params() {
        let body = Expr::gt(Expr::unresolved_var("x"), Expr::int(1));
        let tree = Expr::ArrayFilter(ArrayFilter::new(
            ints(&[1, 2]),
            LambdaFunction::new(body, ["x", "i"]),
        ));
        assert_eq!(
            resolve_higher_order_functions(tree),
            Err(TypeCheckError::LambdaArityMismatch {
                expected: 1,
                found: 2,
            })
        );
    }

    #[test]
    fn test_resolve_leaves_plain_expressions_alone() {
        let tree = Expr::add(Expr::int(1), Expr::int(2));
        let resolved = resolve_higher_order_functions(tree.clone()).unwrap();
        assert_eq!(resolved, tree);
    }
}
