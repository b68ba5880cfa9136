//! Constant folding.
//!
//! A node whose operands are all literals is evaluated at compile time and
//! replaced by a literal. A dynamic error met while doing so is not raised:
//! the node becomes a [`ExprKind::Fail`] that raises it if and when the
//! expression is actually evaluated.

use tracing::trace;

use crate::compiler::ir::{CallTarget, Expr, ExprKind};
use crate::compiler::package::Package;
use crate::consts::{MAX_FOLDED_RANGE, MAX_SEQUENCE_LENGTH};
use crate::engine::context::EvalContext;
use crate::engine::evaluator;
use crate::engine::iter::drain;
use crate::engine::runtime::{DynamicContext, Error, ErrorCode};
use crate::model::simple::SimpleNode;
use crate::xdm::{XdmAtomicValue, XdmItem};

fn is_foldable(expr: &Expr) -> bool {
    let kind_folds = match expr.kind() {
        ExprKind::Arithmetic { .. }
        | ExprKind::ValueComparison { .. }
        | ExprKind::GeneralComparison { .. }
        | ExprKind::Boolean { .. }
        | ExprKind::InstanceOf { .. }
        | ExprKind::Atomize(_)
        | ExprKind::Convert { .. }
        | ExprKind::CheckCardinality { .. }
        | ExprKind::CheckItemType { .. }
        | ExprKind::FirstItem(_)
        | ExprKind::LastItem(_)
        | ExprKind::Block(_)
        | ExprKind::Filter { .. } => true,
        ExprKind::FunctionCall(call) => matches!(call.target, CallTarget::Builtin(f) if f.foldable()),
        _ => false,
    };
    kind_folds && expr.children().all(Expr::is_literal)
}

enum Constant {
    Values(Vec<XdmAtomicValue>),
    /// The value contains nodes; nothing to fold.
    NotAtomic,
}

fn evaluate_constant(expr: &Expr) -> Result<Constant, Error> {
    let package = Package::empty();
    let dynamic = DynamicContext::<SimpleNode>::default();
    let ctx = EvalContext::new(&package, &dynamic, 0);
    let mut it = evaluator::iterate(expr, &ctx)?;
    let mut values = Vec::new();
    for item in drain(&mut it)? {
        match item {
            XdmItem::Atomic(a) => values.push(a),
            XdmItem::Node(_) => return Ok(Constant::NotAtomic),
        }
    }
    Ok(Constant::Values(values))
}

fn constant_truth(condition: &Expr) -> Result<bool, Error> {
    let package = Package::empty();
    let dynamic = DynamicContext::<SimpleNode>::default();
    let ctx = EvalContext::new(&package, &dynamic, 0);
    evaluator::effective_boolean_value(condition, &ctx)
}

fn single_integer(expr: &Expr) -> Option<Option<i64>> {
    match expr.as_literal()? {
        [] => Some(None),
        [XdmAtomicValue::Integer(i)] => Some(Some(*i)),
        _ => None,
    }
}

fn fold_range(expr: Expr, start: Option<i64>, end: Option<i64>) -> Result<Expr, Error> {
    let (Some(a), Some(b)) = (start, end) else {
        return Ok(expr.with_kind(ExprKind::Literal(Vec::new())));
    };
    if a > b {
        return Ok(expr.with_kind(ExprKind::Literal(Vec::new())));
    }
    let len = i128::from(b) - i128::from(a) + 1;
    if len > i128::from(MAX_SEQUENCE_LENGTH) {
        return Err(Error::static_error(
            ErrorCode::XPDY0130,
            format!("the range {a} to {b} exceeds the maximum sequence length {MAX_SEQUENCE_LENGTH}"),
        )
        .with_location(expr.loc));
    }
    if len > i128::from(MAX_FOLDED_RANGE) {
        return Ok(expr);
    }
    Ok(expr.with_kind(ExprKind::Literal((a..=b).map(XdmAtomicValue::Integer).collect())))
}

fn fold_conditional(expr: Expr) -> Expr {
    let (id, loc, kind) = expr.into_parts();
    let ExprKind::If { condition, then, otherwise } = kind else {
        return Expr::from_parts(id, loc, kind);
    };
    match constant_truth(&condition) {
        Ok(true) => *then,
        Ok(false) => *otherwise,
        Err(e) => Expr::from_parts(id, loc, ExprKind::Fail(e.with_location(loc))),
    }
}

/// Fold `expr` if it is constant. Only an over-long literal range is a
/// static error; every other failure is deferred.
pub(crate) fn fold(expr: Expr) -> Result<Expr, Error> {
    match expr.kind() {
        ExprKind::If { condition, .. } if condition.is_literal() => return Ok(fold_conditional(expr)),
        ExprKind::Range { start, end } => {
            if let (Some(a), Some(b)) = (single_integer(start), single_integer(end)) {
                return fold_range(expr, a, b);
            }
            return Ok(expr);
        }
        _ => {}
    }
    if !is_foldable(&expr) {
        return Ok(expr);
    }
    let kind = match evaluate_constant(&expr) {
        Ok(Constant::Values(values)) => ExprKind::Literal(values),
        Ok(Constant::NotAtomic) => return Ok(expr),
        Err(e) => ExprKind::Fail(e.with_location(expr.loc)),
    };
    trace!(from = %expr, "folded constant expression");
    Ok(expr.with_kind(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::build::{add, div, if_then_else, int, ints, range};

    #[test]
    fn arithmetic_on_literals_folds() {
        let e = fold(add(int(1), int(2))).unwrap();
        assert_eq!(e.as_literal(), Some(&[XdmAtomicValue::Integer(3)][..]));
    }

    #[test]
    fn dynamic_error_is_deferred() {
        let e = fold(div(int(1), int(0))).unwrap();
        let ExprKind::Fail(err) = e.kind() else { panic!("expected deferred error, got {e}") };
        assert_eq!(err.code_enum(), ErrorCode::FOAR0001);
    }

    #[test]
    fn literal_condition_selects_branch() {
        let e = fold(if_then_else(ints([]), int(1), int(2))).unwrap();
        assert_eq!(e.as_literal(), Some(&[XdmAtomicValue::Integer(2)][..]));
    }

    #[test]
    fn ranges_fold_up_to_the_limit() {
        let small = fold(range(int(1), int(3))).unwrap();
        assert_eq!(small.as_literal().map(<[_]>::len), Some(3));
        let large = fold(range(int(1), int(MAX_FOLDED_RANGE + 1))).unwrap();
        assert!(matches!(large.kind(), ExprKind::Range { .. }));
        let err = fold(range(int(1), int(MAX_SEQUENCE_LENGTH + 1))).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPDY0130);
    }
}
