//! Coercion of a supplied expression to a required sequence type.
//!
//! Atomization, untyped casting, numeric promotion and run-time checks are
//! inserted only where the static type of the supplied expression does not
//! already guarantee them. A supplied type that can never match is a static
//! error.

use crate::compiler::ir::{Expr, ExprKind};
use crate::compiler::properties::promotes_to;
use crate::engine::runtime::{Error, ErrorCode};
use crate::types::{AtomicType, Cardinality, ItemType, Relation, SequenceType};
use tracing::trace;

/// Whether values of type `t` may change under conversion towards `target`.
fn needs_conversion(t: ItemType, target: AtomicType) -> bool {
    if target == AtomicType::AnyAtomic {
        return false;
    }
    match t {
        ItemType::Atomic(AtomicType::UntypedAtomic | AtomicType::AnyAtomic) => target != AtomicType::UntypedAtomic,
        ItemType::Atomic(AtomicType::Numeric) => matches!(target, AtomicType::Double | AtomicType::Float),
        ItemType::Atomic(AtomicType::AnyUri) => target == AtomicType::String,
        ItemType::Atomic(from) => promotes_to(from, target),
        _ => false,
    }
}

fn wrap(expr: Expr, kind: impl FnOnce(Box<Expr>) -> ExprKind) -> Expr {
    let loc = expr.loc;
    let wrapped = Expr::new(kind(Box::new(expr))).at(loc);
    trace!(node = %wrapped, "inserted coercion");
    wrapped
}

pub(crate) fn coerce(expr: Expr, required: SequenceType, role: &str) -> Result<Expr, Error> {
    if required == SequenceType::ANY {
        return Ok(expr);
    }
    let mut expr = expr;
    let loc = expr.loc;

    if let ItemType::Atomic(target) = required.item_type {
        if !matches!(expr.item_type(), ItemType::Atomic(_) | ItemType::Empty) {
            expr = wrap(expr, ExprKind::Atomize);
        }
        if needs_conversion(expr.item_type(), target) {
            expr = wrap(expr, |operand| ExprKind::Convert { operand, target });
        }
    }

    let supplied = expr.item_type();
    match required.item_type.relationship(supplied) {
        Relation::Same | Relation::Subsumes => {}
        _ if supplied == ItemType::Empty => {}
        Relation::Disjoint if !expr.cardinality().allows_zero() => {
            return Err(Error::static_error(
                ErrorCode::XPTY0004,
                format!(
                    "required item type of {role} is {}; supplied value has item type {supplied}",
                    required.item_type
                ),
            )
            .with_location(loc));
        }
        _ => {
            expr = wrap(expr, |operand| ExprKind::CheckItemType {
                operand,
                required: required.item_type,
                role: role.to_string(),
            });
        }
    }

    let supplied = expr.cardinality();
    if !required.cardinality.contains(supplied) {
        if (required.cardinality & supplied).is_empty() {
            let what = if supplied == Cardinality::EMPTY {
                "an empty sequence".to_string()
            } else {
                format!("a sequence of cardinality {}", supplied.describe())
            };
            return Err(Error::static_error(
                ErrorCode::XPTY0004,
                format!("{what} is not allowed as {role} (required: {})", required.cardinality.describe()),
            )
            .with_location(loc));
        }
        expr = wrap(expr, |operand| ExprKind::CheckCardinality {
            operand,
            required: required.cardinality,
            role: role.to_string(),
        });
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::build::{empty, int, string, untyped};

    #[test]
    fn matching_type_is_left_alone() {
        let e = coerce(int(1), SequenceType::SINGLE_INTEGER, "x").unwrap();
        assert!(e.is_literal());
    }

    #[test]
    fn untyped_gets_converted() {
        let required = SequenceType::atomic(AtomicType::Double, Cardinality::EXACTLY_ONE);
        let e = coerce(untyped("1"), required, "x").unwrap();
        assert!(matches!(e.kind(), ExprKind::Convert { target: AtomicType::Double, .. }));
        assert_eq!(e.item_type(), ItemType::DOUBLE);
    }

    #[test]
    fn impossible_types_fail_statically() {
        let err = coerce(string("a"), SequenceType::SINGLE_INTEGER, "the operand").unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
        assert!(err.is_static());
        let err = coerce(empty(), SequenceType::SINGLE_BOOLEAN, "the operand").unwrap_err();
        assert!(err.message.contains("empty sequence"));
    }
}
