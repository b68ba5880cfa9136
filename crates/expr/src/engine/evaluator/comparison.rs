//! Value and general comparisons.

use chrono::{FixedOffset, NaiveDate, NaiveTime};
use core::cmp::Ordering;

use super::cursors::cast_untyped;
use super::numeric;
use crate::compiler::ir::CompOp;
use crate::engine::iter::SeqIter;
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::types::AtomicType;
use crate::xdm::{XdmAtomicValue, XdmItem};

fn holds(op: CompOp, ord: Option<Ordering>) -> bool {
    match ord {
        // NaN compares unequal to everything, itself included.
        None => op == CompOp::Ne,
        Some(o) => match op {
            CompOp::Eq => o == Ordering::Equal,
            CompOp::Ne => o != Ordering::Equal,
            CompOp::Lt => o == Ordering::Less,
            CompOp::Le => o != Ordering::Greater,
            CompOp::Gt => o == Ordering::Greater,
            CompOp::Ge => o != Ordering::Less,
        },
    }
}

fn incomparable(a: &XdmAtomicValue, b: &XdmAtomicValue) -> Error {
    Error::from_code(
        ErrorCode::XPTY0004,
        format!("cannot compare {} with {}", a.atomic_type().name(), b.atomic_type().name()),
    )
}

/// Start of the day in UTC seconds; dates without timezone are taken as UTC.
fn date_instant(date: NaiveDate, tz: Option<FixedOffset>) -> i64 {
    let offset = tz.map_or(0, |t| i64::from(t.local_minus_utc()));
    date.and_time(NaiveTime::MIN).and_utc().timestamp() - offset
}

/// Value comparison of two atomic values. Untyped values compare as strings.
pub(crate) fn compare_atomic(op: CompOp, a: &XdmAtomicValue, b: &XdmAtomicValue) -> Result<bool, Error> {
    use XdmAtomicValue as V;
    if a.is_numeric() && b.is_numeric() {
        return Ok(holds(op, numeric::compare(a, b)));
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Ok(holds(op, Some(x.cmp(y))));
    }
    let ord = match (a, b) {
        (V::Boolean(x), V::Boolean(y)) => x.cmp(y),
        (V::DateTime(x), V::DateTime(y)) => x.cmp(y),
        (V::Date { date: x, tz: tx }, V::Date { date: y, tz: ty }) => date_instant(*x, *tx).cmp(&date_instant(*y, *ty)),
        _ => return Err(incomparable(a, b)),
    };
    Ok(holds(op, Some(ord)))
}

/// Pair of operands of a general comparison after untyped conversion.
fn general_pair(a: &XdmAtomicValue, b: &XdmAtomicValue) -> Result<(XdmAtomicValue, XdmAtomicValue), Error> {
    use XdmAtomicValue as V;
    match (a, b) {
        (V::UntypedAtomic(s), V::UntypedAtomic(t)) => Ok((V::String(s.clone()), V::String(t.clone()))),
        (V::UntypedAtomic(s), other) => Ok((cast_untyped(s, untyped_target(other))?, other.clone())),
        (other, V::UntypedAtomic(t)) => Ok((other.clone(), cast_untyped(t, untyped_target(other))?)),
        _ => Ok((a.clone(), b.clone())),
    }
}

fn untyped_target(other: &XdmAtomicValue) -> AtomicType {
    if other.is_numeric() {
        AtomicType::Double
    } else if other.as_str().is_some() {
        AtomicType::String
    } else {
        other.atomic_type()
    }
}

fn atomize_all<N: XdmNode>(mut it: SeqIter<'_, N>) -> Result<Vec<XdmAtomicValue>, Error> {
    let mut out = Vec::new();
    while let Some(item) = it.next_item() {
        match item? {
            XdmItem::Atomic(a) => out.push(a),
            XdmItem::Node(n) => out.extend(n.typed_value()),
        }
    }
    Ok(out)
}

/// Existential comparison: true when some pair of atomized items satisfies
/// `op`. The right operand is materialized once; the left one is pulled
/// until a match is found.
pub(crate) fn general_compare<'a, N: XdmNode>(
    op: CompOp,
    mut lhs: SeqIter<'a, N>,
    rhs: SeqIter<'a, N>,
) -> Result<bool, Error> {
    let right = atomize_all(rhs)?;
    if right.is_empty() {
        lhs.close();
        return Ok(false);
    }
    while let Some(item) = lhs.next_item() {
        let values = match item? {
            XdmItem::Atomic(a) => vec![a],
            XdmItem::Node(n) => n.typed_value(),
        };
        for a in &values {
            for b in &right {
                let (x, y) = general_pair(a, b)?;
                if compare_atomic(op, &x, &y)? {
                    lhs.close();
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CompOp::Eq, XdmAtomicValue::Integer(2), XdmAtomicValue::Double(2.0), true)]
    #[case(CompOp::Lt, XdmAtomicValue::String("a".into()), XdmAtomicValue::String("b".into()), true)]
    #[case(CompOp::Ne, XdmAtomicValue::Double(f64::NAN), XdmAtomicValue::Double(f64::NAN), true)]
    #[case(CompOp::Eq, XdmAtomicValue::Double(f64::NAN), XdmAtomicValue::Double(f64::NAN), false)]
    #[case(CompOp::Gt, XdmAtomicValue::Boolean(true), XdmAtomicValue::Boolean(false), true)]
    fn value_comparisons(#[case] op: CompOp, #[case] a: XdmAtomicValue, #[case] b: XdmAtomicValue, #[case] want: bool) {
        assert_eq!(compare_atomic(op, &a, &b).unwrap(), want);
    }

    #[test]
    fn string_and_number_are_incomparable() {
        let err = compare_atomic(CompOp::Eq, &XdmAtomicValue::String("1".into()), &XdmAtomicValue::Integer(1))
            .unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    }

    #[test]
    fn untyped_meets_number_as_double() {
        let (a, b) = general_pair(&XdmAtomicValue::UntypedAtomic("10".into()), &XdmAtomicValue::Integer(10)).unwrap();
        assert!(compare_atomic(CompOp::Eq, &a, &b).unwrap());
    }
}
