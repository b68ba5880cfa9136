//! Numeric conversion and arithmetic on atomic values.

use core::cmp::Ordering;

use crate::compiler::ir::ArithOp;
use crate::engine::runtime::{Error, ErrorCode};
use crate::xdm::XdmAtomicValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum NumKind {
    Integer,
    Decimal,
    Float,
    Double,
}

pub(crate) fn classify(v: &XdmAtomicValue) -> Option<NumKind> {
    match v {
        XdmAtomicValue::Integer(_) => Some(NumKind::Integer),
        XdmAtomicValue::Decimal(_) => Some(NumKind::Decimal),
        XdmAtomicValue::Float(_) => Some(NumKind::Float),
        XdmAtomicValue::Double(_) => Some(NumKind::Double),
        _ => None,
    }
}

/// Lexical `xs:double` parsing: `INF`, `-INF`, `NaN` and decimal or
/// scientific notation. Rejects the spellings Rust accepts but XML Schema
/// does not (`inf`, `infinity`, `nan`).
pub(crate) fn string_to_double(s: &str) -> Option<f64> {
    let t = s.trim();
    match t {
        "INF" | "+INF" => return Some(f64::INFINITY),
        "-INF" => return Some(f64::NEG_INFINITY),
        "NaN" => return Some(f64::NAN),
        _ => {}
    }
    if t.is_empty() || !t.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) {
        return None;
    }
    t.parse::<f64>().ok()
}

/// `fn:number` style conversion of one atomic value.
pub(crate) fn to_double(v: &XdmAtomicValue) -> Result<f64, Error> {
    match v {
        XdmAtomicValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::AnyUri(s) => {
            string_to_double(s)
                .ok_or_else(|| Error::from_code(ErrorCode::FORG0001, format!("cannot convert \"{s}\" to xs:double")))
        }
        other => other
            .as_f64()
            .ok_or_else(|| Error::from_code(ErrorCode::XPTY0004, format!("cannot convert {other} to xs:double"))),
    }
}

fn operand(v: &XdmAtomicValue, op: ArithOp) -> Result<XdmAtomicValue, Error> {
    match v {
        XdmAtomicValue::UntypedAtomic(_) => Ok(XdmAtomicValue::Double(to_double(v)?)),
        _ if v.is_numeric() => Ok(v.clone()),
        _ => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("arithmetic operator '{}' is not defined for {}", op.symbol(), v.atomic_type().name()),
        )),
    }
}

fn overflow() -> Error {
    Error::from_code(ErrorCode::FOAR0002, "integer overflow")
}

fn division_by_zero() -> Error {
    Error::from_code(ErrorCode::FOAR0001, "division by zero")
}

/// Apply an arithmetic operator with numeric type promotion.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub(crate) fn arithmetic(op: ArithOp, a: &XdmAtomicValue, b: &XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    let a = operand(a, op)?;
    let b = operand(b, op)?;
    let kind = match (classify(&a), classify(&b)) {
        (Some(x), Some(y)) => x.max(y),
        _ => return Err(Error::from_code(ErrorCode::XPTY0004, "arithmetic on non-numeric values")),
    };
    if let (NumKind::Integer, XdmAtomicValue::Integer(x), XdmAtomicValue::Integer(y)) = (kind, &a, &b) {
        return integer_arithmetic(op, *x, *y);
    }
    let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
    if kind == NumKind::Decimal && y == 0.0 && matches!(op, ArithOp::Div | ArithOp::Mod | ArithOp::IDiv) {
        return Err(division_by_zero());
    }
    let r = match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Mod => x % y,
        ArithOp::IDiv => {
            if y == 0.0 {
                return Err(division_by_zero());
            }
            let q = (x / y).trunc();
            if !q.is_finite() || q.abs() >= 9.2e18 {
                return Err(overflow());
            }
            return Ok(XdmAtomicValue::Integer(q as i64));
        }
    };
    Ok(match kind {
        NumKind::Integer | NumKind::Decimal => XdmAtomicValue::Decimal(r),
        NumKind::Float => XdmAtomicValue::Float(r as f32),
        NumKind::Double => XdmAtomicValue::Double(r),
    })
}

#[allow(clippy::cast_precision_loss)]
fn integer_arithmetic(op: ArithOp, x: i64, y: i64) -> Result<XdmAtomicValue, Error> {
    let r = match op {
        ArithOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        ArithOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        ArithOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        ArithOp::Div => {
            if y == 0 {
                return Err(division_by_zero());
            }
            return Ok(XdmAtomicValue::Decimal(x as f64 / y as f64));
        }
        ArithOp::IDiv => {
            if y == 0 {
                return Err(division_by_zero());
            }
            x.checked_div(y).ok_or_else(overflow)?
        }
        ArithOp::Mod => {
            if y == 0 {
                return Err(division_by_zero());
            }
            x.checked_rem(y).ok_or_else(overflow)?
        }
    };
    Ok(XdmAtomicValue::Integer(r))
}

/// Compare two numeric values; `None` when either is NaN.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn compare(a: &XdmAtomicValue, b: &XdmAtomicValue) -> Option<Ordering> {
    match (a, b) {
        (XdmAtomicValue::Integer(x), XdmAtomicValue::Integer(y)) => Some(x.cmp(y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_lexical_forms() {
        assert_eq!(string_to_double(" 1.5e2 "), Some(150.0));
        assert_eq!(string_to_double("-INF"), Some(f64::NEG_INFINITY));
        assert!(string_to_double("NaN").is_some_and(f64::is_nan));
        assert_eq!(string_to_double("inf"), None);
        assert_eq!(string_to_double("infinity"), None);
        assert_eq!(string_to_double(""), None);
    }

    #[test]
    fn integer_division_yields_decimal() {
        let r = arithmetic(ArithOp::Div, &XdmAtomicValue::Integer(7), &XdmAtomicValue::Integer(2)).unwrap();
        assert_eq!(r, XdmAtomicValue::Decimal(3.5));
    }

    #[test]
    fn integer_overflow_is_reported() {
        let err =
            arithmetic(ArithOp::Add, &XdmAtomicValue::Integer(i64::MAX), &XdmAtomicValue::Integer(1)).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FOAR0002);
    }

    #[test]
    fn idiv_by_zero() {
        let err = arithmetic(ArithOp::IDiv, &XdmAtomicValue::Double(1.0), &XdmAtomicValue::Integer(0)).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FOAR0001);
    }

    #[test]
    fn untyped_operands_become_doubles() {
        let r = arithmetic(ArithOp::Mul, &XdmAtomicValue::UntypedAtomic("3".into()), &XdmAtomicValue::Integer(2))
            .unwrap();
        assert_eq!(r, XdmAtomicValue::Double(6.0));
    }
}
