//! Filter expressions `base[predicate]`.
//!
//! The predicate is evaluated once per base item with that item as focus.
//! When the type checker proved the predicate can never be numeric the
//! effective boolean value is used directly; otherwise the first result item
//! decides: a number is a positional test, a node selects the item, and a
//! boolean or string is its own truth value. A second item after an atomic
//! first item is an error.

use std::rc::Rc;

use super::{effective_boolean_value, iterate};
use crate::compiler::ir::{Expr, FilterFlags};
use crate::engine::context::{EvalContext, SizeProbe};
use crate::engine::iter::{EmptyIter, SeqIter, SequenceIterator, first_two, optional, tri};
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::types::Dependencies;
use crate::xdm::{XdmAtomicValue, XdmItem, XdmItemResult};

/// Truth value of a predicate result for the item at `position`.
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
pub(crate) fn predicate_truth<N>(first: Option<XdmItem<N>>, more: bool, position: usize) -> Result<bool, Error> {
    let Some(first) = first else {
        return Ok(false);
    };
    let atomic = match first {
        XdmItem::Node(_) => return Ok(true),
        XdmItem::Atomic(a) => a,
    };
    if more {
        return Err(Error::from_code(
            ErrorCode::FORG0006,
            "predicate yields a sequence of more than one item starting with an atomic value",
        ));
    }
    match atomic {
        XdmAtomicValue::Boolean(b) => Ok(b),
        XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::AnyUri(s) => Ok(!s.is_empty()),
        XdmAtomicValue::Integer(i) => Ok(usize::try_from(i).is_ok_and(|i| i == position)),
        v @ (XdmAtomicValue::Decimal(_) | XdmAtomicValue::Double(_) | XdmAtomicValue::Float(_)) => {
            Ok(v.as_f64().is_some_and(|d| d == position as f64))
        }
        other => Err(Error::from_code(
            ErrorCode::FORG0006,
            format!("effective boolean value is not defined for {}", other.atomic_type().name()),
        )),
    }
}

fn matches_at<'a, N: XdmNode>(predicate: &'a Expr, positional: bool, ctx: &EvalContext<'a, N>) -> Result<bool, Error> {
    if positional {
        let mut it = iterate(predicate, ctx)?;
        let (first, more) = first_two(&mut it)?;
        predicate_truth(first, more, ctx.position()?)
    } else {
        effective_boolean_value(predicate, ctx)
    }
}

pub(crate) struct FilterIter<'a, N> {
    origin: &'a Expr,
    base: SeqIter<'a, N>,
    predicate: &'a Expr,
    positional: bool,
    ctx: EvalContext<'a, N>,
    size: Rc<SizeProbe<'a, N>>,
    position: usize,
    done: bool,
}

impl<'a, N: XdmNode> FilterIter<'a, N> {
    pub(crate) fn new(
        origin: &'a Expr,
        base: SeqIter<'a, N>,
        predicate: &'a Expr,
        flags: FilterFlags,
        ctx: &EvalContext<'a, N>,
    ) -> Result<Self, Error> {
        let size = if predicate.static_info().dependencies.contains(Dependencies::LAST) {
            SizeProbe::lazy(base.get_another()?)
        } else {
            SizeProbe::unknown()
        };
        Ok(Self {
            origin,
            base,
            predicate,
            positional: flags.contains(FilterFlags::POSITIONAL),
            ctx: ctx.clone(),
            size,
            position: 0,
            done: false,
        })
    }

    fn finish(&mut self) {
        self.done = true;
        self.base.close();
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for FilterIter<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.done {
            return None;
        }
        while let Some(item) = self.base.next_item() {
            let item = tri!(item, self);
            self.position += 1;
            let inner = self.ctx.minor(item.clone(), self.position, self.size.clone());
            if tri!(matches_at(self.predicate, self.positional, &inner), self) {
                return Some(Ok(item));
            }
        }
        self.finish();
        None
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        iterate(self.origin, &self.ctx)
    }

    fn close(&mut self) {
        if !self.done {
            self.finish();
        }
    }
}

/// Filter whose predicate does not depend on the focus: evaluated once.
#[allow(clippy::float_cmp)]
pub(crate) fn independent<'a, N: XdmNode>(
    mut base: SeqIter<'a, N>,
    predicate: &'a Expr,
    ctx: &EvalContext<'a, N>,
) -> Result<SeqIter<'a, N>, Error> {
    let mut it = iterate(predicate, ctx)?;
    let (first, more) = first_two(&mut it)?;
    let numeric = match &first {
        Some(XdmItem::Atomic(v)) if v.is_numeric() && !more => Some(v.as_f64()),
        _ => None,
    };
    let Some(position) = numeric else {
        if predicate_truth(first, more, 0)? {
            return Ok(base);
        }
        base.close();
        return Ok(Box::new(EmptyIter));
    };
    let Some(p) = position.filter(|p| p.fract() == 0.0 && *p >= 1.0) else {
        base.close();
        return Ok(Box::new(EmptyIter));
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut skip = p as usize - 1;
    while skip > 0 {
        match base.next_item() {
            Some(item) => {
                item?;
            }
            None => return Ok(Box::new(EmptyIter)),
        }
        skip -= 1;
    }
    let item = base.next_item().transpose()?;
    base.close();
    Ok(optional(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::SimpleNode;

    type Item = XdmItem<SimpleNode>;

    #[test]
    fn numbers_are_positions() {
        let two: Option<Item> = Some(XdmItem::Atomic(XdmAtomicValue::Integer(2)));
        assert!(predicate_truth(two.clone(), false, 2).unwrap());
        assert!(!predicate_truth(two, false, 1).unwrap());
        let half: Option<Item> = Some(XdmItem::Atomic(XdmAtomicValue::Double(1.5)));
        assert!(!predicate_truth(half, false, 1).unwrap());
    }

    #[test]
    fn second_item_after_boolean_is_an_error() {
        let first: Option<Item> = Some(XdmItem::Atomic(XdmAtomicValue::Boolean(true)));
        let err = predicate_truth(first, true, 1).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::FORG0006);
    }

    #[test]
    fn empty_predicate_is_false() {
        assert!(!predicate_truth::<SimpleNode>(None, false, 1).unwrap());
    }
}
