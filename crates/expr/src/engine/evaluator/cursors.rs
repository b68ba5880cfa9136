//! Cursor types for lazy evaluation of composite expressions.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use std::rc::Rc;

use super::axes::AxisIter;
use super::set_ops::sort_nodes;
use super::{iterate, numeric};
use crate::compiler::ir::{Expr, ExprKind, VarDecl};
use crate::compiler::properties::promotes_to;
use crate::engine::context::{EvalContext, SizeProbe};
use crate::engine::iter::{SeqIter, SequenceIterator, drain, grounded, tri};
use crate::engine::runtime::{Error, ErrorCode};
use crate::engine::value::Value;
use crate::model::XdmNode;
use crate::types::{AtomicType, Cardinality, Dependencies, ItemType};
use crate::xdm::{XdmAtomicValue, XdmItem, XdmItemResult};

/// `start/step`: evaluates `step` once per item of `start` with that item
/// as focus and concatenates the results.
pub(crate) struct SlashIter<'a, N> {
    origin: &'a Expr,
    start: SeqIter<'a, N>,
    step: &'a Expr,
    ctx: EvalContext<'a, N>,
    size: Rc<SizeProbe<'a, N>>,
    position: usize,
    current: Option<SeqIter<'a, N>>,
    seen_node: bool,
    seen_atomic: bool,
    done: bool,
}

impl<'a, N: XdmNode> SlashIter<'a, N> {
    pub(crate) fn new(
        origin: &'a Expr,
        start: SeqIter<'a, N>,
        step: &'a Expr,
        ctx: &EvalContext<'a, N>,
    ) -> Result<Self, Error> {
        let size = if step.static_info().dependencies.contains(Dependencies::LAST) {
            SizeProbe::lazy(start.get_another()?)
        } else {
            SizeProbe::unknown()
        };
        Ok(Self {
            origin,
            start,
            step,
            ctx: ctx.clone(),
            size,
            position: 0,
            current: None,
            seen_node: false,
            seen_atomic: false,
            done: false,
        })
    }

    fn finish(&mut self) {
        self.done = true;
        if let Some(mut c) = self.current.take() {
            c.close();
        }
        self.start.close();
    }

    fn open_step(&mut self, item: XdmItem<N>) -> Result<SeqIter<'a, N>, Error> {
        let XdmItem::Node(node) = item else {
            return Err(Error::from_code(ErrorCode::XPTY0019, "the left operand of '/' yields an atomic value"));
        };
        if let ExprKind::Axis(step) = self.step.kind() {
            return Ok(Box::new(AxisIter::new(node, step)));
        }
        let inner = self.ctx.minor(XdmItem::Node(node), self.position, self.size.clone());
        iterate(self.step, &inner)
    }

    fn check_mix(&mut self, item: &XdmItem<N>) -> Result<(), Error> {
        if item.is_node() {
            self.seen_node = true;
        } else {
            self.seen_atomic = true;
        }
        if self.seen_node && self.seen_atomic {
            return Err(Error::from_code(
                ErrorCode::XPTY0018,
                "the last step of a path yields both nodes and atomic values",
            ));
        }
        Ok(())
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for SlashIter<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.done {
            return None;
        }
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next_item() {
                    Some(item) => {
                        let item = tri!(item, self);
                        tri!(self.check_mix(&item), self);
                        return Some(Ok(item));
                    }
                    None => self.current = None,
                }
            }
            let Some(item) = self.start.next_item() else {
                self.finish();
                return None;
            };
            let item = tri!(item, self);
            self.position += 1;
            let cursor = tri!(self.open_step(item), self);
            self.current = Some(cursor);
        }
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

pub(crate) fn decl_slot(var: &VarDecl) -> Result<usize, Error> {
    var.slot.ok_or_else(|| {
        Error::from_code(ErrorCode::XPST0008, format!("variable ${} has no stack frame slot", var.name))
    })
}

/// `for $v in seq return action`.
pub(crate) struct ForIter<'a, N> {
    origin: &'a Expr,
    seq: SeqIter<'a, N>,
    slot: usize,
    action: &'a Expr,
    ctx: EvalContext<'a, N>,
    current: Option<SeqIter<'a, N>>,
    done: bool,
}

impl<'a, N: XdmNode> ForIter<'a, N> {
    pub(crate) fn new(
        origin: &'a Expr,
        seq: SeqIter<'a, N>,
        var: &'a VarDecl,
        action: &'a Expr,
        ctx: &EvalContext<'a, N>,
    ) -> Result<Self, Error> {
        Ok(Self { origin, seq, slot: decl_slot(var)?, action, ctx: ctx.clone(), current: None, done: false })
    }

    fn finish(&mut self) {
        self.done = true;
        if let Some(mut c) = self.current.take() {
            c.close();
        }
        self.seq.close();
    }

    fn open(&mut self, item: XdmItem<N>) -> Result<SeqIter<'a, N>, Error> {
        let mut inner = self.ctx.clone();
        inner.set_local(self.slot, Value::grounded(vec![item]))?;
        iterate(self.action, &inner)
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for ForIter<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.done {
            return None;
        }
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next_item() {
                    Some(item) => return Some(Ok(tri!(item, self))),
                    None => self.current = None,
                }
            }
            let Some(item) = self.seq.next_item() else {
                self.finish();
                return None;
            };
            let item = tri!(item, self);
            let cursor = tri!(self.open(item), self);
            self.current = Some(cursor);
        }
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

/// Concatenation of the members of a sequence constructor.
pub(crate) struct BlockIter<'a, N> {
    members: &'a [Expr],
    index: usize,
    ctx: EvalContext<'a, N>,
    current: Option<SeqIter<'a, N>>,
    done: bool,
}

impl<'a, N: XdmNode> BlockIter<'a, N> {
    pub(crate) fn new(members: &'a [Expr], ctx: &EvalContext<'a, N>) -> Self {
        Self { members, index: 0, ctx: ctx.clone(), current: None, done: false }
    }

    fn finish(&mut self) {
        self.done = true;
        if let Some(mut c) = self.current.take() {
            c.close();
        }
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for BlockIter<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.done {
            return None;
        }
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next_item() {
                    Some(item) => return Some(Ok(tri!(item, self))),
                    None => self.current = None,
                }
            }
            let Some(member) = self.members.get(self.index) else {
                self.finish();
                return None;
            };
            self.index += 1;
            let cursor = tri!(iterate(member, &self.ctx), self);
            self.current = Some(cursor);
        }
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(BlockIter::new(self.members, &self.ctx)))
    }

    fn close(&mut self) {
        if !self.done {
            self.finish();
        }
    }
}

/// Replaces every node by its typed value.
pub(crate) struct AtomizeIter<'a, N> {
    input: SeqIter<'a, N>,
    pending: std::vec::IntoIter<XdmAtomicValue>,
    done: bool,
}

impl<'a, N: XdmNode> AtomizeIter<'a, N> {
    pub(crate) fn new(input: SeqIter<'a, N>) -> Self {
        Self { input, pending: Vec::new().into_iter(), done: false }
    }

    fn finish(&mut self) {
        self.done = true;
        self.input.close();
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for AtomizeIter<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.done {
            return None;
        }
        loop {
            if let Some(v) = self.pending.next() {
                return Some(Ok(XdmItem::Atomic(v)));
            }
            match self.input.next_item() {
                None => {
                    self.finish();
                    return None;
                }
                Some(item) => match tri!(item, self) {
                    XdmItem::Atomic(a) => return Some(Ok(XdmItem::Atomic(a))),
                    XdmItem::Node(n) => self.pending = n.typed_value().into_iter(),
                },
            }
        }
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(AtomizeIter::new(self.input.get_another()?)))
    }

    fn close(&mut self) {
        if !self.done {
            self.finish();
        }
    }
}

fn invalid_cast(s: &str, target: AtomicType) -> Error {
    Error::from_code(ErrorCode::FORG0001, format!("cannot cast \"{s}\" to {}", target.name()))
}

fn parse_date(s: &str) -> Option<(NaiveDate, Option<FixedOffset>)> {
    let (day, zone) = if let Some(d) = s.strip_suffix('Z') {
        (d, FixedOffset::east_opt(0))
    } else if s.len() > 10 && s.is_char_boundary(10) {
        let (d, z) = s.split_at(10);
        let offset = DateTime::parse_from_str(&format!("2000-01-01T00:00:00{z}"), "%Y-%m-%dT%H:%M:%S%:z").ok();
        (d, offset.map(|t| *t.offset()))
    } else {
        (s, None)
    };
    if s.len() > 10 && zone.is_none() {
        return None;
    }
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok().map(|d| (d, zone))
}

/// Cast the lexical form of an untyped value to `target`.
pub(crate) fn cast_untyped(s: &str, target: AtomicType) -> Result<XdmAtomicValue, Error> {
    let t = s.trim();
    Ok(match target {
        AtomicType::AnyAtomic | AtomicType::UntypedAtomic => XdmAtomicValue::UntypedAtomic(s.to_string()),
        AtomicType::String => XdmAtomicValue::String(s.to_string()),
        AtomicType::AnyUri => XdmAtomicValue::AnyUri(t.to_string()),
        AtomicType::Numeric | AtomicType::Double => {
            XdmAtomicValue::Double(numeric::string_to_double(t).ok_or_else(|| invalid_cast(s, target))?)
        }
        #[allow(clippy::cast_possible_truncation)]
        AtomicType::Float => {
            XdmAtomicValue::Float(numeric::string_to_double(t).ok_or_else(|| invalid_cast(s, target))? as f32)
        }
        AtomicType::Decimal => {
            let ok = !t.is_empty() && t.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-'));
            XdmAtomicValue::Decimal(t.parse::<f64>().ok().filter(|_| ok).ok_or_else(|| invalid_cast(s, target))?)
        }
        AtomicType::Integer => XdmAtomicValue::Integer(t.parse::<i64>().map_err(|_| invalid_cast(s, target))?),
        AtomicType::Boolean => match t {
            "true" | "1" => XdmAtomicValue::Boolean(true),
            "false" | "0" => XdmAtomicValue::Boolean(false),
            _ => return Err(invalid_cast(s, target)),
        },
        AtomicType::DateTime => match DateTime::parse_from_rfc3339(t) {
            Ok(dt) => XdmAtomicValue::DateTime(dt),
            Err(_) => {
                let naive =
                    NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f").map_err(|_| invalid_cast(s, target))?;
                XdmAtomicValue::DateTime(naive.and_utc().fixed_offset())
            }
        },
        AtomicType::Date => {
            let (date, tz) = parse_date(t).ok_or_else(|| invalid_cast(s, target))?;
            XdmAtomicValue::Date { date, tz }
        }
    })
}

/// Function-conversion of one atomic value towards `target`: untyped values
/// are cast, numerics promoted, `anyURI` promoted to string. Anything else is
/// returned unchanged for a later item type check to judge.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub(crate) fn convert_atomic(v: XdmAtomicValue, target: AtomicType) -> Result<XdmAtomicValue, Error> {
    match v {
        XdmAtomicValue::UntypedAtomic(s) => cast_untyped(&s, target),
        XdmAtomicValue::AnyUri(s) if target == AtomicType::String => Ok(XdmAtomicValue::String(s)),
        v if promotes_to(v.atomic_type(), target) => {
            let d = v.as_f64().unwrap_or(f64::NAN);
            Ok(if target == AtomicType::Float { XdmAtomicValue::Float(d as f32) } else { XdmAtomicValue::Double(d) })
        }
        v => Ok(v),
    }
}

pub(crate) struct ConvertIter<'a, N> {
    input: SeqIter<'a, N>,
    target: AtomicType,
    done: bool,
}

impl<'a, N: XdmNode> ConvertIter<'a, N> {
    pub(crate) fn new(input: SeqIter<'a, N>, target: AtomicType) -> Self {
        Self { input, target, done: false }
    }

    fn finish(&mut self) {
        self.done = true;
        self.input.close();
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for ConvertIter<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.done {
            return None;
        }
        let Some(item) = self.input.next_item() else {
            self.done = true;
            return None;
        };
        match tri!(item, self) {
            XdmItem::Atomic(a) => Some(Ok(XdmItem::Atomic(tri!(convert_atomic(a, self.target), self)))),
            node => Some(Ok(node)),
        }
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(ConvertIter::new(self.input.get_another()?, self.target)))
    }

    fn close(&mut self) {
        if !self.done {
            self.finish();
        }
    }

    fn length(&self) -> Option<usize> {
        self.input.length()
    }
}

/// Passes items through while checking the item count against `required`.
/// Too many items fail as soon as the excess item is read; too few at the end.
pub(crate) struct CardinalityCheckIter<'a, N> {
    input: SeqIter<'a, N>,
    required: Cardinality,
    role: &'a str,
    count: usize,
    done: bool,
}

impl<'a, N: XdmNode> CardinalityCheckIter<'a, N> {
    pub(crate) fn new(input: SeqIter<'a, N>, required: Cardinality, role: &'a str) -> Self {
        Self { input, required, role, count: 0, done: false }
    }

    fn finish(&mut self) {
        self.done = true;
        self.input.close();
    }

    fn violation(&self, what: &str) -> Error {
        Error::from_code(
            ErrorCode::XPTY0004,
            format!("{what} is not allowed as {} (required cardinality: {})", self.role, self.required.describe()),
        )
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for CardinalityCheckIter<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.done {
            return None;
        }
        match self.input.next_item() {
            Some(item) => {
                let item = tri!(item, self);
                self.count += 1;
                if self.count == 1 && !self.required.allows_one() && !self.required.allows_many() {
                    let e = self.violation("a non-empty sequence");
                    self.finish();
                    return Some(Err(e));
                }
                if self.count == 2 && !self.required.allows_many() {
                    let e = self.violation("a sequence of more than one item");
                    self.finish();
                    return Some(Err(e));
                }
                Some(Ok(item))
            }
            None => {
                self.done = true;
                if self.count == 0 && !self.required.allows_zero() {
                    return Some(Err(self.violation("an empty sequence")));
                }
                None
            }
        }
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(CardinalityCheckIter::new(self.input.get_another()?, self.required, self.role)))
    }

    fn close(&mut self) {
        if !self.done {
            self.finish();
        }
    }
}

/// Fails on the first item that is not an instance of `required`.
pub(crate) struct ItemCheckIter<'a, N> {
    input: SeqIter<'a, N>,
    required: ItemType,
    role: &'a str,
    done: bool,
}

impl<'a, N: XdmNode> ItemCheckIter<'a, N> {
    pub(crate) fn new(input: SeqIter<'a, N>, required: ItemType, role: &'a str) -> Self {
        Self { input, required, role, done: false }
    }

    fn finish(&mut self) {
        self.done = true;
        self.input.close();
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for ItemCheckIter<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.done {
            return None;
        }
        let Some(item) = self.input.next_item() else {
            self.done = true;
            return None;
        };
        let item = tri!(item, self);
        if !self.required.matches(&item) {
            let supplied = match &item {
                XdmItem::Node(n) => ItemType::Node(n.kind()).to_string(),
                XdmItem::Atomic(a) => a.atomic_type().name().to_string(),
            };
            self.finish();
            return Some(Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!(
                    "required item type of {} is {}; supplied value has item type {supplied}",
                    self.role, self.required
                ),
            )));
        }
        Some(Ok(item))
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(ItemCheckIter::new(self.input.get_another()?, self.required, self.role)))
    }

    fn close(&mut self) {
        if !self.done {
            self.finish();
        }
    }

    fn length(&self) -> Option<usize> {
        self.input.length()
    }
}

/// Materialize, sort nodes into document order and remove duplicates.
/// A sequence containing atomic values is returned unchanged.
pub(crate) fn document_sort<'a, N: XdmNode>(mut input: SeqIter<'a, N>) -> Result<SeqIter<'a, N>, Error> {
    let items = drain(&mut input)?;
    if items.iter().any(|i| !i.is_node()) {
        return Ok(grounded(items));
    }
    let mut nodes: Vec<N> = items
        .into_iter()
        .filter_map(|i| match i {
            XdmItem::Node(n) => Some(n),
            XdmItem::Atomic(_) => None,
        })
        .collect();
    sort_nodes(&mut nodes)?;
    Ok(grounded(nodes.into_iter().map(XdmItem::Node).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::simple::SimpleNode;
    use rstest::rstest;

    #[rstest]
    #[case("12", AtomicType::Integer, XdmAtomicValue::Integer(12))]
    #[case(" 1 ", AtomicType::Boolean, XdmAtomicValue::Boolean(true))]
    #[case("2.5", AtomicType::Numeric, XdmAtomicValue::Double(2.5))]
    #[case("x", AtomicType::String, XdmAtomicValue::String("x".into()))]
    fn untyped_casts(#[case] s: &str, #[case] target: AtomicType, #[case] want: XdmAtomicValue) {
        assert_eq!(cast_untyped(s, target).unwrap(), want);
    }

    #[test]
    fn bad_lexical_form_is_forg0001() {
        assert_eq!(cast_untyped("abc", AtomicType::Integer).unwrap_err().code_enum(), ErrorCode::FORG0001);
    }

    #[test]
    fn dates_keep_their_timezone() {
        let XdmAtomicValue::Date { tz, .. } = cast_untyped("2024-02-29+02:00", AtomicType::Date).unwrap() else {
            panic!("expected a date");
        };
        assert_eq!(tz.map(|t| t.local_minus_utc()), Some(7200));
    }

    #[test]
    fn integers_promote_to_double() {
        let v = convert_atomic(XdmAtomicValue::Integer(3), AtomicType::Double).unwrap();
        assert_eq!(v, XdmAtomicValue::Double(3.0));
    }

    #[test]
    fn cardinality_violation_on_second_item() {
        let items: Vec<XdmItem<SimpleNode>> =
            vec![XdmItem::Atomic(XdmAtomicValue::Integer(1)), XdmItem::Atomic(XdmAtomicValue::Integer(2))];
        let mut it = CardinalityCheckIter::new(grounded(items), Cardinality::ZERO_OR_ONE, "the operand");
        assert!(it.next_item().unwrap().is_ok());
        assert_eq!(it.next_item().unwrap().unwrap_err().code_enum(), ErrorCode::XPTY0004);
        assert!(it.next_item().is_none());
    }
}
