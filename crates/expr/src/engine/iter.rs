//! Pull-based sequence iterators.
//!
//! Every evaluation yields a [`SeqIter`]: a boxed cursor that produces items
//! on demand. Cursors are fused: once they report exhaustion or an error they
//! keep reporting exhaustion. `get_another` opens an independent cursor over
//! the same logical sequence, positioned before the first item.

use bitflags::bitflags;
use std::rc::Rc;

use crate::engine::runtime::{Error, ErrorCode};
use crate::xdm::{XdmAtomicValue, XdmItem, XdmItemResult};

bitflags! {
    /// Advisory capabilities of an iterator; `empty()` is always a valid answer.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct IterProps: u8 {
        /// The whole sequence is already in memory.
        const GROUNDED = 1 << 0;
        /// `length()` is cheap.
        const LAST_POSITION_FINDER = 1 << 1;
        /// Whether another item follows can be told without consuming it.
        const LOOKAHEAD = 1 << 2;
    }
}

pub trait SequenceIterator<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>>;

    /// Fresh independent cursor over the same sequence.
    fn get_another(&self) -> Result<SeqIter<'a, N>, Error>;

    /// Release resources early. Idempotent.
    fn close(&mut self) {}

    fn properties(&self) -> IterProps {
        IterProps::empty()
    }

    /// Total number of items, when known without consuming the cursor.
    fn length(&self) -> Option<usize> {
        None
    }
}

pub type SeqIter<'a, N> = Box<dyn SequenceIterator<'a, N> + 'a>;

/// Unwrap a `Result` inside `next_item`. On error the cursor's `finish`
/// method runs and the error is returned as `Some(Err(_))`.
macro_rules! tri {
    ($e:expr, $self:ident) => {
        match $e {
            Ok(v) => v,
            Err(err) => {
                $self.finish();
                return Some(Err(err));
            }
        }
    };
}
pub(crate) use tri;

pub(crate) struct EmptyIter;

impl<'a, N: 'a> SequenceIterator<'a, N> for EmptyIter {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        None
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(EmptyIter))
    }

    fn properties(&self) -> IterProps {
        IterProps::all()
    }

    fn length(&self) -> Option<usize> {
        Some(0)
    }
}

/// Cursor over a materialized sequence.
pub(crate) struct GroundedIter<N> {
    items: Rc<[XdmItem<N>]>,
    index: usize,
}

impl<N> GroundedIter<N> {
    pub(crate) fn new(items: Rc<[XdmItem<N>]>) -> Self {
        Self { items, index: 0 }
    }
}

impl<'a, N: Clone + 'a> SequenceIterator<'a, N> for GroundedIter<N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        let item = self.items.get(self.index)?.clone();
        self.index += 1;
        Some(Ok(item))
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(GroundedIter::new(self.items.clone())))
    }

    fn close(&mut self) {
        self.index = self.items.len();
    }

    fn properties(&self) -> IterProps {
        IterProps::all()
    }

    fn length(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

/// Cursor over the atomic values of a literal in the expression tree.
pub(crate) struct LiteralIter<'a> {
    values: &'a [XdmAtomicValue],
    index: usize,
}

impl<'a> LiteralIter<'a> {
    pub(crate) fn new(values: &'a [XdmAtomicValue]) -> Self {
        Self { values, index: 0 }
    }
}

impl<'a, N: 'a> SequenceIterator<'a, N> for LiteralIter<'a> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        let v = self.values.get(self.index)?;
        self.index += 1;
        Some(Ok(XdmItem::Atomic(v.clone())))
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(LiteralIter::new(self.values)))
    }

    fn close(&mut self) {
        self.index = self.values.len();
    }

    fn properties(&self) -> IterProps {
        IterProps::all()
    }

    fn length(&self) -> Option<usize> {
        Some(self.values.len())
    }
}

/// Ascending integers `start..=end`; empty when `start > end`.
pub(crate) struct RangeIter {
    start: i64,
    end: i64,
    next: i64,
    done: bool,
}

impl RangeIter {
    pub(crate) fn new(start: i64, end: i64) -> Self {
        Self { start, end, next: start, done: start > end }
    }
}

impl<'a, N: 'a> SequenceIterator<'a, N> for RangeIter {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.done {
            return None;
        }
        let v = self.next;
        if v >= self.end {
            self.done = true;
        } else {
            self.next += 1;
        }
        Some(Ok(XdmItem::Atomic(XdmAtomicValue::Integer(v))))
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(RangeIter::new(self.start, self.end)))
    }

    fn close(&mut self) {
        self.done = true;
    }

    fn properties(&self) -> IterProps {
        IterProps::LAST_POSITION_FINDER | IterProps::LOOKAHEAD
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn length(&self) -> Option<usize> {
        if self.start > self.end { Some(0) } else { Some((self.end - self.start + 1) as usize) }
    }
}

/// Single error, reported once.
pub(crate) struct ErrorIter {
    error: Option<Error>,
    original: Error,
}

impl ErrorIter {
    pub(crate) fn new(error: Error) -> Self {
        Self { error: Some(error.clone()), original: error }
    }
}

impl<'a, N: 'a> SequenceIterator<'a, N> for ErrorIter {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        self.error.take().map(Err)
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(ErrorIter::new(self.original.clone())))
    }

    fn close(&mut self) {
        self.error = None;
    }
}

pub(crate) fn single<'a, N: Clone + 'a>(item: XdmItem<N>) -> SeqIter<'a, N> {
    Box::new(GroundedIter::new(Rc::from(vec![item])))
}

pub(crate) fn grounded<'a, N: Clone + 'a>(items: Vec<XdmItem<N>>) -> SeqIter<'a, N> {
    if items.is_empty() { Box::new(EmptyIter) } else { Box::new(GroundedIter::new(Rc::from(items))) }
}

pub(crate) fn optional<'a, N: Clone + 'a>(item: Option<XdmItem<N>>) -> SeqIter<'a, N> {
    match item {
        Some(item) => single(item),
        None => Box::new(EmptyIter),
    }
}

pub(crate) fn drain<'a, N>(iter: &mut SeqIter<'a, N>) -> Result<Vec<XdmItem<N>>, Error> {
    let mut out = Vec::with_capacity(iter.length().unwrap_or(0));
    while let Some(item) = iter.next_item() {
        out.push(item?);
    }
    Ok(out)
}

pub(crate) fn count<'a, N>(iter: &mut SeqIter<'a, N>) -> Result<usize, Error> {
    if let Some(n) = iter.length() {
        return Ok(n);
    }
    let mut n = 0usize;
    while let Some(item) = iter.next_item() {
        item?;
        n += 1;
    }
    Ok(n)
}

/// First item and whether a second one exists.
pub(crate) fn first_two<'a, N>(iter: &mut SeqIter<'a, N>) -> Result<(Option<XdmItem<N>>, bool), Error> {
    let Some(first) = iter.next_item().transpose()? else {
        return Ok((None, false));
    };
    let more = iter.next_item().transpose()?.is_some();
    iter.close();
    Ok((Some(first), more))
}

/// Exactly zero or one item, else `XPTY0004` naming `role`.
pub(crate) fn zero_or_one<'a, N>(iter: &mut SeqIter<'a, N>, role: &str) -> Result<Option<XdmItem<N>>, Error> {
    match first_two(iter)? {
        (item, false) => Ok(item),
        (_, true) => {
            let message = format!("a sequence of more than one item is not allowed as {role}");
            Err(Error::from_code(ErrorCode::XPTY0004, message))
        }
    }
}

/// The result cursor handed to callers of a compiled expression.
///
/// Tracks the current item and its 1-based position. Before the first call
/// to `next` the position is 0; after exhaustion it is -1.
pub struct FocusIterator<'a, N> {
    inner: SeqIter<'a, N>,
    current: Option<XdmItem<N>>,
    position: i64,
    finished: bool,
}

impl<'a, N: Clone + 'a> FocusIterator<'a, N> {
    pub(crate) fn new(inner: SeqIter<'a, N>) -> Self {
        Self { inner, current: None, position: 0, finished: false }
    }

    pub fn current(&self) -> Option<&XdmItem<N>> {
        self.current.as_ref()
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    /// Independent iterator over the same result, positioned at the start.
    pub fn get_another(&self) -> Result<FocusIterator<'a, N>, Error> {
        Ok(FocusIterator::new(self.inner.get_another()?))
    }

    pub fn close(&mut self) {
        if !self.finished {
            self.inner.close();
            self.finish();
        }
    }

    pub fn properties(&self) -> IterProps {
        self.inner.properties()
    }

    fn finish(&mut self) {
        self.finished = true;
        self.current = None;
        self.position = -1;
    }
}

impl<'a, N: Clone + 'a> Iterator for FocusIterator<'a, N> {
    type Item = XdmItemResult<N>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.inner.next_item() {
            Some(Ok(item)) => {
                self.position += 1;
                self.current = Some(item.clone());
                Some(Ok(item))
            }
            Some(Err(e)) => {
                self.inner.close();
                self.finish();
                Some(Err(e))
            }
            None => {
                self.finish();
                None
            }
        }
    }
}

impl<'a, N: Clone + 'a> core::iter::FusedIterator for FocusIterator<'a, N> {}
