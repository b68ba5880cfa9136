//! Runtime values of variables.
//!
//! A `let` stores one of these in its stack-frame slot according to the
//! evaluation mode chosen by the optimizer. Closures capture the context they
//! were created in; evaluation errors surface only when the value is read.

use std::cell::RefCell;
use std::rc::Rc;

use crate::compiler::ir::Expr;
use crate::engine::context::EvalContext;
use crate::engine::evaluator;
use crate::engine::iter::{GroundedIter, SeqIter, SequenceIterator, drain, tri};
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::{XdmItem, XdmItemResult};

pub(crate) enum Value<'a, N> {
    Unset,
    Grounded(Rc<[XdmItem<N>]>),
    /// Re-evaluated on every read; used for single references.
    Closure(Rc<Closure<'a, N>>),
    /// Items are kept as they are produced and shared by all readers.
    Memo(Rc<MemoClosure<'a, N>>),
}

impl<N> Clone for Value<'_, N> {
    fn clone(&self) -> Self {
        match self {
            Value::Unset => Value::Unset,
            Value::Grounded(items) => Value::Grounded(items.clone()),
            Value::Closure(c) => Value::Closure(c.clone()),
            Value::Memo(m) => Value::Memo(m.clone()),
        }
    }
}

impl<'a, N: XdmNode> Value<'a, N> {
    pub(crate) fn grounded(items: Vec<XdmItem<N>>) -> Self {
        Value::Grounded(Rc::from(items))
    }

    pub(crate) fn closure(expr: &'a Expr, ctx: EvalContext<'a, N>) -> Self {
        Value::Closure(Rc::new(Closure { expr, ctx }))
    }

    pub(crate) fn memo(expr: &'a Expr, ctx: EvalContext<'a, N>, indexed: bool) -> Self {
        Value::Memo(Rc::new(MemoClosure::new(expr, ctx, indexed)))
    }

    pub(crate) fn iterate(&self) -> Result<SeqIter<'a, N>, Error> {
        match self {
            Value::Unset => Err(Error::from_code(ErrorCode::XPST0008, "variable read before it was bound")),
            Value::Grounded(items) => Ok(Box::new(GroundedIter::new(items.clone()))),
            Value::Closure(c) => evaluator::iterate(c.expr, &c.ctx),
            Value::Memo(m) => {
                if m.indexed {
                    m.materialize()?;
                }
                Ok(Box::new(MemoIter { memo: m.clone(), index: 0, done: false }))
            }
        }
    }

    pub(crate) fn materialize(&self) -> Result<Rc<[XdmItem<N>]>, Error> {
        match self {
            Value::Grounded(items) => Ok(items.clone()),
            Value::Memo(m) => m.materialize(),
            _ => {
                let mut it = self.iterate()?;
                Ok(Rc::from(drain(&mut it)?))
            }
        }
    }
}

pub(crate) struct Closure<'a, N> {
    expr: &'a Expr,
    ctx: EvalContext<'a, N>,
}

enum Source<'a, N> {
    Pending(&'a Expr, EvalContext<'a, N>),
    Reading(SeqIter<'a, N>),
    /// Temporarily taken out while a reader pulls the next item.
    Busy,
    Done,
    Failed(Error),
}

pub(crate) struct MemoClosure<'a, N> {
    buffer: RefCell<Vec<XdmItem<N>>>,
    source: RefCell<Source<'a, N>>,
    indexed: bool,
}

impl<'a, N: XdmNode> MemoClosure<'a, N> {
    fn new(expr: &'a Expr, ctx: EvalContext<'a, N>, indexed: bool) -> Self {
        Self { buffer: RefCell::new(Vec::new()), source: RefCell::new(Source::Pending(expr, ctx)), indexed }
    }

    /// Item at `index`, reading further from the source when needed.
    fn item_at(&self, index: usize) -> Option<XdmItemResult<N>> {
        loop {
            if let Some(item) = self.buffer.borrow().get(index) {
                return Some(Ok(item.clone()));
            }
            let source = std::mem::replace(&mut *self.source.borrow_mut(), Source::Busy);
            let mut reading = match source {
                Source::Pending(expr, ctx) => match evaluator::iterate(expr, &ctx) {
                    Ok(it) => it,
                    Err(e) => {
                        *self.source.borrow_mut() = Source::Failed(e.clone());
                        return Some(Err(e));
                    }
                },
                Source::Reading(it) => it,
                Source::Busy => {
                    return Some(Err(Error::from_code(
                        ErrorCode::XTDE0640,
                        "variable value depends on itself",
                    )));
                }
                Source::Done => {
                    *self.source.borrow_mut() = Source::Done;
                    return None;
                }
                Source::Failed(e) => {
                    *self.source.borrow_mut() = Source::Failed(e.clone());
                    return Some(Err(e));
                }
            };
            match reading.next_item() {
                Some(Ok(item)) => {
                    self.buffer.borrow_mut().push(item);
                    *self.source.borrow_mut() = Source::Reading(reading);
                }
                Some(Err(e)) => {
                    *self.source.borrow_mut() = Source::Failed(e.clone());
                    return Some(Err(e));
                }
                None => {
                    *self.source.borrow_mut() = Source::Done;
                    return None;
                }
            }
        }
    }

    fn materialize(&self) -> Result<Rc<[XdmItem<N>]>, Error> {
        let mut i = self.buffer.borrow().len();
        while let Some(item) = self.item_at(i) {
            item?;
            i += 1;
        }
        Ok(Rc::from(self.buffer.borrow().as_slice()))
    }

    fn is_complete(&self) -> bool {
        matches!(*self.source.borrow(), Source::Done)
    }
}

struct MemoIter<'a, N> {
    memo: Rc<MemoClosure<'a, N>>,
    index: usize,
    done: bool,
}

impl<N> MemoIter<'_, N> {
    fn finish(&mut self) {
        self.done = true;
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for MemoIter<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.done {
            return None;
        }
        match self.memo.item_at(self.index) {
            Some(item) => {
                let item = tri!(item, self);
                self.index += 1;
                Some(Ok(item))
            }
            None => {
                self.finish();
                None
            }
        }
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(MemoIter { memo: self.memo.clone(), index: 0, done: false }))
    }

    fn close(&mut self) {
        self.done = true;
    }

    fn length(&self) -> Option<usize> {
        self.memo.is_complete().then(|| self.memo.buffer.borrow().len())
    }
}
