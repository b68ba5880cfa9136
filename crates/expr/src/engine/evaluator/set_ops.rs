//! Set operations and document-order utilities.
//!
//! Both operands of a set operator arrive in document order without
//! duplicates (the type checker sorts operands not known to be ordered), so
//! union, intersect and except are single merge sweeps comparing the heads
//! of the two inputs.

use core::cmp::Ordering;

use crate::compiler::ir::SetOp;
use crate::engine::iter::{SeqIter, SequenceIterator, tri};
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::xdm::{XdmItem, XdmItemResult};

/// Document order of two nodes, by order key when both have one.
pub(crate) fn compare_nodes<N: XdmNode>(a: &N, b: &N) -> Result<Ordering, Error> {
    if a == b {
        return Ok(Ordering::Equal);
    }
    match (a.doc_order_key(), b.doc_order_key()) {
        (Some(x), Some(y)) => Ok(x.cmp(&y)),
        _ => a.compare_document_order(b),
    }
}

/// Sort nodes into document order and drop duplicates.
pub(crate) fn sort_nodes<N: XdmNode>(nodes: &mut Vec<N>) -> Result<(), Error> {
    if nodes.iter().all(|n| n.doc_order_key().is_some()) {
        nodes.sort_by_key(|n| n.doc_order_key().unwrap_or(0));
    } else {
        let mut failure = None;
        nodes.sort_by(|a, b| {
            compare_nodes(a, b).unwrap_or_else(|e| {
                failure.get_or_insert(e);
                Ordering::Equal
            })
        });
        if let Some(e) = failure {
            return Err(e);
        }
    }
    nodes.dedup();
    Ok(())
}

fn node_of<N>(item: XdmItem<N>, op: SetOp) -> Result<N, Error> {
    match item {
        XdmItem::Node(n) => Ok(n),
        XdmItem::Atomic(a) => Err(Error::from_code(
            ErrorCode::XPTY0004,
            format!("operand of {} contains the atomic value {a}", op.name()),
        )),
    }
}

pub(crate) struct MergeIter<'a, N> {
    op: SetOp,
    lhs: SeqIter<'a, N>,
    rhs: SeqIter<'a, N>,
    a: Option<N>,
    b: Option<N>,
    primed: bool,
    done: bool,
}

impl<'a, N: XdmNode> MergeIter<'a, N> {
    pub(crate) fn new(op: SetOp, lhs: SeqIter<'a, N>, rhs: SeqIter<'a, N>) -> Self {
        Self { op, lhs, rhs, a: None, b: None, primed: false, done: false }
    }

    fn pull(it: &mut SeqIter<'a, N>, op: SetOp) -> Result<Option<N>, Error> {
        it.next_item().transpose()?.map(|i| node_of(i, op)).transpose()
    }

    fn finish(&mut self) {
        self.done = true;
        self.a = None;
        self.b = None;
        self.lhs.close();
        self.rhs.close();
    }

    fn step(&mut self) -> Result<Option<N>, Error> {
        if !self.primed {
            self.primed = true;
            self.a = Self::pull(&mut self.lhs, self.op)?;
            if self.a.is_none() && self.op != SetOp::Union {
                return Ok(None);
            }
            self.b = Self::pull(&mut self.rhs, self.op)?;
        }
        loop {
            let order = match (&self.a, &self.b) {
                (None, None) => return Ok(None),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => compare_nodes(a, b)?,
            };
            match (self.op, order) {
                (SetOp::Union, Ordering::Less) | (SetOp::Except, Ordering::Less) => {
                    let out = self.a.take();
                    self.a = Self::pull(&mut self.lhs, self.op)?;
                    return Ok(out);
                }
                (SetOp::Union, Ordering::Greater) => {
                    let out = self.b.take();
                    self.b = Self::pull(&mut self.rhs, self.op)?;
                    return Ok(out);
                }
                (SetOp::Union | SetOp::Intersect, Ordering::Equal) => {
                    let out = self.a.take();
                    self.a = Self::pull(&mut self.lhs, self.op)?;
                    self.b = Self::pull(&mut self.rhs, self.op)?;
                    return Ok(out);
                }
                (SetOp::Except, Ordering::Equal) => {
                    self.a = Self::pull(&mut self.lhs, self.op)?;
                    self.b = Self::pull(&mut self.rhs, self.op)?;
                }
                (SetOp::Intersect, Ordering::Less) => {
                    if self.b.is_none() {
                        return Ok(None);
                    }
                    self.a = Self::pull(&mut self.lhs, self.op)?;
                }
                (SetOp::Intersect | SetOp::Except, Ordering::Greater) => {
                    if self.a.is_none() {
                        return Ok(None);
                    }
                    self.b = Self::pull(&mut self.rhs, self.op)?;
                }
            }
        }
    }
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for MergeIter<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        if self.done {
            return None;
        }
        match tri!(self.step(), self) {
            Some(n) => Some(Ok(XdmItem::Node(n))),
            None => {
                self.finish();
                None
            }
        }
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(MergeIter::new(self.op, self.lhs.get_another()?, self.rhs.get_another()?)))
    }

    fn close(&mut self) {
        if !self.done {
            self.finish();
        }
    }
}

/// `$single intersect E`: the singleton if `E` contains it.
pub(crate) fn singleton_member<N: XdmNode>(
    single: Option<XdmItem<N>>,
    mut rhs: SeqIter<'_, N>,
) -> Result<Option<XdmItem<N>>, Error> {
    let Some(item) = single else {
        rhs.close();
        return Ok(None);
    };
    let needle = node_of(item, SetOp::Intersect)?;
    while let Some(candidate) = rhs.next_item() {
        if node_of(candidate?, SetOp::Intersect)? == needle {
            rhs.close();
            return Ok(Some(XdmItem::Node(needle)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::iter::{drain, grounded};
    use crate::model::simple::{SimpleNode, doc, elem};

    /// The document is returned too: parents are weak references.
    fn nodes() -> (SimpleNode, Vec<SimpleNode>) {
        let d = doc().child(elem("r").child(elem("x1")).child(elem("x2")).child(elem("x3"))).build();
        let x = d.children_vec()[0].children_vec();
        (d, x)
    }

    fn seq<'a>(ns: &[&SimpleNode]) -> SeqIter<'a, SimpleNode> {
        grounded(ns.iter().map(|n| XdmItem::Node((*n).clone())).collect())
    }

    #[test]
    fn union_drops_shared_node() {
        let (_doc, x) = nodes();
        let mut it: SeqIter<'_, SimpleNode> =
            Box::new(MergeIter::new(SetOp::Union, seq(&[&x[0], &x[1]]), seq(&[&x[1], &x[2]])));
        let out = drain(&mut it).unwrap();
        assert_eq!(out, x.iter().cloned().map(XdmItem::Node).collect::<Vec<_>>());
    }

    #[test]
    fn intersect_and_except() {
        let (_doc, x) = nodes();
        let mut i: SeqIter<'_, SimpleNode> =
            Box::new(MergeIter::new(SetOp::Intersect, seq(&[&x[0], &x[1]]), seq(&[&x[1], &x[2]])));
        assert_eq!(drain(&mut i).unwrap(), vec![XdmItem::Node(x[1].clone())]);
        let mut e: SeqIter<'_, SimpleNode> =
            Box::new(MergeIter::new(SetOp::Except, seq(&[&x[0], &x[1]]), seq(&[&x[1], &x[2]])));
        assert_eq!(drain(&mut e).unwrap(), vec![XdmItem::Node(x[0].clone())]);
    }

    #[test]
    fn sort_restores_document_order() {
        let (_doc, x) = nodes();
        let mut v = vec![x[2].clone(), x[0].clone(), x[2].clone(), x[1].clone()];
        sort_nodes(&mut v).unwrap();
        assert_eq!(v, x);
    }
}
