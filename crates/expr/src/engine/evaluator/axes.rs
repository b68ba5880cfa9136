//! Axis navigation from a single context node.
//!
//! Forward axes yield document order, reverse axes yield reverse document
//! order (nearest node first), which is the order positional predicates on
//! a step see.

use crate::compiler::ir::{Axis, AxisStep};
use crate::engine::iter::{IterProps, SeqIter, SequenceIterator};
use crate::engine::runtime::Error;
use crate::model::{NodeKind, XdmNode};
use crate::xdm::{XdmItem, XdmItemResult};

/// A position among the children of `parent`. Moving forward yields the
/// child at `index` and advances; moving backward yields the child just
/// before `index`.
struct ChildCursor<N> {
    parent: N,
    index: usize,
}

impl<N: XdmNode> ChildCursor<N> {
    fn first(parent: N) -> Self {
        Self { parent, index: 0 }
    }

    /// Positioned after the last child.
    fn last(parent: N) -> Self {
        let index = parent.children().count();
        Self { parent, index }
    }

    /// Positioned at `node` among its siblings, or `None` for attributes and
    /// parentless nodes.
    fn at(node: &N) -> Option<Self> {
        if node.kind() == NodeKind::Attribute {
            return None;
        }
        let parent = node.parent()?;
        let index = parent.children().position(|c| &c == node)?;
        Some(Self { parent, index })
    }

    fn forward(&mut self) -> Option<N> {
        let n = self.parent.children().nth(self.index)?;
        self.index += 1;
        Some(n)
    }

    fn backward(&mut self) -> Option<N> {
        self.index = self.index.checked_sub(1)?;
        self.parent.children().nth(self.index)
    }
}

enum Frame<N> {
    /// Preceding siblings of one ancestor level, nearest first.
    Level(ChildCursor<N>),
    /// A subtree in reverse pre-order: children last to first, then the
    /// parent itself.
    Subtree(ChildCursor<N>),
}

enum State<N> {
    Init,
    /// Self or parent.
    Single(Option<N>),
    /// Parent chain starting at the given node.
    Up(Option<N>),
    Attributes(N, usize),
    Forward(ChildCursor<N>),
    Backward(ChildCursor<N>),
    /// Pre-order walk over a stack of child cursors, innermost last.
    Walk { head: Option<N>, stack: Vec<ChildCursor<N>> },
    ReverseWalk(Vec<Frame<N>>),
    Done,
}

pub(crate) struct AxisIter<'a, N> {
    node: N,
    step: &'a AxisStep,
    state: State<N>,
}

impl<'a, N: XdmNode> AxisIter<'a, N> {
    pub(crate) fn new(node: N, step: &'a AxisStep) -> Self {
        Self { node, step, state: State::Init }
    }

    fn init(&self) -> State<N> {
        let node = &self.node;
        match self.step.axis {
            Axis::SelfAxis => State::Single(Some(node.clone())),
            Axis::Parent => State::Single(node.parent()),
            Axis::Child => State::Forward(ChildCursor::first(node.clone())),
            Axis::Attribute => State::Attributes(node.clone(), 0),
            Axis::Ancestor => State::Up(node.parent()),
            Axis::AncestorOrSelf => State::Up(Some(node.clone())),
            Axis::Descendant => State::Walk { head: None, stack: vec![ChildCursor::first(node.clone())] },
            Axis::DescendantOrSelf => State::Walk { head: Some(node.clone()), stack: Vec::new() },
            Axis::FollowingSibling => match ChildCursor::at(node) {
                Some(mut cursor) => {
                    cursor.index += 1;
                    State::Forward(cursor)
                }
                None => State::Done,
            },
            Axis::PrecedingSibling => ChildCursor::at(node).map_or(State::Done, State::Backward),
            Axis::Following => State::Walk { head: None, stack: following_runs(node) },
            Axis::Preceding => State::ReverseWalk(preceding_levels(node)),
        }
    }

    fn next_candidate(&mut self) -> Option<N> {
        if matches!(self.state, State::Init) {
            self.state = self.init();
        }
        match &mut self.state {
            State::Init | State::Done => None,
            State::Single(n) => n.take(),
            State::Up(next) => {
                let current = next.take()?;
                *next = current.parent();
                Some(current)
            }
            State::Attributes(owner, index) => {
                let n = owner.attributes().nth(*index)?;
                *index += 1;
                Some(n)
            }
            State::Forward(cursor) => cursor.forward(),
            State::Backward(cursor) => cursor.backward(),
            State::Walk { head, stack } => {
                if let Some(n) = head.take() {
                    stack.push(ChildCursor::first(n.clone()));
                    return Some(n);
                }
                loop {
                    let top = stack.last_mut()?;
                    match top.forward() {
                        Some(n) => {
                            stack.push(ChildCursor::first(n.clone()));
                            return Some(n);
                        }
                        None => {
                            stack.pop();
                        }
                    }
                }
            }
            State::ReverseWalk(stack) => loop {
                match stack.last_mut()? {
                    Frame::Level(cursor) => match cursor.backward() {
                        Some(sibling) => stack.push(Frame::Subtree(ChildCursor::last(sibling))),
                        None => {
                            stack.pop();
                        }
                    },
                    Frame::Subtree(cursor) => match cursor.backward() {
                        Some(child) => stack.push(Frame::Subtree(ChildCursor::last(child))),
                        None => {
                            let Some(Frame::Subtree(done)) = stack.pop() else {
                                return None;
                            };
                            return Some(done.parent);
                        }
                    },
                }
            },
        }
    }
}

/// Sibling runs whose pre-order walk enumerates the following axis: the
/// innermost run is on top of the stack.
fn following_runs<N: XdmNode>(node: &N) -> Vec<ChildCursor<N>> {
    let mut runs = Vec::new();
    let mut current = node.clone();
    if node.kind() == NodeKind::Attribute
        && let Some(owner) = node.parent()
    {
        runs.push(ChildCursor::first(owner.clone()));
        current = owner;
    }
    while let Some(mut cursor) = ChildCursor::at(&current) {
        cursor.index += 1;
        let parent = cursor.parent.clone();
        runs.push(cursor);
        current = parent;
    }
    runs.reverse();
    runs
}

/// One backward cursor per ancestor level, the innermost on top, so the
/// preceding axis comes out nearest first.
fn preceding_levels<N: XdmNode>(node: &N) -> Vec<Frame<N>> {
    let mut levels = Vec::new();
    let mut current = node.clone();
    loop {
        if let Some(cursor) = ChildCursor::at(&current) {
            levels.push(Frame::Level(cursor));
        }
        match current.parent() {
            Some(p) => current = p,
            None => break,
        }
    }
    levels.reverse();
    levels
}

impl<'a, N: XdmNode> SequenceIterator<'a, N> for AxisIter<'a, N> {
    fn next_item(&mut self) -> Option<XdmItemResult<N>> {
        while let Some(n) = self.next_candidate() {
            if self.step.test.matches(&n) {
                return Some(Ok(XdmItem::Node(n)));
            }
        }
        self.state = State::Done;
        None
    }

    fn get_another(&self) -> Result<SeqIter<'a, N>, Error> {
        Ok(Box::new(AxisIter::new(self.node.clone(), self.step)))
    }

    fn close(&mut self) {
        self.state = State::Done;
    }

    fn properties(&self) -> IterProps {
        IterProps::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::NodeTest;
    use crate::engine::iter::drain;
    use crate::model::simple::{SimpleNode, attr, doc, elem, text};

    fn tree() -> SimpleNode {
        doc()
            .child(
                elem("r")
                    .attr(attr("id", "1"))
                    .child(elem("a").child(elem("a1")).child(elem("a2")))
                    .child(elem("b").child(text("t")))
                    .child(elem("c")),
            )
            .build()
    }

    fn names(axis: Axis, node: &SimpleNode) -> Vec<String> {
        let step = AxisStep { axis, test: NodeTest::Kind(NodeKind::Element) };
        let mut it: SeqIter<'_, SimpleNode> = Box::new(AxisIter::new(node.clone(), &step));
        drain(&mut it)
            .unwrap()
            .into_iter()
            .filter_map(|i| i.as_node().and_then(XdmNode::name).map(|q| q.local))
            .collect()
    }

    #[test]
    fn descendant_is_preorder() {
        let d = tree();
        assert_eq!(names(Axis::Descendant, &d), ["r", "a", "a1", "a2", "b", "c"]);
    }

    #[test]
    fn reverse_axes_start_nearest() {
        let d = tree();
        let a2 = d.children_vec()[0].children_vec()[0].children_vec()[1].clone();
        assert_eq!(names(Axis::Ancestor, &a2), ["a", "r"]);
        let c = d.children_vec()[0].children_vec()[2].clone();
        assert_eq!(names(Axis::PrecedingSibling, &c), ["b", "a"]);
        assert_eq!(names(Axis::Preceding, &c), ["b", "a2", "a1", "a"]);
    }

    #[test]
    fn following_leaves_the_subtree() {
        let d = tree();
        let a1 = d.children_vec()[0].children_vec()[0].children_vec()[0].clone();
        assert_eq!(names(Axis::Following, &a1), ["a2", "b", "c"]);
    }

    #[test]
    fn following_of_attribute_includes_owner_content() {
        let d = tree();
        let id = d.children_vec()[0].attributes_vec()[0].clone();
        assert_eq!(names(Axis::Following, &id), ["a", "a1", "a2", "b", "c"]);
    }

    /// A tree too large to materialize: every element has a million
    /// children, down to depth eight.
    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Wide(Vec<u32>);

    const WIDTH: u32 = 1_000_000;

    impl XdmNode for Wide {
        type Children<'a>
            = Box<dyn Iterator<Item = Wide> + Send + 'a>
        where
            Self: 'a;
        type Attributes<'a>
            = std::iter::Empty<Wide>
        where
            Self: 'a;

        fn kind(&self) -> NodeKind {
            if self.0.is_empty() { NodeKind::Document } else { NodeKind::Element }
        }

        fn name(&self) -> Option<crate::model::QName> {
            None
        }

        fn string_value(&self) -> String {
            String::new()
        }

        fn parent(&self) -> Option<Self> {
            let (_, rest) = self.0.split_last()?;
            Some(Wide(rest.to_vec()))
        }

        fn children(&self) -> Self::Children<'_> {
            let depth = if self.0.len() < 8 { WIDTH } else { 0 };
            Box::new((0..depth).map(move |i| {
                let mut path = self.0.clone();
                path.push(i);
                Wide(path)
            }))
        }

        fn attributes(&self) -> Self::Attributes<'_> {
            std::iter::empty()
        }
    }

    fn first_paths(axis: Axis, node: Wide, n: usize) -> Vec<Vec<u32>> {
        let step = AxisStep { axis, test: NodeTest::Kind(NodeKind::Element) };
        let mut it = AxisIter::new(node, &step);
        (0..n)
            .map_while(|_| it.next_item())
            .map(|item| match item {
                Ok(XdmItem::Node(Wide(path))) => path,
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn axes_pull_nodes_on_demand() {
        assert_eq!(first_paths(Axis::Descendant, Wide(vec![]), 3), [vec![0], vec![0, 0], vec![0, 0, 0]]);
        assert_eq!(first_paths(Axis::Child, Wide(vec![7]), 2), [vec![7, 0], vec![7, 1]]);
        assert_eq!(first_paths(Axis::FollowingSibling, Wide(vec![0, 5]), 2), [vec![0, 6], vec![0, 7]]);
        assert_eq!(
            first_paths(Axis::Following, Wide(vec![0, 0, 0, 0, 0, 0, 0, 3]), 2),
            [vec![0, 0, 0, 0, 0, 0, 0, 4], vec![0, 0, 0, 0, 0, 0, 0, 5]]
        );
    }
}
