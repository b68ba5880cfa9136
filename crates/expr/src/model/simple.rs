//! Simple in-memory tree implementation for `XdmNode` used in tests and benches.
//!
//! Focus:
//! - Ergonomic builder for quick test tree creation
//! - Cheap document order: every tree is numbered once, lazily, with
//!   `(tree id << 32) | preorder index`, so nodes of different trees still
//!   have a stable total order
//! - Thread-safe (Arc + `OnceLock`) for concurrent evaluation tests
//!
//! Build the complete tree before evaluating against it; numbering happens on
//! first use and is not revisited when subtrees are attached later.
//!
//! ```
//! use xslt_expr::model::simple::{attr, doc, elem, text};
//! use xslt_expr::XdmNode;
//!
//! // <root id="r"><child>Hello</child><child world="yes"/></root>
//! let document = doc()
//!     .child(
//!         elem("root")
//!             .attr(attr("id", "r"))
//!             .child(elem("child").child(text("Hello")))
//!             .child(elem("child").attr(attr("world", "yes"))),
//!     )
//!     .build();
//! let root = document.children().next().unwrap();
//! assert_eq!(root.name().unwrap().local, "root");
//! assert_eq!(root.children().count(), 2);
//! assert_eq!(document.string_value(), "Hello");
//! ```
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock, Weak};

use crate::model::{NodeKind, QName, XdmNode};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

struct Inner {
    kind: NodeKind,
    name: Option<QName>,
    value: Option<String>, // text / attribute / comment / PI content
    parent: OnceLock<Weak<Inner>>,
    attributes: OnceLock<Vec<SimpleNode>>,
    children: OnceLock<Vec<SimpleNode>>,
    cached_text: OnceLock<String>, // memoized string value for element/document
    tree_id: OnceLock<u64>,        // only set on tree roots
    order: OnceLock<u64>,
}

/// A simple Arc-backed node implementation.
#[derive(Clone)]
pub struct SimpleNode(Arc<Inner>);

impl PartialEq for SimpleNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for SimpleNode {}

impl std::hash::Hash for SimpleNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for SimpleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleNode")
            .field("kind", &self.0.kind)
            .field("name", &self.0.name.as_ref().map(|n| n.local.as_str()))
            .field("value", &self.0.value)
            .finish()
    }
}

fn local_name(name: &str) -> QName {
    QName {
        prefix: None,
        local: name.to_string(),
        ns_uri: None,
    }
}

impl SimpleNode {
    fn new(kind: NodeKind, name: Option<QName>, value: Option<String>) -> Self {
        SimpleNode(Arc::new(Inner {
            kind,
            name,
            value,
            parent: OnceLock::new(),
            attributes: OnceLock::new(),
            children: OnceLock::new(),
            cached_text: OnceLock::new(),
            tree_id: OnceLock::new(),
            order: OnceLock::new(),
        }))
    }

    pub fn document() -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Document, None)
    }
    pub fn element(name: &str) -> SimpleNodeBuilder {
        SimpleNodeBuilder::new(NodeKind::Element, Some(local_name(name)))
    }
    pub fn attribute(name: &str, value: &str) -> SimpleNode {
        SimpleNode::new(NodeKind::Attribute, Some(local_name(name)), Some(value.to_string()))
    }
    pub fn text(value: &str) -> SimpleNode {
        SimpleNode::new(NodeKind::Text, None, Some(value.to_string()))
    }
    pub fn comment(value: &str) -> SimpleNode {
        SimpleNode::new(NodeKind::Comment, None, Some(value.to_string()))
    }

    fn number_tree(root: &SimpleNode) {
        let tree = *root
            .0
            .tree_id
            .get_or_init(|| NEXT_TREE_ID.fetch_add(1, AtomicOrdering::Relaxed));
        fn walk(node: &SimpleNode, base: u64, next: &mut u64) {
            // Concurrent numbering computes identical keys; losing the race is harmless.
            let _ = node.0.order.set(base | *next);
            *next += 1;
            for a in node.0.attributes.get().into_iter().flatten() {
                walk(a, base, next);
            }
            for c in node.0.children.get().into_iter().flatten() {
                walk(c, base, next);
            }
        }
        let mut next = 0u64;
        walk(root, tree << 32, &mut next);
    }
}

pub struct SimpleNodeBuilder {
    kind: NodeKind,
    name: Option<QName>,
    pending_children: Vec<SimpleNode>,
    pending_attrs: Vec<SimpleNode>,
}

impl SimpleNodeBuilder {
    fn new(kind: NodeKind, name: Option<QName>) -> Self {
        Self {
            kind,
            name,
            pending_children: Vec::new(),
            pending_attrs: Vec::new(),
        }
    }

    #[must_use]
    pub fn child(mut self, child: impl Into<SimpleNodeOrBuilder>) -> Self {
        self.pending_children.push(child.into().into_node());
        self
    }

    #[must_use]
    pub fn children<I: IntoIterator<Item = SimpleNodeOrBuilder>>(mut self, it: I) -> Self {
        self.pending_children.extend(it.into_iter().map(SimpleNodeOrBuilder::into_node));
        self
    }

    #[must_use]
    pub fn attr(mut self, attr: SimpleNode) -> Self {
        debug_assert!(attr.kind() == NodeKind::Attribute);
        self.pending_attrs.push(attr);
        self
    }

    pub fn build(self) -> SimpleNode {
        let node = SimpleNode::new(self.kind, self.name, None);
        for c in self.pending_attrs.iter().chain(&self.pending_children) {
            let _ = c.0.parent.set(Arc::downgrade(&node.0));
        }
        let _ = node.0.attributes.set(self.pending_attrs);
        let _ = node.0.children.set(self.pending_children);
        node
    }
}

pub enum SimpleNodeOrBuilder {
    Built(SimpleNode),
    Builder(SimpleNodeBuilder),
}

impl SimpleNodeOrBuilder {
    fn into_node(self) -> SimpleNode {
        match self {
            SimpleNodeOrBuilder::Built(n) => n,
            SimpleNodeOrBuilder::Builder(b) => b.build(),
        }
    }
}

impl From<SimpleNode> for SimpleNodeOrBuilder {
    fn from(n: SimpleNode) -> Self {
        SimpleNodeOrBuilder::Built(n)
    }
}
impl From<SimpleNodeBuilder> for SimpleNodeOrBuilder {
    fn from(b: SimpleNodeBuilder) -> Self {
        SimpleNodeOrBuilder::Builder(b)
    }
}

// Convenience helper functions for concise test code
pub fn elem(name: &str) -> SimpleNodeBuilder {
    SimpleNode::element(name)
}
pub fn text(v: &str) -> SimpleNode {
    SimpleNode::text(v)
}
pub fn attr(name: &str, v: &str) -> SimpleNode {
    SimpleNode::attribute(name, v)
}
pub fn comment(v: &str) -> SimpleNode {
    SimpleNode::comment(v)
}
pub fn doc() -> SimpleNodeBuilder {
    SimpleNode::document()
}

/// Children or attributes of a [`SimpleNode`], cloned on demand.
#[derive(Clone, Debug)]
pub struct SimpleNodeIter<'a> {
    inner: std::slice::Iter<'a, SimpleNode>,
}

impl<'a> SimpleNodeIter<'a> {
    fn new(nodes: Option<&'a Vec<SimpleNode>>) -> Self {
        Self {
            inner: nodes.map_or(&[][..], Vec::as_slice).iter(),
        }
    }
}

impl Iterator for SimpleNodeIter<'_> {
    type Item = SimpleNode;

    fn next(&mut self) -> Option<SimpleNode> {
        self.inner.next().cloned()
    }

    fn nth(&mut self, n: usize) -> Option<SimpleNode> {
        self.inner.nth(n).cloned()
    }

    fn count(self) -> usize {
        self.inner.len()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for SimpleNodeIter<'_> {}

impl DoubleEndedIterator for SimpleNodeIter<'_> {
    fn next_back(&mut self) -> Option<SimpleNode> {
        self.inner.next_back().cloned()
    }
}

impl XdmNode for SimpleNode {
    type Children<'a>
        = SimpleNodeIter<'a>
    where
        Self: 'a;
    type Attributes<'a>
        = SimpleNodeIter<'a>
    where
        Self: 'a;

    fn kind(&self) -> NodeKind {
        self.0.kind
    }

    fn name(&self) -> Option<QName> {
        self.0.name.clone()
    }

    fn string_value(&self) -> String {
        match self.kind() {
            NodeKind::Text | NodeKind::Attribute | NodeKind::Comment | NodeKind::ProcessingInstruction => {
                self.0.value.clone().unwrap_or_default()
            }
            NodeKind::Element | NodeKind::Document => self
                .0
                .cached_text
                .get_or_init(|| {
                    fn dfs(n: &SimpleNode, out: &mut String) {
                        if n.kind() == NodeKind::Text
                            && let Some(v) = &n.0.value
                        {
                            out.push_str(v);
                        }
                        for c in n.0.children.get().into_iter().flatten() {
                            dfs(c, out);
                        }
                    }
                    let mut out = String::new();
                    dfs(self, &mut out);
                    out
                })
                .clone(),
        }
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent.get().and_then(Weak::upgrade).map(SimpleNode)
    }

    fn children(&self) -> SimpleNodeIter<'_> {
        SimpleNodeIter::new(self.0.children.get())
    }

    fn attributes(&self) -> SimpleNodeIter<'_> {
        SimpleNodeIter::new(self.0.attributes.get())
    }

    fn doc_order_key(&self) -> Option<u64> {
        if let Some(key) = self.0.order.get() {
            return Some(*key);
        }
        SimpleNode::number_tree(&self.root());
        self.0.order.get().copied()
    }
}
