//! Capability the evaluator needs from a document model.
//!
//! The engine never looks inside nodes: it navigates through this trait,
//! compares nodes by identity (`Eq`) and by document order, and atomizes them
//! through [`XdmNode::typed_value`].

use core::cmp::Ordering;

use crate::engine::runtime::{Error, ErrorCode};
use crate::xdm::{ExpandedName, XdmAtomicValue};

pub mod simple;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

impl NodeKind {
    pub fn test_name(self) -> &'static str {
        match self {
            NodeKind::Document => "document-node()",
            NodeKind::Element => "element()",
            NodeKind::Attribute => "attribute()",
            NodeKind::Text => "text()",
            NodeKind::Comment => "comment()",
            NodeKind::ProcessingInstruction => "processing-instruction()",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn matches(&self, name: &ExpandedName) -> bool {
        self.local == *name.local && self.ns_uri.as_deref() == name.ns()
    }
}

/// Compare two nodes by ancestry and stable sibling order (fallback algorithm).
///
/// - If one node is an ancestor of the other, the ancestor precedes the descendant.
/// - Among siblings, attributes come first, then child nodes; within each group
///   the order provided by the adapter is preserved.
/// - Nodes of different trees cannot be ordered by this fallback and yield
///   `err:FOER0000`; adapters with several trees must override
///   [`XdmNode::compare_document_order`] or provide [`XdmNode::doc_order_key`].
pub fn try_compare_by_ancestry<N: XdmNode>(a: &N, b: &N) -> Result<Ordering, Error> {
    if a == b {
        return Ok(Ordering::Equal);
    }
    fn path_to_root<N: XdmNode>(mut n: N) -> Vec<N> {
        let mut p = vec![n.clone()];
        while let Some(parent) = n.parent() {
            p.push(parent.clone());
            n = parent;
        }
        p.reverse();
        p
    }
    let pa = path_to_root(a.clone());
    let pb = path_to_root(b.clone());
    let len = core::cmp::min(pa.len(), pb.len());
    let mut i = 0usize;
    while i < len && pa[i] == pb[i] {
        i += 1;
    }
    if i == len {
        // shorter path is the ancestor
        return Ok(pa.len().cmp(&pb.len()));
    }
    if i == 0 {
        return Err(Error::from_code(
            ErrorCode::FOER0000,
            "document order requires adapter: nodes from different roots",
        ));
    }
    let parent = &pa[i - 1];
    let position = |target: &N| parent.attributes().chain(parent.children()).position(|n| &n == target);
    Ok(match (position(&pa[i]), position(&pb[i])) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => Ordering::Equal,
    })
}

/// Navigation is lazy: axes pull children and attributes one at a time and
/// address siblings by index through `Iterator::nth`, so adapters should
/// make `nth` and `count` on their iterators cheap.
pub trait XdmNode: Clone + Eq + core::fmt::Debug + Send + Sync + 'static {
    type Children<'a>: Iterator<Item = Self> + Send + 'a
    where
        Self: 'a;
    type Attributes<'a>: Iterator<Item = Self> + Send + 'a
    where
        Self: 'a;

    fn kind(&self) -> NodeKind;
    fn name(&self) -> Option<QName>;
    fn string_value(&self) -> String;

    fn parent(&self) -> Option<Self>;
    fn children(&self) -> Self::Children<'_>;
    fn attributes(&self) -> Self::Attributes<'_>;

    /// Typed value used by atomization. Untyped trees return exactly one
    /// value per node: `xs:string` for comments and processing instructions,
    /// `xs:untypedAtomic` for everything else.
    fn typed_value(&self) -> Vec<XdmAtomicValue> {
        match self.kind() {
            NodeKind::Comment | NodeKind::ProcessingInstruction => {
                vec![XdmAtomicValue::String(self.string_value())]
            }
            _ => vec![XdmAtomicValue::UntypedAtomic(self.string_value())],
        }
    }

    /// Optional total-order key. When both nodes provide one, the engine
    /// compares keys instead of walking ancestry.
    fn doc_order_key(&self) -> Option<u64> {
        None
    }

    fn compare_document_order(&self, other: &Self) -> Result<Ordering, Error> {
        try_compare_by_ancestry(self, other)
    }

    fn children_vec(&self) -> Vec<Self> {
        self.children().collect()
    }

    fn attributes_vec(&self) -> Vec<Self> {
        self.attributes().collect()
    }

    fn root(&self) -> Self {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }
}
