//! Static types: item types, cardinalities and the property bitsets the
//! type checker caches on every expression node.

use bitflags::bitflags;
use core::fmt;

mod cardinality;
mod item_type;

pub use cardinality::Cardinality;
pub use item_type::{AtomicType, ItemType, Relation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceType {
    pub item_type: ItemType,
    pub cardinality: Cardinality,
}

impl SequenceType {
    pub const ANY: SequenceType = SequenceType::new(ItemType::AnyItem, Cardinality::ZERO_OR_MORE);
    pub const EMPTY: SequenceType = SequenceType::new(ItemType::Empty, Cardinality::EMPTY);
    pub const SINGLE_BOOLEAN: SequenceType = SequenceType::new(ItemType::BOOLEAN, Cardinality::EXACTLY_ONE);
    pub const SINGLE_INTEGER: SequenceType = SequenceType::new(ItemType::INTEGER, Cardinality::EXACTLY_ONE);

    pub const fn new(item_type: ItemType, cardinality: Cardinality) -> Self {
        Self {
            item_type,
            cardinality,
        }
    }

    pub const fn atomic(t: AtomicType, cardinality: Cardinality) -> Self {
        Self::new(ItemType::Atomic(t), cardinality)
    }

    pub fn subsumes(&self, other: &SequenceType) -> bool {
        self.cardinality.contains(other.cardinality)
            && (other.cardinality == Cardinality::EMPTY || self.item_type.subsumes(other.item_type))
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cardinality == Cardinality::EMPTY {
            return f.write_str("empty-sequence()");
        }
        write!(f, "{}{}", self.item_type, self.cardinality.occurrence_indicator())
    }
}

bitflags! {
    /// Special properties of the value of an expression.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct StaticProperties: u16 {
        /// Nodes in document order without duplicates.
        const ORDERED_NODESET = 1 << 0;
        /// Nodes in reverse document order (reverse axes).
        const REVERSE_DOCUMENT_ORDER = 1 << 1;
        /// No node is an ancestor of another.
        const PEER_NODESET = 1 << 2;
        /// All nodes are within the subtree rooted at the context node.
        const SUBTREE_NODESET = 1 << 3;
        /// All nodes belong to the document containing the context node.
        const CONTEXT_DOCUMENT_NODESET = 1 << 4;
        const SINGLE_DOCUMENT_NODESET = 1 << 5;
        /// Evaluation never constructs new nodes.
        const NON_CREATIVE = 1 << 6;
        const ATTRIBUTE_NS_NODESET = 1 << 7;
    }
}

bitflags! {
    /// Parts of the dynamic context an expression reads.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct Dependencies: u16 {
        const CONTEXT_ITEM = 1 << 0;
        const POSITION = 1 << 1;
        const LAST = 1 << 2;
        const CONTEXT_DOCUMENT = 1 << 3;
        const CURRENT_DATETIME = 1 << 4;
        const LOCAL_VARIABLES = 1 << 5;
        const FOCUS =
            Self::CONTEXT_ITEM.bits() | Self::POSITION.bits() | Self::LAST.bits() | Self::CONTEXT_DOCUMENT.bits();
    }
}

/// Cached static information of one expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticInfo {
    pub item_type: ItemType,
    pub cardinality: Cardinality,
    pub special: StaticProperties,
    pub dependencies: Dependencies,
}

impl StaticInfo {
    pub fn sequence_type(&self) -> SequenceType {
        SequenceType::new(self.item_type, self.cardinality)
    }

    pub fn depends_on_focus(&self) -> bool {
        self.dependencies.intersects(Dependencies::FOCUS)
    }
}
