use core::fmt;

use crate::model::{NodeKind, XdmNode};
use crate::xdm::XdmItem;

/// Built-in atomic types known to the type checker.
///
/// `Numeric` stands for the union of the four numeric primitives and is used
/// wherever an operator accepts any number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    AnyAtomic,
    Boolean,
    String,
    UntypedAtomic,
    AnyUri,
    Numeric,
    Decimal,
    Integer,
    Double,
    Float,
    DateTime,
    Date,
}

impl AtomicType {
    pub fn parent(self) -> Option<AtomicType> {
        match self {
            AtomicType::AnyAtomic => None,
            AtomicType::Integer => Some(AtomicType::Decimal),
            AtomicType::Decimal | AtomicType::Double | AtomicType::Float => Some(AtomicType::Numeric),
            _ => Some(AtomicType::AnyAtomic),
        }
    }

    pub fn is_subtype_of(self, other: AtomicType) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.parent();
        }
        false
    }

    pub fn is_numeric(self) -> bool {
        self.is_subtype_of(AtomicType::Numeric)
    }

    pub fn is_string_like(self) -> bool {
        matches!(self, AtomicType::String | AtomicType::UntypedAtomic | AtomicType::AnyUri)
    }

    pub fn common_supertype(self, other: AtomicType) -> AtomicType {
        let mut current = Some(self);
        while let Some(t) = current {
            if other.is_subtype_of(t) {
                return t;
            }
            current = t.parent();
        }
        AtomicType::AnyAtomic
    }

    pub fn name(self) -> &'static str {
        match self {
            AtomicType::AnyAtomic => "xs:anyAtomicType",
            AtomicType::Boolean => "xs:boolean",
            AtomicType::String => "xs:string",
            AtomicType::UntypedAtomic => "xs:untypedAtomic",
            AtomicType::AnyUri => "xs:anyURI",
            AtomicType::Numeric => "xs:numeric",
            AtomicType::Decimal => "xs:decimal",
            AtomicType::Integer => "xs:integer",
            AtomicType::Double => "xs:double",
            AtomicType::Float => "xs:float",
            AtomicType::DateTime => "xs:dateTime",
            AtomicType::Date => "xs:date",
        }
    }
}

/// Result of comparing two item types as sets of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Same,
    /// The left type contains the right one.
    Subsumes,
    /// The left type is contained in the right one.
    SubsumedBy,
    Overlaps,
    Disjoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    /// Matches no item at all; the item type of `()` and of `error()`.
    Empty,
    AnyItem,
    AnyNode,
    Node(NodeKind),
    Atomic(AtomicType),
}

impl ItemType {
    pub const BOOLEAN: ItemType = ItemType::Atomic(AtomicType::Boolean);
    pub const STRING: ItemType = ItemType::Atomic(AtomicType::String);
    pub const INTEGER: ItemType = ItemType::Atomic(AtomicType::Integer);
    pub const DOUBLE: ItemType = ItemType::Atomic(AtomicType::Double);
    pub const NUMERIC: ItemType = ItemType::Atomic(AtomicType::Numeric);
    pub const ANY_ATOMIC: ItemType = ItemType::Atomic(AtomicType::AnyAtomic);

    pub fn is_atomic(self) -> bool {
        matches!(self, ItemType::Atomic(_) | ItemType::Empty)
    }

    pub fn is_node(self) -> bool {
        matches!(self, ItemType::AnyNode | ItemType::Node(_) | ItemType::Empty)
    }

    pub fn atomic(self) -> Option<AtomicType> {
        match self {
            ItemType::Atomic(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ItemType::Atomic(t) if t.is_numeric())
    }

    /// True when `self` contains every item of `other`.
    pub fn subsumes(self, other: ItemType) -> bool {
        match (self, other) {
            (_, ItemType::Empty) | (ItemType::AnyItem, _) => true,
            (ItemType::AnyNode, ItemType::AnyNode | ItemType::Node(_)) => true,
            (ItemType::Node(a), ItemType::Node(b)) => a == b,
            (ItemType::Atomic(a), ItemType::Atomic(b)) => b.is_subtype_of(a),
            _ => false,
        }
    }

    pub fn relationship(self, other: ItemType) -> Relation {
        if self == other {
            return Relation::Same;
        }
        if self.subsumes(other) {
            return Relation::Subsumes;
        }
        if other.subsumes(self) {
            return Relation::SubsumedBy;
        }
        match (self, other) {
            (ItemType::Atomic(a), ItemType::Atomic(b)) => {
                // Numeric overlaps with each of its members; siblings are disjoint.
                if a == AtomicType::Numeric && b.is_numeric() || b == AtomicType::Numeric && a.is_numeric() {
                    Relation::Overlaps
                } else {
                    Relation::Disjoint
                }
            }
            _ => Relation::Disjoint,
        }
    }

    pub fn common_supertype(self, other: ItemType) -> ItemType {
        if self.subsumes(other) {
            return self;
        }
        if other.subsumes(self) {
            return other;
        }
        match (self, other) {
            (ItemType::Node(_) | ItemType::AnyNode, ItemType::Node(_) | ItemType::AnyNode) => ItemType::AnyNode,
            (ItemType::Atomic(a), ItemType::Atomic(b)) => ItemType::Atomic(a.common_supertype(b)),
            _ => ItemType::AnyItem,
        }
    }

    pub fn matches<N: XdmNode>(self, item: &XdmItem<N>) -> bool {
        match (self, item) {
            (ItemType::Empty, _) => false,
            (ItemType::AnyItem, _) | (ItemType::AnyNode, XdmItem::Node(_)) => true,
            (ItemType::Node(kind), XdmItem::Node(n)) => n.kind() == kind,
            (ItemType::Atomic(t), XdmItem::Atomic(a)) => a.atomic_type().is_subtype_of(t),
            _ => false,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::Empty => f.write_str("empty-sequence()"),
            ItemType::AnyItem => f.write_str("item()"),
            ItemType::AnyNode => f.write_str("node()"),
            ItemType::Node(kind) => f.write_str(kind.test_name()),
            ItemType::Atomic(t) => f.write_str(t.name()),
        }
    }
}
