//! Static item type, cardinality, special properties and dependencies of
//! each expression kind.
//!
//! Computed cardinalities are exact or wider than what evaluation can
//! produce; cursors that check cardinality at run time rely on that.

use crate::compiler::ir::{ArithOp, Axis, CallTarget, Expr, ExprKind, NodeTest, OperandUsage, SetOp, VarTarget};
use crate::engine::functions::BuiltinFn;
use crate::model::NodeKind;
use crate::types::{AtomicType, Cardinality, Dependencies, ItemType, StaticInfo, StaticProperties as P};

pub(crate) fn compute(expr: &Expr) -> StaticInfo {
    let (item_type, cardinality) = type_and_cardinality(expr);
    StaticInfo { item_type, cardinality, special: special_properties(expr), dependencies: dependencies(expr) }
}

fn type_and_cardinality(expr: &Expr) -> (ItemType, Cardinality) {
    match expr.kind() {
        ExprKind::Literal(values) => {
            let t = values
                .iter()
                .map(|v| ItemType::Atomic(v.atomic_type()))
                .reduce(ItemType::common_supertype)
                .unwrap_or(ItemType::Empty);
            (t, Cardinality::from_count(values.len()))
        }
        ExprKind::ContextItem(t) => (*t, Cardinality::EXACTLY_ONE),
        ExprKind::Root => (ItemType::Node(NodeKind::Document), Cardinality::EXACTLY_ONE),
        ExprKind::Axis(step) => (axis_item_type(step.axis, &step.test), axis_cardinality(step.axis)),
        ExprKind::Slash { start, step } => (step.item_type(), start.cardinality().multiply(step.cardinality())),
        ExprKind::Filter { base, predicate, .. } => (base.item_type(), filter_cardinality(base, predicate)),
        ExprKind::FirstItem(e) | ExprKind::LastItem(e) => (e.item_type(), at_most_one(e.cardinality())),
        ExprKind::VarRef(r) => (r.static_type.item_type, r.static_type.cardinality),
        ExprKind::Let(l) => (l.action.item_type(), l.action.cardinality()),
        ExprKind::For { seq, action, .. } => (action.item_type(), seq.cardinality().multiply(action.cardinality())),
        ExprKind::Quantified { .. }
        | ExprKind::GeneralComparison { .. }
        | ExprKind::Boolean { .. }
        | ExprKind::InstanceOf { .. } => (ItemType::BOOLEAN, Cardinality::EXACTLY_ONE),
        ExprKind::If { then, otherwise, .. } => (
            then.item_type().common_supertype(otherwise.item_type()),
            then.cardinality() | otherwise.cardinality(),
        ),
        ExprKind::Arithmetic { op, lhs, rhs, compat } => {
            let t = ItemType::Atomic(arithmetic_result_type(*op, lhs.item_type(), rhs.item_type(), *compat));
            if *compat {
                (t, Cardinality::EXACTLY_ONE)
            } else {
                (t, binary_operator_cardinality(lhs.cardinality(), rhs.cardinality()))
            }
        }
        ExprKind::ValueComparison { lhs, rhs, .. } => {
            (ItemType::BOOLEAN, binary_operator_cardinality(lhs.cardinality(), rhs.cardinality()))
        }
        ExprKind::Venn { op, lhs, rhs } => venn_type_and_cardinality(*op, lhs, rhs),
        ExprKind::SingletonIntersect { lhs, rhs } => {
            let c = if lhs.cardinality().is_empty_sequence() || rhs.cardinality().is_empty_sequence() {
                Cardinality::EMPTY
            } else {
                Cardinality::ZERO_OR_ONE
            };
            (lhs.item_type(), c)
        }
        ExprKind::Range { .. } => (ItemType::INTEGER, Cardinality::ZERO_OR_MORE),
        ExprKind::Block(items) => {
            let t = items.iter().map(Expr::item_type).fold(ItemType::Empty, ItemType::common_supertype);
            let c = items.iter().map(Expr::cardinality).fold(Cardinality::EMPTY, Cardinality::sum);
            (t, c)
        }
        ExprKind::FunctionCall(call) => match call.target {
            CallTarget::Builtin(f) => f.result_type(&call.args),
            CallTarget::User(_) | CallTarget::Unresolved => (call.result.item_type, call.result.cardinality),
        },
        ExprKind::Atomize(e) => (atomized_type(e.item_type()), e.cardinality()),
        ExprKind::Convert { operand, target } => (converted_type(operand.item_type(), *target), operand.cardinality()),
        ExprKind::CheckCardinality { operand, required, .. } => {
            let narrowed = operand.cardinality() & *required;
            (operand.item_type(), if narrowed.is_empty() { *required } else { narrowed })
        }
        ExprKind::CheckItemType { operand, required, .. } => {
            let supplied = operand.item_type();
            let t = if required.subsumes(supplied) { supplied } else { *required };
            (t, operand.cardinality())
        }
        ExprKind::DocumentSort(e) => (e.item_type(), e.cardinality()),
        ExprKind::Fail(_) => (ItemType::AnyItem, Cardinality::ZERO_OR_MORE),
    }
}

fn at_most_one(c: Cardinality) -> Cardinality {
    if c.is_empty_sequence() {
        Cardinality::EMPTY
    } else if c.allows_zero() {
        Cardinality::ZERO_OR_ONE
    } else {
        Cardinality::EXACTLY_ONE
    }
}

fn binary_operator_cardinality(a: Cardinality, b: Cardinality) -> Cardinality {
    if a.is_empty_sequence() || b.is_empty_sequence() {
        Cardinality::EMPTY
    } else if a.allows_zero() || b.allows_zero() {
        Cardinality::ZERO_OR_ONE
    } else {
        Cardinality::EXACTLY_ONE
    }
}

pub(crate) fn axis_item_type(axis: Axis, test: &NodeTest) -> ItemType {
    match test {
        NodeTest::AnyNode if axis == Axis::Attribute => ItemType::Node(NodeKind::Attribute),
        _ => test.item_type(),
    }
}

fn axis_cardinality(axis: Axis) -> Cardinality {
    match axis {
        Axis::SelfAxis | Axis::Parent => Cardinality::ZERO_OR_ONE,
        _ => Cardinality::ZERO_OR_MORE,
    }
}

fn filter_cardinality(base: &Expr, predicate: &Expr) -> Cardinality {
    let base_card = base.cardinality();
    if base_card.is_empty_sequence() {
        return Cardinality::EMPTY;
    }
    if let Some([v]) = predicate.as_literal()
        && let Some(n) = v.as_f64()
    {
        #[allow(clippy::float_cmp)]
        let first = n == 1.0;
        return if first && !base_card.allows_zero() { Cardinality::EXACTLY_ONE } else { Cardinality::ZERO_OR_ONE };
    }
    let pred = predicate.static_info();
    if !pred.depends_on_focus() && pred.item_type.is_numeric() {
        return Cardinality::ZERO_OR_ONE;
    }
    if matches!(predicate.kind(), ExprKind::FunctionCall(c) if c.target == CallTarget::Builtin(BuiltinFn::Last)) {
        return Cardinality::ZERO_OR_ONE;
    }
    if !base_card.allows_many() {
        return Cardinality::ZERO_OR_ONE;
    }
    Cardinality::ZERO_OR_MORE
}

fn venn_type_and_cardinality(op: SetOp, lhs: &Expr, rhs: &Expr) -> (ItemType, Cardinality) {
    let (c1, c2) = (lhs.cardinality(), rhs.cardinality());
    let (t1, t2) = (lhs.item_type(), rhs.item_type());
    match op {
        SetOp::Union => {
            let c = if lhs.is_empty_literal() {
                c2
            } else if rhs.is_empty_literal() {
                c1
            } else {
                c1 | c2 | Cardinality::ALLOWS_ONE | Cardinality::ALLOWS_MANY
            };
            (t1.common_supertype(t2), c)
        }
        SetOp::Intersect => {
            if c1.is_empty_sequence() || c2.is_empty_sequence() {
                return (ItemType::Empty, Cardinality::EMPTY);
            }
            let t = if t1.subsumes(t2) && !t2.subsumes(t1) { t2 } else { t1 };
            let c = (c1 & c2 & Cardinality::ALLOWS_MANY) | Cardinality::ZERO_OR_ONE;
            (t, c)
        }
        SetOp::Except => {
            if c1.is_empty_sequence() {
                return (ItemType::Empty, Cardinality::EMPTY);
            }
            (t1, c1 | Cardinality::ALLOWS_ZERO)
        }
    }
}

/// Result type of an arithmetic operator for the given operand types.
pub(crate) fn arithmetic_result_type(op: ArithOp, a: ItemType, b: ItemType, compat: bool) -> AtomicType {
    if compat {
        return AtomicType::Double;
    }
    let prim = |t: ItemType| match t {
        ItemType::Atomic(AtomicType::UntypedAtomic) => Some(AtomicType::Double),
        ItemType::Atomic(t) if t.is_numeric() && t != AtomicType::Numeric => Some(t),
        _ => None,
    };
    let (Some(a), Some(b)) = (prim(a), prim(b)) else {
        return if op == ArithOp::IDiv { AtomicType::Integer } else { AtomicType::Numeric };
    };
    if op == ArithOp::IDiv {
        return AtomicType::Integer;
    }
    let widest = if a == AtomicType::Double || b == AtomicType::Double {
        AtomicType::Double
    } else if a == AtomicType::Float || b == AtomicType::Float {
        AtomicType::Float
    } else if a == AtomicType::Decimal || b == AtomicType::Decimal {
        AtomicType::Decimal
    } else {
        AtomicType::Integer
    };
    if op == ArithOp::Div && widest == AtomicType::Integer { AtomicType::Decimal } else { widest }
}

pub(crate) fn atomized_type(t: ItemType) -> ItemType {
    match t {
        ItemType::Empty => ItemType::Empty,
        ItemType::Atomic(_) => t,
        ItemType::Node(NodeKind::Comment | NodeKind::ProcessingInstruction) => ItemType::STRING,
        ItemType::Node(_) => ItemType::Atomic(AtomicType::UntypedAtomic),
        ItemType::AnyNode | ItemType::AnyItem => ItemType::ANY_ATOMIC,
    }
}

/// Item type after untyped casting and numeric promotion towards `target`.
pub(crate) fn converted_type(t: ItemType, target: AtomicType) -> ItemType {
    match t {
        ItemType::Atomic(AtomicType::UntypedAtomic) => {
            ItemType::Atomic(if target == AtomicType::Numeric { AtomicType::Double } else { target })
        }
        ItemType::Atomic(from) if promotes_to(from, target) => ItemType::Atomic(target),
        ItemType::Atomic(AtomicType::AnyUri) if target == AtomicType::String => ItemType::STRING,
        ItemType::Atomic(AtomicType::AnyAtomic) => ItemType::ANY_ATOMIC,
        other => other,
    }
}

/// Numeric promotion: integer and decimal to float or double, float to double.
pub(crate) fn promotes_to(from: AtomicType, to: AtomicType) -> bool {
    match to {
        AtomicType::Double => matches!(from, AtomicType::Integer | AtomicType::Decimal | AtomicType::Float),
        AtomicType::Float => matches!(from, AtomicType::Integer | AtomicType::Decimal),
        _ => false,
    }
}

fn special_properties(expr: &Expr) -> P {
    let node_singleton = P::ORDERED_NODESET | P::PEER_NODESET | P::SINGLE_DOCUMENT_NODESET;
    match expr.kind() {
        ExprKind::Literal(_) | ExprKind::Range { .. } => P::NON_CREATIVE,
        ExprKind::ContextItem(_) => {
            node_singleton | P::SUBTREE_NODESET | P::CONTEXT_DOCUMENT_NODESET | P::NON_CREATIVE
        }
        ExprKind::Root => node_singleton | P::CONTEXT_DOCUMENT_NODESET | P::NON_CREATIVE,
        ExprKind::Axis(step) => {
            let axis = step.axis;
            let mut p = P::CONTEXT_DOCUMENT_NODESET | P::SINGLE_DOCUMENT_NODESET | P::NON_CREATIVE;
            if !axis.is_reverse() || axis == Axis::Parent {
                p |= P::ORDERED_NODESET;
            } else {
                p |= P::REVERSE_DOCUMENT_ORDER;
            }
            if axis.is_peer() {
                p |= P::PEER_NODESET;
            }
            if axis.is_subtree() {
                p |= P::SUBTREE_NODESET;
            }
            if axis == Axis::Attribute {
                p |= P::ATTRIBUTE_NS_NODESET;
            }
            p
        }
        ExprKind::Slash { start, step } => slash_properties(start, step),
        ExprKind::Filter { base, .. } | ExprKind::FirstItem(base) | ExprKind::LastItem(base) => {
            let mut p = base.static_info().special;
            if !matches!(expr.kind(), ExprKind::Filter { .. }) {
                p |= node_singleton;
            }
            p
        }
        ExprKind::VarRef(r) => {
            if r.static_type.cardinality.allows_many() { P::NON_CREATIVE } else { node_singleton | P::NON_CREATIVE }
        }
        ExprKind::Let(l) => l.action.static_info().special,
        ExprKind::If { then, otherwise, .. } => then.static_info().special & otherwise.static_info().special,
        ExprKind::Venn { op, lhs, rhs } => {
            let (a, b) = (lhs.static_info().special, rhs.static_info().special);
            let inherited = match op {
                SetOp::Union => a & b & (P::SUBTREE_NODESET | P::CONTEXT_DOCUMENT_NODESET | P::SINGLE_DOCUMENT_NODESET),
                SetOp::Intersect => (a | b) & (P::SUBTREE_NODESET | P::CONTEXT_DOCUMENT_NODESET | P::PEER_NODESET),
                SetOp::Except => a & (P::SUBTREE_NODESET | P::CONTEXT_DOCUMENT_NODESET | P::PEER_NODESET),
            };
            inherited | P::ORDERED_NODESET | P::NON_CREATIVE
        }
        ExprKind::SingletonIntersect { .. } => node_singleton | P::NON_CREATIVE,
        ExprKind::DocumentSort(e) => (e.static_info().special - P::REVERSE_DOCUMENT_ORDER) | P::ORDERED_NODESET,
        ExprKind::CheckCardinality { operand, .. } | ExprKind::CheckItemType { operand, .. } => {
            operand.static_info().special
        }
        ExprKind::For { seq, action, .. } => {
            seq.static_info().special & action.static_info().special & P::NON_CREATIVE
        }
        ExprKind::Block(items) => {
            if items.iter().all(|e| e.static_info().special.contains(P::NON_CREATIVE)) {
                P::NON_CREATIVE
            } else {
                P::empty()
            }
        }
        ExprKind::Quantified { .. }
        | ExprKind::Arithmetic { .. }
        | ExprKind::ValueComparison { .. }
        | ExprKind::GeneralComparison { .. }
        | ExprKind::Boolean { .. }
        | ExprKind::InstanceOf { .. }
        | ExprKind::Atomize(_)
        | ExprKind::Convert { .. }
        | ExprKind::FunctionCall(_)
        | ExprKind::Fail(_) => P::NON_CREATIVE,
    }
}

fn slash_properties(start: &Expr, step: &Expr) -> P {
    let mut a = start.static_info().special;
    let mut b = step.static_info().special;
    let single = P::ORDERED_NODESET | P::PEER_NODESET | P::SINGLE_DOCUMENT_NODESET;
    if !start.cardinality().allows_many() {
        a |= single;
    }
    if !step.cardinality().allows_many() {
        b |= single;
    }
    let mut p = P::empty();
    p |= a & b & (P::CONTEXT_DOCUMENT_NODESET | P::PEER_NODESET | P::SUBTREE_NODESET | P::NON_CREATIVE);
    if a.contains(P::SINGLE_DOCUMENT_NODESET) && b.contains(P::CONTEXT_DOCUMENT_NODESET) {
        p |= P::SINGLE_DOCUMENT_NODESET;
    }
    if naturally_sorted(start, a, b) {
        p |= P::ORDERED_NODESET;
    }
    if naturally_reverse_sorted(start, step) {
        p |= P::REVERSE_DOCUMENT_ORDER;
    }
    p
}

/// Whether the nested loop of a path already yields document order without
/// duplicates.
fn naturally_sorted(start: &Expr, a: P, b: P) -> bool {
    if !b.contains(P::ORDERED_NODESET) {
        return false;
    }
    if !start.cardinality().allows_many() {
        return true;
    }
    if !a.contains(P::ORDERED_NODESET) {
        return false;
    }
    if b.contains(P::ATTRIBUTE_NS_NODESET) {
        return true;
    }
    a.contains(P::PEER_NODESET) && b.contains(P::SUBTREE_NODESET)
}

fn naturally_reverse_sorted(start: &Expr, step: &Expr) -> bool {
    if !start.cardinality().allows_many()
        && let ExprKind::Axis(s) = step.kind()
    {
        return s.axis.is_reverse();
    }
    !step.cardinality().allows_many() && matches!(start.kind(), ExprKind::Axis(s) if s.axis.is_reverse())
}

/// Whether a path needs a document-order sort of its node results.
pub(crate) fn slash_needs_sort(start: &Expr, step: &Expr) -> bool {
    !slash_properties(start, step).contains(P::ORDERED_NODESET) && !step.item_type().is_atomic()
}

fn dependencies(expr: &Expr) -> Dependencies {
    let own = match expr.kind() {
        ExprKind::ContextItem(_) | ExprKind::Axis(_) => Dependencies::CONTEXT_ITEM,
        ExprKind::Root => Dependencies::CONTEXT_ITEM | Dependencies::CONTEXT_DOCUMENT,
        ExprKind::VarRef(r) if matches!(r.target, Some(VarTarget::Local(_)) | None) => Dependencies::LOCAL_VARIABLES,
        ExprKind::FunctionCall(call) => match call.target {
            CallTarget::Builtin(f) => f.dependencies(),
            _ => Dependencies::empty(),
        },
        _ => Dependencies::empty(),
    };
    expr.operands().into_iter().fold(own, |acc, (child, usage)| {
        let mut d = child.static_info().dependencies;
        if usage.contains(OperandUsage::NEW_FOCUS) {
            d -= Dependencies::FOCUS;
        }
        acc | d
    })
}
