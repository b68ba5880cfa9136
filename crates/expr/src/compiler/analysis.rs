//! Tree analyses shared by the type checker and the optimizer: reference
//! counting, locating the references to a binding and propagating a refined
//! variable type to them.

use std::collections::HashMap;

use crate::compiler::binding::{BindingId, Bindings, FILTERED, LOOP_REFERENCE, PLAIN_REFERENCE};
use crate::compiler::ir::{Expr, ExprKind, NodeId, OperandUsage, VarDecl, VarTarget};
use crate::types::SequenceType;

/// Declaration introduced by `expr`, and whether its scope is the body of a
/// loop over the bound values.
pub(crate) fn declaration(expr: &Expr) -> Option<(&VarDecl, bool)> {
    match expr.kind() {
        ExprKind::Let(l) => Some((&l.var, false)),
        ExprKind::For { var, .. } | ExprKind::Quantified { var, .. } => Some((var, true)),
        _ => None,
    }
}

fn local_target(expr: &Expr) -> Option<BindingId> {
    match expr.kind() {
        ExprKind::VarRef(r) => match r.target {
            Some(VarTarget::Local(id)) => Some(id),
            _ => None,
        },
        _ => None,
    }
}

/// Recompute `ref_count` and `indexed` of every binding from scratch.
///
/// A reference evaluated more often than its variable is bound counts as a
/// loop reference; a loop reference that is the base of a filter marks the
/// variable as worth indexing.
pub(crate) fn count_references(expr: &Expr, bindings: &mut Bindings) {
    let ids: Vec<_> = bindings.iter().map(|(id, _)| id).collect();
    for id in ids {
        if let Some(b) = bindings.get_mut(id) {
            b.ref_count = 0;
            b.indexed = false;
        }
    }
    let mut depths = HashMap::new();
    count_into(expr, 0, false, &mut depths, bindings);
}

fn count_into(
    expr: &Expr,
    depth: usize,
    filter_base: bool,
    depths: &mut HashMap<BindingId, usize>,
    bindings: &mut Bindings,
) {
    if let Some((decl, looped)) = declaration(expr)
        && let Some(id) = decl.binding
    {
        depths.insert(id, if looped { depth + 1 } else { depth });
    }
    if let Some(id) = local_target(expr)
        && let Some(b) = bindings.get_mut(id)
    {
        let repeated = depth > depths.get(&id).copied().unwrap_or(0);
        let weight = match (repeated, filter_base) {
            (true, true) => {
                b.indexed = true;
                FILTERED
            }
            (true, false) => LOOP_REFERENCE,
            (false, _) => PLAIN_REFERENCE,
        };
        b.ref_count = b.ref_count.saturating_add(weight);
    }
    for (child, usage) in expr.operands() {
        let d = if usage.contains(OperandUsage::REPEATED) { depth + 1 } else { depth };
        count_into(child, d, usage.contains(OperandUsage::FILTER_BASE), depths, bindings);
    }
}

/// References to one binding within a subtree.
#[derive(Debug, Default)]
pub(crate) struct References {
    pub nodes: Vec<NodeId>,
    /// Sum of reference weights, as in [`count_references`].
    pub weight: u32,
    /// Some reference is evaluated repeatedly relative to the subtree root.
    pub in_loop: bool,
    /// Some reference is evaluated under a focus the subtree root does not set.
    pub under_new_focus: bool,
    pub filtered: bool,
}

impl References {
    pub(crate) fn count(&self) -> usize {
        self.nodes.len()
    }
}

pub(crate) fn references(expr: &Expr, id: BindingId) -> References {
    let mut out = References::default();
    collect(expr, id, OperandUsage::empty(), false, &mut out);
    out
}

fn collect(expr: &Expr, id: BindingId, path: OperandUsage, filter_base: bool, out: &mut References) {
    if local_target(expr) == Some(id) {
        out.nodes.push(expr.id());
        let repeated = path.contains(OperandUsage::REPEATED);
        out.in_loop |= repeated;
        out.under_new_focus |= path.contains(OperandUsage::NEW_FOCUS);
        let weight = match (repeated, filter_base) {
            (true, true) => {
                out.filtered = true;
                FILTERED
            }
            (true, false) => LOOP_REFERENCE,
            (false, _) => PLAIN_REFERENCE,
        };
        out.weight = out.weight.saturating_add(weight);
        return;
    }
    for (child, usage) in expr.operands() {
        let inherited = path | (usage & (OperandUsage::REPEATED | OperandUsage::NEW_FOCUS));
        collect(child, id, inherited, usage.contains(OperandUsage::FILTER_BASE), out);
    }
}

pub(crate) fn mentions(expr: &Expr, id: BindingId) -> bool {
    local_target(expr) == Some(id) || expr.children().any(|c| mentions(c, id))
}

pub(crate) fn mentions_any(expr: &Expr, ids: &[BindingId]) -> bool {
    local_target(expr).is_some_and(|id| ids.contains(&id)) || expr.children().any(|c| mentions_any(c, ids))
}

/// Set the static type of every reference to `id` below `expr`.
pub(crate) fn refine_references(expr: &mut Expr, id: BindingId, t: SequenceType) {
    if !mentions(expr, id) {
        return;
    }
    if let ExprKind::VarRef(r) = expr.kind_mut() {
        r.static_type = t;
        return;
    }
    for child in expr.children_mut() {
        refine_references(child, id, t);
    }
}

/// Local references whose binding is no longer in the arena.
pub(crate) fn dangling_references(expr: &Expr, bindings: &Bindings) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![expr];
    while let Some(e) = stack.pop() {
        if let Some(id) = local_target(e)
            && !bindings.contains(id)
        {
            out.push(e.id());
        }
        stack.extend(e.children());
    }
    out
}
