//! Hooks for a streaming back end.
//!
//! [`posture`] classifies how an expression moves through a document when
//! the context node is streamed, and [`to_pattern`] turns a downward path
//! into a [`Pattern`] that can be tested against nodes as they go past.
//! Neither affects the result of ordinary evaluation.

use core::fmt;

use crate::compiler::ir::{Axis, AxisStep, CallTarget, Expr, ExprKind, NodeTest};
use crate::engine::functions::BuiltinFn;
use crate::model::{NodeKind, XdmNode};

/// Movement of an expression relative to a streamed context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Posture {
    /// The value does not contain streamed nodes.
    Grounded,
    /// Nodes in document order, none nested in another (children).
    Striding,
    /// Nodes in document order, possibly nested (descendants).
    Crawling,
    /// Nodes reached without moving forward (ancestors, attributes).
    Climbing,
    /// Not streamable.
    Roaming,
}

impl Posture {
    fn consumes(self) -> bool {
        matches!(self, Posture::Striding | Posture::Crawling)
    }

    fn axis(axis: Axis) -> Posture {
        match axis {
            Axis::Child | Axis::SelfAxis => Posture::Striding,
            Axis::Descendant | Axis::DescendantOrSelf => Posture::Crawling,
            Axis::Attribute | Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf => Posture::Climbing,
            Axis::FollowingSibling | Axis::PrecedingSibling | Axis::Following | Axis::Preceding => Posture::Roaming,
        }
    }

    /// Posture of `step` applied to every item of a `self`-postured start.
    fn then(self, step: Posture) -> Posture {
        use Posture::{Climbing, Crawling, Grounded, Roaming, Striding};
        match (self, step) {
            (Roaming, _) | (_, Roaming) => Roaming,
            (Grounded, _) | (_, Grounded) => Grounded,
            (Striding, s) => s,
            (Crawling, Striding | Crawling) => Crawling,
            (Climbing, Climbing) => Climbing,
            (Crawling | Climbing, _) => Roaming,
        }
    }

    /// Posture of two alternatives or two parts of one result.
    fn merge(self, other: Posture) -> Posture {
        match (self, other) {
            (a, b) if a == b => a,
            (Posture::Grounded, x) | (x, Posture::Grounded) => x,
            _ => Posture::Roaming,
        }
    }
}

/// Operands that each need the stream; more than one consumer is roaming.
fn atomizing(operands: impl IntoIterator<Item = Posture>) -> Posture {
    let mut consumers = 0;
    for p in operands {
        if p == Posture::Roaming {
            return Posture::Roaming;
        }
        consumers += usize::from(p.consumes());
    }
    if consumers > 1 { Posture::Roaming } else { Posture::Grounded }
}

fn is_motionless(p: Posture) -> bool {
    matches!(p, Posture::Grounded | Posture::Climbing)
}

/// Streamability class of `expr` with the context node streamed.
pub fn posture(expr: &Expr) -> Posture {
    match expr.kind() {
        ExprKind::Literal(_) | ExprKind::VarRef(_) | ExprKind::Fail(_) => Posture::Grounded,
        ExprKind::ContextItem(_) => Posture::Striding,
        ExprKind::Root => Posture::Climbing,
        ExprKind::Axis(step) => Posture::axis(step.axis),
        ExprKind::Slash { start, step } => posture(start).then(posture(step)),
        ExprKind::Filter { base, predicate, .. } => {
            if is_motionless(posture(predicate)) { posture(base) } else { Posture::Roaming }
        }
        ExprKind::FirstItem(e)
        | ExprKind::LastItem(e)
        | ExprKind::DocumentSort(e)
        | ExprKind::CheckCardinality { operand: e, .. }
        | ExprKind::CheckItemType { operand: e, .. } => posture(e),
        ExprKind::Atomize(e) | ExprKind::Convert { operand: e, .. } | ExprKind::InstanceOf { operand: e, .. } => {
            atomizing([posture(e)])
        }
        ExprKind::Let(l) => bound(posture(&l.init), posture(&l.action)),
        ExprKind::For { seq, action, .. } => bound(posture(seq), posture(action)),
        ExprKind::Quantified { seq, satisfies, .. } => atomizing([bound(posture(seq), posture(satisfies))]),
        ExprKind::If { condition, then, otherwise } => {
            if is_motionless(posture(condition)) {
                posture(then).merge(posture(otherwise))
            } else {
                Posture::Roaming
            }
        }
        ExprKind::Venn { lhs, rhs, .. } | ExprKind::SingletonIntersect { lhs, rhs } => posture(lhs).merge(posture(rhs)),
        ExprKind::Block(items) => items.iter().map(posture).fold(Posture::Grounded, Posture::merge),
        ExprKind::Arithmetic { .. }
        | ExprKind::ValueComparison { .. }
        | ExprKind::GeneralComparison { .. }
        | ExprKind::Boolean { .. }
        | ExprKind::Range { .. } => atomizing(expr.children().map(posture)),
        ExprKind::FunctionCall(call) => {
            let builtin = match call.target {
                CallTarget::Builtin(b) => Some(b),
                CallTarget::Unresolved => BuiltinFn::lookup(&call.name.local, call.args.len()),
                CallTarget::User(_) => None,
            };
            match builtin {
                Some(BuiltinFn::Root) => Posture::Climbing,
                Some(_) => atomizing(call.args.iter().map(posture)),
                None if call.args.iter().all(|a| posture(a) == Posture::Grounded) => Posture::Grounded,
                None => Posture::Roaming,
            }
        }
    }
}

/// A variable bound to streamed nodes cannot be read more than once.
fn bound(init: Posture, action: Posture) -> Posture {
    if init.consumes() || init == Posture::Roaming { Posture::Roaming } else { action }
}

pub fn is_streamable(expr: &Expr) -> bool {
    posture(expr) != Posture::Roaming
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternAxis {
    Child,
    Descendant,
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternStep {
    pub axis: PatternAxis,
    pub test: NodeTest,
}

/// Match pattern equivalent to a downward path: a node matches when the
/// path, evaluated from some node (from the document node if the pattern is
/// absolute), would select it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    pub absolute: bool,
    pub steps: Vec<PatternStep>,
}

impl Pattern {
    pub fn matches<N: XdmNode>(&self, node: &N) -> bool {
        match self.steps.len() {
            0 => self.absolute && node.kind() == NodeKind::Document,
            n => self.matches_from(node, n - 1),
        }
    }

    fn step_matches<N: XdmNode>(step: &PatternStep, node: &N) -> bool {
        let is_attribute = node.kind() == NodeKind::Attribute;
        (step.axis == PatternAxis::Attribute) == is_attribute
            && node.kind() != NodeKind::Document
            && step.test.matches(node)
    }

    fn matches_from<N: XdmNode>(&self, node: &N, index: usize) -> bool {
        let step = &self.steps[index];
        if !Self::step_matches(step, node) {
            return false;
        }
        let Some(parent) = node.parent() else {
            return false;
        };
        if index == 0 {
            return !self.absolute
                || match step.axis {
                    PatternAxis::Child | PatternAxis::Attribute => parent.kind() == NodeKind::Document,
                    PatternAxis::Descendant => top(parent).kind() == NodeKind::Document,
                };
        }
        match step.axis {
            PatternAxis::Child | PatternAxis::Attribute => self.matches_from(&parent, index - 1),
            PatternAxis::Descendant => {
                let mut ancestor = Some(parent);
                while let Some(a) = ancestor {
                    if self.matches_from(&a, index - 1) {
                        return true;
                    }
                    ancestor = a.parent();
                }
                false
            }
        }
    }
}

fn top<N: XdmNode>(node: N) -> N {
    let mut current = node;
    while let Some(p) = current.parent() {
        current = p;
    }
    current
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str("/");
        }
        for (i, step) in self.steps.iter().enumerate() {
            let sep = match (i, step.axis, self.absolute) {
                (0, PatternAxis::Descendant, true) | (1.., PatternAxis::Descendant, _) => "//",
                (0, _, true) | (1.., _, _) => "/",
                (0, _, false) => "",
            };
            f.write_str(sep)?;
            if step.axis == PatternAxis::Attribute {
                f.write_str("@")?;
            }
            write!(f, "{}", step.test)?;
        }
        Ok(())
    }
}

fn collect_steps<'e>(expr: &'e Expr, steps: &mut Vec<&'e AxisStep>, absolute: &mut bool) -> bool {
    match expr.kind() {
        ExprKind::DocumentSort(e) => collect_steps(e, steps, absolute),
        ExprKind::Slash { start, step } => {
            collect_steps(start, steps, absolute) && collect_steps(step, steps, absolute)
        }
        ExprKind::Root if steps.is_empty() && !*absolute => {
            *absolute = true;
            true
        }
        ExprKind::Axis(step) => {
            steps.push(step);
            true
        }
        _ => false,
    }
}

/// Pattern form of a path of child, descendant and attribute steps, or
/// `None` for anything a pattern cannot express.
pub fn to_pattern(expr: &Expr) -> Option<Pattern> {
    let mut raw = Vec::new();
    let mut absolute = false;
    if !collect_steps(expr, &mut raw, &mut absolute) {
        return None;
    }
    let mut steps = Vec::with_capacity(raw.len());
    let mut pending_descendant = false;
    for (i, s) in raw.iter().enumerate() {
        if steps.last().is_some_and(|p: &PatternStep| p.axis == PatternAxis::Attribute) {
            return None;
        }
        let axis = match s.axis {
            Axis::DescendantOrSelf if s.test == NodeTest::AnyNode && i + 1 < raw.len() => {
                pending_descendant = true;
                continue;
            }
            Axis::Child if pending_descendant => PatternAxis::Descendant,
            Axis::Child => PatternAxis::Child,
            Axis::Descendant if !pending_descendant => PatternAxis::Descendant,
            Axis::Attribute if pending_descendant => return None,
            Axis::Attribute => PatternAxis::Attribute,
            _ => return None,
        };
        pending_descendant = false;
        steps.push(PatternStep { axis, test: s.test.clone() });
    }
    Some(Pattern { absolute, steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::build::{
        any_node, attribute, call, child, descendant, descendant_path, filter, int, path, root, var,
    };

    #[test]
    fn downward_paths_are_streamable() {
        assert_eq!(posture(&path(child("a"), child("b"))), Posture::Striding);
        assert_eq!(posture(&path(child("a"), descendant("b"))), Posture::Crawling);
        assert_eq!(posture(&call("count", vec![descendant("b")])), Posture::Grounded);
        assert_eq!(posture(&filter(child("a"), attribute("id"))), Posture::Striding);
    }

    #[test]
    fn two_consumers_roam() {
        let e = crate::compiler::build::add(call("count", vec![child("a")]), call("count", vec![child("b")]));
        assert_eq!(posture(&e), Posture::Grounded);
        let e = crate::compiler::build::eq(child("a"), child("b"));
        assert_eq!(posture(&e), Posture::Roaming);
        assert!(!is_streamable(&filter(child("a"), child("b"))));
        assert!(is_streamable(&filter(var("x"), int(1))));
    }

    #[test]
    fn pattern_forms() {
        let p = to_pattern(&descendant_path(root(), child("b"))).unwrap();
        assert_eq!(p.to_string(), "//b");
        let p = to_pattern(&path(child("a"), attribute("id"))).unwrap();
        assert_eq!(p.to_string(), "a/@id");
        assert!(to_pattern(&path(child("a"), any_node(Axis::Parent))).is_none());
        assert!(to_pattern(&filter(child("a"), int(1))).is_none());
    }
}
