//! Rewrite engine.
//!
//! Runs bottom-up over a type-checked tree. Every rule replaces a node by one
//! that yields the same items in the same order for every dynamic context in
//! which the original is valid. Literal operands produced by a rewrite are
//! folded on the way back up.

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::compiler::analysis::{References, references, refine_references};
use crate::compiler::binding::{BindingId, BindingKind, Bindings};
use crate::compiler::fold::fold;
use crate::compiler::ir::{
    Axis, AxisStep, BoolOp, CallTarget, EvaluationMode, Expr, ExprKind, FilterFlags, FunctionCall, LetExpr, NodeId,
    NodeTest, OperandUsage, Quantifier, SetOp, VarDecl, VarTarget,
};
use crate::compiler::promote::{OfferKind, PromotionOffer};
use crate::compiler::properties::slash_needs_sort;
use crate::compiler::typecheck::filter_flags;
use crate::consts::FNS;
use crate::engine::functions::BuiltinFn;
use crate::engine::runtime::{Error, ErrorCode, OptimizerOptions, SourceLocation};
use crate::types::{Cardinality, Dependencies, ItemType, Relation, SequenceType, StaticProperties};
use crate::xdm::{ExpandedName, XdmAtomicValue};

struct Optimizer<'o> {
    options: &'o OptimizerOptions,
    bindings: &'o mut Bindings,
    /// Nesting depth of re-optimizations triggered by inlining.
    retries: u32,
    /// Whether a focus is statically present, one entry per focus scope.
    focus: Vec<bool>,
}

fn wrap(expr: Expr, kind: impl FnOnce(Box<Expr>) -> ExprKind) -> Expr {
    let loc = expr.loc;
    Expr::new(kind(Box::new(expr))).at(loc)
}

fn empty_at(loc: Option<SourceLocation>) -> Expr {
    Expr::empty().at(loc)
}

fn local_ref(expr: &Expr) -> Option<BindingId> {
    match expr.kind() {
        ExprKind::VarRef(r) => match r.target {
            Some(VarTarget::Local(id)) => Some(id),
            _ => None,
        },
        _ => None,
    }
}

fn is_builtin(expr: &Expr, f: BuiltinFn) -> bool {
    matches!(expr.kind(), ExprKind::FunctionCall(c) if c.target == CallTarget::Builtin(f))
}

fn reads_focus_position(expr: &Expr) -> bool {
    is_builtin(expr, BuiltinFn::Position) || is_builtin(expr, BuiltinFn::Last)
}

fn needs_sort(e: &Expr) -> bool {
    e.cardinality().allows_many() && !e.static_info().special.contains(StaticProperties::ORDERED_NODESET)
}

fn sorted(e: Expr) -> Expr {
    if needs_sort(&e) { wrap(e, ExprKind::DocumentSort) } else { e }
}

fn unsorted(e: Expr) -> Expr {
    match e.into_parts() {
        (_, _, ExprKind::DocumentSort(inner)) => *inner,
        (id, loc, kind) => Expr::from_parts(id, loc, kind),
    }
}

/// Whether a step's result depends on the position of its context item.
fn is_positional(step: &Expr) -> bool {
    match step.kind() {
        ExprKind::Filter { base, predicate, flags } => {
            flags.contains(FilterFlags::POSITIONAL)
                || predicate.static_info().dependencies.intersects(Dependencies::POSITION | Dependencies::LAST)
                || is_positional(base)
        }
        ExprKind::FirstItem(_) | ExprKind::LastItem(_) => true,
        _ => false,
    }
}

/// The axis step at the bottom of a (possibly filtered) step.
fn innermost_axis_mut(step: &mut Expr) -> Option<&mut AxisStep> {
    match step.kind_mut() {
        ExprKind::Axis(s) => Some(s),
        ExprKind::Filter { base, .. } => innermost_axis_mut(base),
        _ => None,
    }
}

fn innermost_axis(step: &Expr) -> Option<&AxisStep> {
    match step.kind() {
        ExprKind::Axis(s) => Some(s),
        ExprKind::Filter { base, .. } => innermost_axis(base),
        _ => None,
    }
}

fn is_descendant_or_self_node(e: &Expr) -> bool {
    matches!(e.kind(), ExprKind::Axis(s) if s.axis == Axis::DescendantOrSelf && s.test == NodeTest::AnyNode)
}

fn not_call(operand: Expr) -> Expr {
    let loc = operand.loc;
    Expr::new(ExprKind::FunctionCall(FunctionCall {
        name: ExpandedName::new(Some(FNS), "not"),
        target: CallTarget::Builtin(BuiltinFn::Not),
        args: vec![operand],
        result: SequenceType::SINGLE_BOOLEAN,
    }))
    .at(loc)
}

enum LiteralPredicate {
    KeepAll,
    KeepNone,
    First,
    Unknown,
}

#[allow(clippy::float_cmp)]
fn classify_literal_predicate(values: &[XdmAtomicValue]) -> LiteralPredicate {
    let [value] = values else {
        return if values.is_empty() { LiteralPredicate::KeepNone } else { LiteralPredicate::Unknown };
    };
    let number = match value {
        XdmAtomicValue::Boolean(true) => return LiteralPredicate::KeepAll,
        XdmAtomicValue::Boolean(false) => return LiteralPredicate::KeepNone,
        XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::AnyUri(s) => {
            return if s.is_empty() { LiteralPredicate::KeepNone } else { LiteralPredicate::KeepAll };
        }
        #[allow(clippy::cast_precision_loss)]
        XdmAtomicValue::Integer(i) => *i as f64,
        XdmAtomicValue::Decimal(d) | XdmAtomicValue::Double(d) => *d,
        XdmAtomicValue::Float(f) => f64::from(*f),
        _ => return LiteralPredicate::Unknown,
    };
    if number == 1.0 {
        LiteralPredicate::First
    } else if number < 1.0 || number.fract() != 0.0 {
        LiteralPredicate::KeepNone
    } else {
        LiteralPredicate::Unknown
    }
}

impl Optimizer<'_> {
    fn visit(&mut self, expr: Expr) -> Result<Expr, Error> {
        let loc = expr.loc;
        let rewritten = if matches!(expr.kind(), ExprKind::Let(_)) {
            self.let_expr(expr)
        } else {
            self.visit_children(expr).and_then(|e| self.rewrite(e))
        };
        fold(rewritten.map_err(|e| e.with_location(loc))?)
    }

    fn visit_children(&mut self, mut expr: Expr) -> Result<Expr, Error> {
        let new_focus: SmallVec<[bool; 3]> =
            expr.operands().iter().map(|(_, usage)| usage.contains(OperandUsage::NEW_FOCUS)).collect();
        for (child, new_focus) in expr.children_mut().into_iter().zip(new_focus) {
            let taken = child.take();
            if new_focus {
                self.focus.push(true);
            }
            let visited = self.visit(taken);
            if new_focus {
                self.focus.pop();
            }
            *child = visited?;
        }
        Ok(expr)
    }

    fn focus_present(&self) -> bool {
        self.focus.last().copied().unwrap_or(false)
    }

    fn rewrite(&mut self, expr: Expr) -> Result<Expr, Error> {
        let (id, loc, kind) = expr.into_parts();
        let node = move |kind: ExprKind| Expr::from_parts(id, loc, kind);
        Ok(match kind {
            ExprKind::For { var, seq, action } => self.for_expr(id, loc, var, *seq, *action)?,
            ExprKind::Filter { base, predicate, .. } => self.filter(id, loc, *base, *predicate),
            ExprKind::Slash { start, step } => self.slash(id, loc, *start, *step),
            ExprKind::Venn { op, lhs, rhs } => self.venn(id, loc, op, *lhs, *rhs),
            ExprKind::FirstItem(e) | ExprKind::LastItem(e) if !e.cardinality().allows_many() => *e,
            ExprKind::Quantified { quantifier, seq, .. } if seq.is_empty_literal() => {
                let every = quantifier == Quantifier::Every;
                node(ExprKind::Literal(vec![XdmAtomicValue::Boolean(every)]))
            }
            ExprKind::DocumentSort(e) if !needs_sort(&e) || matches!(e.kind(), ExprKind::DocumentSort(_)) => *e,
            ExprKind::Atomize(e) if matches!(e.item_type(), ItemType::Atomic(_) | ItemType::Empty) => *e,
            ExprKind::CheckCardinality { operand, required, .. } if required.contains(operand.cardinality()) => {
                *operand
            }
            ExprKind::CheckItemType { operand, required, .. } if required.subsumes(operand.item_type()) => *operand,
            kind => node(kind),
        })
    }

    fn let_expr(&mut self, expr: Expr) -> Result<Expr, Error> {
        let (id, loc, kind) = expr.into_parts();
        let ExprKind::Let(l) = kind else {
            return Ok(Expr::from_parts(id, loc, kind));
        };
        let LetExpr { var, init, mut action, mode } = *l;
        let init = self.visit(init)?;
        if let Some(bid) = var.binding {
            let t = init.static_info().sequence_type();
            if let Some(b) = self.bindings.get_mut(bid)
                && b.inferred != Some(t)
            {
                b.inferred = Some(t);
                refine_references(&mut action, bid, t);
            }
        }
        let action = self.visit(action)?;
        self.finish_let(id, loc, var, init, action, mode)
    }

    /// Decide the fate of a `let` whose initializer and action are optimized.
    fn finish_let(
        &mut self,
        id: NodeId,
        loc: Option<SourceLocation>,
        var: VarDecl,
        init: Expr,
        mut action: Expr,
        mode: EvaluationMode,
    ) -> Result<Expr, Error> {
        let Some(bid) = var.binding else {
            return Ok(Expr::from_parts(id, loc, ExprKind::Let(Box::new(LetExpr { var, init, action, mode }))));
        };
        let refs = references(&action, bid);
        if refs.count() == 0 {
            debug!(variable = %var.name, init = %init, "dropped unreferenced variable");
            self.bindings.remove(bid);
            return Ok(action);
        }
        if local_ref(&action) == Some(bid) {
            debug!(variable = %var.name, "removed trivial variable");
            self.bindings.remove(bid);
            return Ok(init);
        }
        if self.options.inline_variables && Self::inlinable(&init, &refs) {
            debug!(variable = %var.name, value = %init, references = refs.count(), "inlined variable");
            let mut remaining = Some(init);
            let last = refs.nodes.len() - 1;
            for (i, node) in refs.nodes.iter().enumerate() {
                let replacement = if i == last {
                    remaining.take().unwrap_or_else(Expr::empty)
                } else {
                    remaining.as_ref().map_or_else(Expr::empty, |e| e.copy(self.bindings))
                };
                if action.replace_subexpression(*node, replacement).is_err() {
                    return Err(Error::static_error(
                        ErrorCode::XPST0008,
                        format!("reference to ${} not found while inlining it", var.name),
                    ));
                }
            }
            self.bindings.remove(bid);
            return self.reoptimize(action);
        }
        let mode = self.choose_mode(bid, &init, &refs);
        Ok(Expr::from_parts(id, loc, ExprKind::Let(Box::new(LetExpr { var, init, action, mode }))))
    }

    fn inlinable(init: &Expr, refs: &References) -> bool {
        if init.is_literal() || matches!(init.kind(), ExprKind::VarRef(_)) {
            return true;
        }
        refs.count() == 1 && !refs.in_loop && !(refs.under_new_focus && init.static_info().depends_on_focus())
    }

    fn reoptimize(&mut self, action: Expr) -> Result<Expr, Error> {
        if self.retries >= self.options.max_let_retries {
            warn!(limit = self.options.max_let_retries, "let optimization retry limit reached");
            return Ok(action);
        }
        self.retries += 1;
        let out = self.visit(action);
        self.retries -= 1;
        out
    }

    fn choose_mode(&mut self, bid: BindingId, init: &Expr, refs: &References) -> EvaluationMode {
        if let Some(b) = self.bindings.get_mut(bid) {
            b.indexed = refs.filtered;
        }
        if init.is_literal() {
            EvaluationMode::NoEvaluationNeeded
        } else if local_ref(init).is_some() {
            EvaluationMode::Variable
        } else if refs.filtered {
            EvaluationMode::Indexed
        } else if self.focus_present() && reads_focus_position(init) {
            EvaluationMode::Eager
        } else if refs.count() == 1 && !refs.in_loop {
            EvaluationMode::Lazy
        } else {
            EvaluationMode::Memo
        }
    }

    fn for_expr(
        &mut self,
        id: NodeId,
        loc: Option<SourceLocation>,
        var: VarDecl,
        seq: Expr,
        action: Expr,
    ) -> Result<Expr, Error> {
        if seq.is_empty_literal() {
            return Ok(empty_at(loc));
        }
        if var.binding.is_some() && local_ref(&action) == var.binding {
            debug!(variable = %var.name, "removed identity loop");
            if let Some(bid) = var.binding {
                self.bindings.remove(bid);
            }
            return Ok(seq);
        }
        if seq.cardinality() == Cardinality::EXACTLY_ONE {
            debug!(variable = %var.name, "converted singleton loop to let");
            if let Some(b) = var.binding.and_then(|bid| self.bindings.get_mut(bid)) {
                b.kind = BindingKind::Let;
            }
            return self.finish_let(id, loc, var, seq, action, EvaluationMode::default());
        }
        let excluded = var.binding.into_iter().collect();
        let looped = Expr::from_parts(id, loc, ExprKind::For { var, seq: Box::new(seq), action: Box::new(action) });
        if !self.options.extract_invariants {
            return Ok(looped);
        }
        Ok(self.promote_operand(looped, OfferKind::RangeIndependent, excluded))
    }

    /// Offer loop-invariant promotion to the repeated operand of `looped`.
    fn promote_operand(&mut self, mut looped: Expr, kind: OfferKind, excluded: Vec<BindingId>) -> Expr {
        let mut offer = PromotionOffer::new(kind, excluded, self.bindings);
        if let Some(operand) = looped.children_mut().into_iter().nth(1) {
            let taken = operand.take();
            *operand = offer.offer(taken);
        }
        if offer.is_empty() {
            return looped;
        }
        if let ExprKind::Filter { predicate, flags, .. } = looped.kind_mut() {
            *flags = filter_flags(predicate);
        }
        offer.wrap(looped)
    }

    fn filter(&mut self, id: NodeId, loc: Option<SourceLocation>, base: Expr, predicate: Expr) -> Expr {
        if base.is_empty_literal() {
            return empty_at(loc);
        }
        if let Some(values) = predicate.as_literal() {
            match classify_literal_predicate(values) {
                LiteralPredicate::KeepAll => return base,
                LiteralPredicate::KeepNone => return empty_at(loc),
                LiteralPredicate::First => {
                    debug!(base = %base, "rewrote [1] to first item");
                    return Expr::from_parts(id, loc, ExprKind::FirstItem(Box::new(base)));
                }
                LiteralPredicate::Unknown => {}
            }
        }
        if is_builtin(&predicate, BuiltinFn::Last) {
            debug!(base = %base, "rewrote [last()] to last item");
            return Expr::from_parts(id, loc, ExprKind::LastItem(Box::new(base)));
        }
        let flags = filter_flags(&predicate);
        if flags.contains(FilterFlags::INDEPENDENT | FilterFlags::SINGLETON_BOOLEAN)
            && !flags.contains(FilterFlags::POSITIONAL)
        {
            debug!(predicate = %predicate, "rewrote independent predicate to conditional");
            let (condition, then, otherwise) = (Box::new(predicate), Box::new(base), Box::new(empty_at(loc)));
            return Expr::from_parts(id, loc, ExprKind::If { condition, then, otherwise });
        }
        let filtered =
            Expr::from_parts(id, loc, ExprKind::Filter { base: Box::new(base), predicate: Box::new(predicate), flags });
        if self.options.extract_invariants {
            self.promote_operand(filtered, OfferKind::FocusIndependent, Vec::new())
        } else {
            filtered
        }
    }

    fn slash(&mut self, id: NodeId, loc: Option<SourceLocation>, start: Expr, step: Expr) -> Expr {
        if start.is_empty_literal() || step.is_empty_literal() {
            return empty_at(loc);
        }
        let (start, step) =
            if self.options.rewrite_paths { descendant_rewrite(start, step) } else { (Some(start), step) };
        let Some(start) = start else {
            return step;
        };
        let sort = slash_needs_sort(&start, &step);
        let mut path = Expr::from_parts(id, loc, ExprKind::Slash { start: Box::new(start), step: Box::new(step) });
        if self.options.extract_invariants {
            path = self.promote_operand(path, OfferKind::FocusIndependent, Vec::new());
        }
        if sort { wrap(path, ExprKind::DocumentSort) } else { path }
    }

    fn venn(&mut self, id: NodeId, loc: Option<SourceLocation>, op: SetOp, lhs: Expr, rhs: Expr) -> Expr {
        match (op, lhs.is_empty_literal(), rhs.is_empty_literal()) {
            (SetOp::Union, true, _) => return rhs,
            (SetOp::Union | SetOp::Except, false, true) => return lhs,
            (SetOp::Intersect, true, _) | (SetOp::Intersect, _, true) | (SetOp::Except, true, _) => {
                return empty_at(loc);
            }
            _ => {}
        }
        let (a, b) = (lhs.item_type(), rhs.item_type());
        if op != SetOp::Union && a.relationship(b) == Relation::Disjoint {
            debug!(lhs = %lhs, rhs = %rhs, op = op.name(), "simplified set operation on disjoint types");
            return if op == SetOp::Intersect { empty_at(loc) } else { lhs };
        }
        if op == SetOp::Intersect && !lhs.cardinality().allows_many() {
            debug!(lhs = %lhs, "rewrote intersect with singleton operand");
            let rhs = Box::new(unsorted(rhs));
            return Expr::from_parts(id, loc, ExprKind::SingletonIntersect { lhs: Box::new(lhs), rhs });
        }
        if self.options.rewrite_paths
            && let (ExprKind::Axis(x), ExprKind::Axis(y)) = (lhs.kind(), rhs.kind())
            && x.axis == y.axis
            && !x.axis.is_reverse()
        {
            let test = NodeTest::Combined { op, lhs: Box::new(x.test.clone()), rhs: Box::new(y.test.clone()) };
            debug!(axis = x.axis.name(), op = op.name(), "merged same-axis steps");
            return Expr::from_parts(id, loc, ExprKind::Axis(AxisStep { axis: x.axis, test }));
        }
        if self.options.merge_filters && mergeable_filters(&lhs, &rhs) {
            return merge_filters(op, lhs, rhs, loc);
        }
        Expr::from_parts(id, loc, ExprKind::Venn { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }
}

/// `X/descendant-or-self::node()/child::T` becomes `X/descendant::T`.
///
/// The start comes back as `None` when it was a bare
/// `descendant-or-self::node()` and the rewritten step stands alone.
fn descendant_rewrite(start: Expr, mut step: Expr) -> (Option<Expr>, Expr) {
    if !innermost_axis(&step).is_some_and(|s| s.axis == Axis::Child) || is_positional(&step) {
        return (Some(start), step);
    }
    let shape_matches = {
        let inner = match start.kind() {
            ExprKind::DocumentSort(e) => &**e,
            _ => &start,
        };
        is_descendant_or_self_node(inner)
            || matches!(inner.kind(), ExprKind::Slash { step: s, .. } if is_descendant_or_self_node(s))
    };
    if !shape_matches {
        return (Some(start), step);
    }
    if let Some(axis) = innermost_axis_mut(&mut step) {
        axis.axis = Axis::Descendant;
    }
    refresh_filters(&mut step);
    debug!(step = %step, "rewrote descendant-or-self::node()/child:: to descendant::");
    match unsorted(start).into_parts() {
        (_, _, ExprKind::Slash { start: x, .. }) => (Some(*x), step),
        _ => (None, step),
    }
}

/// Recompute the flags of filters inside a rewritten step.
fn refresh_filters(step: &mut Expr) {
    if let ExprKind::Filter { base, predicate, flags } = step.kind_mut() {
        *flags = filter_flags(predicate);
        refresh_filters(base);
    }
}

fn without_sort(e: &Expr) -> &Expr {
    match e.kind() {
        ExprKind::DocumentSort(inner) => inner,
        _ => e,
    }
}

fn mergeable_filters(lhs: &Expr, rhs: &Expr) -> bool {
    match (without_sort(lhs), without_sort(rhs)) {
        (a, b) if is_positional(a) || is_positional(b) => false,
        (a, b) => match (a.kind(), b.kind()) {
            (ExprKind::Filter { base: x, .. }, ExprKind::Filter { base: y, .. }) => x.same_as(y),
            _ => false,
        },
    }
}

fn split_filter(e: Expr) -> (Expr, Expr) {
    match unsorted(e).into_parts() {
        (_, _, ExprKind::Filter { base, predicate, .. }) => (*base, *predicate),
        (id, loc, kind) => (Expr::from_parts(id, loc, kind), Expr::empty()),
    }
}

/// `A[p] | A[q]` becomes `A[p or q]`; intersect and except use `and` and
/// `and not`. Both operands must pass [`mergeable_filters`].
fn merge_filters(op: SetOp, lhs: Expr, rhs: Expr, loc: Option<SourceLocation>) -> Expr {
    let (base, p) = split_filter(lhs);
    let (_, q) = split_filter(rhs);
    let (bool_op, q) = match op {
        SetOp::Union => (BoolOp::Or, q),
        SetOp::Intersect => (BoolOp::And, q),
        SetOp::Except => (BoolOp::And, not_call(q)),
    };
    let predicate = Expr::new(ExprKind::Boolean { op: bool_op, lhs: Box::new(p), rhs: Box::new(q) }).at(loc);
    let flags = filter_flags(&predicate);
    debug!(base = %base, op = op.name(), "merged filters over the same base");
    sorted(Expr::new(ExprKind::Filter { base: Box::new(base), predicate: Box::new(predicate), flags }).at(loc))
}

/// Rewrite a type-checked unit.
/// `focus_present` tells whether the unit's context item is statically known
/// to exist; inside predicates and path steps it always does.
pub(crate) fn optimize(
    expr: Expr,
    options: &OptimizerOptions,
    bindings: &mut Bindings,
    focus_present: bool,
) -> Result<Expr, Error> {
    let mut optimizer = Optimizer { options, bindings, retries: 0, focus: vec![focus_present] };
    optimizer.visit(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::analysis::dangling_references;
    use crate::compiler::build::{add, call, int, let_in, name, seq, var};
    use crate::compiler::package::Declarations;
    use crate::compiler::{resolve, typecheck};
    use crate::engine::runtime::StaticContext;

    fn optimized(expr: Expr, focus_present: bool) -> Expr {
        let ctx = StaticContext::default();
        let decls = Declarations::default();
        let mut bindings = Bindings::new();
        let (expr, _) = resolve::resolve(expr, &[], &ctx, &decls, &mut bindings).unwrap();
        let expr = typecheck::check(expr, &ctx, &decls, &mut bindings).unwrap();
        optimize(expr, &OptimizerOptions::default(), &mut bindings, focus_present).unwrap()
    }

    #[test]
    fn inlined_variable_leaves_no_reference_behind() {
        let ctx = StaticContext::default();
        let decls = Declarations::default();
        let mut bindings = Bindings::new();
        let params = [(name("p"), SequenceType::SINGLE_INTEGER)];
        let expr = let_in("a", var("p"), seq(vec![var("a"), add(var("a"), int(1))]));
        let (expr, params) = resolve::resolve(expr, &params, &ctx, &decls, &mut bindings).unwrap();
        let ExprKind::Let(l) = expr.kind() else { panic!("expected let") };
        let eliminated = l.var.binding.unwrap();
        let param = params[0].binding.unwrap();

        let expr = typecheck::check(expr, &ctx, &decls, &mut bindings).unwrap();
        let out = optimize(expr, &OptimizerOptions::default(), &mut bindings, true).unwrap();
        assert!(!matches!(out.kind(), ExprKind::Let(_)));
        assert!(!bindings.contains(eliminated));
        assert_eq!(references(&out, eliminated).count(), 0);
        assert_eq!(references(&out, param).count(), 2);
        assert!(dangling_references(&out, &bindings).is_empty());
    }

    #[test]
    fn position_is_read_eagerly_only_with_a_static_focus() {
        let twice = || let_in("p", call("position", vec![]), seq(vec![var("p"), var("p")]));
        let mode = |e: &Expr| match e.kind() {
            ExprKind::Let(l) => l.mode,
            _ => panic!("expected let"),
        };
        assert_eq!(mode(&optimized(twice(), true)), EvaluationMode::Eager);
        assert_eq!(mode(&optimized(twice(), false)), EvaluationMode::Memo);
    }

    #[test]
    fn literal_predicates() {
        use XdmAtomicValue as V;
        let class = |values: &[XdmAtomicValue]| match classify_literal_predicate(values) {
            LiteralPredicate::KeepAll => "all",
            LiteralPredicate::KeepNone => "none",
            LiteralPredicate::First => "first",
            LiteralPredicate::Unknown => "unknown",
        };
        assert_eq!(class(&[]), "none");
        assert_eq!(class(&[V::Integer(1)]), "first");
        assert_eq!(class(&[V::Double(1.0)]), "first");
        assert_eq!(class(&[V::Integer(0)]), "none");
        assert_eq!(class(&[V::Decimal(2.5)]), "none");
        assert_eq!(class(&[V::Integer(3)]), "unknown");
        assert_eq!(class(&[V::Boolean(true)]), "all");
        assert_eq!(class(&[V::String(String::new())]), "none");
        assert_eq!(class(&[V::Integer(1), V::Integer(2)]), "unknown");
    }
}
