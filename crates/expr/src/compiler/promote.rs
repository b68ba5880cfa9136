//! Loop-invariant promotion.
//!
//! A [`PromotionOffer`] is pushed into the repeated operand of a loop (the
//! action of a `for`, a filter predicate, the step of a path). Each node
//! either accepts the offer, in which case it is replaced by a reference to
//! a fresh variable bound around the loop, or forwards it to its operands.
//! Entering the scope of a binding construct extends the exclusion list, so
//! nothing that reads a variable bound inside the loop is ever hoisted.

use tracing::debug;

use crate::compiler::analysis::{declaration, mentions_any};
use crate::compiler::binding::{Binding, BindingId, BindingKind, Bindings};
use crate::compiler::ir::{EvaluationMode, Expr, ExprKind, LetExpr, OperandUsage, VarDecl, VarRef, VarTarget};
use crate::consts::INTERNAL_NS;
use crate::xdm::ExpandedName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OfferKind {
    /// Out of an operand evaluated once per item of a new focus.
    FocusIndependent,
    /// Out of the action of a `for`; the range variable is excluded.
    RangeIndependent,
}

pub(crate) struct PromotionOffer<'b> {
    kind: OfferKind,
    excluded: Vec<BindingId>,
    bindings: &'b mut Bindings,
    promoted: Vec<(VarDecl, Expr)>,
}

fn is_candidate(expr: &Expr) -> bool {
    match expr.kind() {
        ExprKind::FunctionCall(call) => !call.args.is_empty(),
        ExprKind::Arithmetic { .. }
        | ExprKind::Slash { .. }
        | ExprKind::Filter { .. }
        | ExprKind::ValueComparison { .. }
        | ExprKind::GeneralComparison { .. }
        | ExprKind::Range { .. }
        | ExprKind::Venn { .. }
        | ExprKind::If { .. }
        | ExprKind::Quantified { .. }
        | ExprKind::For { .. } => true,
        _ => false,
    }
}

impl<'b> PromotionOffer<'b> {
    pub(crate) fn new(kind: OfferKind, excluded: Vec<BindingId>, bindings: &'b mut Bindings) -> Self {
        Self { kind, excluded, bindings, promoted: Vec::new() }
    }

    fn accepts(&self, expr: &Expr, under_new_focus: bool) -> bool {
        if !is_candidate(expr) {
            return false;
        }
        let info = expr.static_info();
        let focus_free = !info.depends_on_focus();
        let focus_ok = match self.kind {
            OfferKind::FocusIndependent => focus_free,
            OfferKind::RangeIndependent => focus_free || !under_new_focus,
        };
        focus_ok && !mentions_any(expr, &self.excluded)
    }

    fn hoist(&mut self, expr: Expr) -> Expr {
        let static_type = expr.static_info().sequence_type();
        let mut binding = Binding::new(ExpandedName::new(Some(INTERNAL_NS), "p"), BindingKind::Promoted, None);
        binding.inferred = Some(static_type);
        let id = self.bindings.insert(binding);
        let name = ExpandedName::new(Some(INTERNAL_NS), &format!("p{}", id.index()));
        if let Some(b) = self.bindings.get_mut(id) {
            b.name = name.clone();
        }
        debug!(hoisted = %expr, variable = %name, "promoted loop-invariant subexpression");
        let loc = expr.loc;
        let mut decl = VarDecl::new(name.clone(), None);
        decl.binding = Some(id);
        self.promoted.push((decl, expr));
        Expr::new(ExprKind::VarRef(VarRef { name, target: Some(VarTarget::Local(id)), static_type, slot: None }))
            .at(loc)
    }

    /// Offer promotion to `expr` and everything below it.
    pub(crate) fn offer(&mut self, expr: Expr) -> Expr {
        self.visit(expr, false)
    }

    fn visit(&mut self, mut expr: Expr, under_new_focus: bool) -> Expr {
        if self.accepts(&expr, under_new_focus) {
            return self.hoist(expr);
        }
        let usages: Vec<OperandUsage> = expr.operands().into_iter().map(|(_, u)| u).collect();
        let declared = declaration(&expr).and_then(|(d, _)| d.binding);
        for (child, usage) in expr.children_mut().into_iter().zip(usages) {
            let scoped = usage.contains(OperandUsage::IN_SCOPE) && declared.is_some();
            if let (true, Some(id)) = (scoped, declared) {
                self.excluded.push(id);
            }
            let taken = child.take();
            *child = self.visit(taken, under_new_focus || usage.contains(OperandUsage::NEW_FOCUS));
            if scoped {
                self.excluded.pop();
            }
        }
        expr.invalidate();
        expr
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.promoted.is_empty()
    }

    /// Bind the promoted values around `loop_expr`, outermost first.
    pub(crate) fn wrap(self, loop_expr: Expr) -> Expr {
        let loc = loop_expr.loc;
        self.promoted.into_iter().rev().fold(loop_expr, |action, (var, init)| {
            Expr::new(ExprKind::Let(Box::new(LetExpr { var, init, action, mode: EvaluationMode::Memo }))).at(loc)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::build::{add, call, child, filter, for_in, int, var};
    use crate::compiler::package::Declarations;
    use crate::compiler::resolve::resolve;
    use crate::engine::runtime::StaticContext;

    fn resolved(expr: Expr, bindings: &mut Bindings) -> Expr {
        resolve(expr, &[], &StaticContext::default(), &Declarations::default(), bindings).unwrap().0
    }

    #[test]
    fn range_variable_blocks_promotion() {
        let mut bindings = Bindings::new();
        let e = resolved(for_in("i", call("count", vec![child("a")]), add(var("i"), int(1))), &mut bindings);
        let ExprKind::For { var, action, .. } = e.into_kind() else { panic!("expected for") };
        let mut offer = PromotionOffer::new(OfferKind::RangeIndependent, vec![var.binding.unwrap()], &mut bindings);
        let action = offer.offer(*action);
        assert!(offer.is_empty());
        assert!(matches!(action.kind(), ExprKind::Arithmetic { .. }));
    }

    #[test]
    fn focus_dependent_predicate_stays() {
        let mut bindings = Bindings::new();
        let e = resolved(filter(child("a"), call("count", vec![child("b")])), &mut bindings);
        let ExprKind::Filter { predicate, .. } = e.into_kind() else { panic!("expected filter") };
        let mut offer = PromotionOffer::new(OfferKind::FocusIndependent, Vec::new(), &mut bindings);
        offer.offer(*predicate);
        assert!(offer.is_empty());
    }

    #[test]
    fn invariant_is_hoisted_into_a_memo_let() {
        let mut bindings = Bindings::new();
        let e = resolved(for_in("i", child("a"), add(call("count", vec![child("b")]), int(1))), &mut bindings);
        let ExprKind::For { var, action, seq } = e.into_kind() else { panic!("expected for") };
        let mut offer = PromotionOffer::new(OfferKind::RangeIndependent, vec![var.binding.unwrap()], &mut bindings);
        let action = offer.offer(*action);
        assert!(matches!(action.kind(), ExprKind::VarRef(_)));
        let wrapped = offer.wrap(Expr::new(ExprKind::For { var, seq, action: Box::new(action) }));
        let ExprKind::Let(l) = wrapped.kind() else { panic!("expected let, got {wrapped}") };
        assert_eq!(l.mode, EvaluationMode::Memo);
        assert_eq!(l.var.name.ns(), Some(INTERNAL_NS));
    }
}
