//! Static type checking.
//!
//! One bottom-up pass over a resolved tree. Each node is checked after its
//! operands: operands are coerced to the types their parent requires, paths
//! and set operands get a document-order sort where their static properties
//! do not guarantee one, filter predicates are classified, and every node
//! whose operands have become literals is folded. The static type of the
//! context item is tracked on a stack, so a missing or atomic focus is
//! reported here rather than at run time.

use crate::compiler::analysis;
use crate::compiler::binding::Bindings;
use crate::compiler::coerce::coerce;
use crate::compiler::fold::fold;
use crate::compiler::ir::{
    CallTarget, CompOp, Expr, ExprKind, FilterFlags, FunctionCall, LetExpr, NodeId, SetOp,
};
use crate::compiler::package::Declarations;
use crate::compiler::properties::{atomized_type, slash_needs_sort};
use crate::engine::runtime::{Error, ErrorCode, SourceLocation, StaticContext};
use crate::types::{AtomicType, Cardinality, Dependencies, ItemType, Relation, SequenceType, StaticProperties};

struct TypeChecker<'c> {
    ctx: &'c StaticContext,
    decls: &'c Declarations,
    bindings: &'c mut Bindings,
    /// Static type of the context item; `None` while it is absent.
    focus: Vec<Option<ItemType>>,
}

#[derive(PartialEq, Eq)]
enum Comparable {
    Numeric,
    String,
    Boolean,
    DateTime,
    Date,
}

fn comparable(t: ItemType) -> Option<Comparable> {
    match t.atomic()? {
        AtomicType::AnyAtomic | AtomicType::UntypedAtomic => None,
        AtomicType::Numeric | AtomicType::Decimal | AtomicType::Integer | AtomicType::Double | AtomicType::Float => {
            Some(Comparable::Numeric)
        }
        AtomicType::String | AtomicType::AnyUri => Some(Comparable::String),
        AtomicType::Boolean => Some(Comparable::Boolean),
        AtomicType::DateTime => Some(Comparable::DateTime),
        AtomicType::Date => Some(Comparable::Date),
    }
}

/// Statically incomparable operands that are both known to be non-empty.
fn check_comparable(lhs: &Expr, rhs: &Expr, a: ItemType, b: ItemType, symbol: &str) -> Result<(), Error> {
    let (Some(x), Some(y)) = (comparable(a), comparable(b)) else {
        return Ok(());
    };
    if x == y || lhs.cardinality().allows_zero() || rhs.cardinality().allows_zero() {
        return Ok(());
    }
    Err(Error::static_error(ErrorCode::XPTY0004, format!("cannot compare {a} with {b} using '{symbol}'")))
}

fn wrap(expr: Expr, kind: impl FnOnce(Box<Expr>) -> ExprKind) -> Expr {
    let loc = expr.loc;
    Expr::new(kind(Box::new(expr))).at(loc)
}

fn needs_sort(e: &Expr) -> bool {
    e.cardinality().allows_many() && !e.static_info().special.contains(StaticProperties::ORDERED_NODESET)
}

fn focus_of(t: ItemType) -> ItemType {
    if t == ItemType::Empty { ItemType::AnyItem } else { t }
}

/// Flags the evaluator uses to pick a filter strategy.
pub(crate) fn filter_flags(predicate: &Expr) -> FilterFlags {
    let info = predicate.static_info();
    let mut flags = FilterFlags::empty();
    if ItemType::NUMERIC.relationship(info.item_type) != Relation::Disjoint {
        flags |= FilterFlags::POSITIONAL;
    }
    if info.item_type == ItemType::BOOLEAN && info.cardinality == Cardinality::EXACTLY_ONE {
        flags |= FilterFlags::SINGLETON_BOOLEAN;
    }
    if !info.depends_on_focus() {
        flags |= FilterFlags::INDEPENDENT;
    }
    flags
}

impl TypeChecker<'_> {
    fn require_focus(&self, what: &str) -> Result<ItemType, Error> {
        self.focus.last().copied().flatten().ok_or_else(|| {
            Error::static_error(ErrorCode::XPDY0002, format!("the context item for {what} is absent"))
        })
    }

    fn require_node_focus(&self, what: &str) -> Result<(), Error> {
        let t = self.require_focus(what)?;
        if matches!(t, ItemType::Atomic(_)) {
            return Err(Error::static_error(
                ErrorCode::XPTY0020,
                format!("the context item for {what} is of type {t}, not a node"),
            ));
        }
        Ok(())
    }

    fn with_focus<T>(&mut self, t: ItemType, f: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        self.focus.push(Some(focus_of(t)));
        let out = f(self);
        self.focus.pop();
        out
    }

    fn visit(&mut self, expr: Expr) -> Result<Expr, Error> {
        let (id, loc, kind) = expr.into_parts();
        let checked = self.check(id, loc, kind).map_err(|e| e.with_location(loc))?;
        fold(checked)
    }

    fn visit_box(&mut self, expr: Box<Expr>) -> Result<Box<Expr>, Error> {
        self.visit(*expr).map(Box::new)
    }

    fn set_operand(&mut self, operand: Box<Expr>, op: SetOp) -> Result<Box<Expr>, Error> {
        let e = self.visit(*operand)?;
        let t = e.item_type();
        if matches!(t, ItemType::Atomic(_)) {
            return Err(Error::static_error(
                ErrorCode::XPTY0004,
                format!("operands of '{}' must be node sequences; supplied value has type {t}", op.name()),
            )
            .with_location(e.loc));
        }
        Ok(Box::new(if needs_sort(&e) { wrap(e, ExprKind::DocumentSort) } else { e }))
    }

    /// XPath 1.0 arithmetic operand: `number()` of the first item.
    fn compat_operand(e: Expr) -> Expr {
        if e.item_type() == ItemType::DOUBLE && e.cardinality() == Cardinality::EXACTLY_ONE {
            return e;
        }
        let loc = e.loc;
        let first = wrap(e, ExprKind::FirstItem);
        Expr::new(ExprKind::FunctionCall(FunctionCall {
            name: crate::compiler::build::name("number"),
            target: CallTarget::Builtin(crate::engine::functions::BuiltinFn::Number),
            args: vec![first],
            result: SequenceType::new(ItemType::DOUBLE, Cardinality::EXACTLY_ONE),
        }))
        .at(loc)
    }

    fn argument_type(&self, call: &FunctionCall, index: usize) -> (SequenceType, String) {
        match call.target {
            CallTarget::Builtin(f) => (f.param_type(index), format!("argument {} of {}()", index + 1, f.name())),
            CallTarget::User(i) => (
                self.decls.signature(i).and_then(|s| s.params.get(index).copied()).unwrap_or(SequenceType::ANY),
                format!("argument {} of function {}()", index + 1, call.name),
            ),
            CallTarget::Unresolved => (SequenceType::ANY, String::new()),
        }
    }

    fn set_inferred(&mut self, binding: Option<crate::compiler::binding::BindingId>, t: SequenceType) {
        if let Some(b) = binding.and_then(|id| self.bindings.get_mut(id)) {
            b.inferred = Some(t);
        }
    }

    #[allow(clippy::too_many_lines)]
    fn check(&mut self, id: NodeId, loc: Option<SourceLocation>, kind: ExprKind) -> Result<Expr, Error> {
        let node = move |kind: ExprKind| Expr::from_parts(id, loc, kind);
        Ok(match kind {
            k @ (ExprKind::Literal(_) | ExprKind::Fail(_)) => node(k),
            ExprKind::ContextItem(_) => node(ExprKind::ContextItem(self.require_focus("'.'")?)),
            ExprKind::Root => {
                self.require_node_focus("'/'")?;
                node(ExprKind::Root)
            }
            ExprKind::Axis(step) => {
                self.require_node_focus(&format!("the step {}::", step.axis.name()))?;
                node(ExprKind::Axis(step))
            }
            ExprKind::Slash { start, step } => {
                let start = self.visit(*start)?;
                let t = start.item_type();
                if matches!(t, ItemType::Atomic(_)) {
                    return Err(Error::static_error(
                        ErrorCode::XPTY0019,
                        format!("the first operand of '/' must be a node sequence; supplied value has type {t}"),
                    ));
                }
                let step = self.with_focus(t, |tc| tc.visit(*step))?;
                let sort = slash_needs_sort(&start, &step);
                let slash = node(ExprKind::Slash { start: Box::new(start), step: Box::new(step) });
                if sort { wrap(slash, ExprKind::DocumentSort) } else { slash }
            }
            ExprKind::Filter { base, predicate, .. } => {
                let base = self.visit(*base)?;
                let predicate = self.with_focus(base.item_type(), |tc| tc.visit(*predicate))?;
                let flags = filter_flags(&predicate);
                node(ExprKind::Filter { base: Box::new(base), predicate: Box::new(predicate), flags })
            }
            ExprKind::FirstItem(e) => node(ExprKind::FirstItem(self.visit_box(e)?)),
            ExprKind::LastItem(e) => node(ExprKind::LastItem(self.visit_box(e)?)),
            ExprKind::VarRef(mut r) => {
                if let Some(crate::compiler::ir::VarTarget::Local(b)) = r.target
                    && let Some(binding) = self.bindings.get(b)
                {
                    r.static_type = binding.static_type();
                }
                node(ExprKind::VarRef(r))
            }
            ExprKind::Let(l) => {
                let LetExpr { var, init, action, mode } = *l;
                let mut init = self.visit(init)?;
                if let Some(declared) = var.declared {
                    init = coerce(init, declared, &format!("the value of variable ${}", var.name))?;
                }
                self.set_inferred(var.binding, init.static_info().sequence_type());
                let action = self.visit(action)?;
                node(ExprKind::Let(Box::new(LetExpr { var, init, action, mode })))
            }
            ExprKind::For { var, seq, action } => {
                let mut seq = self.visit(*seq)?;
                if let Some(declared) = var.declared {
                    let each = SequenceType::new(declared.item_type, Cardinality::ZERO_OR_MORE);
                    seq = coerce(seq, each, &format!("the range of variable ${}", var.name))?;
                }
                self.set_inferred(var.binding, SequenceType::new(seq.item_type(), Cardinality::EXACTLY_ONE));
                let action = self.visit_box(action)?;
                node(ExprKind::For { var, seq: Box::new(seq), action })
            }
            ExprKind::Quantified { quantifier, var, seq, satisfies } => {
                let seq = self.visit(*seq)?;
                self.set_inferred(var.binding, SequenceType::new(seq.item_type(), Cardinality::EXACTLY_ONE));
                let satisfies = self.visit_box(satisfies)?;
                node(ExprKind::Quantified { quantifier, var, seq: Box::new(seq), satisfies })
            }
            ExprKind::If { condition, then, otherwise } => node(ExprKind::If {
                condition: self.visit_box(condition)?,
                then: self.visit_box(then)?,
                otherwise: self.visit_box(otherwise)?,
            }),
            ExprKind::Arithmetic { op, lhs, rhs, .. } => {
                let lhs = self.visit(*lhs)?;
                let rhs = self.visit(*rhs)?;
                if self.ctx.backwards_compatible {
                    let (lhs, rhs) = (Self::compat_operand(lhs), Self::compat_operand(rhs));
                    node(ExprKind::Arithmetic { op, lhs: Box::new(lhs), rhs: Box::new(rhs), compat: true })
                } else {
                    let required = SequenceType::atomic(AtomicType::Numeric, Cardinality::ZERO_OR_ONE);
                    let lhs = coerce(lhs, required, &operand_role("first", op.symbol()))?;
                    let rhs = coerce(rhs, required, &operand_role("second", op.symbol()))?;
                    node(ExprKind::Arithmetic { op, lhs: Box::new(lhs), rhs: Box::new(rhs), compat: false })
                }
            }
            ExprKind::ValueComparison { op, lhs, rhs } => {
                let lhs = self.comparison_operand(*lhs, op, "first")?;
                let rhs = self.comparison_operand(*rhs, op, "second")?;
                check_comparable(&lhs, &rhs, lhs.item_type(), rhs.item_type(), op.value_symbol())?;
                node(ExprKind::ValueComparison { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
            }
            ExprKind::GeneralComparison { op, lhs, rhs } => {
                let lhs = self.visit(*lhs)?;
                let rhs = self.visit(*rhs)?;
                let (a, b) = (atomized_type(lhs.item_type()), atomized_type(rhs.item_type()));
                check_comparable(&lhs, &rhs, a, b, op.general_symbol())?;
                node(ExprKind::GeneralComparison { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
            }
            ExprKind::Boolean { op, lhs, rhs } => {
                node(ExprKind::Boolean { op, lhs: self.visit_box(lhs)?, rhs: self.visit_box(rhs)? })
            }
            ExprKind::Venn { op, lhs, rhs } => {
                node(ExprKind::Venn { op, lhs: self.set_operand(lhs, op)?, rhs: self.set_operand(rhs, op)? })
            }
            ExprKind::SingletonIntersect { lhs, rhs } => {
                node(ExprKind::SingletonIntersect { lhs: self.visit_box(lhs)?, rhs: self.visit_box(rhs)? })
            }
            ExprKind::Range { start, end } => {
                let required = SequenceType::atomic(AtomicType::Integer, Cardinality::ZERO_OR_ONE);
                let start = coerce(self.visit(*start)?, required, &operand_role("first", "to"))?;
                let end = coerce(self.visit(*end)?, required, &operand_role("second", "to"))?;
                node(ExprKind::Range { start: Box::new(start), end: Box::new(end) })
            }
            ExprKind::Block(items) => {
                node(ExprKind::Block(items.into_iter().map(|e| self.visit(e)).collect::<Result<_, _>>()?))
            }
            ExprKind::FunctionCall(mut call) => {
                let args = std::mem::take(&mut call.args);
                let mut checked = Vec::with_capacity(args.len());
                for (i, arg) in args.into_iter().enumerate() {
                    let arg = self.visit(arg)?;
                    let (required, role) = self.argument_type(&call, i);
                    checked.push(coerce(arg, required, &role)?);
                }
                call.args = checked;
                if let CallTarget::Builtin(f) = call.target
                    && f.dependencies().intersects(Dependencies::POSITION | Dependencies::LAST)
                {
                    self.require_focus(&format!("{}()", f.name()))?;
                }
                node(ExprKind::FunctionCall(call))
            }
            ExprKind::InstanceOf { operand, target } => {
                node(ExprKind::InstanceOf { operand: self.visit_box(operand)?, target })
            }
            ExprKind::Atomize(e) => {
                let e = self.visit(*e)?;
                if matches!(e.item_type(), ItemType::Atomic(_) | ItemType::Empty) {
                    e
                } else {
                    node(ExprKind::Atomize(Box::new(e)))
                }
            }
            ExprKind::Convert { operand, target } => {
                node(ExprKind::Convert { operand: self.visit_box(operand)?, target })
            }
            ExprKind::CheckCardinality { operand, required, role } => {
                let e = self.visit(*operand)?;
                if required.contains(e.cardinality()) {
                    e
                } else {
                    node(ExprKind::CheckCardinality { operand: Box::new(e), required, role })
                }
            }
            ExprKind::CheckItemType { operand, required, role } => {
                let e = self.visit(*operand)?;
                if required.subsumes(e.item_type()) {
                    e
                } else {
                    node(ExprKind::CheckItemType { operand: Box::new(e), required, role })
                }
            }
            ExprKind::DocumentSort(e) => {
                let e = self.visit(*e)?;
                if needs_sort(&e) { node(ExprKind::DocumentSort(Box::new(e))) } else { e }
            }
        })
    }

    fn comparison_operand(&mut self, e: Expr, op: CompOp, which: &str) -> Result<Expr, Error> {
        let e = self.visit(e)?;
        let required = SequenceType::atomic(AtomicType::AnyAtomic, Cardinality::ZERO_OR_ONE);
        let e = coerce(e, required, &operand_role(which, op.value_symbol()))?;
        if e.item_type() == ItemType::Atomic(AtomicType::UntypedAtomic) {
            return Ok(wrap(e, |operand| ExprKind::Convert { operand, target: AtomicType::String }));
        }
        Ok(e)
    }
}

fn operand_role(which: &str, symbol: &str) -> String {
    format!("the {which} operand of '{symbol}'")
}

/// Type check a resolved unit and recount variable references.
pub(crate) fn check(
    expr: Expr,
    ctx: &StaticContext,
    decls: &Declarations,
    bindings: &mut Bindings,
) -> Result<Expr, Error> {
    let mut checker = TypeChecker { ctx, decls, bindings, focus: vec![ctx.context_item_type] };
    let expr = checker.visit(expr)?;
    analysis::count_references(&expr, checker.bindings);
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::build::{add, call, child, dot, filter, int, string};
    use crate::compiler::ir::ArithOp;
    use crate::compiler::resolve::resolve;
    use crate::engine::runtime::StaticContextBuilder;

    fn checked(expr: Expr, ctx: &StaticContext) -> Result<Expr, Error> {
        let mut bindings = Bindings::new();
        let decls = Declarations::default();
        let (expr, _) = resolve(expr, &[], ctx, &decls, &mut bindings).map_err(|e| e.0[0].clone())?;
        check(expr, ctx, &decls, &mut bindings)
    }

    #[test]
    fn absent_focus_is_a_static_error() {
        let ctx = StaticContextBuilder::new().without_context_item().build();
        let err = checked(dot(), &ctx).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPDY0002);
        assert!(err.is_static());
    }

    #[test]
    fn axis_on_atomic_focus() {
        let ctx = StaticContextBuilder::new().with_context_item_type(ItemType::INTEGER).build();
        let err = checked(child("a"), &ctx).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0020);
    }

    #[test]
    fn string_plus_integer_is_rejected() {
        let err = checked(add(string("a"), int(1)), &StaticContext::default()).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    }

    #[test]
    fn predicate_classification() {
        let e = checked(filter(child("a"), call("position", vec![])), &StaticContext::default()).unwrap();
        let ExprKind::Filter { flags, .. } = e.kind() else { panic!("expected filter, got {e}") };
        assert!(flags.contains(FilterFlags::POSITIONAL));
        assert!(!flags.contains(FilterFlags::INDEPENDENT));

        let e = checked(filter(child("a"), child("b")), &StaticContext::default()).unwrap();
        let ExprKind::Filter { flags, .. } = e.kind() else { panic!("expected filter, got {e}") };
        assert!(!flags.contains(FilterFlags::POSITIONAL));
    }

    #[test]
    fn arithmetic_ops_render_their_symbol() {
        assert_eq!(operand_role("first", ArithOp::IDiv.symbol()), "the first operand of 'idiv'");
    }
}
