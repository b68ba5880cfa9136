//! Per-kind evaluation of expression trees.
//!
//! [`iterate`] is the general entry point and returns a lazy cursor.
//! [`evaluate_item`], [`effective_boolean_value`] and [`process`] are the
//! cheaper paths for scalar, boolean and push-mode consumers. Chains of `let`
//! expressions are bound in a loop rather than by recursion.

pub(crate) mod axes;
mod comparison;
pub(crate) mod cursors;
mod filter;
pub(crate) mod numeric;
mod set_ops;

use std::rc::Rc;

use self::axes::AxisIter;
use self::cursors::{
    AtomizeIter, BlockIter, CardinalityCheckIter, ConvertIter, ForIter, ItemCheckIter, SlashIter, cast_untyped,
    decl_slot, document_sort,
};
use self::filter::FilterIter;
use self::set_ops::MergeIter;
use crate::compiler::ir::{
    BoolOp, CallTarget, EvaluationMode, Expr, ExprKind, FilterFlags, FunctionCall, LetExpr, Quantifier, VarDecl,
    VarRef, VarTarget,
};
use crate::compiler::package::{GlobalKind, GlobalVariable, Package};
use crate::consts::MAX_SEQUENCE_LENGTH;
use crate::engine::context::{EvalContext, GlobalState};
use crate::engine::functions;
use crate::engine::iter::{
    EmptyIter, ErrorIter, GroundedIter, LiteralIter, RangeIter, SeqIter, SequenceIterator, drain, optional, single,
    zero_or_one,
};
use crate::engine::runtime::{Error, ErrorCode, Receiver};
use crate::engine::value::Value;
use crate::model::{NodeKind, XdmNode};
use crate::types::{AtomicType, SequenceType};
use crate::xdm::{XdmAtomicValue, XdmItem};

/// Evaluate `expr` to a lazy cursor. Errors raised while setting up the
/// cursor carry the location of `expr` unless a nested one is known.
pub(crate) fn iterate<'a, N: XdmNode>(expr: &'a Expr, ctx: &EvalContext<'a, N>) -> Result<SeqIter<'a, N>, Error> {
    iterate_kind(expr, ctx).map_err(|e| e.with_location(expr.loc))
}

fn iterate_kind<'a, N: XdmNode>(expr: &'a Expr, ctx: &EvalContext<'a, N>) -> Result<SeqIter<'a, N>, Error> {
    match expr.kind() {
        ExprKind::Literal(values) if values.is_empty() => Ok(Box::new(EmptyIter)),
        ExprKind::Literal(values) => Ok(Box::new(LiteralIter::new(values))),
        ExprKind::ContextItem(_) => Ok(single(ctx.context_item()?.clone())),
        ExprKind::Root => Ok(single(XdmItem::Node(root_of(ctx)?))),
        ExprKind::Axis(step) => Ok(Box::new(AxisIter::new(ctx.context_node()?.clone(), step))),
        ExprKind::Slash { start, step } => Ok(Box::new(SlashIter::new(expr, iterate(start, ctx)?, step, ctx)?)),
        ExprKind::Filter { base, predicate, flags } => {
            let base_iter = iterate(base, ctx)?;
            if flags.contains(FilterFlags::INDEPENDENT) {
                filter::independent(base_iter, predicate, ctx)
            } else {
                Ok(Box::new(FilterIter::new(expr, base_iter, predicate, *flags, ctx)?))
            }
        }
        ExprKind::FirstItem(e) => Ok(optional(evaluate_item(e, ctx)?)),
        ExprKind::LastItem(e) => {
            let mut it = iterate(e, ctx)?;
            let mut last = None;
            while let Some(item) = it.next_item() {
                last = Some(item?);
            }
            Ok(optional(last))
        }
        ExprKind::VarRef(r) => variable(r, ctx),
        ExprKind::Let(_) => {
            let (body, inner) = bind_let_chain(expr, ctx)?;
            iterate(body, &inner)
        }
        ExprKind::For { var, seq, action } => Ok(Box::new(ForIter::new(expr, iterate(seq, ctx)?, var, action, ctx)?)),
        ExprKind::Quantified { quantifier, var, seq, satisfies } => {
            Ok(boolean(quantified(*quantifier, var, seq, satisfies, ctx)?))
        }
        ExprKind::If { condition, then, otherwise } => {
            if effective_boolean_value(condition, ctx)? {
                iterate(then, ctx)
            } else {
                iterate(otherwise, ctx)
            }
        }
        ExprKind::Arithmetic { op, lhs, rhs, compat } => {
            let a = atomic_operand(lhs, ctx)?;
            let b = atomic_operand(rhs, ctx)?;
            match (a, b) {
                (Some(a), Some(b)) => Ok(single(XdmItem::Atomic(numeric::arithmetic(*op, &a, &b)?))),
                _ if *compat => Ok(single(XdmItem::Atomic(XdmAtomicValue::Double(f64::NAN)))),
                _ => Ok(Box::new(EmptyIter)),
            }
        }
        ExprKind::ValueComparison { op, lhs, rhs } => {
            let a = atomic_operand(lhs, ctx)?;
            let b = atomic_operand(rhs, ctx)?;
            let (Some(a), Some(b)) = (a, b) else {
                return Ok(Box::new(EmptyIter));
            };
            Ok(boolean(comparison::compare_atomic(*op, &a, &b)?))
        }
        ExprKind::GeneralComparison { op, lhs, rhs } => {
            Ok(boolean(comparison::general_compare(*op, iterate(lhs, ctx)?, iterate(rhs, ctx)?)?))
        }
        ExprKind::Boolean { op, lhs, rhs } => {
            let a = effective_boolean_value(lhs, ctx)?;
            let v = match op {
                BoolOp::And => a && effective_boolean_value(rhs, ctx)?,
                BoolOp::Or => a || effective_boolean_value(rhs, ctx)?,
            };
            Ok(boolean(v))
        }
        ExprKind::Venn { op, lhs, rhs } => Ok(Box::new(MergeIter::new(*op, iterate(lhs, ctx)?, iterate(rhs, ctx)?))),
        ExprKind::SingletonIntersect { lhs, rhs } => {
            let candidate = evaluate_item(lhs, ctx)?;
            if candidate.is_none() {
                return Ok(Box::new(EmptyIter));
            }
            Ok(optional(set_ops::singleton_member(candidate, iterate(rhs, ctx)?)?))
        }
        ExprKind::Range { start, end } => range(start, end, ctx),
        ExprKind::Block(members) => Ok(Box::new(BlockIter::new(members, ctx))),
        ExprKind::FunctionCall(call) => call_function(call, ctx),
        ExprKind::InstanceOf { operand, target } => Ok(boolean(instance_of(operand, *target, ctx)?)),
        ExprKind::Atomize(e) => Ok(Box::new(AtomizeIter::new(iterate(e, ctx)?))),
        ExprKind::Convert { operand, target } => Ok(Box::new(ConvertIter::new(iterate(operand, ctx)?, *target))),
        ExprKind::CheckCardinality { operand, required, role } => {
            Ok(Box::new(CardinalityCheckIter::new(iterate(operand, ctx)?, *required, role.as_str())))
        }
        ExprKind::CheckItemType { operand, required, role } => {
            Ok(Box::new(ItemCheckIter::new(iterate(operand, ctx)?, *required, role.as_str())))
        }
        ExprKind::DocumentSort(e) => document_sort(iterate(e, ctx)?),
        ExprKind::Fail(e) => Ok(Box::new(ErrorIter::new(e.clone()))),
    }
}

/// First item of the value of `expr`; later items are never computed.
pub(crate) fn evaluate_item<'a, N: XdmNode>(
    expr: &'a Expr,
    ctx: &EvalContext<'a, N>,
) -> Result<Option<XdmItem<N>>, Error> {
    match expr.kind() {
        ExprKind::Literal(values) => Ok(values.first().cloned().map(XdmItem::Atomic)),
        ExprKind::ContextItem(_) => Ok(Some(ctx.context_item().map_err(|e| e.with_location(expr.loc))?.clone())),
        _ => {
            let mut it = iterate(expr, ctx)?;
            let first = it.next_item().transpose()?;
            it.close();
            Ok(first)
        }
    }
}

fn atomic_ebv(v: &XdmAtomicValue) -> Result<bool, Error> {
    match v {
        XdmAtomicValue::Boolean(b) => Ok(*b),
        XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::AnyUri(s) => Ok(!s.is_empty()),
        n if n.is_numeric() => Ok(n.as_f64().is_some_and(|d| d != 0.0 && !d.is_nan())),
        other => Err(Error::from_code(
            ErrorCode::FORG0006,
            format!("effective boolean value is not defined for {}", other.atomic_type().name()),
        )),
    }
}

/// Effective boolean value: pulls at most two items.
pub(crate) fn effective_boolean_value<'a, N: XdmNode>(expr: &'a Expr, ctx: &EvalContext<'a, N>) -> Result<bool, Error> {
    let mut it = iterate(expr, ctx)?;
    let Some(first) = it.next_item().transpose()? else {
        return Ok(false);
    };
    let atomic = match first {
        XdmItem::Node(_) => {
            it.close();
            return Ok(true);
        }
        XdmItem::Atomic(a) => a,
    };
    let more = it.next_item().transpose()?.is_some();
    it.close();
    if more {
        return Err(Error::from_code(
            ErrorCode::FORG0006,
            "effective boolean value is not defined for a sequence of two or more items starting with an atomic value",
        )
        .with_location(expr.loc));
    }
    atomic_ebv(&atomic).map_err(|e| e.with_location(expr.loc))
}

/// Push the value of `expr` into `out`. Sequence constructors, conditionals
/// and bindings forward their parts without building intermediate cursors.
pub(crate) fn process<'a, N: XdmNode>(
    expr: &'a Expr,
    ctx: &EvalContext<'a, N>,
    out: &mut dyn Receiver<N>,
) -> Result<(), Error> {
    match expr.kind() {
        ExprKind::Block(members) => {
            for m in members {
                process(m, ctx, out)?;
            }
            Ok(())
        }
        ExprKind::If { condition, then, otherwise } => {
            let branch = if effective_boolean_value(condition, ctx)? { then } else { otherwise };
            process(branch, ctx, out)
        }
        ExprKind::Let(_) => {
            let (body, inner) = bind_let_chain(expr, ctx)?;
            process(body, &inner, out)
        }
        ExprKind::For { var, seq, action } => {
            let slot = decl_slot(var)?;
            let mut it = iterate(seq, ctx)?;
            let mut inner = ctx.clone();
            while let Some(item) = it.next_item() {
                inner.set_local(slot, Value::grounded(vec![item?]))?;
                process(action, &inner, out)?;
            }
            Ok(())
        }
        _ => {
            let mut it = iterate(expr, ctx)?;
            while let Some(item) = it.next_item() {
                out.append(item?)?;
            }
            Ok(())
        }
    }
}

fn boolean<'a, N: XdmNode>(b: bool) -> SeqIter<'a, N> {
    single(XdmItem::Atomic(XdmAtomicValue::Boolean(b)))
}

fn root_of<N: XdmNode>(ctx: &EvalContext<'_, N>) -> Result<N, Error> {
    let root = ctx.context_node()?.root();
    if root.kind() == NodeKind::Document {
        Ok(root)
    } else {
        Err(Error::from_code(
            ErrorCode::XPDY0050,
            "the root of the tree containing the context item is not a document node",
        ))
    }
}

/// Atomized operand of a scalar operator: at most one atomic value.
fn atomic_operand<'a, N: XdmNode>(expr: &'a Expr, ctx: &EvalContext<'a, N>) -> Result<Option<XdmAtomicValue>, Error> {
    let mut it: SeqIter<'a, N> = Box::new(AtomizeIter::new(iterate(expr, ctx)?));
    Ok(zero_or_one(&mut it, "an operand of an operator")?.and_then(|i| match i {
        XdmItem::Atomic(a) => Some(a),
        XdmItem::Node(_) => None,
    }))
}

fn ref_slot(r: &VarRef) -> Result<usize, Error> {
    r.slot.ok_or_else(|| Error::from_code(ErrorCode::XPST0008, format!("variable ${} has no stack frame slot", r.name)))
}

fn variable<'a, N: XdmNode>(r: &'a VarRef, ctx: &EvalContext<'a, N>) -> Result<SeqIter<'a, N>, Error> {
    match r.target {
        Some(VarTarget::Local(_)) => ctx.local(ref_slot(r)?)?.iterate(),
        Some(VarTarget::Global(index)) => Ok(Box::new(GroundedIter::new(global_value(index, ctx)?))),
        None => Err(Error::from_code(ErrorCode::XPST0008, format!("variable ${} has not been declared", r.name))),
    }
}

fn let_value<'a, N: XdmNode>(l: &'a LetExpr, ctx: &EvalContext<'a, N>) -> Result<Value<'a, N>, Error> {
    let memo = || Value::memo(&l.init, ctx.clone(), false);
    Ok(match l.mode {
        EvaluationMode::NoEvaluationNeeded => match l.init.as_literal() {
            Some(values) => Value::grounded(values.iter().cloned().map(XdmItem::Atomic).collect()),
            None => memo(),
        },
        EvaluationMode::Variable => match l.init.kind() {
            ExprKind::VarRef(r) if matches!(r.target, Some(VarTarget::Local(_))) => ctx.local(ref_slot(r)?)?.clone(),
            _ => memo(),
        },
        EvaluationMode::Lazy => Value::closure(&l.init, ctx.clone()),
        EvaluationMode::Memo => memo(),
        EvaluationMode::Indexed => Value::memo(&l.init, ctx.clone(), true),
        EvaluationMode::Eager => {
            let mut it = iterate(&l.init, ctx)?;
            Value::grounded(drain(&mut it)?)
        }
    })
}

/// Bind every `let` of a chain and return the innermost action with the
/// context it must be evaluated in.
fn bind_let_chain<'a, N: XdmNode>(
    expr: &'a Expr,
    ctx: &EvalContext<'a, N>,
) -> Result<(&'a Expr, EvalContext<'a, N>), Error> {
    let mut ctx = ctx.clone();
    let mut current = expr;
    while let ExprKind::Let(l) = current.kind() {
        let value = let_value(l, &ctx).map_err(|e| e.with_location(current.loc))?;
        ctx.set_local(decl_slot(&l.var)?, value)?;
        current = &l.action;
    }
    Ok((current, ctx))
}

fn quantified<'a, N: XdmNode>(
    quantifier: Quantifier,
    var: &'a VarDecl,
    seq: &'a Expr,
    satisfies: &'a Expr,
    ctx: &EvalContext<'a, N>,
) -> Result<bool, Error> {
    let slot = decl_slot(var)?;
    let decisive = quantifier == Quantifier::Some;
    let mut it = iterate(seq, ctx)?;
    let mut inner = ctx.clone();
    while let Some(item) = it.next_item() {
        inner.set_local(slot, Value::grounded(vec![item?]))?;
        if effective_boolean_value(satisfies, &inner)? == decisive {
            it.close();
            return Ok(decisive);
        }
    }
    Ok(!decisive)
}

fn instance_of<'a, N: XdmNode>(
    operand: &'a Expr,
    target: SequenceType,
    ctx: &EvalContext<'a, N>,
) -> Result<bool, Error> {
    let mut it = iterate(operand, ctx)?;
    let mut n = 0usize;
    while let Some(item) = it.next_item() {
        let item = item?;
        n += 1;
        if !target.item_type.matches(&item) || (n > 1 && !target.cardinality.allows_many()) {
            it.close();
            return Ok(false);
        }
    }
    Ok(target.cardinality.admits(n))
}

fn not_integer(v: &XdmAtomicValue) -> Error {
    Error::from_code(
        ErrorCode::XPTY0004,
        format!("an operand of 'to' must be xs:integer, supplied value has type {}", v.atomic_type().name()),
    )
}

fn integer_bound<'a, N: XdmNode>(expr: &'a Expr, ctx: &EvalContext<'a, N>) -> Result<Option<i64>, Error> {
    match atomic_operand(expr, ctx)? {
        None => Ok(None),
        Some(XdmAtomicValue::Integer(i)) => Ok(Some(i)),
        Some(XdmAtomicValue::UntypedAtomic(s)) => match cast_untyped(&s, AtomicType::Integer)? {
            XdmAtomicValue::Integer(i) => Ok(Some(i)),
            other => Err(not_integer(&other)),
        },
        Some(other) => Err(not_integer(&other)),
    }
}

fn range<'a, N: XdmNode>(start: &'a Expr, end: &'a Expr, ctx: &EvalContext<'a, N>) -> Result<SeqIter<'a, N>, Error> {
    let (Some(a), Some(b)) = (integer_bound(start, ctx)?, integer_bound(end, ctx)?) else {
        return Ok(Box::new(EmptyIter));
    };
    if a > b {
        return Ok(Box::new(EmptyIter));
    }
    if i128::from(b) - i128::from(a) + 1 > i128::from(MAX_SEQUENCE_LENGTH) {
        return Err(Error::from_code(
            ErrorCode::XPDY0130,
            format!("the range {a} to {b} exceeds the maximum sequence length {MAX_SEQUENCE_LENGTH}"),
        ));
    }
    Ok(Box::new(RangeIter::new(a, b)))
}

fn call_function<'a, N: XdmNode>(call: &'a FunctionCall, ctx: &EvalContext<'a, N>) -> Result<SeqIter<'a, N>, Error> {
    match call.target {
        CallTarget::Builtin(f) => functions::call(f, &call.args, ctx),
        CallTarget::User(index) => {
            let package: &'a Package = ctx.shared.package;
            let Some(f) = package.function(index) else {
                return Err(Error::from_code(
                    ErrorCode::XPST0017,
                    format!("function {} is not declared in this package", call.name),
                ));
            };
            let mut inner = ctx.major(f.frame_size, &f.name)?;
            for (param, arg) in f.params.iter().zip(&call.args) {
                inner.set_local(decl_slot(param)?, Value::memo(arg, ctx.clone(), false))?;
            }
            iterate(&f.body, &inner)
        }
        CallTarget::Unresolved => {
            Err(Error::from_code(ErrorCode::XPST0017, format!("call to {}() was never resolved", call.name)))
        }
    }
}

/// Value of a global variable, computed on first use within this evaluation.
fn global_value<'a, N: XdmNode>(index: usize, ctx: &EvalContext<'a, N>) -> Result<Rc<[XdmItem<N>]>, Error> {
    {
        let mut globals = ctx.shared.globals.borrow_mut();
        let Some(state) = globals.get_mut(index) else {
            return Err(Error::from_code(ErrorCode::XPST0008, format!("no global variable in slot {index}")));
        };
        match state {
            GlobalState::Ready(items) => return Ok(items.clone()),
            GlobalState::Evaluating => {
                let name = ctx.shared.package.global(index).map(|g| g.name.to_string()).unwrap_or_default();
                return Err(Error::from_code(
                    ErrorCode::XTDE0640,
                    format!("circular definition: global variable ${name} depends on its own value"),
                ));
            }
            GlobalState::Unevaluated => {}
        }
        *state = GlobalState::Evaluating;
    }
    let result = compute_global(index, ctx);
    if let Some(state) = ctx.shared.globals.borrow_mut().get_mut(index) {
        *state = match &result {
            Ok(items) => GlobalState::Ready(items.clone()),
            Err(_) => GlobalState::Unevaluated,
        };
    }
    result
}

fn compute_global<'a, N: XdmNode>(index: usize, ctx: &EvalContext<'a, N>) -> Result<Rc<[XdmItem<N>]>, Error> {
    let package: &'a Package = ctx.shared.package;
    let Some(global) = package.global(index) else {
        return Err(Error::from_code(ErrorCode::XPST0008, format!("no global variable in slot {index}")));
    };
    let evaluate = |select: &'a Expr| -> Result<Rc<[XdmItem<N>]>, Error> {
        let inner = ctx.for_global(global.frame_size);
        let mut it = iterate(select, &inner)?;
        Ok(Rc::from(drain(&mut it)?))
    };
    match &global.kind {
        GlobalKind::Variable(select) => evaluate(select),
        GlobalKind::Param { default } => {
            if let Some(value) = ctx.shared.dynamic.variables.get(&global.name) {
                check_supplied(global, value)?;
                return Ok(Rc::from(value.as_slice()));
            }
            match default {
                Some(select) => evaluate(select),
                None => Err(Error::from_code(
                    ErrorCode::XTDE0050,
                    format!("no value supplied for required parameter ${}", global.name),
                )),
            }
        }
    }
}

fn check_supplied<N: XdmNode>(global: &GlobalVariable, value: &[XdmItem<N>]) -> Result<(), Error> {
    let Some(declared) = global.declared else {
        return Ok(());
    };
    let mismatch = |what: String| {
        Error::from_code(ErrorCode::XPTY0004, format!("supplied value of parameter ${} {what}", global.name))
    };
    if !declared.cardinality.admits(value.len()) {
        return Err(mismatch(format!(
            "has {} items; required cardinality is {}",
            value.len(),
            declared.cardinality.describe()
        )));
    }
    if let Some(bad) = value.iter().find(|i| !declared.item_type.matches(*i)) {
        let found = match bad {
            XdmItem::Node(n) => n.kind().test_name().to_string(),
            XdmItem::Atomic(a) => a.atomic_type().name().to_string(),
        };
        return Err(mismatch(format!("contains {found}; required item type is {}", declared.item_type)));
    }
    Ok(())
}
