//! Builders for unresolved expression trees.
//!
//! Front ends (and tests) assemble trees with these functions and hand them
//! to the compiler. Variable references and function calls are left
//! unresolved; plain `&str` names have no namespace.

use crate::compiler::ir::{
    ArithOp, Axis, AxisStep, BoolOp, CallTarget, CompOp, EvaluationMode, Expr, ExprKind, FilterFlags, FunctionCall,
    LetExpr, NodeTest, Quantifier, SetOp, VarDecl, VarRef,
};
use crate::engine::runtime::SourceLocation;
use crate::model::NodeKind;
use crate::types::{ItemType, SequenceType};
use crate::xdm::{ExpandedName, XdmAtomicValue};

pub fn name(local: &str) -> ExpandedName {
    ExpandedName::new(None, local)
}

pub fn literal(values: Vec<XdmAtomicValue>) -> Expr {
    Expr::new(ExprKind::Literal(values))
}

pub fn int(i: i64) -> Expr {
    literal(vec![XdmAtomicValue::Integer(i)])
}

pub fn ints(values: impl IntoIterator<Item = i64>) -> Expr {
    literal(values.into_iter().map(XdmAtomicValue::Integer).collect())
}

pub fn double(d: f64) -> Expr {
    literal(vec![XdmAtomicValue::Double(d)])
}

pub fn string(s: &str) -> Expr {
    literal(vec![XdmAtomicValue::String(s.to_string())])
}

pub fn untyped(s: &str) -> Expr {
    literal(vec![XdmAtomicValue::UntypedAtomic(s.to_string())])
}

pub fn boolean(b: bool) -> Expr {
    literal(vec![XdmAtomicValue::Boolean(b)])
}

pub fn empty() -> Expr {
    Expr::empty()
}

/// The context item `.`.
pub fn dot() -> Expr {
    Expr::new(ExprKind::ContextItem(ItemType::AnyItem))
}

/// `/`: the document node at the root of the context node's tree.
pub fn root() -> Expr {
    Expr::new(ExprKind::Root)
}

pub fn step(axis: Axis, test: NodeTest) -> Expr {
    Expr::new(ExprKind::Axis(AxisStep { axis, test }))
}

/// `axis::local` with the axis' principal node kind.
pub fn named(axis: Axis, local: &str) -> Expr {
    step(axis, NodeTest::Name { kind: axis.principal_kind(), name: name(local) })
}

pub fn child(local: &str) -> Expr {
    named(Axis::Child, local)
}

pub fn descendant(local: &str) -> Expr {
    named(Axis::Descendant, local)
}

pub fn attribute(local: &str) -> Expr {
    named(Axis::Attribute, local)
}

pub fn kind_step(axis: Axis, kind: NodeKind) -> Expr {
    step(axis, NodeTest::Kind(kind))
}

/// `axis::node()`
pub fn any_node(axis: Axis) -> Expr {
    step(axis, NodeTest::AnyNode)
}

/// `start/step`
pub fn path(start: Expr, step: Expr) -> Expr {
    Expr::new(ExprKind::Slash { start: Box::new(start), step: Box::new(step) })
}

/// `start//step`, expanded the usual way through `descendant-or-self::node()`.
pub fn descendant_path(start: Expr, step: Expr) -> Expr {
    path(path(start, any_node(Axis::DescendantOrSelf)), step)
}

pub fn filter(base: Expr, predicate: Expr) -> Expr {
    Expr::new(ExprKind::Filter { base: Box::new(base), predicate: Box::new(predicate), flags: FilterFlags::empty() })
}

pub fn var(local: &str) -> Expr {
    var_q(name(local))
}

pub fn var_q(name: ExpandedName) -> Expr {
    Expr::new(ExprKind::VarRef(VarRef { name, target: None, static_type: SequenceType::ANY, slot: None }))
}

pub fn let_in(local: &str, init: Expr, action: Expr) -> Expr {
    let_decl(VarDecl::new(name(local), None), init, action)
}

/// `let $local as declared := init return action`
pub fn let_typed(local: &str, declared: SequenceType, init: Expr, action: Expr) -> Expr {
    let_decl(VarDecl::new(name(local), Some(declared)), init, action)
}

fn let_decl(var: VarDecl, init: Expr, action: Expr) -> Expr {
    Expr::new(ExprKind::Let(Box::new(LetExpr { var, init, action, mode: EvaluationMode::default() })))
}

pub fn for_in(local: &str, seq: Expr, action: Expr) -> Expr {
    Expr::new(ExprKind::For { var: VarDecl::new(name(local), None), seq: Box::new(seq), action: Box::new(action) })
}

fn quantified(quantifier: Quantifier, local: &str, seq: Expr, satisfies: Expr) -> Expr {
    Expr::new(ExprKind::Quantified {
        quantifier,
        var: VarDecl::new(name(local), None),
        seq: Box::new(seq),
        satisfies: Box::new(satisfies),
    })
}

pub fn some(local: &str, seq: Expr, satisfies: Expr) -> Expr {
    quantified(Quantifier::Some, local, seq, satisfies)
}

pub fn every(local: &str, seq: Expr, satisfies: Expr) -> Expr {
    quantified(Quantifier::Every, local, seq, satisfies)
}

pub fn if_then_else(condition: Expr, then: Expr, otherwise: Expr) -> Expr {
    Expr::new(ExprKind::If { condition: Box::new(condition), then: Box::new(then), otherwise: Box::new(otherwise) })
}

pub fn arith(op: ArithOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::Arithmetic { op, lhs: Box::new(lhs), rhs: Box::new(rhs), compat: false })
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    arith(ArithOp::Add, lhs, rhs)
}

pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    arith(ArithOp::Sub, lhs, rhs)
}

pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    arith(ArithOp::Mul, lhs, rhs)
}

pub fn div(lhs: Expr, rhs: Expr) -> Expr {
    arith(ArithOp::Div, lhs, rhs)
}

pub fn value_cmp(op: CompOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::ValueComparison { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

pub fn general_cmp(op: CompOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::GeneralComparison { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

/// `lhs = rhs`
pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    general_cmp(CompOp::Eq, lhs, rhs)
}

pub fn and(lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::Boolean { op: BoolOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

pub fn or(lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::Boolean { op: BoolOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

pub fn venn(op: SetOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::Venn { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
}

pub fn union(lhs: Expr, rhs: Expr) -> Expr {
    venn(SetOp::Union, lhs, rhs)
}

pub fn intersect(lhs: Expr, rhs: Expr) -> Expr {
    venn(SetOp::Intersect, lhs, rhs)
}

pub fn except(lhs: Expr, rhs: Expr) -> Expr {
    venn(SetOp::Except, lhs, rhs)
}

/// `start to end`
pub fn range(start: Expr, end: Expr) -> Expr {
    Expr::new(ExprKind::Range { start: Box::new(start), end: Box::new(end) })
}

/// Comma operator.
pub fn seq(items: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Block(items))
}

/// Call of a function in the default function namespace.
pub fn call(local: &str, args: Vec<Expr>) -> Expr {
    call_q(name(local), args)
}

pub fn call_q(name: ExpandedName, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::FunctionCall(FunctionCall {
        name,
        target: CallTarget::Unresolved,
        args,
        result: SequenceType::ANY,
    }))
}

pub fn instance_of(operand: Expr, target: SequenceType) -> Expr {
    Expr::new(ExprKind::InstanceOf { operand: Box::new(operand), target })
}

/// Attach a source position; errors raised by the node report it.
pub fn located(expr: Expr, line: u32, column: u32) -> Expr {
    expr.at(Some(SourceLocation { line, column }))
}
