//! Readable rendering of expression trees.
//!
//! The output is XPath-like but not meant to be parsed back: nodes inserted
//! by the compiler (atomization, conversions, run-time checks, sorts) are
//! shown as pseudo-functions.

use core::fmt;

use itertools::Itertools;

use crate::compiler::ir::{BoolOp, CallTarget, Expr, ExprKind, NodeTest, Quantifier, SetOp};

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::AnyNode => f.write_str("node()"),
            NodeTest::Kind(k) => f.write_str(k.test_name()),
            NodeTest::Name { name, .. } => write!(f, "{name}"),
            NodeTest::Combined { op, lhs, rhs } => {
                let sym = match op {
                    SetOp::Union => "|",
                    SetOp::Intersect => "intersect",
                    SetOp::Except => "except",
                };
                write!(f, "({lhs} {sym} {rhs})")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Literal(values) => match values.as_slice() {
                [single] => write!(f, "{single}"),
                many => write!(f, "({})", many.iter().join(", ")),
            },
            ExprKind::ContextItem(_) => f.write_str("."),
            ExprKind::Root => f.write_str("root()"),
            ExprKind::Axis(step) => write!(f, "{}::{}", step.axis.name(), step.test),
            ExprKind::Slash { start, step } => write!(f, "{start}/{step}"),
            ExprKind::Filter { base, predicate, .. } => write!(f, "{base}[{predicate}]"),
            ExprKind::FirstItem(e) => write!(f, "first-item({e})"),
            ExprKind::LastItem(e) => write!(f, "last-item({e})"),
            ExprKind::VarRef(r) => write!(f, "${}", r.name),
            ExprKind::Let(l) => write!(f, "let ${} := {} return {}", l.var.name, l.init, l.action),
            ExprKind::For { var, seq, action } => write!(f, "for ${} in {seq} return {action}", var.name),
            ExprKind::Quantified { quantifier, var, seq, satisfies } => {
                let q = if *quantifier == Quantifier::Some { "some" } else { "every" };
                write!(f, "{q} ${} in {seq} satisfies {satisfies}", var.name)
            }
            ExprKind::If { condition, then, otherwise } => {
                write!(f, "if ({condition}) then {then} else {otherwise}")
            }
            ExprKind::Arithmetic { op, lhs, rhs, .. } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            ExprKind::ValueComparison { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.value_symbol()),
            ExprKind::GeneralComparison { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.general_symbol()),
            ExprKind::Boolean { op, lhs, rhs } => {
                let sym = if *op == BoolOp::And { "and" } else { "or" };
                write!(f, "({lhs} {sym} {rhs})")
            }
            ExprKind::Venn { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.name()),
            ExprKind::SingletonIntersect { lhs, rhs } => write!(f, "({lhs} intersect {rhs})"),
            ExprKind::Range { start, end } => write!(f, "({start} to {end})"),
            ExprKind::Block(items) => write!(f, "({})", items.iter().join(", ")),
            ExprKind::FunctionCall(call) => {
                let args = call.args.iter().join(", ");
                match call.target {
                    CallTarget::Builtin(b) => write!(f, "{}({args})", b.name()),
                    CallTarget::User(_) | CallTarget::Unresolved => write!(f, "{}({args})", call.name),
                }
            }
            ExprKind::InstanceOf { operand, target } => write!(f, "({operand} instance of {target})"),
            ExprKind::Atomize(e) => write!(f, "data({e})"),
            ExprKind::Convert { operand, target } => write!(f, "convert({operand} as {})", target.name()),
            ExprKind::CheckCardinality { operand, required, .. } => {
                write!(f, "check({operand} as {})", required.describe())
            }
            ExprKind::CheckItemType { operand, required, .. } => write!(f, "treat({operand} as {required})"),
            ExprKind::DocumentSort(e) => write!(f, "document-order({e})"),
            ExprKind::Fail(err) => write!(f, "error(\"{}\")", err.format_code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::build::{attribute, child, filter, int, let_in, path, range, string, union, var};

    #[test]
    fn renders_paths_and_bindings() {
        let e = let_in("x", int(1), path(child("a"), filter(child("b"), var("x"))));
        assert_eq!(e.to_string(), "let $x := 1 return child::a/child::b[$x]");
    }

    #[test]
    fn renders_operators() {
        assert_eq!(range(int(1), int(3)).to_string(), "(1 to 3)");
        assert_eq!(union(child("a"), attribute("id")).to_string(), "(child::a union attribute::id)");
        assert_eq!(string("it\"s").to_string(), "\"it\"\"s\"");
    }
}
