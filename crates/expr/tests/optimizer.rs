//! Rewrites visible through `explain()`, checked against unoptimized
//! evaluation of the same expression.

use std::sync::{Arc, OnceLock};

use xslt_expr::compiler::build::*;
use xslt_expr::compiler::ir::{CompOp, Expr};
use xslt_expr::{
    CompiledExpression, DynamicContextBuilder, ExpressionCompiler, OptimizerOptions, Package, PackageBuilder,
    SequenceType, SimpleNode, StaticContext, StaticContextBuilder, XdmAtomicValue, XdmItem, XdmNode, attr, elem,
    simple_doc,
};

type N = SimpleNode;

/// The `r` element of `<r><a id="1"/><b/><a id="2"/></r>`. The document is
/// kept in a static because nodes only hold weak references to their parents.
fn context_element() -> N {
    static DOCUMENT: OnceLock<N> = OnceLock::new();
    let document = DOCUMENT.get_or_init(|| {
        simple_doc()
            .child(
                elem("r").child(elem("a").attr(attr("id", "1"))).child(elem("b")).child(elem("a").attr(attr("id", "2"))),
            )
            .build()
    });
    document.children_vec().remove(0)
}

fn both(expr: impl Fn() -> Expr, package: &Arc<Package>) -> (CompiledExpression, CompiledExpression) {
    let plain = StaticContextBuilder::new().with_optimizer(OptimizerOptions::disabled()).build();
    let optimized = ExpressionCompiler::new(StaticContext::default()).with_package(package.clone());
    let unoptimized = ExpressionCompiler::new(plain).with_package(package.clone());
    (optimized.compile(expr()).unwrap(), unoptimized.compile(expr()).unwrap())
}

/// Compile with and without rewrites, check both agree, and return the
/// optimized plan with the shared result.
fn plan(expr: impl Fn() -> Expr) -> (String, Vec<XdmItem<N>>) {
    plan_in(expr, &Arc::new(Package::empty()), &[])
}

fn plan_in(
    expr: impl Fn() -> Expr,
    package: &Arc<Package>,
    params: &[(&str, XdmItem<N>)],
) -> (String, Vec<XdmItem<N>>) {
    let (optimized, unoptimized) = both(expr, package);
    let ctx = params
        .iter()
        .fold(DynamicContextBuilder::<N>::new().with_context_item(context_element()), |b, (n, v)| {
            b.with_variable(name(n), vec![v.clone()])
        })
        .build();
    let out = optimized.evaluate_all(&ctx).unwrap();
    assert_eq!(out, unoptimized.evaluate_all(&ctx).unwrap(), "plan: {}", optimized.explain());
    (optimized.explain(), out)
}

fn integer(i: i64) -> XdmItem<N> {
    XdmItem::Atomic(XdmAtomicValue::Integer(i))
}

fn ids(items: &[XdmItem<N>]) -> Vec<String> {
    items
        .iter()
        .map(|i| match i {
            XdmItem::Node(n) => n.attributes().map(|a| a.string_value()).collect(),
            XdmItem::Atomic(a) => panic!("expected node, got {a:?}"),
        })
        .collect()
}

#[test]
fn literal_variables_are_inlined() {
    let (explain, out) = plan(|| let_in("x", int(3), add(var("x"), int(1))));
    assert!(!explain.contains("$x"), "{explain}");
    assert_eq!(out, vec![integer(4)]);

    let (explain, out) = plan(|| let_in("x", call("count", vec![child("a")]), mul(var("x"), int(10))));
    assert!(!explain.contains("let"), "{explain}");
    assert_eq!(out, vec![integer(20)]);
}

#[test]
fn unused_variables_are_dropped() {
    let (explain, out) = plan(|| let_in("x", call("count", vec![child("a")]), int(5)));
    assert_eq!(explain, "5");
    assert_eq!(out, vec![integer(5)]);
}

#[test]
fn variable_read_in_a_loop_stays_bound() {
    let (explain, out) =
        plan(|| let_in("n", call("count", vec![child("a")]), for_in("i", ints([1, 2, 3]), add(var("i"), var("n")))));
    assert!(explain.starts_with("let $n := count(child::a)"), "{explain}");
    assert_eq!(out, vec![integer(3), integer(4), integer(5)]);
}

#[test]
fn loop_invariants_are_promoted() {
    let (explain, out) = plan(|| for_in("i", ints([1, 2, 3]), add(var("i"), call("count", vec![child("a")]))));
    assert!(explain.starts_with("let $Q{urn:xslt-expr:internal}p"), "{explain}");
    assert!(explain.contains(":= count(child::a) return for $i"), "{explain}");
    assert_eq!(out, vec![integer(3), integer(4), integer(5)]);
}

#[test]
fn positional_shortcuts() {
    let (explain, out) = plan(|| filter(child("a"), int(1)));
    assert_eq!(explain, "first-item(child::a)");
    assert_eq!(ids(&out), ["1"]);

    let (explain, out) = plan(|| filter(child("a"), call("last", vec![])));
    assert_eq!(explain, "last-item(child::a)");
    assert_eq!(ids(&out), ["2"]);

    let (explain, out) = plan(|| filter(child("a"), int(0)));
    assert_eq!(explain, "()");
    assert!(out.is_empty());
}

#[test]
fn independent_predicate_becomes_a_conditional() {
    let package = Arc::new(
        PackageBuilder::new().with_param(name("n"), Some(SequenceType::SINGLE_INTEGER), None).build().unwrap(),
    );
    let expr = || filter(child("a"), value_cmp(CompOp::Eq, var("n"), int(1)));

    let (explain, out) = plan_in(expr, &package, &[("n", integer(1))]);
    assert!(explain.starts_with("if ("), "{explain}");
    assert_eq!(ids(&out), ["1", "2"]);

    let (_, out) = plan_in(expr, &package, &[("n", integer(2))]);
    assert!(out.is_empty());
}

#[test]
fn path_rewrites() {
    let (explain, out) = plan(|| call("count", vec![descendant_path(dot(), child("a"))]));
    assert!(explain.contains("descendant::a") && !explain.contains("descendant-or-self"), "{explain}");
    assert_eq!(out, vec![integer(2)]);

    let (explain, out) = plan(|| union(child("a"), child("b")));
    assert!(explain.contains("child::(a | b)"), "{explain}");
    assert_eq!(out.len(), 3);

    let with_id = |id: &str| filter(child("a"), eq(attribute("id"), string(id)));
    let (explain, out) = plan(|| union(with_id("1"), with_id("2")));
    assert!(explain.contains(" or "), "{explain}");
    assert_eq!(ids(&out), ["1", "2"]);
}

#[test]
fn long_let_chain() {
    fn chain(n: usize) -> Expr {
        (0..n).rev().fold(var(&format!("x{}", n - 1)), |action, i| {
            let init = if i == 0 { int(1) } else { add(var(&format!("x{}", i - 1)), int(1)) };
            let_in(&format!("x{i}"), init, action)
        })
    }
    let compiled = xslt_expr::compile(chain(100), &StaticContext::default()).unwrap();
    let ctx = DynamicContextBuilder::<N>::new().build();
    assert_eq!(compiled.evaluate_all(&ctx).unwrap(), vec![integer(100)]);

    let plain = StaticContextBuilder::new().with_optimizer(OptimizerOptions::disabled()).build();
    let compiled = xslt_expr::compile(chain(50), &plain).unwrap();
    assert_eq!(compiled.evaluate_all(&ctx).unwrap(), vec![integer(50)]);
}
