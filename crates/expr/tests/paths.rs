//! Path expressions over a small in-memory document, with and without the
//! optimizer.

use rstest::rstest;
use xslt_expr::compiler::build::*;
use xslt_expr::compiler::ir::{Axis, Expr};
use xslt_expr::{
    DynamicContextBuilder, ErrorCode, OptimizerOptions, SimpleNode, StaticContext, StaticContextBuilder,
    XdmAtomicValue, XdmItem, XdmNode, attr, compile, elem, simple_doc, text,
};

type N = SimpleNode;

/// `<root><a id="1"><b>x</b></a><b>y</b><a id="2"><b>z1</b><b>z2</b></a></root>`
fn document() -> N {
    simple_doc()
        .child(
            elem("root")
                .child(elem("a").attr(attr("id", "1")).child(elem("b").child(text("x"))))
                .child(elem("b").child(text("y")))
                .child(
                    elem("a")
                        .attr(attr("id", "2"))
                        .child(elem("b").child(text("z1")))
                        .child(elem("b").child(text("z2"))),
                ),
        )
        .build()
}

fn static_context(optimize: bool) -> StaticContext {
    if optimize {
        StaticContext::default()
    } else {
        StaticContextBuilder::new().with_optimizer(OptimizerOptions::disabled()).build()
    }
}

fn select(expr: Expr, optimize: bool) -> Vec<XdmItem<N>> {
    let compiled = compile(expr, &static_context(optimize)).unwrap();
    let ctx = DynamicContextBuilder::<N>::new().with_context_item(document()).build();
    compiled.evaluate_all(&ctx).unwrap()
}

fn string_values(items: &[XdmItem<N>]) -> Vec<String> {
    items
        .iter()
        .map(|i| match i {
            XdmItem::Node(n) => n.string_value(),
            XdmItem::Atomic(XdmAtomicValue::String(s)) => s.clone(),
            other => panic!("unexpected item {other:?}"),
        })
        .collect()
}

fn local_names(items: &[XdmItem<N>]) -> Vec<String> {
    items
        .iter()
        .map(|i| match i {
            XdmItem::Node(n) => n.name().map(|q| q.local).unwrap_or_default(),
            XdmItem::Atomic(a) => panic!("expected node, got {a:?}"),
        })
        .collect()
}

fn all_b() -> Expr {
    descendant_path(root(), child("b"))
}

#[rstest]
fn child_steps(#[values(true, false)] optimize: bool) {
    let out = select(path(child("root"), child("a")), optimize);
    assert_eq!(local_names(&out), ["a", "a"]);
    let out = select(path(path(child("root"), child("a")), child("b")), optimize);
    assert_eq!(string_values(&out), ["x", "z1", "z2"]);
}

#[rstest]
fn descendants_in_document_order(#[values(true, false)] optimize: bool) {
    assert_eq!(string_values(&select(all_b(), optimize)), ["x", "y", "z1", "z2"]);
    let count = select(call("count", vec![all_b()]), optimize);
    assert_eq!(count, vec![XdmItem::Atomic(XdmAtomicValue::Integer(4))]);
    assert_eq!(string_values(&select(descendant("b"), optimize)), ["x", "y", "z1", "z2"]);
}

#[rstest]
fn positional_predicate_applies_per_parent(#[values(true, false)] optimize: bool) {
    let first_per_parent = descendant_path(root(), filter(child("b"), int(1)));
    assert_eq!(string_values(&select(first_per_parent, optimize)), ["x", "y", "z1"]);

    let first_overall = filter(all_b(), int(1));
    assert_eq!(string_values(&select(first_overall, optimize)), ["x"]);

    let last_overall = filter(all_b(), call("last", vec![]));
    assert_eq!(string_values(&select(last_overall, optimize)), ["z2"]);
}

#[rstest]
fn attributes(#[values(true, false)] optimize: bool) {
    let ids = path(path(child("root"), child("a")), attribute("id"));
    assert_eq!(string_values(&select(ids, optimize)), ["1", "2"]);

    let as_strings = path(path(child("root"), child("a")), call("string", vec![attribute("id")]));
    assert_eq!(string_values(&select(as_strings, optimize)), ["1", "2"]);

    let looped = for_in("x", path(path(child("root"), child("a")), attribute("id")), call("string", vec![var("x")]));
    assert_eq!(string_values(&select(looped, optimize)), ["1", "2"]);
}

#[rstest]
fn attribute_predicate(#[values(true, false)] optimize: bool) {
    let second = filter(child("a"), eq(attribute("id"), string("2")));
    let out = select(path(path(child("root"), second), child("b")), optimize);
    assert_eq!(string_values(&out), ["z1", "z2"]);

    let both = filter(filter(child("a"), attribute("id")), eq(attribute("id"), string("1")));
    let out = select(path(child("root"), both), optimize);
    assert_eq!(string_values(&out), ["x"]);
}

#[rstest]
fn parent_steps_are_deduplicated(#[values(true, false)] optimize: bool) {
    let parents = path(all_b(), any_node(Axis::Parent));
    assert_eq!(local_names(&select(parents, optimize)), ["root", "a", "a"]);
}

#[rstest]
fn set_operators(#[values(true, false)] optimize: bool) {
    let nested = || path(path(child("root"), child("a")), child("b"));

    let u = union(path(child("root"), child("b")), path(child("root"), child("a")));
    assert_eq!(local_names(&select(u, optimize)), ["a", "b", "a"]);

    let u = union(all_b(), nested());
    assert_eq!(string_values(&select(u, optimize)), ["x", "y", "z1", "z2"]);

    let i = intersect(all_b(), nested());
    assert_eq!(string_values(&select(i, optimize)), ["x", "z1", "z2"]);

    let e = except(all_b(), nested());
    assert_eq!(string_values(&select(e, optimize)), ["y"]);
}

#[rstest]
fn predicates_over_nodes(#[values(true, false)] optimize: bool) {
    let children = || path(child("root"), any_node(Axis::Child));
    assert_eq!(local_names(&select(filter(children(), int(2)), optimize)), ["b"]);
    assert_eq!(local_names(&select(filter(children(), call("true", vec![])), optimize)), ["a", "b", "a"]);

    let two_flags = filter(children(), seq(vec![boolean(true), boolean(false)]));
    let compiled = compile(two_flags, &static_context(optimize)).unwrap();
    let ctx = DynamicContextBuilder::<N>::new().with_context_item(document()).build();
    assert_eq!(compiled.evaluate_all(&ctx).unwrap_err().code_enum(), ErrorCode::FORG0006);
}

#[test]
fn root_of_a_detached_tree_is_an_error() {
    let compiled = compile(path(root(), child("x")), &StaticContext::default()).unwrap();
    let detached = elem("x").build();
    let ctx = DynamicContextBuilder::<N>::new().with_context_item(detached).build();
    assert_eq!(compiled.evaluate_all(&ctx).unwrap_err().code_enum(), ErrorCode::XPDY0050);
}

#[test]
fn step_on_an_atomic_context_item_is_an_error() {
    let compiled = compile(child("a"), &StaticContext::default()).unwrap();
    let ctx = DynamicContextBuilder::<N>::new().with_context_item(XdmItem::Atomic(XdmAtomicValue::Integer(1))).build();
    assert_eq!(compiled.evaluate_all(&ctx).unwrap_err().code_enum(), ErrorCode::XPTY0020);
}
