//! Streamability classification and match patterns derived from compiled
//! path expressions.

use rstest::rstest;
use xslt_expr::compiler::build::*;
use xslt_expr::compiler::ir::{Axis, Expr};
use xslt_expr::streaming::{Pattern, Posture, is_streamable, posture, to_pattern};
use xslt_expr::{
    OptimizerOptions, SimpleNode, StaticContext, StaticContextBuilder, XdmNode, attr, compile, elem, simple_doc,
};

/// `<r><a id="1"><b/></a><b/></r>`
fn document() -> SimpleNode {
    simple_doc()
        .child(elem("r").child(elem("a").attr(attr("id", "1")).child(elem("b"))).child(elem("b")))
        .build()
}

fn compiled_pattern(expr: Expr, optimize: bool) -> Option<Pattern> {
    let ctx = if optimize {
        StaticContext::default()
    } else {
        StaticContextBuilder::new().with_optimizer(OptimizerOptions::disabled()).build()
    };
    to_pattern(compile(expr, &ctx).unwrap().expression())
}

#[rstest]
fn patterns_match_the_nodes_a_path_selects(#[values(true, false)] optimize: bool) {
    let doc = document();
    let r = doc.children_vec().remove(0);
    let a = r.children_vec().remove(0);
    let nested_b = a.children_vec().remove(0);
    let id = a.attributes_vec().remove(0);
    let top_b = r.children_vec().remove(1);

    let all_b = compiled_pattern(descendant_path(root(), child("b")), optimize).unwrap();
    assert_eq!(all_b.to_string(), "//b");
    assert!(all_b.matches(&nested_b) && all_b.matches(&top_b));
    assert!(!all_b.matches(&a));

    let under_a = compiled_pattern(path(child("a"), child("b")), optimize).unwrap();
    assert_eq!(under_a.to_string(), "a/b");
    assert!(under_a.matches(&nested_b));
    assert!(!under_a.matches(&top_b));

    let absolute = compiled_pattern(path(path(root(), child("r")), child("b")), optimize).unwrap();
    assert_eq!(absolute.to_string(), "/r/b");
    assert!(absolute.matches(&top_b));
    assert!(!absolute.matches(&nested_b));

    let attribute_pattern = compiled_pattern(path(child("a"), attribute("id")), optimize).unwrap();
    assert!(attribute_pattern.matches(&id));
    assert!(!attribute_pattern.matches(&a));

    let document_pattern = compiled_pattern(root(), optimize).unwrap();
    assert_eq!(document_pattern.to_string(), "/");
    assert!(document_pattern.matches(&doc));
    assert!(!document_pattern.matches(&r));
}

#[rstest]
#[case::parent(path(child("a"), any_node(Axis::Parent)))]
#[case::sibling(path(child("a"), any_node(Axis::FollowingSibling)))]
#[case::atomic_step(path(child("a"), call("string", vec![])))]
fn paths_without_a_pattern_form(#[case] expr: Expr) {
    assert!(compiled_pattern(expr, true).is_none());
}

#[rstest]
#[case::children(path(child("a"), child("b")), Posture::Striding)]
#[case::descendants(descendant("b"), Posture::Crawling)]
#[case::ancestors(any_node(Axis::Ancestor), Posture::Climbing)]
#[case::aggregate(call("count", vec![descendant("b")]), Posture::Grounded)]
#[case::literal(add(int(1), int(2)), Posture::Grounded)]
#[case::siblings(any_node(Axis::FollowingSibling), Posture::Roaming)]
#[case::two_scans(eq(child("a"), child("b")), Posture::Roaming)]
fn postures_of_compiled_expressions(#[case] expr: Expr, #[case] expected: Posture) {
    let compiled = compile(expr, &StaticContext::default()).unwrap();
    assert_eq!(posture(compiled.expression()), expected);
    assert_eq!(is_streamable(compiled.expression()), expected != Posture::Roaming);
}
