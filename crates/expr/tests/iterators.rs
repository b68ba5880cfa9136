//! Result cursors: position tracking, independent re-iteration, early close
//! and lazy production of items.

use rstest::rstest;
use xslt_expr::compiler::build::*;
use xslt_expr::compiler::ir::Expr;
use xslt_expr::{DynamicContextBuilder, ErrorCode, SimpleNode, StaticContext, XdmAtomicValue, XdmItem, compile};

type N = SimpleNode;

fn integer(item: &XdmItem<N>) -> i64 {
    match item {
        XdmItem::Atomic(XdmAtomicValue::Integer(i)) => *i,
        other => panic!("expected integer, got {other:?}"),
    }
}

#[rstest]
#[case::literal(ints([1, 2, 3]))]
#[case::range(range(int(1), int(3)))]
#[case::loop_(for_in("i", ints([0, 1, 2]), add(var("i"), int(1))))]
#[case::filtered(filter(range(int(1), int(6)), general_cmp(xslt_expr::compiler::ir::CompOp::Le, dot(), int(3))))]
fn positions_and_fresh_cursors(#[case] expr: Expr) {
    let compiled = compile(expr, &StaticContext::default()).unwrap();
    let ctx = DynamicContextBuilder::<N>::new().build();
    let mut it = compiled.evaluate(&ctx).unwrap();
    assert_eq!(it.position(), 0);
    assert!(it.current().is_none());

    let first = it.next().unwrap().unwrap();
    assert_eq!(integer(&first), 1);
    assert_eq!(it.position(), 1);
    assert_eq!(it.current().map(integer), Some(1));

    let again: Vec<i64> = it.get_another().unwrap().map(|r| integer(&r.unwrap())).collect();
    assert_eq!(again, vec![1, 2, 3]);

    let rest: Vec<i64> = it.by_ref().map(|r| integer(&r.unwrap())).collect();
    assert_eq!(rest, vec![2, 3]);
    assert_eq!(it.position(), -1);
    assert!(it.current().is_none());
    assert!(it.next().is_none());
}

#[test]
fn closed_cursor_is_exhausted() {
    let compiled = compile(range(int(1), int(10)), &StaticContext::default()).unwrap();
    let ctx = DynamicContextBuilder::<N>::new().build();
    let mut it = compiled.evaluate(&ctx).unwrap();
    assert!(it.next().is_some());
    it.close();
    assert_eq!(it.position(), -1);
    assert!(it.next().is_none());
    it.close();
    assert!(it.next().is_none());
}

#[test]
fn huge_range_is_produced_on_demand() {
    let compiled = compile(range(int(1), int(2_000_000_000)), &StaticContext::default()).unwrap();
    let ctx = DynamicContextBuilder::<N>::new().build();
    let taken: Vec<i64> = compiled.evaluate(&ctx).unwrap().take(5).map(|r| integer(&r.unwrap())).collect();
    assert_eq!(taken, vec![1, 2, 3, 4, 5]);

    let mapped = for_in("i", range(int(1), int(2_000_000_000)), mul(var("i"), int(10)));
    let compiled = compile(mapped, &StaticContext::default()).unwrap();
    let first = compiled.evaluate_item(&ctx).unwrap().map(|i| integer(&i));
    assert_eq!(first, Some(10));
}

#[test]
fn items_before_an_error_are_delivered() {
    let compiled = compile(seq(vec![int(1), div(int(1), int(0)), int(3)]), &StaticContext::default()).unwrap();
    let ctx = DynamicContextBuilder::<N>::new().build();
    let mut it = compiled.evaluate(&ctx).unwrap();
    assert_eq!(integer(&it.next().unwrap().unwrap()), 1);
    let err = it.next().unwrap().unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::FOAR0001);
    assert!(it.next().is_none());
}

#[test]
fn effective_boolean_value_stops_after_the_first_node_or_two_atomics() {
    let ctx = DynamicContextBuilder::<N>::new().build();
    let compiled = compile(call("exists", vec![range(int(1), int(2_000_000_000))]), &StaticContext::default()).unwrap();
    assert!(compiled.effective_boolean_value(&ctx).unwrap());

    let compiled = compile(range(int(1), int(2_000_000_000)), &StaticContext::default()).unwrap();
    assert_eq!(compiled.effective_boolean_value(&ctx).unwrap_err().code_enum(), ErrorCode::FORG0006);
}
