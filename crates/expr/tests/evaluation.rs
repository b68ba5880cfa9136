//! Evaluation of standalone expressions: bindings, loops, filters, ranges
//! and conditionals, through each of the evaluation entry points.

use std::sync::Arc;

use rstest::rstest;
use xslt_expr::compiler::build::*;
use xslt_expr::compiler::ir::{CompOp, Expr};
use xslt_expr::{
    Cardinality, DynamicContextBuilder, Error, ErrorCode, ExpressionCompiler, ItemType, PackageBuilder,
    SequenceType, SimpleNode, StaticContext, XdmAtomicValue, XdmItem, compile,
};

type N = SimpleNode;

fn run(expr: Expr) -> Result<Vec<XdmItem<N>>, Error> {
    let compiled = compile(expr, &StaticContext::default()).unwrap();
    compiled.evaluate_all(&DynamicContextBuilder::<N>::new().build())
}

/// Evaluate with external parameters, so nothing about their values is known
/// at compile time.
fn run_with(expr: Expr, params: &[(&str, Vec<XdmAtomicValue>)]) -> Result<Vec<XdmItem<N>>, Error> {
    let package = params
        .iter()
        .fold(PackageBuilder::new(), |b, (n, _)| b.with_param(name(n), None, None))
        .build()
        .unwrap();
    let compiled =
        ExpressionCompiler::new(StaticContext::default()).with_package(Arc::new(package)).compile(expr).unwrap();
    let ctx = params
        .iter()
        .fold(DynamicContextBuilder::<N>::new(), |b, (n, values)| {
            b.with_variable(name(n), values.iter().cloned().map(XdmItem::Atomic).collect::<Vec<XdmItem<N>>>())
        })
        .build();
    compiled.evaluate_all(&ctx)
}

fn atomics(items: Vec<XdmItem<N>>) -> Vec<XdmAtomicValue> {
    items
        .into_iter()
        .map(|i| match i {
            XdmItem::Atomic(a) => a,
            XdmItem::Node(n) => panic!("expected atomic value, got {n:?}"),
        })
        .collect()
}

fn integers(values: &[i64]) -> Vec<XdmAtomicValue> {
    values.iter().copied().map(XdmAtomicValue::Integer).collect()
}

fn strings(values: &[&str]) -> Vec<XdmAtomicValue> {
    values.iter().map(|s| XdmAtomicValue::String((*s).to_string())).collect()
}

fn abc() -> Expr {
    literal(strings(&["A", "B", "C"]))
}

#[rstest]
#[case::let_binding(let_in("x", int(40), add(var("x"), int(2))), integers(&[42]))]
#[case::shadowing(let_in("x", int(1), let_in("x", int(2), var("x"))), integers(&[2]))]
#[case::for_loop(for_in("i", range(int(1), int(3)), mul(var("i"), int(2))), integers(&[2, 4, 6]))]
#[case::nested_for(
    for_in("i", ints([1, 2]), for_in("j", ints([10, 20]), add(var("i"), var("j")))),
    integers(&[11, 21, 12, 22])
)]
#[case::some(some("x", ints([1, 2, 3]), eq(var("x"), int(2))), vec![XdmAtomicValue::Boolean(true)])]
#[case::every(
    every("x", ints([1, 2, 3]), general_cmp(CompOp::Gt, var("x"), int(1))),
    vec![XdmAtomicValue::Boolean(false)]
)]
#[case::every_over_empty(every("x", empty(), boolean(false)), vec![XdmAtomicValue::Boolean(true)])]
#[case::conditional(if_then_else(eq(int(1), int(2)), string("yes"), string("no")), strings(&["no"]))]
#[case::general_comparison(eq(ints([1, 2]), int(2)), vec![XdmAtomicValue::Boolean(true)])]
#[case::sequence(seq(vec![int(1), empty(), ints([2, 3])]), integers(&[1, 2, 3]))]
#[case::sum_of_loop(call("sum", vec![for_in("i", range(int(1), int(4)), var("i"))]), integers(&[10]))]
#[case::count(call("count", vec![range(int(1), int(1000))]), integers(&[1000]))]
#[case::instance_of(
    instance_of(ints([1, 2]), SequenceType::new(ItemType::INTEGER, Cardinality::ONE_OR_MORE)),
    vec![XdmAtomicValue::Boolean(true)]
)]
fn evaluates(#[case] expr: Expr, #[case] expected: Vec<XdmAtomicValue>) {
    assert_eq!(atomics(run(expr).unwrap()), expected);
}

#[rstest]
#[case::second(filter(abc(), int(2)), strings(&["B"]))]
#[case::first(filter(abc(), int(1)), strings(&["A"]))]
#[case::beyond_end(filter(abc(), int(4)), vec![])]
#[case::fractional(filter(abc(), double(1.5)), vec![])]
#[case::true_keeps_all(filter(abc(), call("true", vec![])), strings(&["A", "B", "C"]))]
#[case::false_keeps_none(filter(abc(), call("false", vec![])), vec![])]
#[case::last(filter(abc(), call("last", vec![])), strings(&["C"]))]
#[case::position(filter(abc(), general_cmp(CompOp::Ge, call("position", vec![]), int(2))), strings(&["B", "C"]))]
fn filters_literal_sequences(#[case] expr: Expr, #[case] expected: Vec<XdmAtomicValue>) {
    assert_eq!(atomics(run(expr).unwrap()), expected);
}

#[rstest]
#[case::second(filter(var("seq"), int(2)), strings(&["B"]))]
#[case::last(filter(var("seq"), call("last", vec![])), strings(&["C"]))]
#[case::position(filter(var("seq"), eq(call("position", vec![]), int(3))), strings(&["C"]))]
#[case::not_last(
    filter(var("seq"), general_cmp(CompOp::Lt, call("position", vec![]), call("last", vec![]))),
    strings(&["A", "B"])
)]
#[case::string_predicate(filter(var("seq"), string("x")), strings(&["A", "B", "C"]))]
#[case::dot_predicate(filter(var("seq"), eq(dot(), string("B"))), strings(&["B"]))]
fn filters_runtime_sequences(#[case] expr: Expr, #[case] expected: Vec<XdmAtomicValue>) {
    let out = run_with(expr, &[("seq", strings(&["A", "B", "C"]))]).unwrap();
    assert_eq!(atomics(out), expected);
}

#[test]
fn predicate_of_two_items_starting_with_a_boolean_is_an_error() {
    let flags = vec![XdmAtomicValue::Boolean(true), XdmAtomicValue::Boolean(false)];
    let err = run_with(filter(var("seq"), var("flags")), &[("seq", integers(&[1, 2])), ("flags", flags)]).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::FORG0006);

    let err = run(filter(ints([1, 2]), seq(vec![boolean(true), boolean(false)]))).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::FORG0006);
}

#[rstest]
#[case::descending(5, 3, vec![])]
#[case::single(5, 5, integers(&[5]))]
#[case::ascending(-1, 2, integers(&[-1, 0, 1, 2]))]
fn range_bounds(#[case] start: i64, #[case] end: i64, #[case] expected: Vec<XdmAtomicValue>) {
    assert_eq!(atomics(run(range(int(start), int(end))).unwrap()), expected);
    let runtime = run_with(range(var("a"), var("b")), &[("a", integers(&[start])), ("b", integers(&[end]))]);
    assert_eq!(atomics(runtime.unwrap()), expected);
}

#[test]
fn range_with_an_empty_bound_is_empty() {
    let out = run_with(range(var("a"), int(3)), &[("a", vec![])]).unwrap();
    assert!(out.is_empty());
}

#[test]
fn overlong_range_is_rejected() {
    let limit = i64::from(i32::MAX);
    let errors = compile(range(int(1), int(limit + 1)), &StaticContext::default()).err().expect("static error");
    assert_eq!(errors.first().unwrap().code_enum(), ErrorCode::XPDY0130);

    let err = run_with(range(int(1), var("n")), &[("n", integers(&[limit + 1]))]).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::XPDY0130);

    let out = run_with(call("count", vec![range(int(1), var("n"))]), &[("n", integers(&[limit]))]);
    assert_eq!(atomics(out.unwrap()), integers(&[limit]));
}

#[test]
fn division_by_zero_is_raised_when_evaluated() {
    let compiled = compile(div(int(1), int(0)), &StaticContext::default()).unwrap();
    let err = compiled.evaluate_all(&DynamicContextBuilder::<N>::new().build()).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::FOAR0001);

    let guarded = if_then_else(boolean(false), div(int(1), int(0)), int(7));
    assert_eq!(atomics(run(guarded).unwrap()), integers(&[7]));
}

#[test]
fn unreferenced_failing_variable_is_never_evaluated() {
    let expr = let_in("boom", div(int(1), int(0)), int(1));
    assert_eq!(atomics(run(expr).unwrap()), integers(&[1]));
}

#[test]
fn scalar_entry_points() {
    let ctx = DynamicContextBuilder::<N>::new().build();
    let compiled = compile(range(int(1), int(1_000_000)), &StaticContext::default()).unwrap();
    assert_eq!(compiled.evaluate_item(&ctx).unwrap(), Some(XdmItem::Atomic(XdmAtomicValue::Integer(1))));

    let empty = compile(empty(), &StaticContext::default()).unwrap();
    assert_eq!(empty.evaluate_item(&ctx).unwrap(), None);
    assert!(!empty.effective_boolean_value(&ctx).unwrap());

    let two = compile(ints([1, 2]), &StaticContext::default()).unwrap();
    assert_eq!(two.effective_boolean_value(&ctx).unwrap_err().code_enum(), ErrorCode::FORG0006);

    let text = compile(string("x"), &StaticContext::default()).unwrap();
    assert!(text.effective_boolean_value(&ctx).unwrap());
}

#[test]
fn push_mode_matches_pull_mode() {
    let expr = || {
        seq(vec![
            let_in("x", int(2), for_in("i", ints([1, 2, 3]), mul(var("i"), var("x")))),
            if_then_else(boolean(true), string("t"), string("f")),
        ])
    };
    let ctx = DynamicContextBuilder::<N>::new().build();
    let compiled = compile(expr(), &StaticContext::default()).unwrap();
    let mut pushed: Vec<XdmItem<N>> = Vec::new();
    compiled.process(&ctx, &mut pushed).unwrap();
    assert_eq!(pushed, compiled.evaluate_all(&ctx).unwrap());
    assert_eq!(pushed.len(), 4);
}

#[test]
fn context_item_is_required_at_run_time() {
    let compiled = compile(dot(), &StaticContext::default()).unwrap();
    let err = compiled.evaluate_all(&DynamicContextBuilder::<N>::new().build()).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::XPDY0002);

    let ctx = DynamicContextBuilder::<N>::new().with_context_item(XdmItem::Atomic(XdmAtomicValue::Integer(3))).build();
    assert_eq!(atomics(compiled.evaluate_all(&ctx).unwrap()), integers(&[3]));
}

#[test]
fn backwards_compatible_arithmetic() {
    let ctx = xslt_expr::StaticContextBuilder::new().with_backwards_compatible(true).build();
    let dynamic = DynamicContextBuilder::<N>::new().build();

    let compiled = compile(add(empty(), int(1)), &ctx).unwrap();
    let out = atomics(compiled.evaluate_all(&dynamic).unwrap());
    assert!(matches!(out.as_slice(), [XdmAtomicValue::Double(d)] if d.is_nan()));

    let compiled = compile(add(ints([1, 2]), string("2")), &ctx).unwrap();
    assert_eq!(atomics(compiled.evaluate_all(&dynamic).unwrap()), vec![XdmAtomicValue::Double(3.0)]);
}

#[test]
fn current_date_time_is_fixed_for_an_evaluation() {
    let now = chrono::DateTime::parse_from_rfc3339("2024-05-01T10:00:00+02:00").unwrap();
    let ctx = DynamicContextBuilder::<N>::new().with_now(now).build();
    let expr = seq(vec![call("current-dateTime", vec![]), call("current-dateTime", vec![]), call("current-date", vec![])]);
    let out = atomics(compile(expr, &StaticContext::default()).unwrap().evaluate_all(&ctx).unwrap());
    let date = XdmAtomicValue::Date { date: now.date_naive(), tz: Some(*now.offset()) };
    assert_eq!(out, vec![XdmAtomicValue::DateTime(now), XdmAtomicValue::DateTime(now), date]);
}

#[rstest]
#[case::concat(call("concat", vec![string("a"), int(1), empty()]), strings(&["a1"]))]
#[case::string_length(call("string-length", vec![string("héllo")]), integers(&[5]))]
#[case::sum(call("sum", vec![ints([1, 2, 3])]), integers(&[6]))]
#[case::exists(call("exists", vec![empty()]), vec![XdmAtomicValue::Boolean(false)])]
#[case::not(call("not", vec![string("")]), vec![XdmAtomicValue::Boolean(true)])]
fn built_in_functions(#[case] expr: Expr, #[case] expected: Vec<XdmAtomicValue>) {
    assert_eq!(atomics(run(expr).unwrap()), expected);
}

#[test]
fn error_function_raises_its_code() {
    let err = run(call("error", vec![])).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::FOER0000);

    let err = run(call("error", vec![string("err:FOAR0001"), string("custom")])).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::FOAR0001);
    assert_eq!(err.message, "custom");
}
