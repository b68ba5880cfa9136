//! Global variables, stylesheet parameters and user-defined functions.

use std::sync::Arc;

use xslt_expr::compiler::build::*;
use xslt_expr::compiler::ir::{CompOp, Expr};
use xslt_expr::{
    CompiledExpression, DynamicContext, DynamicContextBuilder, Error, ErrorCode, ExpressionCompiler, Package,
    PackageBuilder, SequenceType, SimpleNode, StaticContext, XdmAtomicValue, XdmItem,
};

type N = SimpleNode;

fn compile_with(package: Package, expr: Expr) -> CompiledExpression {
    ExpressionCompiler::new(StaticContext::default()).with_package(Arc::new(package)).compile(expr).unwrap()
}

fn context() -> DynamicContext<N> {
    DynamicContextBuilder::<N>::new().build()
}

fn integer(i: i64) -> XdmItem<N> {
    XdmItem::Atomic(XdmAtomicValue::Integer(i))
}

/// `fact($n as xs:integer) as xs:integer`
fn factorial() -> PackageBuilder {
    let body = if_then_else(
        value_cmp(CompOp::Le, var("n"), int(1)),
        int(1),
        mul(var("n"), call("fact", vec![sub(var("n"), int(1))])),
    );
    PackageBuilder::new().with_function(
        name("fact"),
        vec![(name("n"), SequenceType::SINGLE_INTEGER)],
        SequenceType::SINGLE_INTEGER,
        body,
    )
}

#[test]
fn globals_may_refer_to_later_globals() {
    let package = PackageBuilder::new()
        .with_variable(name("answer"), None, add(var("base"), int(2)))
        .with_variable(name("base"), Some(SequenceType::SINGLE_INTEGER), int(40))
        .build()
        .unwrap();
    assert_eq!(package.globals().len(), 2);
    let compiled = compile_with(package, var("answer"));
    assert_eq!(compiled.evaluate_all(&context()).unwrap(), vec![integer(42)]);
}

#[test]
fn global_is_computed_once_per_evaluation() {
    let package = PackageBuilder::new()
        .with_variable(name("g"), None, for_in("i", range(int(1), int(3)), mul(var("i"), var("i"))))
        .build()
        .unwrap();
    let compiled = compile_with(package, seq(vec![call("sum", vec![var("g")]), call("count", vec![var("g")])]));
    let ctx = context();
    assert_eq!(compiled.evaluate_all(&ctx).unwrap(), vec![integer(14), integer(3)]);
    assert_eq!(compiled.evaluate_all(&ctx).unwrap(), vec![integer(14), integer(3)]);
}

#[test]
fn parameters() {
    let package = PackageBuilder::new()
        .with_param(name("required"), Some(SequenceType::SINGLE_INTEGER), None)
        .with_param(name("optional"), None, Some(string("fallback")))
        .build()
        .unwrap();
    let package = Arc::new(package);
    let compiler = ExpressionCompiler::new(StaticContext::default()).with_package(package);

    let compiled = compiler.compile(add(var("required"), int(1))).unwrap();
    let ctx = DynamicContextBuilder::<N>::new().with_variable(name("required"), vec![integer(9)]).build();
    assert_eq!(compiled.evaluate_all(&ctx).unwrap(), vec![integer(10)]);

    let err = compiled.evaluate_all(&context()).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::XTDE0050);

    let wrong = DynamicContextBuilder::<N>::new()
        .with_variable(name("required"), vec![XdmItem::Atomic(XdmAtomicValue::String("9".into()))])
        .build();
    assert_eq!(compiled.evaluate_all(&wrong).unwrap_err().code_enum(), ErrorCode::XPTY0004);

    let too_many =
        DynamicContextBuilder::<N>::new().with_variable(name("required"), vec![integer(1), integer(2)]).build();
    assert_eq!(compiled.evaluate_all(&too_many).unwrap_err().code_enum(), ErrorCode::XPTY0004);

    let compiled = compiler.compile(var("optional")).unwrap();
    let out = compiled.evaluate_all(&context()).unwrap();
    assert_eq!(out, vec![XdmItem::Atomic(XdmAtomicValue::String("fallback".into()))]);
}

#[test]
fn circular_globals_fail_when_read() {
    let package = PackageBuilder::new()
        .with_variable(name("a"), None, add(var("b"), int(1)))
        .with_variable(name("b"), None, add(var("a"), int(1)))
        .build()
        .unwrap();
    let compiled = compile_with(package, var("a"));
    assert_eq!(compiled.evaluate_all(&context()).unwrap_err().code_enum(), ErrorCode::XTDE0640);
}

#[test]
fn duplicate_declarations() {
    let errors = PackageBuilder::new()
        .with_variable(name("x"), None, int(1))
        .with_param(name("x"), None, None)
        .with_function(name("f"), vec![], SequenceType::ANY, int(1))
        .with_function(name("f"), vec![], SequenceType::ANY, int(2))
        .with_function(name("f"), vec![(name("a"), SequenceType::ANY)], SequenceType::ANY, var("a"))
        .build()
        .err()
        .expect("duplicates are rejected");
    let codes: Vec<&str> = errors.0.iter().map(|e| &*e.code.local).collect();
    assert_eq!(codes, ["XTSE0630", "XTSE0770"]);
    assert!(errors.0.iter().all(Error::is_static));
}

#[test]
fn errors_in_several_bodies_are_collected() {
    let errors = PackageBuilder::new()
        .with_variable(name("x"), None, var("undeclared"))
        .with_function(name("f"), vec![], SequenceType::ANY, call("missing", vec![]))
        .build()
        .err()
        .expect("bodies are checked");
    let codes: Vec<_> = errors.0.iter().map(Error::code_enum).collect();
    assert_eq!(codes, [ErrorCode::XPST0008, ErrorCode::XPST0017]);
}

#[test]
fn recursive_function() {
    let compiled = compile_with(factorial().build().unwrap(), call("fact", vec![int(10)]));
    assert_eq!(compiled.evaluate_all(&context()).unwrap(), vec![integer(3_628_800)]);
}

#[test]
fn function_result_is_checked() {
    let package = PackageBuilder::new()
        .with_function(name("f"), vec![(name("x"), SequenceType::ANY)], SequenceType::SINGLE_INTEGER, var("x"))
        .build()
        .unwrap();
    let compiled = compile_with(package, call("f", vec![ints([1, 2])]));
    assert_eq!(compiled.evaluate_all(&context()).unwrap_err().code_enum(), ErrorCode::XPTY0004);
}

#[test]
fn runaway_recursion_is_stopped() {
    let package = PackageBuilder::new()
        .with_function(
            name("down"),
            vec![(name("n"), SequenceType::SINGLE_INTEGER)],
            SequenceType::ANY,
            call("down", vec![add(var("n"), int(1))]),
        )
        .build()
        .unwrap();
    let compiled = compile_with(package, call("down", vec![int(0)]));
    let ctx = DynamicContextBuilder::<N>::new().with_max_call_depth(50).build();
    let err = compiled.evaluate_all(&ctx).unwrap_err();
    assert_eq!(err.code_enum(), ErrorCode::SXLM0001);
    assert!(err.message.contains("down"));
}

#[test]
fn compiled_expression_is_shared_between_threads() {
    let compiled = Arc::new(compile_with(
        factorial().with_param(name("n"), Some(SequenceType::SINGLE_INTEGER), None).build().unwrap(),
        call("fact", vec![var("n")]),
    ));
    let expected = [1, 2, 6, 24, 120, 720];
    std::thread::scope(|s| {
        for (i, want) in expected.iter().enumerate() {
            let compiled = Arc::clone(&compiled);
            s.spawn(move || {
                let n = i64::try_from(i).unwrap() + 1;
                let ctx = DynamicContextBuilder::<N>::new().with_variable(name("n"), vec![integer(n)]).build();
                assert_eq!(compiled.evaluate_all(&ctx).unwrap(), vec![integer(*want)]);
            });
        }
    });
}
