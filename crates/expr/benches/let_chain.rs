use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use xslt_expr::compiler::build::*;
use xslt_expr::compiler::ir::Expr;
use xslt_expr::{
    DynamicContextBuilder, OptimizerOptions, SimpleNode, StaticContext, StaticContextBuilder, attr, compile, elem,
    simple_doc, text,
};

/// `let $x0 := 1 return let $x1 := $x0 + 1 return ... return $x{n-1}`
fn let_chain(n: usize) -> Expr {
    (0..n).rev().fold(var(&format!("x{}", n - 1)), |action, i| {
        let init = if i == 0 { int(1) } else { add(var(&format!("x{}", i - 1)), int(1)) };
        let_in(&format!("x{i}"), init, action)
    })
}

fn build_document() -> SimpleNode {
    let mut root = elem("root");
    for i in 0..50 {
        let mut section = elem("section").attr(attr("id", &format!("s{i}")));
        for j in 0..20 {
            section = section.child(elem("item").attr(attr("n", &j.to_string())).child(text("value")));
        }
        root = root.child(section);
    }
    simple_doc().child(root).build()
}

fn benchmark_compile(c: &mut Criterion) {
    let plain = StaticContextBuilder::new().with_optimizer(OptimizerOptions::disabled()).build();
    let mut group = c.benchmark_group("compile/let_chain");
    for n in [10, 50, 200] {
        group.bench_with_input(BenchmarkId::new("optimized", n), &n, |b, &n| {
            b.iter(|| black_box(compile(let_chain(n), &StaticContext::default()).expect("compile failure")));
        });
        group.bench_with_input(BenchmarkId::new("plain", n), &n, |b, &n| {
            b.iter(|| black_box(compile(let_chain(n), &plain).expect("compile failure")));
        });
    }
    group.finish();
}

fn benchmark_evaluate(c: &mut Criterion) {
    let plain = StaticContextBuilder::new().with_optimizer(OptimizerOptions::disabled()).build();
    let ctx = DynamicContextBuilder::<SimpleNode>::new().build();
    let mut group = c.benchmark_group("evaluate/let_chain");
    for n in [10, 50] {
        let compiled = compile(let_chain(n), &plain).expect("compile failure");
        group.bench_with_input(BenchmarkId::from_parameter(n), &compiled, |b, compiled| {
            b.iter(|| black_box(compiled.evaluate_all(&ctx).expect("eval failure")));
        });
    }
    group.finish();
}

fn benchmark_paths(c: &mut Criterion) {
    let document = build_document();
    let ctx = DynamicContextBuilder::<SimpleNode>::new().with_context_item(document).build();
    let sections = || descendant_path(root(), child("section"));
    let queries = [
        ("count(//item)", call("count", vec![descendant_path(root(), child("item"))])),
        (
            "//section[@id = 's7']/item",
            path(filter(sections(), eq(attribute("id"), string("s7"))), child("item")),
        ),
        (
            "for $s in //section return count($s/item)",
            for_in("s", sections(), call("count", vec![path(var("s"), child("item"))])),
        ),
    ];
    let mut group = c.benchmark_group("evaluate/paths");
    for (label, expr) in queries {
        let compiled = compile(expr, &StaticContext::default()).expect("compile failure");
        group.bench_function(label, |b| {
            b.iter(|| black_box(compiled.evaluate_all(&ctx).expect("eval failure").len()));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_compile, benchmark_evaluate, benchmark_paths);
criterion_main!(benches);
