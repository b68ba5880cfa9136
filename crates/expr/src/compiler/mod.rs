//! Compilation pipeline: name resolution, type checking, rewriting and slot
//! allocation, plus the compiled form handed to callers.

use std::sync::Arc;

use tracing::debug;

mod analysis;
pub mod binding;
pub mod build;
mod coerce;
mod explain;
mod fold;
pub mod ir;
mod optimize;
pub mod package;
mod promote;
pub(crate) mod properties;
mod resolve;
mod slots;
mod typecheck;

use crate::compiler::binding::Bindings;
use crate::compiler::ir::{Expr, VarDecl};
use crate::compiler::package::{Declarations, Package};
use crate::engine::context::EvalContext;
use crate::engine::evaluator;
use crate::engine::iter::{FocusIterator, drain};
use crate::engine::runtime::{DynamicContext, Error, Receiver, StaticContext, StaticErrors};
use crate::model::XdmNode;
use crate::types::SequenceType;
use crate::xdm::{ExpandedName, XdmItem};

/// One compiled body: a standalone expression, a global initializer or a
/// function body.
pub(crate) struct Unit {
    pub expr: Expr,
    pub params: Vec<VarDecl>,
    pub frame_size: usize,
}

/// Run the whole pipeline over one body. `required` is the declared type of
/// the body's value together with its role in error messages.
pub(crate) fn compile_unit(
    expr: Expr,
    params: &[(ExpandedName, SequenceType)],
    required: Option<(SequenceType, &str)>,
    ctx: &StaticContext,
    decls: &Declarations,
) -> Result<Unit, StaticErrors> {
    let mut bindings = Bindings::new();
    let (expr, mut params) = resolve::resolve(expr, params, ctx, decls, &mut bindings)?;
    let static_error = |e: Error| StaticErrors::from(e.as_static());
    let mut expr = typecheck::check(expr, ctx, decls, &mut bindings).map_err(static_error)?;
    if let Some((t, role)) = required {
        expr = coerce::coerce(expr, t, role).map_err(static_error)?;
    }
    if ctx.optimizer.is_enabled() {
        expr = optimize::optimize(expr, &ctx.optimizer, &mut bindings, ctx.context_item_type.is_some())
            .map_err(static_error)?;
        analysis::count_references(&expr, &mut bindings);
    }
    let frame_size = slots::allocate(&mut expr, &mut params, &mut bindings).map_err(static_error)?;
    debug!(expr = %expr, frame_size, "compiled unit");
    Ok(Unit { expr, params, frame_size })
}

/// A compiled expression, immutable and shareable between threads.
///
/// Each call to one of the evaluation methods runs with its own stack frame
/// and its own table of computed globals.
pub struct CompiledExpression {
    expr: Expr,
    frame_size: usize,
    package: Arc<Package>,
}

impl CompiledExpression {
    fn context<'a, N: XdmNode>(&'a self, dynamic: &'a DynamicContext<N>) -> EvalContext<'a, N> {
        EvalContext::new(&self.package, dynamic, self.frame_size)
    }

    /// Lazily evaluate; items are computed as the iterator is advanced.
    pub fn evaluate<'a, N: XdmNode>(&'a self, dynamic: &'a DynamicContext<N>) -> Result<FocusIterator<'a, N>, Error> {
        let ctx = self.context(dynamic);
        Ok(FocusIterator::new(evaluator::iterate(&self.expr, &ctx)?))
    }

    pub fn evaluate_all<N: XdmNode>(&self, dynamic: &DynamicContext<N>) -> Result<Vec<XdmItem<N>>, Error> {
        let ctx = self.context(dynamic);
        let mut it = evaluator::iterate(&self.expr, &ctx)?;
        drain(&mut it)
    }

    /// First item of the result; the rest is never computed.
    pub fn evaluate_item<N: XdmNode>(&self, dynamic: &DynamicContext<N>) -> Result<Option<XdmItem<N>>, Error> {
        evaluator::evaluate_item(&self.expr, &self.context(dynamic))
    }

    pub fn effective_boolean_value<N: XdmNode>(&self, dynamic: &DynamicContext<N>) -> Result<bool, Error> {
        evaluator::effective_boolean_value(&self.expr, &self.context(dynamic))
    }

    /// Push the result into `out` item by item.
    pub fn process<N: XdmNode>(&self, dynamic: &DynamicContext<N>, out: &mut dyn Receiver<N>) -> Result<(), Error> {
        evaluator::process(&self.expr, &self.context(dynamic), out)
    }

    pub fn explain(&self) -> String {
        self.expr.to_string()
    }

    pub fn static_type(&self) -> SequenceType {
        self.expr.static_info().sequence_type()
    }

    pub fn expression(&self) -> &Expr {
        &self.expr
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn package(&self) -> &Arc<Package> {
        &self.package
    }
}

/// Compiles expressions against a static context and an optional package of
/// globals and functions.
pub struct ExpressionCompiler {
    static_context: StaticContext,
    package: Arc<Package>,
}

impl ExpressionCompiler {
    pub fn new(static_context: StaticContext) -> Self {
        Self { static_context, package: Arc::new(Package::empty()) }
    }

    pub fn with_package(mut self, package: Arc<Package>) -> Self {
        self.package = package;
        self
    }

    pub fn compile(&self, expr: Expr) -> Result<CompiledExpression, StaticErrors> {
        let decls = Declarations::of(&self.package);
        let unit = compile_unit(expr, &[], None, &self.static_context, &decls)?;
        Ok(CompiledExpression { expr: unit.expr, frame_size: unit.frame_size, package: self.package.clone() })
    }

    /// Compile independent expressions; a failure in one does not stop the
    /// others.
    pub fn compile_all(&self, exprs: impl IntoIterator<Item = Expr>) -> Vec<Result<CompiledExpression, StaticErrors>> {
        exprs.into_iter().map(|e| self.compile(e)).collect()
    }
}

/// Compile a standalone expression with an empty package.
pub fn compile(expr: Expr, ctx: &StaticContext) -> Result<CompiledExpression, StaticErrors> {
    ExpressionCompiler::new(ctx.clone()).compile(expr)
}
