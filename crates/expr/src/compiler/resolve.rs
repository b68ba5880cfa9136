//! Name resolution.
//!
//! Every binding construct gets a fresh entry in the binding arena and every
//! variable reference is pointed at the innermost visible declaration, or at
//! a package global. Function calls are bound to a package function of the
//! same name and arity first, then to the built-in library. All unresolved
//! names of a unit are reported together.

use crate::compiler::binding::{Binding, BindingId, BindingKind, Bindings};
use crate::compiler::ir::{CallTarget, Expr, ExprKind, FunctionCall, VarDecl, VarRef, VarTarget};
use crate::compiler::package::Declarations;
use crate::consts::FNS;
use crate::engine::functions::BuiltinFn;
use crate::engine::runtime::{Error, ErrorCode, SourceLocation, StaticContext, StaticErrors};
use crate::types::{ItemType, SequenceType};
use crate::xdm::ExpandedName;

struct Resolver<'c> {
    ctx: &'c StaticContext,
    decls: &'c Declarations,
    bindings: &'c mut Bindings,
    scope: Vec<(ExpandedName, BindingId)>,
    errors: Vec<Error>,
}

impl Resolver<'_> {
    fn declare(&mut self, decl: &mut VarDecl, kind: BindingKind) {
        let id = self.bindings.insert(Binding::new(decl.name.clone(), kind, decl.declared));
        decl.binding = Some(id);
        self.scope.push((decl.name.clone(), id));
    }

    fn visit(&mut self, expr: &mut Expr) {
        let loc = expr.loc;
        let binds = matches!(
            expr.kind(),
            ExprKind::VarRef(_)
                | ExprKind::Let(_)
                | ExprKind::For { .. }
                | ExprKind::Quantified { .. }
                | ExprKind::FunctionCall(_)
        );
        if !binds {
            for child in expr.children_mut() {
                self.visit(child);
            }
            return;
        }
        match expr.kind_mut() {
            ExprKind::VarRef(r) => self.variable(r, loc),
            ExprKind::Let(l) => {
                self.visit(&mut l.init);
                self.declare(&mut l.var, BindingKind::Let);
                self.visit(&mut l.action);
                self.scope.pop();
            }
            ExprKind::For { var, seq, action } => {
                self.visit(seq);
                self.declare(var, BindingKind::For);
                self.visit(action);
                self.scope.pop();
            }
            ExprKind::Quantified { var, seq, satisfies, .. } => {
                self.visit(seq);
                self.declare(var, BindingKind::Quantified);
                self.visit(satisfies);
                self.scope.pop();
            }
            ExprKind::FunctionCall(call) => {
                for arg in &mut call.args {
                    self.visit(arg);
                }
                self.function(call, loc);
            }
            _ => {}
        }
    }

    fn variable(&mut self, r: &mut VarRef, loc: Option<SourceLocation>) {
        if let Some((_, id)) = self.scope.iter().rev().find(|(n, _)| n == &r.name) {
            r.target = Some(VarTarget::Local(*id));
            if let Some(b) = self.bindings.get(*id) {
                r.static_type = b.static_type();
            }
            return;
        }
        if let Some((index, static_type)) = self.decls.global(&r.name) {
            r.target = Some(VarTarget::Global(index));
            r.static_type = static_type;
            return;
        }
        self.errors.push(
            Error::static_error(ErrorCode::XPST0008, format!("variable ${} has not been declared", r.name))
                .with_location(loc),
        );
    }

    fn in_function_namespace(&self, name: &ExpandedName) -> bool {
        match name.ns() {
            None => true,
            Some(ns) => ns == FNS || self.ctx.default_function_namespace.as_deref() == Some(ns),
        }
    }

    fn function(&mut self, call: &mut FunctionCall, loc: Option<SourceLocation>) {
        let arity = call.args.len();
        if let Some(index) = self.decls.function(&call.name, arity) {
            call.target = CallTarget::User(index);
            if let Some(sig) = self.decls.signature(index) {
                call.result = sig.result;
            }
            return;
        }
        let builtin =
            if self.in_function_namespace(&call.name) { BuiltinFn::lookup(&call.name.local, arity) } else { None };
        let Some(f) = builtin else {
            self.errors.push(
                Error::static_error(
                    ErrorCode::XPST0017,
                    format!("cannot find a function named {} with {arity} argument(s)", call.name),
                )
                .with_location(loc),
            );
            return;
        };
        if arity == 0 && f.defaults_to_context_item() {
            call.args.push(Expr::new(ExprKind::ContextItem(ItemType::AnyItem)).at(loc));
        }
        call.target = CallTarget::Builtin(f);
    }
}

/// Resolve names in `expr`, declaring `params` as the outermost scope.
pub(crate) fn resolve(
    mut expr: Expr,
    params: &[(ExpandedName, SequenceType)],
    ctx: &StaticContext,
    decls: &Declarations,
    bindings: &mut Bindings,
) -> Result<(Expr, Vec<VarDecl>), StaticErrors> {
    let mut resolver = Resolver { ctx, decls, bindings, scope: Vec::new(), errors: Vec::new() };
    let mut declared = Vec::with_capacity(params.len());
    for (name, t) in params {
        let mut decl = VarDecl::new(name.clone(), Some(*t));
        resolver.declare(&mut decl, BindingKind::Param);
        declared.push(decl);
    }
    resolver.visit(&mut expr);
    if resolver.errors.is_empty() { Ok((expr, declared)) } else { Err(StaticErrors(resolver.errors)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::build::{call, for_in, int, let_in, var};

    fn run(expr: Expr) -> Result<Expr, StaticErrors> {
        let mut bindings = Bindings::new();
        resolve(expr, &[], &StaticContext::default(), &Declarations::default(), &mut bindings).map(|(e, _)| e)
    }

    #[test]
    fn inner_declaration_shadows_outer() {
        let e = run(let_in("x", int(1), for_in("x", int(2), var("x")))).unwrap();
        let ExprKind::Let(l) = e.kind() else { panic!("expected let") };
        let ExprKind::For { var: inner, action, .. } = l.action.kind() else { panic!("expected for") };
        let ExprKind::VarRef(r) = action.kind() else { panic!("expected reference") };
        assert_eq!(r.target, inner.binding.map(VarTarget::Local));
        assert_ne!(r.target, l.var.binding.map(VarTarget::Local));
    }

    #[test]
    fn unknown_names_are_all_reported() {
        let errors = run(call("concat", vec![var("a"), call("no-such", vec![])])).unwrap_err();
        let codes: Vec<_> = errors.0.iter().map(Error::code_enum).collect();
        assert_eq!(codes, [ErrorCode::XPST0008, ErrorCode::XPST0017]);
        assert!(errors.0.iter().all(Error::is_static));
    }

    #[test]
    fn zero_arity_string_takes_the_context_item() {
        let e = run(call("string", vec![])).unwrap();
        let ExprKind::FunctionCall(c) = e.kind() else { panic!("expected call") };
        assert_eq!(c.target, CallTarget::Builtin(BuiltinFn::String));
        assert!(matches!(c.args[0].kind(), ExprKind::ContextItem(_)));
    }
}
