//! Stack-frame slot allocation.
//!
//! Runs once on the finished tree of a unit. Parameters take the first slots;
//! every other declaration gets the next free slot in pre-order, so a
//! declaration always precedes the references it reaches.

use tracing::trace;

use crate::compiler::analysis::dangling_references;
use crate::compiler::binding::Bindings;
use crate::compiler::ir::{Expr, ExprKind, VarDecl, VarTarget};
use crate::engine::runtime::{Error, ErrorCode};

fn assign(decl: &mut VarDecl, next: &mut usize, bindings: &mut Bindings) {
    let slot = *next;
    *next += 1;
    decl.slot = Some(slot);
    if let Some(b) = decl.binding.and_then(|id| bindings.get_mut(id)) {
        b.slot = Some(slot);
    }
    trace!(variable = %decl.name, slot, "allocated slot");
}

fn walk(expr: &mut Expr, next: &mut usize, bindings: &mut Bindings) -> Result<(), Error> {
    let needs_visit = matches!(
        expr.kind(),
        ExprKind::Let(_) | ExprKind::For { .. } | ExprKind::Quantified { .. } | ExprKind::VarRef(_)
    );
    if needs_visit {
        let loc = expr.loc;
        match expr.kind_mut() {
            ExprKind::Let(l) => assign(&mut l.var, next, bindings),
            ExprKind::For { var, .. } | ExprKind::Quantified { var, .. } => assign(var, next, bindings),
            ExprKind::VarRef(r) => {
                if let Some(VarTarget::Local(id)) = r.target {
                    let slot = bindings.get(id).and_then(|b| b.slot).ok_or_else(|| {
                        Error::static_error(
                            ErrorCode::XPST0008,
                            format!("variable ${} is referenced outside the scope of its declaration", r.name),
                        )
                        .with_location(loc)
                    })?;
                    r.slot = Some(slot);
                }
            }
            _ => {}
        }
    }
    for child in expr.children_mut() {
        walk(child, next, bindings)?;
    }
    Ok(())
}

/// Number every local variable of a unit and return the frame size.
pub(crate) fn allocate(expr: &mut Expr, params: &mut [VarDecl], bindings: &mut Bindings) -> Result<usize, Error> {
    if let Some(id) = dangling_references(expr, bindings).first() {
        let name = match expr.find(*id).map(Expr::kind) {
            Some(ExprKind::VarRef(r)) => r.name.to_string(),
            _ => String::from("?"),
        };
        return Err(Error::static_error(
            ErrorCode::XPST0008,
            format!("variable ${name} is referenced after its binding was eliminated"),
        ));
    }
    let mut next = 0;
    for p in params.iter_mut() {
        assign(p, &mut next, bindings);
    }
    walk(expr, &mut next, bindings)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::build::{add, for_in, int, let_in, var};
    use crate::compiler::package::Declarations;
    use crate::compiler::resolve::resolve;
    use crate::engine::runtime::StaticContext;

    #[test]
    fn slots_are_dense_and_in_declaration_order() {
        let mut bindings = Bindings::new();
        let e = let_in("a", int(1), for_in("b", int(2), let_in("c", var("b"), add(var("a"), var("c")))));
        let (mut e, mut params) =
            resolve(e, &[], &StaticContext::default(), &Declarations::default(), &mut bindings).unwrap();
        let size = allocate(&mut e, &mut params, &mut bindings).unwrap();
        assert_eq!(size, 3);
        let ExprKind::Let(l) = e.kind() else { panic!("expected let") };
        assert_eq!(l.var.slot, Some(0));
    }

    #[test]
    fn eliminated_binding_is_reported() {
        let mut bindings = Bindings::new();
        let e = let_in("a", int(1), var("a"));
        let (mut e, mut params) =
            resolve(e, &[], &StaticContext::default(), &Declarations::default(), &mut bindings).unwrap();
        if let ExprKind::Let(l) = e.kind() {
            bindings.remove(l.var.binding.unwrap());
        }
        let err = allocate(&mut e, &mut params, &mut bindings).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0008);
    }
}
