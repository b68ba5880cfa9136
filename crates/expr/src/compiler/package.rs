//! Package-level declarations: global variables, external parameters and
//! user-defined functions.
//!
//! A [`Package`] is immutable once built and may be shared between threads;
//! every evaluation keeps its own table of computed global values. Bodies are
//! compiled in declaration order, so a global sees the inferred type of every
//! global declared before it and the declared (or most general) type of the
//! ones after it.

use std::collections::HashSet;

use tracing::debug;

use crate::compiler::ir::{Expr, VarDecl};
use crate::compiler::{Unit, compile_unit};
use crate::consts::ERR_NS;
use crate::engine::runtime::{Error, StaticContext, StaticErrors};
use crate::types::SequenceType;
use crate::xdm::ExpandedName;

pub enum GlobalKind {
    Variable(Expr),
    /// External parameter; required when there is no default.
    Param { default: Option<Expr> },
}

pub struct GlobalVariable {
    pub name: ExpandedName,
    pub declared: Option<SequenceType>,
    pub kind: GlobalKind,
    /// Type seen by references from expressions compiled later.
    pub static_type: SequenceType,
    pub frame_size: usize,
}

impl GlobalVariable {
    pub fn is_required(&self) -> bool {
        matches!(self.kind, GlobalKind::Param { default: None })
    }
}

pub struct UserFunction {
    pub name: ExpandedName,
    pub params: Vec<VarDecl>,
    pub result: SequenceType,
    pub body: Expr,
    pub frame_size: usize,
}

impl UserFunction {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[derive(Default)]
pub struct Package {
    globals: Vec<GlobalVariable>,
    functions: Vec<UserFunction>,
}

impl Package {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn globals(&self) -> &[GlobalVariable] {
        &self.globals
    }

    pub fn global(&self, index: usize) -> Option<&GlobalVariable> {
        self.globals.get(index)
    }

    pub fn lookup_global(&self, name: &ExpandedName) -> Option<usize> {
        self.globals.iter().position(|g| &g.name == name)
    }

    pub fn functions(&self) -> &[UserFunction] {
        &self.functions
    }

    pub fn function(&self, index: usize) -> Option<&UserFunction> {
        self.functions.get(index)
    }

    pub fn lookup_function(&self, name: &ExpandedName, arity: usize) -> Option<usize> {
        self.functions.iter().position(|f| &f.name == name && f.arity() == arity)
    }
}

pub(crate) struct GlobalSig {
    pub name: ExpandedName,
    pub static_type: SequenceType,
}

pub(crate) struct FunctionSig {
    pub name: ExpandedName,
    pub params: Vec<SequenceType>,
    pub result: SequenceType,
}

/// Names and types the resolver and type checker see for package
/// components.
#[derive(Default)]
pub(crate) struct Declarations {
    pub globals: Vec<GlobalSig>,
    pub functions: Vec<FunctionSig>,
}

impl Declarations {
    pub(crate) fn of(package: &Package) -> Self {
        Self {
            globals: package
                .globals
                .iter()
                .map(|g| GlobalSig { name: g.name.clone(), static_type: g.static_type })
                .collect(),
            functions: package
                .functions
                .iter()
                .map(|f| FunctionSig {
                    name: f.name.clone(),
                    params: f.params.iter().map(|p| p.declared.unwrap_or(SequenceType::ANY)).collect(),
                    result: f.result,
                })
                .collect(),
        }
    }

    pub(crate) fn global(&self, name: &ExpandedName) -> Option<(usize, SequenceType)> {
        self.globals.iter().position(|g| &g.name == name).map(|i| (i, self.globals[i].static_type))
    }

    pub(crate) fn function(&self, name: &ExpandedName, arity: usize) -> Option<usize> {
        self.functions.iter().position(|f| &f.name == name && f.params.len() == arity)
    }

    pub(crate) fn signature(&self, index: usize) -> Option<&FunctionSig> {
        self.functions.get(index)
    }
}

enum PendingKind {
    Variable(Expr),
    Param(Option<Expr>),
}

struct PendingGlobal {
    name: ExpandedName,
    declared: Option<SequenceType>,
    kind: PendingKind,
}

struct PendingFunction {
    name: ExpandedName,
    params: Vec<(ExpandedName, SequenceType)>,
    result: SequenceType,
    body: Expr,
}

/// Collects declarations and compiles them into a [`Package`].
///
/// ```
/// use xslt_expr::compiler::build::{add, int, var};
/// use xslt_expr::{ExpandedName, PackageBuilder};
///
/// let package = PackageBuilder::new()
///     .with_variable(ExpandedName::new(None, "base"), None, int(40))
///     .with_variable(ExpandedName::new(None, "answer"), None, add(var("base"), int(2)))
///     .build()
///     .unwrap();
/// assert_eq!(package.globals().len(), 2);
/// ```
#[derive(Default)]
pub struct PackageBuilder {
    static_context: StaticContext,
    globals: Vec<PendingGlobal>,
    functions: Vec<PendingFunction>,
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_static_context(mut self, ctx: StaticContext) -> Self {
        self.static_context = ctx;
        self
    }

    pub fn with_variable(mut self, name: ExpandedName, declared: Option<SequenceType>, select: Expr) -> Self {
        self.globals.push(PendingGlobal { name, declared, kind: PendingKind::Variable(select) });
        self
    }

    pub fn with_param(mut self, name: ExpandedName, declared: Option<SequenceType>, default: Option<Expr>) -> Self {
        self.globals.push(PendingGlobal { name, declared, kind: PendingKind::Param(default) });
        self
    }

    pub fn with_function(
        mut self,
        name: ExpandedName,
        params: Vec<(ExpandedName, SequenceType)>,
        result: SequenceType,
        body: Expr,
    ) -> Self {
        self.functions.push(PendingFunction { name, params, result, body });
        self
    }

    fn duplicate(code: &str, what: String) -> Error {
        Error::new_qname(ExpandedName::new(Some(ERR_NS), code), what).as_static()
    }

    fn check_duplicates(&self, errors: &mut Vec<Error>) {
        let mut seen = HashSet::new();
        for g in &self.globals {
            if !seen.insert(&g.name) {
                errors.push(Self::duplicate("XTSE0630", format!("duplicate global variable ${}", g.name)));
            }
        }
        let mut seen = HashSet::new();
        for f in &self.functions {
            if !seen.insert((&f.name, f.params.len())) {
                errors.push(Self::duplicate(
                    "XTSE0770",
                    format!("duplicate function {}#{}", f.name, f.params.len()),
                ));
            }
        }
    }

    /// Compile every declaration. All static errors of all bodies are
    /// reported together.
    pub fn build(self) -> Result<Package, StaticErrors> {
        let mut errors = Vec::new();
        self.check_duplicates(&mut errors);

        let mut decls = Declarations {
            globals: self
                .globals
                .iter()
                .map(|g| GlobalSig { name: g.name.clone(), static_type: g.declared.unwrap_or(SequenceType::ANY) })
                .collect(),
            functions: self
                .functions
                .iter()
                .map(|f| FunctionSig {
                    name: f.name.clone(),
                    params: f.params.iter().map(|(_, t)| *t).collect(),
                    result: f.result,
                })
                .collect(),
        };

        let global_ctx = self.static_context.clone();
        let mut globals = Vec::with_capacity(self.globals.len());
        for (index, g) in self.globals.into_iter().enumerate() {
            let role = format!("value of global variable ${}", g.name);
            let required = g.declared.map(|t| (t, role.as_str()));
            let compiled = match g.kind {
                PendingKind::Variable(select) => compile_unit(select, &[], required, &global_ctx, &decls)
                    .map(|u| (GlobalKind::Variable(u.expr), u.frame_size)),
                PendingKind::Param(None) => Ok((GlobalKind::Param { default: None }, 0)),
                PendingKind::Param(Some(select)) => compile_unit(select, &[], required, &global_ctx, &decls)
                    .map(|u| (GlobalKind::Param { default: Some(u.expr) }, u.frame_size)),
            };
            match compiled {
                Ok((kind, frame_size)) => {
                    let static_type = match (&kind, g.declared) {
                        (GlobalKind::Variable(select), _) => select.static_info().sequence_type(),
                        (GlobalKind::Param { .. }, Some(declared)) => declared,
                        (GlobalKind::Param { .. }, None) => SequenceType::ANY,
                    };
                    decls.globals[index].static_type = static_type;
                    debug!(name = %g.name, static_type = %static_type, frame_size, "compiled global variable");
                    globals.push(GlobalVariable { name: g.name, declared: g.declared, kind, static_type, frame_size });
                }
                Err(e) => errors.extend(e.0),
            }
        }

        let mut function_ctx = self.static_context;
        function_ctx.context_item_type = None;
        let mut functions = Vec::with_capacity(self.functions.len());
        for f in self.functions {
            let role = format!("result of function {}()", f.name);
            match compile_unit(f.body, &f.params, Some((f.result, role.as_str())), &function_ctx, &decls) {
                Ok(Unit { expr, params, frame_size }) => {
                    debug!(name = %f.name, arity = params.len(), frame_size, "compiled function");
                    functions.push(UserFunction { name: f.name, params, result: f.result, body: expr, frame_size });
                }
                Err(e) => errors.extend(e.0),
            }
        }

        if errors.is_empty() { Ok(Package { globals, functions }) } else { Err(StaticErrors(errors)) }
    }
}
