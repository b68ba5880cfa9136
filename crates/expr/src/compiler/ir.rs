//! Expression tree.
//!
//! Every node owns its operands. Rewrites take a node by value and return the
//! node that replaces it, so a parent always stores whatever its child's
//! rewrite handed back. Cached static information lives in a `OnceLock` and is
//! dropped whenever the operand set changes through [`Expr::kind_mut`] or
//! [`Expr::children_mut`].

use bitflags::bitflags;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::compiler::binding::{BindingId, Bindings};
use crate::compiler::properties;
use crate::engine::functions::BuiltinFn;
use crate::engine::runtime::{Error, SourceLocation};
use crate::model::NodeKind;
use crate::types::{AtomicType, Cardinality, ItemType, SequenceType, StaticInfo};
use crate::xdm::{ExpandedName, XdmAtomicValue};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one expression node; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling | Axis::Preceding
        )
    }

    /// Axes whose results are all within the subtree of the context node.
    pub fn is_subtree(self) -> bool {
        matches!(self, Axis::Child | Axis::Descendant | Axis::DescendantOrSelf | Axis::Attribute | Axis::SelfAxis)
    }

    /// Axes that never yield two nodes where one is an ancestor of the other.
    pub fn is_peer(self) -> bool {
        matches!(
            self,
            Axis::Child
                | Axis::Attribute
                | Axis::SelfAxis
                | Axis::Parent
                | Axis::FollowingSibling
                | Axis::PrecedingSibling
        )
    }

    /// Node kind selected by a bare name test on this axis.
    pub fn principal_kind(self) -> NodeKind {
        if self == Axis::Attribute { NodeKind::Attribute } else { NodeKind::Element }
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Attribute => "attribute",
            Axis::SelfAxis => "self",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::FollowingSibling => "following-sibling",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Following => "following",
            Axis::Preceding => "preceding",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

impl SetOp {
    pub fn name(self) -> &'static str {
        match self {
            SetOp::Union => "union",
            SetOp::Intersect => "intersect",
            SetOp::Except => "except",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeTest {
    AnyNode,
    Kind(NodeKind),
    Name { kind: NodeKind, name: ExpandedName },
    /// Result of merging `axis::a | axis::b` into one step.
    Combined { op: SetOp, lhs: Box<NodeTest>, rhs: Box<NodeTest> },
}

impl NodeTest {
    pub fn matches<N: crate::model::XdmNode>(&self, node: &N) -> bool {
        match self {
            NodeTest::AnyNode => true,
            NodeTest::Kind(k) => node.kind() == *k,
            NodeTest::Name { kind, name } => {
                node.kind() == *kind && node.name().is_some_and(|q| q.matches(name))
            }
            NodeTest::Combined { op, lhs, rhs } => match op {
                SetOp::Union => lhs.matches(node) || rhs.matches(node),
                SetOp::Intersect => lhs.matches(node) && rhs.matches(node),
                SetOp::Except => lhs.matches(node) && !rhs.matches(node),
            },
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            NodeTest::AnyNode => ItemType::AnyNode,
            NodeTest::Kind(k) | NodeTest::Name { kind: k, .. } => ItemType::Node(*k),
            NodeTest::Combined { op, lhs, rhs } => match op {
                SetOp::Union => lhs.item_type().common_supertype(rhs.item_type()),
                SetOp::Intersect | SetOp::Except => lhs.item_type(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AxisStep {
    pub axis: Axis,
    pub test: NodeTest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "div",
            ArithOp::IDiv => "idiv",
            ArithOp::Mod => "mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompOp {
    pub fn value_symbol(self) -> &'static str {
        match self {
            CompOp::Eq => "eq",
            CompOp::Ne => "ne",
            CompOp::Lt => "lt",
            CompOp::Le => "le",
            CompOp::Gt => "gt",
            CompOp::Ge => "ge",
        }
    }

    pub fn general_symbol(self) -> &'static str {
        match self {
            CompOp::Eq => "=",
            CompOp::Ne => "!=",
            CompOp::Lt => "<",
            CompOp::Le => "<=",
            CompOp::Gt => ">",
            CompOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    Some,
    Every,
}

bitflags! {
    /// Facts about a filter predicate established by the type checker.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct FilterFlags: u8 {
        /// The predicate may yield a number, so positional semantics apply.
        const POSITIONAL = 1 << 0;
        /// The predicate always yields exactly one boolean.
        const SINGLETON_BOOLEAN = 1 << 1;
        /// The predicate does not depend on the focus.
        const INDEPENDENT = 1 << 2;
    }
}

/// How a `let` initializer is turned into a value at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EvaluationMode {
    /// The initializer is a literal, bound as a grounded value without evaluation.
    NoEvaluationNeeded,
    /// Alias of another variable: copy its value.
    Variable,
    /// Single reference: closure evaluated when first read.
    Lazy,
    /// Several or looped references: closure whose items are memoized.
    #[default]
    Memo,
    Eager,
    /// Filtered inside a loop: materialized completely on first read.
    Indexed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: ExpandedName,
    pub declared: Option<SequenceType>,
    pub binding: Option<BindingId>,
    pub slot: Option<usize>,
}

impl VarDecl {
    pub fn new(name: ExpandedName, declared: Option<SequenceType>) -> Self {
        Self { name, declared, binding: None, slot: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarTarget {
    Local(BindingId),
    /// Index into the package bindery.
    Global(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub name: ExpandedName,
    pub target: Option<VarTarget>,
    pub static_type: SequenceType,
    pub slot: Option<usize>,
}

pub struct LetExpr {
    pub var: VarDecl,
    pub init: Expr,
    pub action: Expr,
    pub mode: EvaluationMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallTarget {
    Unresolved,
    Builtin(BuiltinFn),
    /// Index of the function in the package.
    User(usize),
}

pub struct FunctionCall {
    pub name: ExpandedName,
    pub target: CallTarget,
    pub args: Vec<Expr>,
    pub result: SequenceType,
}

pub enum ExprKind {
    /// Constant sequence of atomic values; empty for `()`.
    Literal(Vec<XdmAtomicValue>),
    ContextItem(ItemType),
    Root,
    Axis(AxisStep),
    Slash { start: Box<Expr>, step: Box<Expr> },
    Filter { base: Box<Expr>, predicate: Box<Expr>, flags: FilterFlags },
    FirstItem(Box<Expr>),
    LastItem(Box<Expr>),
    VarRef(VarRef),
    Let(Box<LetExpr>),
    For { var: VarDecl, seq: Box<Expr>, action: Box<Expr> },
    Quantified { quantifier: Quantifier, var: VarDecl, seq: Box<Expr>, satisfies: Box<Expr> },
    If { condition: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    Arithmetic { op: ArithOp, lhs: Box<Expr>, rhs: Box<Expr>, compat: bool },
    ValueComparison { op: CompOp, lhs: Box<Expr>, rhs: Box<Expr> },
    GeneralComparison { op: CompOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Boolean { op: BoolOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Venn { op: SetOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// `lhs intersect rhs` with a singleton `lhs`: a membership scan of `rhs`.
    SingletonIntersect { lhs: Box<Expr>, rhs: Box<Expr> },
    Range { start: Box<Expr>, end: Box<Expr> },
    Block(Vec<Expr>),
    FunctionCall(FunctionCall),
    InstanceOf { operand: Box<Expr>, target: SequenceType },
    Atomize(Box<Expr>),
    /// Casts untyped items and promotes numerics towards `target`.
    Convert { operand: Box<Expr>, target: AtomicType },
    CheckCardinality { operand: Box<Expr>, required: Cardinality, role: String },
    CheckItemType { operand: Box<Expr>, required: ItemType, role: String },
    DocumentSort(Box<Expr>),
    /// Raises its error when evaluated.
    Fail(Error),
}

bitflags! {
    /// How a parent uses one of its operands.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct OperandUsage: u8 {
        /// Evaluated more than once per evaluation of the parent.
        const REPEATED = 1 << 0;
        /// Evaluated with a focus set by the parent.
        const NEW_FOCUS = 1 << 1;
        /// Base sequence of a filter.
        const FILTER_BASE = 1 << 2;
        /// Inside the scope of a variable declared by the parent.
        const IN_SCOPE = 1 << 3;
    }
}

pub struct Expr {
    id: NodeId,
    pub loc: Option<SourceLocation>,
    kind: ExprKind,
    info: OnceLock<StaticInfo>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { id: NodeId::fresh(), loc: None, kind, info: OnceLock::new() }
    }

    #[must_use]
    pub fn at(mut self, loc: Option<SourceLocation>) -> Self {
        self.loc = loc;
        self
    }

    pub fn empty() -> Self {
        Expr::new(ExprKind::Literal(Vec::new()))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    /// Mutable access to the payload; invalidates cached static information.
    pub fn kind_mut(&mut self) -> &mut ExprKind {
        self.info = OnceLock::new();
        &mut self.kind
    }

    pub fn into_kind(self) -> ExprKind {
        self.kind
    }

    /// Rebuild a node around a new payload, keeping identity and location.
    pub fn with_kind(&self, kind: ExprKind) -> Expr {
        Expr { id: self.id, loc: self.loc, kind, info: OnceLock::new() }
    }

    pub fn into_parts(self) -> (NodeId, Option<SourceLocation>, ExprKind) {
        (self.id, self.loc, self.kind)
    }

    pub fn from_parts(id: NodeId, loc: Option<SourceLocation>, kind: ExprKind) -> Expr {
        Expr { id, loc, kind, info: OnceLock::new() }
    }

    pub fn static_info(&self) -> StaticInfo {
        *self.info.get_or_init(|| properties::compute(self))
    }

    pub fn item_type(&self) -> ItemType {
        self.static_info().item_type
    }

    pub fn cardinality(&self) -> Cardinality {
        self.static_info().cardinality
    }

    pub fn invalidate(&mut self) {
        self.info = OnceLock::new();
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&[XdmAtomicValue]> {
        match &self.kind {
            ExprKind::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_empty_literal(&self) -> bool {
        self.as_literal().is_some_and(<[XdmAtomicValue]>::is_empty)
    }

    /// Move the node out, leaving an empty literal behind.
    pub fn take(&mut self) -> Expr {
        std::mem::replace(self, Expr::empty())
    }

    /// Operands with the way this node uses them, in evaluation order.
    pub fn operands(&self) -> SmallVec<[(&Expr, OperandUsage); 3]> {
        use OperandUsage as U;
        let mut out = SmallVec::new();
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::ContextItem(_) | ExprKind::Root | ExprKind::Axis(_) => {}
            ExprKind::VarRef(_) | ExprKind::Fail(_) => {}
            ExprKind::Slash { start, step } => {
                out.push((&**start, U::empty()));
                out.push((&**step, U::REPEATED | U::NEW_FOCUS));
            }
            ExprKind::Filter { base, predicate, .. } => {
                out.push((&**base, U::FILTER_BASE));
                out.push((&**predicate, U::REPEATED | U::NEW_FOCUS));
            }
            ExprKind::Let(l) => {
                out.push((&l.init, U::empty()));
                out.push((&l.action, U::IN_SCOPE));
            }
            ExprKind::For { seq, action, .. } => {
                out.push((&**seq, U::empty()));
                out.push((&**action, U::REPEATED | U::IN_SCOPE));
            }
            ExprKind::Quantified { seq, satisfies, .. } => {
                out.push((&**seq, U::empty()));
                out.push((&**satisfies, U::REPEATED | U::IN_SCOPE));
            }
            ExprKind::If { condition, then, otherwise } => {
                out.push((&**condition, U::empty()));
                out.push((&**then, U::empty()));
                out.push((&**otherwise, U::empty()));
            }
            ExprKind::Arithmetic { lhs, rhs, .. }
            | ExprKind::ValueComparison { lhs, rhs, .. }
            | ExprKind::GeneralComparison { lhs, rhs, .. }
            | ExprKind::Boolean { lhs, rhs, .. }
            | ExprKind::Venn { lhs, rhs, .. }
            | ExprKind::SingletonIntersect { lhs, rhs } => {
                out.push((&**lhs, U::empty()));
                out.push((&**rhs, U::empty()));
            }
            ExprKind::Range { start, end } => {
                out.push((&**start, U::empty()));
                out.push((&**end, U::empty()));
            }
            ExprKind::Block(items) => out.extend(items.iter().map(|e| (e, U::empty()))),
            ExprKind::FunctionCall(call) => out.extend(call.args.iter().map(|e| (e, U::empty()))),
            ExprKind::FirstItem(e)
            | ExprKind::LastItem(e)
            | ExprKind::Atomize(e)
            | ExprKind::DocumentSort(e)
            | ExprKind::InstanceOf { operand: e, .. }
            | ExprKind::Convert { operand: e, .. }
            | ExprKind::CheckCardinality { operand: e, .. }
            | ExprKind::CheckItemType { operand: e, .. } => out.push((&**e, U::empty())),
        }
        out
    }

    pub fn children(&self) -> impl Iterator<Item = &Expr> {
        self.operands().into_iter().map(|(e, _)| e)
    }

    /// Mutable operands in the same order as [`Expr::operands`].
    pub fn children_mut(&mut self) -> SmallVec<[&mut Expr; 3]> {
        self.info = OnceLock::new();
        let mut out: SmallVec<[&mut Expr; 3]> = SmallVec::new();
        match &mut self.kind {
            ExprKind::Literal(_) | ExprKind::ContextItem(_) | ExprKind::Root | ExprKind::Axis(_) => {}
            ExprKind::VarRef(_) | ExprKind::Fail(_) => {}
            ExprKind::Slash { start: a, step: b }
            | ExprKind::Filter { base: a, predicate: b, .. }
            | ExprKind::For { seq: a, action: b, .. }
            | ExprKind::Quantified { seq: a, satisfies: b, .. }
            | ExprKind::Arithmetic { lhs: a, rhs: b, .. }
            | ExprKind::ValueComparison { lhs: a, rhs: b, .. }
            | ExprKind::GeneralComparison { lhs: a, rhs: b, .. }
            | ExprKind::Boolean { lhs: a, rhs: b, .. }
            | ExprKind::Venn { lhs: a, rhs: b, .. }
            | ExprKind::SingletonIntersect { lhs: a, rhs: b }
            | ExprKind::Range { start: a, end: b } => {
                out.push(&mut **a);
                out.push(&mut **b);
            }
            ExprKind::Let(l) => {
                let LetExpr { init, action, .. } = &mut **l;
                out.push(init);
                out.push(action);
            }
            ExprKind::If { condition, then, otherwise } => {
                out.push(&mut **condition);
                out.push(&mut **then);
                out.push(&mut **otherwise);
            }
            ExprKind::Block(items) => out.extend(items.iter_mut()),
            ExprKind::FunctionCall(call) => out.extend(call.args.iter_mut()),
            ExprKind::FirstItem(e)
            | ExprKind::LastItem(e)
            | ExprKind::Atomize(e)
            | ExprKind::DocumentSort(e)
            | ExprKind::InstanceOf { operand: e, .. }
            | ExprKind::Convert { operand: e, .. }
            | ExprKind::CheckCardinality { operand: e, .. }
            | ExprKind::CheckItemType { operand: e, .. } => out.push(&mut **e),
        }
        out
    }

    /// Replace the descendant with identity `target` by `replacement`.
    ///
    /// Returns the displaced node, or hands `replacement` back when no node
    /// with that identity exists below `self`.
    pub fn replace_subexpression(&mut self, target: NodeId, replacement: Expr) -> Result<Expr, Expr> {
        let mut replacement = Some(replacement);
        let found = self.replace_inner(target, &mut replacement);
        match (found, replacement) {
            (Some(old), _) => Ok(old),
            (None, Some(r)) => Err(r),
            (None, None) => Err(Expr::empty()),
        }
    }

    fn replace_inner(&mut self, target: NodeId, replacement: &mut Option<Expr>) -> Option<Expr> {
        if !self.contains_id(target) {
            return None;
        }
        self.info = OnceLock::new();
        for child in self.children_mut() {
            if child.id == target {
                let new = replacement.take()?;
                return Some(std::mem::replace(child, new));
            }
            if let Some(old) = child.replace_inner(target, replacement) {
                return Some(old);
            }
        }
        None
    }

    pub fn contains_id(&self, target: NodeId) -> bool {
        self.id == target || self.children().any(|c| c.contains_id(target))
    }

    pub fn find(&self, target: NodeId) -> Option<&Expr> {
        if self.id == target {
            return Some(self);
        }
        self.children().find_map(|c| c.find(target))
    }

    /// Deep copy with fresh node identities.
    ///
    /// Every variable declared inside the copied subtree gets a fresh binding
    /// in `bindings`, and references inside the copy are redirected to it.
    /// References to variables declared outside the subtree keep their
    /// original target.
    pub fn copy(&self, bindings: &mut Bindings) -> Expr {
        let mut rebind = HashMap::new();
        self.copy_with(bindings, &mut rebind)
    }

    fn copy_decl(decl: &VarDecl, bindings: &mut Bindings, rebind: &mut HashMap<BindingId, BindingId>) -> VarDecl {
        let mut out = decl.clone();
        if let Some(old) = decl.binding
            && let Some(fresh) = bindings.duplicate(old)
        {
            rebind.insert(old, fresh);
            out.binding = Some(fresh);
        }
        out
    }

    fn copy_with(&self, bindings: &mut Bindings, rebind: &mut HashMap<BindingId, BindingId>) -> Expr {
        let bx = |e: &Expr, b: &mut Bindings, r: &mut HashMap<BindingId, BindingId>| Box::new(e.copy_with(b, r));
        let kind = match &self.kind {
            ExprKind::Literal(v) => ExprKind::Literal(v.clone()),
            ExprKind::ContextItem(t) => ExprKind::ContextItem(*t),
            ExprKind::Root => ExprKind::Root,
            ExprKind::Axis(step) => ExprKind::Axis(step.clone()),
            ExprKind::Slash { start, step } => {
                ExprKind::Slash { start: bx(start, bindings, rebind), step: bx(step, bindings, rebind) }
            }
            ExprKind::Filter { base, predicate, flags } => ExprKind::Filter {
                base: bx(base, bindings, rebind),
                predicate: bx(predicate, bindings, rebind),
                flags: *flags,
            },
            ExprKind::FirstItem(e) => ExprKind::FirstItem(bx(e, bindings, rebind)),
            ExprKind::LastItem(e) => ExprKind::LastItem(bx(e, bindings, rebind)),
            ExprKind::VarRef(r) => {
                let mut r = r.clone();
                if let Some(VarTarget::Local(id)) = r.target
                    && let Some(fresh) = rebind.get(&id)
                {
                    r.target = Some(VarTarget::Local(*fresh));
                    if let Some(b) = bindings.get_mut(*fresh) {
                        b.ref_count += 1;
                    }
                }
                ExprKind::VarRef(r)
            }
            ExprKind::Let(l) => {
                // The initializer is outside the scope of the new variable.
                let init = l.init.copy_with(bindings, rebind);
                let var = Self::copy_decl(&l.var, bindings, rebind);
                let action = l.action.copy_with(bindings, rebind);
                ExprKind::Let(Box::new(LetExpr { var, init, action, mode: l.mode }))
            }
            ExprKind::For { var, seq, action } => {
                let seq = bx(seq, bindings, rebind);
                let var = Self::copy_decl(var, bindings, rebind);
                ExprKind::For { var, seq, action: bx(action, bindings, rebind) }
            }
            ExprKind::Quantified { quantifier, var, seq, satisfies } => {
                let seq = bx(seq, bindings, rebind);
                let var = Self::copy_decl(var, bindings, rebind);
                ExprKind::Quantified { quantifier: *quantifier, var, seq, satisfies: bx(satisfies, bindings, rebind) }
            }
            ExprKind::If { condition, then, otherwise } => ExprKind::If {
                condition: bx(condition, bindings, rebind),
                then: bx(then, bindings, rebind),
                otherwise: bx(otherwise, bindings, rebind),
            },
            ExprKind::Arithmetic { op, lhs, rhs, compat } => ExprKind::Arithmetic {
                op: *op,
                lhs: bx(lhs, bindings, rebind),
                rhs: bx(rhs, bindings, rebind),
                compat: *compat,
            },
            ExprKind::ValueComparison { op, lhs, rhs } => {
                ExprKind::ValueComparison { op: *op, lhs: bx(lhs, bindings, rebind), rhs: bx(rhs, bindings, rebind) }
            }
            ExprKind::GeneralComparison { op, lhs, rhs } => {
                ExprKind::GeneralComparison { op: *op, lhs: bx(lhs, bindings, rebind), rhs: bx(rhs, bindings, rebind) }
            }
            ExprKind::Boolean { op, lhs, rhs } => {
                ExprKind::Boolean { op: *op, lhs: bx(lhs, bindings, rebind), rhs: bx(rhs, bindings, rebind) }
            }
            ExprKind::Venn { op, lhs, rhs } => {
                ExprKind::Venn { op: *op, lhs: bx(lhs, bindings, rebind), rhs: bx(rhs, bindings, rebind) }
            }
            ExprKind::SingletonIntersect { lhs, rhs } => {
                ExprKind::SingletonIntersect { lhs: bx(lhs, bindings, rebind), rhs: bx(rhs, bindings, rebind) }
            }
            ExprKind::Range { start, end } => {
                ExprKind::Range { start: bx(start, bindings, rebind), end: bx(end, bindings, rebind) }
            }
            ExprKind::Block(items) => ExprKind::Block(items.iter().map(|e| e.copy_with(bindings, rebind)).collect()),
            ExprKind::FunctionCall(call) => ExprKind::FunctionCall(FunctionCall {
                name: call.name.clone(),
                target: call.target,
                args: call.args.iter().map(|e| e.copy_with(bindings, rebind)).collect(),
                result: call.result,
            }),
            ExprKind::InstanceOf { operand, target } => {
                ExprKind::InstanceOf { operand: bx(operand, bindings, rebind), target: *target }
            }
            ExprKind::Atomize(e) => ExprKind::Atomize(bx(e, bindings, rebind)),
            ExprKind::Convert { operand, target } => {
                ExprKind::Convert { operand: bx(operand, bindings, rebind), target: *target }
            }
            ExprKind::CheckCardinality { operand, required, role } => ExprKind::CheckCardinality {
                operand: bx(operand, bindings, rebind),
                required: *required,
                role: role.clone(),
            },
            ExprKind::CheckItemType { operand, required, role } => ExprKind::CheckItemType {
                operand: bx(operand, bindings, rebind),
                required: *required,
                role: role.clone(),
            },
            ExprKind::DocumentSort(e) => ExprKind::DocumentSort(bx(e, bindings, rebind)),
            ExprKind::Fail(err) => ExprKind::Fail(err.clone()),
        };
        Expr { id: NodeId::fresh(), loc: self.loc, kind, info: OnceLock::new() }
    }

    /// Structural equality ignoring node identity and cached information.
    ///
    /// Local variables compare equal when they resolve to the same binding.
    pub fn same_as(&self, other: &Expr) -> bool {
        let shallow = match (&self.kind, &other.kind) {
            (ExprKind::Literal(a), ExprKind::Literal(b)) => a == b,
            (ExprKind::ContextItem(_), ExprKind::ContextItem(_)) | (ExprKind::Root, ExprKind::Root) => true,
            (ExprKind::Axis(a), ExprKind::Axis(b)) => a == b,
            (ExprKind::Slash { .. }, ExprKind::Slash { .. })
            | (ExprKind::Filter { .. }, ExprKind::Filter { .. })
            | (ExprKind::FirstItem(_), ExprKind::FirstItem(_))
            | (ExprKind::LastItem(_), ExprKind::LastItem(_))
            | (ExprKind::If { .. }, ExprKind::If { .. })
            | (ExprKind::Range { .. }, ExprKind::Range { .. })
            | (ExprKind::SingletonIntersect { .. }, ExprKind::SingletonIntersect { .. })
            | (ExprKind::Atomize(_), ExprKind::Atomize(_))
            | (ExprKind::DocumentSort(_), ExprKind::DocumentSort(_)) => true,
            (ExprKind::VarRef(a), ExprKind::VarRef(b)) => a.target == b.target && a.name == b.name,
            (ExprKind::Arithmetic { op: a, compat: ca, .. }, ExprKind::Arithmetic { op: b, compat: cb, .. }) => {
                a == b && ca == cb
            }
            (ExprKind::ValueComparison { op: a, .. }, ExprKind::ValueComparison { op: b, .. })
            | (ExprKind::GeneralComparison { op: a, .. }, ExprKind::GeneralComparison { op: b, .. }) => a == b,
            (ExprKind::Boolean { op: a, .. }, ExprKind::Boolean { op: b, .. }) => a == b,
            (ExprKind::Venn { op: a, .. }, ExprKind::Venn { op: b, .. }) => a == b,
            (ExprKind::Block(a), ExprKind::Block(b)) => a.len() == b.len(),
            (ExprKind::FunctionCall(a), ExprKind::FunctionCall(b)) => {
                a.name == b.name && a.target == b.target && a.args.len() == b.args.len()
            }
            (ExprKind::InstanceOf { target: a, .. }, ExprKind::InstanceOf { target: b, .. }) => a == b,
            (ExprKind::Convert { target: a, .. }, ExprKind::Convert { target: b, .. }) => a == b,
            (ExprKind::CheckCardinality { required: a, .. }, ExprKind::CheckCardinality { required: b, .. }) => a == b,
            (ExprKind::CheckItemType { required: a, .. }, ExprKind::CheckItemType { required: b, .. }) => a == b,
            // Binding constructs and deferred errors are never considered equal.
            _ => false,
        };
        shallow && self.children().zip(other.children()).all(|(a, b)| a.same_as(b))
    }

    pub fn count_nodes(&self) -> usize {
        1 + self.children().map(Expr::count_nodes).sum::<usize>()
    }
}

impl core::fmt::Debug for Expr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Expr#{}({self})", self.id.0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::compiler::build::{add, for_in, int, ints, let_in, seq, var};
    use crate::compiler::package::{Declarations, Package};
    use crate::compiler::{CompiledExpression, resolve, slots, typecheck};
    use crate::engine::runtime::{DynamicContextBuilder, StaticContext};
    use crate::model::simple::SimpleNode;
    use crate::xdm::XdmItem;

    fn resolved(expr: Expr, bindings: &mut Bindings) -> Expr {
        resolve::resolve(expr, &[], &StaticContext::default(), &Declarations::default(), bindings).unwrap().0
    }

    fn local_targets(expr: &Expr) -> Vec<BindingId> {
        let mut out = Vec::new();
        if let ExprKind::VarRef(VarRef { target: Some(VarTarget::Local(id)), .. }) = expr.kind() {
            out.push(*id);
        }
        for c in expr.children() {
            out.extend(local_targets(c));
        }
        out
    }

    fn integers(expr: Expr, mut bindings: Bindings) -> Vec<i64> {
        let ctx = StaticContext::default();
        let mut expr = typecheck::check(expr, &ctx, &Declarations::default(), &mut bindings).unwrap();
        let frame_size = slots::allocate(&mut expr, &mut [], &mut bindings).unwrap();
        let compiled = CompiledExpression { expr, frame_size, package: Arc::new(Package::empty()) };
        compiled
            .evaluate_all(&DynamicContextBuilder::<SimpleNode>::new().build())
            .unwrap()
            .into_iter()
            .map(|item| match item {
                XdmItem::Atomic(XdmAtomicValue::Integer(i)) => i,
                other => panic!("expected integer, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn copied_let_declares_a_fresh_binding() {
        let mut bindings = Bindings::new();
        let original = resolved(let_in("x", int(1), add(var("x"), var("x"))), &mut bindings);
        let copy = original.copy(&mut bindings);

        let (ExprKind::Let(a), ExprKind::Let(b)) = (original.kind(), copy.kind()) else {
            panic!("expected two lets");
        };
        let (old, fresh) = (a.var.binding.unwrap(), b.var.binding.unwrap());
        assert_ne!(old, fresh);
        assert!(bindings.contains(old) && bindings.contains(fresh));
        assert_ne!(original.id(), copy.id());
        assert_eq!(local_targets(&original), [old, old]);
        assert_eq!(local_targets(&copy), [fresh, fresh]);

        assert_eq!(integers(seq(vec![original, copy]), bindings), [2, 2]);
    }

    #[test]
    fn copied_for_keeps_outer_references() {
        let mut bindings = Bindings::new();
        let body = for_in("v", ints([1, 2]), add(var("v"), var("y")));
        let mut outer = resolved(let_in("y", int(10), body), &mut bindings);
        let ExprKind::Let(l) = outer.kind() else { panic!("expected let") };
        let y = l.var.binding.unwrap();
        let ExprKind::For { var: v, .. } = l.action.kind() else { panic!("expected for") };
        let v = v.binding.unwrap();

        let copy = l.action.copy(&mut bindings);
        let ExprKind::For { var: fresh, .. } = copy.kind() else { panic!("expected for") };
        let fresh = fresh.binding.unwrap();
        assert_ne!(fresh, v);
        assert_eq!(local_targets(&copy), [fresh, y]);
        assert_eq!(local_targets(&l.action), [v, y]);

        // Evaluate the original loop next to its copy, both inside the scope of `$y`.
        let action_id = l.action.id();
        let placeholder = Expr::empty();
        let placeholder_id = placeholder.id();
        let Ok(original) = outer.replace_subexpression(action_id, placeholder) else {
            panic!("action not found");
        };
        assert!(outer.replace_subexpression(placeholder_id, seq(vec![original, copy])).is_ok());
        assert_eq!(integers(outer, bindings), [11, 12, 11, 12]);
    }

    #[test]
    fn replacing_a_missing_node_hands_the_replacement_back() {
        let mut e = add(int(1), int(2));
        let elsewhere = int(3);
        let rejected = e.replace_subexpression(elsewhere.id(), int(4)).unwrap_err();
        assert_eq!(rejected.as_literal().map(<[_]>::to_vec), Some(vec![XdmAtomicValue::Integer(4)]));
    }
}
