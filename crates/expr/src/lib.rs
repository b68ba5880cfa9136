//! Compiler and evaluator for the expression language of an XSLT-style
//! transformation engine.
//!
//! Front ends hand over expression trees built with [`compiler::build`]; the
//! compiler resolves variable names to bindings, type checks and rewrites the
//! tree, allocates stack-frame slots and produces a [`CompiledExpression`]
//! that can be evaluated lazily, concurrently and repeatedly against any
//! [`XdmNode`] implementation.
//!
//! ```
//! use xslt_expr::compiler::build::{add, int, let_in, var};
//! use xslt_expr::{compile, DynamicContextBuilder, SimpleNode, StaticContext};
//! use xslt_expr::xdm::{XdmAtomicValue, XdmItem};
//!
//! let expr = let_in("x", int(40), add(var("x"), int(2)));
//! let compiled = compile(expr, &StaticContext::default()).unwrap();
//! let ctx = DynamicContextBuilder::<SimpleNode>::new().build();
//! let out = compiled.evaluate_all(&ctx).unwrap();
//! assert_eq!(out, vec![XdmItem::Atomic(XdmAtomicValue::Integer(42))]);
//! ```

pub mod compiler;
pub mod consts;
pub mod engine;
pub mod model;
pub mod streaming;
pub mod types;
pub mod xdm;

pub use compiler::package::{Package, PackageBuilder};
pub use compiler::{CompiledExpression, ExpressionCompiler, compile};
pub use engine::iter::{FocusIterator, SequenceIterator};
pub use engine::runtime::{
    DynamicContext, DynamicContextBuilder, Error, ErrorCode, ErrorKind, OptimizerOptions, Receiver,
    SourceLocation, StaticContext, StaticContextBuilder, StaticErrors,
};
pub use model::simple::{SimpleNode, SimpleNodeBuilder, attr, doc as simple_doc, elem, text};
pub use model::{NodeKind, QName, XdmNode};
pub use types::{AtomicType, Cardinality, ItemType, SequenceType};
pub use xdm::{ExpandedName, XdmAtomicValue, XdmItem, XdmSequence};

