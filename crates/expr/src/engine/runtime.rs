use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::consts::{ERR_NS, FNS, EXT_ERR_NS};
use crate::types::ItemType;
use crate::xdm::{ExpandedName, XdmItem, XdmSequence};

/// Error codes raised by the compiler and the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    XPST0008, // undeclared variable
    XPST0017, // unknown function or wrong arity
    XPTY0004, // type error
    XPTY0018, // path result mixes nodes and atomic values
    XPTY0019, // path step applied to an atomic value
    XPTY0020, // axis step with an atomic context item
    XPDY0002, // context item absent
    XPDY0050, // root of the context node is not a document node
    XPDY0130, // sequence too long
    FORG0001, // invalid lexical value in cast
    FORG0006, // invalid argument type (effective boolean value)
    FOAR0001, // division by zero
    FOAR0002, // numeric overflow
    FOER0000, // fn:error and unspecified errors
    FOTY0012, // atomizing an item without typed value
    XTDE0050, // required parameter not supplied
    XTDE0640, // circular global variable
    SXLM0001, // call depth exceeded
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::XPST0008 => "XPST0008",
            ErrorCode::XPST0017 => "XPST0017",
            ErrorCode::XPTY0004 => "XPTY0004",
            ErrorCode::XPTY0018 => "XPTY0018",
            ErrorCode::XPTY0019 => "XPTY0019",
            ErrorCode::XPTY0020 => "XPTY0020",
            ErrorCode::XPDY0002 => "XPDY0002",
            ErrorCode::XPDY0050 => "XPDY0050",
            ErrorCode::XPDY0130 => "XPDY0130",
            ErrorCode::FORG0001 => "FORG0001",
            ErrorCode::FORG0006 => "FORG0006",
            ErrorCode::FOAR0001 => "FOAR0001",
            ErrorCode::FOAR0002 => "FOAR0002",
            ErrorCode::FOER0000 => "FOER0000",
            ErrorCode::FOTY0012 => "FOTY0012",
            ErrorCode::XTDE0050 => "XTDE0050",
            ErrorCode::XTDE0640 => "XTDE0640",
            ErrorCode::SXLM0001 => "SXLM0001",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// Implementation-defined codes live outside the W3C error namespace.
    fn namespace(self) -> &'static str {
        match self {
            ErrorCode::SXLM0001 | ErrorCode::Unknown => EXT_ERR_NS,
            _ => ERR_NS,
        }
    }

    pub fn qname(self) -> ExpandedName {
        ExpandedName::new(Some(self.namespace()), self.as_str())
    }

    /// Parse `err:XXXX0000`; anything unrecognized maps to `Unknown`.
    pub fn from_code(s: &str) -> Self {
        use ErrorCode::*;
        let local = s.strip_prefix("err:").unwrap_or(s);
        [
            XPST0008, XPST0017, XPTY0004, XPTY0018, XPTY0019, XPTY0020, XPDY0002, XPDY0050, XPDY0130, FORG0001,
            FORG0006, FOAR0001, FOAR0002, FOER0000, FOTY0012, XTDE0050, XTDE0640, SXLM0001,
        ]
        .into_iter()
        .find(|c| c.as_str() == local)
        .unwrap_or(Unknown)
    }
}

/// Whether an error was detected during compilation or evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Static,
    Dynamic,
}

/// Position of an expression in the front end's source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ExpandedName,
    pub message: String,
    pub kind: ErrorKind,
    pub location: Option<SourceLocation>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new_qname(code: ExpandedName, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            kind: ErrorKind::Dynamic,
            location: None,
            source: None,
        }
    }

    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::new_qname(code.qname(), msg)
    }

    pub fn static_error(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::from_code(code, msg).as_static()
    }

    #[must_use]
    pub fn as_static(mut self) -> Self {
        self.kind = ErrorKind::Static;
        self
    }

    pub fn is_static(&self) -> bool {
        self.kind == ErrorKind::Static
    }

    /// Attach a location unless one is already known; the innermost wins.
    #[must_use]
    pub fn with_location(mut self, location: Option<SourceLocation>) -> Self {
        if self.location.is_none() {
            self.location = location;
        }
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>) -> Self {
        self.source = source.into();
        self
    }

    pub fn code_enum(&self) -> ErrorCode {
        match self.code.ns() {
            Some(ERR_NS) | Some(EXT_ERR_NS) => ErrorCode::from_code(&self.code.local),
            _ => ErrorCode::Unknown,
        }
    }

    pub fn format_code(&self) -> String {
        match self.code.ns() {
            Some(ERR_NS) => format!("err:{}", self.code.local),
            _ => self.code.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Static => "static error",
            ErrorKind::Dynamic => "error",
        };
        write!(f, "{kind}: {} ({})", self.message, self.format_code())?;
        if let Some(loc) = &self.location {
            write!(f, " at {loc}")?;
        }
        Ok(())
    }
}

/// Static errors of a batch compilation, in the order they were found.
#[derive(Debug, Clone, thiserror::Error)]
pub struct StaticErrors(pub Vec<Error>);

impl StaticErrors {
    pub fn first(&self) -> Option<&Error> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Error> for StaticErrors {
    fn from(e: Error) -> Self {
        StaticErrors(vec![e])
    }
}

impl fmt::Display for StaticErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => f.write_str("no static errors"),
            [one] => write!(f, "{one}"),
            many => {
                writeln!(f, "{} static errors:", many.len())?;
                for e in many {
                    writeln!(f, "  {e}")?;
                }
                Ok(())
            }
        }
    }
}

/// Output destination for push-mode evaluation.
pub trait Receiver<N> {
    fn append(&mut self, item: XdmItem<N>) -> Result<(), Error>;
}

impl<N> Receiver<N> for Vec<XdmItem<N>> {
    fn append(&mut self, item: XdmItem<N>) -> Result<(), Error> {
        self.push(item);
        Ok(())
    }
}

/// Switches for the rewrite engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerOptions {
    pub inline_variables: bool,
    pub extract_invariants: bool,
    pub rewrite_paths: bool,
    pub merge_filters: bool,
    /// Upper bound on re-optimization rounds of one `let`.
    pub max_let_retries: u32,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            inline_variables: true,
            extract_invariants: true,
            rewrite_paths: true,
            merge_filters: true,
            max_let_retries: 5,
        }
    }
}

impl OptimizerOptions {
    /// Type checking only; no rewrite beyond what typing itself requires.
    pub fn disabled() -> Self {
        Self {
            inline_variables: false,
            extract_invariants: false,
            rewrite_paths: false,
            merge_filters: false,
            max_let_retries: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inline_variables || self.extract_invariants || self.rewrite_paths || self.merge_filters
    }
}

#[derive(Debug, Clone)]
pub struct StaticContext {
    pub default_function_namespace: Option<String>,
    /// Static type of the context item; `None` when it is known to be absent.
    pub context_item_type: Option<ItemType>,
    /// XPath 1.0 compatible arithmetic: operands are reduced to their first
    /// item and converted to `xs:double`, empty becomes NaN.
    pub backwards_compatible: bool,
    pub optimizer: OptimizerOptions,
}

impl Default for StaticContext {
    fn default() -> Self {
        Self {
            default_function_namespace: Some(FNS.to_string()),
            context_item_type: Some(ItemType::AnyItem),
            backwards_compatible: false,
            optimizer: OptimizerOptions::default(),
        }
    }
}

/// Builder for `StaticContext`.
///
/// The built context is captured by value when an expression is compiled;
/// changing it afterwards has no effect on already compiled expressions.
pub struct StaticContextBuilder {
    ctx: StaticContext,
}

impl Default for StaticContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: StaticContext::default(),
        }
    }

    pub fn with_default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_function_namespace = Some(uri.into());
        self
    }

    pub fn with_context_item_type(mut self, item_type: ItemType) -> Self {
        self.ctx.context_item_type = Some(item_type);
        self
    }

    /// Compile for evaluation without any context item.
    pub fn without_context_item(mut self) -> Self {
        self.ctx.context_item_type = None;
        self
    }

    pub fn with_backwards_compatible(mut self, on: bool) -> Self {
        self.ctx.backwards_compatible = on;
        self
    }

    pub fn with_optimizer(mut self, options: OptimizerOptions) -> Self {
        self.ctx.optimizer = options;
        self
    }

    pub fn build(self) -> StaticContext {
        self.ctx
    }
}

pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

#[derive(Debug, Clone)]
pub struct DynamicContext<N> {
    pub context_item: Option<XdmItem<N>>,
    /// Values of external parameters, by name.
    pub variables: HashMap<ExpandedName, XdmSequence<N>>,
    pub now: Option<chrono::DateTime<chrono::FixedOffset>>,
    pub max_call_depth: usize,
}

impl<N> Default for DynamicContext<N> {
    fn default() -> Self {
        Self {
            context_item: None,
            variables: HashMap::new(),
            now: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

pub struct DynamicContextBuilder<N> {
    ctx: DynamicContext<N>,
}

impl<N> Default for DynamicContextBuilder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> DynamicContextBuilder<N> {
    pub fn new() -> Self {
        Self {
            ctx: DynamicContext::default(),
        }
    }

    pub fn with_context_item(mut self, item: impl Into<XdmItem<N>>) -> Self {
        self.ctx.context_item = Some(item.into());
        self
    }

    pub fn with_variable(mut self, name: ExpandedName, value: impl Into<XdmSequence<N>>) -> Self {
        self.ctx.variables.insert(name, value.into());
        self
    }

    // Fixed instant for current-dateTime() and friends
    pub fn with_now(mut self, now: chrono::DateTime<chrono::FixedOffset>) -> Self {
        self.ctx.now = Some(now);
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.ctx.max_call_depth = depth;
        self
    }

    pub fn build(self) -> DynamicContext<N> {
        self.ctx
    }
}
