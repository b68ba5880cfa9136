//! Built-in function library.
//!
//! Only the functions the core needs are provided: focus accessors, boolean
//! and cardinality tests, a handful of string and numeric helpers, and
//! `fn:error`. Each function declares its parameter types (used by the type
//! checker to insert coercions), its result type, the parts of the dynamic
//! context it reads, and whether calls on literals may be constant folded.

use crate::compiler::ir::Expr;
use crate::compiler::properties::atomized_type;
use crate::consts::ERR_NS;
use crate::engine::context::EvalContext;
use crate::engine::evaluator::{self, numeric};
use crate::engine::iter::{self, SeqIter};
use crate::engine::runtime::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::types::{AtomicType, Cardinality, Dependencies, ItemType, SequenceType};
use crate::xdm::{ExpandedName, XdmAtomicValue, XdmItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFn {
    True,
    False,
    Not,
    Boolean,
    Position,
    Last,
    Count,
    Empty,
    Exists,
    String,
    Data,
    Number,
    Concat,
    StringLength,
    LocalName,
    Root,
    Sum,
    CurrentDateTime,
    CurrentDate,
    Error,
}

const ANY: SequenceType = SequenceType::ANY;
const OPT_ITEM: SequenceType = SequenceType::new(ItemType::AnyItem, Cardinality::ZERO_OR_ONE);
const OPT_NODE: SequenceType = SequenceType::new(ItemType::AnyNode, Cardinality::ZERO_OR_ONE);
const OPT_ATOMIC: SequenceType = SequenceType::atomic(AtomicType::AnyAtomic, Cardinality::ZERO_OR_ONE);
const OPT_STRING: SequenceType = SequenceType::atomic(AtomicType::String, Cardinality::ZERO_OR_ONE);
const ATOMICS: SequenceType = SequenceType::atomic(AtomicType::AnyAtomic, Cardinality::ZERO_OR_MORE);

impl BuiltinFn {
    /// Function named `local` in the function namespace accepting `arity` arguments.
    pub fn lookup(local: &str, arity: usize) -> Option<BuiltinFn> {
        use BuiltinFn as F;
        let f = match local {
            "true" => F::True,
            "false" => F::False,
            "not" => F::Not,
            "boolean" => F::Boolean,
            "position" => F::Position,
            "last" => F::Last,
            "count" => F::Count,
            "empty" => F::Empty,
            "exists" => F::Exists,
            "string" => F::String,
            "data" => F::Data,
            "number" => F::Number,
            "concat" => F::Concat,
            "string-length" => F::StringLength,
            "local-name" => F::LocalName,
            "root" => F::Root,
            "sum" => F::Sum,
            "current-dateTime" => F::CurrentDateTime,
            "current-date" => F::CurrentDate,
            "error" => F::Error,
            _ => return None,
        };
        let (min, max) = f.arity_range();
        (arity >= min && arity <= max).then_some(f)
    }

    pub fn name(self) -> &'static str {
        use BuiltinFn as F;
        match self {
            F::True => "true",
            F::False => "false",
            F::Not => "not",
            F::Boolean => "boolean",
            F::Position => "position",
            F::Last => "last",
            F::Count => "count",
            F::Empty => "empty",
            F::Exists => "exists",
            F::String => "string",
            F::Data => "data",
            F::Number => "number",
            F::Concat => "concat",
            F::StringLength => "string-length",
            F::LocalName => "local-name",
            F::Root => "root",
            F::Sum => "sum",
            F::CurrentDateTime => "current-dateTime",
            F::CurrentDate => "current-date",
            F::Error => "error",
        }
    }

    /// Accepted argument counts after the zero-arity forms that default to
    /// the context item have been expanded.
    fn arity_range(self) -> (usize, usize) {
        use BuiltinFn as F;
        match self {
            F::True | F::False | F::Position | F::Last | F::CurrentDateTime | F::CurrentDate => (0, 0),
            F::Not | F::Boolean | F::Count | F::Empty | F::Exists | F::Sum => (1, 1),
            F::String | F::Data | F::Number | F::StringLength | F::LocalName | F::Root => (0, 1),
            F::Concat => (2, usize::MAX),
            F::Error => (0, 2),
        }
    }

    /// Zero-arity forms that take the context item as implicit argument.
    pub fn defaults_to_context_item(self) -> bool {
        matches!(
            self,
            BuiltinFn::String
                | BuiltinFn::Data
                | BuiltinFn::Number
                | BuiltinFn::StringLength
                | BuiltinFn::LocalName
                | BuiltinFn::Root
        )
    }

    pub fn param_type(self, _index: usize) -> SequenceType {
        use BuiltinFn as F;
        match self {
            F::Not | F::Boolean | F::Count | F::Empty | F::Exists | F::Data => ANY,
            F::String => OPT_ITEM,
            F::Number | F::Concat => OPT_ATOMIC,
            F::StringLength | F::Error => OPT_STRING,
            F::LocalName | F::Root => OPT_NODE,
            F::Sum => ATOMICS,
            F::True | F::False | F::Position | F::Last | F::CurrentDateTime | F::CurrentDate => ANY,
        }
    }

    pub fn result_type(self, args: &[Expr]) -> (ItemType, Cardinality) {
        use BuiltinFn as F;
        let one = Cardinality::EXACTLY_ONE;
        match self {
            F::True | F::False | F::Not | F::Boolean | F::Empty | F::Exists => (ItemType::BOOLEAN, one),
            F::Position | F::Last | F::Count | F::StringLength => (ItemType::INTEGER, one),
            F::String | F::Concat | F::LocalName => (ItemType::STRING, one),
            F::Number => (ItemType::DOUBLE, one),
            F::Data => match args.first() {
                Some(a) => (atomized_type(a.item_type()), a.cardinality()),
                None => (ItemType::ANY_ATOMIC, Cardinality::ZERO_OR_MORE),
            },
            F::Root => {
                let card = args.first().map_or(Cardinality::ZERO_OR_ONE, Expr::cardinality);
                let card = if card == Cardinality::EXACTLY_ONE { one } else { Cardinality::ZERO_OR_ONE };
                (ItemType::AnyNode, card)
            }
            F::Sum => {
                let t = match args.first().map(Expr::item_type) {
                    Some(ItemType::Atomic(t)) if t.is_subtype_of(AtomicType::Integer) => AtomicType::Integer,
                    Some(ItemType::Atomic(AtomicType::Double | AtomicType::UntypedAtomic)) => AtomicType::Double,
                    _ => AtomicType::Numeric,
                };
                (ItemType::Atomic(t), one)
            }
            F::CurrentDateTime => (ItemType::Atomic(AtomicType::DateTime), one),
            F::CurrentDate => (ItemType::Atomic(AtomicType::Date), one),
            F::Error => (ItemType::Empty, Cardinality::ZERO_OR_MORE),
        }
    }

    pub fn dependencies(self) -> Dependencies {
        match self {
            BuiltinFn::Position => Dependencies::POSITION,
            BuiltinFn::Last => Dependencies::LAST,
            BuiltinFn::CurrentDateTime | BuiltinFn::CurrentDate => Dependencies::CURRENT_DATETIME,
            _ => Dependencies::empty(),
        }
    }

    /// Whether a call whose arguments are all literals may be evaluated at
    /// compile time.
    pub fn foldable(self) -> bool {
        !matches!(
            self,
            BuiltinFn::Position
                | BuiltinFn::Last
                | BuiltinFn::CurrentDateTime
                | BuiltinFn::CurrentDate
                | BuiltinFn::Error
        )
    }
}

fn boolean<'a, N: XdmNode>(b: bool) -> SeqIter<'a, N> {
    iter::single(XdmItem::Atomic(XdmAtomicValue::Boolean(b)))
}

fn integer<'a, N: XdmNode>(i: usize) -> Result<SeqIter<'a, N>, Error> {
    let i = i64::try_from(i).map_err(|_| Error::from_code(ErrorCode::FOAR0002, "integer overflow"))?;
    Ok(iter::single(XdmItem::Atomic(XdmAtomicValue::Integer(i))))
}

fn string<'a, N: XdmNode>(s: String) -> SeqIter<'a, N> {
    iter::single(XdmItem::Atomic(XdmAtomicValue::String(s)))
}

fn item_string<N: XdmNode>(item: &XdmItem<N>) -> String {
    match item {
        XdmItem::Node(n) => n.string_value(),
        XdmItem::Atomic(a) => a.string_value(),
    }
}

fn optional_node<'a, N: XdmNode>(arg: &'a Expr, ctx: &EvalContext<'a, N>, f: BuiltinFn) -> Result<Option<N>, Error> {
    match evaluator::evaluate_item(arg, ctx)? {
        None => Ok(None),
        Some(XdmItem::Node(n)) => Ok(Some(n)),
        Some(XdmItem::Atomic(_)) => {
            Err(Error::from_code(ErrorCode::XPTY0004, format!("argument of {}() is not a node", f.name())))
        }
    }
}

fn optional_string<'a, N: XdmNode>(arg: Option<&'a Expr>, ctx: &EvalContext<'a, N>) -> Result<Option<String>, Error> {
    match arg {
        Some(a) => Ok(evaluator::evaluate_item(a, ctx)?.map(|i| item_string(&i))),
        None => Ok(None),
    }
}

pub(crate) fn call<'a, N: XdmNode>(
    f: BuiltinFn,
    args: &'a [Expr],
    ctx: &EvalContext<'a, N>,
) -> Result<SeqIter<'a, N>, Error> {
    use BuiltinFn as F;
    let arg = |i: usize| {
        args.get(i)
            .ok_or_else(|| Error::from_code(ErrorCode::XPST0017, format!("missing argument {i} of {}()", f.name())))
    };
    match f {
        F::True => Ok(boolean(true)),
        F::False => Ok(boolean(false)),
        F::Boolean => Ok(boolean(evaluator::effective_boolean_value(arg(0)?, ctx)?)),
        F::Not => Ok(boolean(!evaluator::effective_boolean_value(arg(0)?, ctx)?)),
        F::Position => integer(ctx.position()?),
        F::Last => integer(ctx.last()?),
        F::Count => {
            let mut it = evaluator::iterate(arg(0)?, ctx)?;
            integer(iter::count(&mut it)?)
        }
        F::Empty | F::Exists => {
            let mut it = evaluator::iterate(arg(0)?, ctx)?;
            let any = it.next_item().transpose()?.is_some();
            it.close();
            Ok(boolean(if f == F::Empty { !any } else { any }))
        }
        F::String => Ok(string(evaluator::evaluate_item(arg(0)?, ctx)?.map(|i| item_string(&i)).unwrap_or_default())),
        F::Data => Ok(Box::new(evaluator::cursors::AtomizeIter::new(evaluator::iterate(arg(0)?, ctx)?))),
        F::Number => {
            let d = match evaluator::evaluate_item(arg(0)?, ctx)? {
                None => f64::NAN,
                Some(XdmItem::Atomic(a)) => numeric::to_double(&a).unwrap_or(f64::NAN),
                Some(XdmItem::Node(n)) => numeric::string_to_double(&n.string_value()).unwrap_or(f64::NAN),
            };
            Ok(iter::single(XdmItem::Atomic(XdmAtomicValue::Double(d))))
        }
        F::Concat => {
            let mut out = String::new();
            for a in args {
                if let Some(item) = evaluator::evaluate_item(a, ctx)? {
                    out.push_str(&item_string(&item));
                }
            }
            Ok(string(out))
        }
        F::StringLength => {
            let s = optional_string(Some(arg(0)?), ctx)?.unwrap_or_default();
            integer(s.chars().count())
        }
        F::LocalName => {
            let name = optional_node(arg(0)?, ctx, f)?.and_then(|n| n.name()).map(|q| q.local).unwrap_or_default();
            Ok(string(name))
        }
        F::Root => Ok(iter::optional(optional_node(arg(0)?, ctx, f)?.map(|n| XdmItem::Node(n.root())))),
        F::Sum => {
            let mut it = evaluator::iterate(arg(0)?, ctx)?;
            let mut total = XdmAtomicValue::Integer(0);
            while let Some(item) = it.next_item() {
                let v = match item? {
                    XdmItem::Atomic(XdmAtomicValue::UntypedAtomic(s)) => XdmAtomicValue::Double(
                        numeric::string_to_double(&s).ok_or_else(|| {
                            Error::from_code(ErrorCode::FORG0001, format!("cannot convert \"{s}\" to xs:double"))
                        })?,
                    ),
                    XdmItem::Atomic(a) if a.is_numeric() => a,
                    other => {
                        return Err(Error::from_code(
                            ErrorCode::FORG0006,
                            format!("sum() requires numeric values, found {other}"),
                        ));
                    }
                };
                total = numeric::arithmetic(crate::compiler::ir::ArithOp::Add, &total, &v)?;
            }
            Ok(iter::single(XdmItem::Atomic(total)))
        }
        F::CurrentDateTime => Ok(iter::single(XdmItem::Atomic(XdmAtomicValue::DateTime(ctx.shared.now)))),
        F::CurrentDate => {
            let now = ctx.shared.now;
            Ok(iter::single(XdmItem::Atomic(XdmAtomicValue::Date {
                date: now.date_naive(),
                tz: Some(*now.offset()),
            })))
        }
        F::Error => {
            let code = optional_string(args.first(), ctx)?;
            let description = optional_string(args.get(1), ctx)?;
            let code = match code {
                Some(c) => match c.strip_prefix("err:") {
                    Some(local) => ExpandedName::new(Some(ERR_NS), local),
                    None => ExpandedName::new(None, &c),
                },
                None => ErrorCode::FOER0000.qname(),
            };
            let message = description.unwrap_or_else(|| "error() called".to_string());
            Err(Error::new_qname(code, message))
        }
    }
}
