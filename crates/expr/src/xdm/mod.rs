use chrono::{DateTime, FixedOffset, NaiveDate};
use core::fmt;
use string_cache::DefaultAtom;

use crate::engine::runtime::Error;
use crate::types::AtomicType;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedName {
    pub ns_uri: Option<DefaultAtom>,
    pub local: DefaultAtom,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<&str>, local: &str) -> Self {
        Self {
            ns_uri: ns_uri.map(DefaultAtom::from),
            local: DefaultAtom::from(local),
        }
    }

    pub fn ns(&self) -> Option<&str> {
        self.ns_uri.as_deref()
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(ns) => write!(f, "Q{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Atomic values understood by the evaluator.
///
/// Decimals are carried as `f64`; the engine never needs arbitrary precision
/// and keeping the representation flat lets literals stay `Send + Sync`.
#[derive(Debug, Clone, PartialEq)]
pub enum XdmAtomicValue {
    Boolean(bool),
    String(String),
    UntypedAtomic(String),
    AnyUri(String),
    Integer(i64),
    Decimal(f64),
    Double(f64),
    Float(f32),
    DateTime(DateTime<FixedOffset>),
    Date {
        date: NaiveDate,
        tz: Option<FixedOffset>,
    },
}

impl XdmAtomicValue {
    pub fn atomic_type(&self) -> AtomicType {
        match self {
            Self::Boolean(_) => AtomicType::Boolean,
            Self::String(_) => AtomicType::String,
            Self::UntypedAtomic(_) => AtomicType::UntypedAtomic,
            Self::AnyUri(_) => AtomicType::AnyUri,
            Self::Integer(_) => AtomicType::Integer,
            Self::Decimal(_) => AtomicType::Decimal,
            Self::Double(_) => AtomicType::Double,
            Self::Float(_) => AtomicType::Float,
            Self::DateTime(_) => AtomicType::DateTime,
            Self::Date { .. } => AtomicType::Date,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Integer(_) | Self::Decimal(_) | Self::Double(_) | Self::Float(_)
        )
    }

    /// Numeric value widened to `f64`; `None` for non-numeric values.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Decimal(d) | Self::Double(d) => Some(*d),
            Self::Float(f) => Some(f64::from(*f)),
            _ => None,
        }
    }

    /// String-like values (string, untypedAtomic, anyURI) as `&str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::UntypedAtomic(s) | Self::AnyUri(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical lexical representation.
    pub fn string_value(&self) -> String {
        match self {
            Self::Boolean(b) => b.to_string(),
            Self::String(s) | Self::UntypedAtomic(s) | Self::AnyUri(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Decimal(d) | Self::Double(d) => format_double(*d),
            Self::Float(f) => format_double(f64::from(*f)),
            Self::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            Self::Date { date, tz } => match tz {
                Some(tz) => format!("{}{}", date.format("%Y-%m-%d"), format_tz(*tz)),
                None => date.format("%Y-%m-%d").to_string(),
            },
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "INF".to_string() } else { "-INF".to_string() }
    } else if d == d.trunc() && d.abs() < 1e15 {
        format!("{}", d as i64)
    } else {
        format!("{d}")
    }
}

fn format_tz(tz: FixedOffset) -> String {
    let secs = tz.local_minus_utc();
    if secs == 0 {
        return "Z".to_string();
    }
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!("{sign}{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
}

impl fmt::Display for XdmAtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Self::UntypedAtomic(s) => write!(f, "xs:untypedAtomic(\"{s}\")"),
            Self::AnyUri(s) => write!(f, "xs:anyURI(\"{s}\")"),
            Self::Boolean(b) => write!(f, "{b}()"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(_) => write!(f, "xs:decimal(\"{}\")", self.string_value()),
            Self::Double(_) => write!(f, "xs:double(\"{}\")", self.string_value()),
            Self::Float(_) => write!(f, "xs:float(\"{}\")", self.string_value()),
            Self::DateTime(_) => write!(f, "xs:dateTime(\"{}\")", self.string_value()),
            Self::Date { .. } => write!(f, "xs:date(\"{}\")", self.string_value()),
        }
    }
}

pub type XdmSequence<N> = Vec<XdmItem<N>>;
pub type XdmItemResult<N> = Result<XdmItem<N>, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum XdmItem<N> {
    Node(N),
    Atomic(XdmAtomicValue),
}

impl<N> XdmItem<N> {
    pub fn is_node(&self) -> bool {
        matches!(self, XdmItem::Node(_))
    }

    pub fn as_node(&self) -> Option<&N> {
        match self {
            XdmItem::Node(n) => Some(n),
            XdmItem::Atomic(_) => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&XdmAtomicValue> {
        match self {
            XdmItem::Atomic(a) => Some(a),
            XdmItem::Node(_) => None,
        }
    }
}

// Convenience conversion: allow passing a node directly where an XdmItem<N> is expected.
impl<N> From<N> for XdmItem<N> {
    fn from(n: N) -> Self {
        XdmItem::Node(n)
    }
}

impl<N> fmt::Display for XdmItem<N>
where
    N: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdmItem::Node(_) => write!(f, "<node>"),
            XdmItem::Atomic(a) => write!(f, "{a}"),
        }
    }
}
