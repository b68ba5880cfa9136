/// Namespace of the W3C error codes (`err:` prefix).
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";
/// Namespace of the built-in function library.
pub const FNS: &str = "http://www.w3.org/2005/xpath-functions";
/// Namespace of XML Schema built-in types.
pub const XS: &str = "http://www.w3.org/2001/XMLSchema";
/// Namespace for compiler-generated variables (loop-invariant promotion).
pub const INTERNAL_NS: &str = "urn:xslt-expr:internal";
/// Namespace for implementation-defined error codes.
pub const EXT_ERR_NS: &str = "urn:xslt-expr:errors";

/// Largest sequence a range expression may produce.
pub const MAX_SEQUENCE_LENGTH: i64 = i32::MAX as i64;
/// Ranges up to this length are folded into literals at compile time.
pub const MAX_FOLDED_RANGE: i64 = 256;
