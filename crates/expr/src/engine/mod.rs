pub(crate) mod context;
pub(crate) mod evaluator;
pub mod functions;
pub mod iter;
pub mod runtime;
pub(crate) mod value;
