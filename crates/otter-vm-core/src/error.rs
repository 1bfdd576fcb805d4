//! Runtime error types

use thiserror::Error;

use crate::value::Value;

/// A thrown JavaScript value.
///
/// Stubs and MIR propagate this through `Result`; it is the only
/// script-visible failure either tier can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("uncaught exception: {value:?}")]
pub struct Exception {
    /// The thrown value
    pub value: Value,
}

impl Exception {
    /// Wrap a thrown value.
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

/// Result type for operations that may throw.
pub type VmResult<T> = std::result::Result<T, Exception>;
