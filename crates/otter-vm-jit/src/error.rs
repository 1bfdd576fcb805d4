//! Baseline tier errors
//!
//! None of these is script-visible. A failed attach leaves the IC chain as
//! it was and execution continues through the fallback.

use otter_cacheir::CacheIRError;

/// Errors produced while compiling or attaching a Baseline stub.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JitError {
    /// The stub generator produced a program the validator rejects.
    #[error("invalid CacheIR: {0}")]
    InvalidCacheIR(#[from] CacheIRError),

    /// Code or stub memory could not be allocated.
    #[error("out of memory allocating {what}")]
    OutOfMemory {
        /// What was being allocated
        what: &'static str,
    },

    /// A stub space reached its byte limit.
    #[error("stub space exhausted: {used} + {requested} bytes exceeds limit {limit}")]
    StubSpaceExhausted {
        /// Bytes already handed out
        used: usize,
        /// Size of the failed request
        requested: usize,
        /// Configured limit
        limit: usize,
    },

    /// The fallback already carries the maximum number of stubs.
    #[error("IC chain at pc {pc} is full ({max} stubs)")]
    ChainFull {
        /// IC site
        pc: u32,
        /// Configured maximum
        max: usize,
    },
}

impl JitError {
    /// Whether the error is an allocation failure the caller recovers from
    /// by continuing without the stub.
    pub fn is_oom(&self) -> bool {
        matches!(
            self,
            JitError::OutOfMemory { .. } | JitError::StubSpaceExhausted { .. }
        )
    }
}

/// Result type for Baseline compilation.
pub type JitResult<T> = std::result::Result<T, JitError>;
