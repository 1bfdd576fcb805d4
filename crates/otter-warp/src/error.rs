//! Warp tier errors
//!
//! A failed transpile abandons the compilation; the script keeps running
//! its Baseline stubs. Nothing here is script-visible.

use otter_cacheir::CacheIRError;

/// Errors produced while building MIR from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranspileError {
    /// The snapshot's CacheIR code could not be decoded.
    #[error("invalid CacheIR: {0}")]
    InvalidCacheIR(#[from] CacheIRError),

    /// MIR storage could not be allocated.
    #[error("out of memory allocating {what}")]
    OutOfMemory {
        /// What was being allocated
        what: &'static str,
    },

    /// The graph reached the configured instruction limit.
    #[error("MIR graph exceeds {limit} instructions")]
    TooManyNodes {
        /// Configured limit
        limit: u32,
    },

    /// A call site was snapshotted without its argument count.
    #[error("call site at pc {pc} has no call-site information")]
    MissingCallSite {
        /// Bytecode offset
        pc: u32,
    },

    /// The compilation was cancelled before it started.
    #[error("compilation {id} cancelled")]
    Cancelled {
        /// Task id
        id: u64,
    },
}

impl TranspileError {
    /// Whether the error is an allocation failure.
    pub fn is_oom(&self) -> bool {
        matches!(self, TranspileError::OutOfMemory { .. })
    }
}

/// Result type for Warp compilation.
pub type TranspileResult<T> = std::result::Result<T, TranspileError>;
