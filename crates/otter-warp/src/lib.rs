//! # Otter Warp
//!
//! The optimizing tier of the Otter VM. Warp does not generate its own
//! inline caches: it reuses what the Baseline tier learned, transpiling the
//! CacheIR of each monomorphic IC site into typed MIR.
//!
//! ```text
//! ICScript ──WarpOracle──▶ WarpSnapshot ──WarpCompileQueue──▶ WarpBuilder
//!                                                                 │
//!                                               transpile_cache_ir ◀┘
//!                                                                 │
//!                       MirInterpreter ◀── WarpCompilation (MirGraph)
//! ```
//!
//! ## Design Principles
//!
//! - **Snapshots, not live chains**: everything read off the main thread is
//!   copied into a [`WarpSnapshot`] first
//! - **Same program, same semantics**: a transpiled block observes exactly
//!   what the Baseline stub for the same CacheIR would, guards bail where
//!   the stub would fall back
//! - **One effect per site**: a block has at most one effectful instruction,
//!   and its resume point is where execution continues after a later bailout

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod bailout;
pub mod builder;
pub mod call_info;
pub mod compile_queue;
pub mod error;
pub mod interpreter;
pub mod mir;
pub mod options;
pub mod snapshot;
pub mod transpiler;

pub use bailout::{BailoutCounts, BailoutKind};
pub use builder::{WarpBuilder, WarpCompilation};
pub use call_info::{CallArgFormat, CallInfo, update_call_info};
pub use compile_queue::{CompileQueueStatsSnapshot, CompileResult, CompileTicket, WarpCompileQueue};
pub use error::{TranspileError, TranspileResult};
pub use interpreter::{MirInterpreter, MirOutcome};
pub use mir::{
    BlockId, MBasicBlock, MDefinitionId, MInlinedCall, MInstruction, MResumePoint, MirGraph, MirOp,
    MirType, ResumeMode,
};
pub use options::WarpOptions;
pub use snapshot::{CallSite, WarpCacheIR, WarpOpSnapshot, WarpOracle, WarpSnapshot};
pub use transpiler::transpile_cache_ir;
