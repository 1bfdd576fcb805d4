//! # Otter VM JIT
//!
//! Baseline inline-cache tier: compiles CacheIR programs to stub code for a
//! small virtual stub ISA, runs IC chains on the stub machine and caches
//! compiled stub code per zone.
//!
//! ```text
//! CacheIRWriter ──validate──▶ BaselineCacheIRCompiler ──link──▶ JitCode
//!                                                                 │
//!                      JitZone cache (code bytes → code, info) ◀──┘
//!                                                                 │
//!          attach_baseline_cache_ir_stub ──▶ ICFallbackStub chain ─▶ StubMachine
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod allocator;
pub mod attach;
pub mod compiler;
pub mod error;
pub mod ic;
pub mod jit_zone;
pub mod masm;
pub mod options;
pub mod simulator;
pub mod stub_space;
pub mod vm_functions;

pub use attach::{AttachOutcome, attach_baseline_cache_ir_stub};
pub use compiler::BaselineCacheIRCompiler;
pub use error::{JitError, JitResult};
pub use ic::{ICFallbackStub, ICInputs, ICOutcome, ICScript, ICStub};
pub use jit_zone::{CacheIRStubKey, CachedStubCode, JitZone, ZoneStats};
pub use masm::{Inst, JitCode, Register};
pub use options::JitOptions;
pub use stub_space::{StubSpace, StubSpaceKind};
pub use vm_functions::VMFunctionId;
