//! # Otter CacheIR
//!
//! The inline-cache bytecode of the Otter JIT tiers.
//!
//! A CacheIR program is a linear sequence of typed opcodes over numbered
//! operands, plus a side table of stub fields (shapes, objects, offsets)
//! referenced by offset. Stub generators write programs once; the Baseline
//! compiler turns them into stub code and the Warp transpiler into MIR.
//!
//! ## Design Principles
//!
//! - **One schema**: every opcode is declared once in [`ops`]; the enum,
//!   the handler trait and the dispatcher are generated from it
//! - **Append-only operands**: ids are assigned in definition order and
//!   never reused, so consumers keep a plain vector indexed by id
//! - **Validate once**: [`ValidatedCacheIR`] rejects malformed programs
//!   before either backend sees them
//! - **Code shape vs. data**: code bytes identify a stub shape; stub data
//!   holds the values and is never folded into generated code

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod args;
pub mod error;
pub mod flags;
pub mod kind;
pub mod operand;
pub mod ops;
pub mod reader;
pub mod spew;
pub mod stub_info;
pub mod validate;
pub mod writer;

pub use args::ArgKind;
pub use error::{CacheIRError, Result};
pub use flags::{ArgFormat, CallFlags, GuardClassKind, JSOp, UnaryMathFunction};
pub use kind::{CacheKind, ICStubEngine};
pub use operand::{
    BigIntOperandId, BooleanOperandId, Int32OperandId, NumberOperandId, ObjOperandId,
    OperandIdType, OperandType, StringOperandId, SymbolOperandId, TypedOperandId, ValOperandId,
};
pub use ops::{CacheIROps, CacheOp, OpClass, OpOutput, dispatch_op};
pub use reader::CacheIRReader;
pub use stub_info::{CacheIRStubInfo, STUB_FIELD_SIZE, StubField, StubFieldType};
pub use validate::{ProgramSummary, ValidatedCacheIR};
pub use writer::CacheIRWriter;
