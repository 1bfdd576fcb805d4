//! # Otter VM Core
//!
//! Object model shared by the inline-cache tiers of the Otter runtime.
//!
//! ## Design Principles
//!
//! - **NaN-boxing**: values are plain 64-bit words, `Copy`, storable in stub
//!   data and machine registers
//! - **Handles, not pointers**: heap things are indices into runtime tables
//! - **Shapes**: shared, transition-memoised hidden classes that guards compare
//! - **One slow path**: both JIT tiers fall back to the same generic
//!   operations on [`Runtime`], so they cannot disagree on semantics

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod function;
pub mod gc;
pub mod object;
pub mod proxy;
pub mod realm;
pub mod runtime;
pub mod shape;
pub mod string;
pub mod types;
pub mod value;

pub use error::{Exception, VmResult};
pub use function::{CallArgs, FunctionData, FunctionFlags, FunctionKind, NativeFn};
pub use object::{ClassFlags, ClassId, ElementsFlags, ObjectData, ObjectId, ObjectKind, layout};
pub use proxy::{ForwardingHandler, ProxyHandler};
pub use realm::{FrameInfo, FrameKind, RealmId};
pub use runtime::{Runtime, SlotLocation};
pub use shape::{PropertyKey, ShapeId};
pub use string::{BigIntId, StringId, SymbolId};
pub use types::{GroupId, TypeFlags, TypeKey};
pub use value::{JSWhyMagic, Value, ValueType};
