//! Function objects and call arguments

use std::sync::Arc;

use bitflags::bitflags;

use crate::error::Exception;
use crate::object::{ClassId, ObjectId};
use crate::realm::RealmId;
use crate::runtime::Runtime;
use crate::value::Value;

/// Body of a function.
///
/// Scripted functions use the same signature as natives; what differs is how
/// they are entered (JIT entry with a rectified frame vs. native call).
pub type NativeFn = Arc<dyn Fn(&mut Runtime, &CallArgs) -> Result<Value, Exception> + Send + Sync>;

/// How a function is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Native function, no JIT entry
    Native,
    /// Scripted function with a JIT entry
    Scripted,
    /// Native DOM method with JIT info
    Dom,
}

bitflags! {
    /// Function flags (the low half of `nargs_and_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FunctionFlags: u16 {
        /// Can be called with `new`
        const CONSTRUCTOR = 1 << 0;
        /// Class constructor (throws when called without `new`)
        const CLASS_CONSTRUCTOR = 1 << 1;
        /// Arrow or method; no own `this`
        const LAMBDA = 1 << 2;
    }
}

/// Function payload of an object.
#[derive(Clone)]
pub struct FunctionData {
    /// Implementation kind
    pub kind: FunctionKind,
    /// Number of formal parameters
    pub nargs: u16,
    /// Flags
    pub flags: FunctionFlags,
    /// Body
    pub body: NativeFn,
    /// Realm the function belongs to
    pub realm: RealmId,
    /// For DOM methods, the class `this` must have
    pub dom_this_class: Option<ClassId>,
}

impl FunctionData {
    /// `nargs` and flags packed the way `GuardSpecificFunction` compares them.
    pub fn nargs_and_flags(&self) -> u32 {
        ((self.nargs as u32) << 16) | self.flags.bits() as u32
    }

    /// Whether the function can be entered through JIT code.
    pub fn has_jit_entry(&self) -> bool {
        self.kind == FunctionKind::Scripted
    }

    /// Whether the function is a constructor.
    pub fn is_constructor(&self) -> bool {
        self.flags.contains(FunctionFlags::CONSTRUCTOR)
    }

    /// Whether the function is a class constructor.
    pub fn is_class_constructor(&self) -> bool {
        self.flags.contains(FunctionFlags::CLASS_CONSTRUCTOR)
    }
}

/// Arguments of one call.
#[derive(Debug, Clone)]
pub struct CallArgs {
    /// Function being called
    pub callee: ObjectId,
    /// `this` (the `IsConstructing` magic before `this` is created)
    pub this: Value,
    /// Arguments; may be padded with `undefined` up to `nargs`
    pub args: Vec<Value>,
    /// Number of arguments actually passed
    pub argc: usize,
    /// `new.target` for constructing calls
    pub new_target: Option<Value>,
}

impl CallArgs {
    /// Arguments for a plain call.
    pub fn new(callee: ObjectId, this: Value, args: Vec<Value>) -> Self {
        let argc = args.len();
        CallArgs {
            callee,
            this,
            args,
            argc,
            new_target: None,
        }
    }

    /// Argument `i`, or `undefined`.
    pub fn arg(&self, i: usize) -> Value {
        self.args.get(i).copied().unwrap_or(Value::UNDEFINED)
    }

    /// Whether this is a `new` call.
    pub fn is_constructing(&self) -> bool {
        self.new_target.is_some()
    }

    /// Pad with `undefined` so at least `nargs` formals are present.
    pub fn rectify(&mut self, nargs: usize) {
        if self.args.len() < nargs {
            self.args.resize(nargs, Value::UNDEFINED);
        }
    }
}
