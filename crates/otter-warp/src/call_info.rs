//! Call-site operands
//!
//! A call IC's inputs are the words its caller pushed: callee, `this`, the
//! arguments and, for `new`, the new target. [`CallInfo`] holds them as MIR
//! definitions so the transpiler can rewrite the argument list the way the
//! call's [`ArgFormat`] requires before emitting the call.

use otter_cacheir::{ArgFormat, CallFlags};
use smallvec::SmallVec;

use crate::mir::MDefinitionId;

/// How the arguments reach the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallArgFormat {
    /// One definition per argument
    Standard,
    /// A single array whose dense elements are the arguments
    Array,
}

/// Operands of one call site.
#[derive(Debug, Clone, PartialEq)]
pub struct CallInfo {
    callee: MDefinitionId,
    this: MDefinitionId,
    args: SmallVec<[MDefinitionId; 4]>,
    new_target: Option<MDefinitionId>,
    constructing: bool,
    arg_format: CallArgFormat,
}

impl CallInfo {
    /// Operands from the frame words of a call IC, first pushed first:
    /// callee, `this`, the arguments, then `new.target` when constructing.
    pub fn from_frame(frame: &[MDefinitionId], constructing: bool) -> Self {
        let c = constructing as usize;
        assert!(frame.len() >= 2 + c, "call frame of {} words", frame.len());
        let args_end = frame.len() - c;
        Self {
            callee: frame[0],
            this: frame[1],
            args: frame[2..args_end].iter().copied().collect(),
            new_target: constructing.then(|| frame[args_end]),
            constructing,
            arg_format: CallArgFormat::Standard,
        }
    }

    /// Callee.
    pub fn callee(&self) -> MDefinitionId {
        self.callee
    }

    /// `this`.
    pub fn this(&self) -> MDefinitionId {
        self.this
    }

    /// Arguments in order. For [`CallArgFormat::Array`] the only entry is
    /// the array.
    pub fn args(&self) -> &[MDefinitionId] {
        &self.args
    }

    /// Number of arguments.
    pub fn argc(&self) -> u32 {
        self.args.len() as u32
    }

    /// `new.target`, when constructing.
    pub fn new_target(&self) -> Option<MDefinitionId> {
        self.new_target
    }

    /// Whether this is a `new` call.
    pub fn constructing(&self) -> bool {
        self.constructing
    }

    /// Argument format after [`update_call_info`].
    pub fn arg_format(&self) -> CallArgFormat {
        self.arg_format
    }

    /// Definition in frame slot `slot`; slot 0 is the word pushed last.
    /// Slots past the callee are out of range.
    pub fn frame_slot(&self, slot: u32) -> Option<MDefinitionId> {
        let c = self.constructing as u32;
        if self.constructing && slot == 0 {
            return self.new_target;
        }
        let argc = self.argc();
        let rel = slot.checked_sub(c)?;
        if rel < argc {
            Some(self.args[(argc - 1 - rel) as usize])
        } else if rel == argc {
            Some(self.this)
        } else if rel == argc + 1 {
            Some(self.callee)
        } else {
            None
        }
    }

    /// Replace `this` by `this_obj` (DOM calls).
    pub fn set_this(&mut self, this: MDefinitionId) {
        self.this = this;
    }
}

/// Rewrite `info` for a call op that guarded its callee as `callee`.
///
/// `f.call(a, b)` becomes a call with `this = a` and the remaining
/// arguments; `fun(...array)` keeps the array as the only argument and
/// switches to [`CallArgFormat::Array`], as does `f.apply(a, array)` after
/// taking `this = a`. `undefined_this` is the `this` of an `f.call()` with
/// no arguments.
///
/// # Panics
///
/// On `FunApplyArgs` and `Unknown`, which validation rejects. On a
/// constructing `FunCall` or `FunApplyArray`, and on an `f.call()` without
/// arguments when `undefined_this` is missing.
pub fn update_call_info(
    info: &mut CallInfo,
    callee: MDefinitionId,
    flags: CallFlags,
    undefined_this: Option<MDefinitionId>,
) {
    info.callee = callee;
    match flags.arg_format() {
        ArgFormat::Standard => {}
        ArgFormat::Spread => {
            debug_assert_eq!(info.args.len(), 1, "spread call with {} frame arguments", info.args.len());
            info.arg_format = CallArgFormat::Array;
        }
        ArgFormat::FunCall => {
            assert!(!info.constructing, "FunCall cannot construct");
            if info.args.is_empty() {
                info.this = undefined_this
                    .unwrap_or_else(|| panic!("f.call() without arguments needs an undefined `this`"));
            } else {
                info.this = info.args.remove(0);
            }
        }
        ArgFormat::FunApplyArray => {
            assert!(!info.constructing, "FunApplyArray cannot construct");
            assert_eq!(info.args.len(), 2, "f.apply with {} frame arguments", info.args.len());
            info.this = info.args.remove(0);
            info.arg_format = CallArgFormat::Array;
        }
        other => panic!("call with argument format {other:?} is not transpiled"),
    }
}
