//! Baseline CacheIR compiler.
//!
//! Interprets one validated CacheIR program and emits stub code:
//!
//! ```text
//! BumpEnteredCount
//! <one code sequence per CacheIR instruction>
//! <terminal: optional TypeMonitor, Ret>
//! <one failure path per distinct guard state: restore inputs, FailureExit>
//! ```
//!
//! Every handler acquires its registers in the same order: the output
//! register, then the eviction of the call-clobbered registers when the op
//! calls out, then its operand uses, then scratch registers. Only after that
//! does a fallible handler create its failure path, so the snapshot it takes
//! describes exactly the state at the branch.

mod calls;
mod ops;
mod stores;

use otter_cacheir::{ValidatedCacheIR, dispatch_op};
use otter_vm_core::{Value, ValueType};

use crate::allocator::{CacheRegisterAllocator, SpilledState};
use crate::error::JitResult;
use crate::masm::{Inst, JitCode, Label, MacroAssembler, Register};
use crate::options::JitOptions;

struct FailurePath {
    label: Label,
    state: SpilledState,
}

/// Compiles one CacheIR program to stub code.
pub struct BaselineCacheIRCompiler<'a> {
    ir: &'a ValidatedCacheIR,
    options: JitOptions,
    masm: MacroAssembler,
    alloc: CacheRegisterAllocator,
    failure_paths: Vec<FailurePath>,
    current: u32,
}

impl<'a> BaselineCacheIRCompiler<'a> {
    /// Bind the program's inputs to the calling convention of its kind.
    pub fn new(ir: &'a ValidatedCacheIR, options: JitOptions) -> Self {
        Self {
            ir,
            options,
            masm: MacroAssembler::new(),
            alloc: CacheRegisterAllocator::new(ir.kind(), ir.summary()),
            failure_paths: Vec::new(),
            current: 0,
        }
    }

    /// Emit and link the stub.
    pub fn compile(mut self) -> JitResult<JitCode> {
        let ir = self.ir;
        let kind = ir.kind();
        self.masm.emit(Inst::BumpEnteredCount);

        let mut reader = ir.reader();
        while reader.more() {
            let op = reader.read_op()?;
            let index = reader.instruction_index();
            self.current = index;
            self.alloc.next_op(index);
            tracing::trace!(target: "otter::codegen", %kind, index, op = op.name(), "emit");
            dispatch_op(&mut self, op, &mut reader)?;
        }

        for path in std::mem::take(&mut self.failure_paths) {
            self.masm.bind(path.label);
            self.alloc.restore_input_state(&mut self.masm, &path.state);
            self.masm.emit(Inst::FailureExit);
        }

        let code = self.masm.link(kind)?;
        tracing::debug!(
            target: "otter::codegen",
            %kind,
            insts = code.insts().len(),
            makes_gc_calls = code.makes_gc_calls(),
            "compiled baseline stub"
        );
        Ok(code)
    }

    /// Label of a failure path for the current allocator state. Consecutive
    /// guards with the same state share one path.
    fn failure_path(&mut self) -> Label {
        let state = self.alloc.spilled_state();
        if let Some(last) = self.failure_paths.last() {
            if last.state == state {
                return last.label;
            }
        }
        let label = self.masm.new_label();
        self.failure_paths.push(FailurePath { label, state });
        label
    }

    // -----------------------------------------------------------------------
    // Register shorthands
    // -----------------------------------------------------------------------

    fn output(&mut self) -> Register {
        self.alloc.allocate_fixed_register(&mut self.masm, Register::R0)
    }

    fn evict(&mut self) {
        self.alloc.evict_call_clobbered(&mut self.masm);
    }

    fn scratch(&mut self) -> Register {
        self.alloc.allocate_register(&mut self.masm)
    }

    fn use_value(&mut self, id: u16) -> Register {
        self.alloc.use_value_register(&mut self.masm, id)
    }

    fn use_payload(&mut self, id: u16, ty: ValueType) -> Register {
        self.alloc.use_payload_register(&mut self.masm, id, ty)
    }

    fn use_object(&mut self, id: u16) -> Register {
        self.use_payload(id, ValueType::Object)
    }

    fn use_int32(&mut self, id: u16) -> Register {
        self.use_payload(id, ValueType::Int32)
    }

    /// A scratch register holding the stub word at `offset`.
    fn stub_word(&mut self, offset: u32) -> Register {
        let reg = self.scratch();
        self.masm.load_stub_word(offset, reg);
        reg
    }

    fn tag_result(&mut self, ty: ValueType, payload: Register, out: Register) {
        self.masm.tag_value(ty, payload, out);
    }

    // -----------------------------------------------------------------------
    // Terminals
    // -----------------------------------------------------------------------

    fn emit_return(&mut self, monitor: bool) {
        if self.ir.summary().result.is_none() {
            self.masm.move_value(Value::UNDEFINED.to_bits(), Register::R0);
        }
        self.alloc.discard_stack(&mut self.masm);
        if monitor {
            self.masm.emit(Inst::TypeMonitor);
        }
        self.masm.emit(Inst::Ret);
    }
}
