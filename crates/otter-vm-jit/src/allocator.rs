//! Operand allocator of the Baseline compiler
//!
//! Tracks where every CacheIR operand currently lives and hands out
//! registers, spilling to the machine stack when the pool runs dry.
//!
//! ```text
//! R0, R1     IC inputs and output; clobbered by every call.
//!            Only handed out on a fixed request.
//! R2..R7     allocation pool
//! stack      spill slots, addressed by push position
//! ```
//!
//! Input operands are never freed while a guard may still fail: every
//! failure path moves them back to where the IC caller put them.

use otter_cacheir::{CacheKind, ProgramSummary};
use otter_vm_core::{Value, ValueType};
use smallvec::SmallVec;

use crate::masm::{FloatRegister, Inst, MacroAssembler, Operand, Register, RegisterSet};

/// Where an operand lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLocation {
    /// Not yet defined, or dead
    Uninitialized,
    /// Boxed in a register
    ValueReg(Register),
    /// Unboxed in a register
    PayloadReg {
        /// Register
        reg: Register,
        /// Tag the payload was unboxed from
        ty: ValueType,
    },
    /// Boxed in a spill slot; `pos` counts pushes, 1 being the first
    ValueStack(u32),
    /// Unboxed in a spill slot
    PayloadStack {
        /// Push position
        pos: u32,
        /// Tag the payload was unboxed from
        ty: ValueType,
    },
    /// Boxed in a frame slot pushed by the IC caller
    BaselineFrame(u32),
    /// A constant from the CacheIR code bytes
    Constant(Value),
}

impl OperandLocation {
    fn register(self) -> Option<Register> {
        match self {
            OperandLocation::ValueReg(reg) | OperandLocation::PayloadReg { reg, .. } => Some(reg),
            _ => None,
        }
    }

    fn stack_pos(self) -> Option<u32> {
        match self {
            OperandLocation::ValueStack(pos) | OperandLocation::PayloadStack { pos, .. } => Some(pos),
            _ => None,
        }
    }
}

/// Input locations and stack height captured when a failure path is
/// created.
#[derive(Debug, Clone, PartialEq)]
pub struct SpilledState {
    inputs: SmallVec<[OperandLocation; 3]>,
    stack_pushed: u32,
}

fn pool() -> RegisterSet {
    let mut set = RegisterSet::empty();
    for code in 2..8 {
        set.add(Register::new(code));
    }
    set
}

fn is_pool_register(reg: Register) -> bool {
    !reg.is_call_clobbered()
}

/// Register and stack bookkeeping for one stub compile.
#[derive(Debug)]
pub struct CacheRegisterAllocator {
    locations: Vec<OperandLocation>,
    orig_inputs: SmallVec<[OperandLocation; 3]>,
    last_use: Vec<Option<u32>>,
    last_guard: Option<u32>,
    available: RegisterSet,
    current_op_regs: RegisterSet,
    stack_pushed: u32,
    stub_frames: SmallVec<[u32; 2]>,
    current_instruction: u32,
}

impl CacheRegisterAllocator {
    /// Bind the inputs of `kind` to the IC calling convention.
    pub fn new(kind: CacheKind, summary: &ProgramSummary) -> Self {
        let orig_inputs: SmallVec<[OperandLocation; 3]> = (0..kind.num_inputs())
            .map(|i| match (kind, i) {
                (CacheKind::Call, 0) => OperandLocation::PayloadReg {
                    reg: Register::R0,
                    ty: ValueType::Int32,
                },
                (_, 0) => OperandLocation::ValueReg(Register::R0),
                (_, 1) => OperandLocation::ValueReg(Register::R1),
                (_, slot) => OperandLocation::BaselineFrame(slot as u32 - 2),
            })
            .collect();
        let num_operands = summary.num_operands();
        let mut locations = vec![OperandLocation::Uninitialized; num_operands.max(orig_inputs.len())];
        locations[..orig_inputs.len()].copy_from_slice(&orig_inputs);
        Self {
            locations,
            last_use: (0..num_operands as u16).map(|id| summary.operand_last_use(id)).collect(),
            last_guard: summary.guards.last().copied(),
            orig_inputs,
            available: pool(),
            current_op_regs: RegisterSet::empty(),
            stack_pushed: 0,
            stub_frames: SmallVec::new(),
            current_instruction: 0,
        }
    }

    /// Start allocating for instruction `index`. Scratch registers of the
    /// previous instruction return to the pool.
    pub fn next_op(&mut self, index: u32) {
        self.current_instruction = index;
        self.current_op_regs = RegisterSet::empty();
        let mut free = pool();
        for loc in &self.locations {
            if let Some(reg) = loc.register() {
                free.take(reg);
            }
        }
        self.available = free;
    }

    /// Words pushed by the stub so far.
    pub fn stack_pushed(&self) -> u32 {
        self.stack_pushed
    }

    /// Current location of operand `id`.
    pub fn location(&self, id: u16) -> OperandLocation {
        self.locations[id as usize]
    }

    fn set_location(&mut self, id: u16, loc: OperandLocation) {
        let index = id as usize;
        if index >= self.locations.len() {
            self.locations.resize(index + 1, OperandLocation::Uninitialized);
        }
        self.locations[index] = loc;
    }

    fn is_input(&self, id: usize) -> bool {
        id < self.orig_inputs.len()
    }

    fn is_dead(&self, id: usize) -> bool {
        if self.is_input(id)
            && self.last_guard.is_some_and(|g| g >= self.current_instruction)
        {
            return false;
        }
        self.last_use
            .get(id)
            .copied()
            .flatten()
            .is_none_or(|last| last < self.current_instruction)
    }

    fn holder_of(&self, reg: Register) -> Option<usize> {
        self.locations.iter().position(|loc| loc.register() == Some(reg))
    }

    fn free_dead_operands(&mut self) {
        for id in 0..self.locations.len() {
            let Some(reg) = self.locations[id].register() else {
                continue;
            };
            if self.current_op_regs.has(reg) || !self.is_dead(id) {
                continue;
            }
            self.locations[id] = self.dead_location(id);
            if is_pool_register(reg) {
                self.available.add(reg);
            }
        }
    }

    /// Where a dead operand is left: inputs that came from a frame slot
    /// still have it.
    fn dead_location(&self, id: usize) -> OperandLocation {
        match self.orig_inputs.get(id) {
            Some(loc @ OperandLocation::BaselineFrame(_)) => *loc,
            _ => OperandLocation::Uninitialized,
        }
    }

    /// Move operand `id` out of its register.
    fn spill_operand(&mut self, masm: &mut MacroAssembler, id: usize) {
        let loc = self.locations[id];
        let Some(reg) = loc.register() else {
            return;
        };
        debug_assert!(self.stub_frames.is_empty(), "spill inside a stub frame");
        if let Some(frame @ OperandLocation::BaselineFrame(_)) = self.orig_inputs.get(id).copied() {
            // The frame slot still holds the boxed value.
            if matches!(loc, OperandLocation::ValueReg(_)) {
                self.locations[id] = frame;
                self.release(reg);
                return;
            }
        }
        masm.push(reg);
        self.stack_pushed += 1;
        self.locations[id] = match loc {
            OperandLocation::PayloadReg { ty, .. } => OperandLocation::PayloadStack {
                pos: self.stack_pushed,
                ty,
            },
            _ => OperandLocation::ValueStack(self.stack_pushed),
        };
        tracing::trace!(target: "otter::codegen", operand = id, %reg, "spill");
        self.release(reg);
    }

    fn release(&mut self, reg: Register) {
        if is_pool_register(reg) {
            self.available.add(reg);
        }
    }

    /// A scratch register from the pool, valid until the next instruction.
    pub fn allocate_register(&mut self, masm: &mut MacroAssembler) -> Register {
        if self.available.is_empty() {
            self.free_dead_operands();
        }
        if self.available.is_empty() {
            let victim = (0..self.locations.len()).find(|&id| {
                self.locations[id]
                    .register()
                    .is_some_and(|r| is_pool_register(r) && !self.current_op_regs.has(r))
            });
            match victim {
                Some(id) => self.spill_operand(masm, id),
                None => panic!("stub register pool exhausted"),
            }
        }
        let Some(reg) = self.available.take_any() else {
            panic!("stub register pool exhausted");
        };
        self.current_op_regs.add(reg);
        reg
    }

    /// Claim `reg`, spilling whatever operand lives there.
    pub fn allocate_fixed_register(&mut self, masm: &mut MacroAssembler, reg: Register) -> Register {
        if let Some(id) = self.holder_of(reg) {
            assert!(
                !self.current_op_regs.has(reg),
                "{reg} requested while in use by the current instruction"
            );
            if self.is_dead(id) {
                self.locations[id] = self.dead_location(id);
            } else {
                self.spill_operand(masm, id);
            }
        }
        self.available.take(reg);
        self.current_op_regs.add(reg);
        reg
    }

    /// Move every live operand out of the call-clobbered registers.
    pub fn evict_call_clobbered(&mut self, masm: &mut MacroAssembler) {
        for reg in [Register::R0, Register::R1] {
            let Some(id) = self.holder_of(reg) else {
                continue;
            };
            if self.is_dead(id) {
                self.locations[id] = self.dead_location(id);
            } else {
                self.spill_operand(masm, id);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Uses and definitions
    // -----------------------------------------------------------------------

    /// Operand `id` boxed in a register.
    pub fn use_value_register(&mut self, masm: &mut MacroAssembler, id: u16) -> Register {
        let reg = match self.location(id) {
            OperandLocation::ValueReg(reg) => reg,
            OperandLocation::PayloadReg { reg, ty } => {
                masm.tag_value(ty, reg, reg);
                reg
            }
            OperandLocation::ValueStack(pos) => {
                let reg = self.allocate_register(masm);
                masm.emit(Inst::LoadStack { dst: reg, depth: self.stack_pushed - pos });
                reg
            }
            OperandLocation::PayloadStack { pos, ty } => {
                let reg = self.allocate_register(masm);
                masm.emit(Inst::LoadStack { dst: reg, depth: self.stack_pushed - pos });
                masm.tag_value(ty, reg, reg);
                reg
            }
            OperandLocation::BaselineFrame(slot) => {
                let reg = self.allocate_register(masm);
                masm.emit(Inst::LoadFrameSlot { dst: reg, slot });
                reg
            }
            OperandLocation::Constant(value) => {
                let reg = self.allocate_register(masm);
                masm.move_value(value.to_bits(), reg);
                reg
            }
            OperandLocation::Uninitialized => panic!("use of undefined operand {id}"),
        };
        self.current_op_regs.add(reg);
        self.set_location(id, OperandLocation::ValueReg(reg));
        reg
    }

    /// Operand `id` unboxed in a register. The operand must have been
    /// guarded to `ty`.
    pub fn use_payload_register(&mut self, masm: &mut MacroAssembler, id: u16, ty: ValueType) -> Register {
        let reg = match self.location(id) {
            OperandLocation::ValueReg(reg) => {
                masm.unbox_non_double(reg, reg, ty);
                reg
            }
            OperandLocation::PayloadReg { reg, ty: held } => {
                debug_assert_eq!(held, ty, "operand {id} used at two types");
                reg
            }
            OperandLocation::ValueStack(pos) => {
                let reg = self.allocate_register(masm);
                masm.emit(Inst::LoadStack { dst: reg, depth: self.stack_pushed - pos });
                masm.unbox_non_double(reg, reg, ty);
                reg
            }
            OperandLocation::PayloadStack { pos, .. } => {
                let reg = self.allocate_register(masm);
                masm.emit(Inst::LoadStack { dst: reg, depth: self.stack_pushed - pos });
                reg
            }
            OperandLocation::BaselineFrame(slot) => {
                let reg = self.allocate_register(masm);
                masm.emit(Inst::LoadFrameSlot { dst: reg, slot });
                masm.unbox_non_double(reg, reg, ty);
                reg
            }
            OperandLocation::Constant(value) => {
                let reg = self.allocate_register(masm);
                masm.mov_imm(value.payload(), reg);
                reg
            }
            OperandLocation::Uninitialized => panic!("use of undefined operand {id}"),
        };
        self.current_op_regs.add(reg);
        self.set_location(id, OperandLocation::PayloadReg { reg, ty });
        reg
    }

    /// Number operand `id` as a double in `dst`.
    pub fn ensure_double(&mut self, masm: &mut MacroAssembler, id: u16, dst: FloatRegister) {
        match self.location(id) {
            OperandLocation::PayloadReg { reg, ty: ValueType::Int32 } => {
                self.current_op_regs.add(reg);
                masm.emit(Inst::ConvertInt32ToDouble { src: reg, dst });
            }
            _ => {
                let reg = self.use_value_register(masm, id);
                masm.emit(Inst::UnboxNumber { src: reg, dst });
            }
        }
    }

    /// Whether operand `id` is known to hold an unboxed `ty`.
    pub fn known_payload(&self, id: u16, ty: ValueType) -> bool {
        matches!(
            self.location(id),
            OperandLocation::PayloadReg { ty: held, .. } | OperandLocation::PayloadStack { ty: held, .. }
                if held == ty
        )
    }

    /// Define operand `id` as the boxed value in `reg`.
    pub fn define_value_register(&mut self, id: u16, reg: Register) {
        self.current_op_regs.add(reg);
        self.set_location(id, OperandLocation::ValueReg(reg));
    }

    /// Define operand `id` as the payload in `reg`.
    pub fn define_payload_register(&mut self, id: u16, reg: Register, ty: ValueType) {
        self.current_op_regs.add(reg);
        self.set_location(id, OperandLocation::PayloadReg { reg, ty });
    }

    /// Define operand `id` as a constant.
    pub fn define_constant(&mut self, id: u16, value: Value) {
        self.set_location(id, OperandLocation::Constant(value));
    }

    /// Define operand `id` as a frame slot.
    pub fn define_frame_slot(&mut self, id: u16, slot: u32) {
        self.set_location(id, OperandLocation::BaselineFrame(slot));
    }

    // -----------------------------------------------------------------------
    // Stack
    // -----------------------------------------------------------------------

    /// Push a call argument.
    pub fn push(&mut self, masm: &mut MacroAssembler, src: impl Into<Operand>) {
        masm.push(src);
        self.stack_pushed += 1;
    }

    /// Account for `n` words popped by a callee.
    pub fn popped(&mut self, n: usize) {
        self.stack_pushed -= n as u32;
    }

    /// Enter a stub frame. Registers must be allocated before this: the
    /// frame's pushes are dropped when it is left.
    pub fn enter_stub_frame(&mut self, masm: &mut MacroAssembler) {
        masm.emit(Inst::EnterStubFrame);
        self.stub_frames.push(self.stack_pushed);
    }

    /// Leave the innermost stub frame, dropping everything pushed in it.
    pub fn leave_stub_frame(&mut self, masm: &mut MacroAssembler) {
        masm.emit(Inst::LeaveStubFrame);
        let Some(depth) = self.stub_frames.pop() else {
            panic!("leave_stub_frame without a stub frame");
        };
        for id in 0..self.locations.len() {
            if self.locations[id].stack_pos().is_some_and(|pos| pos > depth) {
                self.locations[id] = self.dead_location(id);
            }
        }
        self.stack_pushed = depth;
    }

    /// Drop the stub's spill slots before returning.
    pub fn discard_stack(&mut self, masm: &mut MacroAssembler) {
        debug_assert!(self.stub_frames.is_empty());
        if self.stack_pushed > 0 {
            masm.emit(Inst::FreeStack(self.stack_pushed));
            self.stack_pushed = 0;
        }
    }

    // -----------------------------------------------------------------------
    // Failure paths
    // -----------------------------------------------------------------------

    /// Capture the state a failure path has to undo.
    pub fn spilled_state(&self) -> SpilledState {
        debug_assert!(self.stub_frames.is_empty(), "guard inside a stub frame");
        SpilledState {
            inputs: self.locations[..self.orig_inputs.len()].iter().copied().collect(),
            stack_pushed: self.stack_pushed,
        }
    }

    /// Move the inputs back to their IC locations and drop the spill slots.
    ///
    /// Restores only write `R0`/`R1`, which hold nothing but the inputs and
    /// the output, so no restore can clobber another one's source.
    pub fn restore_input_state(&self, masm: &mut MacroAssembler, state: &SpilledState) {
        for (id, (&orig, &cur)) in self.orig_inputs.iter().zip(&state.inputs).enumerate() {
            if orig == cur {
                continue;
            }
            match orig {
                OperandLocation::ValueReg(dst) => {
                    restore_boxed(masm, cur, dst, state.stack_pushed);
                }
                OperandLocation::PayloadReg { reg: dst, ty } => {
                    restore_payload(masm, cur, dst, ty, state.stack_pushed);
                }
                OperandLocation::BaselineFrame(_) => {}
                other => panic!("input {id} bound to {other:?}"),
            }
        }
        if state.stack_pushed > 0 {
            masm.emit(Inst::FreeStack(state.stack_pushed));
        }
    }
}

fn restore_boxed(masm: &mut MacroAssembler, cur: OperandLocation, dst: Register, pushed: u32) {
    match cur {
        OperandLocation::ValueReg(src) => masm.mov(src, dst),
        OperandLocation::PayloadReg { reg, ty } => masm.tag_value(ty, reg, dst),
        OperandLocation::ValueStack(pos) => {
            masm.emit(Inst::LoadStack { dst, depth: pushed - pos });
        }
        OperandLocation::PayloadStack { pos, ty } => {
            masm.emit(Inst::LoadStack { dst, depth: pushed - pos });
            masm.tag_value(ty, dst, dst);
        }
        other => panic!("cannot restore an input from {other:?}"),
    }
}

fn restore_payload(masm: &mut MacroAssembler, cur: OperandLocation, dst: Register, ty: ValueType, pushed: u32) {
    match cur {
        OperandLocation::PayloadReg { reg, .. } => masm.mov(reg, dst),
        OperandLocation::ValueReg(src) => masm.unbox_non_double(src, dst, ty),
        OperandLocation::PayloadStack { pos, .. } => {
            masm.emit(Inst::LoadStack { dst, depth: pushed - pos });
        }
        OperandLocation::ValueStack(pos) => {
            masm.emit(Inst::LoadStack { dst, depth: pushed - pos });
            masm.unbox_non_double(dst, dst, ty);
        }
        other => panic!("cannot restore an input from {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use otter_cacheir::CacheIRWriter;

    use super::*;

    fn summary_for(kind: CacheKind) -> ProgramSummary {
        let mut writer = CacheIRWriter::new(kind);
        if kind == CacheKind::Call {
            writer.return_from_ic();
        } else {
            let v = writer.input_val(0);
            let n = writer.guard_to_int32(v);
            writer.load_int32_result(n);
            writer.return_from_ic();
        }
        writer.validate().unwrap().summary().clone()
    }

    #[test]
    fn inputs_follow_the_calling_convention() {
        let alloc = CacheRegisterAllocator::new(CacheKind::SetElem, &summary_for(CacheKind::SetElem));
        assert_eq!(alloc.location(0), OperandLocation::ValueReg(Register::R0));
        assert_eq!(alloc.location(1), OperandLocation::ValueReg(Register::R1));
        assert_eq!(alloc.location(2), OperandLocation::BaselineFrame(0));

        let alloc = CacheRegisterAllocator::new(CacheKind::Call, &summary_for(CacheKind::Call));
        assert!(alloc.known_payload(0, ValueType::Int32));
    }

    #[test]
    fn fixed_request_spills_the_input() {
        let summary = summary_for(CacheKind::GetProp);
        let mut alloc = CacheRegisterAllocator::new(CacheKind::GetProp, &summary);
        let mut masm = MacroAssembler::new();
        alloc.next_op(0);
        alloc.allocate_fixed_register(&mut masm, Register::R0);
        assert_eq!(alloc.location(0), OperandLocation::ValueStack(1));
        assert_eq!(masm.insts(), &[Inst::Push(Operand::Reg(Register::R0))]);

        let state = alloc.spilled_state();
        let mut restore = MacroAssembler::new();
        alloc.restore_input_state(&mut restore, &state);
        assert_eq!(
            restore.insts(),
            &[
                Inst::LoadStack { dst: Register::R0, depth: 0 },
                Inst::FreeStack(1),
            ]
        );
    }

    #[test]
    fn unboxed_inputs_are_reboxed_on_failure() {
        let summary = summary_for(CacheKind::GetProp);
        let mut alloc = CacheRegisterAllocator::new(CacheKind::GetProp, &summary);
        let mut masm = MacroAssembler::new();
        alloc.next_op(0);
        let reg = alloc.use_payload_register(&mut masm, 0, ValueType::Int32);
        assert_eq!(reg, Register::R0);
        let state = alloc.spilled_state();
        let mut restore = MacroAssembler::new();
        alloc.restore_input_state(&mut restore, &state);
        assert_eq!(
            restore.insts(),
            &[Inst::TagValue { ty: ValueType::Int32, payload: Register::R0, dst: Register::R0 }]
        );
    }

    #[test]
    fn scratch_registers_return_to_the_pool() {
        let summary = summary_for(CacheKind::GetProp);
        let mut alloc = CacheRegisterAllocator::new(CacheKind::GetProp, &summary);
        let mut masm = MacroAssembler::new();
        alloc.next_op(0);
        let regs: Vec<_> = (0..6).map(|_| alloc.allocate_register(&mut masm)).collect();
        assert_eq!(regs[0], Register::R2);
        assert!(regs.iter().all(|r| !r.is_call_clobbered()));
        alloc.next_op(1);
        assert_eq!(alloc.allocate_register(&mut masm), Register::R2);
    }
}
