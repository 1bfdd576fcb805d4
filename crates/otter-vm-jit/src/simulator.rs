//! The stub machine: executes linked stub code against a [`Runtime`].
//!
//! Register and stack state lives in the machine and survives from one stub
//! to the next, like the real register file does when an IC chain is walked.

use otter_cacheir::stub_info::read_stub_word;
use otter_vm_core::{
    CallArgs, FrameKind, JSWhyMagic, ObjectId, RealmId, Runtime, StringId, Value, VmResult,
};
use smallvec::SmallVec;

use crate::ic::{ICFallbackStub, ICStub};
use crate::masm::{
    CallTarget, ElementsField, FunctionField, Inst, Int32UnaryOp, JitCode, NULL_OBJECT,
    NUM_FLOAT_REGISTERS, NUM_REGISTERS, ObjectField, Operand, Register,
};
use crate::vm_functions::VMFunctionId;

/// What the executing stub sees of its IC.
#[derive(Debug, Clone, Copy)]
pub struct StubEnv<'a> {
    /// IC site, recorded in stub frames
    pub pc: u32,
    /// Executing stub
    pub stub: &'a ICStub,
    /// Its fallback
    pub fallback: &'a ICFallbackStub,
}

/// How a stub left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StubExit {
    /// Returned a result
    Return(Value),
    /// Guards failed; try the next stub
    Failure,
}

/// Register file and machine stack.
#[derive(Debug, Clone)]
pub struct StubMachine {
    regs: [u64; NUM_REGISTERS],
    fregs: [f64; NUM_FLOAT_REGISTERS],
    stack: Vec<u64>,
}

impl Default for StubMachine {
    fn default() -> Self {
        Self::new()
    }
}

struct StubFrame {
    stack_depth: usize,
}

impl StubMachine {
    /// Zeroed machine.
    pub fn new() -> Self {
        Self {
            regs: [0; NUM_REGISTERS],
            fregs: [0.0; NUM_FLOAT_REGISTERS],
            stack: Vec::with_capacity(16),
        }
    }

    /// Read a register.
    pub fn reg(&self, reg: Register) -> u64 {
        self.regs[reg.code() as usize]
    }

    /// Write a register.
    pub fn set_reg(&mut self, reg: Register, word: u64) {
        self.regs[reg.code() as usize] = word;
    }

    /// Push a word (IC callers push frame inputs this way).
    pub fn push(&mut self, word: u64) {
        self.stack.push(word);
    }

    /// Current stack depth.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    fn operand(&self, op: Operand) -> u64 {
        match op {
            Operand::Reg(reg) => self.reg(reg),
            Operand::Imm(imm) => imm,
        }
    }

    fn pop_word(&mut self) -> u64 {
        self.stack.pop().unwrap_or_else(|| panic!("stub machine stack underflow"))
    }

    fn stack_slot(&self, depth: u32) -> usize {
        self.stack.len() - 1 - depth as usize
    }

    /// Run one stub. `Err` is a script exception thrown by a callee; the
    /// stub's frames are unwound and the machine stack is dropped back to
    /// its depth at entry.
    pub fn run(&mut self, code: &JitCode, rt: &mut Runtime, env: &StubEnv<'_>) -> VmResult<StubExit> {
        let fp = self.stack.len();
        let frame_depth = rt.frames().len();
        let caller_realm = rt.current_realm();
        match self.execute(code, rt, env, fp, caller_realm) {
            Ok(exit) => {
                debug_assert_eq!(self.stack.len(), fp, "stub left words on the stack");
                debug_assert_eq!(rt.frames().len(), frame_depth, "stub leaked a frame");
                Ok(exit)
            }
            Err(exception) => {
                rt.unwind_frames(frame_depth);
                rt.set_current_realm(caller_realm);
                self.stack.truncate(fp);
                Err(exception)
            }
        }
    }

    fn execute(
        &mut self,
        code: &JitCode,
        rt: &mut Runtime,
        env: &StubEnv<'_>,
        fp: usize,
        caller_realm: RealmId,
    ) -> VmResult<StubExit> {
        let insts = code.insts();
        let data = env.stub.stub_data();
        let mut frames: SmallVec<[StubFrame; 2]> = SmallVec::new();
        let mut ip = 0usize;

        loop {
            let inst = &insts[ip];
            ip += 1;
            match *inst {
                Inst::Bind(_) => {}

                Inst::Mov { dst, src } => self.set_reg(dst, self.operand(src)),
                Inst::LoadStubWord { dst, offset } => self.set_reg(dst, read_stub_word(data, offset)),
                Inst::LoadStubValue { dst, offset } => {
                    self.set_reg(dst, read_stub_word(data, offset))
                }
                Inst::LoadConstantDouble { dst, value } => self.fregs[dst.code() as usize] = value,

                Inst::TagValue { ty, payload, dst } => {
                    let value = Value::from_payload(ty, self.reg(payload));
                    self.set_reg(dst, value.to_bits());
                }
                Inst::UnboxNonDouble { src, dst, ty } => {
                    let value = Value::from_bits(self.reg(src));
                    debug_assert_eq!(value.value_type(), ty, "unbox of a mistyped value");
                    self.set_reg(dst, value.payload());
                }
                Inst::UnboxNumber { src, dst } => {
                    let n = Value::from_bits(self.reg(src)).as_number().unwrap_or(f64::NAN);
                    self.fregs[dst.code() as usize] = n;
                }
                Inst::BoxDouble { src, dst } => {
                    self.set_reg(dst, Value::double(self.fregs[src.code() as usize]).to_bits())
                }
                Inst::ConvertInt32ToDouble { src, dst } => {
                    self.fregs[dst.code() as usize] = self.reg(src) as u32 as i32 as f64
                }
                Inst::ConvertDoubleToInt32 { src, dst, fail, negative_zero_check } => {
                    let d = self.fregs[src.code() as usize];
                    let i = d as i32;
                    if i as f64 != d || (negative_zero_check && d == 0.0 && d.is_sign_negative()) {
                        ip = code.label_position(fail);
                    } else {
                        self.set_reg(dst, i as u32 as u64);
                    }
                }
                Inst::FloorDoubleToInt32 { src, dst, fail } => {
                    let d = self.fregs[src.code() as usize].floor();
                    let in_range = d >= i32::MIN as f64 && d <= i32::MAX as f64;
                    if !in_range || (d == 0.0 && d.is_sign_negative()) {
                        ip = code.label_position(fail);
                    } else {
                        self.set_reg(dst, d as i32 as u32 as u64);
                    }
                }

                Inst::Jump(target) => ip = code.label_position(target),
                Inst::Branch32 { cond, lhs, rhs, target } => {
                    if cond.eval32(self.reg(lhs) as u32, self.operand(rhs) as u32) {
                        ip = code.label_position(target);
                    }
                }
                Inst::Branch64 { cond, lhs, rhs, target } => {
                    if cond.eval64(self.reg(lhs), self.operand(rhs)) {
                        ip = code.label_position(target);
                    }
                }
                Inst::BranchTest32 { zero, lhs, mask, target } => {
                    if ((self.reg(lhs) as u32 & mask) == 0) == zero {
                        ip = code.label_position(target);
                    }
                }
                Inst::BranchTestType { equal, src, ty, target } => {
                    if (Value::from_bits(self.reg(src)).value_type() == ty) == equal {
                        ip = code.label_position(target);
                    }
                }
                Inst::BranchTestNumber { equal, src, target } => {
                    if Value::from_bits(self.reg(src)).is_number() == equal {
                        ip = code.label_position(target);
                    }
                }
                Inst::BranchDouble { cond, lhs, rhs, target } => {
                    let (a, b) = (self.fregs[lhs.code() as usize], self.fregs[rhs.code() as usize]);
                    if cond.eval(a, b) {
                        ip = code.label_position(target);
                    }
                }
                Inst::Cmp32Set { cond, lhs, rhs, dst } => {
                    let r = cond.eval32(self.reg(lhs) as u32, self.operand(rhs) as u32);
                    self.set_reg(dst, r as u64);
                }
                Inst::Cmp64Set { cond, lhs, rhs, dst } => {
                    let r = cond.eval64(self.reg(lhs), self.operand(rhs));
                    self.set_reg(dst, r as u64);
                }
                Inst::CmpDoubleSet { cond, lhs, rhs, dst } => {
                    let (a, b) = (self.fregs[lhs.code() as usize], self.fregs[rhs.code() as usize]);
                    self.set_reg(dst, cond.eval(a, b) as u64);
                }

                Inst::Int32Op { op, dst, src } => {
                    let r = op.eval(self.reg(dst) as u32 as i32, self.operand(src) as u32 as i32);
                    self.set_reg(dst, r as u32 as u64);
                }
                Inst::BranchInt32Op { op, dst, src, target } => {
                    let lhs = self.reg(dst) as u32 as i32;
                    match op.eval_checked(lhs, self.operand(src) as u32 as i32) {
                        Some(r) => self.set_reg(dst, r as u32 as u64),
                        None => ip = code.label_position(target),
                    }
                }
                Inst::Int32Unary { op, dst } => {
                    let v = self.reg(dst) as u32 as i32;
                    let r = match op {
                        Int32UnaryOp::Neg => v.wrapping_neg(),
                        Int32UnaryOp::Not => !v,
                    };
                    self.set_reg(dst, r as u32 as u64);
                }
                Inst::DoubleOp { op, dst, src } => {
                    let d = dst.code() as usize;
                    self.fregs[d] = op.eval(self.fregs[d], self.fregs[src.code() as usize]);
                }
                Inst::DoubleUnary { op, dst } => {
                    let d = dst.code() as usize;
                    self.fregs[d] = op.eval(self.fregs[d]);
                }

                Inst::LoadObjectField { dst, obj, field } => {
                    let obj = object(self.reg(obj));
                    let word = match field {
                        ObjectField::Shape => rt.shape_of(obj).index() as u64,
                        ObjectField::Group => rt.group_of(obj).index() as u64,
                        ObjectField::Class => rt.class_of(obj).index() as u64,
                        ObjectField::ClassFlags => rt.class_data(rt.class_of(obj)).flags.bits() as u64,
                        ObjectField::Proto => rt
                            .proto_of(obj)
                            .map_or(NULL_OBJECT, |p| p.index() as u64),
                    };
                    self.set_reg(dst, word);
                }
                Inst::StoreObjectField { obj, field, src } => {
                    let obj = object(self.reg(obj));
                    let word = self.reg(src) as u32;
                    match field {
                        ObjectField::Shape => {
                            rt.object_mut(obj).shape = otter_vm_core::ShapeId::new(word)
                        }
                        ObjectField::Group => {
                            rt.object_mut(obj).group = otter_vm_core::GroupId::new(word)
                        }
                        other => panic!("cannot store object field {other:?}"),
                    }
                }
                Inst::LoadElementsField { dst, obj, field } => {
                    let elements = &rt.object(object(self.reg(obj))).elements;
                    let word = match field {
                        ElementsField::InitializedLength => elements.initialized_length() as u64,
                        ElementsField::Capacity => elements.capacity as u64,
                        ElementsField::Length => elements.length as u64,
                        ElementsField::Flags => elements.flags.bits() as u64,
                    };
                    self.set_reg(dst, word);
                }
                Inst::StoreElementsLength { obj, src } => {
                    let length = self.reg(src) as u32;
                    rt.object_mut(object(self.reg(obj))).elements.length = length;
                }
                Inst::LoadFunctionField { dst, obj, field } => {
                    let fun = rt.function(object(self.reg(obj)));
                    let word = match (field, fun) {
                        (FunctionField::NargsAndFlags, Some(f)) => f.nargs_and_flags() as u64,
                        (FunctionField::Nargs, Some(f)) => f.nargs as u64,
                        (FunctionField::HasJitEntry, Some(f)) => f.has_jit_entry() as u64,
                        (FunctionField::DomThisClass, Some(f)) => {
                            f.dom_this_class.map_or(u64::MAX, |c| c.index() as u64)
                        }
                        (FunctionField::DomThisClass, None) => u64::MAX,
                        (_, None) => 0,
                    };
                    self.set_reg(dst, word);
                }
                Inst::LoadFixedSlot { dst, obj, offset } => {
                    let v = rt.load_fixed_slot(object(self.reg(obj)), self.reg(offset) as u32);
                    self.set_reg(dst, v.to_bits());
                }
                Inst::StoreFixedSlot { obj, offset, src } => {
                    let v = Value::from_bits(self.reg(src));
                    rt.store_fixed_slot(object(self.reg(obj)), self.reg(offset) as u32, v);
                }
                Inst::LoadDynamicSlot { dst, obj, offset } => {
                    let v = rt.load_dynamic_slot(object(self.reg(obj)), self.reg(offset) as u32);
                    self.set_reg(dst, v.to_bits());
                }
                Inst::StoreDynamicSlot { obj, offset, src } => {
                    let v = Value::from_bits(self.reg(src));
                    rt.store_dynamic_slot(object(self.reg(obj)), self.reg(offset) as u32, v);
                }
                Inst::LoadElement { dst, obj, index } => {
                    let v = rt
                        .dense_element(object(self.reg(obj)), self.reg(index) as u32)
                        .unwrap_or(Value::magic(JSWhyMagic::ElementsHole));
                    self.set_reg(dst, v.to_bits());
                }
                Inst::StoreElement { obj, index, src } => {
                    let v = Value::from_bits(self.reg(src));
                    let index = self.reg(index) as usize;
                    let values = &mut rt.object_mut(object(self.reg(obj))).elements.values;
                    assert!(index < values.len(), "element store past the initialized length");
                    values[index] = v;
                }
                Inst::AppendElement { obj, src } => {
                    let v = Value::from_bits(self.reg(src));
                    let elements = &mut rt.object_mut(object(self.reg(obj))).elements;
                    debug_assert!(elements.initialized_length() < elements.capacity);
                    elements.values.push(v);
                }
                Inst::LoadStringLength { dst, str } => {
                    let len = rt.strings.length(string(self.reg(str)));
                    self.set_reg(dst, len as u64);
                }
                Inst::LoadStringCharCode { dst, str, index, fail } => {
                    let s = string(self.reg(str));
                    match rt.strings.char_code_at(s, self.reg(index) as u32 as usize) {
                        Some(unit) => self.set_reg(dst, unit as u64),
                        None => ip = code.label_position(fail),
                    }
                }

                Inst::BranchIncrementalMarking { active, target } => {
                    if rt.gc.incremental_marking == active {
                        ip = code.label_position(target);
                    }
                }
                Inst::BranchObjectInNursery { in_nursery, obj, target } => {
                    if rt.object(object(self.reg(obj))).in_nursery == in_nursery {
                        ip = code.label_position(target);
                    }
                }
                Inst::BranchValueIsNurseryObject { in_nursery, value, target } => {
                    let is_nursery = Value::from_bits(self.reg(value))
                        .as_object()
                        .is_some_and(|o| rt.object(o).in_nursery);
                    if is_nursery == in_nursery {
                        ip = code.label_position(target);
                    }
                }

                Inst::Push(src) => self.stack.push(self.operand(src)),
                Inst::Pop(dst) => {
                    let word = self.pop_word();
                    self.set_reg(dst, word);
                }
                Inst::LoadStack { dst, depth } => {
                    let word = self.stack[self.stack_slot(depth)];
                    self.set_reg(dst, word);
                }
                Inst::StoreStack { src, depth } => {
                    let slot = self.stack_slot(depth);
                    self.stack[slot] = self.reg(src);
                }
                Inst::FreeStack(n) => {
                    let len = self.stack.len() - n as usize;
                    debug_assert!(len >= fp, "stub freed its caller's frame");
                    self.stack.truncate(len);
                }
                Inst::LoadFrameSlot { dst, slot } => {
                    self.set_reg(dst, self.stack[fp - 1 - slot as usize]);
                }
                Inst::LoadFrameSlotDynamic { dst, base, extra } => {
                    let slot = self.reg(base) as u32 as usize + extra as usize;
                    self.set_reg(dst, self.stack[fp - 1 - slot]);
                }

                Inst::EnterStubFrame => {
                    rt.push_frame(FrameKind::BaselineStub { pc: env.pc });
                    frames.push(StubFrame {
                        stack_depth: self.stack.len(),
                    });
                }
                Inst::LeaveStubFrame => {
                    let frame = frames
                        .pop()
                        .unwrap_or_else(|| panic!("LeaveStubFrame without a stub frame"));
                    let popped = rt.pop_frame();
                    debug_assert!(matches!(
                        popped.map(|f| f.kind),
                        Some(FrameKind::BaselineStub { .. })
                    ));
                    self.stack.truncate(frame.stack_depth);
                }
                Inst::SwitchToObjectRealm { obj } => {
                    let obj = object(self.reg(obj));
                    let realm = rt
                        .function(obj)
                        .map_or_else(|| rt.object(obj).realm, |f| f.realm);
                    rt.set_current_realm(realm);
                }
                Inst::SwitchToCallerRealm => rt.set_current_realm(caller_realm),

                Inst::CallVM(fun) => {
                    assert!(!frames.is_empty(), "{} called without a stub frame", fun.name());
                    self.call_vm_function(fun, rt, env)?;
                }
                Inst::CallWithABI(fun) => {
                    let gc_calls = rt.gc.gc_capable_calls();
                    self.call_vm_function(fun, rt, env)?;
                    debug_assert_eq!(rt.gc.gc_capable_calls(), gc_calls);
                }
                Inst::CallJit { callee, argc, constructing, target } => {
                    assert!(!frames.is_empty(), "JIT call without a stub frame");
                    let callee = object(self.reg(callee));
                    let mut args = self.outgoing_args(callee, self.reg(argc) as usize, constructing);
                    let nargs = rt.function(callee).map_or(0, |f| f.nargs as usize);
                    match target {
                        CallTarget::JitEntry => debug_assert!(args.argc >= nargs),
                        CallTarget::ArgumentsRectifier => args.rectify(nargs),
                    }
                    let result = rt.enter_function(callee, &args)?;
                    self.set_reg(Register::R0, result.to_bits());
                }
                Inst::CallNative { callee, argc, constructing } => {
                    assert!(!frames.is_empty(), "native call without a stub frame");
                    let callee = object(self.reg(callee));
                    let args = self.outgoing_args(callee, self.reg(argc) as usize, constructing);
                    rt.maybe_gc();
                    let result = rt.enter_function(callee, &args)?;
                    self.set_reg(Register::R0, result.to_bits());
                }

                Inst::BumpEnteredCount => env.stub.bump_entered_count(),
                Inst::BranchTypeAccepted { value, target } => {
                    if env.stub.accepts(Value::from_bits(self.reg(value))) {
                        ip = code.label_position(target);
                    }
                }
                Inst::TypeMonitor => {
                    env.fallback.record_monitored(Value::from_bits(self.reg(Register::R0)));
                }
                Inst::Ret => {
                    debug_assert!(frames.is_empty(), "return inside a stub frame");
                    return Ok(StubExit::Return(Value::from_bits(self.reg(Register::R0))));
                }
                Inst::FailureExit => {
                    debug_assert!(frames.is_empty(), "failure inside a stub frame");
                    debug_assert_eq!(self.stack.len(), fp, "failure path left words on the stack");
                    return Ok(StubExit::Failure);
                }
            }
        }
    }

    fn call_vm_function(&mut self, fun: VMFunctionId, rt: &mut Runtime, env: &StubEnv<'_>) -> VmResult<()> {
        let args: SmallVec<[u64; 4]> = (0..fun.arity()).map(|_| self.pop_word()).collect();
        let ret = fun.invoke(rt, env.stub, &args)?;
        self.set_reg(Register::R0, ret.value);
        self.set_reg(Register::R1, ret.ok as u64);
        Ok(())
    }

    /// Read `this`, the arguments and `new.target` the stub pushed for a
    /// call: `this` on top, then the arguments in order, then `new.target`.
    fn outgoing_args(&self, callee: ObjectId, argc: usize, constructing: bool) -> CallArgs {
        let top = self.stack.len() - 1;
        let this = Value::from_bits(self.stack[top]);
        let args = (0..argc)
            .map(|i| Value::from_bits(self.stack[top - 1 - i]))
            .collect();
        let mut call = CallArgs::new(callee, this, args);
        if constructing {
            call.new_target = Some(Value::from_bits(self.stack[top - 1 - argc]));
        }
        call
    }
}

fn object(payload: u64) -> ObjectId {
    ObjectId::new(payload as u32)
}

fn string(payload: u64) -> StringId {
    StringId::new(payload as u32)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use otter_cacheir::{CacheIRStubInfo, CacheKind, ICStubEngine, StubFieldType};
    use otter_vm_core::ValueType;

    use super::*;
    use crate::masm::{Condition, Label, MacroAssembler};

    fn run_code(
        masm: MacroAssembler,
        data: Vec<u8>,
        rt: &mut Runtime,
        machine: &mut StubMachine,
    ) -> VmResult<StubExit> {
        let code = masm.link(CacheKind::GetProp).unwrap();
        let fields = vec![StubFieldType::RawInt64; data.len() / 8];
        let info = CacheIRStubInfo::new(CacheKind::GetProp, ICStubEngine::Baseline, false, &[], &fields);
        let stub = ICStub::new(Arc::new(code), info, data.into_boxed_slice(), None);
        let fallback = ICFallbackStub::new(CacheKind::GetProp, 3);
        let env = StubEnv { pc: 3, stub: &stub, fallback: &fallback };
        machine.run(stub.code(), rt, &env)
    }

    #[test]
    fn loads_stub_words_and_branches() {
        let mut rt = Runtime::new();
        let mut machine = StubMachine::new();
        let mut masm = MacroAssembler::new();
        let fail: Label = masm.new_label();
        masm.load_stub_word(8, Register::R2);
        masm.branch32(Condition::NotEqual, Register::R2, Operand::Imm(42), fail);
        masm.tag_value(ValueType::Int32, Register::R2, Register::R0);
        masm.emit(Inst::Ret);
        masm.bind(fail);
        masm.emit(Inst::FailureExit);

        let mut data = vec![0u8; 16];
        data[8] = 42;
        let exit = run_code(masm, data, &mut rt, &mut machine).unwrap();
        assert_eq!(exit, StubExit::Return(Value::int32(42)));
    }

    #[test]
    fn frame_slots_are_relative_to_entry() {
        let mut rt = Runtime::new();
        let mut machine = StubMachine::new();
        machine.push(Value::int32(1).to_bits());
        machine.push(Value::int32(2).to_bits());
        let mut masm = MacroAssembler::new();
        masm.push(Register::R3);
        masm.emit(Inst::LoadFrameSlot { dst: Register::R0, slot: 1 });
        masm.emit(Inst::FreeStack(1));
        masm.emit(Inst::Ret);
        let exit = run_code(masm, Vec::new(), &mut rt, &mut machine).unwrap();
        assert_eq!(exit, StubExit::Return(Value::int32(1)));
        assert_eq!(machine.stack_depth(), 2);
    }

    #[test]
    fn exceptions_unwind_stub_frames() {
        let mut rt = Runtime::new();
        let thrower = rt.new_native_function(0, |rt, _| Err(rt.type_error("boom")));
        let mut machine = StubMachine::new();
        let mut masm = MacroAssembler::new();
        masm.emit(Inst::EnterStubFrame);
        masm.push(Operand::Imm(Value::UNDEFINED.to_bits()));
        masm.mov_imm(thrower.index() as u64, Register::R2);
        masm.mov_imm(0, Register::R3);
        masm.emit(Inst::CallNative { callee: Register::R2, argc: Register::R3, constructing: false });
        masm.emit(Inst::LeaveStubFrame);
        masm.emit(Inst::Ret);
        assert!(run_code(masm, Vec::new(), &mut rt, &mut machine).is_err());
        assert!(rt.frames().is_empty());
        assert_eq!(machine.stack_depth(), 0);
    }
}
