//! Calls out of a stub: accessors and call ICs.
//!
//! A call IC's frame holds, from the deepest slot up: the callee, `this`,
//! the arguments and, for `new`, the new target. Frame slot 0 is the word
//! pushed last, so with `c = constructing as u32`:
//!
//! ```text
//! slot 0              new.target (constructing only)
//! slot argc - 1 - i   argument i
//! slot argc + c       this
//! slot argc + c + 1   callee
//! ```
//!
//! The callee reads `this` from the top of the outgoing stack, argument `i`
//! below it at depth `1 + i` and the new target below the arguments.
//! Pushing frame slots `0..argc + c` in order and then `this` builds
//! exactly that layout.

use otter_cacheir::{ArgFormat, CallFlags, Int32OperandId, ObjOperandId, ValOperandId};
use otter_vm_core::{Value, ValueType};

use super::BaselineCacheIRCompiler;
use crate::masm::{CallTarget, Condition, ElementsField, FunctionField, Inst, Int32BinOp, Operand, Register};
use crate::vm_functions::VMFunctionId;

/// How the callee is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CallTargetKind {
    /// Through its JIT entry, or the arguments rectifier
    Scripted,
    /// Directly, or through a VM accessor helper
    Native,
}

impl BaselineCacheIRCompiler<'_> {
    /// Enter `callee` with `argc` arguments, through the rectifier when it
    /// declares more formals than were passed. `nargs` is clobbered.
    pub(super) fn emit_call_jit(&mut self, callee: Register, argc: Register, nargs: Register, constructing: bool) {
        let rectify = self.masm.new_label();
        let done = self.masm.new_label();
        self.masm.emit(Inst::LoadFunctionField { dst: nargs, obj: callee, field: FunctionField::Nargs });
        self.masm.branch32(Condition::Above, nargs, argc, rectify);
        self.masm.emit(Inst::CallJit { callee, argc, constructing, target: CallTarget::JitEntry });
        self.masm.jump(done);
        self.masm.bind(rectify);
        self.masm.emit(Inst::CallJit {
            callee,
            argc,
            constructing,
            target: CallTarget::ArgumentsRectifier,
        });
        self.masm.bind(done);
    }

    pub(super) fn call_getter(&mut self, receiver: ValOperandId, getter: u32, same_realm: bool, kind: CallTargetKind) {
        let _out = self.output();
        self.evict();
        let receiver = self.use_value(receiver.id());
        let callee = self.stub_word(getter);
        let argc = self.scratch();
        let nargs = self.scratch();

        self.alloc.enter_stub_frame(&mut self.masm);
        if !same_realm {
            self.masm.emit(Inst::SwitchToObjectRealm { obj: callee });
        }
        match kind {
            CallTargetKind::Scripted => {
                self.alloc.push(&mut self.masm, receiver);
                self.masm.mov_imm(0, argc);
                self.emit_call_jit(callee, argc, nargs, false);
            }
            CallTargetKind::Native => {
                self.alloc.push(&mut self.masm, receiver);
                self.alloc.push(&mut self.masm, callee);
                self.masm.emit(Inst::CallVM(VMFunctionId::CallNativeGetter));
                self.alloc.popped(VMFunctionId::CallNativeGetter.arity());
            }
        }
        self.alloc.leave_stub_frame(&mut self.masm);
        if !same_realm {
            self.masm.emit(Inst::SwitchToCallerRealm);
        }
    }

    pub(super) fn call_setter(
        &mut self,
        receiver: ObjOperandId,
        setter: u32,
        rhs: ValOperandId,
        same_realm: bool,
        kind: CallTargetKind,
    ) {
        self.evict();
        let receiver = self.use_value(receiver.id());
        let rhs = self.use_value(rhs.id());
        let callee = self.stub_word(setter);
        let argc = self.scratch();
        let nargs = self.scratch();

        self.alloc.enter_stub_frame(&mut self.masm);
        if !same_realm {
            self.masm.emit(Inst::SwitchToObjectRealm { obj: callee });
        }
        match kind {
            CallTargetKind::Scripted => {
                self.alloc.push(&mut self.masm, rhs);
                self.alloc.push(&mut self.masm, receiver);
                self.masm.mov_imm(1, argc);
                self.emit_call_jit(callee, argc, nargs, false);
            }
            CallTargetKind::Native => {
                self.alloc.push(&mut self.masm, rhs);
                self.alloc.push(&mut self.masm, receiver);
                self.alloc.push(&mut self.masm, callee);
                self.masm.emit(Inst::CallVM(VMFunctionId::CallNativeSetter));
                self.alloc.popped(VMFunctionId::CallNativeSetter.arity());
            }
        }
        self.alloc.leave_stub_frame(&mut self.masm);
        if !same_realm {
            self.masm.emit(Inst::SwitchToCallerRealm);
        }
    }

    /// Push frame slots `[0, count)`, deepest slot first. `i` and `v` are
    /// clobbered.
    fn push_frame_slots(&mut self, count: Register, i: Register, v: Register) {
        let head = self.masm.new_label();
        let done = self.masm.new_label();
        self.masm.mov_imm(0, i);
        self.masm.bind(head);
        self.masm.branch32(Condition::GreaterThanOrEqual, i, count, done);
        self.masm.emit(Inst::LoadFrameSlotDynamic { dst: v, base: i, extra: 0 });
        self.masm.push(v);
        self.masm.emit(Inst::Int32Op { op: Int32BinOp::Add, dst: i, src: Operand::Imm(1) });
        self.masm.jump(head);
        self.masm.bind(done);
    }

    /// Allocate `this` for a constructor call and leave it boxed in `v`.
    fn create_this(&mut self, callee: Register, v: Register) {
        self.masm.emit(Inst::LoadFrameSlot { dst: v, slot: 0 });
        self.masm.push(v);
        self.masm.push(callee);
        self.masm.emit(Inst::CallVM(VMFunctionId::CreateThis));
        self.masm.tag_value(ValueType::Object, Register::R0, v);
    }

    /// Push the dense elements of the array in frame slot `slot`, last
    /// element first, leaving their number in `count`.
    fn push_array_elements(&mut self, slot: u32, array: Register, count: Register, i: Register, v: Register) {
        self.masm.emit(Inst::LoadFrameSlot { dst: array, slot });
        self.masm.unbox_non_double(array, array, ValueType::Object);
        self.masm.emit(Inst::LoadElementsField {
            dst: count,
            obj: array,
            field: ElementsField::InitializedLength,
        });
        let head = self.masm.new_label();
        let done = self.masm.new_label();
        self.masm.mov(count, i);
        self.masm.bind(head);
        self.masm.branch32(Condition::Equal, i, Operand::Imm(0), done);
        self.masm.emit(Inst::Int32Op { op: Int32BinOp::Sub, dst: i, src: Operand::Imm(1) });
        self.masm.emit(Inst::LoadElement { dst: v, obj: array, index: i });
        self.masm.push(v);
        self.masm.jump(head);
        self.masm.bind(done);
    }

    pub(super) fn call_function(
        &mut self,
        callee: ObjOperandId,
        argc: Int32OperandId,
        flags: CallFlags,
        kind: CallTargetKind,
        this_obj: Option<ObjOperandId>,
    ) {
        let format = flags.arg_format();
        let constructing = flags.is_constructing();
        let c = constructing as u32;

        let _out = self.output();
        self.evict();
        let callee = self.use_object(callee.id());
        let from_array = matches!(format, ArgFormat::Spread | ArgFormat::FunApplyArray);
        let argc = (!from_array).then(|| self.use_int32(argc.id()));
        let count = self.scratch();
        let i = self.scratch();
        let v = self.scratch();
        let spread_array = from_array.then(|| self.scratch());
        let dom_this = this_obj.map(|obj| self.use_object(obj.id()));

        self.alloc.enter_stub_frame(&mut self.masm);
        if !flags.is_same_realm() {
            self.masm.emit(Inst::SwitchToObjectRealm { obj: callee });
        }

        let call_argc = match (format, argc, spread_array) {
            (ArgFormat::Standard, Some(argc), _) => {
                self.masm.mov(argc, count);
                if constructing {
                    self.masm.emit(Inst::Int32Op { op: Int32BinOp::Add, dst: count, src: Operand::Imm(1) });
                }
                self.push_frame_slots(count, i, v);
                if constructing {
                    self.create_this(callee, v);
                } else {
                    self.masm.emit(Inst::LoadFrameSlotDynamic { dst: v, base: argc, extra: c });
                }
                argc
            }
            (ArgFormat::Spread, _, Some(array)) => {
                if constructing {
                    self.masm.emit(Inst::LoadFrameSlot { dst: v, slot: 0 });
                    self.masm.push(v);
                }
                self.push_array_elements(c, array, count, i, v);
                if constructing {
                    self.create_this(callee, v);
                } else {
                    self.masm.emit(Inst::LoadFrameSlot { dst: v, slot: c + 1 });
                }
                count
            }
            (ArgFormat::FunCall, Some(argc), _) => {
                assert!(!constructing, "FunCall cannot construct");
                let no_args = self.masm.new_label();
                let push_this = self.masm.new_label();
                self.masm.mov(argc, count);
                self.masm.branch32(Condition::Equal, count, Operand::Imm(0), no_args);
                self.masm.emit(Inst::Int32Op { op: Int32BinOp::Sub, dst: count, src: Operand::Imm(1) });
                self.push_frame_slots(count, i, v);
                self.masm.emit(Inst::LoadFrameSlotDynamic { dst: v, base: count, extra: 0 });
                self.masm.jump(push_this);
                self.masm.bind(no_args);
                self.masm.move_value(Value::UNDEFINED.to_bits(), v);
                self.masm.bind(push_this);
                count
            }
            (ArgFormat::FunApplyArray, _, Some(array)) => {
                assert!(!constructing, "FunApplyArray cannot construct");
                self.push_array_elements(0, array, count, i, v);
                self.masm.emit(Inst::LoadFrameSlot { dst: v, slot: 1 });
                count
            }
            (other, _, _) => panic!("baseline call with argument format {other:?}"),
        };

        if let Some(this_reg) = dom_this {
            self.masm.tag_value(ValueType::Object, this_reg, v);
        }
        self.masm.push(v);

        match kind {
            CallTargetKind::Scripted => self.emit_call_jit(callee, call_argc, i, constructing),
            CallTargetKind::Native => self.masm.emit(Inst::CallNative {
                callee,
                argc: call_argc,
                constructing,
            }),
        }

        if constructing {
            // A constructor returning a primitive yields `this`.
            let done = self.masm.new_label();
            self.masm.branch_test_type(Register::R0, ValueType::Object, done);
            self.masm.emit(Inst::LoadStack { dst: Register::R0, depth: 0 });
            self.masm.bind(done);
        }

        self.alloc.leave_stub_frame(&mut self.masm);
        if !flags.is_same_realm() {
            self.masm.emit(Inst::SwitchToCallerRealm);
        }
    }
}
