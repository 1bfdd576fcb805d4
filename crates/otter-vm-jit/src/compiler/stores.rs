//! Property and element stores.
//!
//! Every store runs its checks first, then the type update, then the write
//! framed by the GC barriers. Nothing fails after the first write.

use otter_cacheir::{Int32OperandId, ObjOperandId, ValOperandId};
use otter_vm_core::{ElementsFlags, ValueType};

use super::BaselineCacheIRCompiler;
use crate::masm::{Condition, ElementsField, Inst, Int32BinOp, ObjectField, Operand, Register};
use crate::vm_functions::VMFunctionId;

impl BaselineCacheIRCompiler<'_> {
    /// Record the type of `value` stored into `obj` unless the stub already
    /// accepts it.
    fn emit_type_update(&mut self, obj: Register, value: Register) {
        if !self.options.type_inference {
            return;
        }
        let done = self.masm.new_label();
        self.masm.emit(Inst::BranchTypeAccepted { value, target: done });
        self.alloc.enter_stub_frame(&mut self.masm);
        self.alloc.push(&mut self.masm, value);
        self.alloc.push(&mut self.masm, obj);
        self.masm.emit(Inst::CallVM(VMFunctionId::DoTypeUpdateFallback));
        self.alloc.popped(VMFunctionId::DoTypeUpdateFallback.arity());
        self.alloc.leave_stub_frame(&mut self.masm);
        self.masm.bind(done);
    }

    /// Report the value about to be overwritten while marking is active.
    /// `load_old` loads it into `old`.
    fn emit_pre_barrier(&mut self, load_old: Inst, old: Register) {
        let skip = self.masm.new_label();
        self.masm.emit(Inst::BranchIncrementalMarking { active: false, target: skip });
        self.masm.emit(load_old);
        self.alloc.push(&mut self.masm, old);
        self.masm.emit(Inst::CallWithABI(VMFunctionId::PreWriteBarrier));
        self.alloc.popped(VMFunctionId::PreWriteBarrier.arity());
        self.masm.bind(skip);
    }

    /// Remember a tenured object that now points into the nursery.
    fn emit_post_barrier(&mut self, obj: Register, value: Register) {
        let skip = self.masm.new_label();
        self.masm.emit(Inst::BranchObjectInNursery { in_nursery: true, obj, target: skip });
        self.masm.emit(Inst::BranchValueIsNurseryObject { in_nursery: false, value, target: skip });
        self.alloc.push(&mut self.masm, obj);
        self.masm.emit(Inst::CallWithABI(VMFunctionId::PostWriteBarrier));
        self.alloc.popped(VMFunctionId::PostWriteBarrier.arity());
        self.masm.bind(skip);
    }

    pub(super) fn store_slot(&mut self, obj: ObjOperandId, offset: u32, rhs: ValOperandId, dynamic: bool) {
        self.evict();
        let obj = self.use_object(obj.id());
        let value = self.use_value(rhs.id());
        let offset = self.stub_word(offset);
        let old = self.scratch();

        self.emit_type_update(obj, value);
        let (load_old, store) = if dynamic {
            (
                Inst::LoadDynamicSlot { dst: old, obj, offset },
                Inst::StoreDynamicSlot { obj, offset, src: value },
            )
        } else {
            (
                Inst::LoadFixedSlot { dst: old, obj, offset },
                Inst::StoreFixedSlot { obj, offset, src: value },
            )
        };
        self.emit_pre_barrier(load_old, old);
        self.masm.emit(store);
        self.emit_post_barrier(obj, value);
    }

    /// Add a data property: optionally grow the dynamic slots, then switch
    /// the group and shape and store the value. A fresh slot holds nothing
    /// the collector needs to see, so there is no pre-barrier.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn add_and_store_slot(
        &mut self,
        obj: ObjOperandId,
        offset: u32,
        rhs: ValOperandId,
        change_group: bool,
        new_group: u32,
        new_shape: u32,
        dynamic: bool,
        num_new_slots: Option<u32>,
    ) {
        self.evict();
        let obj = self.use_object(obj.id());
        let value = self.use_value(rhs.id());
        let word = self.scratch();

        if let Some(num_new_slots) = num_new_slots {
            self.masm.load_stub_word(num_new_slots, word);
            self.alloc.push(&mut self.masm, word);
            self.alloc.push(&mut self.masm, obj);
            self.masm.emit(Inst::CallWithABI(VMFunctionId::GrowSlotsPure));
            self.alloc.popped(VMFunctionId::GrowSlotsPure.arity());
            let fail = self.failure_path();
            self.masm.branch32(Condition::Equal, Register::R0, Operand::Imm(0), fail);
        }

        self.emit_type_update(obj, value);
        if change_group {
            self.masm.load_stub_word(new_group, word);
            self.masm.emit(Inst::StoreObjectField { obj, field: ObjectField::Group, src: word });
        }
        self.masm.load_stub_word(new_shape, word);
        self.masm.emit(Inst::StoreObjectField { obj, field: ObjectField::Shape, src: word });
        self.masm.load_stub_word(offset, word);
        self.masm.emit(if dynamic {
            Inst::StoreDynamicSlot { obj, offset: word, src: value }
        } else {
            Inst::StoreFixedSlot { obj, offset: word, src: value }
        });
        self.emit_post_barrier(obj, value);
    }

    pub(super) fn store_dense_element(&mut self, obj: ObjOperandId, index: Int32OperandId, rhs: ValOperandId) {
        self.evict();
        let obj = self.use_object(obj.id());
        let index = self.use_int32(index.id());
        let value = self.use_value(rhs.id());
        let old = self.scratch();
        let fail = self.failure_path();

        self.masm.emit(Inst::LoadElementsField { dst: old, obj, field: ElementsField::InitializedLength });
        self.masm.branch32(Condition::AboveOrEqual, index, old, fail);
        self.masm.emit(Inst::LoadElement { dst: old, obj, index });
        self.masm.branch_test_type(old, ValueType::Magic, fail);

        self.emit_type_update(obj, value);
        self.emit_pre_barrier(Inst::LoadElement { dst: old, obj, index }, old);
        self.masm.emit(Inst::StoreElement { obj, index, src: value });
        self.emit_post_barrier(obj, value);
    }

    /// Store below the initialized length, holes included. With
    /// `handle_add` an index equal to the initialized length appends,
    /// growing the capacity and the array length as needed.
    pub(super) fn store_dense_element_hole(
        &mut self,
        obj: ObjOperandId,
        index: Int32OperandId,
        rhs: ValOperandId,
        handle_add: bool,
    ) {
        self.evict();
        let obj = self.use_object(obj.id());
        let index = self.use_int32(index.id());
        let value = self.use_value(rhs.id());
        let init_len = self.scratch();
        let tmp = self.scratch();
        let fail = self.failure_path();
        let checked = self.masm.new_label();

        self.masm.emit(Inst::LoadElementsField { dst: init_len, obj, field: ElementsField::InitializedLength });
        self.masm.branch32(Condition::Below, index, init_len, checked);
        if handle_add {
            self.masm.branch32(Condition::NotEqual, index, init_len, fail);
            self.masm.emit(Inst::LoadElementsField { dst: tmp, obj, field: ElementsField::Flags });
            self.masm.emit(Inst::BranchTest32 {
                zero: false,
                lhs: tmp,
                mask: ElementsFlags::NOT_EXTENSIBLE.bits() as u32,
                target: fail,
            });
            self.masm.emit(Inst::LoadElementsField { dst: tmp, obj, field: ElementsField::Capacity });
            self.masm.branch32(Condition::Below, init_len, tmp, checked);
            self.alloc.push(&mut self.masm, obj);
            self.masm.emit(Inst::CallWithABI(VMFunctionId::AddDenseElementPure));
            self.alloc.popped(VMFunctionId::AddDenseElementPure.arity());
            self.masm.branch32(Condition::Equal, Register::R0, Operand::Imm(0), fail);
        } else {
            self.masm.jump(fail);
        }
        self.masm.bind(checked);

        self.emit_type_update(obj, value);

        let append = self.masm.new_label();
        let done = self.masm.new_label();
        if handle_add {
            self.masm.branch32(Condition::AboveOrEqual, index, init_len, append);
        }
        self.emit_pre_barrier(Inst::LoadElement { dst: tmp, obj, index }, tmp);
        self.masm.emit(Inst::StoreElement { obj, index, src: value });
        if handle_add {
            self.masm.jump(done);
            self.masm.bind(append);
            self.masm.emit(Inst::AppendElement { obj, src: value });
            self.masm.emit(Inst::LoadElementsField { dst: tmp, obj, field: ElementsField::Length });
            self.masm.branch32(Condition::Above, tmp, index, done);
            self.masm.mov(index, tmp);
            self.masm.emit(Inst::Int32Op { op: Int32BinOp::Add, dst: tmp, src: Operand::Imm(1) });
            self.masm.emit(Inst::StoreElementsLength { obj, src: tmp });
        }
        self.masm.bind(done);
        self.emit_post_barrier(obj, value);
    }

    /// `array.push(value)` on a packed, extensible array whose length
    /// equals its initialized length. Returns the new length.
    pub(super) fn array_push(&mut self, obj: ObjOperandId, rhs: ValOperandId) {
        let out = self.output();
        self.evict();
        let obj = self.use_object(obj.id());
        let value = self.use_value(rhs.id());
        let len = self.scratch();
        let tmp = self.scratch();
        let fail = self.failure_path();
        let has_capacity = self.masm.new_label();

        self.masm.emit(Inst::LoadElementsField { dst: len, obj, field: ElementsField::InitializedLength });
        self.masm.emit(Inst::LoadElementsField { dst: tmp, obj, field: ElementsField::Length });
        self.masm.branch32(Condition::NotEqual, len, tmp, fail);
        self.masm.emit(Inst::LoadElementsField { dst: tmp, obj, field: ElementsField::Flags });
        self.masm.emit(Inst::BranchTest32 {
            zero: false,
            lhs: tmp,
            mask: ElementsFlags::NOT_EXTENSIBLE.bits() as u32,
            target: fail,
        });
        self.masm.emit(Inst::LoadElementsField { dst: tmp, obj, field: ElementsField::Capacity });
        self.masm.branch32(Condition::Below, len, tmp, has_capacity);
        self.alloc.push(&mut self.masm, obj);
        self.masm.emit(Inst::CallWithABI(VMFunctionId::AddDenseElementPure));
        self.alloc.popped(VMFunctionId::AddDenseElementPure.arity());
        self.masm.branch32(Condition::Equal, Register::R0, Operand::Imm(0), fail);
        self.masm.bind(has_capacity);

        self.emit_type_update(obj, value);
        self.masm.emit(Inst::AppendElement { obj, src: value });
        self.masm.emit(Inst::Int32Op { op: Int32BinOp::Add, dst: len, src: Operand::Imm(1) });
        self.masm.emit(Inst::StoreElementsLength { obj, src: len });
        self.emit_post_barrier(obj, value);
        self.masm.tag_value(ValueType::Int32, len, out);
    }
}
