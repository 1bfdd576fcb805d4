//! One handler per CacheIR opcode.

use otter_cacheir::{
    BooleanOperandId, CacheIROps, CallFlags, GuardClassKind, Int32OperandId,
    JSOp, NumberOperandId, ObjOperandId, StringOperandId, SymbolOperandId, UnaryMathFunction,
    ValOperandId,
};
use otter_vm_core::{ClassFlags, ElementsFlags, FunctionFlags, Value, ValueType};

use super::BaselineCacheIRCompiler;
use super::calls::CallTargetKind;
use crate::error::{JitError, JitResult};
use crate::masm::{
    Condition, DoubleBinOp, DoubleCondition, DoubleUnaryOp, ElementsField, FloatRegister,
    FunctionField, Inst, Int32BinOp, Int32UnaryOp, NULL_OBJECT, ObjectField, Operand, Register,
};
use crate::vm_functions::VMFunctionId;

const F0: FloatRegister = FloatRegister::F0;
const F1: FloatRegister = FloatRegister::F1;

impl BaselineCacheIRCompiler<'_> {
    fn guard_type(&mut self, input: u16, ty: ValueType) {
        let value = self.use_value(input);
        let fail = self.failure_path();
        self.masm.branch_test_not_type(value, ty, fail);
    }

    /// Fail when `field` of the object differs from the stub word.
    fn guard_object_field(&mut self, obj: ObjOperandId, field: ObjectField, offset: u32) {
        let obj = self.use_object(obj.id());
        let actual = self.scratch();
        let expected = self.stub_word(offset);
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadObjectField { dst: actual, obj, field });
        self.masm.branch64(Condition::NotEqual, actual, expected, fail);
    }

    /// Fail when the payload differs from the stub word.
    fn guard_specific(&mut self, id: u16, ty: ValueType, offset: u32) {
        let payload = self.use_payload(id, ty);
        let expected = self.stub_word(offset);
        let fail = self.failure_path();
        self.masm.branch64(Condition::NotEqual, payload, expected, fail);
    }

    /// Fail unless `flags & mask` is nonzero (`set`) or zero.
    fn guard_function_flag(&mut self, fun: ObjOperandId, mask: FunctionFlags, set: bool) {
        let fun = self.use_object(fun.id());
        let word = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadFunctionField { dst: word, obj: fun, field: FunctionField::NargsAndFlags });
        self.masm.emit(Inst::BranchTest32 { zero: set, lhs: word, mask: mask.bits() as u32, target: fail });
    }

    fn int32_checked_result(&mut self, op: Int32BinOp, lhs: Int32OperandId, rhs: Int32OperandId) {
        let out = self.output();
        let lhs = self.use_int32(lhs.id());
        let rhs = self.use_int32(rhs.id());
        let result = self.scratch();
        let fail = self.failure_path();
        self.masm.mov(lhs, result);
        self.masm.emit(Inst::BranchInt32Op { op, dst: result, src: rhs.into(), target: fail });
        self.tag_result(ValueType::Int32, result, out);
    }

    fn int32_result(&mut self, op: Int32BinOp, lhs: Int32OperandId, rhs: Int32OperandId) {
        let out = self.output();
        let lhs = self.use_int32(lhs.id());
        let rhs = self.use_int32(rhs.id());
        let result = self.scratch();
        self.masm.mov(lhs, result);
        self.masm.emit(Inst::Int32Op { op, dst: result, src: rhs.into() });
        self.tag_result(ValueType::Int32, result, out);
    }

    fn double_result(&mut self, op: DoubleBinOp, lhs: NumberOperandId, rhs: NumberOperandId) {
        let out = self.output();
        self.alloc.ensure_double(&mut self.masm, lhs.id(), F0);
        self.alloc.ensure_double(&mut self.masm, rhs.id(), F1);
        self.masm.emit(Inst::DoubleOp { op, dst: F0, src: F1 });
        self.masm.emit(Inst::BoxDouble { src: F0, dst: out });
    }

    fn double_unary_result(&mut self, op: DoubleUnaryOp, input: NumberOperandId) {
        let out = self.output();
        self.alloc.ensure_double(&mut self.masm, input.id(), F0);
        self.masm.emit(Inst::DoubleUnary { op, dst: F0 });
        self.masm.emit(Inst::BoxDouble { src: F0, dst: out });
    }

    fn double_constant_result(&mut self, op: DoubleBinOp, input: NumberOperandId, constant: f64) {
        let out = self.output();
        self.alloc.ensure_double(&mut self.masm, input.id(), F0);
        self.masm.emit(Inst::LoadConstantDouble { dst: F1, value: constant });
        self.masm.emit(Inst::DoubleOp { op, dst: F0, src: F1 });
        self.masm.emit(Inst::BoxDouble { src: F0, dst: out });
    }

    /// Return an operand that already has the result's representation.
    fn value_result(&mut self, id: u16) {
        let out = self.output();
        let value = self.use_value(id);
        self.masm.mov(value, out);
    }

    /// `R0 = cond ? true : false` from a 32/64-bit compare into a scratch.
    fn compare_result(&mut self, wide: bool, cond: Condition, lhs: u16, rhs: u16, ty: ValueType) {
        let out = self.output();
        let lhs = self.use_payload(lhs, ty);
        let rhs = self.use_payload(rhs, ty);
        let flag = self.scratch();
        let rhs = Operand::Reg(rhs);
        self.masm.emit(if wide {
            Inst::Cmp64Set { cond, lhs, rhs, dst: flag }
        } else {
            Inst::Cmp32Set { cond, lhs, rhs, dst: flag }
        });
        self.tag_result(ValueType::Boolean, flag, out);
    }
}

impl CacheIROps for BaselineCacheIRCompiler<'_> {
    type Error = JitError;

    // -----------------------------------------------------------------------
    // Value guards
    // -----------------------------------------------------------------------

    fn emit_guard_to_object(&mut self, input: ValOperandId) -> JitResult<()> {
        self.guard_type(input.id(), ValueType::Object);
        Ok(())
    }

    fn emit_guard_is_null_or_undefined(&mut self, input: ValOperandId) -> JitResult<()> {
        let value = self.use_value(input.id());
        let fail = self.failure_path();
        let done = self.masm.new_label();
        self.masm.branch_test_type(value, ValueType::Null, done);
        self.masm.branch_test_not_type(value, ValueType::Undefined, fail);
        self.masm.bind(done);
        Ok(())
    }

    fn emit_guard_is_null(&mut self, input: ValOperandId) -> JitResult<()> {
        self.guard_type(input.id(), ValueType::Null);
        Ok(())
    }

    fn emit_guard_is_undefined(&mut self, input: ValOperandId) -> JitResult<()> {
        self.guard_type(input.id(), ValueType::Undefined);
        Ok(())
    }

    fn emit_guard_to_string(&mut self, input: ValOperandId) -> JitResult<()> {
        self.guard_type(input.id(), ValueType::String);
        Ok(())
    }

    fn emit_guard_to_symbol(&mut self, input: ValOperandId) -> JitResult<()> {
        self.guard_type(input.id(), ValueType::Symbol);
        Ok(())
    }

    fn emit_guard_to_big_int(&mut self, input: ValOperandId) -> JitResult<()> {
        self.guard_type(input.id(), ValueType::BigInt);
        Ok(())
    }

    fn emit_guard_to_boolean(&mut self, input: ValOperandId) -> JitResult<()> {
        self.guard_type(input.id(), ValueType::Boolean);
        Ok(())
    }

    fn emit_guard_to_int32(&mut self, input: ValOperandId) -> JitResult<()> {
        self.guard_type(input.id(), ValueType::Int32);
        Ok(())
    }

    fn emit_guard_is_number(&mut self, input: ValOperandId) -> JitResult<()> {
        let value = self.use_value(input.id());
        let fail = self.failure_path();
        self.masm.emit(Inst::BranchTestNumber { equal: false, src: value, target: fail });
        Ok(())
    }

    fn emit_guard_non_double_type(&mut self, input: ValOperandId, ty: ValueType) -> JitResult<()> {
        assert_ne!(ty, ValueType::Double, "GuardNonDoubleType on doubles");
        self.guard_type(input.id(), ty);
        Ok(())
    }

    fn emit_guard_to_int32_index(&mut self, input: ValOperandId, result: Int32OperandId) -> JitResult<()> {
        let value = self.use_value(input.id());
        let index = self.scratch();
        let fail = self.failure_path();
        let not_int32 = self.masm.new_label();
        let done = self.masm.new_label();
        self.masm.branch_test_not_type(value, ValueType::Int32, not_int32);
        self.masm.unbox_non_double(value, index, ValueType::Int32);
        self.masm.jump(done);
        self.masm.bind(not_int32);
        self.masm.emit(Inst::BranchTestNumber { equal: false, src: value, target: fail });
        self.masm.emit(Inst::UnboxNumber { src: value, dst: F0 });
        self.masm.emit(Inst::ConvertDoubleToInt32 {
            src: F0,
            dst: index,
            fail,
            negative_zero_check: false,
        });
        self.masm.bind(done);
        self.alloc.define_payload_register(result.id(), index, ValueType::Int32);
        Ok(())
    }

    fn emit_guard_boolean_to_int32(&mut self, input: BooleanOperandId, result: Int32OperandId) -> JitResult<()> {
        let boolean = self.use_payload(input.id(), ValueType::Boolean);
        let int = self.scratch();
        self.masm.mov(boolean, int);
        self.alloc.define_payload_register(result.id(), int, ValueType::Int32);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Object guards
    // -----------------------------------------------------------------------

    fn emit_guard_shape(&mut self, obj: ObjOperandId, shape: u32) -> JitResult<()> {
        self.guard_object_field(obj, ObjectField::Shape, shape);
        Ok(())
    }

    fn emit_guard_group(&mut self, obj: ObjOperandId, group: u32) -> JitResult<()> {
        self.guard_object_field(obj, ObjectField::Group, group);
        Ok(())
    }

    fn emit_guard_class(&mut self, obj: ObjOperandId, kind: GuardClassKind) -> JitResult<()> {
        let obj = self.use_object(obj.id());
        let class = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadObjectField { dst: class, obj, field: ObjectField::Class });
        let expected = Operand::Imm(kind.class_id().index() as u64);
        self.masm.branch64(Condition::NotEqual, class, expected, fail);
        Ok(())
    }

    fn emit_guard_any_class(&mut self, obj: ObjOperandId, clasp: u32) -> JitResult<()> {
        self.guard_object_field(obj, ObjectField::Class, clasp);
        Ok(())
    }

    fn emit_guard_proto(&mut self, obj: ObjOperandId, proto: u32) -> JitResult<()> {
        self.guard_object_field(obj, ObjectField::Proto, proto);
        Ok(())
    }

    fn emit_guard_null_proto(&mut self, obj: ObjOperandId) -> JitResult<()> {
        let obj = self.use_object(obj.id());
        let proto = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadObjectField { dst: proto, obj, field: ObjectField::Proto });
        self.masm.branch64(Condition::NotEqual, proto, Operand::Imm(NULL_OBJECT), fail);
        Ok(())
    }

    fn emit_guard_is_proxy(&mut self, obj: ObjOperandId) -> JitResult<()> {
        let obj = self.use_object(obj.id());
        let flags = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadObjectField { dst: flags, obj, field: ObjectField::ClassFlags });
        self.masm.emit(Inst::BranchTest32 {
            zero: true,
            lhs: flags,
            mask: ClassFlags::IS_PROXY.bits() as u32,
            target: fail,
        });
        Ok(())
    }

    fn emit_guard_is_not_proxy(&mut self, obj: ObjOperandId) -> JitResult<()> {
        let obj = self.use_object(obj.id());
        let flags = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadObjectField { dst: flags, obj, field: ObjectField::ClassFlags });
        self.masm.emit(Inst::BranchTest32 {
            zero: false,
            lhs: flags,
            mask: ClassFlags::IS_PROXY.bits() as u32,
            target: fail,
        });
        Ok(())
    }

    fn emit_guard_specific_object(&mut self, obj: ObjOperandId, expected: u32) -> JitResult<()> {
        self.guard_specific(obj.id(), ValueType::Object, expected);
        Ok(())
    }

    fn emit_guard_specific_function(
        &mut self,
        fun: ObjOperandId,
        expected: u32,
        _nargs_and_flags: u32,
    ) -> JitResult<()> {
        self.guard_specific(fun.id(), ValueType::Object, expected);
        Ok(())
    }

    fn emit_guard_specific_atom(&mut self, str: StringOperandId, expected: u32) -> JitResult<()> {
        self.guard_specific(str.id(), ValueType::String, expected);
        Ok(())
    }

    fn emit_guard_specific_symbol(&mut self, sym: SymbolOperandId, expected: u32) -> JitResult<()> {
        self.guard_specific(sym.id(), ValueType::Symbol, expected);
        Ok(())
    }

    fn emit_guard_no_dense_elements(&mut self, obj: ObjOperandId) -> JitResult<()> {
        let obj = self.use_object(obj.id());
        let len = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadElementsField { dst: len, obj, field: ElementsField::InitializedLength });
        self.masm.branch32(Condition::NotEqual, len, Operand::Imm(0), fail);
        Ok(())
    }

    fn emit_guard_array_is_packed(&mut self, array: ObjOperandId) -> JitResult<()> {
        let obj = self.use_object(array.id());
        let flags = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadElementsField { dst: flags, obj, field: ElementsField::Flags });
        self.masm.emit(Inst::BranchTest32 {
            zero: false,
            lhs: flags,
            mask: ElementsFlags::NON_PACKED.bits() as u32,
            target: fail,
        });
        Ok(())
    }

    fn emit_guard_function_is_constructor(&mut self, fun: ObjOperandId) -> JitResult<()> {
        self.guard_function_flag(fun, FunctionFlags::CONSTRUCTOR, true);
        Ok(())
    }

    fn emit_guard_function_has_jit_entry(&mut self, fun: ObjOperandId, constructing: bool) -> JitResult<()> {
        let fun_reg = self.use_object(fun.id());
        let word = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadFunctionField { dst: word, obj: fun_reg, field: FunctionField::HasJitEntry });
        self.masm.branch32(Condition::Equal, word, Operand::Imm(0), fail);
        if constructing {
            self.masm.emit(Inst::LoadFunctionField {
                dst: word,
                obj: fun_reg,
                field: FunctionField::NargsAndFlags,
            });
            self.masm.emit(Inst::BranchTest32 {
                zero: true,
                lhs: word,
                mask: FunctionFlags::CONSTRUCTOR.bits() as u32,
                target: fail,
            });
        }
        Ok(())
    }

    fn emit_guard_function_has_no_jit_entry(&mut self, fun: ObjOperandId) -> JitResult<()> {
        let fun = self.use_object(fun.id());
        let word = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadFunctionField { dst: word, obj: fun, field: FunctionField::HasJitEntry });
        self.masm.branch32(Condition::NotEqual, word, Operand::Imm(0), fail);
        Ok(())
    }

    fn emit_guard_not_class_constructor(&mut self, fun: ObjOperandId) -> JitResult<()> {
        self.guard_function_flag(fun, FunctionFlags::CLASS_CONSTRUCTOR, false);
        Ok(())
    }

    fn emit_guard_int32_is_non_negative(&mut self, index: Int32OperandId) -> JitResult<()> {
        let index = self.use_int32(index.id());
        let fail = self.failure_path();
        self.masm.branch32(Condition::LessThan, index, Operand::Imm(0), fail);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    fn emit_load_object(&mut self, obj: u32, result: ObjOperandId) -> JitResult<()> {
        let reg = self.stub_word(obj);
        self.alloc.define_payload_register(result.id(), reg, ValueType::Object);
        Ok(())
    }

    fn emit_load_proto(&mut self, obj: ObjOperandId, result: ObjOperandId) -> JitResult<()> {
        let obj = self.use_object(obj.id());
        let proto = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadObjectField { dst: proto, obj, field: ObjectField::Proto });
        self.masm.branch64(Condition::Equal, proto, Operand::Imm(NULL_OBJECT), fail);
        self.alloc.define_payload_register(result.id(), proto, ValueType::Object);
        Ok(())
    }

    fn emit_load_int32_constant(&mut self, value: u32, result: Int32OperandId) -> JitResult<()> {
        let reg = self.stub_word(value);
        self.alloc.define_payload_register(result.id(), reg, ValueType::Int32);
        Ok(())
    }

    fn emit_load_boolean_constant(&mut self, value: bool, result: BooleanOperandId) -> JitResult<()> {
        self.alloc.define_constant(result.id(), Value::boolean(value));
        Ok(())
    }

    fn emit_load_undefined(&mut self, result: ValOperandId) -> JitResult<()> {
        self.alloc.define_constant(result.id(), Value::UNDEFINED);
        Ok(())
    }

    fn emit_load_constant_string(&mut self, str: u32, result: StringOperandId) -> JitResult<()> {
        let reg = self.stub_word(str);
        self.alloc.define_payload_register(result.id(), reg, ValueType::String);
        Ok(())
    }

    fn emit_load_argument_fixed_slot(&mut self, slot_index: u8, result: ValOperandId) -> JitResult<()> {
        self.alloc.define_frame_slot(result.id(), slot_index as u32);
        Ok(())
    }

    fn emit_load_argument_dynamic_slot(
        &mut self,
        argc: Int32OperandId,
        slot_index: u8,
        result: ValOperandId,
    ) -> JitResult<()> {
        let argc = self.use_int32(argc.id());
        let value = self.scratch();
        self.masm.emit(Inst::LoadFrameSlotDynamic { dst: value, base: argc, extra: slot_index as u32 });
        self.alloc.define_value_register(result.id(), value);
        Ok(())
    }

    fn emit_int32_min_max(
        &mut self,
        is_max: bool,
        first: Int32OperandId,
        second: Int32OperandId,
        result: Int32OperandId,
    ) -> JitResult<()> {
        let first = self.use_int32(first.id());
        let second = self.use_int32(second.id());
        let reg = self.scratch();
        let done = self.masm.new_label();
        let cond = if is_max { Condition::GreaterThanOrEqual } else { Condition::LessThanOrEqual };
        self.masm.mov(first, reg);
        self.masm.branch32(cond, reg, second, done);
        self.masm.mov(second, reg);
        self.masm.bind(done);
        self.alloc.define_payload_register(result.id(), reg, ValueType::Int32);
        Ok(())
    }

    fn emit_number_min_max(
        &mut self,
        is_max: bool,
        first: NumberOperandId,
        second: NumberOperandId,
        result: NumberOperandId,
    ) -> JitResult<()> {
        self.alloc.ensure_double(&mut self.masm, first.id(), F0);
        self.alloc.ensure_double(&mut self.masm, second.id(), F1);
        let reg = self.scratch();
        let op = if is_max { DoubleBinOp::Max } else { DoubleBinOp::Min };
        self.masm.emit(Inst::DoubleOp { op, dst: F0, src: F1 });
        self.masm.emit(Inst::BoxDouble { src: F0, dst: reg });
        self.alloc.define_value_register(result.id(), reg);
        Ok(())
    }

    fn emit_load_int32_array_length(&mut self, obj: ObjOperandId, result: Int32OperandId) -> JitResult<()> {
        let obj = self.use_object(obj.id());
        let len = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadElementsField { dst: len, obj, field: ElementsField::Length });
        self.masm.branch32(Condition::Above, len, Operand::Imm(i32::MAX as u64), fail);
        self.alloc.define_payload_register(result.id(), len, ValueType::Int32);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    fn emit_load_fixed_slot_result(&mut self, obj: ObjOperandId, offset: u32) -> JitResult<()> {
        let out = self.output();
        let obj = self.use_object(obj.id());
        let offset = self.stub_word(offset);
        self.masm.emit(Inst::LoadFixedSlot { dst: out, obj, offset });
        Ok(())
    }

    fn emit_load_dynamic_slot_result(&mut self, obj: ObjOperandId, offset: u32) -> JitResult<()> {
        let out = self.output();
        let obj = self.use_object(obj.id());
        let offset = self.stub_word(offset);
        self.masm.emit(Inst::LoadDynamicSlot { dst: out, obj, offset });
        Ok(())
    }

    fn emit_load_dense_element_result(&mut self, obj: ObjOperandId, index: Int32OperandId) -> JitResult<()> {
        let out = self.output();
        let obj = self.use_object(obj.id());
        let index = self.use_int32(index.id());
        let len = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadElementsField { dst: len, obj, field: ElementsField::InitializedLength });
        self.masm.branch32(Condition::AboveOrEqual, index, len, fail);
        self.masm.emit(Inst::LoadElement { dst: out, obj, index });
        self.masm.branch_test_type(out, ValueType::Magic, fail);
        Ok(())
    }

    fn emit_load_dense_element_hole_result(&mut self, obj: ObjOperandId, index: Int32OperandId) -> JitResult<()> {
        let out = self.output();
        let obj = self.use_object(obj.id());
        let index = self.use_int32(index.id());
        let len = self.scratch();
        let fail = self.failure_path();
        let undefined = self.masm.new_label();
        let done = self.masm.new_label();
        self.masm.branch32(Condition::LessThan, index, Operand::Imm(0), fail);
        self.masm.emit(Inst::LoadElementsField { dst: len, obj, field: ElementsField::InitializedLength });
        self.masm.branch32(Condition::AboveOrEqual, index, len, undefined);
        self.masm.emit(Inst::LoadElement { dst: out, obj, index });
        self.masm.branch_test_not_type(out, ValueType::Magic, done);
        self.masm.bind(undefined);
        self.masm.move_value(Value::UNDEFINED.to_bits(), out);
        self.masm.bind(done);
        Ok(())
    }

    fn emit_load_int32_array_length_result(&mut self, obj: ObjOperandId) -> JitResult<()> {
        let out = self.output();
        let obj = self.use_object(obj.id());
        let len = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadElementsField { dst: len, obj, field: ElementsField::Length });
        self.masm.branch32(Condition::Above, len, Operand::Imm(i32::MAX as u64), fail);
        self.tag_result(ValueType::Int32, len, out);
        Ok(())
    }

    fn emit_load_string_length_result(&mut self, str: StringOperandId) -> JitResult<()> {
        let out = self.output();
        let str = self.use_payload(str.id(), ValueType::String);
        let len = self.scratch();
        self.masm.emit(Inst::LoadStringLength { dst: len, str });
        self.tag_result(ValueType::Int32, len, out);
        Ok(())
    }

    fn emit_load_string_char_result(&mut self, str: StringOperandId, index: Int32OperandId) -> JitResult<()> {
        let out = self.output();
        self.evict();
        let str = self.use_payload(str.id(), ValueType::String);
        let index = self.use_int32(index.id());
        self.alloc.push(&mut self.masm, index);
        self.alloc.push(&mut self.masm, str);
        self.masm.emit(Inst::CallWithABI(VMFunctionId::StringCharAt));
        self.alloc.popped(VMFunctionId::StringCharAt.arity());
        let fail = self.failure_path();
        self.masm.branch32(Condition::Equal, Register::R1, Operand::Imm(0), fail);
        self.tag_result(ValueType::String, Register::R0, out);
        Ok(())
    }

    fn emit_load_string_char_code_result(&mut self, str: StringOperandId, index: Int32OperandId) -> JitResult<()> {
        let out = self.output();
        let str = self.use_payload(str.id(), ValueType::String);
        let index = self.use_int32(index.id());
        let unit = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::LoadStringCharCode { dst: unit, str, index, fail });
        self.tag_result(ValueType::Int32, unit, out);
        Ok(())
    }

    fn emit_load_int32_result(&mut self, val: Int32OperandId) -> JitResult<()> {
        self.value_result(val.id());
        Ok(())
    }

    fn emit_load_double_result(&mut self, val: NumberOperandId) -> JitResult<()> {
        let out = self.output();
        self.alloc.ensure_double(&mut self.masm, val.id(), F0);
        self.masm.emit(Inst::BoxDouble { src: F0, dst: out });
        Ok(())
    }

    fn emit_load_boolean_result(&mut self, val: bool) -> JitResult<()> {
        let out = self.output();
        self.masm.move_value(Value::boolean(val).to_bits(), out);
        Ok(())
    }

    fn emit_load_undefined_result(&mut self) -> JitResult<()> {
        let out = self.output();
        self.masm.move_value(Value::UNDEFINED.to_bits(), out);
        Ok(())
    }

    fn emit_load_object_result(&mut self, obj: ObjOperandId) -> JitResult<()> {
        self.value_result(obj.id());
        Ok(())
    }

    fn emit_load_string_result(&mut self, str: StringOperandId) -> JitResult<()> {
        self.value_result(str.id());
        Ok(())
    }

    fn emit_load_symbol_result(&mut self, sym: SymbolOperandId) -> JitResult<()> {
        self.value_result(sym.id());
        Ok(())
    }

    fn emit_load_type_of_object_result(&mut self, obj: ObjOperandId) -> JitResult<()> {
        let out = self.output();
        self.evict();
        let obj = self.use_object(obj.id());
        self.alloc.push(&mut self.masm, obj);
        self.masm.emit(Inst::CallWithABI(VMFunctionId::TypeOfObject));
        self.alloc.popped(VMFunctionId::TypeOfObject.arity());
        self.tag_result(ValueType::String, Register::R0, out);
        Ok(())
    }

    fn emit_load_value_result(&mut self, val: u32) -> JitResult<()> {
        let out = self.output();
        self.masm.load_stub_value(val, out);
        Ok(())
    }

    fn emit_load_value_truthy_result(&mut self, input: ValOperandId) -> JitResult<()> {
        let out = self.output();
        self.evict();
        let value = self.use_value(input.id());
        self.alloc.push(&mut self.masm, value);
        self.masm.emit(Inst::CallWithABI(VMFunctionId::ToBoolean));
        self.alloc.popped(VMFunctionId::ToBoolean.arity());
        self.tag_result(ValueType::Boolean, Register::R0, out);
        Ok(())
    }

    fn emit_is_object_result(&mut self, input: ValOperandId) -> JitResult<()> {
        let out = self.output();
        let value = self.use_value(input.id());
        let done = self.masm.new_label();
        self.masm.move_value(Value::FALSE.to_bits(), out);
        self.masm.branch_test_not_type(value, ValueType::Object, done);
        self.masm.move_value(Value::TRUE.to_bits(), out);
        self.masm.bind(done);
        Ok(())
    }

    fn emit_is_callable_result(&mut self, input: ValOperandId) -> JitResult<()> {
        let out = self.output();
        self.evict();
        let value = self.use_value(input.id());
        let obj = self.scratch();
        let not_object = self.masm.new_label();
        let done = self.masm.new_label();
        self.masm.branch_test_not_type(value, ValueType::Object, not_object);
        self.masm.unbox_non_double(value, obj, ValueType::Object);
        self.alloc.push(&mut self.masm, obj);
        self.masm.emit(Inst::CallWithABI(VMFunctionId::IsCallable));
        self.alloc.popped(VMFunctionId::IsCallable.arity());
        self.tag_result(ValueType::Boolean, Register::R0, out);
        self.masm.jump(done);
        self.masm.bind(not_object);
        self.masm.move_value(Value::FALSE.to_bits(), out);
        self.masm.bind(done);
        Ok(())
    }

    fn emit_has_class_result(&mut self, obj: ObjOperandId, clasp: u32) -> JitResult<()> {
        let out = self.output();
        let obj = self.use_object(obj.id());
        let class = self.scratch();
        let expected = self.stub_word(clasp);
        self.masm.emit(Inst::LoadObjectField { dst: class, obj, field: ObjectField::Class });
        self.masm.emit(Inst::Cmp64Set {
            cond: Condition::Equal,
            lhs: class,
            rhs: expected.into(),
            dst: class,
        });
        self.tag_result(ValueType::Boolean, class, out);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Int32 arithmetic
    // -----------------------------------------------------------------------

    fn emit_int32_add_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> JitResult<()> {
        self.int32_checked_result(Int32BinOp::Add, lhs, rhs);
        Ok(())
    }

    fn emit_int32_sub_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> JitResult<()> {
        self.int32_checked_result(Int32BinOp::Sub, lhs, rhs);
        Ok(())
    }

    fn emit_int32_mul_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> JitResult<()> {
        let out = self.output();
        let lhs = self.use_int32(lhs.id());
        let rhs = self.use_int32(rhs.id());
        let result = self.scratch();
        let signs = self.scratch();
        let fail = self.failure_path();
        let done = self.masm.new_label();
        self.masm.mov(lhs, result);
        self.masm.emit(Inst::BranchInt32Op { op: Int32BinOp::Mul, dst: result, src: rhs.into(), target: fail });
        // A zero product is -0 when either factor is negative.
        self.masm.branch32(Condition::NotEqual, result, Operand::Imm(0), done);
        self.masm.mov(lhs, signs);
        self.masm.emit(Inst::Int32Op { op: Int32BinOp::Or, dst: signs, src: rhs.into() });
        self.masm.branch32(Condition::LessThan, signs, Operand::Imm(0), fail);
        self.masm.bind(done);
        self.tag_result(ValueType::Int32, result, out);
        Ok(())
    }

    fn emit_int32_div_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> JitResult<()> {
        let out = self.output();
        let lhs = self.use_int32(lhs.id());
        let rhs = self.use_int32(rhs.id());
        let result = self.scratch();
        let fail = self.failure_path();
        let nonzero = self.masm.new_label();
        let not_min = self.masm.new_label();

        self.masm.branch32(Condition::Equal, rhs, Operand::Imm(0), fail);
        // 0 / -n is -0.
        self.masm.branch32(Condition::NotEqual, lhs, Operand::Imm(0), nonzero);
        self.masm.branch32(Condition::LessThan, rhs, Operand::Imm(0), fail);
        self.masm.bind(nonzero);
        // i32::MIN / -1 overflows.
        self.masm.branch32(Condition::NotEqual, lhs, Operand::Imm(i32::MIN as u32 as u64), not_min);
        self.masm.branch32(Condition::Equal, rhs, Operand::Imm(u32::MAX as u64), fail);
        self.masm.bind(not_min);

        self.masm.mov(lhs, result);
        self.masm.emit(Inst::Int32Op { op: Int32BinOp::Mod, dst: result, src: rhs.into() });
        self.masm.branch32(Condition::NotEqual, result, Operand::Imm(0), fail);
        self.masm.mov(lhs, result);
        self.masm.emit(Inst::Int32Op { op: Int32BinOp::Div, dst: result, src: rhs.into() });
        self.tag_result(ValueType::Int32, result, out);
        Ok(())
    }

    fn emit_int32_mod_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> JitResult<()> {
        let out = self.output();
        let lhs = self.use_int32(lhs.id());
        let rhs = self.use_int32(rhs.id());
        let result = self.scratch();
        let fail = self.failure_path();
        let done = self.masm.new_label();
        self.masm.branch32(Condition::Equal, rhs, Operand::Imm(0), fail);
        self.masm.mov(lhs, result);
        self.masm.emit(Inst::Int32Op { op: Int32BinOp::Mod, dst: result, src: rhs.into() });
        // A zero remainder of a negative dividend is -0.
        self.masm.branch32(Condition::NotEqual, result, Operand::Imm(0), done);
        self.masm.branch32(Condition::LessThan, lhs, Operand::Imm(0), fail);
        self.masm.bind(done);
        self.tag_result(ValueType::Int32, result, out);
        Ok(())
    }

    fn emit_int32_bit_or_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> JitResult<()> {
        self.int32_result(Int32BinOp::Or, lhs, rhs);
        Ok(())
    }

    fn emit_int32_bit_xor_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> JitResult<()> {
        self.int32_result(Int32BinOp::Xor, lhs, rhs);
        Ok(())
    }

    fn emit_int32_bit_and_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> JitResult<()> {
        self.int32_result(Int32BinOp::And, lhs, rhs);
        Ok(())
    }

    fn emit_int32_left_shift_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> JitResult<()> {
        self.int32_result(Int32BinOp::Lsh, lhs, rhs);
        Ok(())
    }

    fn emit_int32_right_shift_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> JitResult<()> {
        self.int32_result(Int32BinOp::Rsh, lhs, rhs);
        Ok(())
    }

    fn emit_int32_unsigned_right_shift_result(
        &mut self,
        lhs: Int32OperandId,
        rhs: Int32OperandId,
        allow_double: bool,
    ) -> JitResult<()> {
        let out = self.output();
        let lhs = self.use_int32(lhs.id());
        let rhs = self.use_int32(rhs.id());
        let result = self.scratch();
        self.masm.mov(lhs, result);
        self.masm.emit(Inst::Int32Op { op: Int32BinOp::Ursh, dst: result, src: rhs.into() });
        if !allow_double {
            let fail = self.failure_path();
            self.masm.branch32(Condition::LessThan, result, Operand::Imm(0), fail);
            self.tag_result(ValueType::Int32, result, out);
            return Ok(());
        }
        let large = self.masm.new_label();
        let done = self.masm.new_label();
        self.masm.branch32(Condition::LessThan, result, Operand::Imm(0), large);
        self.tag_result(ValueType::Int32, result, out);
        self.masm.jump(done);
        self.masm.bind(large);
        self.masm.emit(Inst::ConvertInt32ToDouble { src: result, dst: F0 });
        self.masm.emit(Inst::LoadConstantDouble { dst: F1, value: 4_294_967_296.0 });
        self.masm.emit(Inst::DoubleOp { op: DoubleBinOp::Add, dst: F0, src: F1 });
        self.masm.emit(Inst::BoxDouble { src: F0, dst: out });
        self.masm.bind(done);
        Ok(())
    }

    fn emit_int32_not_result(&mut self, input: Int32OperandId) -> JitResult<()> {
        let out = self.output();
        let input = self.use_int32(input.id());
        let result = self.scratch();
        self.masm.mov(input, result);
        self.masm.emit(Inst::Int32Unary { op: Int32UnaryOp::Not, dst: result });
        self.tag_result(ValueType::Int32, result, out);
        Ok(())
    }

    fn emit_int32_negation_result(&mut self, input: Int32OperandId) -> JitResult<()> {
        let out = self.output();
        let input = self.use_int32(input.id());
        let result = self.scratch();
        let fail = self.failure_path();
        // 0 and i32::MIN are the values whose low 31 bits are all clear.
        self.masm.emit(Inst::BranchTest32 { zero: true, lhs: input, mask: 0x7FFF_FFFF, target: fail });
        self.masm.mov(input, result);
        self.masm.emit(Inst::Int32Unary { op: Int32UnaryOp::Neg, dst: result });
        self.tag_result(ValueType::Int32, result, out);
        Ok(())
    }

    fn emit_int32_inc_result(&mut self, input: Int32OperandId) -> JitResult<()> {
        let out = self.output();
        let input = self.use_int32(input.id());
        let result = self.scratch();
        let fail = self.failure_path();
        self.masm.mov(input, result);
        self.masm.emit(Inst::BranchInt32Op { op: Int32BinOp::Add, dst: result, src: Operand::Imm(1), target: fail });
        self.tag_result(ValueType::Int32, result, out);
        Ok(())
    }

    fn emit_int32_dec_result(&mut self, input: Int32OperandId) -> JitResult<()> {
        let out = self.output();
        let input = self.use_int32(input.id());
        let result = self.scratch();
        let fail = self.failure_path();
        self.masm.mov(input, result);
        self.masm.emit(Inst::BranchInt32Op { op: Int32BinOp::Sub, dst: result, src: Operand::Imm(1), target: fail });
        self.tag_result(ValueType::Int32, result, out);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Double arithmetic
    // -----------------------------------------------------------------------

    fn emit_double_add_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) -> JitResult<()> {
        self.double_result(DoubleBinOp::Add, lhs, rhs);
        Ok(())
    }

    fn emit_double_sub_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) -> JitResult<()> {
        self.double_result(DoubleBinOp::Sub, lhs, rhs);
        Ok(())
    }

    fn emit_double_mul_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) -> JitResult<()> {
        self.double_result(DoubleBinOp::Mul, lhs, rhs);
        Ok(())
    }

    fn emit_double_div_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) -> JitResult<()> {
        self.double_result(DoubleBinOp::Div, lhs, rhs);
        Ok(())
    }

    fn emit_double_mod_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) -> JitResult<()> {
        self.double_result(DoubleBinOp::Mod, lhs, rhs);
        Ok(())
    }

    fn emit_double_pow_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) -> JitResult<()> {
        self.double_result(DoubleBinOp::Pow, lhs, rhs);
        Ok(())
    }

    fn emit_double_negation_result(&mut self, input: NumberOperandId) -> JitResult<()> {
        self.double_unary_result(DoubleUnaryOp::Neg, input);
        Ok(())
    }

    fn emit_double_inc_result(&mut self, input: NumberOperandId) -> JitResult<()> {
        self.double_constant_result(DoubleBinOp::Add, input, 1.0);
        Ok(())
    }

    fn emit_double_dec_result(&mut self, input: NumberOperandId) -> JitResult<()> {
        self.double_constant_result(DoubleBinOp::Sub, input, 1.0);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Comparisons
    // -----------------------------------------------------------------------

    fn emit_compare_int32_result(&mut self, op: JSOp, lhs: Int32OperandId, rhs: Int32OperandId) -> JitResult<()> {
        self.compare_result(false, Condition::from_js_op(op), lhs.id(), rhs.id(), ValueType::Int32);
        Ok(())
    }

    fn emit_compare_double_result(&mut self, op: JSOp, lhs: NumberOperandId, rhs: NumberOperandId) -> JitResult<()> {
        let out = self.output();
        self.alloc.ensure_double(&mut self.masm, lhs.id(), F0);
        self.alloc.ensure_double(&mut self.masm, rhs.id(), F1);
        let flag = self.scratch();
        self.masm.emit(Inst::CmpDoubleSet {
            cond: DoubleCondition::from_js_op(op),
            lhs: F0,
            rhs: F1,
            dst: flag,
        });
        self.tag_result(ValueType::Boolean, flag, out);
        Ok(())
    }

    fn emit_compare_string_result(&mut self, op: JSOp, lhs: StringOperandId, rhs: StringOperandId) -> JitResult<()> {
        let out = self.output();
        self.evict();
        let lhs = self.use_payload(lhs.id(), ValueType::String);
        let rhs = self.use_payload(rhs.id(), ValueType::String);
        self.alloc.push(&mut self.masm, rhs);
        self.alloc.push(&mut self.masm, lhs);
        self.alloc.push(&mut self.masm, Operand::Imm(op as u8 as u64));
        self.masm.emit(Inst::CallWithABI(VMFunctionId::CompareStrings));
        self.alloc.popped(VMFunctionId::CompareStrings.arity());
        self.tag_result(ValueType::Boolean, Register::R0, out);
        Ok(())
    }

    fn emit_compare_object_result(&mut self, op: JSOp, lhs: ObjOperandId, rhs: ObjOperandId) -> JitResult<()> {
        self.compare_result(true, Condition::from_js_op(op), lhs.id(), rhs.id(), ValueType::Object);
        Ok(())
    }

    fn emit_compare_symbol_result(&mut self, op: JSOp, lhs: SymbolOperandId, rhs: SymbolOperandId) -> JitResult<()> {
        self.compare_result(true, Condition::from_js_op(op), lhs.id(), rhs.id(), ValueType::Symbol);
        Ok(())
    }

    fn emit_compare_null_undefined_result(
        &mut self,
        op: JSOp,
        is_undefined: bool,
        input: ValOperandId,
    ) -> JitResult<()> {
        let out = self.output();
        let value = self.use_value(input.id());
        let matched = self.masm.new_label();
        let done = self.masm.new_label();
        let equality = op.is_equality();
        match op {
            JSOp::StrictEq | JSOp::StrictNe => {
                let ty = if is_undefined { ValueType::Undefined } else { ValueType::Null };
                self.masm.branch_test_type(value, ty, matched);
            }
            JSOp::Eq | JSOp::Ne => {
                self.masm.branch_test_type(value, ValueType::Null, matched);
                self.masm.branch_test_type(value, ValueType::Undefined, matched);
            }
            other => panic!("CompareNullUndefinedResult with {other:?}"),
        }
        self.masm.move_value(Value::boolean(!equality).to_bits(), out);
        self.masm.jump(done);
        self.masm.bind(matched);
        self.masm.move_value(Value::boolean(equality).to_bits(), out);
        self.masm.bind(done);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Math
    // -----------------------------------------------------------------------

    fn emit_math_abs_int32_result(&mut self, input: Int32OperandId) -> JitResult<()> {
        let out = self.output();
        let input = self.use_int32(input.id());
        let result = self.scratch();
        let fail = self.failure_path();
        let done = self.masm.new_label();
        self.masm.branch32(Condition::Equal, input, Operand::Imm(i32::MIN as u32 as u64), fail);
        self.masm.mov(input, result);
        self.masm.branch32(Condition::GreaterThanOrEqual, result, Operand::Imm(0), done);
        self.masm.emit(Inst::Int32Unary { op: Int32UnaryOp::Neg, dst: result });
        self.masm.bind(done);
        self.tag_result(ValueType::Int32, result, out);
        Ok(())
    }

    fn emit_math_abs_number_result(&mut self, input: NumberOperandId) -> JitResult<()> {
        self.double_unary_result(DoubleUnaryOp::Abs, input);
        Ok(())
    }

    fn emit_math_sqrt_number_result(&mut self, input: NumberOperandId) -> JitResult<()> {
        self.double_unary_result(DoubleUnaryOp::Sqrt, input);
        Ok(())
    }

    fn emit_math_floor_to_int32_result(&mut self, input: NumberOperandId) -> JitResult<()> {
        let out = self.output();
        if self.alloc.known_payload(input.id(), ValueType::Int32) {
            let int = self.use_int32(input.id());
            self.tag_result(ValueType::Int32, int, out);
            return Ok(());
        }
        self.alloc.ensure_double(&mut self.masm, input.id(), F0);
        let result = self.scratch();
        let fail = self.failure_path();
        self.masm.emit(Inst::FloorDoubleToInt32 { src: F0, dst: result, fail });
        self.tag_result(ValueType::Int32, result, out);
        Ok(())
    }

    fn emit_math_function_number_result(&mut self, input: NumberOperandId, fun: UnaryMathFunction) -> JitResult<()> {
        self.double_unary_result(DoubleUnaryOp::Math(fun), input);
        Ok(())
    }

    fn emit_call_string_concat_result(&mut self, lhs: StringOperandId, rhs: StringOperandId) -> JitResult<()> {
        let out = self.output();
        self.evict();
        let lhs = self.use_payload(lhs.id(), ValueType::String);
        let rhs = self.use_payload(rhs.id(), ValueType::String);
        self.alloc.enter_stub_frame(&mut self.masm);
        self.alloc.push(&mut self.masm, rhs);
        self.alloc.push(&mut self.masm, lhs);
        self.masm.emit(Inst::CallVM(VMFunctionId::ConcatStrings));
        self.alloc.popped(VMFunctionId::ConcatStrings.arity());
        self.alloc.leave_stub_frame(&mut self.masm);
        self.tag_result(ValueType::String, Register::R0, out);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stores
    // -----------------------------------------------------------------------

    fn emit_store_fixed_slot(&mut self, obj: ObjOperandId, offset: u32, rhs: ValOperandId) -> JitResult<()> {
        self.store_slot(obj, offset, rhs, false);
        Ok(())
    }

    fn emit_store_dynamic_slot(&mut self, obj: ObjOperandId, offset: u32, rhs: ValOperandId) -> JitResult<()> {
        self.store_slot(obj, offset, rhs, true);
        Ok(())
    }

    fn emit_add_and_store_fixed_slot(
        &mut self,
        obj: ObjOperandId,
        offset: u32,
        rhs: ValOperandId,
        change_group: bool,
        new_group: u32,
        new_shape: u32,
    ) -> JitResult<()> {
        self.add_and_store_slot(obj, offset, rhs, change_group, new_group, new_shape, false, None);
        Ok(())
    }

    fn emit_add_and_store_dynamic_slot(
        &mut self,
        obj: ObjOperandId,
        offset: u32,
        rhs: ValOperandId,
        change_group: bool,
        new_group: u32,
        new_shape: u32,
    ) -> JitResult<()> {
        self.add_and_store_slot(obj, offset, rhs, change_group, new_group, new_shape, true, None);
        Ok(())
    }

    fn emit_allocate_and_store_dynamic_slot(
        &mut self,
        obj: ObjOperandId,
        offset: u32,
        rhs: ValOperandId,
        change_group: bool,
        new_group: u32,
        new_shape: u32,
        num_new_slots: u32,
    ) -> JitResult<()> {
        self.add_and_store_slot(
            obj,
            offset,
            rhs,
            change_group,
            new_group,
            new_shape,
            true,
            Some(num_new_slots),
        );
        Ok(())
    }

    fn emit_store_dense_element(&mut self, obj: ObjOperandId, index: Int32OperandId, rhs: ValOperandId) -> JitResult<()> {
        self.store_dense_element(obj, index, rhs);
        Ok(())
    }

    fn emit_store_dense_element_hole(
        &mut self,
        obj: ObjOperandId,
        index: Int32OperandId,
        rhs: ValOperandId,
        handle_add: bool,
    ) -> JitResult<()> {
        self.store_dense_element_hole(obj, index, rhs, handle_add);
        Ok(())
    }

    fn emit_array_push(&mut self, obj: ObjOperandId, rhs: ValOperandId) -> JitResult<()> {
        self.array_push(obj, rhs);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Proxies and megamorphic access
    // -----------------------------------------------------------------------

    fn emit_proxy_get_result(&mut self, obj: ObjOperandId, id: u32) -> JitResult<()> {
        let _out = self.output();
        self.evict();
        let obj = self.use_object(obj.id());
        let key = self.stub_word(id);
        self.alloc.enter_stub_frame(&mut self.masm);
        self.alloc.push(&mut self.masm, key);
        self.alloc.push(&mut self.masm, obj);
        self.masm.emit(Inst::CallVM(VMFunctionId::ProxyGetProperty));
        self.alloc.popped(VMFunctionId::ProxyGetProperty.arity());
        self.alloc.leave_stub_frame(&mut self.masm);
        Ok(())
    }

    fn emit_proxy_get_by_value_result(&mut self, obj: ObjOperandId, id: ValOperandId) -> JitResult<()> {
        let _out = self.output();
        self.evict();
        let obj = self.use_object(obj.id());
        let id = self.use_value(id.id());
        self.alloc.enter_stub_frame(&mut self.masm);
        self.alloc.push(&mut self.masm, id);
        self.alloc.push(&mut self.masm, obj);
        self.masm.emit(Inst::CallVM(VMFunctionId::ProxyGetPropertyByValue));
        self.alloc.popped(VMFunctionId::ProxyGetPropertyByValue.arity());
        self.alloc.leave_stub_frame(&mut self.masm);
        Ok(())
    }

    fn emit_proxy_has_prop_result(&mut self, obj: ObjOperandId, id: ValOperandId, has_own: bool) -> JitResult<()> {
        let out = self.output();
        self.evict();
        let obj = self.use_object(obj.id());
        let id = self.use_value(id.id());
        self.alloc.enter_stub_frame(&mut self.masm);
        self.alloc.push(&mut self.masm, Operand::Imm(has_own as u64));
        self.alloc.push(&mut self.masm, id);
        self.alloc.push(&mut self.masm, obj);
        self.masm.emit(Inst::CallVM(VMFunctionId::ProxyHasProp));
        self.alloc.popped(VMFunctionId::ProxyHasProp.arity());
        self.alloc.leave_stub_frame(&mut self.masm);
        self.tag_result(ValueType::Boolean, Register::R0, out);
        Ok(())
    }

    fn emit_proxy_set(&mut self, obj: ObjOperandId, id: u32, rhs: ValOperandId, strict: bool) -> JitResult<()> {
        self.evict();
        let obj = self.use_object(obj.id());
        let rhs = self.use_value(rhs.id());
        let key = self.stub_word(id);
        self.alloc.enter_stub_frame(&mut self.masm);
        self.alloc.push(&mut self.masm, Operand::Imm(strict as u64));
        self.alloc.push(&mut self.masm, rhs);
        self.alloc.push(&mut self.masm, key);
        self.alloc.push(&mut self.masm, obj);
        self.masm.emit(Inst::CallVM(VMFunctionId::ProxySetProperty));
        self.alloc.popped(VMFunctionId::ProxySetProperty.arity());
        self.alloc.leave_stub_frame(&mut self.masm);
        Ok(())
    }

    fn emit_megamorphic_load_slot_result(&mut self, obj: ObjOperandId, name: u32) -> JitResult<()> {
        let _out = self.output();
        self.evict();
        let obj = self.use_object(obj.id());
        let key = self.stub_word(name);
        self.alloc.push(&mut self.masm, key);
        self.alloc.push(&mut self.masm, obj);
        self.masm.emit(Inst::CallWithABI(VMFunctionId::MegamorphicLoadSlot));
        self.alloc.popped(VMFunctionId::MegamorphicLoadSlot.arity());
        let fail = self.failure_path();
        self.masm.branch32(Condition::Equal, Register::R1, Operand::Imm(0), fail);
        Ok(())
    }

    fn emit_megamorphic_store_slot(&mut self, obj: ObjOperandId, name: u32, rhs: ValOperandId) -> JitResult<()> {
        self.evict();
        let obj = self.use_object(obj.id());
        let rhs = self.use_value(rhs.id());
        let key = self.stub_word(name);
        self.alloc.enter_stub_frame(&mut self.masm);
        self.alloc.push(&mut self.masm, rhs);
        self.alloc.push(&mut self.masm, key);
        self.alloc.push(&mut self.masm, obj);
        self.masm.emit(Inst::CallVM(VMFunctionId::SetPropertyMegamorphic));
        self.alloc.popped(VMFunctionId::SetPropertyMegamorphic.arity());
        self.alloc.leave_stub_frame(&mut self.masm);
        Ok(())
    }

    fn emit_megamorphic_has_prop_result(&mut self, obj: ObjOperandId, id: ValOperandId, has_own: bool) -> JitResult<()> {
        let out = self.output();
        self.evict();
        let obj = self.use_object(obj.id());
        let id = self.use_value(id.id());
        self.alloc.push(&mut self.masm, Operand::Imm(has_own as u64));
        self.alloc.push(&mut self.masm, id);
        self.alloc.push(&mut self.masm, obj);
        self.masm.emit(Inst::CallWithABI(VMFunctionId::MegamorphicHasProp));
        self.alloc.popped(VMFunctionId::MegamorphicHasProp.arity());
        let fail = self.failure_path();
        self.masm.branch32(Condition::Equal, Register::R1, Operand::Imm(0), fail);
        self.tag_result(ValueType::Boolean, Register::R0, out);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessor calls
    // -----------------------------------------------------------------------

    fn emit_call_scripted_getter_result(
        &mut self,
        receiver: ValOperandId,
        getter: u32,
        same_realm: bool,
        _nargs_and_flags: u32,
    ) -> JitResult<()> {
        self.call_getter(receiver, getter, same_realm, CallTargetKind::Scripted);
        Ok(())
    }

    fn emit_call_native_getter_result(
        &mut self,
        receiver: ValOperandId,
        getter: u32,
        same_realm: bool,
        _nargs_and_flags: u32,
    ) -> JitResult<()> {
        self.call_getter(receiver, getter, same_realm, CallTargetKind::Native);
        Ok(())
    }

    fn emit_call_scripted_setter(
        &mut self,
        receiver: ObjOperandId,
        setter: u32,
        rhs: ValOperandId,
        same_realm: bool,
        _nargs_and_flags: u32,
    ) -> JitResult<()> {
        self.call_setter(receiver, setter, rhs, same_realm, CallTargetKind::Scripted);
        Ok(())
    }

    fn emit_call_native_setter(
        &mut self,
        receiver: ObjOperandId,
        setter: u32,
        rhs: ValOperandId,
        same_realm: bool,
        _nargs_and_flags: u32,
    ) -> JitResult<()> {
        self.call_setter(receiver, setter, rhs, same_realm, CallTargetKind::Native);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    fn emit_call_scripted_function(&mut self, callee: ObjOperandId, argc: Int32OperandId, flags: CallFlags) -> JitResult<()> {
        self.call_function(callee, argc, flags, CallTargetKind::Scripted, None);
        Ok(())
    }

    fn emit_call_native_function(&mut self, callee: ObjOperandId, argc: Int32OperandId, flags: CallFlags) -> JitResult<()> {
        self.call_function(callee, argc, flags, CallTargetKind::Native, None);
        Ok(())
    }

    fn emit_call_dom_function(
        &mut self,
        callee: ObjOperandId,
        argc: Int32OperandId,
        this_obj: ObjOperandId,
        flags: CallFlags,
    ) -> JitResult<()> {
        self.call_function(callee, argc, flags, CallTargetKind::Native, Some(this_obj));
        Ok(())
    }

    fn emit_call_inlined_function(
        &mut self,
        callee: ObjOperandId,
        argc: Int32OperandId,
        _ic_script: u32,
        flags: CallFlags,
    ) -> JitResult<()> {
        self.call_function(callee, argc, flags, CallTargetKind::Scripted, None);
        Ok(())
    }

    fn emit_meta_scripted_template_object(&mut self, _callee: u32, _template: u32) -> JitResult<()> {
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Terminals
    // -----------------------------------------------------------------------

    fn emit_type_monitor_result(&mut self) -> JitResult<()> {
        self.emit_return(true);
        Ok(())
    }

    fn emit_return_from_ic(&mut self) -> JitResult<()> {
        self.emit_return(false);
        Ok(())
    }
}

