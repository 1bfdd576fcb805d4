//! CacheIR to MIR
//!
//! [`transpile_cache_ir`] walks the CacheIR program of one monomorphic
//! snapshot and appends the equivalent MIR to a block. CacheIR operand ids
//! map to MIR definitions; a narrowing guard rebinds its operand id to the
//! guard's output so later uses see the refined type. Stub fields are read
//! from the snapshot's private copy of the stub data and become immediates.
//!
//! A CacheIR program performs at most one side effect. The transpiler
//! checks that in debug builds and hangs a resume point off the effectful
//! instruction, so a bailout after it resumes past the IC.

use otter_cacheir::stub_info::read_stub_word;
use otter_cacheir::{
    ArgFormat, BooleanOperandId, CacheIRReader, CacheIROps, CacheKind, CallFlags,
    GuardClassKind, Int32OperandId, JSOp, NumberOperandId, ObjOperandId, StringOperandId,
    SymbolOperandId, UnaryMathFunction, ValOperandId, dispatch_op,
};
use otter_vm_core::{
    ClassId, FunctionFlags, GroupId, ObjectId, PropertyKey, ShapeId, StringId, SymbolId, Value,
    ValueType,
};
use smallvec::SmallVec;

use crate::call_info::{CallArgFormat, CallInfo, update_call_info};
use crate::error::{TranspileError, TranspileResult};
use crate::mir::{
    BlockId, CallTargetKind, CompareType, MCall, MDefinitionId, MInlinedCall, MirGraph, MirOp, MirType,
    SlotKind,
};
use crate::snapshot::WarpCacheIR;

/// Append the MIR for `snapshot` to `block`.
///
/// `inputs` are the block's parameters. For a call site they are the frame
/// words its caller pushed and `call_info` describes them; the CacheIR
/// argument count operand becomes a constant. For every other kind they are
/// the IC's input operands followed by any frame words.
pub fn transpile_cache_ir(
    graph: &mut MirGraph,
    block: BlockId,
    snapshot: &WarpCacheIR,
    inputs: &[MDefinitionId],
    call_info: Option<&mut CallInfo>,
) -> TranspileResult<()> {
    let mut transpiler = WarpCacheIRTranspiler::new(graph, block, snapshot, inputs, call_info)?;
    transpiler.transpile()
}

struct WarpCacheIRTranspiler<'a> {
    graph: &'a mut MirGraph,
    block: BlockId,
    snapshot: &'a WarpCacheIR,
    operands: Vec<Option<MDefinitionId>>,
    frame: SmallVec<[MDefinitionId; 8]>,
    call_info: Option<&'a mut CallInfo>,
    effectful: Option<MDefinitionId>,
    result: Option<MDefinitionId>,
    template_object: Option<ObjectId>,
}

impl<'a> WarpCacheIRTranspiler<'a> {
    fn new(
        graph: &'a mut MirGraph,
        block: BlockId,
        snapshot: &'a WarpCacheIR,
        inputs: &[MDefinitionId],
        call_info: Option<&'a mut CallInfo>,
    ) -> TranspileResult<Self> {
        let mut transpiler = Self {
            graph,
            block,
            snapshot,
            operands: Vec::new(),
            frame: SmallVec::new(),
            call_info,
            effectful: None,
            result: None,
            template_object: None,
        };
        if snapshot.kind == CacheKind::Call {
            let info = transpiler
                .call_info
                .as_deref()
                .ok_or(TranspileError::MissingCallSite { pc: snapshot.pc })?;
            let argc = info.argc() as i32;
            let argc = transpiler.add(MirOp::Constant(Value::int32(argc)), MirType::Int32)?;
            transpiler.define(0, argc);
            transpiler.frame.extend(inputs.iter().copied());
        } else {
            let num_operands = snapshot.kind.num_inputs().min(inputs.len());
            for (id, &def) in inputs[..num_operands].iter().enumerate() {
                transpiler.define(id as u16, def);
            }
            transpiler.frame.extend(inputs[num_operands..].iter().copied());
        }
        Ok(transpiler)
    }

    fn transpile(&mut self) -> TranspileResult<()> {
        let snapshot = self.snapshot;
        let kind = snapshot.kind;
        let mut reader = CacheIRReader::new(snapshot.code());
        while reader.more() {
            let op = reader.read_op()?;
            let index = reader.instruction_index();
            tracing::trace!(target: "otter::warp", %kind, index, op = op.name(), "transpile");
            dispatch_op(self, op, &mut reader)?;
        }

        self.graph.block_mut(self.block).finish_op(self.result);
        if let Some(def) = self.effectful {
            self.graph.resume_after(def);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Operands
    // -----------------------------------------------------------------------

    fn define(&mut self, id: u16, def: MDefinitionId) {
        let index = id as usize;
        if self.operands.len() <= index {
            self.operands.resize(index + 1, None);
        }
        self.operands[index] = Some(def);
    }

    fn use_operand(&self, id: u16) -> MDefinitionId {
        self.operands
            .get(id as usize)
            .copied()
            .flatten()
            .unwrap_or_else(|| panic!("CacheIR operand {id} used before it is defined"))
    }

    fn add(&mut self, op: MirOp, ty: MirType) -> TranspileResult<MDefinitionId> {
        self.graph.add(self.block, op, ty)
    }

    fn add_effectful(&mut self, op: MirOp, ty: MirType) -> TranspileResult<MDefinitionId> {
        debug_assert!(
            self.effectful.is_none(),
            "CacheIR program performs more than one effectful operation"
        );
        let def = self.add(op, ty)?;
        self.effectful = Some(def);
        Ok(def)
    }

    fn set_result(&mut self, def: MDefinitionId) {
        self.result = Some(def);
    }

    fn constant(&mut self, value: Value, ty: MirType) -> TranspileResult<MDefinitionId> {
        self.add(MirOp::Constant(value), ty)
    }

    fn constant_int32(&self, def: MDefinitionId) -> i32 {
        match self.graph.instruction(def).op() {
            MirOp::Constant(v) => v
                .as_int32()
                .unwrap_or_else(|| panic!("{def} is not an int32 constant")),
            other => panic!("{def} = {} is not a constant", other.name()),
        }
    }

    /// Frame word `slot`; slot 0 was pushed last.
    fn frame_slot(&self, slot: u32) -> MDefinitionId {
        let len = self.frame.len() as u32;
        assert!(slot < len, "frame slot {slot} out of {len}");
        self.frame[(len - 1 - slot) as usize]
    }

    fn call_info_mut(&mut self) -> &mut CallInfo {
        self.call_info
            .as_deref_mut()
            .unwrap_or_else(|| panic!("call op outside a call site"))
    }

    // -----------------------------------------------------------------------
    // Stub fields
    // -----------------------------------------------------------------------

    fn stub_word(&self, offset: u32) -> u64 {
        read_stub_word(&self.snapshot.stub_data, offset)
    }

    fn stub_raw_word(&self, offset: u32) -> u32 {
        self.stub_word(offset) as u32
    }

    fn stub_object(&self, offset: u32) -> ObjectId {
        ObjectId::new(self.stub_raw_word(offset))
    }

    fn stub_shape(&self, offset: u32) -> ShapeId {
        ShapeId::new(self.stub_raw_word(offset))
    }

    fn stub_group(&self, offset: u32) -> GroupId {
        GroupId::new(self.stub_raw_word(offset))
    }

    fn stub_class(&self, offset: u32) -> ClassId {
        ClassId::new(self.stub_raw_word(offset))
    }

    fn stub_string(&self, offset: u32) -> StringId {
        StringId::new(self.stub_raw_word(offset))
    }

    fn stub_symbol(&self, offset: u32) -> SymbolId {
        SymbolId::new(self.stub_raw_word(offset))
    }

    fn stub_value(&self, offset: u32) -> Value {
        Value::from_bits(self.stub_word(offset))
    }

    fn stub_id(&self, offset: u32) -> PropertyKey {
        let bits = self.stub_word(offset);
        PropertyKey::from_bits(bits).unwrap_or_else(|| panic!("stub field at {offset} is not a property key: {bits:#x}"))
    }

    // -----------------------------------------------------------------------
    // Shared lowering
    // -----------------------------------------------------------------------

    fn narrow(&mut self, input: u16, ty: MirType) -> TranspileResult<()> {
        let value = self.use_operand(input);
        let def = self.add(MirOp::Unbox { input: value, ty }, ty)?;
        self.define(input, def);
        Ok(())
    }

    fn guard_object(&mut self, obj: ObjOperandId, op: impl FnOnce(MDefinitionId) -> MirOp) -> TranspileResult<()> {
        let value = self.use_operand(obj.id());
        let def = self.add(op(value), MirType::Object)?;
        self.define(obj.id(), def);
        Ok(())
    }

    fn int32_binary(
        &mut self,
        lhs: Int32OperandId,
        rhs: Int32OperandId,
        op: impl FnOnce(MDefinitionId, MDefinitionId) -> MirOp,
    ) -> TranspileResult<()> {
        let lhs = self.use_operand(lhs.id());
        let rhs = self.use_operand(rhs.id());
        let def = self.add(op(lhs, rhs), MirType::Int32)?;
        self.set_result(def);
        Ok(())
    }

    fn double_binary(
        &mut self,
        lhs: NumberOperandId,
        rhs: NumberOperandId,
        op: impl FnOnce(MDefinitionId, MDefinitionId) -> MirOp,
    ) -> TranspileResult<()> {
        let lhs = self.use_operand(lhs.id());
        let rhs = self.use_operand(rhs.id());
        let def = self.add(op(lhs, rhs), MirType::Double)?;
        self.set_result(def);
        Ok(())
    }

    fn int32_with_constant(
        &mut self,
        input: Int32OperandId,
        constant: i32,
        op: impl FnOnce(MDefinitionId, MDefinitionId) -> MirOp,
    ) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let constant = self.constant(Value::int32(constant), MirType::Int32)?;
        let def = self.add(op(input, constant), MirType::Int32)?;
        self.set_result(def);
        Ok(())
    }

    fn double_with_constant(
        &mut self,
        input: NumberOperandId,
        constant: f64,
        op: impl FnOnce(MDefinitionId, MDefinitionId) -> MirOp,
    ) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let constant = self.constant(Value::double(constant), MirType::Double)?;
        let def = self.add(op(input, constant), MirType::Double)?;
        self.set_result(def);
        Ok(())
    }

    fn compare(&mut self, op: JSOp, lhs: u16, rhs: u16, compare_type: CompareType) -> TranspileResult<()> {
        let lhs = self.use_operand(lhs);
        let rhs = self.use_operand(rhs);
        let def = self.add(MirOp::Compare { lhs, rhs, op, compare_type }, MirType::Boolean)?;
        self.set_result(def);
        Ok(())
    }

    fn bounds_checked(&mut self, index: MDefinitionId, length: MDefinitionId) -> TranspileResult<MDefinitionId> {
        self.add(MirOp::BoundsCheck { index, length }, MirType::Int32)
    }

    fn string_char_code(&mut self, str: StringOperandId, index: Int32OperandId) -> TranspileResult<MDefinitionId> {
        let str = self.use_operand(str.id());
        let index = self.use_operand(index.id());
        let length = self.add(MirOp::StringLength { str }, MirType::Int32)?;
        let index = self.bounds_checked(index, length)?;
        self.add(MirOp::CharCodeAt { str, index }, MirType::Int32)
    }

    fn store_slot(&mut self, obj: ObjOperandId, offset: u32, rhs: ValOperandId, kind: SlotKind) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let value = self.use_operand(rhs.id());
        let offset = self.stub_raw_word(offset);
        self.add(MirOp::PostWriteBarrier { obj, value }, MirType::None)?;
        let op = match kind {
            SlotKind::Fixed => MirOp::StoreFixedSlot { obj, offset, value },
            SlotKind::Dynamic => MirOp::StoreDynamicSlot { obj, offset, value },
        };
        self.add_effectful(op, MirType::None)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn add_and_store_slot(
        &mut self,
        obj: ObjOperandId,
        offset: u32,
        rhs: ValOperandId,
        change_group: bool,
        new_group: u32,
        new_shape: u32,
        kind: SlotKind,
        num_new_slots: Option<u32>,
    ) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let value = self.use_operand(rhs.id());
        if let Some(slots) = num_new_slots {
            let capacity = self.stub_raw_word(slots);
            self.add(MirOp::GrowSlots { obj, capacity }, MirType::None)?;
        }
        self.add(MirOp::PostWriteBarrier { obj, value }, MirType::None)?;
        let op = MirOp::AddAndStoreSlot {
            obj,
            offset: self.stub_raw_word(offset),
            value,
            kind,
            new_shape: self.stub_shape(new_shape),
            new_group: change_group.then(|| self.stub_group(new_group)),
        };
        self.add_effectful(op, MirType::None)?;
        Ok(())
    }

    fn call_accessor(&mut self, callee: ObjectId, this: MDefinitionId, args: &[MDefinitionId], same_realm: bool) -> TranspileResult<MDefinitionId> {
        let callee = self.constant(Value::object(callee), MirType::Object)?;
        let call = MCall {
            callee,
            this,
            args: args.iter().copied().collect(),
            new_target: None,
            target: CallTargetKind::Scripted,
            constructing: false,
            same_realm,
        };
        self.add_effectful(MirOp::Call(Box::new(call)), MirType::Value)
    }

    /// Rewrite the site's [`CallInfo`] for a call op on `callee` and
    /// allocate `this` when constructing. Returns the rewritten operands.
    fn prepare_call(
        &mut self,
        callee: ObjOperandId,
        flags: CallFlags,
        this_obj: Option<ObjOperandId>,
    ) -> TranspileResult<CallInfo> {
        let callee = self.use_operand(callee.id());
        let argc = self.call_info_mut().argc();
        let undefined_this = if flags.arg_format() == ArgFormat::FunCall && argc == 0 {
            Some(self.constant(Value::UNDEFINED, MirType::Undefined)?)
        } else {
            None
        };
        update_call_info(self.call_info_mut(), callee, flags, undefined_this);

        let same_realm = flags.is_same_realm();
        let mut info = self.call_info_mut().clone();
        if info.constructing() {
            let new_target = info
                .new_target()
                .unwrap_or_else(|| panic!("constructing call without new.target"));
            let op = match self.template_object {
                Some(template) => MirOp::CreateThisWithTemplate { callee, template, same_realm },
                None => MirOp::CreateThis { callee, new_target, same_realm },
            };
            let this = self.add(op, MirType::Object)?;
            info.set_this(this);
        }
        if let Some(this_obj) = this_obj {
            info.set_this(self.use_operand(this_obj.id()));
        }
        *self.call_info_mut() = info.clone();
        Ok(info)
    }

    fn call_function(
        &mut self,
        callee: ObjOperandId,
        flags: CallFlags,
        target: CallTargetKind,
        this_obj: Option<ObjOperandId>,
    ) -> TranspileResult<()> {
        let info = self.prepare_call(callee, flags, this_obj)?;
        let callee = info.callee();
        let same_realm = flags.is_same_realm();
        let op = match (info.arg_format(), info.new_target()) {
            (CallArgFormat::Array, None) => MirOp::ApplyArray {
                callee,
                array: info.args()[0],
                this: info.this(),
                target,
                same_realm,
            },
            (CallArgFormat::Array, Some(new_target)) => MirOp::ConstructArray {
                callee,
                array: info.args()[0],
                this: info.this(),
                new_target,
                target,
                same_realm,
            },
            (CallArgFormat::Standard, new_target) => MirOp::Call(Box::new(MCall {
                callee,
                this: info.this(),
                args: info.args().iter().copied().collect(),
                new_target,
                target,
                constructing: info.constructing(),
                same_realm,
            })),
        };
        let def = self.add_effectful(op, MirType::Value)?;
        self.set_result(def);
        Ok(())
    }
}

impl CacheIROps for WarpCacheIRTranspiler<'_> {
    type Error = TranspileError;

    // -----------------------------------------------------------------------
    // Value guards
    // -----------------------------------------------------------------------

    fn emit_guard_to_object(&mut self, input: ValOperandId) -> TranspileResult<()> {
        self.narrow(input.id(), MirType::Object)
    }

    fn emit_guard_is_null_or_undefined(&mut self, input: ValOperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        self.add(MirOp::GuardNullOrUndefined { input }, MirType::Value)?;
        Ok(())
    }

    fn emit_guard_is_null(&mut self, input: ValOperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        self.add(MirOp::GuardValue { input, expected: Value::NULL }, MirType::Null)?;
        Ok(())
    }

    fn emit_guard_is_undefined(&mut self, input: ValOperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        self.add(MirOp::GuardValue { input, expected: Value::UNDEFINED }, MirType::Undefined)?;
        Ok(())
    }

    fn emit_guard_to_string(&mut self, input: ValOperandId) -> TranspileResult<()> {
        self.narrow(input.id(), MirType::String)
    }

    fn emit_guard_to_symbol(&mut self, input: ValOperandId) -> TranspileResult<()> {
        self.narrow(input.id(), MirType::Symbol)
    }

    fn emit_guard_to_big_int(&mut self, input: ValOperandId) -> TranspileResult<()> {
        self.narrow(input.id(), MirType::BigInt)
    }

    fn emit_guard_to_boolean(&mut self, input: ValOperandId) -> TranspileResult<()> {
        self.narrow(input.id(), MirType::Boolean)
    }

    fn emit_guard_to_int32(&mut self, input: ValOperandId) -> TranspileResult<()> {
        self.narrow(input.id(), MirType::Int32)
    }

    fn emit_guard_is_number(&mut self, input: ValOperandId) -> TranspileResult<()> {
        let value = self.use_operand(input.id());
        let def = self.add(MirOp::GuardNumber { input: value }, MirType::Double)?;
        self.define(input.id(), def);
        Ok(())
    }

    fn emit_guard_non_double_type(&mut self, input: ValOperandId, ty: ValueType) -> TranspileResult<()> {
        assert_ne!(ty, ValueType::Double, "GuardNonDoubleType on Double");
        let input = self.use_operand(input.id());
        let ty = MirType::from_value_type(ty);
        self.add(MirOp::Unbox { input, ty }, ty)?;
        Ok(())
    }

    fn emit_guard_to_int32_index(&mut self, input: ValOperandId, result: Int32OperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let def = self.add(MirOp::ToNumberInt32 { input }, MirType::Int32)?;
        self.define(result.id(), def);
        Ok(())
    }

    fn emit_guard_boolean_to_int32(&mut self, input: BooleanOperandId, result: Int32OperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let def = self.add(MirOp::BooleanToInt32 { input }, MirType::Int32)?;
        self.define(result.id(), def);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Object guards
    // -----------------------------------------------------------------------

    fn emit_guard_shape(&mut self, obj: ObjOperandId, shape: u32) -> TranspileResult<()> {
        let shape = self.stub_shape(shape);
        self.guard_object(obj, |obj| MirOp::GuardShape { obj, shape })
    }

    fn emit_guard_group(&mut self, obj: ObjOperandId, group: u32) -> TranspileResult<()> {
        let group = self.stub_group(group);
        self.guard_object(obj, |obj| MirOp::GuardObjectGroup { obj, group })
    }

    fn emit_guard_class(&mut self, obj: ObjOperandId, kind: GuardClassKind) -> TranspileResult<()> {
        let class = kind.class_id();
        self.guard_object(obj, |obj| MirOp::GuardToClass { obj, class })
    }

    fn emit_guard_any_class(&mut self, obj: ObjOperandId, clasp: u32) -> TranspileResult<()> {
        let class = self.stub_class(clasp);
        self.guard_object(obj, |obj| MirOp::GuardToClass { obj, class })
    }

    fn emit_guard_proto(&mut self, obj: ObjOperandId, proto: u32) -> TranspileResult<()> {
        let expected = self.stub_object(proto);
        self.guard_object(obj, |obj| MirOp::GuardProto { obj, expected })
    }

    fn emit_guard_null_proto(&mut self, obj: ObjOperandId) -> TranspileResult<()> {
        self.guard_object(obj, |obj| MirOp::GuardNullProto { obj })
    }

    fn emit_guard_is_proxy(&mut self, obj: ObjOperandId) -> TranspileResult<()> {
        self.guard_object(obj, |obj| MirOp::GuardIsProxy { obj })
    }

    fn emit_guard_is_not_proxy(&mut self, obj: ObjOperandId) -> TranspileResult<()> {
        self.guard_object(obj, |obj| MirOp::GuardIsNotProxy { obj })
    }

    fn emit_guard_specific_object(&mut self, obj: ObjOperandId, expected: u32) -> TranspileResult<()> {
        let expected = self.stub_object(expected);
        self.guard_object(obj, |obj| MirOp::GuardObjectIdentity { obj, expected })
    }

    fn emit_guard_specific_function(&mut self, fun: ObjOperandId, expected: u32, nargs_and_flags: u32) -> TranspileResult<()> {
        let expected = self.stub_object(expected);
        let word = self.stub_raw_word(nargs_and_flags);
        let (nargs, flags) = ((word >> 16) as u16, word as u16);
        self.guard_object(fun, |fun| MirOp::GuardSpecificFunction { fun, expected, nargs, flags })
    }

    fn emit_guard_specific_atom(&mut self, str: StringOperandId, expected: u32) -> TranspileResult<()> {
        let atom = self.stub_string(expected);
        let value = self.use_operand(str.id());
        let def = self.add(MirOp::GuardSpecificAtom { str: value, atom }, MirType::String)?;
        self.define(str.id(), def);
        Ok(())
    }

    fn emit_guard_specific_symbol(&mut self, sym: SymbolOperandId, expected: u32) -> TranspileResult<()> {
        let expected = self.stub_symbol(expected);
        let value = self.use_operand(sym.id());
        let def = self.add(MirOp::GuardSpecificSymbol { sym: value, expected }, MirType::Symbol)?;
        self.define(sym.id(), def);
        Ok(())
    }

    fn emit_guard_no_dense_elements(&mut self, obj: ObjOperandId) -> TranspileResult<()> {
        self.guard_object(obj, |obj| MirOp::GuardNoDenseElements { obj })
    }

    fn emit_guard_array_is_packed(&mut self, array: ObjOperandId) -> TranspileResult<()> {
        self.guard_object(array, |array| MirOp::GuardArrayIsPacked { array })
    }

    fn emit_guard_function_is_constructor(&mut self, fun: ObjOperandId) -> TranspileResult<()> {
        self.guard_object(fun, |fun| MirOp::GuardFunctionFlags {
            fun,
            expected: FunctionFlags::CONSTRUCTOR,
            unexpected: FunctionFlags::empty(),
        })
    }

    fn emit_guard_function_has_jit_entry(&mut self, fun: ObjOperandId, constructing: bool) -> TranspileResult<()> {
        self.guard_object(fun, |fun| MirOp::GuardFunctionHasJitEntry { fun })?;
        if constructing {
            self.emit_guard_function_is_constructor(fun)?;
        }
        Ok(())
    }

    fn emit_guard_function_has_no_jit_entry(&mut self, fun: ObjOperandId) -> TranspileResult<()> {
        self.guard_object(fun, |fun| MirOp::GuardFunctionHasNoJitEntry { fun })
    }

    fn emit_guard_not_class_constructor(&mut self, fun: ObjOperandId) -> TranspileResult<()> {
        self.guard_object(fun, |fun| MirOp::GuardFunctionFlags {
            fun,
            expected: FunctionFlags::empty(),
            unexpected: FunctionFlags::CLASS_CONSTRUCTOR,
        })
    }

    fn emit_guard_int32_is_non_negative(&mut self, index: Int32OperandId) -> TranspileResult<()> {
        let value = self.use_operand(index.id());
        let def = self.add(MirOp::GuardInt32IsNonNegative { index: value }, MirType::Int32)?;
        self.define(index.id(), def);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    fn emit_load_object(&mut self, obj: u32, result: ObjOperandId) -> TranspileResult<()> {
        let obj = self.stub_object(obj);
        let def = self.constant(Value::object(obj), MirType::Object)?;
        self.define(result.id(), def);
        Ok(())
    }

    fn emit_load_proto(&mut self, obj: ObjOperandId, result: ObjOperandId) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let def = self.add(MirOp::ObjectStaticProto { obj }, MirType::Object)?;
        self.define(result.id(), def);
        Ok(())
    }

    fn emit_load_int32_constant(&mut self, value: u32, result: Int32OperandId) -> TranspileResult<()> {
        let value = self.stub_raw_word(value) as i32;
        let def = self.constant(Value::int32(value), MirType::Int32)?;
        self.define(result.id(), def);
        Ok(())
    }

    fn emit_load_boolean_constant(&mut self, value: bool, result: BooleanOperandId) -> TranspileResult<()> {
        let def = self.constant(Value::boolean(value), MirType::Boolean)?;
        self.define(result.id(), def);
        Ok(())
    }

    fn emit_load_undefined(&mut self, result: ValOperandId) -> TranspileResult<()> {
        let def = self.constant(Value::UNDEFINED, MirType::Undefined)?;
        self.define(result.id(), def);
        Ok(())
    }

    fn emit_load_constant_string(&mut self, str: u32, result: StringOperandId) -> TranspileResult<()> {
        let str = self.stub_string(str);
        let def = self.constant(Value::string(str), MirType::String)?;
        self.define(result.id(), def);
        Ok(())
    }

    fn emit_load_argument_fixed_slot(&mut self, slot_index: u8, result: ValOperandId) -> TranspileResult<()> {
        let def = self.frame_slot(slot_index as u32);
        self.define(result.id(), def);
        Ok(())
    }

    fn emit_load_argument_dynamic_slot(&mut self, argc: Int32OperandId, slot_index: u8, result: ValOperandId) -> TranspileResult<()> {
        let argc = self.constant_int32(self.use_operand(argc.id()));
        let def = self.frame_slot(argc as u32 + slot_index as u32);
        self.define(result.id(), def);
        Ok(())
    }

    fn emit_int32_min_max(
        &mut self,
        is_max: bool,
        first: Int32OperandId,
        second: Int32OperandId,
        result: Int32OperandId,
    ) -> TranspileResult<()> {
        let lhs = self.use_operand(first.id());
        let rhs = self.use_operand(second.id());
        let op = MirOp::MinMax { lhs, rhs, is_max, specialization: MirType::Int32 };
        let def = self.add(op, MirType::Int32)?;
        self.define(result.id(), def);
        Ok(())
    }

    fn emit_number_min_max(
        &mut self,
        is_max: bool,
        first: NumberOperandId,
        second: NumberOperandId,
        result: NumberOperandId,
    ) -> TranspileResult<()> {
        let lhs = self.use_operand(first.id());
        let rhs = self.use_operand(second.id());
        let op = MirOp::MinMax { lhs, rhs, is_max, specialization: MirType::Double };
        let def = self.add(op, MirType::Double)?;
        self.define(result.id(), def);
        Ok(())
    }

    fn emit_load_int32_array_length(&mut self, obj: ObjOperandId, result: Int32OperandId) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let def = self.add(MirOp::ArrayLength { obj }, MirType::Int32)?;
        self.define(result.id(), def);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    fn emit_load_fixed_slot_result(&mut self, obj: ObjOperandId, offset: u32) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let offset = self.stub_raw_word(offset);
        let def = self.add(MirOp::LoadFixedSlot { obj, offset }, MirType::Value)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_dynamic_slot_result(&mut self, obj: ObjOperandId, offset: u32) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let offset = self.stub_raw_word(offset);
        let def = self.add(MirOp::LoadDynamicSlot { obj, offset }, MirType::Value)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_dense_element_result(&mut self, obj: ObjOperandId, index: Int32OperandId) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let index = self.use_operand(index.id());
        let length = self.add(MirOp::InitializedLength { obj }, MirType::Int32)?;
        let index = self.bounds_checked(index, length)?;
        let op = MirOp::LoadElement { obj, index, needs_hole_check: true };
        let def = self.add(op, MirType::Value)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_dense_element_hole_result(&mut self, obj: ObjOperandId, index: Int32OperandId) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let index = self.use_operand(index.id());
        let def = self.add(MirOp::LoadElementHole { obj, index }, MirType::Value)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_int32_array_length_result(&mut self, obj: ObjOperandId) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let def = self.add(MirOp::ArrayLength { obj }, MirType::Int32)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_string_length_result(&mut self, str: StringOperandId) -> TranspileResult<()> {
        let str = self.use_operand(str.id());
        let def = self.add(MirOp::StringLength { str }, MirType::Int32)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_string_char_result(&mut self, str: StringOperandId, index: Int32OperandId) -> TranspileResult<()> {
        let code = self.string_char_code(str, index)?;
        let def = self.add(MirOp::FromCharCode { code }, MirType::String)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_string_char_code_result(&mut self, str: StringOperandId, index: Int32OperandId) -> TranspileResult<()> {
        let def = self.string_char_code(str, index)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_int32_result(&mut self, val: Int32OperandId) -> TranspileResult<()> {
        let def = self.use_operand(val.id());
        self.set_result(def);
        Ok(())
    }

    fn emit_load_double_result(&mut self, val: NumberOperandId) -> TranspileResult<()> {
        let input = self.use_operand(val.id());
        let def = self.add(MirOp::ToDouble { input }, MirType::Double)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_boolean_result(&mut self, val: bool) -> TranspileResult<()> {
        let def = self.constant(Value::boolean(val), MirType::Boolean)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_undefined_result(&mut self) -> TranspileResult<()> {
        let def = self.constant(Value::UNDEFINED, MirType::Undefined)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_object_result(&mut self, obj: ObjOperandId) -> TranspileResult<()> {
        let def = self.use_operand(obj.id());
        self.set_result(def);
        Ok(())
    }

    fn emit_load_string_result(&mut self, str: StringOperandId) -> TranspileResult<()> {
        let def = self.use_operand(str.id());
        self.set_result(def);
        Ok(())
    }

    fn emit_load_symbol_result(&mut self, sym: SymbolOperandId) -> TranspileResult<()> {
        let def = self.use_operand(sym.id());
        self.set_result(def);
        Ok(())
    }

    fn emit_load_type_of_object_result(&mut self, obj: ObjOperandId) -> TranspileResult<()> {
        let input = self.use_operand(obj.id());
        let def = self.add(MirOp::TypeOf { input }, MirType::String)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_value_result(&mut self, val: u32) -> TranspileResult<()> {
        let value = self.stub_value(val);
        let def = self.constant(value, MirType::Value)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_load_value_truthy_result(&mut self, input: ValOperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let not = self.add(MirOp::Not { input }, MirType::Boolean)?;
        let def = self.add(MirOp::Not { input: not }, MirType::Boolean)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_is_object_result(&mut self, input: ValOperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let def = self.add(MirOp::IsObject { input }, MirType::Boolean)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_is_callable_result(&mut self, input: ValOperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let def = self.add(MirOp::IsCallable { input }, MirType::Boolean)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_has_class_result(&mut self, obj: ObjOperandId, clasp: u32) -> TranspileResult<()> {
        let class = self.stub_class(clasp);
        let obj = self.use_operand(obj.id());
        let def = self.add(MirOp::HasClass { obj, class }, MirType::Boolean)?;
        self.set_result(def);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Int32 arithmetic
    // -----------------------------------------------------------------------

    fn emit_int32_add_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> TranspileResult<()> {
        self.int32_binary(lhs, rhs, |lhs, rhs| MirOp::Add { lhs, rhs, specialization: MirType::Int32 })
    }

    fn emit_int32_sub_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> TranspileResult<()> {
        self.int32_binary(lhs, rhs, |lhs, rhs| MirOp::Sub { lhs, rhs, specialization: MirType::Int32 })
    }

    fn emit_int32_mul_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> TranspileResult<()> {
        self.int32_binary(lhs, rhs, |lhs, rhs| MirOp::Mul { lhs, rhs, specialization: MirType::Int32 })
    }

    fn emit_int32_div_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> TranspileResult<()> {
        self.int32_binary(lhs, rhs, |lhs, rhs| MirOp::Div { lhs, rhs, specialization: MirType::Int32 })
    }

    fn emit_int32_mod_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> TranspileResult<()> {
        self.int32_binary(lhs, rhs, |lhs, rhs| MirOp::Mod { lhs, rhs, specialization: MirType::Int32 })
    }

    fn emit_int32_bit_or_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> TranspileResult<()> {
        self.int32_binary(lhs, rhs, |lhs, rhs| MirOp::BitOr { lhs, rhs })
    }

    fn emit_int32_bit_xor_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> TranspileResult<()> {
        self.int32_binary(lhs, rhs, |lhs, rhs| MirOp::BitXor { lhs, rhs })
    }

    fn emit_int32_bit_and_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> TranspileResult<()> {
        self.int32_binary(lhs, rhs, |lhs, rhs| MirOp::BitAnd { lhs, rhs })
    }

    fn emit_int32_left_shift_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> TranspileResult<()> {
        self.int32_binary(lhs, rhs, |lhs, rhs| MirOp::Lsh { lhs, rhs })
    }

    fn emit_int32_right_shift_result(&mut self, lhs: Int32OperandId, rhs: Int32OperandId) -> TranspileResult<()> {
        self.int32_binary(lhs, rhs, |lhs, rhs| MirOp::Rsh { lhs, rhs })
    }

    fn emit_int32_unsigned_right_shift_result(
        &mut self,
        lhs: Int32OperandId,
        rhs: Int32OperandId,
        allow_double: bool,
    ) -> TranspileResult<()> {
        let lhs = self.use_operand(lhs.id());
        let rhs = self.use_operand(rhs.id());
        let ty = if allow_double { MirType::Value } else { MirType::Int32 };
        let def = self.add(MirOp::Ursh { lhs, rhs, bailout: !allow_double }, ty)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_int32_not_result(&mut self, input: Int32OperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let def = self.add(MirOp::BitNot { input }, MirType::Int32)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_int32_negation_result(&mut self, input: Int32OperandId) -> TranspileResult<()> {
        self.int32_with_constant(input, -1, |lhs, rhs| MirOp::Mul { lhs, rhs, specialization: MirType::Int32 })
    }

    fn emit_int32_inc_result(&mut self, input: Int32OperandId) -> TranspileResult<()> {
        self.int32_with_constant(input, 1, |lhs, rhs| MirOp::Add { lhs, rhs, specialization: MirType::Int32 })
    }

    fn emit_int32_dec_result(&mut self, input: Int32OperandId) -> TranspileResult<()> {
        self.int32_with_constant(input, 1, |lhs, rhs| MirOp::Sub { lhs, rhs, specialization: MirType::Int32 })
    }

    // -----------------------------------------------------------------------
    // Double arithmetic
    // -----------------------------------------------------------------------

    fn emit_double_add_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) -> TranspileResult<()> {
        self.double_binary(lhs, rhs, |lhs, rhs| MirOp::Add { lhs, rhs, specialization: MirType::Double })
    }

    fn emit_double_sub_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) -> TranspileResult<()> {
        self.double_binary(lhs, rhs, |lhs, rhs| MirOp::Sub { lhs, rhs, specialization: MirType::Double })
    }

    fn emit_double_mul_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) -> TranspileResult<()> {
        self.double_binary(lhs, rhs, |lhs, rhs| MirOp::Mul { lhs, rhs, specialization: MirType::Double })
    }

    fn emit_double_div_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) -> TranspileResult<()> {
        self.double_binary(lhs, rhs, |lhs, rhs| MirOp::Div { lhs, rhs, specialization: MirType::Double })
    }

    fn emit_double_mod_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) -> TranspileResult<()> {
        self.double_binary(lhs, rhs, |lhs, rhs| MirOp::Mod { lhs, rhs, specialization: MirType::Double })
    }

    fn emit_double_pow_result(&mut self, lhs: NumberOperandId, rhs: NumberOperandId) -> TranspileResult<()> {
        self.double_binary(lhs, rhs, |lhs, rhs| MirOp::Pow { lhs, rhs })
    }

    fn emit_double_negation_result(&mut self, input: NumberOperandId) -> TranspileResult<()> {
        self.double_with_constant(input, -1.0, |lhs, rhs| MirOp::Mul { lhs, rhs, specialization: MirType::Double })
    }

    fn emit_double_inc_result(&mut self, input: NumberOperandId) -> TranspileResult<()> {
        self.double_with_constant(input, 1.0, |lhs, rhs| MirOp::Add { lhs, rhs, specialization: MirType::Double })
    }

    fn emit_double_dec_result(&mut self, input: NumberOperandId) -> TranspileResult<()> {
        self.double_with_constant(input, 1.0, |lhs, rhs| MirOp::Sub { lhs, rhs, specialization: MirType::Double })
    }

    // -----------------------------------------------------------------------
    // Comparisons
    // -----------------------------------------------------------------------

    fn emit_compare_int32_result(&mut self, op: JSOp, lhs: Int32OperandId, rhs: Int32OperandId) -> TranspileResult<()> {
        self.compare(op, lhs.id(), rhs.id(), CompareType::Int32)
    }

    fn emit_compare_double_result(&mut self, op: JSOp, lhs: NumberOperandId, rhs: NumberOperandId) -> TranspileResult<()> {
        self.compare(op, lhs.id(), rhs.id(), CompareType::Double)
    }

    fn emit_compare_string_result(&mut self, op: JSOp, lhs: StringOperandId, rhs: StringOperandId) -> TranspileResult<()> {
        self.compare(op, lhs.id(), rhs.id(), CompareType::String)
    }

    fn emit_compare_object_result(&mut self, op: JSOp, lhs: ObjOperandId, rhs: ObjOperandId) -> TranspileResult<()> {
        self.compare(op, lhs.id(), rhs.id(), CompareType::Object)
    }

    fn emit_compare_symbol_result(&mut self, op: JSOp, lhs: SymbolOperandId, rhs: SymbolOperandId) -> TranspileResult<()> {
        self.compare(op, lhs.id(), rhs.id(), CompareType::Symbol)
    }

    fn emit_compare_null_undefined_result(&mut self, op: JSOp, is_undefined: bool, input: ValOperandId) -> TranspileResult<()> {
        let lhs = self.use_operand(input.id());
        let (constant, ty, compare_type) = if is_undefined {
            (Value::UNDEFINED, MirType::Undefined, CompareType::Undefined)
        } else {
            (Value::NULL, MirType::Null, CompareType::Null)
        };
        let rhs = self.constant(constant, ty)?;
        let def = self.add(MirOp::Compare { lhs, rhs, op, compare_type }, MirType::Boolean)?;
        self.set_result(def);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Math
    // -----------------------------------------------------------------------

    fn emit_math_abs_int32_result(&mut self, input: Int32OperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let def = self.add(MirOp::Abs { input, specialization: MirType::Int32 }, MirType::Int32)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_math_abs_number_result(&mut self, input: NumberOperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let def = self.add(MirOp::Abs { input, specialization: MirType::Double }, MirType::Double)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_math_sqrt_number_result(&mut self, input: NumberOperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let def = self.add(MirOp::Sqrt { input }, MirType::Double)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_math_floor_to_int32_result(&mut self, input: NumberOperandId) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let def = if self.graph.type_of(input) == MirType::Int32 {
            input
        } else {
            self.add(MirOp::Floor { input }, MirType::Int32)?
        };
        self.set_result(def);
        Ok(())
    }

    fn emit_math_function_number_result(&mut self, input: NumberOperandId, fun: UnaryMathFunction) -> TranspileResult<()> {
        let input = self.use_operand(input.id());
        let def = self.add(MirOp::MathFunction { input, fun }, MirType::Double)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_call_string_concat_result(&mut self, lhs: StringOperandId, rhs: StringOperandId) -> TranspileResult<()> {
        let lhs = self.use_operand(lhs.id());
        let rhs = self.use_operand(rhs.id());
        let def = self.add(MirOp::Concat { lhs, rhs }, MirType::String)?;
        self.set_result(def);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stores
    // -----------------------------------------------------------------------

    fn emit_store_fixed_slot(&mut self, obj: ObjOperandId, offset: u32, rhs: ValOperandId) -> TranspileResult<()> {
        self.store_slot(obj, offset, rhs, SlotKind::Fixed)
    }

    fn emit_store_dynamic_slot(&mut self, obj: ObjOperandId, offset: u32, rhs: ValOperandId) -> TranspileResult<()> {
        self.store_slot(obj, offset, rhs, SlotKind::Dynamic)
    }

    fn emit_add_and_store_fixed_slot(
        &mut self,
        obj: ObjOperandId,
        offset: u32,
        rhs: ValOperandId,
        change_group: bool,
        new_group: u32,
        new_shape: u32,
    ) -> TranspileResult<()> {
        self.add_and_store_slot(obj, offset, rhs, change_group, new_group, new_shape, SlotKind::Fixed, None)
    }

    fn emit_add_and_store_dynamic_slot(
        &mut self,
        obj: ObjOperandId,
        offset: u32,
        rhs: ValOperandId,
        change_group: bool,
        new_group: u32,
        new_shape: u32,
    ) -> TranspileResult<()> {
        self.add_and_store_slot(obj, offset, rhs, change_group, new_group, new_shape, SlotKind::Dynamic, None)
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
    ) -> TranspileResult<()> {
        self.add_and_store_slot(
            obj,
            offset,
            rhs,
            change_group,
            new_group,
            new_shape,
            SlotKind::Dynamic,
            Some(num_new_slots),
        )
    }

    fn emit_store_dense_element(&mut self, obj: ObjOperandId, index: Int32OperandId, rhs: ValOperandId) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let index = self.use_operand(index.id());
        let value = self.use_operand(rhs.id());
        let length = self.add(MirOp::InitializedLength { obj }, MirType::Int32)?;
        let index = self.bounds_checked(index, length)?;
        self.add(MirOp::GuardElementNotHole { obj, index }, MirType::None)?;
        self.add(MirOp::PostWriteBarrier { obj, value }, MirType::None)?;
        self.add_effectful(MirOp::StoreElement { obj, index, value }, MirType::None)?;
        Ok(())
    }

    fn emit_store_dense_element_hole(
        &mut self,
        obj: ObjOperandId,
        index: Int32OperandId,
        rhs: ValOperandId,
        handle_add: bool,
    ) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let index = self.use_operand(index.id());
        let value = self.use_operand(rhs.id());
        self.add(MirOp::GuardStoreElementHole { obj, index, handle_add }, MirType::None)?;
        self.add(MirOp::PostWriteBarrier { obj, value }, MirType::None)?;
        self.add_effectful(MirOp::StoreElementHole { obj, index, value }, MirType::None)?;
        Ok(())
    }

    fn emit_array_push(&mut self, obj: ObjOperandId, rhs: ValOperandId) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let value = self.use_operand(rhs.id());
        self.add(MirOp::GuardArrayPush { obj }, MirType::None)?;
        self.add(MirOp::PostWriteBarrier { obj, value }, MirType::None)?;
        let def = self.add_effectful(MirOp::ArrayPush { obj, value }, MirType::Int32)?;
        self.set_result(def);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Proxies and megamorphic access
    // -----------------------------------------------------------------------

    fn emit_proxy_get_result(&mut self, obj: ObjOperandId, id: u32) -> TranspileResult<()> {
        let id = self.stub_id(id);
        let proxy = self.use_operand(obj.id());
        let def = self.add_effectful(MirOp::ProxyGet { proxy, id }, MirType::Value)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_proxy_get_by_value_result(&mut self, obj: ObjOperandId, id: ValOperandId) -> TranspileResult<()> {
        let proxy = self.use_operand(obj.id());
        let id = self.use_operand(id.id());
        let def = self.add_effectful(MirOp::ProxyGetByValue { proxy, id }, MirType::Value)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_proxy_has_prop_result(&mut self, obj: ObjOperandId, id: ValOperandId, has_own: bool) -> TranspileResult<()> {
        let proxy = self.use_operand(obj.id());
        let id = self.use_operand(id.id());
        let def = self.add_effectful(MirOp::ProxyHasProp { proxy, id, has_own }, MirType::Boolean)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_proxy_set(&mut self, obj: ObjOperandId, id: u32, rhs: ValOperandId, strict: bool) -> TranspileResult<()> {
        let id = self.stub_id(id);
        let proxy = self.use_operand(obj.id());
        let value = self.use_operand(rhs.id());
        self.add_effectful(MirOp::ProxySet { proxy, id, value, strict }, MirType::None)?;
        Ok(())
    }

    fn emit_megamorphic_load_slot_result(&mut self, obj: ObjOperandId, name: u32) -> TranspileResult<()> {
        let name = self.stub_id(name);
        let obj = self.use_operand(obj.id());
        let def = self.add(MirOp::MegamorphicLoadSlot { obj, name }, MirType::Value)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_megamorphic_store_slot(&mut self, obj: ObjOperandId, name: u32, rhs: ValOperandId) -> TranspileResult<()> {
        let name = self.stub_id(name);
        let obj = self.use_operand(obj.id());
        let value = self.use_operand(rhs.id());
        self.add_effectful(MirOp::MegamorphicStoreSlot { obj, name, value }, MirType::None)?;
        Ok(())
    }

    fn emit_megamorphic_has_prop_result(&mut self, obj: ObjOperandId, id: ValOperandId, has_own: bool) -> TranspileResult<()> {
        let obj = self.use_operand(obj.id());
        let id = self.use_operand(id.id());
        let def = self.add(MirOp::MegamorphicHasProp { obj, id, has_own }, MirType::Boolean)?;
        self.set_result(def);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    fn emit_call_scripted_getter_result(
        &mut self,
        receiver: ValOperandId,
        getter: u32,
        same_realm: bool,
        _nargs_and_flags: u32,
    ) -> TranspileResult<()> {
        let getter = self.stub_object(getter);
        let receiver = self.use_operand(receiver.id());
        let def = self.call_accessor(getter, receiver, &[], same_realm)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_call_native_getter_result(
        &mut self,
        receiver: ValOperandId,
        getter: u32,
        same_realm: bool,
        _nargs_and_flags: u32,
    ) -> TranspileResult<()> {
        let getter = self.stub_object(getter);
        let receiver = self.use_operand(receiver.id());
        let op = MirOp::CallNativeGetter { getter, receiver, same_realm };
        let def = self.add_effectful(op, MirType::Value)?;
        self.set_result(def);
        Ok(())
    }

    fn emit_call_scripted_setter(
        &mut self,
        receiver: ObjOperandId,
        setter: u32,
        rhs: ValOperandId,
        same_realm: bool,
        _nargs_and_flags: u32,
    ) -> TranspileResult<()> {
        let setter = self.stub_object(setter);
        let receiver = self.use_operand(receiver.id());
        let value = self.use_operand(rhs.id());
        self.call_accessor(setter, receiver, &[value], same_realm)?;
        Ok(())
    }

    fn emit_call_native_setter(
        &mut self,
        receiver: ObjOperandId,
        setter: u32,
        rhs: ValOperandId,
        same_realm: bool,
        _nargs_and_flags: u32,
    ) -> TranspileResult<()> {
        let setter = self.stub_object(setter);
        let receiver = self.use_operand(receiver.id());
        let value = self.use_operand(rhs.id());
        let op = MirOp::CallNativeSetter { setter, receiver, value, same_realm };
        self.add_effectful(op, MirType::None)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    fn emit_call_scripted_function(&mut self, callee: ObjOperandId, _argc: Int32OperandId, flags: CallFlags) -> TranspileResult<()> {
        self.call_function(callee, flags, CallTargetKind::Scripted, None)
    }

    fn emit_call_native_function(&mut self, callee: ObjOperandId, _argc: Int32OperandId, flags: CallFlags) -> TranspileResult<()> {
        self.call_function(callee, flags, CallTargetKind::Native, None)
    }

    fn emit_call_dom_function(
        &mut self,
        callee: ObjOperandId,
        _argc: Int32OperandId,
        this_obj: ObjOperandId,
        flags: CallFlags,
    ) -> TranspileResult<()> {
        self.call_function(callee, flags, CallTargetKind::Dom, Some(this_obj))
    }

    fn emit_call_inlined_function(
        &mut self,
        callee: ObjOperandId,
        _argc: Int32OperandId,
        ic_script: u32,
        flags: CallFlags,
    ) -> TranspileResult<()> {
        if !self.snapshot.call_site.is_some_and(|site| site.inlined) {
            return self.call_function(callee, flags, CallTargetKind::Scripted, None);
        }
        let ic_script = self.stub_raw_word(ic_script);
        let call_info = self.prepare_call(callee, flags, None)?;
        tracing::trace!(
            target: "otter::warp",
            pc = self.snapshot.pc,
            ic_script,
            argc = call_info.argc(),
            "call inlined"
        );
        let call = MInlinedCall { ic_script, call_info, same_realm: flags.is_same_realm() };
        self.graph.block_mut(self.block).set_inlined_call(call);
        Ok(())
    }

    fn emit_meta_scripted_template_object(&mut self, _callee: u32, template: u32) -> TranspileResult<()> {
        self.template_object = Some(self.stub_object(template));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Terminals
    // -----------------------------------------------------------------------

    fn emit_type_monitor_result(&mut self) -> TranspileResult<()> {
        Ok(())
    }

    fn emit_return_from_ic(&mut self) -> TranspileResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use otter_cacheir::{CacheIRStubInfo, CacheIRWriter, ICStubEngine};

    use super::*;

    fn snapshot(writer: &CacheIRWriter) -> WarpCacheIR {
        let ir = writer.validate().unwrap();
        let info = CacheIRStubInfo::new(ir.kind(), ICStubEngine::Baseline, false, ir.code(), ir.field_types());
        WarpCacheIR {
            pc: 7,
            kind: ir.kind(),
            stub_info: info,
            stub_data: writer.copy_stub_data().into_boxed_slice(),
            call_site: None,
        }
    }

    fn transpile(writer: &CacheIRWriter) -> MirGraph {
        let snapshot = snapshot(writer);
        let mut graph = MirGraph::new(256);
        let block = graph.new_block(snapshot.pc, snapshot.kind).unwrap();
        let inputs: Vec<_> = (0..snapshot.kind.num_inputs())
            .map(|_| graph.add_input(block, MirType::Value).unwrap())
            .collect();
        transpile_cache_ir(&mut graph, block, &snapshot, &inputs, None).unwrap();
        graph
    }

    fn op_names(graph: &MirGraph) -> Vec<&'static str> {
        graph.blocks()[0].instructions().iter().map(|ins| ins.op().name()).collect()
    }

    #[test]
    fn narrowing_guard_rebinds_the_operand() {
        let mut writer = CacheIRWriter::new(CacheKind::GetProp);
        let obj = writer.guard_to_object(writer.input_val(0));
        writer.guard_shape(obj, ShapeId::new(3));
        writer.load_fixed_slot_result(obj, 16);
        writer.return_from_ic();
        let graph = transpile(&writer);

        let block = &graph.blocks()[0];
        let ins = block.instructions();
        assert_eq!(op_names(&graph), ["Parameter", "Unbox", "GuardShape", "LoadFixedSlot"]);
        assert_eq!(ins[2].op(), &MirOp::GuardShape { obj: ins[1].id(), shape: ShapeId::new(3) });
        assert_eq!(ins[3].op(), &MirOp::LoadFixedSlot { obj: ins[2].id(), offset: 16 });
        assert_eq!(block.result(), Some(ins[3].id()));
        assert_eq!(block.num_effectful(), 0);
    }

    #[test]
    fn dense_load_checks_bounds_against_initialized_length() {
        let mut writer = CacheIRWriter::new(CacheKind::GetElem);
        let obj = writer.guard_to_object(writer.input_val(0));
        let index = writer.guard_to_int32_index(writer.input_val(1));
        writer.load_dense_element_result(obj, index);
        writer.type_monitor_result();
        let graph = transpile(&writer);
        assert_eq!(
            op_names(&graph),
            ["Parameter", "Parameter", "Unbox", "ToNumberInt32", "InitializedLength", "BoundsCheck", "LoadElement"]
        );
    }

    #[test]
    fn int32_negation_is_a_checked_multiply() {
        let mut writer = CacheIRWriter::new(CacheKind::UnaryArith);
        let input = writer.guard_to_int32(writer.input_val(0));
        writer.int32_negation_result(input);
        writer.return_from_ic();
        let graph = transpile(&writer);
        let ins = graph.blocks()[0].instructions();
        assert_eq!(ins[2].op(), &MirOp::Constant(Value::int32(-1)));
        assert!(matches!(ins[3].op(), MirOp::Mul { specialization: MirType::Int32, .. }));
        assert!(ins[3].is_guard());
    }

    #[test]
    fn store_gets_barrier_and_resume_point() {
        let mut writer = CacheIRWriter::new(CacheKind::SetProp);
        let obj = writer.guard_to_object(writer.input_val(0));
        writer.guard_shape(obj, ShapeId::new(5));
        writer.store_fixed_slot(obj, 24, writer.input_val(1));
        writer.return_from_ic();
        let graph = transpile(&writer);

        let block = &graph.blocks()[0];
        let names = op_names(&graph);
        assert_eq!(names[names.len() - 2..], ["PostWriteBarrier", "StoreFixedSlot"]);
        let store = block.instructions().last().unwrap();
        let rp = store.resume_point().unwrap();
        assert_eq!(rp.pc, 7);
        assert_eq!(rp.mode, crate::mir::ResumeMode::ResumeAfter);
        // A set leaves the stored value on the stack.
        assert_eq!(rp.stack, vec![block.instructions()[1].id()]);
        assert_eq!(block.result(), None);
    }

    #[test]
    #[should_panic(expected = "is not a property key")]
    fn malformed_property_key_field_panics() {
        let mut writer = CacheIRWriter::new(CacheKind::GetProp);
        let obj = writer.guard_to_object(writer.input_val(0));
        writer.megamorphic_load_slot_result(obj, PropertyKey::Atom(StringId::new(1)));
        writer.type_monitor_result();
        let mut snapshot = snapshot(&writer);
        otter_cacheir::stub_info::write_stub_word(&mut snapshot.stub_data, 0, u64::MAX);

        let mut graph = MirGraph::new(64);
        let block = graph.new_block(snapshot.pc, snapshot.kind).unwrap();
        let input = graph.add_input(block, MirType::Value).unwrap();
        let _ = transpile_cache_ir(&mut graph, block, &snapshot, &[input], None);
    }

    #[test]
    fn truthiness_is_double_negation() {
        let mut writer = CacheIRWriter::new(CacheKind::ToBool);
        writer.load_value_truthy_result(writer.input_val(0));
        writer.return_from_ic();
        let graph = transpile(&writer);
        assert_eq!(op_names(&graph), ["Parameter", "Not", "Not"]);
    }
}
