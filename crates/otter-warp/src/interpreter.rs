//! MIR interpreter
//!
//! Executes one block of a [`MirGraph`] against a [`Runtime`]. Every SSA
//! value is held boxed. A guard whose assumption fails ends the block with
//! [`MirOutcome::Bailout`] naming the resume point to continue from: the
//! block's entry before its effectful instruction has run, the effect's own
//! resume point after.
//!
//! Effectful calls run under a [`FrameKind::WarpCall`] frame whose
//! `resume_pc` is the call's resume point, so code the call re-enters sees
//! where the Warp activation would resume. A block ending in an inlined
//! call has no body for the callee; the interpreter enters the callee in
//! its place.

use otter_cacheir::{CacheKind, JSOp};
use otter_vm_core::{
    CallArgs, ClassFlags, ElementsFlags, FrameKind, JSWhyMagic, ObjectId, RealmId, Runtime,
    StringId, Value, ValueType, VmResult,
};
use otter_vm_jit::ICInputs;
use otter_vm_jit::masm::{
    Condition, DoubleBinOp, DoubleCondition, DoubleUnaryOp, Int32BinOp, js_max, js_min,
};
use otter_vm_jit::vm_functions::pure_property_key;
use smallvec::SmallVec;

use crate::bailout::{BailoutCounts, BailoutKind};
use crate::call_info::CallArgFormat;
use crate::mir::{
    BlockId, CallTargetKind, CompareType, MBasicBlock, MCall, MDefinitionId, MInlinedCall, MInstruction,
    MirGraph, MirOp, MirType, ResumeMode, SlotKind,
};

/// How a block finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MirOutcome {
    /// The site produced a value.
    Return(Value),
    /// The site ran to completion without a value (stores).
    NoResult,
    /// A guard failed.
    Bailout {
        /// Bytecode offset to resume at
        pc: u32,
        /// Re-execute the op at `pc` or continue after it
        mode: ResumeMode,
        /// Family of the failed guard
        kind: BailoutKind,
    },
}

impl MirOutcome {
    /// Whether a guard failed.
    pub fn is_bailout(&self) -> bool {
        matches!(self, MirOutcome::Bailout { .. })
    }
}

/// Interpreter over one graph.
pub struct MirInterpreter<'g> {
    graph: &'g MirGraph,
    bailouts: BailoutCounts,
}

impl<'g> MirInterpreter<'g> {
    /// Interpreter for `graph`.
    pub fn new(graph: &'g MirGraph) -> Self {
        Self {
            graph,
            bailouts: BailoutCounts::default(),
        }
    }

    /// Bailouts taken so far.
    pub fn bailouts(&self) -> &BailoutCounts {
        &self.bailouts
    }

    /// Block parameters for the IC inputs Baseline would see: the frame
    /// words for a call site, otherwise the register operands followed by
    /// the frame words.
    pub fn inputs_from_ic(kind: CacheKind, inputs: &ICInputs) -> SmallVec<[Value; 8]> {
        let mut values = SmallVec::new();
        if kind != CacheKind::Call {
            values.extend(inputs.regs().iter().map(|&bits| Value::from_bits(bits)));
        }
        values.extend(inputs.frame().iter().copied());
        values
    }

    /// Run `block` with `inputs` as its parameters.
    ///
    /// `Err` is an exception thrown by a callee; frames pushed by the block
    /// are unwound and the caller's realm restored.
    ///
    /// # Panics
    ///
    /// If `inputs` does not match the block's parameter count.
    pub fn run_block(&mut self, rt: &mut Runtime, block: BlockId, inputs: &[Value]) -> VmResult<MirOutcome> {
        let graph = self.graph;
        let block = graph.block(block);
        assert_eq!(
            inputs.len(),
            block.num_inputs() as usize,
            "{} takes {} inputs",
            block.id(),
            block.num_inputs()
        );
        let mut values = vec![Value::UNDEFINED; graph.num_instructions() as usize];
        let mut resume = block.entry_resume_point();

        for ins in block.instructions() {
            let Some(value) = eval(rt, block, ins, &values, inputs)? else {
                let kind = BailoutKind::of(ins.op());
                self.bailouts.record(kind);
                tracing::debug!(
                    target: "otter::warp",
                    pc = resume.pc,
                    mode = ?resume.mode,
                    %kind,
                    op = ins.op().name(),
                    "bailout"
                );
                return Ok(MirOutcome::Bailout {
                    pc: resume.pc,
                    mode: resume.mode,
                    kind,
                });
            };
            values[ins.id().index() as usize] = value;
            if let Some(rp) = ins.resume_point() {
                resume = rp;
            }
        }

        if let Some(inlined) = block.inlined_call() {
            return inline_call(rt, block, inlined, &values).map(MirOutcome::Return);
        }
        Ok(match block.result() {
            Some(def) => MirOutcome::Return(values[def.index() as usize]),
            None => MirOutcome::NoResult,
        })
    }
}

/// Run the callee of an inlined call in place of its spliced body.
fn inline_call(rt: &mut Runtime, block: &MBasicBlock, inlined: &MInlinedCall, values: &[Value]) -> VmResult<Value> {
    let v = |def: MDefinitionId| values[def.index() as usize];
    let info = &inlined.call_info;
    let args = match info.arg_format() {
        CallArgFormat::Standard => info.args().iter().map(|&arg| v(arg)).collect(),
        CallArgFormat::Array => rt.object(object(v(info.args()[0]))).elements.values.clone(),
    };
    let shape = CallShape {
        target: CallTargetKind::Scripted,
        constructing: info.constructing(),
        same_realm: inlined.same_realm,
    };
    let new_target = info.new_target().map(v);
    invoke(rt, block.pc(), shape, v(info.callee()), v(info.this()), args, new_target)
}

// ---------------------------------------------------------------------------
// Operand access
// ---------------------------------------------------------------------------

fn object(v: Value) -> ObjectId {
    v.as_object()
        .unwrap_or_else(|| panic!("expected an object, got {:?}", v.value_type()))
}

fn int32(v: Value) -> i32 {
    v.as_int32()
        .unwrap_or_else(|| panic!("expected an int32, got {:?}", v.value_type()))
}

fn number(v: Value) -> f64 {
    v.as_number()
        .unwrap_or_else(|| panic!("expected a number, got {:?}", v.value_type()))
}

fn string(v: Value) -> StringId {
    v.as_string()
        .unwrap_or_else(|| panic!("expected a string, got {:?}", v.value_type()))
}

fn boolean(v: Value) -> bool {
    v.as_boolean()
        .unwrap_or_else(|| panic!("expected a boolean, got {:?}", v.value_type()))
}

fn object_realm(rt: &Runtime, obj: ObjectId) -> RealmId {
    rt.function(obj).map_or_else(|| rt.object(obj).realm, |f| f.realm)
}

/// Run `body` under a Warp call frame, in `realm_of`'s realm when given.
fn call_out<T>(
    rt: &mut Runtime,
    resume_pc: u32,
    realm_of: Option<ObjectId>,
    body: impl FnOnce(&mut Runtime) -> VmResult<T>,
) -> VmResult<T> {
    let depth = rt.frames().len();
    let caller_realm = rt.current_realm();
    rt.push_frame(FrameKind::WarpCall { resume_pc });
    if let Some(obj) = realm_of {
        let realm = object_realm(rt, obj);
        rt.set_current_realm(realm);
    }
    let result = body(rt);
    match &result {
        Ok(_) => {
            rt.pop_frame();
        }
        Err(_) => rt.unwind_frames(depth),
    }
    rt.set_current_realm(caller_realm);
    result
}

fn resume_pc(block: &MBasicBlock, ins: &MInstruction) -> u32 {
    ins.resume_point().map_or(block.pc(), |rp| rp.pc)
}

/// Guard helper: `Some(value)` when `ok`.
fn pass(ok: bool, value: Value) -> Option<Value> {
    ok.then_some(value)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate one instruction. `Ok(None)` means its guard failed.
fn eval(
    rt: &mut Runtime,
    block: &MBasicBlock,
    ins: &MInstruction,
    values: &[Value],
    inputs: &[Value],
) -> VmResult<Option<Value>> {
    let v = |def: MDefinitionId| values[def.index() as usize];
    let done = Value::UNDEFINED;

    let value = match ins.op() {
        MirOp::Parameter { index } => inputs[*index as usize],
        MirOp::Constant(value) => *value,

        // Unboxing and type guards
        MirOp::Unbox { input, ty } => {
            let value = v(*input);
            return Ok(pass(ty.matches(value.value_type()), value));
        }
        MirOp::GuardValue { input, expected } => {
            let value = v(*input);
            return Ok(pass(value.to_bits() == expected.to_bits(), value));
        }
        MirOp::GuardNullOrUndefined { input } => {
            let value = v(*input);
            return Ok(pass(value.is_null_or_undefined(), value));
        }
        MirOp::GuardNumber { input } => {
            let value = v(*input);
            return Ok(pass(value.is_number(), value));
        }
        MirOp::ToNumberInt32 { input } => {
            let value = v(*input);
            return Ok(match value.value_type() {
                ValueType::Int32 => Some(value),
                ValueType::Double => {
                    let d = number(value);
                    let i = d as i32;
                    pass(i as f64 == d, Value::int32(i))
                }
                _ => None,
            });
        }
        MirOp::BooleanToInt32 { input } => Value::int32(boolean(v(*input)) as i32),

        // Object guards
        MirOp::GuardShape { obj, shape } => {
            let value = v(*obj);
            return Ok(pass(rt.shape_of(object(value)) == *shape, value));
        }
        MirOp::GuardObjectGroup { obj, group } => {
            let value = v(*obj);
            return Ok(pass(rt.group_of(object(value)) == *group, value));
        }
        MirOp::GuardToClass { obj, class } => {
            let value = v(*obj);
            return Ok(pass(rt.class_of(object(value)) == *class, value));
        }
        MirOp::GuardProto { obj, expected } => {
            let value = v(*obj);
            return Ok(pass(rt.proto_of(object(value)) == Some(*expected), value));
        }
        MirOp::GuardNullProto { obj } => {
            let value = v(*obj);
            return Ok(pass(rt.proto_of(object(value)).is_none(), value));
        }
        MirOp::GuardIsProxy { obj } | MirOp::GuardIsNotProxy { obj } => {
            let value = v(*obj);
            let class = rt.class_of(object(value));
            let is_proxy = rt.class_data(class).flags.contains(ClassFlags::IS_PROXY);
            let want = matches!(ins.op(), MirOp::GuardIsProxy { .. });
            return Ok(pass(is_proxy == want, value));
        }
        MirOp::GuardObjectIdentity { obj, expected } => {
            let value = v(*obj);
            return Ok(pass(object(value) == *expected, value));
        }
        MirOp::GuardSpecificFunction { fun, expected, .. } => {
            let value = v(*fun);
            return Ok(pass(object(value) == *expected, value));
        }
        MirOp::GuardSpecificAtom { str, atom } => {
            let value = v(*str);
            return Ok(pass(string(value) == *atom, value));
        }
        MirOp::GuardSpecificSymbol { sym, expected } => {
            let value = v(*sym);
            return Ok(pass(value.as_symbol() == Some(*expected), value));
        }
        MirOp::GuardNoDenseElements { obj } => {
            let value = v(*obj);
            return Ok(pass(rt.initialized_length(object(value)) == 0, value));
        }
        MirOp::GuardArrayIsPacked { array } => {
            let value = v(*array);
            let flags = rt.object(object(value)).elements.flags;
            return Ok(pass(!flags.contains(ElementsFlags::NON_PACKED), value));
        }
        MirOp::GuardFunctionFlags { fun, expected, unexpected } => {
            let value = v(*fun);
            let word = rt.function(object(value)).map_or(0, |f| f.nargs_and_flags());
            let has = |flags: otter_vm_core::FunctionFlags| word & flags.bits() as u32;
            let ok = has(*expected) == expected.bits() as u32 && has(*unexpected) == 0;
            return Ok(pass(ok, value));
        }
        MirOp::GuardFunctionHasJitEntry { fun } | MirOp::GuardFunctionHasNoJitEntry { fun } => {
            let value = v(*fun);
            let has_entry = rt.function(object(value)).is_some_and(|f| f.has_jit_entry());
            let want = matches!(ins.op(), MirOp::GuardFunctionHasJitEntry { .. });
            return Ok(pass(has_entry == want, value));
        }
        MirOp::GuardInt32IsNonNegative { index } => {
            let value = v(*index);
            return Ok(pass(int32(value) >= 0, value));
        }

        // Loads
        MirOp::ObjectStaticProto { obj } => {
            return Ok(rt.proto_of(object(v(*obj))).map(Value::object));
        }
        MirOp::MinMax { lhs, rhs, is_max, specialization } => {
            let (a, b) = (v(*lhs), v(*rhs));
            if *specialization == MirType::Int32 {
                let (a, b) = (int32(a), int32(b));
                Value::int32(if *is_max { a.max(b) } else { a.min(b) })
            } else {
                let (a, b) = (number(a), number(b));
                Value::double(if *is_max { js_max(a, b) } else { js_min(a, b) })
            }
        }
        MirOp::ArrayLength { obj } => {
            let length = rt.array_length(object(v(*obj)));
            return Ok(pass(length <= i32::MAX as u32, Value::int32(length as i32)));
        }
        MirOp::InitializedLength { obj } => Value::int32(rt.initialized_length(object(v(*obj))) as i32),
        MirOp::BoundsCheck { index, length } => {
            let value = v(*index);
            return Ok(pass((int32(value) as u32) < int32(v(*length)) as u32, value));
        }
        MirOp::LoadElement { obj, index, needs_hole_check } => {
            let element = rt
                .dense_element(object(v(*obj)), int32(v(*index)) as u32)
                .unwrap_or(Value::magic(JSWhyMagic::ElementsHole));
            let hole = element.is_magic(JSWhyMagic::ElementsHole);
            return Ok(pass(!(*needs_hole_check && hole), element));
        }
        MirOp::LoadElementHole { obj, index } => {
            let index = int32(v(*index));
            if index < 0 {
                return Ok(None);
            }
            match rt.dense_element(object(v(*obj)), index as u32) {
                Some(element) if !element.is_magic(JSWhyMagic::ElementsHole) => element,
                _ => Value::UNDEFINED,
            }
        }
        MirOp::LoadFixedSlot { obj, offset } => rt.load_fixed_slot(object(v(*obj)), *offset),
        MirOp::LoadDynamicSlot { obj, offset } => rt.load_dynamic_slot(object(v(*obj)), *offset),
        MirOp::StringLength { str } => Value::int32(rt.strings.length(string(v(*str))) as i32),
        MirOp::CharCodeAt { str, index } => {
            let index = int32(v(*index)) as u32 as usize;
            return Ok(rt.strings.char_code_at(string(v(*str)), index).map(|unit| Value::int32(unit as i32)));
        }
        MirOp::FromCharCode { code } => {
            let unit = int32(v(*code)) as u32;
            let c = char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER);
            let mut buf = [0u8; 4];
            Value::string(rt.intern(c.encode_utf8(&mut buf)))
        }
        MirOp::TypeOf { input } => Value::string(rt.type_of(v(*input))),
        MirOp::Not { input } => Value::boolean(!rt.to_boolean(v(*input))),
        MirOp::IsObject { input } => Value::boolean(v(*input).is_object()),
        MirOp::IsCallable { input } => {
            let callable = v(*input).as_object().is_some_and(|obj| rt.is_callable(obj));
            Value::boolean(callable)
        }
        MirOp::HasClass { obj, class } => Value::boolean(rt.class_of(object(v(*obj))) == *class),

        // Arithmetic
        MirOp::Add { lhs, rhs, specialization }
        | MirOp::Sub { lhs, rhs, specialization }
        | MirOp::Mul { lhs, rhs, specialization }
        | MirOp::Div { lhs, rhs, specialization }
        | MirOp::Mod { lhs, rhs, specialization } => {
            let (a, b) = (v(*lhs), v(*rhs));
            if *specialization == MirType::Int32 {
                return Ok(int32_arith(ins.op(), int32(a), int32(b)).map(Value::int32));
            }
            let op = match ins.op() {
                MirOp::Add { .. } => DoubleBinOp::Add,
                MirOp::Sub { .. } => DoubleBinOp::Sub,
                MirOp::Mul { .. } => DoubleBinOp::Mul,
                MirOp::Div { .. } => DoubleBinOp::Div,
                _ => DoubleBinOp::Mod,
            };
            Value::double(op.eval(number(a), number(b)))
        }
        MirOp::Pow { lhs, rhs } => Value::double(DoubleBinOp::Pow.eval(number(v(*lhs)), number(v(*rhs)))),
        MirOp::BitOr { lhs, rhs } => Value::int32(Int32BinOp::Or.eval(int32(v(*lhs)), int32(v(*rhs)))),
        MirOp::BitXor { lhs, rhs } => Value::int32(Int32BinOp::Xor.eval(int32(v(*lhs)), int32(v(*rhs)))),
        MirOp::BitAnd { lhs, rhs } => Value::int32(Int32BinOp::And.eval(int32(v(*lhs)), int32(v(*rhs)))),
        MirOp::Lsh { lhs, rhs } => Value::int32(Int32BinOp::Lsh.eval(int32(v(*lhs)), int32(v(*rhs)))),
        MirOp::Rsh { lhs, rhs } => Value::int32(Int32BinOp::Rsh.eval(int32(v(*lhs)), int32(v(*rhs)))),
        MirOp::Ursh { lhs, rhs, bailout } => {
            let result = Int32BinOp::Ursh.eval(int32(v(*lhs)), int32(v(*rhs)));
            if result >= 0 {
                Value::int32(result)
            } else if *bailout {
                return Ok(None);
            } else {
                Value::double(result as u32 as f64)
            }
        }
        MirOp::BitNot { input } => Value::int32(!int32(v(*input))),
        MirOp::Abs { input, specialization } => {
            if *specialization == MirType::Int32 {
                let x = int32(v(*input));
                return Ok(x.checked_abs().map(Value::int32));
            }
            Value::double(DoubleUnaryOp::Abs.eval(number(v(*input))))
        }
        MirOp::Sqrt { input } => Value::double(DoubleUnaryOp::Sqrt.eval(number(v(*input)))),
        MirOp::Floor { input } => {
            let d = number(v(*input)).floor();
            let in_range = d >= i32::MIN as f64 && d <= i32::MAX as f64;
            return Ok(pass(in_range && !(d == 0.0 && d.is_sign_negative()), Value::int32(d as i32)));
        }
        MirOp::MathFunction { input, fun } => Value::double(DoubleUnaryOp::Math(*fun).eval(number(v(*input)))),
        MirOp::ToDouble { input } => Value::double(number(v(*input))),
        MirOp::Compare { lhs, rhs, op, compare_type } => {
            Value::boolean(compare(rt, *op, *compare_type, v(*lhs), v(*rhs)))
        }
        MirOp::Concat { lhs, rhs } => {
            rt.maybe_gc();
            Value::string(rt.concat_strings(string(v(*lhs)), string(v(*rhs))))
        }

        // Stores
        MirOp::PostWriteBarrier { obj, value } => {
            rt.post_write_barrier(object(v(*obj)), v(*value));
            done
        }
        MirOp::StoreFixedSlot { obj, offset, value } => {
            store_slot(rt, object(v(*obj)), *offset, v(*value), SlotKind::Fixed);
            done
        }
        MirOp::StoreDynamicSlot { obj, offset, value } => {
            store_slot(rt, object(v(*obj)), *offset, v(*value), SlotKind::Dynamic);
            done
        }
        MirOp::GrowSlots { obj, capacity } => {
            return Ok(pass(rt.grow_slots_pure(object(v(*obj)), *capacity), done));
        }
        MirOp::AddAndStoreSlot { obj, offset, value, kind, new_shape, new_group } => {
            let obj = object(v(*obj));
            let data = rt.object_mut(obj);
            if let Some(group) = new_group {
                data.group = *group;
            }
            data.shape = *new_shape;
            match kind {
                SlotKind::Fixed => rt.store_fixed_slot(obj, *offset, v(*value)),
                SlotKind::Dynamic => rt.store_dynamic_slot(obj, *offset, v(*value)),
            }
            done
        }
        MirOp::GuardElementNotHole { obj, index } => {
            let element = rt.dense_element(object(v(*obj)), int32(v(*index)) as u32);
            return Ok(pass(element.is_some_and(|e| !e.is_magic(JSWhyMagic::ElementsHole)), done));
        }
        MirOp::StoreElement { obj, index, value } => {
            store_element(rt, object(v(*obj)), int32(v(*index)) as u32, v(*value));
            done
        }
        MirOp::GuardStoreElementHole { obj, index, handle_add } => {
            let obj = object(v(*obj));
            let index = int32(v(*index)) as u32;
            let elements = &rt.object(obj).elements;
            let (init_len, capacity, flags) = (elements.initialized_length(), elements.capacity, elements.flags);
            let ok = if index < init_len {
                true
            } else if *handle_add && index == init_len && !flags.contains(ElementsFlags::NOT_EXTENSIBLE) {
                init_len < capacity || rt.add_dense_element_pure(obj)
            } else {
                false
            };
            return Ok(pass(ok, done));
        }
        MirOp::StoreElementHole { obj, index, value } => {
            let obj = object(v(*obj));
            let index = int32(v(*index)) as u32;
            if index < rt.initialized_length(obj) {
                store_element(rt, obj, index, v(*value));
            } else {
                let elements = &mut rt.object_mut(obj).elements;
                elements.values.push(v(*value));
                if elements.length <= index {
                    elements.length = index + 1;
                }
            }
            done
        }
        MirOp::GuardArrayPush { obj } => {
            let obj = object(v(*obj));
            let elements = &rt.object(obj).elements;
            let (init_len, capacity) = (elements.initialized_length(), elements.capacity);
            let ok = init_len == elements.length
                && !elements.flags.contains(ElementsFlags::NOT_EXTENSIBLE)
                && (init_len < capacity || rt.add_dense_element_pure(obj));
            return Ok(pass(ok, done));
        }
        MirOp::ArrayPush { obj, value } => {
            let elements = &mut rt.object_mut(object(v(*obj))).elements;
            elements.values.push(v(*value));
            let length = elements.values.len() as u32;
            elements.length = length;
            Value::int32(length as i32)
        }

        // Proxies and megamorphic access
        MirOp::ProxyGet { proxy, id } => {
            let proxy = object(v(*proxy));
            let id = *id;
            call_out(rt, resume_pc(block, ins), None, |rt| {
                rt.maybe_gc();
                rt.proxy_get(proxy, id, Value::object(proxy))
            })?
        }
        MirOp::ProxyGetByValue { proxy, id } => {
            let proxy = object(v(*proxy));
            let id = v(*id);
            call_out(rt, resume_pc(block, ins), None, |rt| {
                rt.maybe_gc();
                let key = rt.to_property_key(id)?;
                rt.proxy_get(proxy, key, Value::object(proxy))
            })?
        }
        MirOp::ProxyHasProp { proxy, id, has_own } => {
            let proxy = object(v(*proxy));
            let (id, has_own) = (v(*id), *has_own);
            let found = call_out(rt, resume_pc(block, ins), None, |rt| {
                rt.maybe_gc();
                let key = rt.to_property_key(id)?;
                if has_own { rt.has_own_property(proxy, key) } else { rt.has_property(proxy, key) }
            })?;
            Value::boolean(found)
        }
        MirOp::ProxySet { proxy, id, value, strict } => {
            let proxy = object(v(*proxy));
            let (id, value, strict) = (*id, v(*value), *strict);
            call_out(rt, resume_pc(block, ins), None, |rt| {
                rt.maybe_gc();
                rt.proxy_set(proxy, id, value, strict)
            })?;
            done
        }
        MirOp::MegamorphicLoadSlot { obj, name } => {
            return Ok(rt.megamorphic_load_slot(object(v(*obj)), *name));
        }
        MirOp::MegamorphicStoreSlot { obj, name, value } => {
            let obj = object(v(*obj));
            let (name, value) = (*name, v(*value));
            call_out(rt, resume_pc(block, ins), None, |rt| {
                rt.maybe_gc();
                rt.set_property(obj, name, value)
            })?;
            done
        }
        MirOp::MegamorphicHasProp { obj, id, has_own } => {
            let obj = object(v(*obj));
            let found = pure_property_key(v(*id)).and_then(|key| rt.megamorphic_has_prop(obj, key, *has_own));
            return Ok(found.map(Value::boolean));
        }

        // Calls
        MirOp::CallNativeGetter { getter, receiver, same_realm } => {
            let (getter, receiver) = (*getter, v(*receiver));
            let realm_of = (!*same_realm).then_some(getter);
            call_out(rt, resume_pc(block, ins), realm_of, |rt| {
                rt.maybe_gc();
                rt.call_getter(getter, receiver)
            })?
        }
        MirOp::CallNativeSetter { setter, receiver, value, same_realm } => {
            let (setter, receiver, value) = (*setter, v(*receiver), v(*value));
            let realm_of = (!*same_realm).then_some(setter);
            call_out(rt, resume_pc(block, ins), realm_of, |rt| {
                rt.maybe_gc();
                rt.call_setter(setter, receiver, value)
            })?;
            done
        }
        MirOp::CreateThis { callee, new_target, same_realm } => {
            let callee = object(v(*callee));
            let new_target = v(*new_target).as_object().unwrap_or(callee);
            let caller_realm = rt.current_realm();
            if !*same_realm {
                let realm = object_realm(rt, callee);
                rt.set_current_realm(realm);
            }
            rt.maybe_gc();
            let this = rt.create_this(callee, new_target);
            rt.set_current_realm(caller_realm);
            Value::object(this)
        }
        MirOp::CreateThisWithTemplate { callee, template, same_realm } => {
            let callee = object(v(*callee));
            let caller_realm = rt.current_realm();
            if !*same_realm {
                let realm = object_realm(rt, callee);
                rt.set_current_realm(realm);
            }
            rt.maybe_gc();
            let this = rt.create_this_from_template(*template);
            rt.set_current_realm(caller_realm);
            Value::object(this)
        }
        MirOp::Call(call) => {
            let args = call.args.iter().map(|&arg| v(arg)).collect();
            let new_target = call.new_target.map(v);
            invoke(rt, resume_pc(block, ins), call_shape(call), v(call.callee), v(call.this), args, new_target)?
        }
        MirOp::ApplyArray { callee, array, this, target, same_realm } => {
            let args = rt.object(object(v(*array))).elements.values.clone();
            let shape = CallShape { target: *target, constructing: false, same_realm: *same_realm };
            invoke(rt, resume_pc(block, ins), shape, v(*callee), v(*this), args, None)?
        }
        MirOp::ConstructArray { callee, array, this, new_target, target, same_realm } => {
            let args = rt.object(object(v(*array))).elements.values.clone();
            let shape = CallShape { target: *target, constructing: true, same_realm: *same_realm };
            invoke(rt, resume_pc(block, ins), shape, v(*callee), v(*this), args, Some(v(*new_target)))?
        }
    };
    Ok(Some(value))
}

fn int32_arith(op: &MirOp, a: i32, b: i32) -> Option<i32> {
    match op {
        MirOp::Add { .. } => a.checked_add(b),
        MirOp::Sub { .. } => a.checked_sub(b),
        MirOp::Mul { .. } => {
            let product = a.checked_mul(b)?;
            // -0 is not an int32.
            (product != 0 || (a | b) >= 0).then_some(product)
        }
        MirOp::Div { .. } => {
            if b == 0 || (a == 0 && b < 0) || (a == i32::MIN && b == -1) || a % b != 0 {
                return None;
            }
            Some(a / b)
        }
        MirOp::Mod { .. } => {
            if b == 0 {
                return None;
            }
            let r = a.checked_rem(b).unwrap_or(0);
            (r != 0 || a >= 0).then_some(r)
        }
        other => panic!("{} is not int32 arithmetic", other.name()),
    }
}

fn compare(rt: &Runtime, op: JSOp, compare_type: CompareType, lhs: Value, rhs: Value) -> bool {
    match compare_type {
        CompareType::Int32 => Condition::from_js_op(op).eval32(int32(lhs) as u32, int32(rhs) as u32),
        CompareType::Double => DoubleCondition::from_js_op(op).eval(number(lhs), number(rhs)),
        CompareType::String => op.eval(Some(rt.compare_strings(string(lhs), string(rhs)))),
        CompareType::Object | CompareType::Symbol => {
            Condition::from_js_op(op).eval64(lhs.payload(), rhs.payload())
        }
        CompareType::Null | CompareType::Undefined => {
            let matched = match op {
                JSOp::StrictEq | JSOp::StrictNe => {
                    let ty = if compare_type == CompareType::Undefined {
                        ValueType::Undefined
                    } else {
                        ValueType::Null
                    };
                    lhs.value_type() == ty
                }
                JSOp::Eq | JSOp::Ne => lhs.is_null_or_undefined(),
                other => panic!("null/undefined comparison with {other:?}"),
            };
            matched == op.is_equality()
        }
    }
}

fn store_slot(rt: &mut Runtime, obj: ObjectId, offset: u32, value: Value, kind: SlotKind) {
    match kind {
        SlotKind::Fixed => {
            let old = rt.load_fixed_slot(obj, offset);
            rt.gc.pre_write_barrier(old);
            rt.store_fixed_slot(obj, offset, value);
        }
        SlotKind::Dynamic => {
            let old = rt.load_dynamic_slot(obj, offset);
            rt.gc.pre_write_barrier(old);
            rt.store_dynamic_slot(obj, offset, value);
        }
    }
}

fn store_element(rt: &mut Runtime, obj: ObjectId, index: u32, value: Value) {
    let old = rt
        .dense_element(obj, index)
        .unwrap_or_else(|| panic!("store to element {index} past the initialized length"));
    rt.gc.pre_write_barrier(old);
    rt.object_mut(obj).elements.values[index as usize] = value;
}

#[derive(Clone, Copy)]
struct CallShape {
    target: CallTargetKind,
    constructing: bool,
    same_realm: bool,
}

fn call_shape(call: &MCall) -> CallShape {
    CallShape {
        target: call.target,
        constructing: call.constructing,
        same_realm: call.same_realm,
    }
}

/// Enter `callee` the way a JIT call does: under a Warp frame, in the
/// callee's realm, rectified for scripted callees. A constructor returning
/// a primitive yields `this`.
fn invoke(
    rt: &mut Runtime,
    resume_pc: u32,
    shape: CallShape,
    callee: Value,
    this: Value,
    args: Vec<Value>,
    new_target: Option<Value>,
) -> VmResult<Value> {
    let callee = object(callee);
    let mut call = CallArgs::new(callee, this, args);
    call.new_target = new_target;
    let realm_of = (!shape.same_realm).then_some(callee);
    let result = call_out(rt, resume_pc, realm_of, |rt| match shape.target {
        CallTargetKind::Scripted => {
            let nargs = rt.function(callee).map_or(0, |f| f.nargs as usize);
            call.rectify(nargs);
            rt.enter_function(callee, &call)
        }
        CallTargetKind::Native | CallTargetKind::Dom => {
            rt.maybe_gc();
            rt.enter_function(callee, &call)
        }
    })?;
    Ok(if shape.constructing && !result.is_object() { this } else { result })
}

#[cfg(test)]
mod tests {
    use otter_vm_core::ShapeId;

    use super::*;

    fn block_with(kind: CacheKind, inputs: u32) -> (MirGraph, BlockId, Vec<MDefinitionId>) {
        let mut graph = MirGraph::new(64);
        let block = graph.new_block(11, kind).unwrap();
        let defs = (0..inputs)
            .map(|_| graph.add_input(block, MirType::Value).unwrap())
            .collect();
        (graph, block, defs)
    }

    #[test]
    fn int32_add_bails_on_overflow() {
        let (mut graph, block, p) = block_with(CacheKind::BinaryArith, 2);
        let lhs = graph.add(block, MirOp::Unbox { input: p[0], ty: MirType::Int32 }, MirType::Int32).unwrap();
        let rhs = graph.add(block, MirOp::Unbox { input: p[1], ty: MirType::Int32 }, MirType::Int32).unwrap();
        let sum = graph
            .add(block, MirOp::Add { lhs, rhs, specialization: MirType::Int32 }, MirType::Int32)
            .unwrap();
        graph.block_mut(block).finish_op(Some(sum));

        let mut rt = Runtime::new();
        let mut interp = MirInterpreter::new(&graph);
        assert_eq!(
            interp.run_block(&mut rt, block, &[Value::int32(2), Value::int32(3)]).unwrap(),
            MirOutcome::Return(Value::int32(5))
        );
        let outcome = interp
            .run_block(&mut rt, block, &[Value::int32(i32::MAX), Value::int32(1)])
            .unwrap();
        assert_eq!(
            outcome,
            MirOutcome::Bailout { pc: 11, mode: ResumeMode::ResumeAt, kind: BailoutKind::Overflow }
        );
        assert_eq!(interp.bailouts().get(BailoutKind::Overflow), 1);
    }

    #[test]
    fn shape_guard_bails_to_entry() {
        let (mut graph, block, p) = block_with(CacheKind::GetProp, 1);
        let mut rt = Runtime::new();
        let obj = rt.new_object(None);
        let obj_def = graph.add(block, MirOp::Unbox { input: p[0], ty: MirType::Object }, MirType::Object).unwrap();
        graph
            .add(block, MirOp::GuardShape { obj: obj_def, shape: ShapeId::new(u32::MAX) }, MirType::Object)
            .unwrap();
        graph.block_mut(block).finish_op(None);

        let mut interp = MirInterpreter::new(&graph);
        let outcome = interp.run_block(&mut rt, block, &[Value::object(obj)]).unwrap();
        assert!(matches!(outcome, MirOutcome::Bailout { kind: BailoutKind::Shape, mode: ResumeMode::ResumeAt, .. }));
        let outcome = interp.run_block(&mut rt, block, &[Value::int32(1)]).unwrap();
        assert!(matches!(outcome, MirOutcome::Bailout { kind: BailoutKind::Type, .. }));
    }

    #[test]
    fn int32_division_requires_exact_quotient() {
        let (_, _, p) = block_with(CacheKind::BinaryArith, 2);
        let div = MirOp::Div { lhs: p[0], rhs: p[1], specialization: MirType::Int32 };
        assert_eq!(int32_arith(&div, 12, 4), Some(3));
        assert_eq!(int32_arith(&div, 7, 2), None);
        assert_eq!(int32_arith(&div, 0, -3), None);
        assert_eq!(int32_arith(&div, i32::MIN, -1), None);
        assert_eq!(int32_arith(&div, 1, 0), None);

        let rem = MirOp::Mod { lhs: p[0], rhs: p[1], specialization: MirType::Int32 };
        assert_eq!(int32_arith(&rem, 7, 3), Some(1));
        assert_eq!(int32_arith(&rem, -6, 3), None);
        assert_eq!(int32_arith(&rem, i32::MIN, -1), None);
    }

    #[test]
    fn null_comparisons() {
        let rt = Runtime::new();
        assert!(compare(&rt, JSOp::Eq, CompareType::Null, Value::UNDEFINED, Value::NULL));
        assert!(!compare(&rt, JSOp::StrictEq, CompareType::Null, Value::UNDEFINED, Value::NULL));
        assert!(compare(&rt, JSOp::StrictNe, CompareType::Undefined, Value::int32(0), Value::UNDEFINED));
    }

    #[test]
    fn call_inputs_are_frame_words() {
        let callee = Value::object(ObjectId::new(4));
        let inputs = ICInputs::call(callee, Value::UNDEFINED, &[Value::int32(1)], None);
        let values = MirInterpreter::inputs_from_ic(CacheKind::Call, &inputs);
        assert_eq!(values.as_slice(), &[callee, Value::UNDEFINED, Value::int32(1)]);

        let inputs = ICInputs::new(CacheKind::SetElem, &[Value::NULL, Value::TRUE, Value::int32(9)]);
        let values = MirInterpreter::inputs_from_ic(CacheKind::SetElem, &inputs);
        assert_eq!(values.as_slice(), &[Value::NULL, Value::TRUE, Value::int32(9)]);
    }
}
