//! Structural guarantees of transpiled blocks.

mod common;

use common::{BothTiers, PC, object_with};
use otter_cacheir::stub_info::write_stub_word;
use otter_cacheir::{ArgFormat, CacheIRStubInfo, CacheIRWriter, CacheKind, CallFlags, GuardClassKind, ICStubEngine};
use otter_vm_core::{ObjectId, Runtime, Value};
use otter_vm_jit::{ICInputs, ICOutcome};
use otter_warp::{
    BailoutKind, CallSite, MirOutcome, ResumeMode, WarpBuilder, WarpCacheIR, WarpOpSnapshot, WarpOptions,
    WarpSnapshot,
};

fn slot_store(rt: &Runtime, obj: ObjectId, offset: u32) -> CacheIRWriter {
    let mut w = CacheIRWriter::new(CacheKind::SetProp);
    let o = w.guard_to_object(w.input_val(0));
    w.guard_shape(o, rt.shape_of(obj));
    w.store_fixed_slot(o, offset, w.input_val(1));
    w.return_from_ic();
    w
}

#[test]
fn failed_guard_leaves_no_trace() {
    let mut rt = Runtime::new();
    let old = rt.string_value("old");
    let (obj, offset) = object_with(&mut rt, "x", old);
    let (other, _) = object_with(&mut rt, "y", Value::int32(5));
    let tiers = BothTiers::new(&slot_store(&rt, obj, offset), None);
    rt.gc.incremental_marking = true;

    let miss = ICInputs::new(CacheKind::SetProp, &[Value::object(other), Value::int32(9)]);
    assert_eq!(
        tiers.warp(&mut rt, &miss).unwrap(),
        MirOutcome::Bailout { pc: PC, mode: ResumeMode::ResumeAt, kind: BailoutKind::Shape }
    );
    assert_eq!(rt.load_fixed_slot(other, offset), Value::int32(5));
    assert_eq!(rt.load_fixed_slot(obj, offset), old);
    assert!(rt.gc.pre_barrier_log().is_empty());

    let hit = ICInputs::new(CacheKind::SetProp, &[Value::object(obj), Value::int32(9)]);
    assert_eq!(tiers.warp(&mut rt, &hit).unwrap(), MirOutcome::NoResult);
    assert_eq!(rt.gc.pre_barrier_log(), &[old]);
    assert_eq!(rt.load_fixed_slot(obj, offset), Value::int32(9));
}

#[test]
fn guards_precede_the_effect() {
    let mut rt = Runtime::new();
    let (obj, offset) = object_with(&mut rt, "x", Value::int32(1));
    let callee = rt.new_scripted_function(1, |_, _| Ok(Value::UNDEFINED));

    let mut push = CacheIRWriter::new(CacheKind::SetProp);
    let o = push.guard_to_object(push.input_val(0));
    push.guard_class(o, GuardClassKind::Array);
    push.array_push(o, push.input_val(1));
    push.return_from_ic();

    let mut call = CacheIRWriter::new(CacheKind::Call);
    let argc = call.input_argc();
    let callee_val = call.load_argument_fixed_slot(2);
    let callee_obj = call.guard_to_object(callee_val);
    call.guard_specific_function(callee_obj, callee, 0);
    call.call_scripted_function(callee_obj, argc, CallFlags::new(ArgFormat::Standard));
    call.type_monitor_result();

    let programs = [
        (slot_store(&rt, obj, offset), None),
        (push, None),
        (call, Some(CallSite::new(1, false))),
    ];
    for (writer, call_site) in &programs {
        let tiers = BothTiers::new(writer, *call_site);
        let block = tiers.compilation.block(PC).unwrap();
        let instructions = block.instructions();
        let effect = instructions.iter().position(|ins| ins.is_effectful()).unwrap();
        assert_eq!(block.num_effectful(), 1);
        assert!(
            instructions[effect + 1..].iter().all(|ins| !ins.is_guard()),
            "{}: guard after the effect",
            writer.kind()
        );
        assert_eq!(instructions[effect].resume_point().map(|rp| rp.mode), Some(ResumeMode::ResumeAfter));
    }
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "more than one effectful")]
fn second_effect_is_rejected() {
    let mut w = CacheIRWriter::new(CacheKind::SetProp);
    let o = w.guard_to_object(w.input_val(0));
    w.store_fixed_slot(o, 16, w.input_val(1));
    w.store_fixed_slot(o, 24, w.input_val(1));
    w.return_from_ic();

    let kind = w.kind();
    let site = WarpCacheIR {
        pc: PC,
        kind,
        stub_info: CacheIRStubInfo::new(kind, ICStubEngine::Baseline, false, w.code(), &w.stub_field_types()),
        stub_data: w.copy_stub_data().into_boxed_slice(),
        call_site: None,
    };
    let snapshot = WarpSnapshot { sites: vec![WarpOpSnapshot::CacheIR(site)] };
    let _ = WarpBuilder::new(WarpOptions::default()).build(&snapshot);
}

#[test]
fn snapshot_data_is_isolated_from_the_live_stub() {
    let mut rt = Runtime::new();
    let (a, offset) = object_with(&mut rt, "x", Value::int32(1));
    let (b, b_offset) = object_with(&mut rt, "y", Value::int32(2));
    assert_eq!(offset, b_offset);

    let mut w = CacheIRWriter::new(CacheKind::GetProp);
    let o = w.guard_to_object(w.input_val(0));
    w.guard_shape(o, rt.shape_of(a));
    w.load_fixed_slot_result(o, offset);
    w.return_from_ic();
    let mut tiers = BothTiers::new(&w, None);

    let new_shape = rt.shape_of(b).index() as u64;
    let stub = tiers.script.fallback_mut(0).stub_mut(0).unwrap();
    write_stub_word(stub.stub_data_mut(), 0, new_shape);

    let get = |v: ObjectId| ICInputs::new(CacheKind::GetProp, &[Value::object(v)]);
    assert_eq!(
        tiers.baseline(&mut rt, &get(b)).unwrap(),
        ICOutcome::Hit { value: Value::int32(2), stub: 0 }
    );
    assert_eq!(tiers.baseline(&mut rt, &get(a)).unwrap(), ICOutcome::Fallback);
    assert_eq!(tiers.warp(&mut rt, &get(a)).unwrap(), MirOutcome::Return(Value::int32(1)));
    assert!(tiers.warp(&mut rt, &get(b)).unwrap().is_bailout());
}

fn report_reentry_pc(rt: &mut Runtime) -> ObjectId {
    rt.new_native_function(0, |rt, _| Ok(Value::int32(rt.reentry_pc().map_or(-1, |pc| pc as i32))))
}

#[test]
fn native_call_sees_the_site_pc() {
    let mut rt = Runtime::new();
    let native = report_reentry_pc(&mut rt);
    let mut w = CacheIRWriter::new(CacheKind::Call);
    let argc = w.input_argc();
    let callee_val = w.load_argument_fixed_slot(1);
    let callee = w.guard_to_object(callee_val);
    w.guard_specific_function(callee, native, 0);
    w.call_native_function(callee, argc, CallFlags::new(ArgFormat::Standard));
    w.type_monitor_result();
    let tiers = BothTiers::new(&w, Some(CallSite::new(0, false)));

    let inputs = ICInputs::call(Value::object(native), Value::UNDEFINED, &[], None);
    let pc = Value::int32(PC as i32);
    assert_eq!(tiers.baseline(&mut rt, &inputs).unwrap(), ICOutcome::Hit { value: pc, stub: 0 });
    assert_eq!(tiers.warp(&mut rt, &inputs).unwrap(), MirOutcome::Return(pc));
    assert_eq!(rt.reentry_pc(), None);
}

#[test]
fn native_getter_sees_the_site_pc() {
    let mut rt = Runtime::new();
    let getter = report_reentry_pc(&mut rt);
    let (obj, _) = object_with(&mut rt, "x", Value::int32(1));
    let mut w = CacheIRWriter::new(CacheKind::GetProp);
    let o = w.guard_to_object(w.input_val(0));
    w.guard_shape(o, rt.shape_of(obj));
    w.call_native_getter_result(w.input_val(0), getter, true, 0);
    w.type_monitor_result();
    let tiers = BothTiers::new(&w, None);

    let inputs = ICInputs::new(CacheKind::GetProp, &[Value::object(obj)]);
    let pc = Value::int32(PC as i32);
    assert_eq!(tiers.baseline(&mut rt, &inputs).unwrap(), ICOutcome::Hit { value: pc, stub: 0 });
    assert_eq!(tiers.warp(&mut rt, &inputs).unwrap(), MirOutcome::Return(pc));
    assert!(rt.frames().is_empty());
}
