//! Inline Cache (IC) Performance Benchmarks
//!
//! Property reads through Baseline stub chains of different lengths, the
//! same site through a transpiled Warp block, and transpilation itself.

use criterion::{Criterion, criterion_group, criterion_main};
use otter_cacheir::{CacheIRWriter, CacheKind};
use otter_vm_core::{ObjectId, Runtime, SlotLocation, Value};
use otter_vm_jit::{ICInputs, ICScript, JitOptions, JitZone, attach_baseline_cache_ir_stub};
use otter_warp::{MirInterpreter, WarpBuilder, WarpOptions, WarpOracle};
use std::hint::black_box;

const PC: u32 = 1;

/// `{ <prefix>: 0, x: value }`, and the byte offset of `x`.
fn object(rt: &mut Runtime, prefix: Option<&str>, value: i32) -> (ObjectId, u32) {
    let obj = rt.new_object(None);
    if let Some(name) = prefix {
        let key = rt.atom_key(name);
        rt.define_property(obj, key, Value::int32(0));
    }
    let x = rt.atom_key("x");
    rt.define_property(obj, x, Value::int32(value));
    match rt.slot_location(obj, x) {
        Some(SlotLocation::Fixed(offset)) => (obj, offset),
        other => panic!("x stored at {other:?}"),
    }
}

fn get_x(rt: &Runtime, obj: ObjectId, offset: u32) -> CacheIRWriter {
    let mut w = CacheIRWriter::new(CacheKind::GetProp);
    let o = w.guard_to_object(w.input_val(0));
    w.guard_shape(o, rt.shape_of(obj));
    w.load_fixed_slot_result(o, offset);
    w.return_from_ic();
    w
}

/// A GetProp site with one stub per object, in order.
fn site(rt: &mut Runtime, prefixes: &[Option<&str>]) -> (JitZone, ICScript, Vec<ObjectId>) {
    let zone = JitZone::new(JitOptions::default().with_type_inference(false));
    let mut script = ICScript::new(&[(CacheKind::GetProp, PC)], None);
    let mut objects = Vec::new();
    for (i, prefix) in prefixes.iter().enumerate() {
        let (obj, offset) = object(rt, *prefix, i as i32);
        let writer = get_x(rt, obj, offset);
        assert!(attach_baseline_cache_ir_stub(&zone, &mut script, 0, &writer, None).is_attached());
        objects.push(obj);
    }
    (zone, script, objects)
}

/// Benchmark: Monomorphic property access (first stub hits)
fn bench_monomorphic_property_access(c: &mut Criterion) {
    let mut rt = Runtime::new();
    let (_zone, script, objects) = site(&mut rt, &[None]);
    let inputs = ICInputs::new(CacheKind::GetProp, &[Value::object(objects[0])]);

    c.bench_function("ic_monomorphic_1000_reads", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                black_box(script.fallback(0).run(&mut rt, black_box(&inputs)).unwrap());
            }
        });
    });
}

/// Benchmark: Polymorphic property access (reads walk a three-stub chain)
fn bench_polymorphic_property_access(c: &mut Criterion) {
    let mut rt = Runtime::new();
    let (_zone, script, objects) = site(&mut rt, &[None, Some("a"), Some("b")]);
    let inputs: Vec<_> = objects
        .iter()
        .map(|&obj| ICInputs::new(CacheKind::GetProp, &[Value::object(obj)]))
        .collect();

    c.bench_function("ic_polymorphic_1000_reads", |b| {
        b.iter(|| {
            for i in 0..1000 {
                let inputs = &inputs[i % inputs.len()];
                black_box(script.fallback(0).run(&mut rt, black_box(inputs)).unwrap());
            }
        });
    });
}

/// Benchmark: the monomorphic site transpiled and run by the MIR interpreter
fn bench_warp_property_access(c: &mut Criterion) {
    let mut rt = Runtime::new();
    let (_zone, script, objects) = site(&mut rt, &[None]);
    let snapshot = WarpOracle::new(&script).create_snapshot();
    let compilation = WarpBuilder::new(WarpOptions::default()).build(&snapshot).unwrap();
    let block = compilation.block_for(PC).unwrap();
    let params = [Value::object(objects[0])];

    c.bench_function("warp_monomorphic_1000_reads", |b| {
        b.iter(|| {
            let mut interpreter = MirInterpreter::new(compilation.graph());
            for _ in 0..1000 {
                black_box(interpreter.run_block(&mut rt, block, black_box(&params)).unwrap());
            }
        });
    });
}

/// Benchmark: snapshot and transpile one site
fn bench_transpile(c: &mut Criterion) {
    let mut rt = Runtime::new();
    let (_zone, script, _) = site(&mut rt, &[None]);
    let builder = WarpBuilder::new(WarpOptions::default());

    c.bench_function("warp_snapshot_and_build", |b| {
        b.iter(|| {
            let snapshot = WarpOracle::new(black_box(&script)).create_snapshot();
            black_box(builder.build(&snapshot).unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_monomorphic_property_access,
    bench_polymorphic_property_access,
    bench_warp_property_access,
    bench_transpile
);
criterion_main!(benches);
