//! Shared fixtures: one IC site compiled by both tiers.

#![allow(dead_code)]

use otter_cacheir::{CacheIRWriter, CacheKind};
use otter_vm_core::{ObjectId, Runtime, SlotLocation, Value, VmResult};
use otter_vm_jit::{ICInputs, ICOutcome, ICScript, JitOptions, JitZone, attach_baseline_cache_ir_stub};
use otter_warp::{
    CallSite, MirInterpreter, MirOutcome, WarpBuilder, WarpCompilation, WarpOptions, WarpOracle,
};
use tracing_subscriber::filter::EnvFilter;

/// Bytecode offset of the site under test.
pub const PC: u32 = 7;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A script with one site holding one Baseline stub, and the Warp
/// compilation of its snapshot.
pub struct BothTiers {
    pub zone: JitZone,
    pub script: ICScript,
    pub compilation: WarpCompilation,
    pub kind: CacheKind,
}

impl BothTiers {
    pub fn new(writer: &CacheIRWriter, call_site: Option<CallSite>) -> Self {
        init_tracing();
        let kind = writer.kind();
        let zone = JitZone::new(JitOptions::default().with_type_inference(false));
        let mut script = ICScript::new(&[(kind, PC)], None);
        let attached = attach_baseline_cache_ir_stub(&zone, &mut script, 0, writer, None);
        assert!(attached.is_attached(), "{attached:?}");

        let mut oracle = WarpOracle::new(&script);
        if let Some(site) = call_site {
            oracle = oracle.with_call_site(PC, site);
            if site.inlined {
                oracle = oracle.with_inlined_call(PC);
            }
        }
        let snapshot = oracle.create_snapshot();
        let compilation = WarpBuilder::new(WarpOptions::default().with_background(false))
            .build(&snapshot)
            .unwrap();
        Self { zone, script, compilation, kind }
    }

    pub fn baseline(&self, rt: &mut Runtime, inputs: &ICInputs) -> VmResult<ICOutcome> {
        self.script.fallback(0).run(rt, inputs)
    }

    pub fn warp(&self, rt: &mut Runtime, inputs: &ICInputs) -> VmResult<MirOutcome> {
        let block = self.compilation.block_for(PC).unwrap();
        let params = MirInterpreter::inputs_from_ic(self.kind, inputs);
        MirInterpreter::new(self.compilation.graph()).run_block(rt, block, &params)
    }
}

/// Whether the two tiers agree: a hit is a return of the same bits (a store
/// hit is a Warp block without a result), a fallback is a bailout.
pub fn agree(baseline: &VmResult<ICOutcome>, warp: &VmResult<MirOutcome>) -> bool {
    match (baseline, warp) {
        (Ok(ICOutcome::Hit { value, .. }), Ok(MirOutcome::Return(result))) => value.to_bits() == result.to_bits(),
        (Ok(ICOutcome::Hit { value, .. }), Ok(MirOutcome::NoResult)) => value.is_undefined(),
        (Ok(ICOutcome::Fallback), Ok(MirOutcome::Bailout { .. })) => true,
        (Err(a), Err(b)) => a.value.to_bits() == b.value.to_bits(),
        _ => false,
    }
}

/// A plain object with one property in a fixed slot.
pub fn object_with(rt: &mut Runtime, name: &str, value: Value) -> (ObjectId, u32) {
    let obj = rt.new_object(None);
    let key = rt.atom_key(name);
    rt.define_property(obj, key, value);
    let Some(SlotLocation::Fixed(offset)) = rt.slot_location(obj, key) else {
        panic!("{name} is not in a fixed slot");
    };
    (obj, offset)
}
