//! Snapshots of Baseline IC chains
//!
//! Warp never reads a live [`ICScript`]. The [`WarpOracle`] copies what it
//! needs on the main thread: for a monomorphic site, the stub's shared
//! [`CacheIRStubInfo`] and a private copy of its stub data. Everything in a
//! [`WarpSnapshot`] is immutable and `Send`, so compilation can run on the
//! compile-queue worker while the Baseline chains keep changing.

use std::sync::Arc;

use otter_cacheir::{CacheIRStubInfo, CacheKind, CacheOp, ValidatedCacheIR};
use otter_vm_jit::{ICFallbackStub, ICScript};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Shape of a call IC execution: what its caller pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CallSite {
    /// Number of arguments pushed (1 for a spread call: the array)
    pub argc: u32,
    /// `new` call; the new target is pushed last
    pub constructing: bool,
    /// The oracle inlines the callee: the site's `CallInlinedFunction`
    /// emits no call and the builder splices the callee's body in
    #[serde(default)]
    pub inlined: bool,
}

impl CallSite {
    /// A call site that is not inlined.
    pub const fn new(argc: u32, constructing: bool) -> Self {
        Self { argc, constructing, inlined: false }
    }
}

/// One monomorphic IC site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarpCacheIR {
    /// Bytecode offset
    pub pc: u32,
    /// Cache kind
    pub kind: CacheKind,
    /// Program and stub-data layout, shared with the Baseline stub
    pub stub_info: Arc<CacheIRStubInfo>,
    /// Copy of the stub's data
    pub stub_data: Box<[u8]>,
    /// Operand shape of a call site
    pub call_site: Option<CallSite>,
}

impl WarpCacheIR {
    /// Copy the single stub of `fallback`.
    fn capture(fallback: &ICFallbackStub, call_site: Option<CallSite>) -> Option<Self> {
        let stub = fallback.stubs().first()?;
        Some(Self {
            pc: fallback.pc(),
            kind: fallback.kind(),
            stub_info: Arc::clone(stub.stub_info()),
            stub_data: stub.stub_data().into(),
            call_site,
        })
    }

    /// The CacheIR code bytes.
    pub fn code(&self) -> &[u8] {
        self.stub_info.code()
    }

    /// Whether the stub's effect is a `CallInlinedFunction`.
    fn calls_inlined_function(&self) -> bool {
        ValidatedCacheIR::from_stub_info(&self.stub_info)
            .ok()
            .and_then(|ir| ir.summary().effect)
            .is_some_and(|(_, op)| op == CacheOp::CallInlinedFunction)
    }
}

/// What the oracle found at one IC site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarpOpSnapshot {
    /// Exactly one stub: transpiled.
    CacheIR(WarpCacheIR),
    /// The site never attached a stub; it stays a generic IC.
    NoStubs {
        /// Bytecode offset
        pc: u32,
        /// Cache kind
        kind: CacheKind,
    },
    /// Several stubs; left to the generic IC.
    Polymorphic {
        /// Bytecode offset
        pc: u32,
        /// Cache kind
        kind: CacheKind,
        /// Chain length
        num_stubs: usize,
    },
}

impl WarpOpSnapshot {
    /// Bytecode offset of the site.
    pub fn pc(&self) -> u32 {
        match self {
            WarpOpSnapshot::CacheIR(ir) => ir.pc,
            WarpOpSnapshot::NoStubs { pc, .. } | WarpOpSnapshot::Polymorphic { pc, .. } => *pc,
        }
    }

    /// Cache kind of the site.
    pub fn kind(&self) -> CacheKind {
        match self {
            WarpOpSnapshot::CacheIR(ir) => ir.kind,
            WarpOpSnapshot::NoStubs { kind, .. } | WarpOpSnapshot::Polymorphic { kind, .. } => *kind,
        }
    }

    /// The transpilable snapshot, if monomorphic.
    pub fn as_cache_ir(&self) -> Option<&WarpCacheIR> {
        match self {
            WarpOpSnapshot::CacheIR(ir) => Some(ir),
            _ => None,
        }
    }
}

/// Snapshot of every IC site of a script.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WarpSnapshot {
    /// Sites in script order
    pub sites: Vec<WarpOpSnapshot>,
}

impl WarpSnapshot {
    /// Number of monomorphic sites.
    pub fn num_cache_ir(&self) -> usize {
        self.sites.iter().filter(|s| s.as_cache_ir().is_some()).count()
    }

    /// Site at `pc`.
    pub fn site(&self, pc: u32) -> Option<&WarpOpSnapshot> {
        self.sites.iter().find(|s| s.pc() == pc)
    }
}

/// Builds a [`WarpSnapshot`] from a script's IC chains.
pub struct WarpOracle<'a> {
    script: &'a ICScript,
    call_sites: FxHashMap<u32, CallSite>,
    inline_requests: FxHashSet<u32>,
}

impl<'a> WarpOracle<'a> {
    /// Oracle over `script`.
    pub fn new(script: &'a ICScript) -> Self {
        Self {
            script,
            call_sites: FxHashMap::default(),
            inline_requests: FxHashSet::default(),
        }
    }

    /// Record the operand shape of the call site at `pc`.
    pub fn with_call_site(mut self, pc: u32, site: CallSite) -> Self {
        self.call_sites.insert(pc, site);
        self
    }

    /// Inline the callee of the call site at `pc`. Honoured only when the
    /// site is monomorphic and its stub ends in `CallInlinedFunction`.
    pub fn with_inlined_call(mut self, pc: u32) -> Self {
        self.inline_requests.insert(pc);
        self
    }

    /// Capture every site. Re-arms the script's invalidation flag and marks
    /// each captured chain as a Warp dependency.
    pub fn create_snapshot(&self) -> WarpSnapshot {
        self.script.clear_warp_invalidated();
        let sites: Vec<WarpOpSnapshot> = self
            .script
            .fallbacks()
            .iter()
            .map(|fallback| self.snapshot_site(fallback))
            .collect();
        let snapshot = WarpSnapshot { sites };
        tracing::debug!(
            target: "otter::warp",
            sites = snapshot.sites.len(),
            monomorphic = snapshot.num_cache_ir(),
            "created snapshot"
        );
        snapshot
    }

    fn snapshot_site(&self, fallback: &ICFallbackStub) -> WarpOpSnapshot {
        let pc = fallback.pc();
        let kind = fallback.kind();
        match fallback.num_stubs() {
            0 => WarpOpSnapshot::NoStubs { pc, kind },
            1 => {
                let call_site = self.call_sites.get(&pc).copied();
                match WarpCacheIR::capture(fallback, call_site) {
                    Some(mut ir) => {
                        fallback.mark_snapshotted();
                        let inline = self.inline_requests.contains(&pc) && ir.calls_inlined_function();
                        if let Some(site) = ir.call_site.as_mut() {
                            site.inlined = inline;
                        }
                        if inline {
                            tracing::debug!(target: "otter::warp", pc, "inlining call");
                        }
                        WarpOpSnapshot::CacheIR(ir)
                    }
                    None => WarpOpSnapshot::NoStubs { pc, kind },
                }
            }
            num_stubs => WarpOpSnapshot::Polymorphic { pc, kind, num_stubs },
        }
    }
}

#[cfg(test)]
mod tests {
    use otter_cacheir::CacheIRWriter;
    use otter_vm_core::{ObjectId, Runtime, SlotLocation, Value};
    use otter_vm_jit::{JitOptions, JitZone, attach_baseline_cache_ir_stub};

    use super::*;

    fn get_prop(rt: &Runtime, obj: ObjectId, offset: u32) -> CacheIRWriter {
        let mut w = CacheIRWriter::new(CacheKind::GetProp);
        let o = w.guard_to_object(w.input_val(0));
        w.guard_shape(o, rt.shape_of(obj));
        w.load_fixed_slot_result(o, offset);
        w.return_from_ic();
        w
    }

    fn object(rt: &mut Runtime, name: &str) -> (ObjectId, u32) {
        let obj = rt.new_object(None);
        let key = rt.atom_key(name);
        rt.define_property(obj, key, Value::int32(1));
        let Some(SlotLocation::Fixed(offset)) = rt.slot_location(obj, key) else {
            panic!("expected a fixed slot");
        };
        (obj, offset)
    }

    #[test]
    fn oracle_classifies_sites() {
        let mut rt = Runtime::new();
        let (a, offset) = object(&mut rt, "a");
        let (b, _) = object(&mut rt, "b");
        let zone = JitZone::new(JitOptions::default());
        let mut script = ICScript::new(
            &[(CacheKind::GetProp, 2), (CacheKind::GetProp, 6), (CacheKind::Compare, 11)],
            None,
        );
        attach_baseline_cache_ir_stub(&zone, &mut script, 0, &get_prop(&rt, a, offset), None);
        attach_baseline_cache_ir_stub(&zone, &mut script, 1, &get_prop(&rt, a, offset), None);
        attach_baseline_cache_ir_stub(&zone, &mut script, 1, &get_prop(&rt, b, offset), None);

        let snapshot = WarpOracle::new(&script).create_snapshot();
        assert_eq!(snapshot.sites.len(), 3);
        assert_eq!(snapshot.num_cache_ir(), 1);
        assert!(matches!(snapshot.site(6), Some(WarpOpSnapshot::Polymorphic { num_stubs: 2, .. })));
        assert!(matches!(snapshot.site(11), Some(WarpOpSnapshot::NoStubs { kind: CacheKind::Compare, .. })));

        let ir = snapshot.site(2).and_then(WarpOpSnapshot::as_cache_ir).unwrap();
        let stub = &script.fallback(0).stubs()[0];
        assert!(Arc::ptr_eq(&ir.stub_info, stub.stub_info()));
        assert_eq!(&*ir.stub_data, stub.stub_data());
        assert!(script.fallback(0).is_snapshotted());
        assert!(!script.fallback(1).is_snapshotted());
    }

    #[test]
    fn attaching_after_a_snapshot_invalidates() {
        let mut rt = Runtime::new();
        let (a, offset) = object(&mut rt, "a");
        let (b, _) = object(&mut rt, "b");
        let zone = JitZone::new(JitOptions::default());
        let mut script = ICScript::new(&[(CacheKind::GetProp, 2)], None);
        attach_baseline_cache_ir_stub(&zone, &mut script, 0, &get_prop(&rt, a, offset), None);

        WarpOracle::new(&script).create_snapshot();
        assert!(!script.warp_invalidated());
        attach_baseline_cache_ir_stub(&zone, &mut script, 0, &get_prop(&rt, b, offset), None);
        assert!(script.warp_invalidated());

        WarpOracle::new(&script).create_snapshot();
        assert!(!script.warp_invalidated());
    }

    fn call_stub(inlined: bool) -> CacheIRWriter {
        let mut w = CacheIRWriter::new(CacheKind::Call);
        let argc = w.input_argc();
        let callee = w.load_argument_fixed_slot(1);
        let callee = w.guard_to_object(callee);
        w.guard_specific_function(callee, ObjectId::new(1), 0);
        let flags = otter_cacheir::CallFlags::new(otter_cacheir::ArgFormat::Standard);
        if inlined {
            w.call_inlined_function(callee, argc, 7, flags);
        } else {
            w.call_scripted_function(callee, argc, flags);
        }
        w.type_monitor_result();
        w
    }

    #[test]
    fn inline_requests_need_an_inlined_call_stub() {
        let zone = JitZone::new(JitOptions::default());
        let mut script = ICScript::new(&[(CacheKind::Call, 3), (CacheKind::Call, 9), (CacheKind::Call, 14)], None);
        attach_baseline_cache_ir_stub(&zone, &mut script, 0, &call_stub(true), None);
        attach_baseline_cache_ir_stub(&zone, &mut script, 1, &call_stub(false), None);
        attach_baseline_cache_ir_stub(&zone, &mut script, 2, &call_stub(true), None);

        let snapshot = WarpOracle::new(&script)
            .with_call_site(3, CallSite::new(0, false))
            .with_call_site(9, CallSite::new(0, false))
            .with_call_site(14, CallSite::new(0, false))
            .with_inlined_call(3)
            .with_inlined_call(9)
            .create_snapshot();
        let inlined = |pc| {
            snapshot
                .site(pc)
                .and_then(WarpOpSnapshot::as_cache_ir)
                .and_then(|ir| ir.call_site)
                .unwrap()
                .inlined
        };
        assert!(inlined(3));
        assert!(!inlined(9));
        assert!(!inlined(14));
    }

    #[test]
    fn snapshot_survives_serialization() {
        let mut rt = Runtime::new();
        let (a, offset) = object(&mut rt, "a");
        let zone = JitZone::new(JitOptions::default());
        let mut script = ICScript::new(&[(CacheKind::GetProp, 2), (CacheKind::Call, 5)], None);
        attach_baseline_cache_ir_stub(&zone, &mut script, 0, &get_prop(&rt, a, offset), None);
        let snapshot = WarpOracle::new(&script)
            .with_call_site(5, CallSite::new(2, true))
            .create_snapshot();

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: WarpSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
