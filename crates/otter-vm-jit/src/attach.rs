//! Attaching Baseline stubs to IC chains.

use std::sync::Arc;

use otter_cacheir::{CacheIRStubInfo, CacheIRWriter, ICStubEngine};
use otter_vm_core::TypeKey;

use crate::compiler::BaselineCacheIRCompiler;
use crate::error::{JitError, JitResult};
use crate::ic::{ICScript, ICStub, STUB_HEADER_SIZE};
use crate::jit_zone::{CacheIRStubKey, CachedStubCode, JitZone};
use crate::masm::JitCode;

/// Result of [`attach_baseline_cache_ir_stub`].
#[derive(Debug, Clone)]
pub enum AttachOutcome {
    /// A new stub heads the chain.
    Attached {
        /// Code shared with every stub of the same program
        code: Arc<JitCode>,
        /// Stub data layout shared the same way
        info: Arc<CacheIRStubInfo>,
        /// Whether the code came from the zone cache
        cached: bool,
    },
    /// An identical stub is already attached; nothing changed.
    Duplicate,
    /// The stub could not be attached; the chain is unchanged.
    Failed(JitError),
}

impl AttachOutcome {
    /// Whether a stub was added.
    pub fn is_attached(&self) -> bool {
        matches!(self, AttachOutcome::Attached { .. })
    }
}

/// Compile (or reuse) the stub code for `writer`'s program and attach a stub
/// with a copy of its stub data at the head of the chain of fallback
/// `fallback_index`.
///
/// Stores pass the property or element `update_key` their type-update IC
/// records into.
pub fn attach_baseline_cache_ir_stub(
    zone: &JitZone,
    script: &mut ICScript,
    fallback_index: usize,
    writer: &CacheIRWriter,
    update_key: Option<TypeKey>,
) -> AttachOutcome {
    let kind = writer.kind();
    let pc = script.fallback(fallback_index).pc();
    match try_attach(zone, script, fallback_index, writer, update_key) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::debug!(target: "otter::ic", %kind, pc, error = %err, "attach failed");
            AttachOutcome::Failed(err)
        }
    }
}

fn lookup_or_compile(zone: &JitZone, writer: &CacheIRWriter) -> JitResult<(CachedStubCode, bool)> {
    let key = CacheIRStubKey::new(writer.kind(), ICStubEngine::Baseline, writer.code());
    if let Some(entry) = zone.get_baseline_code(&key) {
        return Ok((entry, true));
    }

    let ir = writer.validate()?;
    let code = BaselineCacheIRCompiler::new(&ir, *zone.options()).compile()?;
    let info = CacheIRStubInfo::new(
        ir.kind(),
        ICStubEngine::Baseline,
        code.makes_gc_calls(),
        ir.code(),
        ir.field_types(),
    );
    let entry = zone.put_baseline_code(
        key,
        CachedStubCode {
            code: Arc::new(code),
            info,
        },
    );
    Ok((entry, false))
}

fn try_attach(
    zone: &JitZone,
    script: &mut ICScript,
    fallback_index: usize,
    writer: &CacheIRWriter,
    update_key: Option<TypeKey>,
) -> JitResult<AttachOutcome> {
    let max = zone.options().max_stubs_per_fallback;
    let fallback = script.fallback(fallback_index);
    if fallback.num_stubs() >= max {
        return Err(JitError::ChainFull { pc: fallback.pc(), max });
    }

    let (entry, cached) = lookup_or_compile(zone, writer)?;
    let stub_data = writer.copy_stub_data();

    // Only reachable when the generator attaches for inputs an existing
    // stub already handles.
    let duplicate = fallback.stubs().iter().any(|stub| {
        Arc::ptr_eq(stub.stub_info(), &entry.info)
            && entry.info.stub_data_equals(stub.stub_data(), &stub_data)
    });
    if duplicate {
        tracing::debug!(
            target: "otter::ic",
            kind = %writer.kind(),
            pc = fallback.pc(),
            "duplicate stub not attached"
        );
        return Ok(AttachOutcome::Duplicate);
    }

    let bytes = STUB_HEADER_SIZE + stub_data.len();
    let (fallback, fallback_space) = script.split_mut(fallback_index);
    if entry.info.makes_gc_calls() {
        fallback_space.alloc(bytes)?;
    } else {
        zone.optimized_space().lock().alloc(bytes)?;
    }

    let stub = ICStub::new(
        Arc::clone(&entry.code),
        Arc::clone(&entry.info),
        stub_data.into_boxed_slice(),
        update_key,
    );
    fallback.insert_at_head(stub);
    fallback.reset_entered_counts();
    let invalidate = fallback.is_snapshotted();
    tracing::debug!(
        target: "otter::ic",
        kind = %writer.kind(),
        pc = fallback.pc(),
        stubs = fallback.num_stubs(),
        cached,
        "attached baseline stub"
    );
    if invalidate {
        script.invalidate_warp();
    }

    Ok(AttachOutcome::Attached {
        code: entry.code,
        info: entry.info,
        cached,
    })
}

#[cfg(test)]
mod tests {
    use otter_cacheir::{CacheKind, CacheIRWriter};
    use otter_vm_core::{ObjectId, Runtime, SlotLocation, Value};

    use super::*;
    use crate::ic::{ICInputs, ICOutcome};
    use crate::options::JitOptions;
    use crate::stub_space::StubSpaceKind;

    fn get_prop(rt: &Runtime, obj: ObjectId, offset: u32) -> CacheIRWriter {
        let mut w = CacheIRWriter::new(CacheKind::GetProp);
        let o = w.guard_to_object(w.input_val(0));
        w.guard_shape(o, rt.shape_of(obj));
        w.load_fixed_slot_result(o, offset);
        w.return_from_ic();
        w
    }

    fn object(rt: &mut Runtime, name: &str, value: i32) -> (ObjectId, u32) {
        let obj = rt.new_object(None);
        let key = rt.atom_key(name);
        rt.define_property(obj, key, Value::int32(value));
        let Some(SlotLocation::Fixed(offset)) = rt.slot_location(obj, key) else {
            panic!("expected a fixed slot");
        };
        (obj, offset)
    }

    fn script() -> ICScript {
        ICScript::new(&[(CacheKind::GetProp, 4), (CacheKind::SetProp, 9)], None)
    }

    #[test]
    fn same_program_shares_code() {
        let mut rt = Runtime::new();
        let (a, offset) = object(&mut rt, "a", 1);
        let (b, _) = object(&mut rt, "b", 2);
        let zone = JitZone::new(JitOptions::default());
        let mut script = script();

        let first = attach_baseline_cache_ir_stub(&zone, &mut script, 0, &get_prop(&rt, a, offset), None);
        let second = attach_baseline_cache_ir_stub(&zone, &mut script, 0, &get_prop(&rt, b, offset), None);
        let (
            AttachOutcome::Attached { code: c1, info: i1, cached: false },
            AttachOutcome::Attached { code: c2, info: i2, cached: true },
        ) = (first, second)
        else {
            panic!("expected two attaches");
        };
        assert!(Arc::ptr_eq(&c1, &c2));
        assert!(Arc::ptr_eq(&i1, &i2));
        assert_eq!(zone.baseline_cache_len(), 1);

        let fallback = script.fallback(0);
        assert_eq!(fallback.num_stubs(), 2);
        assert!(Arc::ptr_eq(fallback.stubs()[0].code(), fallback.stubs()[1].code()));
        assert_eq!(fallback.stubs()[0].space(), StubSpaceKind::Optimized);
        assert_eq!(zone.optimized_space().lock().allocations(), 2);

        let outcome = fallback
            .run(&mut rt, &ICInputs::new(CacheKind::GetProp, &[Value::object(a)]))
            .unwrap();
        assert_eq!(outcome, ICOutcome::Hit { value: Value::int32(1), stub: 1 });
    }

    #[test]
    fn identical_stub_is_a_duplicate() {
        let mut rt = Runtime::new();
        let (a, offset) = object(&mut rt, "a", 1);
        let zone = JitZone::new(JitOptions::default());
        let mut script = script();
        let writer = get_prop(&rt, a, offset);
        assert!(attach_baseline_cache_ir_stub(&zone, &mut script, 0, &writer, None).is_attached());
        assert!(matches!(
            attach_baseline_cache_ir_stub(&zone, &mut script, 0, &writer, None),
            AttachOutcome::Duplicate
        ));
        assert_eq!(script.fallback(0).num_stubs(), 1);
    }

    #[test]
    fn full_chain_rejects_the_stub() {
        let mut rt = Runtime::new();
        let zone = JitZone::new(JitOptions {
            max_stubs_per_fallback: 1,
            ..JitOptions::default()
        });
        let mut script = script();
        let (a, offset) = object(&mut rt, "a", 1);
        let (b, _) = object(&mut rt, "b", 1);
        assert!(attach_baseline_cache_ir_stub(&zone, &mut script, 0, &get_prop(&rt, a, offset), None).is_attached());
        let outcome = attach_baseline_cache_ir_stub(&zone, &mut script, 0, &get_prop(&rt, b, offset), None);
        assert!(matches!(outcome, AttachOutcome::Failed(JitError::ChainFull { pc: 4, max: 1 })));
    }

    #[test]
    fn exhausted_space_fails_without_touching_the_chain() {
        let mut rt = Runtime::new();
        let zone = JitZone::new(JitOptions::default().with_stub_space_limit(Some(STUB_HEADER_SIZE)));
        let mut script = script();
        let (a, offset) = object(&mut rt, "a", 1);
        match attach_baseline_cache_ir_stub(&zone, &mut script, 0, &get_prop(&rt, a, offset), None) {
            AttachOutcome::Failed(err) => assert!(err.is_oom(), "{err}"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(script.fallback(0).num_stubs(), 0);
    }

    #[test]
    fn attach_resets_counts_and_invalidates_snapshots() {
        let mut rt = Runtime::new();
        let zone = JitZone::new(JitOptions::default());
        let mut script = script();
        let (a, offset) = object(&mut rt, "a", 1);
        let (b, _) = object(&mut rt, "b", 2);
        assert!(attach_baseline_cache_ir_stub(&zone, &mut script, 0, &get_prop(&rt, a, offset), None).is_attached());

        let miss = ICInputs::new(CacheKind::GetProp, &[Value::object(b)]);
        script.fallback(0).run(&mut rt, &miss).unwrap();
        assert_eq!(script.fallback(0).entered_count(), 1);
        assert_eq!(script.fallback(0).stubs()[0].entered_count(), 1);
        script.fallback(0).mark_snapshotted();

        assert!(attach_baseline_cache_ir_stub(&zone, &mut script, 0, &get_prop(&rt, b, offset), None).is_attached());
        let fallback = script.fallback(0);
        assert_eq!(fallback.entered_count(), 0);
        assert!(fallback.stubs().iter().all(|stub| stub.entered_count() == 0));
        assert!(script.warp_invalidated());
        assert!(!script.fallback(1).is_snapshotted());
    }
}
