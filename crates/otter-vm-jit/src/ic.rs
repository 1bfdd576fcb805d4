//! Inline-cache chains
//!
//! Every IC site of a script owns an [`ICFallbackStub`]. Attached stubs form
//! its chain, newest first. Running the IC tries each stub in turn with the
//! same machine state; a stub that fails its guards restores the inputs and
//! hands over to the next one. When none applies the fallback is reached
//! and the caller runs the generic operation (and may attach a new stub).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

use otter_cacheir::{CacheIRStubInfo, CacheKind};
use otter_vm_core::{Runtime, TypeFlags, TypeKey, Value, VmResult};
use smallvec::SmallVec;

use crate::masm::{JitCode, Register};
use crate::simulator::{StubEnv, StubExit, StubMachine};
use crate::stub_space::{StubSpace, StubSpaceKind};

/// Bytes accounted for a stub header, on top of its stub data.
pub const STUB_HEADER_SIZE: usize = 48;

// ---------------------------------------------------------------------------
// Stubs
// ---------------------------------------------------------------------------

/// One attached stub: shared code and layout plus its own stub data.
#[derive(Debug)]
pub struct ICStub {
    code: Arc<JitCode>,
    info: Arc<CacheIRStubInfo>,
    stub_data: Box<[u8]>,
    space: StubSpaceKind,
    entered_count: AtomicU32,
    accepted_types: AtomicU16,
    update_key: Option<TypeKey>,
}

impl ICStub {
    /// A stub over shared `code` and `info`.
    pub fn new(
        code: Arc<JitCode>,
        info: Arc<CacheIRStubInfo>,
        stub_data: Box<[u8]>,
        update_key: Option<TypeKey>,
    ) -> Self {
        let space = if info.makes_gc_calls() {
            StubSpaceKind::Fallback
        } else {
            StubSpaceKind::Optimized
        };
        Self {
            code,
            info,
            stub_data,
            space,
            entered_count: AtomicU32::new(0),
            accepted_types: AtomicU16::new(0),
            update_key,
        }
    }

    /// Stub code.
    pub fn code(&self) -> &Arc<JitCode> {
        &self.code
    }

    /// Shared stub-data layout.
    pub fn stub_info(&self) -> &Arc<CacheIRStubInfo> {
        &self.info
    }

    /// This stub's data.
    pub fn stub_data(&self) -> &[u8] {
        &self.stub_data
    }

    /// Mutable stub data. The code reads fields through loads, so changes
    /// take effect on the next run.
    pub fn stub_data_mut(&mut self) -> &mut [u8] {
        &mut self.stub_data
    }

    /// Space the stub was allocated in.
    pub fn space(&self) -> StubSpaceKind {
        self.space
    }

    /// Bytes accounted for this stub.
    pub fn alloc_size(&self) -> usize {
        STUB_HEADER_SIZE + self.stub_data.len()
    }

    /// Number of times the stub was entered since the chain last changed.
    pub fn entered_count(&self) -> u32 {
        self.entered_count.load(Ordering::Relaxed)
    }

    pub(crate) fn bump_entered_count(&self) {
        self.entered_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset_entered_count(&self) {
        self.entered_count.store(0, Ordering::Relaxed);
    }

    /// Property type set the stub's type-update check covers.
    pub fn update_key(&self) -> Option<TypeKey> {
        self.update_key
    }

    /// Types the inline type-update check accepts without a VM call.
    pub fn accepted_types(&self) -> TypeFlags {
        TypeFlags::from_bits_truncate(self.accepted_types.load(Ordering::Relaxed))
    }

    /// Whether a store of `value` passes the inline type-update check.
    pub fn accepts(&self, value: Value) -> bool {
        self.accepted_types().has_value(value)
    }

    /// Extend the accepted set with `value`'s type.
    pub fn accept_type(&self, value: Value) {
        self.accepted_types
            .fetch_or(TypeFlags::from_value(value).bits(), Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Operands of one IC execution: the input registers and the words the
/// caller pushes as frame slots.
#[derive(Debug, Clone, PartialEq)]
pub struct ICInputs {
    regs: SmallVec<[u64; 2]>,
    frame: SmallVec<[Value; 6]>,
}

impl ICInputs {
    /// Inputs of a non-call IC. The first two go in `R0`/`R1`, `SetElem`'s
    /// value in frame slot 0.
    pub fn new(kind: CacheKind, values: &[Value]) -> Self {
        debug_assert_eq!(values.len(), kind.num_inputs(), "{kind} input count");
        debug_assert_ne!(kind, CacheKind::Call, "use ICInputs::call");
        let split = values.len().min(2);
        Self {
            regs: values[..split].iter().map(|v| v.to_bits()).collect(),
            frame: values[split..].iter().copied().collect(),
        }
    }

    /// Inputs of a call IC: `argc` in `R0`, then callee, `this`, the
    /// arguments and `new.target` pushed in that order.
    pub fn call(callee: Value, this: Value, args: &[Value], new_target: Option<Value>) -> Self {
        let mut frame: SmallVec<[Value; 6]> = SmallVec::new();
        frame.push(callee);
        frame.push(this);
        frame.extend(args.iter().copied());
        frame.extend(new_target);
        Self {
            regs: SmallVec::from_slice(&[args.len() as u64]),
            frame,
        }
    }

    /// Input register words.
    pub fn regs(&self) -> &[u64] {
        &self.regs
    }

    /// Frame words, first pushed first.
    pub fn frame(&self) -> &[Value] {
        &self.frame
    }
}

/// Result of running an IC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ICOutcome {
    /// A stub applied
    Hit {
        /// Result value
        value: Value,
        /// Chain position of the stub, 0 being the newest
        stub: usize,
    },
    /// No stub applied; run the generic operation
    Fallback,
}

// ---------------------------------------------------------------------------
// Fallback stubs
// ---------------------------------------------------------------------------

/// The per-site fallback and its chain.
#[derive(Debug)]
pub struct ICFallbackStub {
    kind: CacheKind,
    pc: u32,
    stubs: Vec<ICStub>,
    entered_count: AtomicU32,
    monitored_types: AtomicU16,
    snapshotted: AtomicBool,
}

impl ICFallbackStub {
    /// Empty chain for an IC site.
    pub fn new(kind: CacheKind, pc: u32) -> Self {
        Self {
            kind,
            pc,
            stubs: Vec::new(),
            entered_count: AtomicU32::new(0),
            monitored_types: AtomicU16::new(0),
            snapshotted: AtomicBool::new(false),
        }
    }

    /// Cache kind.
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Bytecode offset of the IC site.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Attached stubs, newest first.
    pub fn stubs(&self) -> &[ICStub] {
        &self.stubs
    }

    /// Mutable stub at chain position `index`.
    pub fn stub_mut(&mut self, index: usize) -> Option<&mut ICStub> {
        self.stubs.get_mut(index)
    }

    /// Number of attached stubs.
    pub fn num_stubs(&self) -> usize {
        self.stubs.len()
    }

    /// Times the fallback was reached since the chain last changed.
    pub fn entered_count(&self) -> u32 {
        self.entered_count.load(Ordering::Relaxed)
    }

    /// Result types recorded by monitored stubs.
    pub fn monitored_types(&self) -> TypeFlags {
        TypeFlags::from_bits_truncate(self.monitored_types.load(Ordering::Relaxed))
    }

    pub(crate) fn record_monitored(&self, value: Value) {
        self.monitored_types
            .fetch_or(TypeFlags::from_value(value).bits(), Ordering::Relaxed);
    }

    /// Mark the chain as captured by a Warp snapshot.
    pub fn mark_snapshotted(&self) {
        self.snapshotted.store(true, Ordering::Relaxed);
    }

    /// Whether Warp code depends on this chain.
    pub fn is_snapshotted(&self) -> bool {
        self.snapshotted.load(Ordering::Relaxed)
    }

    pub(crate) fn insert_at_head(&mut self, stub: ICStub) {
        self.stubs.insert(0, stub);
    }

    pub(crate) fn reset_entered_counts(&self) {
        self.entered_count.store(0, Ordering::Relaxed);
        for stub in &self.stubs {
            stub.reset_entered_count();
        }
    }

    /// Run the chain on `inputs`.
    ///
    /// Machine registers are not reset between stubs: each stub must hand
    /// the inputs back exactly as it found them when its guards fail.
    pub fn run(&self, rt: &mut Runtime, inputs: &ICInputs) -> VmResult<ICOutcome> {
        let mut machine = StubMachine::new();
        for (i, word) in inputs.regs().iter().enumerate() {
            machine.set_reg(Register::new(i as u8), *word);
        }
        for value in inputs.frame() {
            machine.push(value.to_bits());
        }

        for (index, stub) in self.stubs.iter().enumerate() {
            let env = StubEnv {
                pc: self.pc,
                stub,
                fallback: self,
            };
            match machine.run(stub.code(), rt, &env)? {
                StubExit::Return(value) => {
                    tracing::trace!(target: "otter::ic", pc = self.pc, stub = index, "IC hit");
                    return Ok(ICOutcome::Hit { value, stub: index });
                }
                StubExit::Failure => {
                    debug_assert!(
                        inputs
                            .regs()
                            .iter()
                            .enumerate()
                            .all(|(i, w)| machine.reg(Register::new(i as u8)) == *w),
                        "stub {index} at pc {} did not restore its inputs",
                        self.pc
                    );
                }
            }
        }

        self.entered_count.fetch_add(1, Ordering::Relaxed);
        Ok(ICOutcome::Fallback)
    }
}

// ---------------------------------------------------------------------------
// Scripts
// ---------------------------------------------------------------------------

/// The IC sites of one script plus its fallback stub space.
#[derive(Debug)]
pub struct ICScript {
    fallbacks: Vec<ICFallbackStub>,
    fallback_space: StubSpace,
    warp_invalidated: AtomicBool,
}

impl ICScript {
    /// A script with one fallback per `(kind, pc)` site.
    pub fn new(sites: &[(CacheKind, u32)], fallback_space_limit: Option<usize>) -> Self {
        Self {
            fallbacks: sites
                .iter()
                .map(|&(kind, pc)| ICFallbackStub::new(kind, pc))
                .collect(),
            fallback_space: StubSpace::with_limit(fallback_space_limit),
            warp_invalidated: AtomicBool::new(false),
        }
    }

    /// Fallback of site `index`.
    pub fn fallback(&self, index: usize) -> &ICFallbackStub {
        &self.fallbacks[index]
    }

    /// Mutable fallback of site `index`.
    pub fn fallback_mut(&mut self, index: usize) -> &mut ICFallbackStub {
        &mut self.fallbacks[index]
    }

    /// Every fallback.
    pub fn fallbacks(&self) -> &[ICFallbackStub] {
        &self.fallbacks
    }

    /// Space holding the stubs that may collect.
    pub fn fallback_space(&self) -> &StubSpace {
        &self.fallback_space
    }

    pub(crate) fn split_mut(&mut self, index: usize) -> (&mut ICFallbackStub, &mut StubSpace) {
        (&mut self.fallbacks[index], &mut self.fallback_space)
    }

    /// Discard Warp code compiled from this script's chains.
    pub fn invalidate_warp(&self) {
        self.warp_invalidated.store(true, Ordering::Relaxed);
    }

    /// Whether Warp code for the script was invalidated.
    pub fn warp_invalidated(&self) -> bool {
        self.warp_invalidated.load(Ordering::Relaxed)
    }

    /// Re-arm after a fresh Warp compile.
    pub fn clear_warp_invalidated(&self) {
        self.warp_invalidated.store(false, Ordering::Relaxed);
        for fallback in &self.fallbacks {
            fallback.snapshotted.store(false, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_inputs_layout() {
        let inputs = ICInputs::call(
            Value::int32(100),
            Value::UNDEFINED,
            &[Value::int32(1), Value::int32(2)],
            None,
        );
        assert_eq!(inputs.regs(), &[2]);
        assert_eq!(inputs.frame().len(), 4);
        assert_eq!(inputs.frame()[3], Value::int32(2));
    }

    #[test]
    fn set_elem_value_goes_to_frame() {
        let inputs = ICInputs::new(
            CacheKind::SetElem,
            &[Value::NULL, Value::int32(0), Value::TRUE],
        );
        assert_eq!(inputs.regs().len(), 2);
        assert_eq!(inputs.frame(), &[Value::TRUE]);
    }

    #[test]
    fn empty_chain_reaches_fallback() {
        let mut rt = Runtime::new();
        let fallback = ICFallbackStub::new(CacheKind::GetProp, 7);
        let inputs = ICInputs::new(CacheKind::GetProp, &[Value::NULL]);
        assert_eq!(fallback.run(&mut rt, &inputs).unwrap(), ICOutcome::Fallback);
        assert_eq!(fallback.entered_count(), 1);
        fallback.reset_entered_counts();
        assert_eq!(fallback.entered_count(), 0);
    }

    #[test]
    fn script_invalidation_flag() {
        let script = ICScript::new(&[(CacheKind::GetProp, 0)], None);
        script.fallback(0).mark_snapshotted();
        assert!(script.fallback(0).is_snapshotted());
        script.invalidate_warp();
        assert!(script.warp_invalidated());
        script.clear_warp_invalidated();
        assert!(!script.fallback(0).is_snapshotted());
    }
}
