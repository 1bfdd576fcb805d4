//! Barrier bookkeeping for the generational, incremental collector
//!
//! Two barriers guard stores performed by stubs:
//! - Pre-write (deletion, Yuasa-style): while incremental marking is in
//!   progress, the value being overwritten is logged so it gets marked.
//! - Post-write (generational): when a tenured object is made to point at a
//!   nursery cell, the object is put in the whole-cell store buffer.
//!
//! Only the bookkeeping lives here; the collector itself is elsewhere.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::object::ObjectId;
use crate::value::Value;

/// Collector state visible to the mutator.
#[derive(Debug)]
pub struct GcState {
    /// Incremental marking is in progress
    pub incremental_marking: bool,
    /// New objects are allocated in the nursery
    pub nursery_allocation: bool,
    /// Collect the nursery at every GC-capable VM call
    pub zeal: bool,
    pre_barrier_log: Vec<Value>,
    store_buffer: FxHashSet<ObjectId>,
    minor_collections: u64,
    gc_capable_calls: u64,
}

impl Default for GcState {
    fn default() -> Self {
        Self {
            incremental_marking: false,
            nursery_allocation: true,
            zeal: false,
            pre_barrier_log: Vec::new(),
            store_buffer: FxHashSet::default(),
            minor_collections: 0,
            gc_capable_calls: 0,
        }
    }
}

impl GcState {
    /// Pre-write barrier on an overwritten value.
    #[inline]
    pub fn pre_write_barrier(&mut self, old: Value) {
        if self.incremental_marking && old.value_type().is_gc_thing() {
            self.pre_barrier_log.push(old);
        }
    }

    /// Record `holder` in the store buffer.
    #[inline]
    pub fn put_whole_cell(&mut self, holder: ObjectId) {
        self.store_buffer.insert(holder);
    }

    /// Whether `holder` is in the store buffer.
    pub fn store_buffer_contains(&self, holder: ObjectId) -> bool {
        self.store_buffer.contains(&holder)
    }

    /// Number of store-buffer entries.
    pub fn store_buffer_len(&self) -> usize {
        self.store_buffer.len()
    }

    /// Values logged by the pre-write barrier.
    pub fn pre_barrier_log(&self) -> &[Value] {
        &self.pre_barrier_log
    }

    /// Number of nursery collections so far.
    pub fn minor_collections(&self) -> u64 {
        self.minor_collections
    }

    /// Number of VM calls made that were allowed to collect.
    pub fn gc_capable_calls(&self) -> u64 {
        self.gc_capable_calls
    }

    pub(crate) fn note_gc_capable_call(&mut self) -> bool {
        self.gc_capable_calls += 1;
        self.zeal
    }

    pub(crate) fn finish_minor_gc(&mut self) {
        debug!(
            target: "otter::gc",
            store_buffer = self.store_buffer.len(),
            "minor collection"
        );
        self.store_buffer.clear();
        self.minor_collections += 1;
    }
}
