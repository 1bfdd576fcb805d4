//! Per-zone Baseline stub-code cache
//!
//! Two CacheIR programs with the same kind, engine and code bytes compile to
//! the same stub code; only their stub data differs. The zone keeps one
//! [`JitCode`] and one [`CacheIRStubInfo`] per distinct program and hands
//! out shared references to every stub attached from it.

use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use otter_cacheir::{CacheIRStubInfo, CacheKind, ICStubEngine};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::masm::JitCode;
use crate::options::JitOptions;
use crate::stub_space::StubSpace;

/// Cache key: compared and hashed by the raw CacheIR code bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheIRStubKey {
    kind: CacheKind,
    engine: ICStubEngine,
    code: Box<[u8]>,
}

impl CacheIRStubKey {
    /// Key for a program.
    pub fn new(kind: CacheKind, engine: ICStubEngine, code: &[u8]) -> Self {
        Self {
            kind,
            engine,
            code: code.into(),
        }
    }

    /// Key of the program described by `info`.
    pub fn for_info(info: &CacheIRStubInfo) -> Self {
        Self::new(info.kind(), info.engine(), info.code())
    }
}

/// Compiled code plus the layout it reads its stub data with.
#[derive(Debug, Clone)]
pub struct CachedStubCode {
    /// Linked stub code
    pub code: Arc<JitCode>,
    /// Stub data layout
    pub info: Arc<CacheIRStubInfo>,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoneStats {
    /// Lookups answered from the cache
    pub hits: usize,
    /// Lookups that required a compile
    pub misses: usize,
    /// Distinct programs cached
    pub entries: usize,
}

/// Zone-wide JIT state shared by every script of the zone.
#[derive(Debug)]
pub struct JitZone {
    options: JitOptions,
    baseline_cache: RwLock<FxHashMap<CacheIRStubKey, CachedStubCode>>,
    optimized_space: Mutex<StubSpace>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Default for JitZone {
    fn default() -> Self {
        Self::new(JitOptions::default())
    }
}

impl JitZone {
    /// An empty zone. The optimized stub space takes its limit from
    /// `options`.
    pub fn new(options: JitOptions) -> Self {
        Self {
            options,
            baseline_cache: RwLock::new(FxHashMap::default()),
            optimized_space: Mutex::new(StubSpace::with_limit(options.stub_space_limit)),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Options the zone's stubs are compiled with.
    pub fn options(&self) -> &JitOptions {
        &self.options
    }

    /// Look up the code compiled for `key`.
    pub fn get_baseline_code(&self, key: &CacheIRStubKey) -> Option<CachedStubCode> {
        let found = self.baseline_cache.read().get(key).cloned();
        match &found {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(target: "otter::ic", kind = %key.kind, "stub code cache hit");
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(target: "otter::ic", kind = %key.kind, "stub code cache miss");
            }
        }
        found
    }

    /// Insert freshly compiled code. Two threads may compile the same
    /// program between a miss and this call; the first entry stays and is
    /// returned to both, so every stub of a program shares one code object.
    pub fn put_baseline_code(&self, key: CacheIRStubKey, entry: CachedStubCode) -> CachedStubCode {
        match self.baseline_cache.write().entry(key) {
            Entry::Occupied(existing) => {
                tracing::debug!(
                    target: "otter::ic",
                    kind = %existing.key().kind,
                    "stub code compiled twice, keeping the cached entry"
                );
                existing.get().clone()
            }
            Entry::Vacant(slot) => slot.insert(entry).clone(),
        }
    }

    /// Number of distinct programs in the cache.
    pub fn baseline_cache_len(&self) -> usize {
        self.baseline_cache.read().len()
    }

    /// Space for stubs that never call into the GC.
    pub fn optimized_space(&self) -> &Mutex<StubSpace> {
        &self.optimized_space
    }

    /// Cache counters.
    pub fn stats(&self) -> ZoneStats {
        ZoneStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.baseline_cache_len(),
        }
    }

    /// Drop every cached program and release the optimized space. Stubs
    /// already attached keep their code alive.
    pub fn purge(&self) {
        let dropped = {
            let mut cache = self.baseline_cache.write();
            let len = cache.len();
            cache.clear();
            len
        };
        self.optimized_space.lock().free_all();
        tracing::debug!(target: "otter::ic", dropped, "purged stub code cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(code: &[u8]) -> Arc<CacheIRStubInfo> {
        CacheIRStubInfo::new(CacheKind::GetProp, ICStubEngine::Baseline, false, code, &[])
    }

    fn entry(code: &[u8]) -> CachedStubCode {
        let mut masm = crate::masm::MacroAssembler::new();
        masm.emit(crate::masm::Inst::Ret);
        let linked = masm.link(CacheKind::GetProp).unwrap();
        CachedStubCode {
            code: Arc::new(linked),
            info: info(code),
        }
    }

    #[test]
    fn keys_compare_code_bytes() {
        let a = CacheIRStubKey::new(CacheKind::GetProp, ICStubEngine::Baseline, &[1, 2, 3]);
        let b = CacheIRStubKey::for_info(&info(&[1, 2, 3]));
        let c = CacheIRStubKey::new(CacheKind::GetProp, ICStubEngine::Baseline, &[1, 2, 4]);
        let d = CacheIRStubKey::new(CacheKind::GetElem, ICStubEngine::Baseline, &[1, 2, 3]);
        let e = CacheIRStubKey::new(CacheKind::GetProp, ICStubEngine::IonIC, &[1, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, e);
    }

    #[test]
    fn lookup_counts_hits_and_misses() {
        let zone = JitZone::new(JitOptions::default());
        let key = CacheIRStubKey::new(CacheKind::GetProp, ICStubEngine::Baseline, &[9]);
        assert!(zone.get_baseline_code(&key).is_none());
        let first = zone.put_baseline_code(key.clone(), entry(&[9]));
        let second = zone.put_baseline_code(key.clone(), entry(&[9]));
        assert!(Arc::ptr_eq(&first.code, &second.code));
        let found = zone.get_baseline_code(&key).unwrap();
        assert!(Arc::ptr_eq(&found.info, &first.info));
        assert_eq!(
            zone.stats(),
            ZoneStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
        zone.purge();
        assert_eq!(zone.baseline_cache_len(), 0);
    }

    #[test]
    fn racing_inserts_share_the_first_entry() {
        let zone = JitZone::new(JitOptions::default());
        let key = CacheIRStubKey::new(CacheKind::GetProp, ICStubEngine::Baseline, &[5]);
        let results: Vec<CachedStubCode> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let (zone, key) = (&zone, key.clone());
                    scope.spawn(move || zone.put_baseline_code(key, entry(&[5])))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let cached = zone.get_baseline_code(&key).unwrap();
        assert!(results.iter().all(|r| Arc::ptr_eq(&r.code, &cached.code)));
        assert_eq!(zone.baseline_cache_len(), 1);
    }
}
