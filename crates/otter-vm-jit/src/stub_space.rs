//! Stub memory accounting.
//!
//! Stubs whose code may collect live in their script's fallback space,
//! which the collector scans; all others share the zone's optimized space.
//! A space may be given a byte limit, which is how allocation failure
//! reaches the attach path.

use crate::error::{JitError, JitResult};

/// Which space a stub was allocated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubSpaceKind {
    /// Per-script, scanned by the collector
    Fallback,
    /// Per-zone, for stubs that never call into the GC
    Optimized,
}

/// Bump accounting for one stub space.
#[derive(Debug, Clone, Default)]
pub struct StubSpace {
    used: usize,
    allocations: usize,
    limit: Option<usize>,
}

impl StubSpace {
    /// Unlimited space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Space that fails once `limit` bytes are in use.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Reserve `bytes`.
    pub fn alloc(&mut self, bytes: usize) -> JitResult<()> {
        let requested = self.used + bytes;
        if let Some(limit) = self.limit {
            if requested > limit {
                return Err(JitError::StubSpaceExhausted {
                    used: self.used,
                    requested: bytes,
                    limit,
                });
            }
        }
        self.used = requested;
        self.allocations += 1;
        Ok(())
    }

    /// Bytes in use.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Number of successful allocations.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Release everything (zone sweep).
    pub fn free_all(&mut self) {
        self.used = 0;
        self.allocations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_enforced() {
        let mut space = StubSpace::with_limit(Some(100));
        space.alloc(60).unwrap();
        let err = space.alloc(60).unwrap_err();
        assert!(err.is_oom());
        assert_eq!(space.used(), 60);
        space.alloc(40).unwrap();
        assert_eq!(space.allocations(), 2);
        space.free_all();
        assert_eq!(space.used(), 0);
    }
}
