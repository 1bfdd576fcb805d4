//! Warp tier configuration
//!
//! | variable | default | meaning |
//! |---|---|---|
//! | `OTTER_WARP_BACKGROUND` | on | transpile on the compile-queue worker thread |
//! | `OTTER_WARP_MAX_MIR_NODES` | 4096 | instructions per graph before a compile is abandoned |

use std::sync::OnceLock;

use otter_vm_jit::options::{parse_env_truthy, parse_env_u32};

/// Default instruction limit of one MIR graph.
pub const DEFAULT_MAX_MIR_NODES: u32 = 4096;

/// Default number of queued compilations before submitting blocks.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

static BACKGROUND: OnceLock<bool> = OnceLock::new();
static MAX_MIR_NODES: OnceLock<u32> = OnceLock::new();

/// Whether compilations run off the main thread.
///
/// Enabled by default. Set `OTTER_WARP_BACKGROUND=0` to transpile inline.
pub fn background_compilation_enabled() -> bool {
    *BACKGROUND.get_or_init(|| {
        std::env::var("OTTER_WARP_BACKGROUND")
            .ok()
            .map(|v| parse_env_truthy(&v))
            .unwrap_or(true)
    })
}

/// Instruction limit of one MIR graph.
pub fn max_mir_nodes() -> u32 {
    *MAX_MIR_NODES.get_or_init(|| {
        parse_env_u32("OTTER_WARP_MAX_MIR_NODES")
            .filter(|max| *max > 0)
            .unwrap_or(DEFAULT_MAX_MIR_NODES)
    })
}

/// Options of the Warp tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarpOptions {
    /// Transpile on the compile-queue worker thread.
    pub background: bool,
    /// Instruction limit of one MIR graph.
    pub max_mir_nodes: u32,
    /// Bound of the compile-queue channel.
    pub queue_capacity: usize,
}

impl Default for WarpOptions {
    fn default() -> Self {
        Self {
            background: background_compilation_enabled(),
            max_mir_nodes: max_mir_nodes(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl WarpOptions {
    /// Options with background compilation switched on or off.
    pub fn with_background(mut self, enabled: bool) -> Self {
        self.background = enabled;
        self
    }

    /// Options with an instruction limit.
    pub fn with_max_mir_nodes(mut self, max: u32) -> Self {
        self.max_mir_nodes = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let options = WarpOptions::default()
            .with_background(false)
            .with_max_mir_nodes(12);
        assert!(!options.background);
        assert_eq!(options.max_mir_nodes, 12);
        assert_eq!(options.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn env_limit_is_positive() {
        assert!(max_mir_nodes() > 0);
    }
}
