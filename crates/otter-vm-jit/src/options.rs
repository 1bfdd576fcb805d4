//! Baseline tier configuration
//!
//! [`JitOptions`] is passed explicitly to the attach path. Its `Default`
//! reads process-wide values from the environment once:
//!
//! | variable | default | meaning |
//! |---|---|---|
//! | `OTTER_IC_TYPE_INFERENCE` | on | emit the type-update IC for stores |
//! | `OTTER_IC_MAX_STUBS` | 16 | stubs per fallback before attaching stops |
//! | `OTTER_IC_STUB_SPACE_LIMIT` | unlimited | byte limit of each stub space |

use std::sync::OnceLock;

/// Default maximum number of stubs in one IC chain.
pub const DEFAULT_MAX_STUBS: usize = 16;

static TYPE_INFERENCE: OnceLock<bool> = OnceLock::new();
static MAX_STUBS: OnceLock<usize> = OnceLock::new();
static STUB_SPACE_LIMIT: OnceLock<Option<usize>> = OnceLock::new();

/// Whether an environment value means "enabled".
pub fn parse_env_truthy(value: &str) -> bool {
    let value = value.trim();
    !matches!(value, "" | "0")
        && !value.eq_ignore_ascii_case("false")
        && !value.eq_ignore_ascii_case("off")
        && !value.eq_ignore_ascii_case("no")
}

/// Read a `u32` from the environment.
pub fn parse_env_u32(var_name: &str) -> Option<u32> {
    std::env::var(var_name)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
}

/// Whether stores run the type-update IC.
///
/// Enabled by default. Set `OTTER_IC_TYPE_INFERENCE=0` to disable.
pub fn type_inference_enabled() -> bool {
    *TYPE_INFERENCE.get_or_init(|| {
        std::env::var("OTTER_IC_TYPE_INFERENCE")
            .ok()
            .map(|v| parse_env_truthy(&v))
            .unwrap_or(true)
    })
}

/// Maximum number of stubs attached to one fallback.
pub fn max_stubs_per_fallback() -> usize {
    *MAX_STUBS.get_or_init(|| {
        parse_env_u32("OTTER_IC_MAX_STUBS")
            .filter(|max| *max > 0)
            .map(|max| max as usize)
            .unwrap_or(DEFAULT_MAX_STUBS)
    })
}

/// Byte limit applied to every stub space, if any.
pub fn stub_space_limit() -> Option<usize> {
    *STUB_SPACE_LIMIT
        .get_or_init(|| parse_env_u32("OTTER_IC_STUB_SPACE_LIMIT").map(|limit| limit as usize))
}

/// Options of the Baseline IC tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitOptions {
    /// Emit the type-update IC for property and element stores.
    pub type_inference: bool,
    /// Maximum number of stubs per fallback.
    pub max_stubs_per_fallback: usize,
    /// Byte limit of each stub space.
    pub stub_space_limit: Option<usize>,
}

impl Default for JitOptions {
    fn default() -> Self {
        Self {
            type_inference: type_inference_enabled(),
            max_stubs_per_fallback: max_stubs_per_fallback(),
            stub_space_limit: stub_space_limit(),
        }
    }
}

impl JitOptions {
    /// Options with type inference switched on or off.
    pub fn with_type_inference(mut self, enabled: bool) -> Self {
        self.type_inference = enabled;
        self
    }

    /// Options with a stub-space byte limit.
    pub fn with_stub_space_limit(mut self, limit: Option<usize>) -> Self {
        self.stub_space_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        for on in ["1", "true", "yes", "on", " 2 "] {
            assert!(parse_env_truthy(on), "{on}");
        }
        for off in ["", "0", "false", "OFF", "No"] {
            assert!(!parse_env_truthy(off), "{off}");
        }
    }

    #[test]
    fn builders_override_defaults() {
        let options = JitOptions::default()
            .with_type_inference(false)
            .with_stub_space_limit(Some(64));
        assert!(!options.type_inference);
        assert_eq!(options.stub_space_limit, Some(64));
        assert!(options.max_stubs_per_fallback > 0);
    }
}
