//! Sandbox configuration — the `config` fields a host passes to `create`,
//! plus the default quota ceilings a sandbox starts with when a host
//! doesn't override them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for one [`crate::sandbox::Sandbox`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Maximum combined bytes writable through `output(...)`. `0` = unbounded.
    pub output_limit: u64,

    /// Maximum bytes the Lua engine may allocate. `0` = unbounded.
    pub memory_limit: u64,

    /// Maximum Lua instructions executed between an instruction-counter
    /// reset and a quota check firing. `0` = unbounded.
    pub instruction_limit: u64,

    /// Directory external (non-built-in) modules are resolved against. If
    /// `None`, `require` on any name outside the built-in set fails with
    /// `"external modules are disabled"` (§4.7 step 4).
    pub module_root: Option<PathBuf>,

    /// Opaque file the host may use to snapshot/restore guest globals across
    /// restarts. The core never reads or writes this path; it only threads
    /// the value through for the host's own preservation layer.
    pub preservation_path: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            output_limit: 1_048_576,
            memory_limit: 8_388_608,
            instruction_limit: 10_000_000,
            module_root: None,
            preservation_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_full() {
        let c = SandboxConfig::default();
        assert_eq!(c.output_limit, 1_048_576);
        assert_eq!(c.memory_limit, 8_388_608);
        assert_eq!(c.instruction_limit, 10_000_000);
        assert!(c.module_root.is_none());
        assert!(c.preservation_path.is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let c = SandboxConfig {
            module_root: Some(PathBuf::from("/tmp/mods")),
            ..SandboxConfig::default()
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: SandboxConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.module_root, Some(PathBuf::from("/tmp/mods")));
        assert_eq!(back.output_limit, c.output_limit);
    }
}
