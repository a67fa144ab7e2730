//! Resource limits shared by sandbox backends.

use j5_core::config::ScriptConfig;
use std::time::Duration;

/// Per-invocation limits for the script runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Wall-clock budget in milliseconds (default: 500)
    pub timeout_ms: u64,
    /// Heap limit in MB (default: 64)
    pub max_memory_mb: u64,
    /// Interpreter stack limit in KB (default: 512)
    pub max_stack_kb: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::from(ScriptConfig::default())
    }
}

impl From<ScriptConfig> for ResourceLimits {
    fn from(cfg: ScriptConfig) -> Self {
        Self {
            timeout_ms: cfg.timeout_ms,
            max_memory_mb: cfg.max_memory_mb,
            max_stack_kb: cfg.max_stack_kb,
        }
    }
}

impl ResourceLimits {
    /// Load limits from `J5_SCRIPT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from(ScriptConfig::from_env())
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb as usize).saturating_mul(1024 * 1024)
    }

    pub fn max_stack_bytes(&self) -> usize {
        (self.max_stack_kb as usize).saturating_mul(1024)
    }
}
