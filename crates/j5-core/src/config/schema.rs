//! Config structs grouped by concern, loaded from the environment.

use super::env_keys::{http as http_keys, observability as obv_keys, script as script_keys};
use super::loader::{env_bool, env_optional, env_or, env_parse, load_dotenv};

/// Default wall-clock budget for one script run.
pub const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_SCRIPT_MAX_MEMORY_MB: u64 = 64;
pub const DEFAULT_SCRIPT_MAX_STACK_KB: u64 = 512;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Script sandbox limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptConfig {
    pub timeout_ms: u64,
    pub max_memory_mb: u64,
    pub max_stack_kb: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
            max_memory_mb: DEFAULT_SCRIPT_MAX_MEMORY_MB,
            max_stack_kb: DEFAULT_SCRIPT_MAX_STACK_KB,
        }
    }
}

impl ScriptConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            timeout_ms: env_parse(script_keys::J5_SCRIPT_TIMEOUT_MS, &[], DEFAULT_SCRIPT_TIMEOUT_MS),
            max_memory_mb: env_parse(
                script_keys::J5_SCRIPT_MAX_MEMORY_MB,
                &[],
                DEFAULT_SCRIPT_MAX_MEMORY_MB,
            ),
            max_stack_kb: env_parse(
                script_keys::J5_SCRIPT_MAX_STACK_KB,
                &[],
                DEFAULT_SCRIPT_MAX_STACK_KB,
            ),
        }
    }

    pub fn with_cli_overrides(mut self, timeout_ms: Option<u64>) -> Self {
        if let Some(t) = timeout_ms {
            self.timeout_ms = t;
        }
        self
    }
}

/// Outbound HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_HTTP_CONNECT_TIMEOUT_SECS,
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("j5/{}", env!("CARGO_PKG_VERSION"))
}

impl HttpConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            timeout_secs: env_parse(http_keys::J5_HTTP_TIMEOUT_SECS, &[], DEFAULT_HTTP_TIMEOUT_SECS),
            connect_timeout_secs: env_parse(
                http_keys::J5_HTTP_CONNECT_TIMEOUT_SECS,
                &[],
                DEFAULT_HTTP_CONNECT_TIMEOUT_SECS,
            ),
            user_agent: env_or(http_keys::J5_USER_AGENT, &[], default_user_agent),
        }
    }

    pub fn with_cli_overrides(mut self, timeout_secs: Option<u64>) -> Self {
        if let Some(t) = timeout_secs {
            self.timeout_secs = t;
        }
        self
    }
}

/// Logging configuration: quiet, log_level, log_json
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            load_dotenv();
            Self {
                quiet: env_bool(obv_keys::J5_QUIET, &[], false),
                log_level: env_optional(obv_keys::J5_LOG_LEVEL, obv_keys::LOG_LEVEL_ALIASES)
                    .unwrap_or_else(|| "j5=info".to_string()),
                log_json: env_bool(obv_keys::J5_LOG_JSON, &[], false),
            }
        })
    }
}
