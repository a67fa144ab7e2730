//! Environment variable names.

/// Script sandbox limits
pub mod script {
    pub const J5_SCRIPT_TIMEOUT_MS: &str = "J5_SCRIPT_TIMEOUT_MS";
    pub const J5_SCRIPT_MAX_MEMORY_MB: &str = "J5_SCRIPT_MAX_MEMORY_MB";
    pub const J5_SCRIPT_MAX_STACK_KB: &str = "J5_SCRIPT_MAX_STACK_KB";
}

/// Outbound HTTP client
pub mod http {
    pub const J5_HTTP_TIMEOUT_SECS: &str = "J5_HTTP_TIMEOUT_SECS";
    pub const J5_HTTP_CONNECT_TIMEOUT_SECS: &str = "J5_HTTP_CONNECT_TIMEOUT_SECS";
    pub const J5_USER_AGENT: &str = "J5_USER_AGENT";
}

/// Observability and logging
pub mod observability {
    pub const J5_QUIET: &str = "J5_QUIET";
    pub const J5_LOG_LEVEL: &str = "J5_LOG_LEVEL";
    pub const LOG_LEVEL_ALIASES: &[&str] = &["J5_LOG"];
    pub const J5_LOG_JSON: &str = "J5_LOG_JSON";
}
