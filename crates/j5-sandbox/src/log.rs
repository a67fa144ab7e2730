//! Quiet-mode aware logging and routing of script console output.

use j5_core::observability::SCRIPT_LOG_TARGET;

use crate::runner::HookPhase;

/// `tracing::info!` that is suppressed when `J5_QUIET=1`.
#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {{
        if !$crate::log::is_quiet() {
            tracing::info!($($arg)*);
        }
    }};
}

pub fn is_quiet() -> bool {
    j5_core::config::ObservabilityConfig::from_env().quiet
}

/// Forward one `console.*` call from script code to the host log.
pub fn script_message(phase: HookPhase, level: &str, message: &str) {
    match level {
        "error" => tracing::error!(target: SCRIPT_LOG_TARGET, %phase, "[Script Error] {}", message),
        "warn" => tracing::warn!(target: SCRIPT_LOG_TARGET, %phase, "[Script Warn] {}", message),
        _ => tracing::info!(target: SCRIPT_LOG_TARGET, %phase, "[Script Log] {}", message),
    }
}
