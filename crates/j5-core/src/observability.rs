//! Tracing initialisation.
//!
//! Uses [`ObservabilityConfig`] for `J5_QUIET`, `J5_LOG_LEVEL` and
//! `J5_LOG_JSON`. `RUST_LOG`, when set, takes precedence over both.

use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::ObservabilityConfig;

/// Target used for diagnostics emitted by user scripts.
pub const SCRIPT_LOG_TARGET: &str = "j5::script";

/// Initialise the global subscriber. Safe to call more than once.
pub fn init_tracing() {
    let cfg = ObservabilityConfig::from_env();
    let level = if cfg.quiet {
        "j5=warn".to_string()
    } else {
        cfg.log_level.clone()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
}
