//! `j5 script`: run one script alone, with no response available.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use j5_core::config::ScriptConfig;
use j5_core::ScriptContext;
use j5_sandbox::{execute_on_worker, HookPhase, QuickJsBackend, ResourceLimits};

use super::{read_text, LoadedScopes};
use crate::cli::ScopeArgs;

pub fn cmd_script(
    script_file: &Path,
    scope: &ScopeArgs,
    script_timeout_ms: Option<u64>,
) -> Result<()> {
    let script = read_text(script_file, "script")?;
    let vars = LoadedScopes::load(scope)?.flatten();
    let limits = ResourceLimits::from(ScriptConfig::from_env().with_cli_overrides(script_timeout_ms));

    let backend = Arc::new(QuickJsBackend::new(limits));

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let out = rt.block_on(execute_on_worker(
        backend,
        script,
        ScriptContext::new(vars),
        HookPhase::Standalone,
    ));
    rt.shutdown_background();
    let out = out?;
    println!("{}", serde_json::to_string_pretty(&out.environment)?);
    Ok(())
}
