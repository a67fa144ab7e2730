//! `j5 run`: execute one request descriptor through the pipeline.

use std::path::Path;

use anyhow::{Context, Result};
use j5_core::config::{HttpConfig, ScriptConfig};
use j5_core::{ExecutionResult, RequestDescriptor};
use j5_executor::{CancelToken, RequestExecutor};

use super::{read_text, LoadedScopes};
use crate::cli::ScopeArgs;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub save_env: bool,
    pub script_timeout_ms: Option<u64>,
    pub http_timeout: Option<u64>,
    pub pretty: bool,
}

pub fn load_request(path: &Path) -> Result<RequestDescriptor> {
    let content = read_text(path, "request file")?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid request descriptor {}", path.display()))
}

/// Returns `ExecutionResult::success`; the result itself goes to stdout.
pub fn cmd_run(request_file: &Path, scope: &ScopeArgs, options: &RunOptions) -> Result<bool> {
    let request = load_request(request_file)?;
    let scopes = LoadedScopes::load(scope)?;
    let base = scopes.flatten();

    let http = HttpConfig::from_env().with_cli_overrides(options.http_timeout);
    let script = ScriptConfig::from_env().with_cli_overrides(options.script_timeout_ms);
    let executor = RequestExecutor::with_config(&http, script)?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let result = rt.block_on(execute_interruptible(&executor, &request, &base));
    // An abandoned script worker must not hold the process open.
    rt.shutdown_background();

    let output = if options.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);

    if options.save_env {
        scopes.save(&result.environment)?;
    }
    Ok(result.success)
}

/// Ctrl-C cancels the in-flight dispatch instead of killing the process.
async fn execute_interruptible(
    executor: &RequestExecutor,
    request: &RequestDescriptor,
    base: &j5_core::EnvMap,
) -> ExecutionResult {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling request");
            trigger.cancel();
        }
    });
    let result = executor.execute_with_cancel(request, base, &cancel).await;
    watcher.abort();
    result
}
