//! The execution pipeline: one request descriptor in, one result out.
//!
//! Stages run strictly in order with no retries. The caller's environment is
//! cloned once into a working copy; only that copy is mutated, and it is
//! returned in the result for the caller to merge back into its scopes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use j5_core::config::{HttpConfig, ScriptConfig};
use j5_core::{EnvMap, ExecutionResult, RequestDescriptor, ResponseSnapshot, ScriptContext};
use j5_sandbox::{execute_on_worker, HookPhase, QuickJsBackend, ResourceLimits, SandboxBackend};

use crate::cancel::CancelToken;
use crate::dispatch::{Dispatcher, HttpDispatcher};
use crate::error::{ExecutionError, TransportError};
use crate::materialize::{materialize, resolve_request};

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn script_text(script: &Option<String>) -> Option<&str> {
    script.as_deref().filter(|s| !s.trim().is_empty())
}

/// Orchestrates sandbox, resolver and dispatcher for one call at a time.
///
/// Holds no per-call state, so one executor can serve concurrent calls.
#[derive(Clone)]
pub struct RequestExecutor {
    dispatcher: Arc<dyn Dispatcher>,
    sandbox: Arc<dyn SandboxBackend>,
}

impl RequestExecutor {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, sandbox: Arc<dyn SandboxBackend>) -> Self {
        Self {
            dispatcher,
            sandbox,
        }
    }

    /// reqwest dispatcher and QuickJS sandbox configured from explicit settings.
    pub fn with_config(http: &HttpConfig, script: ScriptConfig) -> Result<Self, TransportError> {
        Ok(Self::new(
            Arc::new(HttpDispatcher::new(http)?),
            Arc::new(QuickJsBackend::new(ResourceLimits::from(script))),
        ))
    }

    /// Same as [`with_config`](Self::with_config) with `J5_*` environment settings.
    pub fn from_env() -> Result<Self, TransportError> {
        Self::with_config(&HttpConfig::from_env(), ScriptConfig::from_env())
    }

    pub async fn execute(&self, request: &RequestDescriptor, base: &EnvMap) -> ExecutionResult {
        self.execute_with_cancel(request, base, &CancelToken::new())
            .await
    }

    /// Run the pipeline; `cancel` aborts an in-flight dispatch only.
    pub async fn execute_with_cancel(
        &self,
        request: &RequestDescriptor,
        base: &EnvMap,
        cancel: &CancelToken,
    ) -> ExecutionResult {
        let started = Instant::now();
        let mut working = base.clone();

        match self.run_stages(request, &mut working, cancel).await {
            Ok((response, elapsed_ms)) => {
                tracing::debug!(
                    status = response.status,
                    elapsed_ms,
                    "Request execution succeeded"
                );
                ExecutionResult::succeeded(response, working, elapsed_ms)
            }
            Err(err) => {
                tracing::warn!(kind = ?err.kind(), error = %err, "Request execution failed");
                ExecutionResult::failed(err.to_string(), working, millis(started.elapsed()))
            }
        }
    }

    /// Stages 2-6. `working` only changes after a stage completes, so on
    /// error it holds the environment of the last completed stage.
    async fn run_stages(
        &self,
        request: &RequestDescriptor,
        working: &mut EnvMap,
        cancel: &CancelToken,
    ) -> Result<(ResponseSnapshot, u64), ExecutionError> {
        if let Some(script) = script_text(&request.pre_request_script) {
            let out = execute_on_worker(
                Arc::clone(&self.sandbox),
                script.to_string(),
                ScriptContext::new(working.clone()),
                HookPhase::PreRequest,
            )
            .await
            .map_err(|source| ExecutionError::PreRequestScript { source })?;
            *working = out.environment;
        }

        let resolved = resolve_request(request, working);
        tracing::debug!(
            method = %resolved.method,
            url = %resolved.url,
            body = resolved.body.kind(),
            "Request resolved"
        );
        let prepared = materialize(resolved, working).await;

        let dispatch_started = Instant::now();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
            result = self.dispatcher.dispatch(prepared) => result?,
        };
        let elapsed_ms = millis(dispatch_started.elapsed());

        // A failing post-response script fails the whole call and the
        // response is dropped.
        if let Some(script) = script_text(&request.post_response_script) {
            let out = execute_on_worker(
                Arc::clone(&self.sandbox),
                script.to_string(),
                ScriptContext::with_response(working.clone(), response.clone()),
                HookPhase::PostResponse,
            )
            .await
            .map_err(|source| ExecutionError::PostResponseScript { source })?;
            *working = out.environment;
        }

        Ok((response, elapsed_ms))
    }
}
