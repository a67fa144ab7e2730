//! SandboxBackend trait: extension point for script engines.
//!
//! The pipeline only talks to this trait. [`QuickJsBackend`] is the default;
//! tests or embedders can supply their own implementation.

use std::sync::Arc;
use std::time::Duration;

use j5_core::ScriptContext;

use crate::common::ResourceLimits;
use crate::error::ScriptError;
use crate::runner::{run_script, HookPhase};

/// Extension point for script execution backends.
pub trait SandboxBackend: Send + Sync {
    /// Backend name for logging and diagnostics.
    fn name(&self) -> &str;

    /// Wall-clock budget of one script run.
    fn time_budget(&self) -> Duration;

    /// Run one script synchronously. Implementations must bound run time.
    fn execute(
        &self,
        script: &str,
        context: ScriptContext,
        phase: HookPhase,
    ) -> Result<ScriptContext, ScriptError>;
}

/// Embedded QuickJS with per-call resource limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuickJsBackend {
    limits: ResourceLimits,
}

impl QuickJsBackend {
    pub fn new(limits: ResourceLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

impl SandboxBackend for QuickJsBackend {
    fn name(&self) -> &str {
        "quickjs"
    }

    fn time_budget(&self) -> Duration {
        self.limits.timeout()
    }

    fn execute(
        &self,
        script: &str,
        context: ScriptContext,
        phase: HookPhase,
    ) -> Result<ScriptContext, ScriptError> {
        run_script(script, context, &self.limits, phase)
    }
}

/// Slack granted past the backend's own budget before the host gives up on a
/// worker: half the budget, at least 25 ms.
pub fn watchdog_limit(budget: Duration) -> Duration {
    budget + (budget / 2).max(Duration::from_millis(25))
}

/// Run a script on the blocking thread pool so the async caller is never
/// stalled by script time. Blank scripts short-circuit on the caller.
///
/// The wait is bounded by [`watchdog_limit`]: if the engine fails to stop
/// itself in time the call reports `TimedOut` and the worker is abandoned.
pub async fn execute_on_worker(
    backend: Arc<dyn SandboxBackend>,
    script: String,
    context: ScriptContext,
    phase: HookPhase,
) -> Result<ScriptContext, ScriptError> {
    if script.trim().is_empty() {
        return Ok(context);
    }
    let budget = backend.time_budget();
    tracing::debug!(backend = backend.name(), %phase, "Dispatching script to worker");
    let worker = tokio::task::spawn_blocking(move || backend.execute(&script, context, phase));
    match tokio::time::timeout(watchdog_limit(budget), worker).await {
        Ok(joined) => joined
            .map_err(|e| ScriptError::Setup(format!("script worker terminated: {}", e)))?,
        Err(_) => {
            tracing::warn!(%phase, budget_ms = budget.as_millis() as u64, "Script worker exceeded watchdog limit; abandoning it");
            Err(ScriptError::TimedOut {
                timeout_ms: budget.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use j5_core::EnvMap;

    #[tokio::test]
    async fn test_execute_on_worker_runs_script() {
        let backend: Arc<dyn SandboxBackend> = Arc::new(QuickJsBackend::default());
        let out = execute_on_worker(
            backend,
            "pm.environment.set('k', 'v')".to_string(),
            ScriptContext::new(EnvMap::new()),
            HookPhase::PreRequest,
        )
        .await
        .unwrap();
        assert_eq!(out.environment["k"], "v");
    }

    struct StuckBackend;

    impl SandboxBackend for StuckBackend {
        fn name(&self) -> &str {
            "stuck"
        }

        fn time_budget(&self) -> Duration {
            Duration::from_millis(50)
        }

        fn execute(
            &self,
            _script: &str,
            context: ScriptContext,
            _phase: HookPhase,
        ) -> Result<ScriptContext, ScriptError> {
            std::thread::sleep(Duration::from_millis(600));
            Ok(context)
        }
    }

    #[test]
    fn test_watchdog_limit_has_floor() {
        assert_eq!(
            watchdog_limit(Duration::from_millis(500)),
            Duration::from_millis(750)
        );
        assert_eq!(
            watchdog_limit(Duration::from_millis(10)),
            Duration::from_millis(35)
        );
    }

    #[tokio::test]
    async fn test_watchdog_stops_waiting_on_stuck_worker() {
        let started = std::time::Instant::now();
        let err = execute_on_worker(
            Arc::new(StuckBackend),
            "anything".to_string(),
            ScriptContext::default(),
            HookPhase::PreRequest,
        )
        .await
        .unwrap_err();
        assert_eq!(err, ScriptError::TimedOut { timeout_ms: 50 });
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_backtracking_regex_is_bounded_on_worker() {
        let backend: Arc<dyn SandboxBackend> =
            Arc::new(QuickJsBackend::new(ResourceLimits::default().with_timeout_ms(200)));
        let started = std::time::Instant::now();
        let err = execute_on_worker(
            backend,
            "/(a+)+$/.test('a'.repeat(40) + 'b')".to_string(),
            ScriptContext::default(),
            HookPhase::PreRequest,
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout(), "{}", err);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_execute_on_worker_reports_timeout() {
        let backend: Arc<dyn SandboxBackend> =
            Arc::new(QuickJsBackend::new(ResourceLimits::default().with_timeout_ms(50)));
        let err = execute_on_worker(
            backend,
            "while (1) {}".to_string(),
            ScriptContext::default(),
            HookPhase::PostResponse,
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
    }
}
