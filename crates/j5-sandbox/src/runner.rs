//! QuickJS script runner.
//!
//! Each call builds a fresh runtime with a heap cap, a stack cap and an
//! interrupt handler tied to a wall-clock deadline. The interpreter polls the
//! handler from inside loops, so a script that never yields is still stopped;
//! the interrupt it raises cannot be caught by script code.
//!
//! Script code sees exactly two globals besides the language built-ins:
//! `pm` (environment access, plus the response in post-response hooks) and
//! `console`. Both are built by `prelude.js` over private native bindings
//! that are removed from the global object before user code runs.

use rquickjs::promise::PromiseState;
use rquickjs::{
    CatchResultExt, CaughtError, Context, Ctx, Function, Object, Persistent, Runtime, Value,
};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use j5_core::{EnvMap, ScriptContext};

use crate::common::ResourceLimits;
use crate::error::ScriptError;
use crate::info_log;

const PRELUDE: &str = include_str!("prelude.js");
const HOST_BINDING: &str = "__j5_host";

/// Which hook a script is running as; attached to its log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreRequest,
    PostResponse,
    Standalone,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PreRequest => "pre-request",
            Self::PostResponse => "post-response",
            Self::Standalone => "standalone",
        })
    }
}

/// Run `script` against a private copy of `context.environment`.
///
/// Blank scripts return `context` untouched without creating a runtime. On
/// success the returned context carries the (possibly mutated) environment
/// copy and the same response that was passed in.
pub fn run_script(
    script: &str,
    context: ScriptContext,
    limits: &ResourceLimits,
    phase: HookPhase,
) -> Result<ScriptContext, ScriptError> {
    if script.trim().is_empty() {
        return Ok(context);
    }

    let started = Instant::now();
    let deadline = started + limits.timeout();
    let timed_out = Arc::new(AtomicBool::new(false));

    let runtime = Runtime::new().map_err(|e| ScriptError::Setup(e.to_string()))?;
    runtime.set_memory_limit(limits.max_memory_bytes());
    runtime.set_max_stack_size(limits.max_stack_bytes());
    {
        let timed_out = Arc::clone(&timed_out);
        runtime.set_interrupt_handler(Some(Box::new(move || {
            if Instant::now() >= deadline {
                timed_out.store(true, Ordering::SeqCst);
                true
            } else {
                false
            }
        })));
    }
    let js = Context::full(&runtime).map_err(|e| ScriptError::Setup(e.to_string()))?;

    let response_json = match context.response.as_ref() {
        Some(resp) => Some(
            serde_json::to_string(resp).map_err(|e| ScriptError::Setup(e.to_string()))?,
        ),
        None => None,
    };
    let env = Rc::new(RefCell::new(context.environment.clone()));

    let completion: Result<Option<Persistent<Value<'static>>>, String> = js.with(|ctx| {
        install_bindings(&ctx, Rc::clone(&env), response_json, phase)
            .catch(&ctx)
            .map_err(describe)?;
        let value: Value = ctx.eval(script).catch(&ctx).map_err(describe)?;
        Ok(value.is_promise().then(|| Persistent::save(&ctx, value)))
    });
    let outcome = completion.and_then(|pending| {
        drain_jobs(&runtime, deadline, &timed_out)?;
        match pending {
            Some(promise) => js.with(|ctx| settle(&ctx, promise)),
            None => Ok(()),
        }
    });

    if timed_out.load(Ordering::SeqCst) {
        tracing::warn!(%phase, timeout_ms = limits.timeout_ms, "Script interrupted at deadline");
        return Err(ScriptError::TimedOut {
            timeout_ms: limits.timeout_ms,
        });
    }
    if let Err(message) = outcome {
        tracing::debug!(%phase, error = %message, "Script raised");
        return Err(ScriptError::Failed(message));
    }

    let environment: EnvMap = env.borrow().clone();
    info_log!(
        "[{}] script finished in {} ms",
        phase,
        started.elapsed().as_millis()
    );
    Ok(ScriptContext {
        environment,
        response: context.response,
    })
}

/// Run queued promise jobs (`.then` callbacks, `await` continuations) until
/// the queue is empty or the deadline passes. The interrupt handler stays
/// armed while jobs run.
fn drain_jobs(runtime: &Runtime, deadline: Instant, timed_out: &AtomicBool) -> Result<(), String> {
    loop {
        match runtime.execute_pending_job() {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(job) => {
                return Err(job
                    .0
                    .with(|ctx| describe(CaughtError::from_error(&ctx, rquickjs::Error::Exception))));
            }
        }
        if Instant::now() >= deadline {
            timed_out.store(true, Ordering::SeqCst);
            return Ok(());
        }
    }
}

/// A script whose completion value is a promise fails if that promise ended
/// rejected. A promise still pending after the job queue drained is ignored.
fn settle(ctx: &Ctx<'_>, promise: Persistent<Value<'static>>) -> Result<(), String> {
    let value = promise.restore(ctx).map_err(|e| e.to_string())?;
    let Some(promise) = value.into_promise() else {
        return Ok(());
    };
    match promise.state() {
        PromiseState::Rejected => match promise.result::<Value>() {
            Some(Err(err)) => Err(describe(CaughtError::from_error(ctx, err))),
            _ => Err("Promise rejected".to_string()),
        },
        PromiseState::Resolved => Ok(()),
        PromiseState::Pending => {
            tracing::debug!("Script promise still pending after job queue drained");
            Ok(())
        }
    }
}

fn install_bindings<'js>(
    ctx: &Ctx<'js>,
    env: Rc<RefCell<EnvMap>>,
    response_json: Option<String>,
    phase: HookPhase,
) -> rquickjs::Result<()> {
    let host = Object::new(ctx.clone())?;

    let env_get = Rc::clone(&env);
    host.set(
        "envGet",
        Function::new(ctx.clone(), move |key: String| -> Option<String> {
            env_get.borrow().get(&key).cloned()
        })?,
    )?;

    let env_set = env;
    host.set(
        "envSet",
        Function::new(ctx.clone(), move |key: String, value: String| {
            env_set.borrow_mut().insert(key, value);
        })?,
    )?;

    host.set(
        "log",
        Function::new(ctx.clone(), move |level: String, message: String| {
            crate::log::script_message(phase, &level, &message);
        })?,
    )?;

    host.set("response", response_json)?;
    ctx.globals().set(HOST_BINDING, host)?;
    ctx.eval::<(), _>(PRELUDE)
}

/// Human-readable message of a caught script error, e.g. `Error: boom`.
fn describe(err: CaughtError<'_>) -> String {
    match err {
        CaughtError::Exception(ex) => {
            let message = ex.message().unwrap_or_default();
            let name: Option<String> = ex.get("name").ok().flatten();
            match name {
                Some(name) if !message.is_empty() => format!("{}: {}", name, message),
                Some(name) => name,
                None if !message.is_empty() => message,
                None => ex.to_string(),
            }
        }
        CaughtError::Value(value) => match value.as_string() {
            Some(s) => s.to_string().unwrap_or_else(|_| "<invalid string>".to_string()),
            None => format!("{:?}", value),
        },
        CaughtError::Error(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use j5_core::{HeaderValue, ResponseSnapshot};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn limits() -> ResourceLimits {
        ResourceLimits::default()
    }

    fn snapshot(body: &str) -> ResponseSnapshot {
        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            HeaderValue::One("application/json".to_string()),
        );
        ResponseSnapshot {
            status: 201,
            status_text: "Created".to_string(),
            headers,
            body: body.to_string(),
            elapsed_ms: 5,
        }
    }

    #[test]
    fn test_blank_script_returns_context_unchanged() {
        let ctx = ScriptContext::new(env(&[("a", "1")]));
        let out = run_script("   \n\t", ctx.clone(), &limits(), HookPhase::PreRequest).unwrap();
        assert_eq!(out, ctx);
    }

    #[test]
    fn test_environment_set_get_roundtrip() {
        let script = r#"
            pm.environment.set("token", "abc");
            if (pm.environment.get("token") !== "abc") { throw new Error("roundtrip"); }
            pm.environment.set("count", 3);
            pm.environment.set("seen", String(pm.environment.get("missing") === undefined));
        "#;
        let ctx = ScriptContext::new(env(&[("a", "1")]));
        let out = run_script(script, ctx, &limits(), HookPhase::PreRequest).unwrap();
        assert_eq!(out.environment["token"], "abc");
        assert_eq!(out.environment["count"], "3");
        assert_eq!(out.environment["seen"], "true");
        assert_eq!(out.environment["a"], "1");
        assert!(out.response.is_none());
    }

    #[test]
    fn test_input_environment_not_mutated() {
        let original = env(&[("a", "1")]);
        let ctx = ScriptContext::new(original.clone());
        let _ = run_script(
            "pm.environment.set('a', '2')",
            ctx.clone(),
            &limits(),
            HookPhase::PreRequest,
        )
        .unwrap();
        assert_eq!(ctx.environment, original);
    }

    #[test]
    fn test_throwing_script_carries_message() {
        let err = run_script(
            "throw new Error('boom happened')",
            ScriptContext::default(),
            &limits(),
            HookPhase::PreRequest,
        )
        .unwrap_err();
        assert!(matches!(err, ScriptError::Failed(_)));
        let rendered = err.to_string();
        assert!(rendered.starts_with("Script execution failed"));
        assert!(rendered.contains("boom happened"), "{}", rendered);
    }

    #[test]
    fn test_thrown_string_and_reference_error() {
        let err = run_script("throw 'plain'", ScriptContext::default(), &limits(), HookPhase::Standalone)
            .unwrap_err();
        assert!(err.to_string().contains("plain"));

        let err = run_script("notDefined()", ScriptContext::default(), &limits(), HookPhase::Standalone)
            .unwrap_err();
        assert!(err.to_string().contains("notDefined"), "{}", err);
    }

    #[test]
    fn test_infinite_loop_times_out() {
        let limits = limits().with_timeout_ms(100);
        let started = Instant::now();
        let err = run_script(
            "while (true) {}",
            ScriptContext::default(),
            &limits,
            HookPhase::PreRequest,
        )
        .unwrap_err();
        assert_eq!(err, ScriptError::TimedOut { timeout_ms: 100 });
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_ne!(
            err.to_string(),
            ScriptError::Failed(String::new()).to_string()
        );
    }

    #[test]
    fn test_timeout_cannot_be_caught_by_script() {
        let limits = limits().with_timeout_ms(100);
        let script = "for (;;) { try { while (true) {} } catch (e) { pm.environment.set('caught', '1'); } }";
        let err = run_script(script, ScriptContext::default(), &limits, HookPhase::PreRequest)
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_timeout_inside_native_code() {
        let budget = 200;
        let cases = [
            ("backtracking regex", "/(a+)+$/.test('a'.repeat(40) + 'b')"),
            (
                "sort with comparator",
                "const xs = []; for (let i = 0; i < 200000; i++) xs.push((i * 7919) % 200000); \
                 while (true) xs.sort((a, b) => (a % 2) - (b % 2) || b - a);",
            ),
            (
                "string builtins",
                "const s = 'ab'.repeat(1 << 16); \
                 while (true) s.replace(/a/g, 'c').toUpperCase().split('C').join('-').indexOf('z');",
            ),
            (
                "json round trip",
                "const o = { xs: Array.from({ length: 1000 }, (_, i) => ({ i })) }; \
                 while (true) JSON.parse(JSON.stringify(o));",
            ),
        ];
        for (name, script) in cases {
            let started = Instant::now();
            let err = run_script(
                script,
                ScriptContext::default(),
                &limits().with_timeout_ms(budget),
                HookPhase::PreRequest,
            )
            .unwrap_err();
            let elapsed = started.elapsed();
            assert!(err.is_timeout(), "{}: {}", name, err);
            assert!(
                elapsed < Duration::from_millis(2 * budget),
                "{}: took {:?}",
                name,
                elapsed
            );
        }
    }

    #[test]
    fn test_promise_callbacks_update_environment() {
        let script = r#"
            Promise.resolve().then(() => pm.environment.set('late', '1'));
            (async () => {
                await null;
                pm.environment.set('awaited', 'yes');
            })();
        "#;
        let out = run_script(script, ScriptContext::default(), &limits(), HookPhase::PostResponse)
            .unwrap();
        assert_eq!(out.environment["late"], "1");
        assert_eq!(out.environment["awaited"], "yes");
    }

    #[test]
    fn test_rejected_completion_promise_fails() {
        let err = run_script(
            "Promise.reject(new Error('async boom'))",
            ScriptContext::default(),
            &limits(),
            HookPhase::PreRequest,
        )
        .unwrap_err();
        assert!(matches!(err, ScriptError::Failed(_)));
        assert!(err.to_string().contains("async boom"), "{}", err);

        let err = run_script(
            "(async () => { await null; throw new TypeError('late failure'); })()",
            ScriptContext::default(),
            &limits(),
            HookPhase::PreRequest,
        )
        .unwrap_err();
        assert!(err.to_string().contains("late failure"), "{}", err);
    }

    #[test]
    fn test_endless_promise_chain_times_out() {
        let script = "function spin() { Promise.resolve().then(spin); } spin();";
        let err = run_script(
            script,
            ScriptContext::default(),
            &limits().with_timeout_ms(100),
            HookPhase::PreRequest,
        )
        .unwrap_err();
        assert!(err.is_timeout(), "{}", err);
    }

    #[test]
    fn test_response_capabilities() {
        let script = r#"
            const data = pm.response.json();
            pm.environment.set("id", data.id);
            pm.environment.set("code", pm.response.code);
            pm.environment.set("status", pm.response.status);
            pm.environment.set("statusText", pm.response.statusText);
            pm.environment.set("ct", pm.response.headers["content-type"]);
            pm.environment.set("text", pm.response.text());
        "#;
        let ctx = ScriptContext::with_response(EnvMap::new(), snapshot(r#"{"id":42}"#));
        let out = run_script(script, ctx, &limits(), HookPhase::PostResponse).unwrap();
        assert_eq!(out.environment["id"], "42");
        assert_eq!(out.environment["code"], "201");
        assert_eq!(out.environment["status"], "201");
        assert_eq!(out.environment["statusText"], "Created");
        assert_eq!(out.environment["ct"], "application/json");
        assert_eq!(out.environment["text"], r#"{"id":42}"#);
        assert_eq!(out.response.unwrap().status, 201);
    }

    #[test]
    fn test_response_json_on_invalid_body_is_null() {
        let script = "pm.environment.set('parsed', String(pm.response.json()))";
        let ctx = ScriptContext::with_response(EnvMap::new(), snapshot("<html>"));
        let out = run_script(script, ctx, &limits(), HookPhase::PostResponse).unwrap();
        assert_eq!(out.environment["parsed"], "null");
    }

    #[test]
    fn test_response_absent_in_pre_request() {
        let script = "pm.environment.set('has', String(pm.response !== undefined))";
        let out = run_script(script, ScriptContext::default(), &limits(), HookPhase::PreRequest)
            .unwrap();
        assert_eq!(out.environment["has"], "false");
    }

    #[test]
    fn test_only_capability_surface_is_exposed() {
        let script = r#"
            pm.environment.set("host", typeof __j5_host);
            pm.environment.set("require", typeof require);
            pm.environment.set("process", typeof process);
            pm.environment.set("console", typeof console.log);
        "#;
        let out = run_script(script, ScriptContext::default(), &limits(), HookPhase::PreRequest)
            .unwrap();
        assert_eq!(out.environment["host"], "undefined");
        assert_eq!(out.environment["require"], "undefined");
        assert_eq!(out.environment["process"], "undefined");
        assert_eq!(out.environment["console"], "function");
    }

    #[test]
    fn test_console_calls_do_not_fail() {
        let script = "console.log('a', {b: 1}); console.warn('w'); console.error(new Error('e'));";
        assert!(run_script(script, ScriptContext::default(), &limits(), HookPhase::Standalone).is_ok());
    }
}
