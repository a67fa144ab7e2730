pub mod common;
pub mod error;
pub mod log;
pub mod runner;
pub mod sandbox_backend;

pub use common::ResourceLimits;
pub use error::ScriptError;
pub use runner::{run_script, HookPhase};
pub use sandbox_backend::{execute_on_worker, watchdog_limit, QuickJsBackend, SandboxBackend};
