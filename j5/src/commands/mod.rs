//! Subcommand implementations.
//!
//! Every command builds its variables the same way: `--env` files form a
//! scope stack (least specific first) and `--set` pairs sit on top of it as
//! an in-memory layer that is never written to disk.

pub mod resolve;
pub mod run;
pub mod script;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use j5_core::environment::{load_environment, save_environment, Environment, ScopeStack};
use j5_core::EnvMap;

use crate::cli::ScopeArgs;

const OVERRIDES_SCOPE: &str = "cli-overrides";

/// File-backed scopes plus the `--set` layer.
#[derive(Debug)]
pub struct LoadedScopes {
    stack: ScopeStack,
    files: Vec<PathBuf>,
    override_count: usize,
}

impl LoadedScopes {
    pub fn load(args: &ScopeArgs) -> Result<Self> {
        let mut stack = ScopeStack::default();
        for path in &args.env_files {
            let env = load_environment(path)?;
            tracing::debug!(path = %path.display(), variables = env.variables.len(), "Loaded environment");
            stack.push(env);
        }
        let mut overrides = Environment::new(OVERRIDES_SCOPE);
        for (key, value) in &args.overrides {
            overrides = overrides.with_var(key, value);
        }
        let override_count = overrides.variables.len();
        stack.push(overrides);
        Ok(Self {
            stack,
            files: args.env_files.clone(),
            override_count,
        })
    }

    pub fn flatten(&self) -> EnvMap {
        self.stack.flatten()
    }

    /// Merge `result` into the scopes and rewrite the env files.
    ///
    /// Keys owned by the `--set` layer stay there. Keys new to every scope
    /// land in the last env file. Returns the number of files written.
    pub fn save(mut self, result: &EnvMap) -> Result<usize> {
        if self.files.is_empty() {
            tracing::warn!("--save-env given without --env files; nothing saved");
            return Ok(0);
        }
        let changed = self.stack.merge_back(result);
        let mut scopes = self.stack.into_scopes();
        if let Some(overrides) = scopes.pop() {
            let fresh = overrides.variables.into_iter().skip(self.override_count);
            if let Some(last) = scopes.last_mut() {
                last.variables.extend(fresh);
            }
        }
        for (path, env) in self.files.iter().zip(&scopes) {
            save_environment(path, env)?;
        }
        tracing::info!(changed, files = self.files.len(), "Environment saved");
        Ok(self.files.len())
    }
}

pub(crate) fn read_text(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} {}", what, path.display()))
}
