//! Environment scopes: on-disk environments, flattening, and merge-back.
//!
//! The pipeline only ever sees a flattened [`EnvMap`]. This module is the
//! caller side of that contract: it builds the map from layered scopes and
//! writes a call's resulting environment back into them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::EnvMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    #[default]
    Default,
    Secret,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub key: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub kind: VariableKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl EnvironmentVariable {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            kind: VariableKind::Default,
            enabled: true,
        }
    }
}

/// A named set of variables (one scope).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub variables: Vec<EnvironmentVariable>,
}

impl Environment {
    pub fn new(name: &str) -> Self {
        Self {
            id: name.to_string(),
            name: name.to_string(),
            variables: Vec::new(),
        }
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.variables.push(EnvironmentVariable::new(key, value));
        self
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.variables.iter().rposition(|v| v.key == key)
    }
}

/// Enabled variables of one environment as a map. Later duplicates win.
pub fn flatten_environment(env: &Environment) -> EnvMap {
    let mut out = EnvMap::new();
    for var in env.variables.iter().filter(|v| v.enabled) {
        if var.key.trim().is_empty() {
            tracing::warn!(environment = %env.name, "Skipping variable with empty key");
            continue;
        }
        out.insert(var.key.clone(), var.value.clone());
    }
    out
}

/// Layered scopes, least specific first (globals, collection, environment).
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    scopes: Vec<Environment>,
}

impl ScopeStack {
    pub fn new(scopes: Vec<Environment>) -> Self {
        Self { scopes }
    }

    pub fn push(&mut self, env: Environment) {
        self.scopes.push(env);
    }

    pub fn scopes(&self) -> &[Environment] {
        &self.scopes
    }

    pub fn into_scopes(self) -> Vec<Environment> {
        self.scopes
    }

    /// Merged map; a more specific scope overrides a less specific one.
    pub fn flatten(&self) -> EnvMap {
        let mut out = EnvMap::new();
        for scope in &self.scopes {
            out.extend(flatten_environment(scope));
        }
        out
    }

    /// Write a call's resulting environment back into the scopes.
    ///
    /// Keys whose value equals what [`flatten`](Self::flatten) yields are left
    /// alone, so shadowed or disabled entries the call never touched keep
    /// their stored values. Any other key already defined somewhere is
    /// updated in the most specific scope defining it (kind and enabled flag
    /// untouched). Unknown keys are appended to the most specific scope.
    /// Returns the number of changed or added variables.
    pub fn merge_back(&mut self, result: &EnvMap) -> usize {
        if self.scopes.is_empty() {
            if !result.is_empty() {
                tracing::warn!("No environment scope available; result variables discarded");
            }
            return 0;
        }

        let current = self.flatten();
        let mut changed = 0;
        for (key, value) in result {
            if current.get(key) == Some(value) {
                continue;
            }
            let owner = self
                .scopes
                .iter()
                .rposition(|s| s.position(key).is_some());
            match owner {
                Some(scope_idx) => {
                    let scope = &mut self.scopes[scope_idx];
                    if let Some(var_idx) = scope.position(key) {
                        let var = &mut scope.variables[var_idx];
                        if var.value != *value {
                            var.value = value.clone();
                            changed += 1;
                        }
                    }
                }
                None => {
                    if let Some(last) = self.scopes.last_mut() {
                        last.variables.push(EnvironmentVariable::new(key, value));
                        changed += 1;
                    }
                }
            }
        }
        changed
    }
}

/// Load an environment JSON file.
pub fn load_environment(path: &Path) -> Result<Environment> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read environment file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid environment file {}", path.display()))
}

/// Save an environment as 2-space indented JSON with a trailing newline.
pub fn save_environment(path: &Path, env: &Environment) -> Result<()> {
    let mut content = serde_json::to_string_pretty(env)?;
    content.push('\n');
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write environment file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_skips_disabled() {
        let mut env = Environment::new("dev").with_var("host", "a.test");
        env.variables.push(EnvironmentVariable {
            key: "token".into(),
            value: "t".into(),
            kind: VariableKind::Secret,
            enabled: false,
        });
        let flat = flatten_environment(&env);
        assert_eq!(flat.get("host").map(String::as_str), Some("a.test"));
        assert!(!flat.contains_key("token"));
    }

    #[test]
    fn test_stack_specific_scope_overrides() {
        let globals = Environment::new("globals")
            .with_var("host", "global.test")
            .with_var("port", "80");
        let dev = Environment::new("dev").with_var("host", "dev.test");
        let stack = ScopeStack::new(vec![globals, dev]);
        let flat = stack.flatten();
        assert_eq!(flat["host"], "dev.test");
        assert_eq!(flat["port"], "80");
    }

    #[test]
    fn test_merge_back_updates_in_place_and_appends() {
        let globals = Environment::new("globals").with_var("port", "80");
        let dev = Environment::new("dev").with_var("host", "dev.test");
        let mut stack = ScopeStack::new(vec![globals, dev]);

        let mut result = stack.flatten();
        result.insert("port".into(), "8080".into());
        result.insert("token".into(), "abc".into());

        let changed = stack.merge_back(&result);
        assert_eq!(changed, 2);

        let scopes = stack.scopes();
        assert_eq!(scopes[0].variables[0].value, "8080");
        assert_eq!(scopes[0].variables.len(), 1);
        assert_eq!(scopes[1].variables.last().unwrap().key, "token");
    }

    #[test]
    fn test_merge_back_leaves_untouched_disabled_entries() {
        let globals = Environment::new("globals").with_var("host", "g.test");
        let mut dev = Environment::new("dev")
            .with_var("host", "stale.test")
            .with_var("port", "80");
        dev.variables[0].enabled = false;
        let mut stack = ScopeStack::new(vec![globals, dev]);

        let mut result = stack.flatten();
        assert_eq!(result["host"], "g.test");
        assert_eq!(stack.merge_back(&result), 0);
        assert_eq!(stack.scopes()[1].variables[0].value, "stale.test");
        assert_eq!(stack.scopes()[0].variables[0].value, "g.test");

        result.insert("host".into(), "new.test".into());
        assert_eq!(stack.merge_back(&result), 1);
        let dev = &stack.scopes()[1].variables[0];
        assert_eq!(dev.value, "new.test");
        assert!(!dev.enabled);
    }

    #[test]
    fn test_merge_back_into_empty_stack_is_noop() {
        let mut stack = ScopeStack::default();
        let mut result = EnvMap::new();
        result.insert("k".into(), "v".into());
        assert_eq!(stack.merge_back(&result), 0);
    }

    #[test]
    fn test_environment_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.json");
        let env = Environment::new("dev").with_var("host", "dev.test");
        save_environment(&path, &env).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.ends_with('\n'));
        assert!(written.contains("\"type\": \"default\""));

        let loaded = load_environment(&path).unwrap();
        assert_eq!(loaded, env);
    }

    #[test]
    fn test_load_environment_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_environment(&path).unwrap_err();
        assert!(format!("{}", err).contains("broken.json"));
    }
}
