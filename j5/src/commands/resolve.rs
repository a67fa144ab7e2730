//! `j5 resolve`

use anyhow::Result;

use super::LoadedScopes;
use crate::cli::ScopeArgs;

pub fn cmd_resolve(template: &str, scope: &ScopeArgs) -> Result<String> {
    let vars = LoadedScopes::load(scope)?.flatten();
    let resolved = j5_core::resolve(template, &vars);
    let leftover = j5_core::resolver::unresolved_tokens(&resolved);
    if !leftover.is_empty() {
        tracing::warn!(tokens = ?leftover, "Template has unresolved variables");
    }
    Ok(resolved)
}
