//! `{{name}}` template substitution over a flat variable map.
//!
//! Substitution is repeated so that a value which itself contains a token is
//! expanded too (`a -> {{b}}`, `b -> y` resolves `{{a}}` to `y`). The pass
//! count is capped at [`MAX_PASSES`]; the cap guarantees termination but does
//! not detect cycles, so `a -> {{b}}`, `b -> {{a}}` stops with one of the two
//! tokens still in the output.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::types::EnvMap;

/// Upper bound on full-string substitution passes.
pub const MAX_PASSES: usize = 10;

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("token pattern is a valid regex")
    })
}

/// Substitute every known `{{name}}` token in `template`.
///
/// Unknown tokens are left verbatim. Whitespace between the braces and the
/// identifier is ignored (`{{ host }}` matches `host`).
pub fn resolve(template: &str, vars: &EnvMap) -> String {
    if template.is_empty() || vars.is_empty() || !template.contains("{{") {
        return template.to_string();
    }

    let re = token_regex();
    let mut current = template.to_string();
    for _ in 0..MAX_PASSES {
        let mut changed = false;
        let next = re
            .replace_all(&current, |caps: &Captures| match vars.get(&caps[1]) {
                Some(value) => {
                    changed = true;
                    value.clone()
                }
                None => caps[0].to_string(),
            })
            .into_owned();
        current = next;
        if !changed {
            break;
        }
    }
    current
}

/// Resolve every value of a string map, keeping keys untouched.
pub fn resolve_map(map: &BTreeMap<String, String>, vars: &EnvMap) -> BTreeMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), resolve(v, vars)))
        .collect()
}

/// Names of the tokens still unresolved in `text`, in order of appearance.
pub fn unresolved_tokens(text: &str) -> Vec<String> {
    token_regex()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}
