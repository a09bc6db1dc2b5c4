// src/config/secrets.rs
//! Secret values in config: `"ENV"` reads a provider env var, `file:<path>` reads a
//! secret file (plain text or JSON object), anything else is taken literally.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// JSON keys tried in order when a secret file holds an object.
const TOKEN_KEYS: &[&str] = &["token", "bot_token", "telegram_token", "telegram_bot_token"];

/// Pull a token out of secret-file content. A JSON object yields the first known
/// key, then the first non-empty string value; anything else is the trimmed text.
pub fn extract_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        if let Ok(serde_json::Value::Object(map)) =
            serde_json::from_str::<serde_json::Value>(trimmed)
        {
            let known = TOKEN_KEYS
                .iter()
                .filter_map(|k| map.get(*k).and_then(|v| v.as_str()))
                .map(str::trim)
                .find(|v| !v.is_empty());
            let any = || {
                map.values()
                    .filter_map(|v| v.as_str())
                    .map(str::trim)
                    .find(|v| !v.is_empty())
            };
            return known.or_else(any).map(String::from);
        }
    }
    Some(trimmed.to_string())
}

/// Resolve a config secret. `Ok(None)` means "not configured"; the caller decides
/// whether that is fatal.
pub fn resolve(value: &str, env_var: &str) -> Result<Option<String>> {
    let v = value.trim();
    if v.is_empty() {
        return Ok(None);
    }
    if v.eq_ignore_ascii_case("env") {
        return Ok(std::env::var(env_var)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()));
    }
    if let Some(path) = v.strip_prefix("file:") {
        let path = Path::new(path.trim());
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading secret file {}", path.display()))?;
        return Ok(extract_token(&raw));
    }
    Ok(Some(v.to_string()))
}
