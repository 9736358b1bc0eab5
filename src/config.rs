//! Merged configuration: `tejas.config.json` (cwd) → process environment →
//! explicit constructor options, in ascending precedence, as spec'd in §6.
//!
//! Nested JSON objects are flattened to `UPPER_SNAKE_CASE` keys joined by `_`
//! before the final typed [`Config`] is assembled, so `{"rateLimiter": {"maxRequests": 5}}`
//! and an env var `RATE_LIMITER_MAX_REQUESTS=5` land on the same key.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

const CONFIG_FILE_NAME: &str = "tejas.config.json";

fn default_port() -> u16 {
    1403
}

fn default_body_max_size() -> usize {
    10 * 1024 * 1024
}

fn default_body_timeout_ms() -> u64 {
    30_000
}

fn default_cache_max_bytes() -> String {
    "25%".to_string()
}

/// The framework's merged, typed configuration.
///
/// Fields mirror the "Recognised keys" table in spec.md §6 plus the
/// connection-manager / cache keys the expanded spec adds (non-exhaustive,
/// same as the source).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub body_max_size: usize,
    pub body_timeout_ms: u64,
    pub dir_targets: Option<String>,
    pub log_http_requests: bool,
    pub log_exceptions: bool,
    pub cache_max_bytes: String,
    pub redis_url: Option<String>,
    pub mongo_url: Option<String>,
    /// Wires a global [`crate::ratelimit::RateLimiter`] ahead of every
    /// endpoint's own chain when set (spec.md §2 "Framework shell ...
    /// wires ... global rate limiter").
    pub rate_limiter_enabled: bool,
    pub rate_limiter_max_requests: u64,
    pub rate_limiter_time_window_seconds: u64,
    /// `"memory"` or `"redis"`; the latter requires `redis_url`.
    pub rate_limiter_store: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: default_port(),
            body_max_size: default_body_max_size(),
            body_timeout_ms: default_body_timeout_ms(),
            dir_targets: None,
            log_http_requests: false,
            log_exceptions: false,
            cache_max_bytes: default_cache_max_bytes(),
            redis_url: None,
            mongo_url: None,
            rate_limiter_enabled: false,
            rate_limiter_max_requests: 60,
            rate_limiter_time_window_seconds: 60,
            rate_limiter_store: "memory".to_string(),
        }
    }
}

/// Flattened key/value layer: every key is already `UPPER_SNAKE_CASE`, every
/// value is its string representation (coerced back to the proper type when
/// [`Config`] is assembled).
type FlatLayer = HashMap<String, String>;

fn flatten_into(out: &mut FlatLayer, value: &Value, prefix: &str) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = to_upper_snake(k);
                let joined = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}_{key}")
                };
                flatten_into(out, v, &joined);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        Value::Null => {}
        Value::Array(_) => {
            out.insert(prefix.to_string(), value.to_string());
        }
    }
}

fn to_upper_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(ch.to_uppercase());
    }
    out
}

/// Loads and merges configuration from the file, environment, and explicit
/// layers, in that precedence order.
///
/// `explicit` is typically built by the shell from constructor-style options
/// (e.g. a CLI flag or an embedder's own config struct) and always wins.
pub fn load(explicit: Option<Value>) -> anyhow::Result<Config> {
    load_from(Path::new(CONFIG_FILE_NAME), explicit)
}

pub(crate) fn load_from(config_path: &Path, explicit: Option<Value>) -> anyhow::Result<Config> {
    let mut flat = FlatLayer::new();

    if let Ok(text) = std::fs::read_to_string(config_path) {
        let parsed: Value = serde_json::from_str(&text)?;
        flatten_into(&mut flat, &parsed, "");
    }

    // envy hands back the whole process environment as a flat string map;
    // env vars are already UPPER_SNAKE_CASE so no further flattening is needed.
    if let Ok(env_layer) = envy::from_env::<HashMap<String, String>>() {
        flat.extend(env_layer);
    }

    if let Some(explicit) = explicit {
        flatten_into(&mut flat, &explicit, "");
    }

    Ok(Config {
        port: get_or(&flat, "PORT", default_port()),
        body_max_size: get_or(&flat, "BODY_MAX_SIZE", default_body_max_size()),
        body_timeout_ms: get_or(&flat, "BODY_TIMEOUT", default_body_timeout_ms()),
        dir_targets: flat.get("DIR_TARGETS").cloned(),
        log_http_requests: get_bool(&flat, "LOG_HTTP_REQUESTS"),
        log_exceptions: get_bool(&flat, "LOG_EXCEPTIONS"),
        cache_max_bytes: flat
            .get("CACHE_MAX_BYTES")
            .cloned()
            .unwrap_or_else(default_cache_max_bytes),
        redis_url: flat.get("REDIS_URL").cloned(),
        mongo_url: flat.get("MONGO_URL").cloned(),
        rate_limiter_enabled: get_bool(&flat, "RATE_LIMITER_ENABLED"),
        rate_limiter_max_requests: get_or(&flat, "RATE_LIMITER_MAX_REQUESTS", 60),
        rate_limiter_time_window_seconds: get_or(&flat, "RATE_LIMITER_TIME_WINDOW_SECONDS", 60),
        rate_limiter_store: flat
            .get("RATE_LIMITER_STORE")
            .cloned()
            .unwrap_or_else(|| "memory".to_string()),
    })
}

fn get_or<T: std::str::FromStr>(flat: &FlatLayer, key: &str, default: T) -> T {
    flat.get(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn get_bool(flat: &FlatLayer, key: &str) -> bool {
    flat.get(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_nothing_present() {
        let cfg = load_from(Path::new("/nonexistent/tejas.config.json"), None).unwrap();
        assert_eq!(cfg.port, 1403);
        assert_eq!(cfg.body_max_size, 10 * 1024 * 1024);
        assert!(!cfg.log_http_requests);
    }

    #[test]
    fn explicit_options_win_over_file() {
        let dir = std::env::temp_dir().join(format!("tejas-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tejas.config.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, r#"{{"port": 9000}}"#).unwrap();

        let cfg = load_from(&path, Some(serde_json::json!({"port": 9500}))).unwrap();
        assert_eq!(cfg.port, 9500);

        let cfg = load_from(&path, None).unwrap();
        assert_eq!(cfg.port, 9000);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn nested_json_flattens_to_upper_snake() {
        let mut flat = FlatLayer::new();
        flatten_into(
            &mut flat,
            &serde_json::json!({"rateLimiter": {"maxRequests": 5}}),
            "",
        );
        assert_eq!(flat.get("RATE_LIMITER_MAX_REQUESTS").map(String::as_str), Some("5"));
    }
}
