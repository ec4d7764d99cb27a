use once_cell::sync::Lazy;
use serde_json::Value;

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// key: entitlement-config -> bounded retry for raced authorize calls
pub static AUTHORIZE_RETRY_LIMIT: Lazy<u32> = Lazy::new(|| {
    std::env::var("AUTHORIZE_RETRY_LIMIT")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(3)
});

/// key: entitlement-config -> deployment-time tier bundle overrides
///
/// JSON object keyed by tier name, each entry a partial bundle, e.g.
/// `{"starter": {"limit": 20000}}`. Applied once at process start; there is
/// no runtime mutation path for tier bundles.
pub static TIER_OVERRIDES: Lazy<Value> = Lazy::new(|| json_from_env("TIER_OVERRIDES", Value::Null));

fn json_from_env(var: &str, default_value: Value) -> Value {
    match std::env::var(var) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                default_value
            } else {
                serde_json::from_str(trimmed)
                    .unwrap_or_else(|err| panic!("failed to parse {var} as JSON: {err}"))
            }
        }
        Err(_) => default_value,
    }
}
