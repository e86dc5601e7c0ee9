//! Configuration surface.
//!
//! The host hands configuration over as loosely-typed JSON (form values,
//! environment plumbing, whatever the host UI produced). Numeric fields are
//! coerced with a fallback default on parse failure; config loading never
//! fails.

use serde_json::Value;

use crate::transport::{ProxyPair, normalize_proxy};

/// Validated sign-in configuration with documented defaults.
#[derive(Debug, Clone)]
pub struct SignConfig {
    /// Master enable flag.
    pub enabled: bool,
    /// Raw session cookie string, sent verbatim.
    pub cookie: String,
    /// Deliver user notifications.
    pub notify: bool,
    /// Cron expression for the host scheduler; opaque to the core.
    pub cron: Option<String>,
    /// Run once shortly after startup.
    pub onlyonce: bool,
    /// Random reward mode (`?random=true`) vs fixed reward.
    pub random_choice: bool,
    /// History retention window in days.
    pub history_days: i64,
    /// Route requests through the host proxy when one is configured.
    pub use_proxy: bool,
    /// Max automatic retries after a failed run; 0 disables retries.
    pub max_retries: u32,
    /// Verify TLS certificates.
    pub verify_ssl: bool,
    /// Random pre-request delay bounds, seconds.
    pub min_delay: u64,
    pub max_delay: u64,
    /// Forum member id, used for the optional user-info fetch.
    pub member_id: Option<String>,
    /// One-shot flag: wipe persisted history at startup, then self-clear.
    pub clear_history: bool,
    /// Statistics window in days.
    pub stats_days: i64,
    /// Raw proxy configuration as supplied by the host.
    pub proxy: Option<Value>,
}

impl Default for SignConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cookie: String::new(),
            notify: false,
            cron: None,
            onlyonce: false,
            random_choice: true,
            history_days: 30,
            use_proxy: true,
            max_retries: 3,
            verify_ssl: false,
            min_delay: 5,
            max_delay: 12,
            member_id: None,
            clear_history: false,
            stats_days: 30,
            proxy: None,
        }
    }
}

impl SignConfig {
    /// Build a config from a loosely-typed JSON object. Missing or
    /// malformed fields take their defaults; nothing here can fail.
    pub fn from_value(raw: &Value) -> Self {
        let defaults = Self::default();
        let Some(map) = raw.as_object() else {
            if !raw.is_null() {
                log::warn!("configuration is not an object, using defaults");
            }
            return defaults;
        };

        let get = |key: &str| map.get(key);

        Self {
            enabled: coerce_bool(get("enabled"), "enabled", defaults.enabled),
            cookie: get("cookie")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
            notify: coerce_bool(get("notify"), "notify", defaults.notify),
            cron: get("cron")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            onlyonce: coerce_bool(get("onlyonce"), "onlyonce", defaults.onlyonce),
            random_choice: coerce_bool(
                get("random_choice"),
                "random_choice",
                defaults.random_choice,
            ),
            history_days: coerce_i64(get("history_days"), "history_days", defaults.history_days)
                .max(1),
            use_proxy: coerce_bool(get("use_proxy"), "use_proxy", defaults.use_proxy),
            max_retries: coerce_i64(get("max_retries"), "max_retries", defaults.max_retries as i64)
                .max(0) as u32,
            verify_ssl: coerce_bool(get("verify_ssl"), "verify_ssl", defaults.verify_ssl),
            min_delay: coerce_i64(get("min_delay"), "min_delay", defaults.min_delay as i64).max(0)
                as u64,
            max_delay: coerce_i64(get("max_delay"), "max_delay", defaults.max_delay as i64).max(0)
                as u64,
            member_id: get("member_id")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            clear_history: coerce_bool(
                get("clear_history"),
                "clear_history",
                defaults.clear_history,
            ),
            stats_days: coerce_i64(get("stats_days"), "stats_days", defaults.stats_days).max(1),
            proxy: get("proxy").cloned(),
        }
    }

    /// Effective proxy endpoints, honoring `use_proxy`.
    pub fn proxy_pair(&self) -> Option<ProxyPair> {
        if !self.use_proxy {
            return None;
        }
        normalize_proxy(self.proxy.as_ref())
    }
}

/// Lenient integer coercion: accepts numbers and numeric strings, logs and
/// falls back otherwise.
fn coerce_i64(value: Option<&Value>, key: &str, default: i64) -> i64 {
    match value {
        None | Some(Value::Null) => default,
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_else(|| {
                log::warn!("config {key}={n} out of range, using default {default}");
                default
            }),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
            log::warn!("config {key}={s:?} is not a number, using default {default}");
            default
        }),
        Some(other) => {
            log::warn!("config {key}={other} has wrong type, using default {default}");
            default
        }
    }
}

/// Lenient boolean coercion: accepts bools and "true"/"false" strings.
fn coerce_bool(value: Option<&Value>, key: &str, default: bool) -> bool {
    match value {
        None | Some(Value::Null) => default,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => {
                log::warn!("config {key}={s:?} is not a boolean, using default {default}");
                default
            }
        },
        Some(other) => {
            log::warn!("config {key}={other} has wrong type, using default {default}");
            default
        }
    }
}
