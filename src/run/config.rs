//! Per-run configuration.
//!
//! The request carries three tunables in a loosely typed JSON object. Invalid
//! values are replaced by defaults with a warning; missing values silently.

use std::time::Duration;

use serde_json::{Map, Value};

/// Default for `text_updates`
pub const DEFAULT_TEXT_UPDATES: bool = false;

/// Default for `text_update_interval`, in milliseconds
pub const DEFAULT_TEXT_UPDATE_INTERVAL_MS: u64 = 5000;

/// Default for `text_update_full`
pub const DEFAULT_TEXT_UPDATE_FULL: bool = true;

/// Normalized run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Emit intermediate console updates, not only the final one
    pub text_updates: bool,
    /// Poll interval in whole seconds (at least 5)
    pub text_update_interval: u64,
    /// Every update carries the full console text instead of the new part
    pub text_update_full: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            text_updates: DEFAULT_TEXT_UPDATES,
            text_update_interval: DEFAULT_TEXT_UPDATE_INTERVAL_MS / 1000,
            text_update_full: DEFAULT_TEXT_UPDATE_FULL,
        }
    }
}

/// Picks `value` when it satisfies `accept`, else warns (if present) and
/// falls back to `default`.
fn validate<T>(
    value: Option<&Value>,
    accept: impl Fn(&Value) -> Option<T>,
    default: T,
    error: impl FnOnce(&str) -> String,
    warn: &mut impl FnMut(String),
) -> T {
    match value {
        None | Some(Value::Null) => default,
        Some(value) => match accept(value) {
            Some(accepted) => accepted,
            None => {
                warn(error(&display(value)));
                default
            }
        },
    }
}

/// Renders a rejected value for a warning; strings appear without JSON quotes.
fn display(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

impl RunConfig {
    /// Builds a configuration from the raw request object, reporting every
    /// rejected value through `warn`. Never fails.
    pub fn normalize(raw: &Map<String, Value>, mut warn: impl FnMut(String)) -> Self {
        let text_updates = validate(
            raw.get("text_updates"),
            Value::as_bool,
            DEFAULT_TEXT_UPDATES,
            |v| format!("Expected the value of text_updates '{}' to be a boolean", v),
            &mut warn,
        );

        let text_update_full = validate(
            raw.get("text_update_full"),
            Value::as_bool,
            DEFAULT_TEXT_UPDATE_FULL,
            |v| format!("Expected the value of text_update_full '{}' to be a boolean", v),
            &mut warn,
        );

        let interval_ms = validate(
            raw.get("text_update_interval"),
            |v| v.as_u64().filter(|ms| *ms >= DEFAULT_TEXT_UPDATE_INTERVAL_MS),
            DEFAULT_TEXT_UPDATE_INTERVAL_MS,
            |v| {
                format!(
                    "Expected the value of text_update_interval '{}' to be an integer greater or equal than 5000",
                    v
                )
            },
            &mut warn,
        );

        Self {
            text_updates,
            text_update_interval: interval_ms / 1000,
            text_update_full,
        }
    }

    /// Normalizes any JSON value; a non-object counts as empty.
    pub fn from_value(raw: &Value, warn: impl FnMut(String)) -> Self {
        match raw {
            Value::Object(map) => Self::normalize(map, warn),
            _ => Self::normalize(&Map::new(), warn),
        }
    }

    /// Delay before every poll request.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.text_update_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(raw: Value) -> (RunConfig, Vec<String>) {
        let mut warnings = Vec::new();
        let config = RunConfig::from_value(&raw, |w| warnings.push(w));
        (config, warnings)
    }

    #[test]
    fn test_empty_config_uses_defaults_silently() {
        let (config, warnings) = normalize(json!({}));
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.text_update_interval, 5);
        assert!(!config.text_updates);
        assert!(config.text_update_full);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_valid_values_are_kept() {
        let (config, warnings) = normalize(json!({
            "text_updates": true,
            "text_update_interval": 12500,
            "text_update_full": false
        }));
        assert_eq!(
            config,
            RunConfig {
                text_updates: true,
                text_update_interval: 12,
                text_update_full: false,
            }
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_invalid_values_warn_and_default() {
        let cases = [
            (
                json!({"text_updates": "yes"}),
                "Expected the value of text_updates 'yes' to be a boolean",
            ),
            (
                json!({"text_update_full": "false"}),
                "Expected the value of text_update_full 'false' to be a boolean",
            ),
            (
                json!({"text_update_interval": "6000"}),
                "Expected the value of text_update_interval '6000' to be an integer greater or equal than 5000",
            ),
            (
                json!({"text_update_full": 1}),
                "Expected the value of text_update_full '1' to be a boolean",
            ),
            (
                json!({"text_update_interval": 4999}),
                "Expected the value of text_update_interval '4999' to be an integer greater or equal than 5000",
            ),
            (
                json!({"text_update_interval": 6000.5}),
                "Expected the value of text_update_interval '6000.5' to be an integer greater or equal than 5000",
            ),
            (
                json!({"text_update_interval": -10000}),
                "Expected the value of text_update_interval '-10000' to be an integer greater or equal than 5000",
            ),
        ];

        for (raw, expected) in cases {
            let (config, warnings) = normalize(raw.clone());
            assert_eq!(config, RunConfig::default(), "input {}", raw);
            assert_eq!(warnings, vec![expected.to_string()], "input {}", raw);
        }
    }

    #[test]
    fn test_null_and_non_object_are_silent() {
        let (config, warnings) = normalize(json!({"text_updates": null}));
        assert_eq!(config, RunConfig::default());
        assert!(warnings.is_empty());

        let (config, warnings) = normalize(json!("not an object"));
        assert_eq!(config, RunConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_poll_interval() {
        let (config, _) = normalize(json!({"text_update_interval": 7999}));
        assert_eq!(config.poll_interval(), Duration::from_secs(7));
    }
}
