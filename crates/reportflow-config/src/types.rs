//! Settings types mapping to the config document.
//!
//! Top-level document:
//! ```toml
//! [api]            # environment, credentials, timeout
//! [retry]          # 429/504 retry policy
//! [logging]        # log directory
//! [custom_data]    # global custom-data layer
//! [jobs.<name>]    # job definitions (deserialized by the pipeline crate)
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ConfigError, Result};

/// Default platform environment (`login.<env>` / `api.<env>`).
pub const DEFAULT_ENVIRONMENT: &str = "mypurecloud.com";

/// Default HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default sleep after a gateway timeout, in milliseconds.
pub const DEFAULT_GATEWAY_TIMEOUT_DELAY_MS: u64 = 10_000;

/// Default padding added to a rate-limit reset, in milliseconds.
pub const DEFAULT_RATE_LIMIT_PADDING_MS: u64 = 1_000;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Root settings structure.
///
/// All sections are optional; missing sections take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Analytics API connection.
    pub api: ApiSettings,

    /// Retry policy for transient remote failures.
    pub retry: RetrySettings,

    /// Log output.
    pub logging: LoggingSettings,

    /// Global custom-data layer (lowest precedence).
    #[serde(alias = "customData")]
    pub custom_data: Map<String, Value>,

    /// Raw job definitions, keyed by job name.
    pub jobs: Map<String, Value>,
}

impl Settings {
    /// Deserialize settings from a fully `$ref`-resolved document.
    pub fn from_value(value: &Value) -> Result<Self> {
        Settings::deserialize(value).map_err(|e| ConfigError::InvalidSettings(e.to_string()))
    }

    /// Names of all declared jobs, in document order.
    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.keys().map(String::as_str).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Analytics API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Platform environment host suffix.
    #[serde(alias = "region")]
    pub environment: String,
    /// OAuth client id (prefer env var or CLI flag).
    #[serde(alias = "clientId")]
    pub client_id: Option<String>,
    /// OAuth client secret (prefer env var or CLI flag).
    #[serde(alias = "clientSecret")]
    pub client_secret: Option<String>,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Explicit API base URL, overriding the environment.
    pub api_url: Option<String>,
    /// Explicit login base URL, overriding the environment.
    pub login_url: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            client_id: None,
            client_secret: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            api_url: None,
            login_url: None,
        }
    }
}

impl ApiSettings {
    /// Whether a plaintext secret is stored in the document.
    pub fn has_plaintext_secret(&self) -> bool {
        self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Retry policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum retries per call; absent means unbounded.
    pub max_retries: Option<u32>,
    /// Sleep after HTTP 504.
    pub gateway_timeout_delay_ms: u64,
    /// Added to `reset * 1000` after HTTP 429.
    pub rate_limit_padding_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: None,
            gateway_timeout_delay_ms: DEFAULT_GATEWAY_TIMEOUT_DELAY_MS,
            rate_limit_padding_ms: DEFAULT_RATE_LIMIT_PADDING_MS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory for rolling JSON log files.
    pub directory: Option<PathBuf>,
    /// Console filter directive (e.g. `reportflow=debug`).
    pub level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_for_empty_document() {
        let settings = Settings::from_value(&json!({})).unwrap();
        assert_eq!(settings.api.environment, DEFAULT_ENVIRONMENT);
        assert_eq!(settings.api.timeout_secs, 60);
        assert_eq!(settings.retry, RetrySettings::default());
        assert!(settings.retry.max_retries.is_none());
        assert!(settings.custom_data.is_empty());
        assert!(settings.jobs.is_empty());
    }

    #[test]
    fn test_camel_case_aliases() {
        let settings = Settings::from_value(&json!({
            "api": { "clientId": "id", "clientSecret": "secret", "region": "mypurecloud.ie" },
            "customData": { "interval": "PT1H" }
        }))
        .unwrap();
        assert_eq!(settings.api.client_id.as_deref(), Some("id"));
        assert_eq!(settings.api.environment, "mypurecloud.ie");
        assert!(settings.api.has_plaintext_secret());
        assert_eq!(settings.custom_data["interval"], "PT1H");
    }

    #[test]
    fn test_job_names_keep_document_order() {
        let settings = Settings::from_value(&json!({
            "jobs": { "zeta": {}, "alpha": {}, "mid": {} }
        }))
        .unwrap();
        assert_eq!(settings.job_names(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_retry_overrides() {
        let settings = Settings::from_value(&json!({
            "retry": { "max_retries": 3, "gateway_timeout_delay_ms": 50 }
        }))
        .unwrap();
        assert_eq!(settings.retry.max_retries, Some(3));
        assert_eq!(settings.retry.gateway_timeout_delay_ms, 50);
        assert_eq!(settings.retry.rate_limit_padding_ms, 1_000);
    }

    #[test]
    fn test_invalid_section_type() {
        let err = Settings::from_value(&json!({ "retry": { "max_retries": "many" } })).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSettings(_)));
    }
}
