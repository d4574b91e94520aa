//! Client error types.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Platform returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error code from the platform.
        code: String,
        /// Error message from the platform.
        message: String,
        /// Seconds until the rate limit window resets (429 responses only).
        rate_limit_reset: Option<u64>,
    },

    /// Authentication failed or no token is available.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status of an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth(_)) || self.status() == Some(401)
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    /// Check if this is a gateway timeout.
    pub fn is_gateway_timeout(&self) -> bool {
        self.status() == Some(504)
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(status) if status >= 500)
    }

    /// Rate limit reset hint carried by a 429 response.
    pub fn rate_limit_reset(&self) -> Option<u64> {
        match self {
            Error::Api {
                rate_limit_reset, ..
            } => *rate_limit_reset,
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error body returned by the platform.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16, reset: Option<u64>) -> Error {
        Error::Api {
            status,
            code: "code".to_string(),
            message: "message".to_string(),
            rate_limit_reset: reset,
        }
    }

    #[test]
    fn test_status_predicates() {
        assert!(api_error(429, Some(3)).is_rate_limited());
        assert!(api_error(504, None).is_gateway_timeout());
        assert!(api_error(504, None).is_server_error());
        assert!(api_error(404, None).is_not_found());
        assert!(api_error(401, None).is_auth_error());
        assert!(Error::Auth("no token".into()).is_auth_error());
        assert!(!api_error(400, None).is_server_error());
    }

    #[test]
    fn test_rate_limit_reset() {
        assert_eq!(api_error(429, Some(5)).rate_limit_reset(), Some(5));
        assert_eq!(api_error(500, None).rate_limit_reset(), None);
        assert_eq!(Error::Config("x".into()).rate_limit_reset(), None);
    }

    #[test]
    fn test_display_includes_status() {
        let err = api_error(429, Some(1));
        assert_eq!(err.to_string(), "API error (429): message");
    }
}
