//! Wire types for the platform API.
//!
//! Query and list responses are consumed as `serde_json::Value` by the
//! pipeline; only the envelopes the client itself inspects are typed here.

use serde::{Deserialize, Serialize};

/// Token issued by the client-credentials grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Bearer token.
    pub access_token: String,
    /// Token type (normally `bearer`).
    #[serde(default)]
    pub token_type: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Paging block accepted by analytics query bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    /// Items per page.
    pub page_size: u32,
    /// 1-based page number.
    pub page_number: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page_size: 100,
            page_number: 1,
        }
    }
}
