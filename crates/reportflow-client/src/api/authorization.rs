//! Authorization API.

use serde_json::Value;

use crate::client::AnalyticsClient;
use crate::error::Result;

/// Authorization API client.
pub struct AuthorizationApi {
    client: AnalyticsClient,
}

impl AuthorizationApi {
    pub(crate) fn new(client: AnalyticsClient) -> Self {
        Self { client }
    }

    /// List the permissions visible to the authenticated client.
    pub async fn permissions(&self) -> Result<Value> {
        self.client
            .get_with_query(
                "authorization/permissions",
                &[("pageSize".to_string(), "100".to_string())],
            )
            .await
    }
}
