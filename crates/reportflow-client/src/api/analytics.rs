//! Analytics query API.

use serde_json::Value;

use crate::client::AnalyticsClient;
use crate::error::Result;

/// Analytics query API client.
pub struct AnalyticsApi {
    client: AnalyticsClient,
}

impl AnalyticsApi {
    pub(crate) fn new(client: AnalyticsClient) -> Self {
        Self { client }
    }

    /// Run a conversation detail query (paged; results in `conversations`).
    pub async fn conversation_details(&self, body: &Value) -> Result<Value> {
        self.client
            .post("analytics/conversations/details/query", body)
            .await
    }

    /// Run a conversation aggregate query.
    pub async fn conversation_aggregates(&self, body: &Value) -> Result<Value> {
        self.client
            .post("analytics/conversations/aggregates/query", body)
            .await
    }

    /// Run a user detail query (paged; results in `userDetails`).
    pub async fn user_details(&self, body: &Value) -> Result<Value> {
        self.client.post("analytics/users/details/query", body).await
    }

    /// Run a user aggregate query.
    pub async fn user_aggregates(&self, body: &Value) -> Result<Value> {
        self.client
            .post("analytics/users/aggregates/query", body)
            .await
    }
}
