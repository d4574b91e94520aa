//! Conversations API.

use serde_json::Value;

use crate::client::AnalyticsClient;
use crate::error::Result;

/// Conversations API client.
pub struct ConversationsApi {
    client: AnalyticsClient,
}

impl ConversationsApi {
    pub(crate) fn new(client: AnalyticsClient) -> Self {
        Self { client }
    }

    /// Get a conversation by ID.
    pub async fn get(&self, id: &str) -> Result<Value> {
        self.client.get(&format!("conversations/{}", id)).await
    }
}
