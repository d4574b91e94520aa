//! API endpoint implementations.

mod analytics;
mod authorization;
mod conversations;
mod routing;
mod users;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::AnalyticsClient;
use crate::error::Result;

pub use analytics::AnalyticsApi;
pub use authorization::AuthorizationApi;
pub use conversations::ConversationsApi;
pub use routing::{QueuesQuery, RoutingApi};
pub use users::{UsersQuery, UsersApi};

/// The platform operations a report pipeline issues.
///
/// One method per request kind. [`AnalyticsClient`] implements it over HTTP;
/// tests substitute scripted doubles.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Conversation detail query.
    async fn conversation_details(&self, body: &Value) -> Result<Value>;

    /// Conversation aggregate query.
    async fn conversation_aggregates(&self, body: &Value) -> Result<Value>;

    /// User detail query.
    async fn user_details(&self, body: &Value) -> Result<Value>;

    /// User aggregate query.
    async fn user_aggregates(&self, body: &Value) -> Result<Value>;

    /// List users.
    async fn list_users(&self, query: &UsersQuery) -> Result<Value>;

    /// List routing queues.
    async fn list_queues(&self, query: &QueuesQuery) -> Result<Value>;

    /// Get a single conversation.
    async fn get_conversation(&self, id: &str) -> Result<Value>;

    /// List permissions of the authenticated client.
    async fn get_permissions(&self) -> Result<Value>;
}

#[async_trait]
impl PlatformApi for AnalyticsClient {
    async fn conversation_details(&self, body: &Value) -> Result<Value> {
        self.analytics().conversation_details(body).await
    }

    async fn conversation_aggregates(&self, body: &Value) -> Result<Value> {
        self.analytics().conversation_aggregates(body).await
    }

    async fn user_details(&self, body: &Value) -> Result<Value> {
        self.analytics().user_details(body).await
    }

    async fn user_aggregates(&self, body: &Value) -> Result<Value> {
        self.analytics().user_aggregates(body).await
    }

    async fn list_users(&self, query: &UsersQuery) -> Result<Value> {
        self.users().list(query).await
    }

    async fn list_queues(&self, query: &QueuesQuery) -> Result<Value> {
        self.routing().queues(query).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Value> {
        self.conversations().get(id).await
    }

    async fn get_permissions(&self) -> Result<Value> {
        self.authorization().permissions().await
    }
}
