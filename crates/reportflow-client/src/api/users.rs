//! Users API.

use serde_json::Value;

use crate::client::AnalyticsClient;
use crate::error::Result;

/// Query parameters for listing users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsersQuery {
    /// Items per page.
    pub page_size: Option<u32>,
    /// 1-based page number.
    pub page_number: Option<u32>,
    /// Restrict the listing to these user ids (at most 100 per call).
    pub ids: Vec<String>,
    /// `ascending` or `descending`.
    pub sort_order: Option<String>,
    /// Related entities to expand.
    pub expand: Vec<String>,
}

impl UsersQuery {
    /// Render as query pairs; list values repeat their key.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(size) = self.page_size {
            pairs.push(("pageSize".to_string(), size.to_string()));
        }
        if let Some(number) = self.page_number {
            pairs.push(("pageNumber".to_string(), number.to_string()));
        }
        for id in &self.ids {
            pairs.push(("id".to_string(), id.clone()));
        }
        if let Some(order) = &self.sort_order {
            pairs.push(("sortOrder".to_string(), order.clone()));
        }
        for expand in &self.expand {
            pairs.push(("expand".to_string(), expand.clone()));
        }
        pairs
    }
}

/// Users API client.
pub struct UsersApi {
    client: AnalyticsClient,
}

impl UsersApi {
    pub(crate) fn new(client: AnalyticsClient) -> Self {
        Self { client }
    }

    /// List users (`{entities, pageCount, ...}`).
    pub async fn list(&self, query: &UsersQuery) -> Result<Value> {
        self.client.get_with_query("users", &query.to_pairs()).await
    }
}
