//! Routing API.

use serde_json::Value;

use crate::client::AnalyticsClient;
use crate::error::Result;

/// Query parameters for listing queues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueuesQuery {
    /// Items per page.
    pub page_size: Option<u32>,
    /// 1-based page number.
    pub page_number: Option<u32>,
    /// Sort field.
    pub sort_by: Option<String>,
    /// Name filter.
    pub name: Option<String>,
    /// Only active queues.
    pub active: Option<bool>,
}

impl QueuesQuery {
    /// Render as query pairs.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(size) = self.page_size {
            pairs.push(("pageSize".to_string(), size.to_string()));
        }
        if let Some(number) = self.page_number {
            pairs.push(("pageNumber".to_string(), number.to_string()));
        }
        if let Some(sort_by) = &self.sort_by {
            pairs.push(("sortBy".to_string(), sort_by.clone()));
        }
        if let Some(name) = &self.name {
            pairs.push(("name".to_string(), name.clone()));
        }
        if let Some(active) = self.active {
            pairs.push(("active".to_string(), active.to_string()));
        }
        pairs
    }
}

/// Routing API client.
pub struct RoutingApi {
    client: AnalyticsClient,
}

impl RoutingApi {
    pub(crate) fn new(client: AnalyticsClient) -> Self {
        Self { client }
    }

    /// List routing queues (`{entities, pageCount, ...}`).
    pub async fn queues(&self, query: &QueuesQuery) -> Result<Value> {
        self.client
            .get_with_query("routing/queues", &query.to_pairs())
            .await
    }
}
