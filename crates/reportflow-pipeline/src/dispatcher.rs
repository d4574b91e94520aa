//! Request dispatch: one [`RequestKind`] call with pagination, id batching
//! and the retry policy applied to every underlying call.

use std::sync::Arc;

use reportflow_client::{PlatformApi, QueuesQuery, UsersQuery};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::definition::RequestKind;
use crate::error::{PipelineError, Result};
use crate::retry::RetryPolicy;

/// Largest page the platform serves.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Largest id list accepted by one user listing.
pub const USER_ID_BATCH: usize = 100;

/// A request with every template resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub kind: RequestKind,
    pub body: Value,
    pub parameters: Value,
    pub get_all_pages: bool,
}

impl ResolvedRequest {
    /// `{"body": .., "parameters": ..}`, as exposed to request transforms.
    pub fn to_value(&self) -> Value {
        json!({"body": self.body, "parameters": self.parameters})
    }

    /// Take back `body`/`parameters` from a transformed [`Self::to_value`].
    pub fn update_from(&mut self, value: Value) {
        if let Value::Object(mut map) = value {
            if let Some(body) = map.remove("body") {
                self.body = body;
            }
            if let Some(parameters) = map.remove("parameters") {
                self.parameters = parameters;
            }
        }
    }
}

/// Issues remote calls on behalf of plan tasks.
#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn PlatformApi>,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn PlatformApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Dispatch one resolved request and return the assembled result.
    ///
    /// GetConversation reads its ids from `parameters.conversationId`.
    pub async fn dispatch(&self, task: &str, request: &ResolvedRequest) -> Result<Value> {
        debug!(task, kind = %request.kind, "dispatching request");
        match request.kind {
            RequestKind::ConversationDetail | RequestKind::UsersDetailsQuery => {
                self.detail_query(task, request).await
            }
            RequestKind::ConversationAggregate => {
                let body = &request.body;
                self.call(task, || self.api.conversation_aggregates(body))
                    .await
            }
            RequestKind::UserAggregate => {
                let body = &request.body;
                self.call(task, || self.api.user_aggregates(body)).await
            }
            RequestKind::GetUsers => self.list_users(task, request).await,
            RequestKind::GetQueues => self.list_queues(task, request).await,
            RequestKind::GetConversation => {
                let ids = conversation_ids(task, request.parameters.get("conversationId"))?;
                self.conversations(task, &ids).await
            }
        }
    }

    /// Fetch conversations one at a time, in order.
    ///
    /// One id yields the record itself; more yield a map keyed by id.
    pub async fn conversations(&self, task: &str, ids: &[String]) -> Result<Value> {
        if let [id] = ids {
            return self.call(task, || self.api.get_conversation(id)).await;
        }
        let mut records = Map::new();
        for (i, id) in ids.iter().enumerate() {
            debug!(task, conversation = %id, remaining = ids.len() - i, "fetching conversation");
            let record = self.call(task, || self.api.get_conversation(id)).await?;
            records.insert(id.clone(), record);
        }
        Ok(Value::Object(records))
    }

    async fn call<F, Fut>(&self, task: &str, f: F) -> Result<Value>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = reportflow_client::Result<Value>>,
    {
        self.retry
            .run(task, f)
            .await
            .map_err(|source| PipelineError::Request {
                task: task.to_string(),
                source,
            })
    }

    // -----------------------------------------------------------------------
    // Detail contract: full page means another page
    // -----------------------------------------------------------------------

    async fn detail_query(&self, task: &str, request: &ResolvedRequest) -> Result<Value> {
        let field = match request.kind {
            RequestKind::UsersDetailsQuery => "userDetails",
            _ => "conversations",
        };
        let mut body = request.body.clone();
        let page_size = normalize_paging(task, &mut body)?;

        let mut result = self.detail_page(task, request.kind, &body).await?;
        if !request.get_all_pages {
            return Ok(result);
        }

        let mut last_len = page_len(&result, field);
        while last_len.is_some_and(|len| len > 0 && len as u64 >= page_size) {
            let page_number = bump_page(&mut body);
            debug!(task, page = page_number, "fetching next page");
            let mut next = self.detail_page(task, request.kind, &body).await?;
            last_len = page_len(&next, field);
            concat_field(&mut result, &mut next, field);
        }
        Ok(result)
    }

    async fn detail_page(&self, task: &str, kind: RequestKind, body: &Value) -> Result<Value> {
        match kind {
            RequestKind::UsersDetailsQuery => self.call(task, || self.api.user_details(body)).await,
            _ => self.call(task, || self.api.conversation_details(body)).await,
        }
    }

    // -----------------------------------------------------------------------
    // List contract: pageNumber < pageCount means another page
    // -----------------------------------------------------------------------

    async fn list_users(&self, task: &str, request: &ResolvedRequest) -> Result<Value> {
        let params = &request.parameters;
        let base = UsersQuery {
            page_size: Some(page_size_param(params)),
            page_number: Some(page_number_param(params)),
            ids: Vec::new(),
            sort_order: string_param(params, "sortOrder"),
            expand: string_list(params.get("expand")),
        };
        let ids = string_list(params.get("id").or_else(|| params.get("ids")));

        if ids.is_empty() {
            return self.users_pages(task, base, request.get_all_pages).await;
        }

        let mut result: Option<Value> = None;
        for (batch, chunk) in ids.chunks(USER_ID_BATCH).enumerate() {
            debug!(task, batch, ids = chunk.len(), "fetching user batch");
            let query = UsersQuery {
                ids: chunk.to_vec(),
                ..base.clone()
            };
            let mut page = self.users_pages(task, query, request.get_all_pages).await?;
            match result.as_mut() {
                Some(acc) => concat_field(acc, &mut page, "entities"),
                None => result = Some(page),
            }
        }
        Ok(result.unwrap_or_else(|| json!({"entities": []})))
    }

    async fn users_pages(&self, task: &str, mut query: UsersQuery, all: bool) -> Result<Value> {
        let mut result = self.call(task, || self.api.list_users(&query)).await?;
        if !all {
            return Ok(result);
        }
        let mut page_count = page_count(&result);
        while u64::from(query.page_number.unwrap_or(1)) < page_count {
            query.page_number = Some(query.page_number.unwrap_or(1) + 1);
            debug!(task, page = query.page_number, "fetching next page");
            let mut next = self.call(task, || self.api.list_users(&query)).await?;
            page_count = page_count_or(&next, page_count);
            concat_field(&mut result, &mut next, "entities");
        }
        Ok(result)
    }

    async fn list_queues(&self, task: &str, request: &ResolvedRequest) -> Result<Value> {
        let params = &request.parameters;
        let mut query = QueuesQuery {
            page_size: Some(page_size_param(params)),
            page_number: Some(page_number_param(params)),
            sort_by: string_param(params, "sortBy"),
            name: string_param(params, "name"),
            active: bool_param(params, "active"),
        };

        let mut result = self.call(task, || self.api.list_queues(&query)).await?;
        if !request.get_all_pages {
            return Ok(result);
        }
        let mut page_count = page_count(&result);
        while u64::from(query.page_number.unwrap_or(1)) < page_count {
            query.page_number = Some(query.page_number.unwrap_or(1) + 1);
            debug!(task, page = query.page_number, "fetching next page");
            let mut next = self.call(task, || self.api.list_queues(&query)).await?;
            page_count = page_count_or(&next, page_count);
            concat_field(&mut result, &mut next, "entities");
        }
        Ok(result)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Default and clamp `body.paging`; returns the page size.
fn normalize_paging(task: &str, body: &mut Value) -> Result<u64> {
    if body.is_null() {
        *body = Value::Object(Map::new());
    }
    let Value::Object(map) = body else {
        return Err(PipelineError::InvalidConfiguration(format!(
            "task '{}': query body must be an object",
            task
        )));
    };
    let paging = map
        .entry("paging")
        .or_insert_with(|| Value::Object(Map::new()));
    if !paging.is_object() {
        *paging = Value::Object(Map::new());
    }
    let size = as_u64(paging.get("pageSize"))
        .filter(|s| *s > 0)
        .map_or(MAX_PAGE_SIZE, |s| s.min(MAX_PAGE_SIZE));
    let number = as_u64(paging.get("pageNumber")).filter(|n| *n > 0).unwrap_or(1);
    paging["pageSize"] = json!(size);
    paging["pageNumber"] = json!(number);
    Ok(size)
}

fn bump_page(body: &mut Value) -> u64 {
    let next = as_u64(body["paging"].get("pageNumber")).unwrap_or(1) + 1;
    body["paging"]["pageNumber"] = json!(next);
    next
}

fn page_len(page: &Value, field: &str) -> Option<usize> {
    page.get(field).and_then(Value::as_array).map(Vec::len)
}

fn page_count(page: &Value) -> u64 {
    as_u64(page.get("pageCount")).unwrap_or(0)
}

fn page_count_or(page: &Value, previous: u64) -> u64 {
    as_u64(page.get("pageCount")).unwrap_or(previous)
}

/// Append `next[field]` onto `acc[field]`.
fn concat_field(acc: &mut Value, next: &mut Value, field: &str) {
    let Some(Value::Array(items)) = next.get_mut(field).map(Value::take) else {
        return;
    };
    match acc.get_mut(field) {
        Some(Value::Array(existing)) => existing.extend(items),
        _ => {
            if let Value::Object(map) = acc {
                map.insert(field.to_string(), Value::Array(items));
            }
        }
    }
}

fn as_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn page_size_param(params: &Value) -> u32 {
    as_u64(params.get("pageSize"))
        .filter(|s| *s > 0)
        .map_or(MAX_PAGE_SIZE, |s| s.min(MAX_PAGE_SIZE)) as u32
}

fn page_number_param(params: &Value) -> u32 {
    as_u64(params.get("pageNumber"))
        .filter(|n| *n > 0)
        .map_or(1, |n| n.min(u64::from(u32::MAX)) as u32)
}

fn string_param(params: &Value, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn bool_param(params: &Value, key: &str) -> Option<bool> {
    match params.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// An array, a comma-separated string, or a single scalar.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_string).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(other) => scalar_string(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Conversation ids from a `conversationId` parameter or collection element.
pub(crate) fn conversation_ids(task: &str, value: Option<&Value>) -> Result<Vec<String>> {
    let ids: Vec<String> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(element_id).collect(),
        Some(other) => element_id(other).into_iter().collect(),
        None => Vec::new(),
    };
    if ids.is_empty() {
        return Err(PipelineError::InvalidConfiguration(format!(
            "task '{}': no conversation ids to fetch",
            task
        )));
    }
    Ok(ids)
}

/// A bare id, or the `conversationId`/`id` of an object.
pub(crate) fn element_id(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => map
            .get("conversationId")
            .or_else(|| map.get("id"))
            .and_then(scalar_string),
        other => scalar_string(other),
    }
}
