//! Scripted [`PlatformApi`] double shared by the pipeline integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reportflow_client::{Error, PlatformApi, QueuesQuery, Result, UsersQuery};
use reportflow_pipeline::{Dispatcher, ExecutionEngine, Job, RetryPolicy};
use serde_json::{Value, json};
use tokio::time::Instant;

/// One recorded call.
#[derive(Debug, Clone)]
pub struct Call {
    pub op: &'static str,
    pub payload: Value,
    pub at: Instant,
    /// When the response was returned.
    pub done: Instant,
}

/// Returns queued responses per operation and records every call.
#[derive(Default)]
pub struct ScriptedApi {
    responses: Mutex<HashMap<&'static str, VecDeque<Result<Value>>>>,
    calls: Mutex<Vec<Call>>,
    latency: Mutex<Duration>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a response for `op`.
    pub fn respond(&self, op: &'static str, response: Result<Value>) -> &Self {
        self.responses
            .lock()
            .entry(op)
            .or_default()
            .push_back(response);
        self
    }

    pub fn ok(&self, op: &'static str, value: Value) -> &Self {
        self.respond(op, Ok(value))
    }

    /// Make every call take `latency` before answering.
    pub fn with_latency(&self, latency: Duration) -> &Self {
        *self.latency.lock() = latency;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, op: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    async fn next(&self, op: &'static str, payload: Value) -> Result<Value> {
        let at = Instant::now();
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.calls.lock().push(Call {
            op,
            payload,
            at,
            done: Instant::now(),
        });
        self.responses
            .lock()
            .get_mut(op)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(Error::Config(format!("no scripted response for {op}"))))
    }
}

#[async_trait]
impl PlatformApi for ScriptedApi {
    async fn conversation_details(&self, body: &Value) -> Result<Value> {
        self.next("conversation_details", body.clone()).await
    }

    async fn conversation_aggregates(&self, body: &Value) -> Result<Value> {
        self.next("conversation_aggregates", body.clone()).await
    }

    async fn user_details(&self, body: &Value) -> Result<Value> {
        self.next("user_details", body.clone()).await
    }

    async fn user_aggregates(&self, body: &Value) -> Result<Value> {
        self.next("user_aggregates", body.clone()).await
    }

    async fn list_users(&self, query: &UsersQuery) -> Result<Value> {
        self.next(
            "list_users",
            json!({"ids": query.ids, "pageNumber": query.page_number, "pageSize": query.page_size}),
        )
        .await
    }

    async fn list_queues(&self, query: &QueuesQuery) -> Result<Value> {
        self.next(
            "list_queues",
            json!({"pageNumber": query.page_number, "pageSize": query.page_size, "name": query.name}),
        )
        .await
    }

    async fn get_conversation(&self, id: &str) -> Result<Value> {
        self.next("get_conversation", json!(id)).await
    }

    async fn get_permissions(&self) -> Result<Value> {
        self.next("get_permissions", Value::Null).await
    }
}

pub fn api_error(status: u16, reset: Option<u64>) -> Error {
    Error::Api {
        status,
        code: "scripted".into(),
        message: format!("scripted {status}"),
        rate_limit_reset: reset,
    }
}

pub fn engine(api: &Arc<ScriptedApi>) -> ExecutionEngine {
    let api: Arc<dyn PlatformApi> = api.clone();
    ExecutionEngine::new(Dispatcher::new(api, RetryPolicy::default()))
}

/// A job named `job` with one configuration `main` holding `plan`.
pub fn job_with_plan(plan: Value) -> Job {
    let job = Job::from_value(
        "job",
        &json!({"configurations": {"main": {"executionPlan": plan}}}),
    )
    .unwrap();
    job.validate().unwrap();
    job
}

/// Ids of the `n` items of one page.
pub fn items(prefix: &str, n: usize) -> Vec<Value> {
    (0..n).map(|i| json!({"id": format!("{prefix}{i}")})).collect()
}
