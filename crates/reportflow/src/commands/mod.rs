//! CLI command handlers.

pub mod jobs;
pub mod run;
pub mod schedule;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use indexmap::IndexMap;
use reportflow_client::{AnalyticsClient, PlatformApi};
use reportflow_config::{LoadedDocument, Settings, resolve_credentials};
use reportflow_pipeline::{Dispatcher, ExecutionEngine, Job, JobRunner, RetryPolicy, RunOptions};
use serde_json::Value;
use tracing::info;

/// Shared context for all commands.
#[derive(Debug)]
pub struct Context {
    /// The loaded, `$ref`-resolved settings document.
    pub document: LoadedDocument,
    /// Typed settings.
    pub settings: Settings,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Log rendered documents.
    pub show_output: bool,
    /// Client id from the command line.
    pub client_id: Option<String>,
    /// Client secret from the command line.
    pub client_secret: Option<String>,
}

impl Context {
    /// Parse and validate every job.
    pub fn jobs(&self) -> Result<IndexMap<String, Job>> {
        reportflow_pipeline::load_jobs(&self.settings.jobs)
            .with_context(|| format!("invalid jobs in {}", self.document.path.display()))
    }

    /// Build a client and log in.
    pub async fn connect(&self) -> Result<AnalyticsClient> {
        let api = &self.settings.api;
        let credentials =
            resolve_credentials(self.client_id.as_deref(), self.client_secret.as_deref(), api)?;
        info!(
            id_source = %credentials.id_source,
            secret_source = %credentials.secret_source,
            "Using client credentials"
        );

        let mut builder = AnalyticsClient::builder()
            .environment(&api.environment)
            .credentials(credentials.client_id, credentials.client_secret)
            .timeout(Duration::from_secs(api.timeout_secs))
            .user_agent(format!("reportflow/{}", env!("CARGO_PKG_VERSION")));
        if let Some(url) = &api.api_url {
            builder = builder.api_url(url);
        }
        if let Some(url) = &api.login_url {
            builder = builder.login_url(url);
        }
        let client = builder.build()?;
        client.authenticate().await.context("login failed")?;
        Ok(client)
    }

    /// A job runner over `client`, exposing `args` to templates.
    pub fn runner(&self, client: AnalyticsClient, args: Value) -> JobRunner {
        let api: Arc<dyn PlatformApi> = Arc::new(client);
        let dispatcher = Dispatcher::new(api, RetryPolicy::from(&self.settings.retry));
        JobRunner::new(ExecutionEngine::new(dispatcher), self.document.base_dir.clone())
            .with_global_custom_data(self.settings.custom_data.clone())
            .with_options(RunOptions {
                show_output: self.show_output,
                args,
            })
    }

    /// Names matching `requested`, or every job when nothing was requested.
    pub fn selected(&self, jobs: &IndexMap<String, Job>, requested: &[String]) -> Vec<String> {
        if requested.is_empty() {
            jobs.keys().cloned().collect()
        } else {
            requested.to_vec()
        }
    }
}

/// Copy of `root` with the client secret masked.
pub fn redacted(root: &Value) -> Value {
    let mut copy = root.clone();
    if let Some(api) = copy.get_mut("api").and_then(Value::as_object_mut) {
        for key in ["client_secret", "clientSecret"] {
            if let Some(secret) = api.get_mut(key) {
                *secret = Value::String("<redacted>".into());
            }
        }
    }
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacted_masks_secret() {
        let root = json!({"api": {"clientSecret": "s3cret", "environment": "x"}, "jobs": {}});
        let masked = redacted(&root);
        assert_eq!(masked["api"]["clientSecret"], "<redacted>");
        assert_eq!(masked["api"]["environment"], "x");
        assert_eq!(root["api"]["clientSecret"], "s3cret");
    }
}
