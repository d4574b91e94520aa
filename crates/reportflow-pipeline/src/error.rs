//! Error types for the pipeline engine.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur during pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid job, configuration, task or export definition.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Template failed to parse or render.
    #[error("Template error: {0}")]
    Template(String),

    /// A property path could not be read or written.
    #[error("Path error: {0}")]
    Path(String),

    /// A remote request failed after the retry policy gave up.
    #[error("Task '{task}' request failed: {source}")]
    Request {
        task: String,
        #[source]
        source: reportflow_client::Error,
    },

    /// Export sink failed.
    #[error("Export failed: {0}")]
    Export(String),

    /// Cron expression or scheduler error.
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// The remote error carried by a failed request, if any.
    pub fn remote_error(&self) -> Option<&reportflow_client::Error> {
        match self {
            PipelineError::Request { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<tera::Error> for PipelineError {
    fn from(err: tera::Error) -> Self {
        // Tera nests the useful message in the source chain.
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        PipelineError::Template(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_keeps_source() {
        let err = PipelineError::Request {
            task: "queues".into(),
            source: reportflow_client::Error::Api {
                status: 400,
                code: "bad.request".into(),
                message: "nope".into(),
                rate_limit_reset: None,
            },
        };
        assert_eq!(err.remote_error().and_then(|e| e.status()), Some(400));
        assert_eq!(
            err.to_string(),
            "Task 'queues' request failed: API error (400): nope"
        );
    }

    #[test]
    fn test_tera_error_chain_is_flattened() {
        let mut tera = tera::Tera::default();
        let err = tera
            .render_str("{{ missing.value }}", &tera::Context::new())
            .unwrap_err();
        let converted = PipelineError::from(err);
        match converted {
            PipelineError::Template(msg) => assert!(msg.contains("missing")),
            other => panic!("Expected Template, got: {other:?}"),
        }
    }
}
