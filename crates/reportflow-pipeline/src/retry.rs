//! Retry policy for remote calls.
//!
//! | Condition | Action |
//! |---|---|
//! | HTTP 429 | sleep `reset * 1000 + padding` ms, retry the identical call |
//! | HTTP 504 | sleep the gateway delay, retry the identical call |
//! | anything else | return the error |

use std::future::Future;
use std::time::Duration;

use reportflow_client::Error as ClientError;
use reportflow_config::RetrySettings;
use tracing::warn;

/// Status-driven retry policy with an optional attempt bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries per call; `None` retries forever.
    pub max_retries: Option<u32>,
    pub gateway_timeout_delay: Duration,
    pub rate_limit_padding: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            gateway_timeout_delay: Duration::from_millis(settings.gateway_timeout_delay_ms),
            rate_limit_padding: Duration::from_millis(settings.rate_limit_padding_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `error`, or `None` when it is not retryable.
    ///
    /// A 429 without a reset hint waits only the padding. Oversized hints
    /// saturate instead of overflowing.
    pub fn delay_for(&self, error: &ClientError) -> Option<Duration> {
        match error.status()? {
            429 => {
                let reset = error.rate_limit_reset().unwrap_or(0);
                Some(Duration::from_secs(reset).saturating_add(self.rate_limit_padding))
            }
            504 => Some(self.gateway_timeout_delay),
            _ => None,
        }
    }

    /// Run `call` until it succeeds, fails non-retryably, or the bound is hit.
    pub async fn run<F, Fut, T>(&self, label: &str, mut call: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let Some(delay) = self.delay_for(&error) else {
                return Err(error);
            };
            if let Some(max) = self.max_retries
                && attempt >= max
            {
                warn!(call = label, attempts = attempt + 1, "Retry limit reached");
                return Err(error);
            }

            attempt += 1;
            warn!(
                call = label,
                status = error.status().unwrap_or_default(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Transient API error, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
