//! HTTP client for the analytics platform queried by reportflow.
//!
//! # Example
//!
//! ```no_run
//! use reportflow_client::{AnalyticsClient, Result};
//! use serde_json::json;
//!
//! # async fn example() -> Result<()> {
//! let client = AnalyticsClient::builder()
//!     .environment("mypurecloud.com")
//!     .credentials("client-id", "client-secret")
//!     .build()?;
//!
//! client.authenticate().await?;
//!
//! let body = json!({
//!     "interval": "2024-01-01T00:00:00Z/2024-01-02T00:00:00Z",
//!     "paging": {"pageSize": 100, "pageNumber": 1}
//! });
//! let page = client.analytics().conversation_details(&body).await?;
//! println!("{}", page["conversations"]);
//! # Ok(())
//! # }
//! ```
//!
//! # API Coverage
//!
//! - **Analytics**: conversation/user detail and aggregate queries
//! - **Users**: list users, optionally restricted to ids
//! - **Routing**: list queues
//! - **Conversations**: get a conversation
//! - **Authorization**: list permissions
//!
//! Failed calls surface as [`Error::Api`] with the HTTP status and, for 429
//! responses, the rate limit reset hint in seconds.

pub mod api;
pub mod client;
pub mod error;
pub mod types;

pub use api::{PlatformApi, QueuesQuery, UsersQuery};
pub use client::{AnalyticsClient, ClientBuilder, DEFAULT_ENVIRONMENT, RATE_LIMIT_RESET_HEADER};
pub use error::{Error, Result};
pub use types::{Paging, TokenResponse};
