//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{AnalyticsApi, AuthorizationApi, ConversationsApi, RoutingApi, UsersApi};
use crate::error::{Error, ErrorResponse, Result};
use crate::types::TokenResponse;

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default platform environment.
pub const DEFAULT_ENVIRONMENT: &str = "mypurecloud.com";

/// Response header carrying the seconds remaining until a rate limit resets.
pub const RATE_LIMIT_RESET_HEADER: &str = "inin-ratelimit-reset";

/// Analytics platform client.
///
/// Cheap to clone; clones share the HTTP connection pool and the access
/// token, so one client can serve concurrently running jobs.
///
/// # Example
///
/// ```no_run
/// use reportflow_client::AnalyticsClient;
///
/// # async fn example() -> reportflow_client::Result<()> {
/// let client = AnalyticsClient::builder()
///     .environment("mypurecloud.com")
///     .credentials("client-id", "client-secret")
///     .build()?;
///
/// client.authenticate().await?;
/// let queues = client.routing().queues(&Default::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AnalyticsClient {
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
pub(crate) struct ClientInner {
    pub(crate) http: reqwest::Client,
    pub(crate) api_url: Url,
    pub(crate) login_url: Url,
    pub(crate) credentials: Option<(String, String)>,
    pub(crate) timeout: Duration,
    pub(crate) token: RwLock<Option<String>>,
}

impl std::fmt::Debug for AnalyticsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsClient")
            .field("api_url", &self.inner.api_url.as_str())
            .field("login_url", &self.inner.login_url.as_str())
            .finish()
    }
}

impl AnalyticsClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the API base URL.
    pub fn api_url(&self) -> &Url {
        &self.inner.api_url
    }

    /// Get the login base URL.
    pub fn login_url(&self) -> &Url {
        &self.inner.login_url
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authentication
    // ─────────────────────────────────────────────────────────────────────────

    /// Exchange the client credentials for an access token.
    ///
    /// The token is stored on the client and attached to every later request.
    pub async fn authenticate(&self) -> Result<()> {
        let (client_id, client_secret) = match &self.inner.credentials {
            Some((id, _)) if id.is_empty() => {
                return Err(Error::Auth("client id not set".to_string()));
            }
            Some((_, secret)) if secret.is_empty() => {
                return Err(Error::Auth("client secret not set".to_string()));
            }
            Some((id, secret)) => (id, secret),
            None => return Err(Error::Auth("client credentials not set".to_string())),
        };

        let url = self.inner.login_url.join("oauth/token")?;
        debug!(url = %url, "requesting client credentials token");

        let response = self
            .inner
            .http
            .post(url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .timeout(self.inner.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            debug!(status, "login rejected");
            return Err(Error::Auth(format!(
                "login rejected with HTTP {}; check the client id and secret",
                status
            )));
        }

        let token: TokenResponse = response.json().await?;
        *self.inner.token.write().await = Some(token.access_token);
        info!("Authenticated against {}", self.inner.login_url);
        Ok(())
    }

    /// Whether an access token is held.
    pub async fn is_authenticated(&self) -> bool {
        self.inner.token.read().await.is_some()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the analytics query API.
    pub fn analytics(&self) -> AnalyticsApi {
        AnalyticsApi::new(self.clone())
    }

    /// Access the users API.
    pub fn users(&self) -> UsersApi {
        UsersApi::new(self.clone())
    }

    /// Access the routing API.
    pub fn routing(&self) -> RoutingApi {
        RoutingApi::new(self.clone())
    }

    /// Access the conversations API.
    pub fn conversations(&self) -> ConversationsApi {
        ConversationsApi::new(self.clone())
    }

    /// Access the authorization API.
    pub fn authorization(&self) -> AuthorizationApi {
        AuthorizationApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a URL for an API path.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        self.inner
            .api_url
            .join(&format!("api/v2/{}", path))
            .map_err(Error::from)
    }

    async fn bearer(&self) -> Result<String> {
        self.inner
            .token
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Auth("not authenticated; call authenticate() first".to_string()))
    }

    /// Make a GET request.
    pub(crate) async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_with_query(path, &[]).await
    }

    /// Make a GET request with query pairs.
    pub(crate) async fn get_with_query<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let url = self.url(path)?;
        self.send(|token| {
            self.inner
                .http
                .get(url.clone())
                .query(query)
                .bearer_auth(token)
        })
        .await
    }

    /// Make a POST request.
    pub(crate) async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let url = self.url(path)?;
        self.send(|token| self.inner.http.post(url.clone()).json(body).bearer_auth(token))
            .await
    }

    /// Send a request built for the current token.
    ///
    /// A 401 re-authenticates once and replays the request with the new token.
    async fn send<T, F>(&self, build: F) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self.bearer().await?;
        let response = build(&token).timeout(self.inner.timeout).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED || self.inner.credentials.is_none() {
            return self.handle_response(response).await;
        }

        warn!("Access token rejected, re-authenticating");
        self.authenticate().await?;
        let token = self.bearer().await?;
        let response = build(&token).timeout(self.inner.timeout).send().await?;
        self.handle_response(response).await
    }

    /// Handle a response, extracting the body or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(self.extract_error(response).await)
        }
    }

    /// Extract an error from a failed response.
    async fn extract_error(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let rate_limit_reset = parse_reset_header(response.headers());

        match response.json::<ErrorResponse>().await {
            Ok(err) => Error::Api {
                status,
                code: if err.code.is_empty() {
                    "unknown".to_string()
                } else {
                    err.code
                },
                message: if err.message.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    err.message
                },
                rate_limit_reset,
            },
            Err(_) => Error::Api {
                status,
                code: "unknown".to_string(),
                message: format!("HTTP {}", status),
                rate_limit_reset,
            },
        }
    }
}

/// Read the rate limit reset hint, falling back to `Retry-After`.
fn parse_reset_header(headers: &HeaderMap) -> Option<u64> {
    [RATE_LIMIT_RESET_HEADER, "retry-after"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.trim().parse::<f64>().ok())
        .map(|secs| secs.max(0.0).ceil() as u64)
}

/// Builder for creating an [`AnalyticsClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    environment: String,
    api_url: Option<String>,
    login_url: Option<String>,
    credentials: Option<(String, String)>,
    timeout: Duration,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            api_url: None,
            login_url: None,
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }

    /// Set the platform environment (e.g. `mypurecloud.com`).
    ///
    /// Derives `https://api.<env>/` and `https://login.<env>/` unless
    /// overridden by [`api_url`](Self::api_url) / [`login_url`](Self::login_url).
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Override the API base URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Override the login base URL.
    pub fn login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = Some(url.into());
        self
    }

    /// Set the OAuth client credentials.
    pub fn credentials(mut self, client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.credentials = Some((client_id.into(), secret.into()));
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<AnalyticsClient> {
        let environment = self.environment.trim().trim_matches('/');
        if environment.is_empty() && (self.api_url.is_none() || self.login_url.is_none()) {
            return Err(Error::Config("environment is required".to_string()));
        }

        let api_url = normalize_base(
            self.api_url
                .unwrap_or_else(|| format!("https://api.{}", environment)),
        )?;
        let login_url = normalize_base(
            self.login_url
                .unwrap_or_else(|| format!("https://login.{}", environment)),
        )?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("reportflow-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        Ok(AnalyticsClient {
            inner: Arc::new(ClientInner {
                http,
                api_url,
                login_url,
                credentials: self.credentials,
                timeout: self.timeout,
                token: RwLock::new(None),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a base URL and make sure it ends with a slash so joins append.
fn normalize_base(raw: String) -> Result<Url> {
    let mut url = Url::parse(&raw)?;
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_derives_urls_from_environment() {
        let client = ClientBuilder::new()
            .environment("mypurecloud.ie")
            .build()
            .unwrap();

        assert_eq!(client.api_url().as_str(), "https://api.mypurecloud.ie/");
        assert_eq!(client.login_url().as_str(), "https://login.mypurecloud.ie/");
    }

    #[test]
    fn test_builder_url_overrides() {
        let client = ClientBuilder::new()
            .api_url("http://localhost:8080")
            .login_url("http://localhost:9090/")
            .build()
            .unwrap();

        assert_eq!(client.api_url().as_str(), "http://localhost:8080/");
        assert_eq!(client.login_url().as_str(), "http://localhost:9090/");
    }

    #[test]
    fn test_builder_rejects_empty_environment() {
        let result = ClientBuilder::new().environment("").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_url_building() {
        let client = ClientBuilder::new()
            .api_url("http://localhost:8080")
            .build()
            .unwrap();

        let url = client.url("routing/queues").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/v2/routing/queues");

        let url = client.url("/users").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/v2/users");
    }

    #[test]
    fn test_parse_reset_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_reset_header(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("7"));
        assert_eq!(parse_reset_header(&headers), Some(7));

        headers.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from_static("2.4"));
        assert_eq!(parse_reset_header(&headers), Some(3));
    }

    #[tokio::test]
    async fn test_authenticate_requires_credentials() {
        let client = ClientBuilder::new().build().unwrap();
        let err = client.authenticate().await.unwrap_err();
        assert!(err.is_auth_error());

        let client = ClientBuilder::new().credentials("id", "").build().unwrap();
        let err = client.authenticate().await.unwrap_err();
        assert!(err.to_string().contains("client secret not set"));
    }

    #[tokio::test]
    async fn test_requests_require_token() {
        let client = ClientBuilder::new().build().unwrap();
        assert!(!client.is_authenticated().await);
        let err = client.bearer().await.unwrap_err();
        assert!(err.is_auth_error());
    }
}
