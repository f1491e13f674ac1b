//! Remote HTTP/HTTPS settings backend.

use super::{Setting, SettingSelector, SettingsClient, SettingsPage};
use crate::core::{ConnectionTarget, RetryPolicy, StoreMetadata};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header::HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// API version sent with every request.
const API_VERSION: &str = "1.0";

/// Authentication method for HTTP requests.
#[derive(Clone)]
pub enum HttpAuth {
    /// No authentication
    None,
    /// Bearer token authentication
    Bearer(String),
    /// Basic authentication (username, password)
    Basic(String, String),
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<Setting>,
    #[serde(rename = "@nextLink", default)]
    next_link: Option<String>,
}

/// Settings client for a REST key-value API.
///
/// Point reads are `GET {endpoint}/kv/{key}?label=...`; listings are
/// `GET {endpoint}/kv?key=...&label=...` and continue through the `@nextLink`
/// returned with each page. Connection failures, timeouts, `429` and `5xx`
/// responses are retried with exponential backoff according to the configured
/// [`RetryPolicy`].
///
/// # Examples
///
/// ```rust,no_run
/// use sentinel_config::backend::HttpSettingsClient;
/// use std::time::Duration;
///
/// # fn example() -> sentinel_config::error::Result<()> {
/// let client = HttpSettingsClient::builder()
///     .with_endpoint("https://store.example.com")
///     .with_auth_token("secret-token")
///     .with_timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct HttpSettingsClient {
    endpoint: Url,
    client: Client,
    auth: HttpAuth,
    retry: RetryPolicy,
}

impl HttpSettingsClient {
    /// Create a new builder for constructing an HTTP settings client.
    pub fn builder() -> HttpSettingsClientBuilder {
        HttpSettingsClientBuilder::new()
    }

    /// Build a client from parsed store metadata.
    ///
    /// A connection string provides both the endpoint and basic-auth credentials
    /// (`Id`, `Secret`); a host uses `auth_token` as a bearer token when given.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the connection string or endpoint is malformed.
    pub fn from_metadata(metadata: &StoreMetadata, auth_token: Option<String>) -> Result<Self> {
        let mut builder = Self::builder().with_retry_policy(metadata.retry);

        builder = match &metadata.target {
            ConnectionTarget::Host(host) => {
                let builder = builder.with_endpoint(host.clone());
                match auth_token {
                    Some(token) => builder.with_auth_token(token),
                    None => builder,
                }
            }
            ConnectionTarget::ConnectionString(cs) => {
                let parsed = parse_connection_string(cs)?;
                builder
                    .with_endpoint(parsed.endpoint)
                    .with_basic_auth(parsed.id, parsed.secret)
            }
        };

        builder.build()
    }

    /// The endpoint requests are sent to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn setting_url(&self, key: &str, label: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ConfigError::Configuration(format!("Invalid endpoint: {}", self.endpoint)))?
            .pop_if_empty()
            .push("kv")
            .push(key);
        {
            let mut query = url.query_pairs_mut();
            if let Some(label) = label {
                query.append_pair("label", label);
            }
            query.append_pair("api-version", API_VERSION);
        }
        Ok(url)
    }

    fn listing_url(&self, selector: &SettingSelector) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ConfigError::Configuration(format!("Invalid endpoint: {}", self.endpoint)))?
            .pop_if_empty()
            .push("kv");
        url.query_pairs_mut()
            .append_pair("key", &selector.key_filter)
            .append_pair("label", &selector.label_filter)
            .append_pair("api-version", API_VERSION);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(match &self.auth {
            HttpAuth::None => request,
            HttpAuth::Bearer(token) => {
                let header_value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| ConfigError::Configuration(format!("Invalid bearer token: {}", e)))?;
                request.header("Authorization", header_value)
            }
            HttpAuth::Basic(username, password) => request.basic_auth(username, Some(password)),
        })
    }

    /// Send a GET request, retrying transient failures.
    async fn execute(&self, url: Url) -> Result<Response> {
        let mut attempt = 0;

        loop {
            let request = self.authorize(self.client.get(url.clone()))?;
            let retry_reason = match request.send().await {
                Ok(response) if is_retryable(response.status()) => {
                    format!("status {}", response.status())
                }
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => e.to_string(),
                Err(e) => {
                    return Err(ConfigError::Transport(format!("HTTP request failed: {}", e)));
                }
            };

            if attempt >= self.retry.max_retries {
                return Err(ConfigError::Transport(format!(
                    "HTTP request to {} failed after {} attempts: {}",
                    url.path(),
                    attempt + 1,
                    retry_reason
                )));
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                path = url.path(),
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                reason = %retry_reason,
                "retrying settings request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl SettingsClient for HttpSettingsClient {
    async fn get_setting(&self, key: &str, label: Option<&str>) -> Result<Setting> {
        let response = self.execute(self.setting_url(key, label)?).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ConfigError::NotFound {
                key: key.to_string(),
                label: label.map(str::to_string),
            });
        }
        if !status.is_success() {
            return Err(ConfigError::Transport(format!(
                "HTTP request failed with status {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        decode(response, "setting").await
    }

    async fn list_settings(
        &self,
        selector: &SettingSelector,
        continuation: Option<&str>,
    ) -> Result<SettingsPage> {
        let url = match continuation {
            Some(link) => self.endpoint.join(link).map_err(|e| {
                ConfigError::Transport(format!("Invalid continuation link '{}': {}", link, e))
            })?,
            None => self.listing_url(selector)?,
        };
        debug!(path = url.path(), "listing settings page");

        let response = self.execute(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::Transport(format!(
                "HTTP request failed with status {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let page: ListResponse = decode(response, "settings page").await?;

        Ok(SettingsPage {
            settings: page.items,
            next_page: page.next_link,
        })
    }

    fn name(&self) -> String {
        format!("http:{}", self.endpoint)
    }
}

/// Builder for constructing an `HttpSettingsClient`.
pub struct HttpSettingsClientBuilder {
    endpoint: Option<String>,
    auth: HttpAuth,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpSettingsClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            auth: HttpAuth::None,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the endpoint of the store.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set Bearer token authentication.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth = HttpAuth::Bearer(token.into());
        self
    }

    /// Set Basic authentication.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth = HttpAuth::Basic(username.into(), password.into());
        self
    }

    /// Set the per-request timeout.
    ///
    /// Default is 10 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy for transient failures.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the HTTP settings client.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No endpoint is provided or it is not a valid base URL
    /// - The HTTP client cannot be constructed
    pub fn build(self) -> Result<HttpSettingsClient> {
        let endpoint = self.endpoint.ok_or_else(|| {
            ConfigError::Configuration("Endpoint is required for HttpSettingsClient".to_string())
        })?;

        let mut endpoint = Url::parse(&endpoint)
            .map_err(|e| ConfigError::Configuration(format!("Invalid endpoint '{}': {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(ConfigError::Configuration(format!(
                "Endpoint '{}' cannot be used as a base URL",
                endpoint
            )));
        }
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ConfigError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpSettingsClient {
            endpoint,
            client,
            auth: self.auth,
            retry: self.retry,
        })
    }
}

impl Default for HttpSettingsClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

struct ConnectionString {
    endpoint: String,
    id: String,
    secret: String,
}

/// Read a JSON body, keeping the serde error position in the message.
async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|e| ConfigError::Transport(format!("Failed to read {} body: {}", what, e)))?;

    serde_json::from_str(&body)
        .map_err(|e| ConfigError::DeserializationError(format!("Failed to parse {}: {}", what, e)))
}

fn parse_connection_string(cs: &str) -> Result<ConnectionString> {
    let mut endpoint = None;
    let mut id = None;
    let mut secret = None;

    for part in cs.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = part.split_once('=').ok_or_else(|| {
            ConfigError::Configuration(format!("Malformed connection string segment '{}'", part))
        })?;
        match name.trim().to_ascii_lowercase().as_str() {
            "endpoint" => endpoint = Some(value.trim().to_string()),
            "id" => id = Some(value.trim().to_string()),
            "secret" => secret = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let missing = |field: &str| {
        ConfigError::Configuration(format!("Connection string is missing '{}'", field))
    };

    Ok(ConnectionString {
        endpoint: endpoint.ok_or_else(|| missing("Endpoint"))?,
        id: id.ok_or_else(|| missing("Id"))?,
        secret: secret.ok_or_else(|| missing("Secret"))?,
    })
}
