//! GoHighLevel Client
//!
//! Main client for the API, combining credentials, the rate limiter and
//! the HTTP layer. Every attempt, retries included, is admitted by the
//! rate limiter first.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::auth::Credential;
use super::error::{GhlError, Result};
use super::http::{GhlHttpClient, Outcome, PreparedRequest, TransientKind};
use super::rate_limit::RateLimiter;
use crate::config::{DEFAULT_API_VERSION, DEFAULT_BASE_URL};

/// Placeholder substituted with the location id in path templates
pub const LOCATION_PLACEHOLDER: &str = "{locationId}";

/// Name of the location id field in queries and bodies
pub const LOCATION_FIELD: &str = "locationId";

/// Where an endpoint expects the location id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationPlacement {
    #[default]
    None,
    Query,
    Body,
    Path,
}

/// An API call before credentials and location are applied
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base URL, already percent-encoded
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub location: LocationPlacement,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            location: LocationPlacement::None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn location(mut self, placement: LocationPlacement) -> Self {
        self.location = placement;
        self
    }

    fn has_query(&self, key: &str) -> bool {
        self.query.iter().any(|(k, _)| k == key)
    }
}

/// Bounded exponential back-off shared by 429 and transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given (1-based) failed attempt: base * 2^(attempt-1), capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// Progress of one `send` call
#[derive(Debug)]
enum AttemptState {
    Attempting(u32),
    Succeeded(Value),
    Failed(GhlError),
}

/// Main GoHighLevel client (the transport used by every command)
#[derive(Clone)]
pub struct GhlClient {
    http: GhlHttpClient,
    credential: Credential,
    base_url: String,
    api_version: String,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl GhlClient {
    /// Create a client against the production API with default limits
    pub fn new(credential: Credential) -> Result<Self> {
        Self::builder(credential).build()
    }

    pub fn builder(credential: Credential) -> GhlClientBuilder {
        GhlClientBuilder::new(credential)
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send a request, retrying transient failures under the retry policy
    pub async fn send(&self, request: &ApiRequest) -> Result<Value> {
        let prepared = self.prepare(request)?;
        let mut state = AttemptState::Attempting(1);

        loop {
            state = match state {
                AttemptState::Attempting(attempt) => self.step(&prepared, attempt).await,
                AttemptState::Succeeded(value) => return Ok(value),
                AttemptState::Failed(err) => {
                    tracing::debug!("{} {} failed: {}", prepared.method, prepared.url.path(), err);
                    return Err(err);
                }
            };
        }
    }

    /// Run one attempt and decide the next state
    async fn step(&self, request: &PreparedRequest, attempt: u32) -> AttemptState {
        if let Err(err) = self.limiter.acquire_cancellable(&self.cancel).await {
            return AttemptState::Failed(err);
        }

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return AttemptState::Failed(GhlError::Cancelled),
            outcome = self.http.execute(request, self.credential.token(), &self.api_version) => outcome,
        };

        match outcome {
            Outcome::Success(value) => AttemptState::Succeeded(value),
            Outcome::Fatal(err) => AttemptState::Failed(err),
            Outcome::Transient { kind, message, .. } if attempt >= self.policy.max_attempts => {
                AttemptState::Failed(exhausted(kind, message, attempt))
            }
            Outcome::Transient {
                retry_after,
                message,
                ambiguous,
                ..
            } => {
                let delay = retry_after.unwrap_or_else(|| self.policy.backoff(attempt));
                if ambiguous && request.method == Method::POST {
                    tracing::warn!(
                        "Retrying POST {} after an ambiguous failure; the earlier attempt may already have been applied",
                        request.url.path()
                    );
                }
                tracing::warn!(
                    "Attempt {}/{} of {} {} failed ({}), retrying in {:?}",
                    attempt,
                    self.policy.max_attempts,
                    request.method,
                    request.url.path(),
                    message,
                    delay
                );
                match self.sleep(delay).await {
                    Ok(()) => AttemptState::Attempting(attempt + 1),
                    Err(err) => AttemptState::Failed(err),
                }
            }
        }
    }

    async fn sleep(&self, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GhlError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Inject the location id and resolve the absolute URL
    fn prepare(&self, request: &ApiRequest) -> Result<PreparedRequest> {
        let mut path = request.path.clone();
        let mut query = request.query.clone();
        let mut body = request.body.clone();

        match request.location {
            LocationPlacement::None => {}
            LocationPlacement::Query => {
                if !request.has_query(LOCATION_FIELD) {
                    let location = self.credential.require_location()?;
                    query.push((LOCATION_FIELD.to_string(), location.to_string()));
                }
            }
            LocationPlacement::Body => {
                let object = match body.get_or_insert_with(|| Value::Object(Map::new())) {
                    Value::Object(map) => map,
                    _ => {
                        return Err(GhlError::validation(
                            "request body must be a JSON object to carry a location id",
                        ))
                    }
                };
                if !object.contains_key(LOCATION_FIELD) {
                    let location = self.credential.require_location()?;
                    object.insert(LOCATION_FIELD.to_string(), Value::String(location.to_string()));
                }
            }
            LocationPlacement::Path => {
                let location = self.credential.require_location()?;
                path = path.replace(
                    LOCATION_PLACEHOLDER,
                    &urlencoding::encode(location),
                );
            }
        }

        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| GhlError::config(format!("invalid request URL for {path}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }

        Ok(PreparedRequest {
            method: request.method.clone(),
            url,
            body,
        })
    }
}

fn exhausted(kind: TransientKind, message: String, attempts: u32) -> GhlError {
    match kind {
        TransientKind::RateLimited => GhlError::RateLimitExceeded { attempts },
        TransientKind::Network => GhlError::Network {
            message: format!("{message} (gave up after {attempts} attempts)"),
            attempts,
        },
    }
}

/// Builder for [`GhlClient`].
pub struct GhlClientBuilder {
    credential: Credential,
    base_url: String,
    api_version: String,
    limiter: Option<Arc<RateLimiter>>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl GhlClientBuilder {
    fn new(credential: Credential) -> Self {
        Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            limiter: None,
            policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Share a limiter between clients of the same process
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = RetryPolicy {
            max_attempts: policy.max_attempts.max(1),
            ..policy
        };
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Result<GhlClient> {
        let base = self.base_url.trim_end_matches('/').to_string();
        Url::parse(&base).map_err(|e| GhlError::config(format!("invalid base URL {base}: {e}")))?;

        Ok(GhlClient {
            http: GhlHttpClient::new()?,
            credential: self.credential,
            base_url: base,
            api_version: self.api_version,
            limiter: self.limiter.unwrap_or_default(),
            policy: self.policy,
            cancel: self.cancel,
        })
    }
}
