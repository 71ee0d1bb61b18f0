//! HTTP utilities for the GoHighLevel REST API
//!
//! This layer performs exactly one HTTP exchange and classifies the
//! result. Retrying, rate limiting and credential handling live in
//! [`super::client`].

use anyhow::Context;
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::error::GhlError;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Per-attempt timeout; a timed-out attempt counts as a connection failure
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the provider's API version header
pub const VERSION_HEADER: &str = "Version";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// A fully-resolved request: absolute URL, method and optional JSON body
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Value>,
}

/// Why an attempt may succeed if tried again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// HTTP 429
    RateLimited,
    /// 5xx, timeout or connection failure
    Network,
}

/// Result of a single HTTP exchange
#[derive(Debug)]
pub enum Outcome {
    Success(Value),
    Transient {
        kind: TransientKind,
        /// Delay requested by the provider, if any
        retry_after: Option<Duration>,
        message: String,
        /// The request may have reached the server before failing
        ambiguous: bool,
    },
    Fatal(GhlError),
}

/// HTTP client wrapper for GoHighLevel API calls
#[derive(Clone)]
pub struct GhlHttpClient {
    client: Client,
}

impl GhlHttpClient {
    /// Create a new HTTP client
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ghl/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Perform one authenticated exchange and classify the response
    pub async fn execute(&self, request: &PreparedRequest, token: &str, version: &str) -> Outcome {
        tracing::debug!("{} {}", request.method, request.url.path());

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .bearer_auth(token)
            .header(VERSION_HEADER, version)
            .header(ACCEPT, "application/json");

        if let Some(body) = &request.body {
            // Sets Content-Type: application/json
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return classify_send_error(&err),
        };

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return Outcome::Transient {
                    kind: TransientKind::Network,
                    retry_after: None,
                    message: format!("Failed to read response body: {err}"),
                    ambiguous: true,
                }
            }
        };

        classify_response(status, retry_after, &body)
    }
}

/// Map a completed response onto the success/transient/fatal taxonomy
pub fn classify_response(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Outcome {
    if status.is_success() {
        return Outcome::Success(parse_success_body(body));
    }

    // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
    tracing::debug!("API error: {} - {}", status, sanitize_for_log(body));

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Outcome::Transient {
            kind: TransientKind::RateLimited,
            retry_after,
            message: "rate limited by the API".to_string(),
            ambiguous: false,
        };
    }

    if status.is_server_error() {
        let (_, message) = parse_error_envelope(status, body);
        return Outcome::Transient {
            kind: TransientKind::Network,
            retry_after,
            message: format!("HTTP {}: {}", status.as_u16(), message),
            ambiguous: true,
        };
    }

    let (code, message) = parse_error_envelope(status, body);
    Outcome::Fatal(GhlError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

fn classify_send_error(err: &reqwest::Error) -> Outcome {
    tracing::debug!("HTTP request failed: {}", err);

    if err.is_timeout() || err.is_connect() || err.is_request() {
        return Outcome::Transient {
            kind: TransientKind::Network,
            retry_after: None,
            message: format!("connection failed: {err}"),
            // A timeout may fire after the server applied the request
            ambiguous: !err.is_connect(),
        };
    }

    Outcome::Fatal(GhlError::network(format!("request failed: {err}")))
}

/// Empty bodies (e.g. 204) become `null`; non-JSON bodies are wrapped as `{"text": ...}`
fn parse_success_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| serde_json::json!({ "text": body }))
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: f64 = raw.parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Extract `(code, message)` from the provider's error envelope.
///
/// The API answers with `{"message": ..., "error": ...}` where `message` may
/// be a string or a list of strings, and sometimes with a bare `{"msg": ...}`.
pub fn parse_error_envelope(status: StatusCode, body: &str) -> (Option<String>, String) {
    let fallback = || {
        let text = body.trim();
        if text.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            sanitize_for_log(text)
        }
    };

    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return (None, fallback());
    };

    let message = json
        .get("message")
        .or_else(|| json.get("msg"))
        .and_then(value_as_message);

    let code = json
        .get("code")
        .and_then(value_as_code)
        .or_else(|| {
            // `error` is a short label when `message` carries the detail
            message
                .as_ref()
                .and(json.get("error"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });

    let message = message
        .or_else(|| json.get("error").and_then(value_as_message))
        .unwrap_or_else(fallback);

    (code, message)
}

fn value_as_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Value::Object(map) => map.get("message").and_then(value_as_message),
        _ => None,
    }
}

fn value_as_code(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_success_body_parsing() {
        assert!(matches!(
            classify_response(StatusCode::NO_CONTENT, None, ""),
            Outcome::Success(Value::Null)
        ));
        match classify_response(StatusCode::OK, None, "plain text") {
            Outcome::Success(v) => assert_eq!(v, json!({"text": "plain text"})),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_429_is_transient_rate_limit() {
        let outcome = classify_response(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(2)),
            "{}",
        );
        match outcome {
            Outcome::Transient {
                kind, retry_after, ..
            } => {
                assert_eq!(kind, TransientKind::RateLimited);
                assert_eq!(retry_after, Some(Duration::from_secs(2)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_5xx_is_transient_network() {
        let outcome = classify_response(StatusCode::BAD_GATEWAY, None, "");
        assert!(matches!(
            outcome,
            Outcome::Transient {
                kind: TransientKind::Network,
                ..
            }
        ));
    }

    #[test]
    fn test_4xx_is_fatal_api_error_with_envelope() {
        let body = json!({
            "statusCode": 422,
            "message": ["email must be an email", "phone is invalid"],
            "error": "Unprocessable Entity"
        })
        .to_string();
        match classify_response(StatusCode::UNPROCESSABLE_ENTITY, None, &body) {
            Outcome::Fatal(GhlError::Api {
                status,
                code,
                message,
            }) => {
                assert_eq!(status, 422);
                assert_eq!(code.as_deref(), Some("Unprocessable Entity"));
                assert_eq!(message, "email must be an email; phone is invalid");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_error_envelope_fallbacks() {
        let (code, message) = parse_error_envelope(StatusCode::NOT_FOUND, "");
        assert_eq!(code, None);
        assert_eq!(message, "Not Found");

        let (code, message) =
            parse_error_envelope(StatusCode::UNAUTHORIZED, r#"{"msg":"Invalid JWT","code":401}"#);
        assert_eq!(code.as_deref(), Some("401"));
        assert_eq!(message, "Invalid JWT");

        let (_, message) = parse_error_envelope(StatusCode::BAD_REQUEST, "oops");
        assert_eq!(message, "oops");
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("0.5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(500)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let long = "x".repeat(500);
        let sanitized = sanitize_for_log(&long);
        assert!(sanitized.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(sanitized.contains("500 bytes total"));
        assert_eq!(sanitize_for_log("a\nb"), "ab");
    }
}
