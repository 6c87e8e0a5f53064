//! HTTP plumbing shared by the backend adapters.
//!
//! Every function here turns a transport failure or a non-success response
//! into a classified [`BackendError`]. Status classification is pure so it
//! can be tested without a server.

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::Deserialize;

use colloquy_types::llm::{BackendError, ErrorKind};

/// Maps `(status, body message, retry-after hint)` to a classified error.
pub type StatusClassifier = fn(u16, &str, Option<u64>) -> BackendError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest backend error text kept in `BackendError::original`.
const MAX_ORIGINAL_LEN: usize = 500;

/// Build a client whose read timeout is the "no data within window" limit.
pub fn build_client(read_timeout_secs: u64) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(Duration::from_secs(read_timeout_secs.max(1)))
        .build()
        .map_err(|e| BackendError::general(format!("failed to create HTTP client: {e}")))
}

/// Classify a `reqwest` transport error.
pub fn classify_transport(err: &reqwest::Error) -> BackendError {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() {
        ErrorKind::BackendUnreachable
    } else if err.is_request() || err.is_body() || err.is_decode() {
        ErrorKind::NetworkError
    } else {
        ErrorKind::GeneralError
    };
    BackendError::new(kind, format!("HTTP request failed: {err}")).with_original(err.to_string())
}

/// Return the response unchanged on 2xx, else a classified error built from
/// its status, body and rate-limit headers.
pub async fn ensure_success(
    response: reqwest::Response,
    classify: StatusClassifier,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let now_ms = chrono::Utc::now().timestamp_millis();
    let retry_after = retry_after_ms(response.headers(), now_ms);
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    tracing::debug!(status = status.as_u16(), %message, "Backend returned an error status");
    Err(classify(status.as_u16(), &message, retry_after))
}

/// Server wait hint in milliseconds.
///
/// Reads `Retry-After` (seconds) first, then `X-RateLimit-Reset`
/// (epoch milliseconds) relative to `now_ms`.
pub fn retry_after_ms(headers: &HeaderMap, now_ms: i64) -> Option<u64> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .map(str::to_string)
    };

    if let Some(secs) = header("retry-after").and_then(|v| v.parse::<f64>().ok())
        && secs >= 0.0
    {
        return Some((secs * 1000.0).round() as u64);
    }

    header("x-ratelimit-reset")
        .and_then(|v| v.parse::<i64>().ok())
        .map(|reset| reset - now_ms)
        .filter(|remaining| *remaining > 0)
        .map(|remaining| remaining as u64)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Nested { error: NestedError },
    Flat { error: String },
    Detail { detail: String },
}

#[derive(Debug, Deserialize)]
struct NestedError {
    message: String,
}

/// Extract the human-readable message from a JSON error body, falling back
/// to the raw (truncated) body text.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody::Nested { error }) => error.message,
        Ok(ErrorBody::Flat { error }) => error,
        Ok(ErrorBody::Detail { detail }) => detail,
        Err(_) => truncate(body.trim()),
    }
}

pub fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_ORIGINAL_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Whether a hosted-service rate-limit message describes a hard period cap
/// rather than transient throttling.
pub fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["quota", "per-day", "per day", "daily", "credits", "insufficient balance"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Classification for hosted OpenAI-compatible services (router, search).
pub fn classify_hosted_status(status: u16, message: &str, retry_after: Option<u64>) -> BackendError {
    let lower = message.to_lowercase();
    let kind = match status {
        402 => ErrorKind::QuotaExceeded,
        429 if is_quota_message(message) => ErrorKind::QuotaExceeded,
        429 => ErrorKind::RateLimited,
        404 => ErrorKind::ModelNotFound,
        400 | 413 | 422
            if lower.contains("context length")
                || lower.contains("context window")
                || lower.contains("too many tokens")
                || lower.contains("too long") =>
        {
            ErrorKind::ContextTooLong
        }
        400 | 422
            if lower.contains("not a valid model")
                || lower.contains("invalid model")
                || lower.contains("model not found")
                || lower.contains("no endpoints found") =>
        {
            ErrorKind::ModelNotFound
        }
        408 | 504 => ErrorKind::Timeout,
        502 | 503 => ErrorKind::BackendUnreachable,
        _ => ErrorKind::GeneralError,
    };

    let summary = match status {
        401 | 403 => "authentication failed".to_string(),
        _ => format!("HTTP {status}"),
    };

    let error = BackendError::new(kind, summary).with_original(truncate(message));
    match kind {
        ErrorKind::RateLimited | ErrorKind::QuotaExceeded => error.with_retry_after(retry_after),
        _ => error,
    }
}
