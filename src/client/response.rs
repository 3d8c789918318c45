//! Buffered API responses
//!
//! The body is read once when the response arrives. Callers convert it to
//! JSON or text on demand without touching the network again.

use crate::error::{AbodeError, Result};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Fully buffered HTTP response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: String) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Read the whole body of a live response
    pub async fn from_response(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(Self::new(status, headers, body))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Raw body text
    pub fn as_text(&self) -> &str {
        &self.body
    }

    /// Body parsed as JSON
    pub fn as_json(&self) -> Result<Value> {
        serde_json::from_str(&self.body).map_err(AbodeError::from)
    }

    /// Body parsed as JSON, or the raw text as a JSON string when it is not JSON
    pub fn as_json_or_text(&self) -> Value {
        self.as_json()
            .unwrap_or_else(|_| Value::String(self.body.clone()))
    }

    /// Body deserialized into a typed value
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(AbodeError::from)
    }

    /// Whether the body carries no data at all
    pub fn is_empty_body(&self) -> bool {
        let trimmed = self.body.trim();
        trimmed.is_empty() || trimmed == "null"
    }

    /// Whether the server labelled the body as JSON
    pub fn is_json_content(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false)
    }

    /// Best human readable error message: the JSON `message` field when the
    /// body is JSON, the raw text otherwise
    pub fn best_message(&self) -> String {
        if self.is_json_content() {
            return self
                .as_json()
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "Unknown error".to_string());
        }
        self.body.clone()
    }

    /// `Retry-After` in whole seconds, when present and numeric
    pub fn retry_after(&self) -> Option<u64> {
        self.headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    }
}
