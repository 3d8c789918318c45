//! Request executor
//!
//! Every API call goes through [`ClientInner::send`]. One attempt is:
//! make sure a young session and a matching token exist, send, classify the
//! answer. The classification feeds [`RetryState`], which decides whether to
//! wait, log in again, recreate the session or give up.

use crate::client::auth::API_KEY_HEADER;
use crate::client::diagnostics::ConnectionStatus;
use crate::client::inner::ClientInner;
use crate::client::response::ApiResponse;
use crate::client::retry::{AttemptOutcome, RetryAction, RetryState};
use crate::error::{AbodeError, Result};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// One logical API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: Option<HeaderMap>,
    pub body: Option<Value>,
    /// Raise ≥400 answers as errors instead of returning them
    pub raise_on_error: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: None,
            body: None,
            raise_on_error: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }
}

/// Map a reqwest failure to the error taxonomy
pub(crate) fn transport_error(e: reqwest::Error) -> AbodeError {
    if e.is_timeout() {
        AbodeError::timeout(e.to_string())
    } else {
        AbodeError::Http(e)
    }
}

/// Classified result of one attempt
enum Attempt {
    /// Answer handed back to the caller
    Done(ApiResponse),
    EmptyBody,
    RateLimited {
        retry_after: Option<u64>,
        message: String,
    },
    Connection(AbodeError),
    Fatal(AbodeError),
}

impl Attempt {
    fn outcome(&self) -> AttemptOutcome {
        match self {
            Attempt::Done(_) => AttemptOutcome::Success,
            Attempt::EmptyBody => AttemptOutcome::EmptyBody,
            Attempt::RateLimited { retry_after, .. } => AttemptOutcome::RateLimited {
                retry_after: *retry_after,
            },
            Attempt::Connection(_) => AttemptOutcome::ConnectionFailure,
            Attempt::Fatal(_) => AttemptOutcome::Fatal,
        }
    }

    /// Errors raised before anything reached the API (session setup, login)
    fn from_setup_error(error: AbodeError) -> Self {
        match error {
            AbodeError::RateLimit {
                message,
                retry_after,
            } => Attempt::RateLimited {
                retry_after,
                message,
            },
            e if e.is_connection_error() => Attempt::Connection(e),
            e => Attempt::Fatal(e),
        }
    }
}

impl ClientInner {
    /// Execute a request with the full retry policy
    pub(crate) async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut state = RetryState::new(&self.config.retry);

        loop {
            let attempt = state.begin_attempt();
            let (result, generation) = self.attempt(&request).await;

            let consecutive_failures = match &result {
                Attempt::Done(response) => {
                    if response.is_success() {
                        self.health.write().await.record_success();
                    }
                    0
                }
                Attempt::EmptyBody => {
                    self.auth.write().await.clear_tokens();
                    0
                }
                Attempt::RateLimited { message, .. } => {
                    self.health
                        .write()
                        .await
                        .set_status(ConnectionStatus::RateLimited, Some(message.clone()));
                    0
                }
                Attempt::Connection(e) => self.health.write().await.record_failure(&e.to_string()),
                Attempt::Fatal(_) => 0,
            };

            let decision = state.on_outcome(result.outcome(), consecutive_failures);

            if decision.recreate_session {
                warn!(
                    consecutive_failures,
                    path = %request.path,
                    "Too many consecutive connection failures, recreating session"
                );
                if let Err(e) = self
                    .recreate_session(generation, "consecutive connection failures")
                    .await
                {
                    warn!("Session recreation failed: {e}");
                }
            }

            match decision.action {
                RetryAction::Stop => return self.finish(result, &request, attempt).await,
                RetryAction::Retry { delay, relogin } => {
                    match &result {
                        Attempt::RateLimited { retry_after, .. } => warn!(
                            path = %request.path,
                            attempt,
                            retry_after = ?retry_after,
                            wait_secs = delay.as_secs_f64(),
                            "Rate limited, waiting before retry"
                        ),
                        Attempt::EmptyBody => info!(
                            path = %request.path,
                            "Empty response body, treating session as expired and logging in again"
                        ),
                        Attempt::Connection(e) => warn!(
                            path = %request.path,
                            attempt,
                            max_attempts = state.max_attempts(),
                            wait_secs = delay.as_secs_f64(),
                            "Connection error, retrying: {e}"
                        ),
                        Attempt::Done(_) | Attempt::Fatal(_) => {}
                    }

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if relogin {
                        if let Err(e) = self.relogin().await {
                            error!(path = %request.path, "Relogin before retry failed: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Turn the final attempt into the caller's result. Failures are logged
    /// once, with the client correlation id attached.
    async fn finish(&self, result: Attempt, request: &ApiRequest, attempts: u32) -> Result<ApiResponse> {
        let error = match result {
            Attempt::Done(response) => return Ok(response),
            Attempt::EmptyBody => AbodeError::SessionExpired {
                path: request.path.clone(),
            },
            Attempt::RateLimited {
                retry_after,
                message,
            } => AbodeError::rate_limit(message, retry_after),
            Attempt::Connection(e) => {
                self.health
                    .write()
                    .await
                    .set_status(ConnectionStatus::Disconnected, Some(e.to_string()));
                e
            }
            Attempt::Fatal(e) => e,
        };

        debug!(path = %request.path, attempts, "Request failed");
        let correlation_id = self.identity.read().await.uuid.clone();
        crate::log_structured_error!(error, "executor", &request.path, correlation_id);
        Err(error)
    }

    /// One attempt. Also returns the session generation it ran on.
    async fn attempt(&self, request: &ApiRequest) -> (Attempt, Option<u64>) {
        let (session, tokens) = match self.authorized_session().await {
            Ok(pair) => pair,
            Err(e) => {
                let generation = self.sessions.generation().await;
                return (Attempt::from_setup_error(e), generation);
            }
        };
        let generation = Some(session.generation());

        let url = match self.config.endpoint(&request.path) {
            Ok(url) => url,
            Err(e) => return (Attempt::Fatal(e), generation),
        };

        let _permit = match session.acquire().await {
            Ok(permit) => permit,
            Err(e) => return (Attempt::Connection(e), generation),
        };

        let mut builder = session
            .http()
            .request(request.method.clone(), url)
            .header(API_KEY_HEADER, tokens.api_key.as_str());
        if let Some(oauth) = &tokens.oauth {
            builder = builder.bearer_auth(oauth);
        }
        if let Some(headers) = &request.headers {
            builder = builder.headers(headers.clone());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, path = %request.path, "Sending API request");

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return (Attempt::Connection(transport_error(e)), generation),
        };
        let response = match ApiResponse::from_response(response).await {
            Ok(response) => response,
            Err(AbodeError::Http(e)) => return (Attempt::Connection(transport_error(e)), generation),
            Err(e) => return (Attempt::Connection(e), generation),
        };

        (self.classify(response, request).await, generation)
    }

    async fn classify(&self, response: ApiResponse, request: &ApiRequest) -> Attempt {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::RateLimited {
                retry_after: response.retry_after(),
                message: response.best_message(),
            };
        }

        if !status.is_client_error() && !status.is_server_error() {
            if status != StatusCode::NO_CONTENT && response.is_empty_body() {
                return Attempt::EmptyBody;
            }
            return Attempt::Done(response);
        }

        let unauthorized = status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN;
        if unauthorized {
            self.auth.write().await.clear_tokens();
        }

        if !request.raise_on_error {
            debug!(status = status.as_u16(), path = %request.path, "Returning error response to caller");
            return Attempt::Done(response);
        }

        let message = response.best_message();
        warn!(status = status.as_u16(), path = %request.path, "API request failed: {message}");
        if unauthorized {
            Attempt::Fatal(AbodeError::authentication_status(status.as_u16(), message))
        } else {
            Attempt::Fatal(AbodeError::api_status(status.as_u16(), message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_defaults_to_raising() {
        let request = ApiRequest::get("/api/v1/devices");
        assert_eq!(request.method, Method::GET);
        assert!(request.raise_on_error);
        assert!(request.body.is_none());

        let request = ApiRequest::put("/api/v1/areas")
            .with_body(serde_json::json!({"area": "1"}))
            .raise_on_error(false);
        assert_eq!(request.method, Method::PUT);
        assert!(!request.raise_on_error);
        assert!(request.body.is_some());
    }

    #[test]
    fn test_setup_errors_are_classified() {
        assert!(matches!(
            Attempt::from_setup_error(AbodeError::rate_limit("slow down", Some(10))).outcome(),
            AttemptOutcome::RateLimited { retry_after: Some(10) }
        ));
        assert_eq!(
            Attempt::from_setup_error(AbodeError::timeout("login")).outcome(),
            AttemptOutcome::ConnectionFailure
        );
        assert_eq!(
            Attempt::from_setup_error(AbodeError::authentication("bad password")).outcome(),
            AttemptOutcome::Fatal
        );
    }
}
