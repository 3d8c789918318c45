//! Error types for the Abode client
//!
//! This module provides the error taxonomy used across the client together
//! with structured error codes and production-safe logging helpers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for Abode operations
pub type Result<T> = std::result::Result<T, AbodeError>;

/// Login response asked for a second factor we can provide
pub const MFA_CODE_REQUIRED: &str = "Multi-factor authentication code required for login";

/// Login response asked for a second factor we cannot handle
pub const UNKNOWN_MFA_TYPE: &str = "Unknown multi-factor authentication type";

/// Errors raised by the Abode client
#[derive(Error, Debug)]
pub enum AbodeError {
    /// Invalid credentials, missing or expired token, MFA required
    #[error("Authentication failed: {message}")]
    Authentication { status: Option<u16>, message: String },

    /// The service answered HTTP 429
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        /// Server suggested wait in seconds
        retry_after: Option<u64>,
    },

    /// A successful status carried an empty body, which the service uses
    /// in place of an explicit expired-session answer
    #[error("Authentication failed: empty response from {path}, session expired")]
    SessionExpired { path: String },

    /// Malformed responses, missing fields, rejected writes
    #[error("API error: {message}")]
    Api { status: Option<u16>, message: String },

    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),

    /// The client was shut down
    #[error("Client has been shut down")]
    Closed,
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Connection errors (1000-1099)
    ConnectionTimeout,
    ConnectionLost,

    // Authentication errors (1100-1199)
    InvalidCredentials,
    AuthenticationExpired,
    SessionExpired,

    // Configuration errors (1200-1299)
    ConfigurationInvalid,

    // Data errors (1400-1499)
    ParsingFailed,
    InvalidInput,

    // Resource errors (1500-1599)
    RateLimitExceeded,

    // Service errors (1600-1699)
    ExternalServiceError,

    // Internal errors (1900-1999)
    InternalError,
    ClientClosed,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::ConnectionTimeout => 1001,
            ErrorCode::ConnectionLost => 1003,

            ErrorCode::InvalidCredentials => 1101,
            ErrorCode::AuthenticationExpired => 1102,
            ErrorCode::SessionExpired => 1105,

            ErrorCode::ConfigurationInvalid => 1202,

            ErrorCode::ParsingFailed => 1401,
            ErrorCode::InvalidInput => 1402,

            ErrorCode::RateLimitExceeded => 1502,

            ErrorCode::ExternalServiceError => 1603,

            ErrorCode::InternalError => 1901,
            ErrorCode::ClientClosed => 1904,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1000..=1099 => "connection",
            1100..=1199 => "authentication",
            1200..=1299 => "configuration",
            1400..=1499 => "data",
            1500..=1599 => "resource",
            1600..=1699 => "service",
            1900..=1999 => "internal",
            _ => "unknown",
        }
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Structured error context with additional metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Error code for machine processing
    pub code: ErrorCode,
    /// Component that generated the error
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional metadata about the error
    pub metadata: HashMap<String, serde_json::Value>,
    /// Timestamp when error occurred
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Client correlation id
    pub correlation_id: Option<String>,
}

impl ErrorContext {
    /// Create new error context
    pub fn new(code: ErrorCode, component: &str, operation: &str) -> Self {
        Self {
            code,
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now(),
            correlation_id: None,
        }
    }

    /// Add metadata to error context
    pub fn with_metadata<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set correlation ID for request tracking
    pub fn with_correlation_id<S: Into<String>>(mut self, id: S) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Error representation for production logging
#[derive(Debug, Clone, Serialize)]
pub struct StructuredError {
    pub code: ErrorCode,
    pub code_number: u32,
    pub category: &'static str,
    /// Production-safe error message
    pub message: String,
    pub status: Option<u16>,
    pub retry_after: Option<u64>,
    pub is_retryable: bool,
    pub is_auth_error: bool,
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub severity: ErrorSeverity,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub correlation_id: Option<String>,
}

impl AbodeError {
    /// Create an authentication error without an HTTP status
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication {
            status: None,
            message: msg.into(),
        }
    }

    /// Create an authentication error for an HTTP status
    pub fn authentication_status<S: Into<String>>(status: u16, msg: S) -> Self {
        Self::Authentication {
            status: Some(status),
            message: msg.into(),
        }
    }

    /// Create a rate limit error
    pub fn rate_limit<S: Into<String>>(msg: S, retry_after: Option<u64>) -> Self {
        Self::RateLimit {
            message: msg.into(),
            retry_after,
        }
    }

    /// Create a generic API error
    pub fn api<S: Into<String>>(msg: S) -> Self {
        Self::Api {
            status: None,
            message: msg.into(),
        }
    }

    /// Create a generic API error for an HTTP status
    pub fn api_status<S: Into<String>>(status: u16, msg: S) -> Self {
        Self::Api {
            status: Some(status),
            message: msg.into(),
        }
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            AbodeError::Authentication { status, .. } | AbodeError::Api { status, .. } => *status,
            AbodeError::RateLimit { .. } => Some(429),
            AbodeError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Server suggested wait for rate limit errors
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AbodeError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Map the error to a structured error code
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            AbodeError::Authentication { .. } => ErrorCode::InvalidCredentials,
            AbodeError::RateLimit { .. } => ErrorCode::RateLimitExceeded,
            AbodeError::SessionExpired { .. } => ErrorCode::SessionExpired,
            AbodeError::Api { .. } => ErrorCode::ExternalServiceError,
            AbodeError::Connection(_) => ErrorCode::ConnectionLost,
            AbodeError::Timeout(_) => ErrorCode::ConnectionTimeout,
            AbodeError::Http(e) if e.is_timeout() => ErrorCode::ConnectionTimeout,
            AbodeError::Http(_) => ErrorCode::ConnectionLost,
            AbodeError::Json(_) => ErrorCode::ParsingFailed,
            AbodeError::Config(_) => ErrorCode::ConfigurationInvalid,
            AbodeError::InvalidInput(_) => ErrorCode::InvalidInput,
            AbodeError::Io(_) | AbodeError::Generic(_) => ErrorCode::InternalError,
            AbodeError::Closed => ErrorCode::ClientClosed,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AbodeError::Authentication { .. } => ErrorSeverity::Critical,
            AbodeError::Config(_) => ErrorSeverity::Error,
            AbodeError::RateLimit { .. } | AbodeError::SessionExpired { .. } => {
                ErrorSeverity::Warning
            }
            AbodeError::Connection(_) | AbodeError::Timeout(_) | AbodeError::Http(_) => {
                ErrorSeverity::Warning
            }
            AbodeError::InvalidInput(_) | AbodeError::Json(_) => ErrorSeverity::Warning,
            AbodeError::Closed => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }

    /// Whether the failure is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AbodeError::Connection(_)
                | AbodeError::Timeout(_)
                | AbodeError::Http(_)
                | AbodeError::RateLimit { .. }
                | AbodeError::SessionExpired { .. }
        )
    }

    /// Whether the error belongs to the authentication family
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            AbodeError::Authentication { .. }
                | AbodeError::RateLimit { .. }
                | AbodeError::SessionExpired { .. }
        )
    }

    /// Whether the error happened below the HTTP layer
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AbodeError::Connection(_) | AbodeError::Timeout(_) | AbodeError::Http(_)
        )
    }

    /// Whether the login was refused because a second factor is needed
    pub fn is_mfa_required(&self) -> bool {
        matches!(self, AbodeError::Authentication { message, .. } if message == MFA_CODE_REQUIRED)
    }

    /// Get a production-safe error message
    pub fn sanitized_message(&self) -> String {
        #[cfg(debug_assertions)]
        {
            self.to_string()
        }
        #[cfg(not(debug_assertions))]
        {
            match self {
                AbodeError::Authentication { .. } => "Authentication failed".to_string(),
                AbodeError::RateLimit { .. } => "Rate limit exceeded".to_string(),
                AbodeError::SessionExpired { .. } => "Session expired".to_string(),
                AbodeError::Api { .. } => "Abode API error".to_string(),
                AbodeError::Connection(_) => "Network connection issue".to_string(),
                AbodeError::Timeout(_) => "Operation timed out".to_string(),
                AbodeError::Http(_) => "HTTP request failed".to_string(),
                AbodeError::Json(_) => "Data parsing error".to_string(),
                AbodeError::Config(_) => "Configuration error".to_string(),
                AbodeError::InvalidInput(_) => "Invalid input provided".to_string(),
                AbodeError::Io(_) => "I/O operation failed".to_string(),
                AbodeError::Generic(_) => "Internal error occurred".to_string(),
                AbodeError::Closed => "Client has been shut down".to_string(),
            }
        }
    }

    /// Create a structured error from this error
    pub fn to_structured_error(&self, context: Option<ErrorContext>) -> StructuredError {
        let error_code = self.to_error_code();
        let base_context =
            context.unwrap_or_else(|| ErrorContext::new(error_code.clone(), "unknown", "unknown"));

        StructuredError {
            code: error_code.clone(),
            code_number: error_code.as_number(),
            category: error_code.category(),
            message: self.sanitized_message(),
            status: self.status(),
            retry_after: self.retry_after(),
            is_retryable: self.is_retryable(),
            is_auth_error: self.is_auth_error(),
            component: base_context.component,
            operation: base_context.operation,
            metadata: base_context.metadata,
            severity: self.severity(),
            timestamp: base_context.timestamp,
            correlation_id: base_context.correlation_id,
        }
    }
}

impl From<config::ConfigError> for AbodeError {
    fn from(err: config::ConfigError) -> Self {
        AbodeError::Config(err.to_string())
    }
}

impl From<url::ParseError> for AbodeError {
    fn from(err: url::ParseError) -> Self {
        AbodeError::InvalidInput(format!("Invalid URL: {err}"))
    }
}

/// Error logging and reporting utilities
pub struct ErrorReporter;

impl ErrorReporter {
    /// Log a structured error with appropriate severity
    pub fn log_error(error: &AbodeError, context: Option<ErrorContext>) {
        let structured = error.to_structured_error(context);

        match structured.severity {
            ErrorSeverity::Critical | ErrorSeverity::Error => {
                tracing::error!(
                    error_code = structured.code_number,
                    category = structured.category,
                    status = structured.status,
                    component = structured.component,
                    operation = structured.operation,
                    correlation_id = structured.correlation_id,
                    "Error occurred: {}",
                    structured.message
                );
            }
            ErrorSeverity::Warning => {
                tracing::warn!(
                    error_code = structured.code_number,
                    category = structured.category,
                    status = structured.status,
                    retry_after = structured.retry_after,
                    component = structured.component,
                    operation = structured.operation,
                    correlation_id = structured.correlation_id,
                    "Warning: {}",
                    structured.message
                );
            }
            ErrorSeverity::Info => {
                tracing::info!(
                    error_code = structured.code_number,
                    category = structured.category,
                    component = structured.component,
                    operation = structured.operation,
                    correlation_id = structured.correlation_id,
                    "Info: {}",
                    structured.message
                );
            }
        }
    }

    /// Format error for machine consumers (CLI output, diagnostics)
    pub fn format_api_error(error: &AbodeError) -> serde_json::Value {
        let structured = error.to_structured_error(None);

        let mut response = serde_json::json!({
            "error": {
                "code": structured.code_number,
                "category": structured.category,
                "message": structured.message,
                "retryable": structured.is_retryable,
                "timestamp": structured.timestamp
            }
        });

        if let Some(status) = structured.status {
            response["error"]["status"] = serde_json::Value::from(status);
        }
        if let Some(retry_after) = structured.retry_after {
            response["error"]["retry_after"] = serde_json::Value::from(retry_after);
        }

        response
    }
}

/// Macro for easy structured error logging
#[macro_export]
macro_rules! log_structured_error {
    ($error:expr, $component:expr, $operation:expr) => {
        $crate::error::ErrorReporter::log_error(
            &$error,
            Some($crate::error::ErrorContext::new(
                $error.to_error_code(),
                $component,
                $operation,
            )),
        )
    };
    ($error:expr, $component:expr, $operation:expr, $correlation_id:expr) => {
        $crate::error::ErrorReporter::log_error(
            &$error,
            Some(
                $crate::error::ErrorContext::new($error.to_error_code(), $component, $operation)
                    .with_correlation_id($correlation_id),
            ),
        )
    };
}
