use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Required payload fields were absent or empty.
    MissingFields(Vec<String>),
    /// Unauthorized access error (missing or invalid webhook signature).
    Unauthorized(String),
    /// Error interacting with an external API.
    ExternalApiError {
        /// Upstream service name ("notion", "slack", ...).
        service: &'static str,
        /// HTTP status returned by the upstream, if a response was received.
        status: Option<u16>,
        /// Upstream error detail.
        message: String,
    },
    /// The circuit breaker for an upstream is open; the call was not attempted.
    CircuitOpen(&'static str),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Shorthand for an upstream failure that carries a response status.
    pub fn upstream(service: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        AppError::ExternalApiError {
            service,
            status,
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Network failures (no status), 429 and 5xx are transient; everything
    /// else is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::ExternalApiError { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            AppError::WithContext { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::MissingFields(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ExternalApiError { .. }
            | AppError::CircuitOpen(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::WithContext { source, .. } => source.status_code(),
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::MissingFields(fields) => {
                write!(f, "Missing required fields: {}", fields.join(", "))
            }
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::ExternalApiError {
                service,
                status: Some(status),
                message,
            } => write!(f, "External API error ({} {}): {}", service, status, message),
            AppError::ExternalApiError {
                service,
                status: None,
                message,
            } => write!(f, "External API error ({}): {}", service, message),
            AppError::CircuitOpen(service) => {
                write!(f, "Circuit open for {}: call rejected", service)
            }
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Client errors carry their message; upstream and internal errors are
    /// logged and answered with a generic body.
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AppError::MissingFields(fields) => json!({
                "error": self.to_string(),
                "missing_fields": fields,
            }),
            AppError::BadRequest(msg) => json!({ "error": msg }),
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized webhook call: {}", msg);
                json!({ "error": "Unauthorized" })
            }
            AppError::ExternalApiError { .. } | AppError::CircuitOpen(_) => {
                tracing::error!("Upstream dependency failure: {}", self);
                json!({ "error": "Upstream dependency failure" })
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                json!({ "error": "Internal server error" })
            }
            AppError::WithContext { source, context } => {
                // Log full context chain, respond as the underlying error would
                tracing::error!("Error with context: {} -> {}", context, source);
                return source.as_ref().clone().into_response();
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApiError {
            service: "http",
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("Invalid JSON payload: {}", err))
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::upstream("notion", None, "timeout").is_retryable());
        assert!(AppError::upstream("notion", Some(429), "slow down").is_retryable());
        assert!(AppError::upstream("slack", Some(503), "unavailable").is_retryable());
        assert!(!AppError::upstream("slack", Some(400), "invalid_blocks").is_retryable());
        assert!(!AppError::BadRequest("nope".into()).is_retryable());
    }

    #[test]
    fn test_context_keeps_underlying_status() {
        let err: Result<(), AppError> = Err(AppError::MissingFields(vec!["email".into()]));
        let err = err.context("marketplace webhook").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().starts_with("marketplace webhook: "));
    }

    #[test]
    fn test_upstream_maps_to_500() {
        let err = AppError::upstream("crm", Some(502), "bad gateway");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::CircuitOpen("slack").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
