use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the HTTP layer and the binaries
#[derive(Error, Debug)]
pub enum AppError {
    /// Request body failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed search request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown route or collection
    #[error("Not found: {0}")]
    NotFound(String),

    /// Search engine or schema provider did not answer in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Search engine unreachable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected the query; details stay in the logs
    #[error("Search failed")]
    SearchFailed,

    /// Settings or schema files could not be loaded
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Reading schema directories or writing response streams
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Broken invariant inside the compiler
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status sent to the client
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Timeout(_) | AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::SearchFailed => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code in the error body
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::SearchFailed => "SEARCH_FAILED",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show a client. Engine and internal failures are reported
    /// generically; the detail only reaches the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) | AppError::Io(_) => "Internal error".to_string(),
            AppError::Configuration(_) => "Service misconfigured".to_string(),
            AppError::Timeout(_) => "Search timed out".to_string(),
            AppError::Unavailable(_) => "Search engine unavailable".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the client may retry the identical request
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Timeout(_) | AppError::Unavailable(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(code, status = status.as_u16(), error = %self, "Search request failed");
        } else {
            tracing::warn!(code, status = status.as_u16(), error = %self, "Search request rejected");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.public_message(),
                "status": status.as_u16(),
                "retryable": self.is_retryable(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result of an HTTP handler or binary setup step
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::BadRequest("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Validation("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Timeout("test".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AppError::SearchFailed.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(AppError::SearchFailed.error_code(), "SEARCH_FAILED");
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err = AppError::Internal("permission filter missing from branch 2".to_string());
        assert_eq!(err.public_message(), "Internal error");
        assert!(!err.is_retryable());
        assert!(AppError::Unavailable("connection refused".to_string()).is_retryable());
    }

    #[test]
    fn test_engine_failures_hide_transport_detail() {
        let detail = "error sending request for url (http://es.internal:9200/sample/_search?preference=abc)";

        let timeout = AppError::Timeout(detail.to_string());
        assert_eq!(timeout.public_message(), "Search timed out");
        assert!(timeout.is_retryable());

        let unavailable = AppError::Unavailable(detail.to_string());
        assert_eq!(unavailable.public_message(), "Search engine unavailable");
        assert!(!unavailable.public_message().contains("preference"));
    }
}
