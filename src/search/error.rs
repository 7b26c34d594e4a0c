//! Error types for search operations

use crate::error::AppError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while compiling or executing a search
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Malformed request parameters or body
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// One or more requested document types are not registered
    #[error("Invalid type(s): {}", .0.join(", "))]
    InvalidTypes(Vec<String>),

    /// A filter block references a flag that the filter set does not define
    #[error("Filter block {block} references unknown flag '{flag}'")]
    UnknownFlag { block: usize, flag: String },

    /// Two flags share the same name
    #[error("Duplicate flag name '{0}'")]
    DuplicateFlag(String),

    /// The search engine rejected the query or returned an unexpected payload
    #[error("Search backend error: {0}")]
    Backend(String),

    /// The search engine or schema provider did not answer in time
    #[error("Search timed out: {0}")]
    Timeout(String),

    /// Connection level failure talking to the search engine
    #[error("Search transport error: {0}")]
    Transport(String),

    /// The compiled query lost or altered the caller's permission filter
    #[error("Permission filter violation: {0}")]
    PermissionViolation(String),

    /// Query tree construction reached an impossible state
    #[error("Invalid query state: {0}")]
    InvalidState(String),

    /// Schema or mapping could not be loaded
    #[error("Schema error: {0}")]
    Schema(String),

    /// Response or request (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SearchError {
    /// Request-construction errors that never reach the search engine
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SearchError::BadRequest(_)
                | SearchError::InvalidTypes(_)
                | SearchError::UnknownFlag { .. }
                | SearchError::DuplicateFlag(_)
        )
    }

    /// Failures the caller may retry as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::Timeout(_) | SearchError::Transport(_))
    }

    /// Fatal internal invariant failures
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            SearchError::PermissionViolation(_) | SearchError::InvalidState(_)
        )
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            SearchError::Transport(err.to_string())
        } else if err.is_decode() {
            SearchError::Serialization(err.to_string())
        } else {
            SearchError::Backend(err.to_string())
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::BadRequest(msg) => AppError::BadRequest(msg),
            SearchError::InvalidTypes(_)
            | SearchError::UnknownFlag { .. }
            | SearchError::DuplicateFlag(_) => AppError::BadRequest(err.to_string()),
            SearchError::Timeout(msg) => AppError::Timeout(msg),
            SearchError::Transport(msg) => AppError::Unavailable(msg),
            SearchError::Backend(_) | SearchError::Serialization(_) | SearchError::Schema(_) => {
                AppError::SearchFailed
            }
            SearchError::PermissionViolation(_) | SearchError::InvalidState(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SearchError::InvalidTypes(vec!["Nope".to_string()]).is_client_error());
        assert!(SearchError::Timeout("slow".to_string()).is_retryable());
        assert!(!SearchError::Backend("500".to_string()).is_retryable());
        assert!(SearchError::PermissionViolation("x".to_string()).is_invariant_violation());
    }

    #[test]
    fn test_invalid_types_lists_every_name() {
        let err = SearchError::InvalidTypes(vec!["Foo".to_string(), "Bar".to_string()]);
        assert_eq!(err.to_string(), "Invalid type(s): Foo, Bar");
    }

    #[test]
    fn test_bad_request_is_prefixed_once() {
        let app: AppError =
            SearchError::BadRequest("limit=all requires a generator".to_string()).into();
        assert_eq!(app.to_string(), "Bad request: limit=all requires a generator");

        let app: AppError = SearchError::InvalidTypes(vec!["Nope".to_string()]).into();
        assert_eq!(app.to_string(), "Bad request: Invalid type(s): Nope");
    }

    #[test]
    fn test_backend_error_does_not_leak_detail() {
        let app: AppError = SearchError::Backend("query [bool] malformed".to_string()).into();
        assert!(!app.to_string().contains("bool"));
    }
}
