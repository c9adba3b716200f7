use crate::core::KvError;
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Context field read before it was resolved. Caught by the composer,
    /// which resolves the field and re-runs the handler.
    #[error("context field '{0}' is not resolved yet")]
    NotReady(String),

    #[error("no context provider named '{0}'")]
    UnknownContext(String),

    #[error("context provider '{0}' depends on itself")]
    ContextCycle(String),

    #[error("context still unresolved after {limit} passes")]
    ContextPasses { limit: usize },

    #[error("context provider '{0}' timed out")]
    ContextTimeout(String),

    #[error("context provider '{name}' failed: {message}")]
    Provider { name: String, message: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body written for failed requests
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn is_not_ready(&self) -> bool {
        matches!(self, ApiError::NotReady(_))
    }

    /// Status written at the dispatch boundary
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Json(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Kv(KvError::Conflict { .. }) => StatusCode::CONFLICT,
            ApiError::Kv(KvError::UnknownField { .. } | KvError::KindMismatch { .. }) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::CONFLICT => "conflict",
            _ => "internal_error",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let conflict = ApiError::from(KvError::Conflict { key: "k".into() });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.code(), "conflict");

        assert_eq!(
            ApiError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Provider {
                name: "user".into(),
                message: "down".into()
            }
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_ready_is_distinguishable() {
        assert!(ApiError::NotReady("user".into()).is_not_ready());
        assert!(!ApiError::UnknownContext("user".into()).is_not_ready());
    }
}
