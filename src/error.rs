use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The atomic get-or-insert could not settle on one row, or a row lock
    /// could not be taken. Safe to retry.
    #[error("{0} is being updated concurrently, try again")]
    Conflict(&'static str),

    #[error("storage failure, try again")]
    Storage(#[source] StoreError),
}

impl AppError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueGuard(what) => AppError::Conflict(what),
            StoreError::Contended(source) => {
                debug!(error = %source, "row lock not acquired");
                AppError::Conflict("daily log")
            }
            other => AppError::Storage(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation("body", rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::validation("path", rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::validation("query", rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Storage(source) => error!(error = %source, "storage failure"),
            AppError::Conflict(what) => warn!(what, "retryable conflict"),
            _ => {}
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_text_does_not_leak_into_message() {
        let err = AppError::from(StoreError::Unavailable("relation \"foods\" missing".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "storage failure, try again");
    }

    #[test]
    fn unique_guard_becomes_retryable_conflict() {
        let err = AppError::from(StoreError::UniqueGuard("daily log"));
        assert!(matches!(err, AppError::Conflict("daily log")));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn lock_contention_becomes_retryable_conflict() {
        let err = AppError::from(StoreError::Contended(sqlx::Error::PoolTimedOut));
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "daily log is being updated concurrently, try again");
    }

    #[test]
    fn unauthorized_is_401() {
        let err = AppError::Unauthorized("Missing Authorization header");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Missing Authorization header");
    }

    #[test]
    fn validation_names_the_field() {
        let err = AppError::validation("items[0].massGrams", "must be greater than 0");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "invalid items[0].massGrams: must be greater than 0"
        );
    }
}
