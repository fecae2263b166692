use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

/// Why a caller may not start an attempt right now. Each reason asks for a
/// different user action: wait, give up, or pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    NotYetOpen,
    Closed,
    Inactive,
    Unentitled,
    EntitlementExpired,
}

impl IneligibleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IneligibleReason::NotYetOpen => "not_yet_open",
            IneligibleReason::Closed => "closed",
            IneligibleReason::Inactive => "inactive",
            IneligibleReason::Unentitled => "unentitled",
            IneligibleReason::EntitlementExpired => "entitlement_expired",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            IneligibleReason::NotYetOpen => "The assessment window has not opened yet",
            IneligibleReason::Closed => "The assessment window has closed",
            IneligibleReason::Inactive => "The assessment is not currently active",
            IneligibleReason::Unentitled => "Access to this assessment has not been purchased",
            IneligibleReason::EntitlementExpired => "Access to this assessment has expired",
        }
    }
}

impl std::fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not eligible: {0}")]
    NotEligible(IneligibleReason),

    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Attempt has already been completed")]
    AttemptCompleted,

    #[error("Attempt deadline has passed")]
    DeadlinePassed,

    #[error("Attempt has not been submitted yet")]
    NotSubmitted,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Snapshot is older than the stored attempt")]
    StaleSnapshot,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Transient store failures are the only errors a caller should retry as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Persistence(_) | Error::Conflict(_))
    }

    fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::NotEligible(reason) => reason.as_str(),
            Error::InvalidIndex(_) => "invalid_index",
            Error::NotFound(_) => "not_found",
            Error::AccessDenied(_) => "access_denied",
            Error::AttemptCompleted => "already_completed",
            Error::DeadlinePassed => "deadline_passed",
            Error::NotSubmitted => "not_submitted",
            Error::Conflict(_) => "conflict",
            Error::StaleSnapshot => "stale_snapshot",
            Error::Persistence(_) => "persistence_error",
            Error::BadRequest(_) | Error::Json(_) | Error::Anyhow(_) => "bad_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::Validation(_) => "validation_error",
            Error::Internal(_) | Error::Io(_) => "internal_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let code = self.code();
        let (status, message) = match self {
            Error::NotEligible(reason) => (StatusCode::FORBIDDEN, reason.message().to_string()),
            Error::InvalidIndex(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Error::AccessDenied(msg) => (StatusCode::FORBIDDEN, msg),
            Error::AttemptCompleted => (
                StatusCode::CONFLICT,
                "Attempt has already been completed".to_string(),
            ),
            Error::DeadlinePassed => (
                StatusCode::GONE,
                "The time allotted for this attempt has run out".to_string(),
            ),
            Error::NotSubmitted => (
                StatusCode::CONFLICT,
                "Attempt has not been submitted yet".to_string(),
            ),
            Error::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Error::StaleSnapshot => (
                StatusCode::CONFLICT,
                "A newer snapshot of this attempt is already stored".to_string(),
            ),
            Error::Persistence(msg) => {
                tracing::error!("Persistence error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage is temporarily unavailable, retry the request".to_string(),
                )
            }
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Error::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Anyhow(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            other => {
                tracing::error!("Internal error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": code, "message": message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::Conflict(db.message().to_string())
            }
            other => Error::Persistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_eligible_maps_to_forbidden_with_reason_code() {
        let resp = Error::NotEligible(IneligibleReason::NotYetOpen).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn persistence_is_transient_but_invalid_index_is_not() {
        assert!(Error::Persistence("timeout".into()).is_transient());
        assert!(!Error::InvalidIndex("7".into()).is_transient());
        assert!(!Error::AttemptCompleted.is_transient());
        assert!(!Error::StaleSnapshot.is_transient());
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn reason_codes_are_distinct() {
        let codes = [
            IneligibleReason::NotYetOpen.as_str(),
            IneligibleReason::Closed.as_str(),
            IneligibleReason::Inactive.as_str(),
            IneligibleReason::Unentitled.as_str(),
            IneligibleReason::EntitlementExpired.as_str(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
