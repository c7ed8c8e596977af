use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use campus_db::DbError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::error;

/// Field name -> first violated rule's message.
pub type ValidationErrors = BTreeMap<String, String>;

pub const INVALID_CREDENTIALS: &str = "These credentials do not match our records.";
pub const UPLOAD_FAILED: &str = "The profile picture upload failed.";
pub const INVALID_RESET_TOKEN: &str = "This password reset token is invalid.";
pub const RESET_ACCOUNT_MISSING: &str = "We can't find a user with that email address.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("The given data was invalid.")]
    Validation {
        errors: ValidationErrors,
        old: Option<Value>,
    },

    #[error("Not Found")]
    NotFound,

    /// Unknown account, unapproved account and wrong password all land here.
    #[error("{}", INVALID_CREDENTIALS)]
    InvalidCredentials,

    #[error("Unauthenticated.")]
    Unauthenticated,

    #[error("CSRF token mismatch.")]
    CsrfMismatch,

    #[error("{}", INVALID_RESET_TOKEN)]
    InvalidResetToken,

    #[error("{}", RESET_ACCOUNT_MISSING)]
    ResetAccountMissing,

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    errors: ValidationErrors,
    #[serde(skip_serializing_if = "Option::is_none")]
    old: Option<Value>,
}

impl ApiError {
    /// Single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.insert(field.into(), message.into());
        Self::Validation { errors, old: None }
    }

    /// Attach the submitted input (already stripped of secrets) to a
    /// validation failure so the client can refill the form.
    pub fn with_old(self, input: Option<Value>) -> Self {
        match self {
            Self::Validation { errors, .. } => Self::Validation { errors, old: input },
            other => other,
        }
    }

    /// Map a store error: UNIQUE violations become the same message the
    /// validator gives, a vanished course is a hard not-found.
    pub fn from_store(err: anyhow::Error) -> Self {
        if let Some(db_err) = err.downcast_ref::<DbError>() {
            if let Some(column) = db_err.unique_column() {
                let message = format!("The {} has already been taken.", column.replace('_', " "));
                return Self::invalid(column, message);
            }
            if matches!(db_err, DbError::CourseNotFound(_)) {
                return Self::NotFound;
            }
        }
        Self::Internal(err)
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::InvalidResetToken => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound | Self::ResetAccountMissing => StatusCode::NOT_FOUND,
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            // 419: stale or missing anti-forgery token
            Self::CsrfMismatch => StatusCode::from_u16(419).unwrap_or(StatusCode::FORBIDDEN),
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            Self::Validation { errors, old } => ErrorBody {
                message: "The given data was invalid.".into(),
                errors,
                old,
            },
            Self::InvalidResetToken => ErrorBody {
                message: INVALID_RESET_TOKEN.into(),
                errors: ValidationErrors::from([("token".to_string(), INVALID_RESET_TOKEN.to_string())]),
                old: None,
            },
            Self::ResetAccountMissing => ErrorBody {
                message: RESET_ACCOUNT_MISSING.into(),
                errors: ValidationErrors::from([("email".to_string(), RESET_ACCOUNT_MISSING.to_string())]),
                old: None,
            },
            Self::Storage(e) => {
                error!("Profile picture storage failed: {:#}", e);
                ErrorBody {
                    message: UPLOAD_FAILED.into(),
                    errors: ValidationErrors::from([(
                        "profile_picture".to_string(),
                        UPLOAD_FAILED.to_string(),
                    )]),
                    old: None,
                }
            }
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                ErrorBody { message: "Server Error".into(), errors: ValidationErrors::new(), old: None }
            }
            other => ErrorBody { message: other.to_string(), errors: ValidationErrors::new(), old: None },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_reads_like_a_validation_message() {
        let err = ApiError::from_store(DbError::Unique("users.email".into()).into());
        match err {
            ApiError::Validation { errors, .. } => {
                assert_eq!(errors.get("email").map(String::as_str), Some("The email has already been taken."));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn statuses() {
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::CsrfMismatch.status().as_u16(), 419);
        assert_eq!(ApiError::from_store(DbError::CourseNotFound(3).into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from_store(anyhow::anyhow!("disk on fire")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
