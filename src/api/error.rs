//! Error taxonomy for the ledger.
//!
//! HTML handlers turn a `LedgerError` into a flash message plus redirect;
//! the JSON endpoint renders it through `IntoResponse`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::engine::AmountOverflow;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("an account with this email already exists")]
    DuplicateEmail,

    #[error("invalid credentials")]
    AuthFailure,

    #[error("authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Validation(String),

    #[error("not allowed")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("too many requests")]
    RateLimited,

    #[error(transparent)]
    Overflow(#[from] AmountOverflow),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("template rendering failed: {0}")]
    Template(String),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::DuplicateEmail => "duplicate_email",
            LedgerError::AuthFailure => "auth_failure",
            LedgerError::Unauthenticated => "unauthenticated",
            LedgerError::Validation(_) => "validation_error",
            LedgerError::Forbidden => "forbidden",
            LedgerError::NotFound => "not_found",
            LedgerError::RateLimited => "too_many_requests",
            LedgerError::Overflow(_) => "amount_overflow",
            LedgerError::Database(_) => "database_error",
            LedgerError::PasswordHash(_) | LedgerError::Template(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::DuplicateEmail => StatusCode::CONFLICT,
            LedgerError::AuthFailure | LedgerError::Unauthenticated => StatusCode::UNAUTHORIZED,
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::Forbidden => StatusCode::FORBIDDEN,
            LedgerError::NotFound => StatusCode::NOT_FOUND,
            LedgerError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            LedgerError::Overflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::Database(_) | LedgerError::PasswordHash(_) | LedgerError::Template(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text safe to show to the user. Internal failures are not detailed.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::DuplicateEmail => "Email already registered.".to_string(),
            LedgerError::AuthFailure => "Invalid credentials.".to_string(),
            LedgerError::Unauthenticated => "Please log in first.".to_string(),
            LedgerError::Validation(message) => message.clone(),
            LedgerError::Forbidden => "You are not allowed to do that.".to_string(),
            LedgerError::NotFound => "Not found.".to_string(),
            LedgerError::RateLimited => "Too many attempts. Please wait and try again.".to_string(),
            LedgerError::Overflow(e) => format!("The {} is too large to show.", e.0),
            LedgerError::Database(_) | LedgerError::PasswordHash(_) | LedgerError::Template(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let msg = db_err.message();
            if msg.contains("UNIQUE constraint failed: users.email") {
                return LedgerError::DuplicateEmail;
            }
            if msg.contains("UNIQUE constraint failed: categories") {
                return LedgerError::validation("A category with this name already exists.");
            }
            if msg.contains("FOREIGN KEY constraint failed") {
                return LedgerError::validation("This item is still in use.");
            }
        }
        if let sqlx::Error::RowNotFound = err {
            return LedgerError::NotFound;
        }

        tracing::error!("Database error: {}", err);
        LedgerError::Database(err)
    }
}

impl From<askama::Error> for LedgerError {
    fn from(err: askama::Error) -> Self {
        LedgerError::Template(err.to_string())
    }
}

/// Body of every JSON response
#[derive(Debug, Serialize)]
pub struct JsonStatus {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl JsonStatus {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let body = JsonStatus {
            success: false,
            error: Some(ErrorBody {
                code: self.code(),
                message: self.user_message(),
            }),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

/// Collects every problem with a submitted form before failing
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: Vec<String>,
}

impl ValidationErrorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: impl Into<String>) -> &mut Self {
        self.errors.push(message.into());
        self
    }

    /// Record the error of a failed check, if any
    pub fn check(&mut self, result: Result<(), String>) -> &mut Self {
        if let Err(message) = result {
            self.errors.push(message);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Ok if nothing was recorded, else one error listing every message
    pub fn finish(self) -> Result<(), LedgerError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Validation(self.errors.join(" ")))
        }
    }
}
