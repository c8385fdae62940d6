//! Unified application error model and mapping helpers.
//! `LifecycleError` is the typed failure of every confirmation/session operation;
//! `AppError` is what the HTTP frontend renders, with the status mapping in one place.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Failures produced by the trust lifecycle. All are explicit; nothing degrades to a default.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("confirmation link has expired")]
    Expired,
    #[error("registration has already been confirmed")]
    AlreadyConfirmed,
    #[error("account has not been confirmed, check your email")]
    NotConfirmed,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),
    #[error("token has been revoked")]
    Revoked,
    #[error("fresh token required")]
    StaleCredential,
    #[error("admin privilege required")]
    Forbidden,
    #[error("{0}")]
    Conflict(String),
    #[error("mail dispatch unavailable: {0}")]
    MailUnavailable(String),
    #[error("mail provider rejected message: {0}")]
    MailRejected(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Token codec verification failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("wrong token type")]
    WrongKind,
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        let msg = err.to_string();
        match err {
            LifecycleError::NotFound(_) => AppError::not_found("not_found".to_string(), msg),
            LifecycleError::Expired => AppError::user("confirmation_expired".to_string(), msg),
            LifecycleError::AlreadyConfirmed => AppError::user("already_confirmed".to_string(), msg),
            LifecycleError::NotConfirmed => AppError::user("not_confirmed".to_string(), msg),
            LifecycleError::InvalidCredentials => AppError::auth("invalid_credentials".to_string(), msg),
            LifecycleError::InvalidToken(TokenError::Expired) => AppError::auth("token_expired".to_string(), msg),
            LifecycleError::InvalidToken(_) => AppError::auth("invalid_token".to_string(), msg),
            LifecycleError::Revoked => AppError::auth("token_revoked".to_string(), msg),
            LifecycleError::StaleCredential => AppError::auth("fresh_token_required".to_string(), msg),
            LifecycleError::Forbidden => AppError::forbidden("admin_privilege_required".to_string(), msg),
            LifecycleError::Conflict(_) => AppError::conflict("conflict".to_string(), msg),
            LifecycleError::MailUnavailable(_) | LifecycleError::MailRejected(_) => AppError::internal("mail_error".to_string(), msg),
            LifecycleError::StorageUnavailable(_) => AppError::internal("storage_unavailable".to_string(), msg),
            LifecycleError::Internal(_) => AppError::internal("internal_error".to_string(), msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({"status": "error", "error": self.code_str(), "message": self.message()});
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::conflict("conflict", "dup").http_status(), 409);
        assert_eq!(AppError::auth("auth", "no").http_status(), 401);
        assert_eq!(AppError::forbidden("forbidden", "admin").http_status(), 403);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn lifecycle_errors_map_to_documented_statuses() {
        let cases: Vec<(LifecycleError, u16, &str)> = vec![
            (LifecycleError::AlreadyConfirmed, 400, "already_confirmed"),
            (LifecycleError::Expired, 400, "confirmation_expired"),
            (LifecycleError::NotConfirmed, 400, "not_confirmed"),
            (LifecycleError::InvalidToken(TokenError::InvalidSignature), 401, "invalid_token"),
            (LifecycleError::InvalidToken(TokenError::Expired), 401, "token_expired"),
            (LifecycleError::Revoked, 401, "token_revoked"),
            (LifecycleError::StaleCredential, 401, "fresh_token_required"),
            (LifecycleError::NotFound("confirmation"), 404, "not_found"),
            (LifecycleError::StorageUnavailable("down".into()), 500, "storage_unavailable"),
            (LifecycleError::MailUnavailable("no key".into()), 500, "mail_error"),
            (LifecycleError::Internal("hashing".into()), 500, "internal_error"),
        ];
        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.http_status(), status, "{app}");
            assert_eq!(app.code_str(), code);
        }
    }

    #[test]
    fn not_found_message_names_the_entity() {
        let app: AppError = LifecycleError::NotFound("user").into();
        assert_eq!(app.message(), "user not found");
    }
}
