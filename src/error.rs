// HTTP API Error Types
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::database::DbError;

/// Error kinds shared by handlers, middleware and services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    ValidationFailed,
    Unauthorized,
    InvalidToken,
    Forbidden,
    TenantMismatch,
    TenantRequired,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorKind::TenantRequired => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::InvalidToken => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::TenantMismatch => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for client handling and log fields
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::ValidationFailed => "VALIDATION_FAILED",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::InvalidToken => "INVALID_TOKEN",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::TenantMismatch => "TENANT_MISMATCH",
            ErrorKind::TenantRequired => "TENANT_REQUIRED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "Invalid request",
            ErrorKind::ValidationFailed => "Validation failed",
            ErrorKind::Unauthorized | ErrorKind::InvalidToken => "Unauthorized",
            ErrorKind::Forbidden | ErrorKind::TenantMismatch => "Forbidden",
            ErrorKind::TenantRequired => "Tenant required",
            ErrorKind::NotFound => "Not found",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Internal => "Internal server error",
        }
    }
}

/// HTTP API error with a status-bearing kind and client-friendly messages.
///
/// `message` is the headline of the envelope, `detail` lands in its `error`
/// field.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: Option<String>,
    detail: String,
    field_errors: Option<HashMap<String, String>>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: &'a str,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field_errors: Option<&'a HashMap<String, String>>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            message: None,
            detail: detail.into(),
            field_errors: None,
        }
    }

    /// Replace the envelope headline, e.g. "Login failed".
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }

    pub fn error_code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| self.kind.default_message())
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn field_errors(&self) -> Option<&HashMap<String, String>> {
        self.field_errors.as_ref()
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.body()).unwrap_or(serde_json::Value::Null)
    }

    fn body(&self) -> ErrorBody<'_> {
        ErrorBody {
            success: false,
            message: self.message(),
            error: &self.detail,
            field_errors: self.field_errors.as_ref(),
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, detail)
    }

    pub fn validation_failed(
        detail: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            field_errors,
            ..Self::new(ErrorKind::ValidationFailed, detail)
        }
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, detail)
    }

    pub fn invalid_token(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidToken, detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, detail)
    }

    pub fn tenant_mismatch(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TenantMismatch, detail)
    }

    pub fn tenant_required(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TenantRequired, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.detail)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

// Repositories already logged infrastructure failures; only translate here.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            DbError::Conflict(what) => ApiError::conflict(what),
            DbError::InvalidReference(what) => ApiError::validation_failed(what, None),
            _ => ApiError::internal("internal server error"),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors: HashMap<String, String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let reason = errs
                    .first()
                    .map(|e| match &e.message {
                        Some(message) => message.to_string(),
                        None => e.code.to_string(),
                    })
                    .unwrap_or_else(|| "invalid".to_string());
                (field.to_string(), reason)
            })
            .collect();

        ApiError::validation_failed("request validation failed", Some(field_errors))
    }
}
