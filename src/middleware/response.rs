use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::database::query_builder::{Page, PageMeta};
use crate::error::ApiError;

/// Envelope `{success, message, data?}`, plus `meta` for pages. `success`
/// follows the status code.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub message: String,
    pub meta: Option<PageMeta>,
    pub status_code: Option<StatusCode>,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    success: bool,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<&'a PageMeta>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            message: "Success".to_string(),
            meta: None,
            status_code: None,
        }
    }

    pub fn with_status(data: T, status_code: StatusCode) -> Self {
        Self {
            status_code: Some(status_code),
            ..Self::success(data)
        }
    }

    /// 201 Created
    pub fn created(data: T) -> Self {
        Self {
            message: "Created".to_string(),
            ..Self::with_status(data, StatusCode::CREATED)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    /// Paginated envelope; `data` is always present, possibly empty.
    pub fn paginated(page: Page<T>) -> Self {
        Self {
            data: Some(page.items),
            message: "Success".to_string(),
            meta: Some(page.meta),
            status_code: None,
        }
    }
}

impl ApiResponse<()> {
    /// 200 with only a message, e.g. after a delete.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            data: None,
            message: message.into(),
            meta: None,
            status_code: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status_code.unwrap_or(StatusCode::OK);
        let envelope = Envelope {
            success: status.is_success(),
            message: &self.message,
            data: self.data.as_ref(),
            meta: self.meta.as_ref(),
        };

        // Serialize up front so a failure still produces the error envelope.
        match serde_json::to_value(&envelope) {
            Ok(value) => (status, Json(value)).into_response(),
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                ApiError::internal("failed to serialize response").into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;
