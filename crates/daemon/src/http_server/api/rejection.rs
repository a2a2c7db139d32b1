use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, RelayError};

/// Wire shape of every failed API call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error_code: String,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A [`RelayError`] on its way out as an HTTP response
#[derive(Debug)]
pub struct RelayRejection {
    error: RelayError,
    expose_detail: bool,
}

impl RelayRejection {
    pub fn new(error: RelayError, expose_detail: bool) -> Self {
        Self {
            error,
            expose_detail,
        }
    }

    pub fn error(&self) -> &RelayError {
        &self.error
    }

    pub fn status(&self) -> StatusCode {
        match self.error.category() {
            ErrorCategory::Validation | ErrorCategory::Replay | ErrorCategory::Precondition => {
                StatusCode::BAD_REQUEST
            }
            ErrorCategory::Authentication => StatusCode::UNAUTHORIZED,
            ErrorCategory::Authorization => StatusCode::FORBIDDEN,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Transient if self.error.is_retryable() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCategory::Transient => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Underlying cause, for server faults when details are exposed
    fn detail(&self) -> Option<String> {
        match self.error.category() {
            ErrorCategory::Transient if self.expose_detail => Some(self.error.to_string()),
            _ => None,
        }
    }
}

impl From<JsonRejection> for RelayRejection {
    fn from(rejection: JsonRejection) -> Self {
        let error = RelayError::MalformedRequest(rejection.body_text());
        error.trace("decode");
        Self::new(error, false)
    }
}

impl IntoResponse for RelayRejection {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error_code: self.error.code().to_string(),
            category: self.error.category(),
            message: self.error.public_message(),
            detail: self.detail(),
        };
        (self.status(), Json(body)).into_response()
    }
}
