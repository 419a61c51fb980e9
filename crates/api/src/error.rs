//! API error type with the single ErrorKind → HTTP status mapping.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use common::{Classify, ErrorKind, UserId};
use inventory::InventoryError;
use payments::PaymentError;
use saga::CoordinatorError;

/// A classified error ready for the wire.
///
/// Every terminal failure carries the stable kind code plus a
/// human-readable message; this is the only place transport status is
/// decided.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    /// A malformed-request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: message.into(),
        }
    }

    /// A missing-resource error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            message: message.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BusinessRule => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::DownstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.kind == ErrorKind::Internal {
            tracing::error!(error = %self.message, "internal server error");
        }
        let body = serde_json::json!({
            "error": {
                "code": self.kind.code(),
                "message": self.message,
            }
        });
        (self.status(), axum::Json(body)).into_response()
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Extracts the caller's identity from the `x-user-id` header.
pub fn caller_id(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let value = headers
        .get("x-user-id")
        .ok_or_else(|| ApiError::bad_request("missing x-user-id header"))?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::bad_request("invalid x-user-id header"))?;
    let uuid = uuid::Uuid::parse_str(value)
        .map_err(|e| ApiError::bad_request(format!("invalid x-user-id header: {e}")))?;
    Ok(UserId::from_uuid(uuid))
}
