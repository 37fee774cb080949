//! API error types and JSON error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hashlb_ring::RingError;
use hashlb_router::RouterError;
use serde_json::json;

/// Errors returned by balancer handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed path, body or field.
    #[error("{message}")]
    InvalidRequest {
        /// Description of the problem.
        message: String,
    },

    /// An error from the router.
    #[error(transparent)]
    Router(#[from] RouterError),
}

impl ApiError {
    /// Shorthand for [`ApiError::InvalidRequest`].
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Map to an HTTP status code.
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Router(e) => match e {
                RouterError::NoWorkersAvailable => StatusCode::SERVICE_UNAVAILABLE,
                RouterError::WorkerUnreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                RouterError::UnknownWorker(_) => StatusCode::NOT_FOUND,
                RouterError::DuplicateWorker(_) => StatusCode::CONFLICT,
                RouterError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
                RouterError::Ring(RingError::RingFull { .. }) => StatusCode::INSUFFICIENT_STORAGE,
                RouterError::Ring(RingError::AlreadyPlaced(_)) => StatusCode::CONFLICT,
                RouterError::Ring(RingError::ZeroSlots) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Client-facing message.
    fn message(&self) -> String {
        match self {
            Self::InvalidRequest { message } => message.clone(),
            Self::Router(e) => e.client_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        }
        let body = json!({ "message": self.message(), "status": "error" });
        (status, Json(body)).into_response()
    }
}
