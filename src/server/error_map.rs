//! Translates [`CoreError`] to the HTTP status/body pairing a client of the
//! wire API sees. This is the one place that encodes that mapping — every
//! handler returns a `CoreError` and lets `IntoResponse` below do the rest.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::errors::CoreError;

fn status_for(error: &CoreError) -> StatusCode {
    match error {
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::AlreadyExists(_) => StatusCode::CONFLICT,
        CoreError::ChangeConflict(_) => StatusCode::CONFLICT,
        CoreError::RedundantChange => StatusCode::NO_CONTENT,
        CoreError::QueryFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoreError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        CoreError::ReplicationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Io(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status == StatusCode::NO_CONTENT {
            return status.into_response();
        }
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error handling request");
        }
        (status, Json(json!({"message": self.to_string()}))).into_response()
    }
}
