// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`CourierError`] to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use courier_core::CourierError;
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Failure of an admin or webhook handler.
#[derive(Debug)]
pub enum ApiError {
    Courier(CourierError),
    BadRequest(String),
    Unauthorized,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl From<CourierError> for ApiError {
    fn from(e: CourierError) -> Self {
        Self::Courier(e)
    }
}

/// Status code for a domain error.
pub fn status_for(e: &CourierError) -> StatusCode {
    match e {
        CourierError::NotRunning { .. } => StatusCode::CONFLICT,
        CourierError::Auth(_) | CourierError::NoPendingLogin(_) => StatusCode::BAD_REQUEST,
        CourierError::NotFound { .. } => StatusCode::NOT_FOUND,
        CourierError::PermanentDelivery(_) | CourierError::Forbidden(_) => StatusCode::BAD_GATEWAY,
        CourierError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::Courier(e) => {
                let status = status_for(&e);
                if status.is_server_error() {
                    tracing::error!(error = %e, "request failed");
                } else {
                    tracing::debug!(error = %e, "request rejected");
                }
                (status, e.to_string())
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}
