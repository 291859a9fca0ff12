use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::warn;

use super::dto::ErrorResponse;
use crate::error::BridgeError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        let ApiError::Bridge(err) = self else {
            return (StatusCode::BAD_REQUEST, "Bad Request");
        };
        match err.root() {
            BridgeError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            BridgeError::ConvergenceTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "Convergence Timeout")
            }
            BridgeError::ConvergenceStalled(_) | BridgeError::UnexpectedStatus(_) => {
                (StatusCode::CONFLICT, "Convergence Failed")
            }
            BridgeError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "Cancelled"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }

        let body = Json(ErrorResponse {
            error: error.to_string(),
            details: Some(self.to_string()),
        });

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
