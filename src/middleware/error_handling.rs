// Error handling — API error responses
// Detailed upstream errors are logged server-side; clients receive the
// human-readable message and a matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::sankhya::SankhyaError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Sankhya(#[from] SankhyaError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Sankhya(err) => {
                tracing::error!("Sankhya error: {:?}", err);
                let status = match &err {
                    SankhyaError::Auth(_) => StatusCode::BAD_GATEWAY,
                    SankhyaError::SessionExpired => StatusCode::UNAUTHORIZED,
                    SankhyaError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    SankhyaError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                    SankhyaError::Upstream(_) => StatusCode::BAD_GATEWAY,
                    SankhyaError::Network(_) => StatusCode::BAD_GATEWAY,
                };
                (status, err.to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sankhya_errors_map_to_gateway_statuses() {
        let response = AppError::from(SankhyaError::Timeout).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let response = AppError::from(SankhyaError::SessionExpired).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AppError::from(SankhyaError::Unavailable).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
