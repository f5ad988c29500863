use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Not allowed to access this record")]
    AuthorizationDenied,

    #[error("Not found")]
    NotFound,

    #[error("Store unavailable: {0}")]
    TransientStore(String),

    #[error("{0}")]
    Validation(String),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::AuthorizationDenied => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::TransientStore(e) => {
                error!("store error: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "The task store is unavailable, please try again".to_string(),
                )
            }
            AppError::Provider(e) => {
                error!("identity provider error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Sign-in provider error occurred".to_string(),
                )
            }
            AppError::Config(e) => {
                error!("configuration error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                error!("internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
        });

        (status, body).into_response()
    }
}
