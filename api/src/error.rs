use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) => Self::ValidationError(msg),
            other => {
                tracing::error!(error = %other, "internal error");
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::InternalError(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: message,
                    status: "error".to_string(),
                },
            ),
            Self::ValidationError(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: message,
                    status: "error".to_string(),
                },
            ),
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: message,
                    status: "error".to_string(),
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_status_code<T: IntoResponse>(response: T, expected_status: StatusCode) {
        let response = response.into_response();
        assert_eq!(response.status(), expected_status);
    }

    #[test]
    fn app_error_conversions_map_to_expected_variants() {
        let not_found = AppError::NotFound("resource not found".to_string());
        assert!(matches!(ApiError::from(not_found), ApiError::NotFound(msg) if msg == "resource not found"));

        let validation = AppError::Validation("invalid input".to_string());
        assert!(
            matches!(ApiError::from(validation), ApiError::ValidationError(msg) if msg == "invalid input")
        );

        let internal = AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, "io error"));
        assert!(matches!(ApiError::from(internal), ApiError::InternalError(_)));
    }

    #[test]
    fn status_codes_match_variant() {
        assert_status_code(
            ApiError::InternalError("x".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
        assert_status_code(ApiError::NotFound("x".to_string()), StatusCode::NOT_FOUND);
        assert_status_code(
            ApiError::ValidationError("x".to_string()),
            StatusCode::BAD_REQUEST,
        );
    }

    #[test]
    fn internal_error_response_body_never_leaks_the_source_message() {
        let api_error = ApiError::InternalError("db password incorrect".to_string());
        assert_eq!(api_error.to_string(), "Internal server error");
    }
}
