//! HTTP error envelope and the domain-error → status-code mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt::{Display, Formatter};

use anvil_core::AnvilError;

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AnvilError> for ApiError {
    fn from(err: AnvilError) -> Self {
        match &err {
            AnvilError::NotFound(_) => Self::not_found(err.to_string()),
            AnvilError::Forbidden(_) => {
                Self::new(StatusCode::FORBIDDEN, "forbidden", err.to_string())
            }
            AnvilError::Conflict(_) => {
                Self::new(StatusCode::CONFLICT, "conflict", err.to_string())
            }
            AnvilError::Validation(_) => Self::bad_request(err.to_string()),
            AnvilError::Upstream(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "upstream", err.to_string())
            }
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<anvil_state::StorageError> for ApiError {
    fn from(err: anvil_state::StorageError) -> Self {
        ApiError::from(AnvilError::from(err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        let cases = [
            (AnvilError::NotFound("commit x".into()), StatusCode::NOT_FOUND),
            (AnvilError::Forbidden("nope".into()), StatusCode::FORBIDDEN),
            (AnvilError::Conflict("again".into()), StatusCode::CONFLICT),
            (AnvilError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AnvilError::Upstream("ci down".into()), StatusCode::BAD_GATEWAY),
            (AnvilError::Git("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status, expected);
        }
    }
}
