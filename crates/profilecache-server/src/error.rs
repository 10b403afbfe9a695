use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::profiles::ProfileError;

pub const SUBJECT_REQUIRED: &str = "Sub parameter is required";
pub const PROFILE_FETCH_FAILED: &str = "Failed to fetch user data";
pub const SERVER_ERROR: &str = "Server error";

/// HTTP-facing errors. Messages are client-visible and intentionally generic;
/// details are logged where the failure happens.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(m) | ApiError::Internal(m) => m,
        }
    }

    /// Maps a failed profile read.
    pub fn from_profile_read(err: ProfileError) -> Self {
        match err {
            ProfileError::InvalidInput(_) => Self::bad_request(SUBJECT_REQUIRED),
            _ => Self::internal(PROFILE_FETCH_FAILED),
        }
    }
}

impl From<ProfileError> for ApiError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::InvalidInput(_) => Self::bad_request(SUBJECT_REQUIRED),
            _ => Self::internal(SERVER_ERROR),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            Json(ErrorBody {
                error: self.message(),
            }),
        )
            .into_response()
    }
}
