//! Auth API errors and their HTTP mapping
//!
//! Every failure leaves the service as `{"success": false, "message": ...}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// Error body shared by every failing route
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    MissingFields(&'static str),
    UserAlreadyExists,
    InvalidCredentials,
    NotAuthorized,
    MissingRefreshToken,
    InvalidRefreshToken,
    Forbidden,
    UserNotFound,
    OAuthNotConfigured,
    Internal(anyhow::Error),
}

impl AuthApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthApiError::MissingFields(_) | AuthApiError::UserAlreadyExists => {
                StatusCode::BAD_REQUEST
            }
            AuthApiError::InvalidCredentials
            | AuthApiError::NotAuthorized
            | AuthApiError::MissingRefreshToken
            | AuthApiError::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
            AuthApiError::Forbidden => StatusCode::FORBIDDEN,
            AuthApiError::UserNotFound => StatusCode::NOT_FOUND,
            AuthApiError::OAuthNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            AuthApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthApiError::MissingFields(msg) => *msg,
            AuthApiError::UserAlreadyExists => "User with this email or username already exists",
            AuthApiError::InvalidCredentials => "Invalid credentials",
            AuthApiError::NotAuthorized | AuthApiError::Forbidden => {
                "Not authorized to access this route"
            }
            AuthApiError::MissingRefreshToken => {
                "Authentication error: No refresh token provided"
            }
            AuthApiError::InvalidRefreshToken => "Invalid refresh token",
            AuthApiError::UserNotFound => "No user found with this id",
            AuthApiError::OAuthNotConfigured => "Google sign-in is not configured",
            AuthApiError::Internal(_) => "Server Error",
        }
    }
}

impl From<anyhow::Error> for AuthApiError {
    fn from(e: anyhow::Error) -> Self {
        AuthApiError::Internal(e)
    }
}

impl std::fmt::Display for AuthApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthApiError::Internal(e) => write!(f, "{}: {:#}", self.message(), e),
            _ => write!(f, "{}", self.message()),
        }
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        if let AuthApiError::Internal(e) = &self {
            error!("Internal error: {:#}", e);
        }

        (self.status(), Json(ErrorBody::new(self.message()))).into_response()
    }
}
