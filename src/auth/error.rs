// Authentication Error Types
// Typed failures for the OIDC flow, session sealing, and per-request resolution

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    // Callback-time errors
    #[error("required callback parameter missing: {0}")]
    MissingParameters(&'static str),

    #[error("OAuth state mismatch")]
    CsrfMismatch,

    #[error("identity provider reported an error: {0}")]
    ProviderReportedError(String),

    #[error("authorization code exchange failed: {0}")]
    TokenExchangeFailed(String),

    // Resolver-time errors
    #[error("access token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("profile fetch failed: {0}")]
    ProfileFetchFailed(String),

    #[error("session cookie invalid or expired")]
    InvalidSession,

    #[error("no authenticated session")]
    Unauthenticated,

    // Ambient errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthError {
    /// Opaque code appended to the error redirect after a failed callback.
    /// Never carries provider-supplied text; the detail stays in server logs.
    pub fn redirect_code(&self) -> &'static str {
        match self {
            AuthError::MissingParameters(_) => "missing_parameters",
            AuthError::CsrfMismatch => "csrf_mismatch",
            AuthError::ProviderReportedError(_) => "provider_error",
            AuthError::TokenExchangeFailed(_) => "exchange_failed",
            AuthError::ProfileFetchFailed(_) => "profile_failed",
            _ => "authentication_failed",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated
            | AuthError::InvalidSession
            | AuthError::RefreshFailed(_) => StatusCode::UNAUTHORIZED,

            AuthError::MissingParameters(_) | AuthError::CsrfMismatch => StatusCode::BAD_REQUEST,

            AuthError::ProviderReportedError(_)
            | AuthError::TokenExchangeFailed(_)
            | AuthError::ProfileFetchFailed(_)
            | AuthError::Http(_) => StatusCode::BAD_GATEWAY,

            AuthError::Config(_) | AuthError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Http(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Resolver-time failures collapse to a bare 401 so a tampered cookie
        // is indistinguishable from an absent one.
        let message = if status == StatusCode::UNAUTHORIZED {
            "authentication required".to_string()
        } else {
            self.redirect_code().to_string()
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
