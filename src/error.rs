use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::models::Role;

/// AuthError
///
/// Everything that can go wrong while talking to the identity provider. The session
/// resolver collapses all of these into an anonymous session; only the login handler
/// distinguishes them.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity provider unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("identity provider rejected the request with status {status}")]
    Rejected { status: u16 },

    #[error("invalid login credentials")]
    InvalidCredentials,

    #[error("malformed or invalid access token: {0}")]
    MalformedToken(#[from] jsonwebtoken::errors::Error),

    #[error("identity provider returned an unexpected payload")]
    MalformedResponse,

    #[error("identity provider did not answer in time")]
    Timeout,
}

/// RouteTableError
///
/// Raised while compiling the static route tables at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("route pattern {pattern:?} is invalid: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    #[error("public pattern {public:?} overlaps protected pattern {protected:?}")]
    Overlap { public: String, protected: String },

    #[error("pattern {pattern:?} granted to {role} is not a protected route")]
    RoleRouteNotProtected { role: Role, pattern: String },
}

/// GatewayError
///
/// An internal failure while the gateway evaluates a request. Never shown to the client;
/// the failure policy decides what happens to the request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("cannot build header value for {0:?}")]
    InvalidHeader(String),

    #[error("gateway evaluation panicked: {0}")]
    Panicked(String),
}

/// LoginError
///
/// Outcomes of the login endpoint that are not a successful sign-in.
#[derive(Debug, Error)]
pub enum LoginError {
    /// The caller is locked out. Does not say whether the IP or the account tripped.
    #[error("too many login attempts")]
    RateLimited { reset_time_ms: Option<i64> },

    #[error("invalid email or password")]
    InvalidCredentials { remaining_attempts: u32 },

    #[error("authentication service unavailable")]
    ProviderUnavailable,
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        match self {
            LoginError::RateLimited { reset_time_ms } => {
                let reset_time = reset_time_ms.and_then(chrono::DateTime::from_timestamp_millis);
                let message = match reset_time {
                    Some(at) => format!(
                        "Too many login attempts. Please try again after {}.",
                        at.format("%H:%M UTC")
                    ),
                    None => "Too many login attempts. Please try again later.".to_string(),
                };
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": message,
                        "reset_time": reset_time,
                    })),
                )
                    .into_response();

                if let Some(ms) = reset_time_ms {
                    let secs = (ms - chrono::Utc::now().timestamp_millis()).max(0) / 1000;
                    if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                        response.headers_mut().insert(header::RETRY_AFTER, value);
                    }
                }
                response
            }
            LoginError::InvalidCredentials { remaining_attempts } => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": self.to_string(),
                    "remaining_attempts": remaining_attempts,
                })),
            )
                .into_response(),
            LoginError::ProviderUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
        }
    }
}
