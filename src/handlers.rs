use crate::{
    ApiDoc, AppState,
    error::{AuthError, LoginError},
    models::{LoginRequest, LoginResponse},
    rate_limit::client_ip,
    redirect::HOME_PATH,
    session::{PendingCookies, RequestCookies, append_set_cookies},
};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use utoipa::OpenApi;

// --- Login API ---

/// login
///
/// [Public Route] Password sign-in through the identity provider, throttled per client IP
/// and per account.
///
/// *Flow*: the limiter is consulted before the provider sees the credentials, and every
/// answered credential check is recorded afterwards, successful or not. A provider outage
/// is not a credential check and is not recorded.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; session cookies set", body = LoginResponse),
        (status = 401, description = "Invalid email or password"),
        (status = 429, description = "Too many failed attempts"),
        (status = 503, description = "Identity provider unavailable")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, LoginError> {
    let ip = client_ip(&headers);
    let email = payload.email.trim();
    let limits = state.config.rate_limit;

    let status = state.limiter.is_rate_limited(&ip, Some(email), &limits);
    if status.limited {
        tracing::warn!(ip = %ip, "login refused while rate limited");
        return Err(LoginError::RateLimited {
            reset_time_ms: status.reset_time_ms,
        });
    }

    let attempt = tokio::time::timeout(
        state.config.auth_timeout,
        state.auth.sign_in(email, &payload.password),
    )
    .await
    .unwrap_or(Err(AuthError::Timeout));

    match attempt {
        Ok(signed_in) => {
            state
                .limiter
                .record_login_attempt(&ip, email, true, &limits);

            let role = signed_in.identity.role;
            let body = LoginResponse {
                user_id: signed_in.identity.id,
                role,
                redirect_to: state.routes.dashboard(role).unwrap_or(HOME_PATH).to_string(),
            };
            tracing::info!(user_id = %body.user_id, role = ?role, "login succeeded");

            let mut pending = PendingCookies::default();
            signed_in.tokens.write_cookies(&mut pending);

            let mut response = Json(body).into_response();
            append_set_cookies(
                &mut response,
                pending.to_header_values(state.config.env.is_production()),
            );
            Ok(response)
        }
        Err(AuthError::InvalidCredentials) => {
            state
                .limiter
                .record_login_attempt(&ip, email, false, &limits);
            let after = state.limiter.is_rate_limited(&ip, Some(email), &limits);
            tracing::info!(ip = %ip, remaining = after.remaining_attempts, "login failed");
            Err(LoginError::InvalidCredentials {
                remaining_attempts: after.remaining_attempts,
            })
        }
        Err(e) => {
            tracing::error!(error = %e, "identity provider unavailable during login");
            Err(LoginError::ProviderUnavailable)
        }
    }
}

/// logout
///
/// [Public Route] Ends the session with the identity provider and clears the session
/// cookies. Succeeds even if the provider cannot be reached.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 204, description = "Signed out"))
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookies = RequestCookies::from_headers(&headers);
    let mut pending = PendingCookies::default();

    if let Err(e) = state.auth.sign_out(&cookies, &mut pending).await {
        tracing::warn!(error = %e, "sign-out not confirmed by identity provider");
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    append_set_cookies(
        &mut response,
        pending.to_header_values(state.config.env.is_production()),
    );
    response
}

// --- Gateway Landing Pages ---

/// Destination of authorization redirects.
pub async fn no_access() -> impl IntoResponse {
    (
        StatusCode::FORBIDDEN,
        "You do not have access to this page.",
    )
}

/// Destination of unknown-path redirects, and the router fallback.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Page not found.")
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
