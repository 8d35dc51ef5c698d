//! Gateway Middleware
//!
//! Runs in front of every route. Per request it resolves the session, then decides:
//!
//! 1. protected path, no session → `/no-access`;
//! 2. protected path, session whose role lacks access → `/no-access`;
//! 3. any session → the redirect policy (`redirect::decide`), redirecting if it moves;
//! 4. otherwise the request proceeds.
//!
//! Cookies refreshed during session resolution ride along on whatever response goes out.
//! A misbehaving identity provider never reaches this far: the session resolver turns it
//! into an anonymous session. If the evaluation itself fails, the configured
//! [`FailurePolicy`] applies; by default the request is let through unmodified and the
//! data layer's own checks still apply.

use std::panic::AssertUnwindSafe;

use axum::{
    extract::{FromRef, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;

use crate::{
    AppState,
    config::FailurePolicy,
    error::GatewayError,
    models::Session,
    redirect::{self, NO_ACCESS_PATH},
    routes::RouteClassifier,
    session::{SessionResolver, append_set_cookies},
};

/// GatewayDecision
///
/// Outcome of evaluating one request against the route tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayDecision {
    Allow,
    Redirect(String),
}

/// evaluate
///
/// The pure part of the gateway: authentication is checked before authorization, and
/// only protected paths are closed to anonymous callers. Unknown paths are left to the
/// router for anonymous callers and sent to `/not-found` for signed-in ones.
pub fn evaluate(routes: &RouteClassifier, path: &str, session: &Session) -> GatewayDecision {
    let protected = routes.is_protected(path);

    match *session {
        Session::Anonymous if protected => GatewayDecision::Redirect(NO_ACCESS_PATH.to_string()),
        Session::Anonymous => GatewayDecision::Allow,
        Session::Authenticated { role, .. } => {
            if protected && !routes.has_access(path, role) {
                return GatewayDecision::Redirect(NO_ACCESS_PATH.to_string());
            }
            let target = redirect::decide(routes, path, role, true);
            if target == path {
                GatewayDecision::Allow
            } else {
                GatewayDecision::Redirect(target)
            }
        }
    }
}

/// failure_decision
///
/// What to do with a request whose evaluation failed internally. Only
/// `ClosedForProtected` ever turns a request away, and only from a protected path.
pub fn failure_decision(
    policy: FailurePolicy,
    routes: &RouteClassifier,
    path: &str,
) -> GatewayDecision {
    match policy {
        FailurePolicy::ClosedForProtected if routes.is_protected(path) => {
            GatewayDecision::Redirect(NO_ACCESS_PATH.to_string())
        }
        _ => GatewayDecision::Allow,
    }
}

struct Outcome {
    session: Session,
    redirect: Option<HeaderValue>,
    set_cookies: Vec<HeaderValue>,
}

async fn resolve_and_decide(
    state: &AppState,
    headers: &HeaderMap,
    path: &str,
) -> Result<Outcome, GatewayError> {
    let resolved = SessionResolver::from_ref(state).resolve(headers).await;

    let redirect = match evaluate(&state.routes, path, &resolved.session) {
        GatewayDecision::Allow => None,
        GatewayDecision::Redirect(target) => Some(
            HeaderValue::from_str(&target).map_err(|_| GatewayError::InvalidHeader(target))?,
        ),
    };

    Ok(Outcome {
        session: resolved.session,
        redirect,
        set_cookies: resolved.set_cookies,
    })
}

/// gateway_middleware
///
/// Axum middleware wrapping [`evaluate`]. Redirects are `307 Temporary Redirect` and
/// carry no body; access control never renders an error page itself.
pub async fn gateway_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let evaluation = AssertUnwindSafe(resolve_and_decide(&state, request.headers(), &path))
        .catch_unwind()
        .await;
    let outcome = evaluation.unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(GatewayError::Panicked(message))
    });

    match outcome {
        Ok(Outcome {
            session,
            redirect: Some(location),
            set_cookies,
        }) => {
            tracing::info!(
                path = %path,
                location = ?location,
                authenticated = session.is_authenticated(),
                role = ?session.role(),
                "gateway redirect"
            );
            let mut response =
                (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response();
            append_set_cookies(&mut response, set_cookies);
            response
        }
        Ok(Outcome {
            session,
            redirect: None,
            set_cookies,
        }) => {
            tracing::debug!(
                path = %path,
                authenticated = session.is_authenticated(),
                "gateway allow"
            );
            let mut response = next.run(request).await;
            append_set_cookies(&mut response, set_cookies);
            response
        }
        Err(e) => {
            tracing::error!(error = %e, path = %path, "gateway evaluation failed");
            match failure_decision(state.config.gateway_failure_policy, &state.routes, &path) {
                GatewayDecision::Redirect(_) => {
                    (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, NO_ACCESS_PATH)])
                        .into_response()
                }
                GatewayDecision::Allow => next.run(request).await,
            }
        }
    }
}
