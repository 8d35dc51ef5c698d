use std::{collections::HashMap, panic::AssertUnwindSafe, time::Duration};

use axum::{
    extract::FromRef,
    http::{HeaderMap, HeaderValue, header},
    response::Response,
};
use futures::FutureExt;

use crate::{AppState, auth::AuthProviderState, models::Session};

// --- Cookies ---

/// RequestCookies
///
/// The cookies sent with a request, parsed from every `Cookie` header.
#[derive(Debug, Clone, Default)]
pub struct RequestCookies(HashMap<String, String>);

impl RequestCookies {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let cookies = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self(cookies)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// A cookie the identity provider wants written back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCookie {
    pub name: String,
    pub value: String,
    pub max_age: Option<i64>,
}

/// PendingCookies
///
/// Cookie-rewrite callback handed to the identity provider. Whatever is queued here ends
/// up on the response, whether the request is allowed or redirected.
#[derive(Debug, Clone, Default)]
pub struct PendingCookies(Vec<PendingCookie>);

impl PendingCookies {
    pub fn set(&mut self, name: &str, value: &str, max_age: Option<i64>) {
        self.0.retain(|cookie| cookie.name != name);
        self.0.push(PendingCookie {
            name: name.to_string(),
            value: value.to_string(),
            max_age,
        });
    }

    pub fn remove(&mut self, name: &str) {
        self.set(name, "", Some(0));
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingCookie> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders every queued cookie as a `Set-Cookie` value. Cookies that cannot be encoded
    /// as a header are dropped with a warning.
    pub fn to_header_values(&self, secure: bool) -> Vec<HeaderValue> {
        self.0
            .iter()
            .filter_map(|cookie| {
                HeaderValue::from_str(&format_set_cookie(cookie, secure))
                    .inspect_err(|_| {
                        tracing::warn!(cookie = %cookie.name, "dropping unencodable cookie")
                    })
                    .ok()
            })
            .collect()
    }
}

/// format_set_cookie
///
/// Session cookies are always `HttpOnly; SameSite=Lax; Path=/`, and `Secure` in production.
pub fn format_set_cookie(cookie: &PendingCookie, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    let max_age = cookie
        .max_age
        .map(|secs| format!("; Max-Age={secs}"))
        .unwrap_or_default();
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax{secure_flag}{max_age}",
        cookie.name, cookie.value
    )
}

pub fn append_set_cookies(response: &mut Response, cookies: Vec<HeaderValue>) {
    for cookie in cookies {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
}

// --- Resolution ---

#[derive(Debug, Clone, Default)]
pub struct ResolvedSession {
    pub session: Session,
    pub set_cookies: Vec<HeaderValue>,
}

/// SessionResolver
///
/// Asks the identity provider who is behind a request. Never fails: provider errors,
/// malformed tokens, timeouts and a panicking provider all end in `Session::Anonymous`.
#[derive(Clone)]
pub struct SessionResolver {
    provider: AuthProviderState,
    timeout: Duration,
    secure_cookies: bool,
}

impl FromRef<AppState> for SessionResolver {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            state.auth.clone(),
            state.config.auth_timeout,
            state.config.env.is_production(),
        )
    }
}

impl SessionResolver {
    pub fn new(provider: AuthProviderState, timeout: Duration, secure_cookies: bool) -> Self {
        Self {
            provider,
            timeout,
            secure_cookies,
        }
    }

    pub async fn resolve(&self, headers: &HeaderMap) -> ResolvedSession {
        let cookies = RequestCookies::from_headers(headers);
        let mut pending = PendingCookies::default();

        let lookup = AssertUnwindSafe(tokio::time::timeout(
            self.timeout,
            self.provider.get_user(&cookies, &mut pending),
        ))
        .catch_unwind()
        .await;

        let session = match lookup {
            Ok(Ok(Ok(identity))) => Session::from(identity),
            Ok(Ok(Err(e))) => {
                tracing::warn!(error = %e, "session resolution failed, continuing unauthenticated");
                Session::Anonymous
            }
            Ok(Err(_)) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "identity provider timed out, continuing unauthenticated"
                );
                // The provider never finished, so half-written cookies are not trustworthy.
                return ResolvedSession::default();
            }
            Err(_) => {
                tracing::warn!("identity provider panicked, continuing unauthenticated");
                return ResolvedSession::default();
            }
        };

        ResolvedSession {
            session,
            set_cookies: pending.to_header_values(self.secure_cookies),
        }
    }
}
