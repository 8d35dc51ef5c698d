use std::{sync::Arc, time::Duration};

use axum::http::{HeaderMap, HeaderValue, header};
use portal_gateway::{
    AuthProviderState, MockAuthProvider,
    models::{AuthIdentity, Role, Session},
    session::{PendingCookie, PendingCookies, RequestCookies, SessionResolver, format_set_cookie},
};
use uuid::Uuid;

fn headers_with_cookies(values: &[&'static str]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for value in values {
        headers.append(header::COOKIE, HeaderValue::from_static(*value));
    }
    headers
}

// --- Cookie Parsing & Formatting ---

#[test]
fn test_request_cookies_parse_every_header() {
    let cookies = RequestCookies::from_headers(&headers_with_cookies(&[
        "sb-access-token=abc; theme=dark",
        " sb-refresh-token = def ;empty=",
    ]));

    assert_eq!(cookies.get("sb-access-token"), Some("abc"));
    assert_eq!(cookies.get("sb-refresh-token"), Some("def"));
    assert_eq!(cookies.get("theme"), Some("dark"));
    assert_eq!(cookies.get("empty"), None);
    assert_eq!(cookies.get("missing"), None);
}

#[test]
fn test_pending_cookies_last_write_wins() {
    let mut pending = PendingCookies::default();
    pending.set("sb-access-token", "old", Some(60));
    pending.remove("sb-access-token");

    let all: Vec<&PendingCookie> = pending.iter().collect();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].value, "");
    assert_eq!(all[0].max_age, Some(0));
}

#[test]
fn test_set_cookie_attributes() {
    let cookie = PendingCookie {
        name: "sb-access-token".to_string(),
        value: "abc".to_string(),
        max_age: Some(3600),
    };

    assert_eq!(
        format_set_cookie(&cookie, false),
        "sb-access-token=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600"
    );
    assert_eq!(
        format_set_cookie(&cookie, true),
        "sb-access-token=abc; Path=/; HttpOnly; SameSite=Lax; Secure; Max-Age=3600"
    );
}

// --- Resolution ---

fn resolver(provider: MockAuthProvider, timeout: Duration) -> SessionResolver {
    SessionResolver::new(Arc::new(provider) as AuthProviderState, timeout, false)
}

#[tokio::test]
async fn test_resolve_authenticated_with_refreshed_cookie() {
    let id = Uuid::new_v4();
    let provider = MockAuthProvider::authenticated(AuthIdentity {
        id,
        role: Some(Role::Admin),
    })
    .with_refreshed_cookie("sb-access-token", "fresh");

    let resolved = resolver(provider, Duration::from_secs(1))
        .resolve(&HeaderMap::new())
        .await;

    assert_eq!(
        resolved.session,
        Session::Authenticated {
            user_id: id,
            role: Some(Role::Admin)
        }
    );
    assert_eq!(resolved.set_cookies.len(), 1);
}

#[tokio::test]
async fn test_resolve_provider_error_is_anonymous() {
    let resolved = resolver(MockAuthProvider::failing(), Duration::from_secs(1))
        .resolve(&HeaderMap::new())
        .await;

    assert_eq!(resolved.session, Session::Anonymous);
}

#[tokio::test]
async fn test_resolve_timeout_is_anonymous_without_cookies() {
    let resolved = resolver(MockAuthProvider::hanging(), Duration::from_millis(20))
        .resolve(&HeaderMap::new())
        .await;

    assert_eq!(resolved.session, Session::Anonymous);
    assert!(resolved.set_cookies.is_empty());
}

#[tokio::test]
async fn test_resolve_panicking_provider_is_anonymous() {
    let resolved = resolver(MockAuthProvider::panicking(), Duration::from_secs(1))
        .resolve(&HeaderMap::new())
        .await;

    assert_eq!(resolved.session, Session::Anonymous);
    assert!(resolved.set_cookies.is_empty());
}
