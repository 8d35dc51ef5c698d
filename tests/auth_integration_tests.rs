use std::{collections::HashMap, sync::Arc, time::SystemTime};

use axum::{
    Json, Router,
    extract::Query,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use portal_gateway::{
    AppConfig, AuthProvider, InMemoryRepository, RepositoryState, SupabaseAuthProvider,
    auth::{ACCESS_TOKEN_COOKIE, Claims, DEV_USER_COOKIE, REFRESH_TOKEN_COOKIE},
    config::Env,
    error::AuthError,
    models::{Role, User},
    session::{PendingCookie, PendingCookies, RequestCookies},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_ANON_KEY: &str = "test-anon-key";
const ADMIN_ID: Uuid = Uuid::from_u128(1);
const WRITER_ID: Uuid = Uuid::from_u128(2);
const NO_PROFILE_ID: Uuid = Uuid::from_u128(3);

fn now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn create_token_with(user_id: Uuid, exp: u64, secret: &str) -> String {
    let claims = Claims {
        sub: user_id,
        iat: now() as usize,
        exp: exp as usize,
        aud: "authenticated".to_string(),
        email: None,
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn create_token(user_id: Uuid, expires_in: u64) -> String {
    create_token_with(user_id, now() + expires_in, TEST_JWT_SECRET)
}

fn expired_token(user_id: Uuid) -> String {
    create_token_with(user_id, now() - 3600, TEST_JWT_SECRET)
}

fn profiles() -> RepositoryState {
    Arc::new(
        InMemoryRepository::new()
            .with_user(User {
                id: ADMIN_ID,
                email: "admin@league.test".to_string(),
                role: "admin".to_string(),
            })
            .with_user(User {
                id: WRITER_ID,
                email: "writer@league.test".to_string(),
                role: "writer".to_string(),
            }),
    )
}

fn provider(env: Env, supabase_url: &str) -> SupabaseAuthProvider {
    let config = AppConfig {
        env,
        supabase_url: supabase_url.to_string(),
        supabase_anon_key: TEST_ANON_KEY.to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    SupabaseAuthProvider::new(&config, profiles())
}

fn cookies(pairs: &[(&str, &str)]) -> RequestCookies {
    let raw = pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ");
    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, HeaderValue::from_str(&raw).unwrap());
    RequestCookies::from_headers(&headers)
}

fn pending_cookie<'a>(pending: &'a PendingCookies, name: &str) -> Option<&'a PendingCookie> {
    pending.iter().find(|cookie| cookie.name == name)
}

fn assert_cleared(pending: &PendingCookies) {
    for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
        let cookie = pending_cookie(pending, name).expect("cookie should be cleared");
        assert_eq!(cookie.value, "");
        assert_eq!(cookie.max_age, Some(0));
    }
}

// --- Fake Identity Provider ---

async fn fake_token(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some(TEST_ANON_KEY) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "msg": "no api key" })));
    }

    let user_id = match query.get("grant_type").map(String::as_str) {
        Some("password") if body["email"] == "writer@league.test" && body["password"] == "pw" => {
            Some(WRITER_ID)
        }
        Some("refresh_token") if body["refresh_token"] == "good-refresh" => Some(WRITER_ID),
        _ => None,
    };

    match user_id {
        Some(id) => (
            StatusCode::OK,
            Json(json!({
                "access_token": create_token(id, 3600),
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "rotated-refresh",
                "user": { "id": id }
            })),
        ),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant" })),
        ),
    }
}

async fn fake_logout(headers: HeaderMap) -> StatusCode {
    match headers.get(header::AUTHORIZATION) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::UNAUTHORIZED,
    }
}

/// Spawns a stand-in for the identity provider's HTTP API and returns its base URL.
async fn spawn_fake_supabase() -> String {
    let router = Router::new()
        .route("/auth/v1/token", post(fake_token))
        .route("/auth/v1/logout", post(fake_logout));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://127.0.0.1:{}/", port)
}

// --- Session Lookup ---

#[tokio::test]
async fn test_valid_token_resolves_profile_role() {
    let auth = provider(Env::Production, "http://127.0.0.1:1");
    let mut pending = PendingCookies::default();

    let identity = auth
        .get_user(
            &cookies(&[(ACCESS_TOKEN_COOKIE, create_token(ADMIN_ID, 3600).as_str())]),
            &mut pending,
        )
        .await
        .unwrap()
        .expect("session expected");

    assert_eq!(identity.id, ADMIN_ID);
    assert_eq!(identity.role, Some(Role::Admin));
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_valid_token_without_profile_has_no_role() {
    let auth = provider(Env::Production, "http://127.0.0.1:1");
    let mut pending = PendingCookies::default();

    let identity = auth
        .get_user(
            &cookies(&[(ACCESS_TOKEN_COOKIE, create_token(NO_PROFILE_ID, 3600).as_str())]),
            &mut pending,
        )
        .await
        .unwrap()
        .expect("session expected");

    assert_eq!(identity.id, NO_PROFILE_ID);
    assert_eq!(identity.role, None);
}

#[tokio::test]
async fn test_no_cookies_means_no_session() {
    let auth = provider(Env::Production, "http://127.0.0.1:1");
    let mut pending = PendingCookies::default();

    let result = auth
        .get_user(&RequestCookies::default(), &mut pending)
        .await
        .unwrap();

    assert!(result.is_none());
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_malformed_token_is_an_error_and_clears_cookies() {
    let auth = provider(Env::Production, "http://127.0.0.1:1");

    for token in [
        "not-a-jwt".to_string(),
        create_token_with(ADMIN_ID, now() + 3600, "some-other-secret"),
    ] {
        let mut pending = PendingCookies::default();
        let result = auth
            .get_user(&cookies(&[(ACCESS_TOKEN_COOKIE, token.as_str())]), &mut pending)
            .await;

        assert!(matches!(result, Err(AuthError::MalformedToken(_))));
        assert_cleared(&pending);
    }
}

#[tokio::test]
async fn test_expired_token_is_refreshed() {
    let base_url = spawn_fake_supabase().await;
    let auth = provider(Env::Production, &base_url);
    let mut pending = PendingCookies::default();

    let identity = auth
        .get_user(
            &cookies(&[
                (ACCESS_TOKEN_COOKIE, expired_token(WRITER_ID).as_str()),
                (REFRESH_TOKEN_COOKIE, "good-refresh"),
            ]),
            &mut pending,
        )
        .await
        .unwrap()
        .expect("refreshed session expected");

    assert_eq!(identity.id, WRITER_ID);
    assert_eq!(identity.role, Some(Role::Writer));

    let access = pending_cookie(&pending, ACCESS_TOKEN_COOKIE).unwrap();
    assert!(!access.value.is_empty());
    assert_eq!(access.max_age, Some(3600));
    let refresh = pending_cookie(&pending, REFRESH_TOKEN_COOKIE).unwrap();
    assert_eq!(refresh.value, "rotated-refresh");
}

#[tokio::test]
async fn test_rejected_refresh_ends_the_session() {
    let base_url = spawn_fake_supabase().await;
    let auth = provider(Env::Production, &base_url);
    let mut pending = PendingCookies::default();

    let result = auth
        .get_user(
            &cookies(&[
                (ACCESS_TOKEN_COOKIE, expired_token(WRITER_ID).as_str()),
                (REFRESH_TOKEN_COOKIE, "revoked-refresh"),
            ]),
            &mut pending,
        )
        .await
        .unwrap();

    assert!(result.is_none());
    assert_cleared(&pending);
}

#[tokio::test]
async fn test_unreachable_provider_is_an_error() {
    let auth = provider(Env::Production, "http://127.0.0.1:1");
    let mut pending = PendingCookies::default();

    let result = auth
        .get_user(
            &cookies(&[(REFRESH_TOKEN_COOKIE, "good-refresh")]),
            &mut pending,
        )
        .await;

    assert!(matches!(result, Err(AuthError::Unreachable(_))));
}

// --- Local Development Bypass ---

#[tokio::test]
async fn test_local_bypass_success() {
    let auth = provider(Env::Local, "http://127.0.0.1:1");
    let mut pending = PendingCookies::default();

    let identity = auth
        .get_user(
            &cookies(&[(DEV_USER_COOKIE, ADMIN_ID.to_string().as_str())]),
            &mut pending,
        )
        .await
        .unwrap()
        .expect("bypass session expected");

    assert_eq!(identity.id, ADMIN_ID);
    assert_eq!(identity.role, Some(Role::Admin));
}

#[tokio::test]
async fn test_local_bypass_requires_existing_profile() {
    let auth = provider(Env::Local, "http://127.0.0.1:1");
    let mut pending = PendingCookies::default();

    let result = auth
        .get_user(
            &cookies(&[(DEV_USER_COOKIE, NO_PROFILE_ID.to_string().as_str())]),
            &mut pending,
        )
        .await
        .unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let auth = provider(Env::Production, "http://127.0.0.1:1");
    let mut pending = PendingCookies::default();

    let result = auth
        .get_user(
            &cookies(&[(DEV_USER_COOKIE, ADMIN_ID.to_string().as_str())]),
            &mut pending,
        )
        .await
        .unwrap();

    assert!(result.is_none());
}

// --- Sign In / Sign Out ---

#[tokio::test]
async fn test_sign_in_success() {
    let base_url = spawn_fake_supabase().await;
    let auth = provider(Env::Production, &base_url);

    let signed_in = auth.sign_in("writer@league.test", "pw").await.unwrap();

    assert_eq!(signed_in.identity.id, WRITER_ID);
    assert_eq!(signed_in.identity.role, Some(Role::Writer));
    assert_eq!(signed_in.tokens.refresh_token, "rotated-refresh");
    assert_eq!(signed_in.tokens.expires_in, 3600);
}

#[tokio::test]
async fn test_sign_in_wrong_password_is_invalid_credentials() {
    let base_url = spawn_fake_supabase().await;
    let auth = provider(Env::Production, &base_url);

    let result = auth.sign_in("writer@league.test", "wrong").await;

    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn test_sign_in_unreachable_provider_is_not_invalid_credentials() {
    let auth = provider(Env::Production, "http://127.0.0.1:1");

    let result = auth.sign_in("writer@league.test", "pw").await;

    assert!(matches!(result, Err(AuthError::Unreachable(_))));
}

#[tokio::test]
async fn test_sign_out_clears_cookies() {
    let base_url = spawn_fake_supabase().await;
    let auth = provider(Env::Production, &base_url);
    let mut pending = PendingCookies::default();

    auth.sign_out(
        &cookies(&[(ACCESS_TOKEN_COOKIE, create_token(WRITER_ID, 3600).as_str())]),
        &mut pending,
    )
    .await
    .unwrap();

    assert_cleared(&pending);
}

#[tokio::test]
async fn test_sign_out_clears_cookies_even_when_provider_is_down() {
    let auth = provider(Env::Production, "http://127.0.0.1:1");
    let mut pending = PendingCookies::default();

    let result = auth
        .sign_out(
            &cookies(&[(ACCESS_TOKEN_COOKIE, create_token(WRITER_ID, 3600).as_str())]),
            &mut pending,
        )
        .await;

    assert!(result.is_err());
    assert_cleared(&pending);
}
