use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AuthError,
    models::AuthIdentity,
    repository::RepositoryState,
    session::{PendingCookies, RequestCookies},
};

pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";
pub const REFRESH_TOKEN_COOKIE: &str = "sb-refresh-token";
/// Local-only shortcut: holds the UUID of an existing profile.
pub const DEV_USER_COOKIE: &str = "dev-user-id";

// Browsers cap cookie lifetimes at 400 days; the provider expires the refresh token itself.
const REFRESH_COOKIE_MAX_AGE: i64 = 400 * 24 * 60 * 60;
const TOKEN_AUDIENCE: &str = "authenticated";

/// Claims
///
/// The part of the identity provider's access token the gateway relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the provider's user id, also the primary key of `profiles`.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub aud: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// SessionTokens
///
/// Token pair issued by the identity provider on sign-in or refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl SessionTokens {
    pub fn write_cookies(&self, pending: &mut PendingCookies) {
        pending.set(ACCESS_TOKEN_COOKIE, &self.access_token, Some(self.expires_in));
        pending.set(
            REFRESH_TOKEN_COOKIE,
            &self.refresh_token,
            Some(REFRESH_COOKIE_MAX_AGE),
        );
    }
}

#[derive(Debug, Clone)]
pub struct SignedIn {
    pub identity: AuthIdentity,
    pub tokens: SessionTokens,
}

/// AuthProvider
///
/// The external identity provider. Credential verification and token issuance happen
/// there; the gateway only asks who a request belongs to. Implementations may queue
/// refreshed or cleared cookies on `pending`.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The identity behind the request cookies, `None` when there is no session.
    async fn get_user(
        &self,
        cookies: &RequestCookies,
        pending: &mut PendingCookies,
    ) -> Result<Option<AuthIdentity>, AuthError>;

    /// Verifies a password. Wrong credentials are `AuthError::InvalidCredentials`.
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, AuthError>;

    /// Revokes the session and queues removal of its cookies.
    async fn sign_out(
        &self,
        cookies: &RequestCookies,
        pending: &mut PendingCookies,
    ) -> Result<(), AuthError>;
}

pub type AuthProviderState = Arc<dyn AuthProvider>;

// --- Supabase ---

/// SupabaseAuthProvider
///
/// Production provider backed by Supabase Auth (GoTrue). Access tokens are verified
/// locally with the project JWT secret; the HTTP API is only called to refresh an expired
/// session, to sign in, and to sign out. Roles come from the `profiles` table.
pub struct SupabaseAuthProvider {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    jwt_secret: String,
    env: Env,
    repo: RepositoryState,
}

impl SupabaseAuthProvider {
    pub fn new(config: &AppConfig, repo: RepositoryState) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            jwt_secret: config.jwt_secret.clone(),
            env: config.env,
            repo,
        }
    }

    fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_audience(&[TOKEN_AUDIENCE]);

        decode::<Claims>(token, &decoding_key, &validation).map(|data| data.claims)
    }

    // A user without a profile, or with an unknown role, is authenticated but has no role.
    async fn identity(&self, user_id: Uuid) -> AuthIdentity {
        let role = self.repo.get_user(user_id).await.and_then(|user| user.role());
        AuthIdentity { id: user_id, role }
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<SessionTokens, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type={grant_type}", self.base_url);
        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Rejected {
                status: response.status().as_u16(),
            });
        }

        response
            .json::<SessionTokens>()
            .await
            .map_err(|_| AuthError::MalformedResponse)
    }

    async fn dev_bypass(&self, cookies: &RequestCookies) -> Option<AuthIdentity> {
        if self.env != Env::Local {
            return None;
        }
        let user_id = Uuid::parse_str(cookies.get(DEV_USER_COOKIE)?).ok()?;
        let user = self.repo.get_user(user_id).await?;
        tracing::debug!(user_id = %user.id, "local development bypass");
        Some(AuthIdentity {
            id: user.id,
            role: user.role(),
        })
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuthProvider {
    async fn get_user(
        &self,
        cookies: &RequestCookies,
        pending: &mut PendingCookies,
    ) -> Result<Option<AuthIdentity>, AuthError> {
        if let Some(identity) = self.dev_bypass(cookies).await {
            return Ok(Some(identity));
        }

        if let Some(token) = cookies.get(ACCESS_TOKEN_COOKIE) {
            match self.verify(token) {
                Ok(claims) => return Ok(Some(self.identity(claims.sub).await)),
                // Expired: fall through to the refresh below.
                Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {}
                Err(e) => {
                    pending.remove(ACCESS_TOKEN_COOKIE);
                    pending.remove(REFRESH_TOKEN_COOKIE);
                    return Err(AuthError::MalformedToken(e));
                }
            }
        }

        let Some(refresh_token) = cookies.get(REFRESH_TOKEN_COOKIE) else {
            return Ok(None);
        };

        match self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
        {
            Ok(tokens) => {
                let claims = self.verify(&tokens.access_token)?;
                tokens.write_cookies(pending);
                tracing::debug!(user_id = %claims.sub, "session refreshed");
                Ok(Some(self.identity(claims.sub).await))
            }
            // Revoked or reused refresh token: the session is over.
            Err(AuthError::Rejected { status }) if (400..500).contains(&status) => {
                pending.remove(ACCESS_TOKEN_COOKIE);
                pending.remove(REFRESH_TOKEN_COOKIE);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
        let tokens = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await
            .map_err(|e| match e {
                AuthError::Rejected {
                    status: 400 | 401 | 422,
                } => AuthError::InvalidCredentials,
                other => other,
            })?;

        let claims = self.verify(&tokens.access_token)?;
        Ok(SignedIn {
            identity: self.identity(claims.sub).await,
            tokens,
        })
    }

    async fn sign_out(
        &self,
        cookies: &RequestCookies,
        pending: &mut PendingCookies,
    ) -> Result<(), AuthError> {
        pending.remove(ACCESS_TOKEN_COOKIE);
        pending.remove(REFRESH_TOKEN_COOKIE);

        let Some(token) = cookies.get(ACCESS_TOKEN_COOKIE) else {
            return Ok(());
        };

        let response = self
            .http
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AuthError::Rejected {
                status: response.status().as_u16(),
            })
        }
    }
}

// --- Mock ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum MockBehavior {
    #[default]
    Answer,
    Fail,
    Hang,
    Panic,
}

/// MockAuthProvider
///
/// In-memory provider for tests and local wiring. Knows a fixed set of accounts, issues
/// opaque tokens on sign-in and resolves them from the access token cookie. Can also be
/// told to always return one identity, fail, hang, or panic.
#[derive(Default)]
pub struct MockAuthProvider {
    behavior: MockBehavior,
    fixed_identity: Option<AuthIdentity>,
    refreshed_cookies: Vec<(String, String)>,
    accounts: HashMap<String, (String, AuthIdentity)>,
    sessions: Mutex<HashMap<String, AuthIdentity>>,
    sign_in_calls: AtomicUsize,
}

impl MockAuthProvider {
    /// No sessions and no accounts: every request is anonymous.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request resolves to `identity`, whatever its cookies.
    pub fn authenticated(identity: AuthIdentity) -> Self {
        Self {
            fixed_identity: Some(identity),
            ..Self::default()
        }
    }

    /// Every call answers like an unreachable provider.
    pub fn failing() -> Self {
        Self {
            behavior: MockBehavior::Fail,
            ..Self::default()
        }
    }

    /// Every call waits forever.
    pub fn hanging() -> Self {
        Self {
            behavior: MockBehavior::Hang,
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            behavior: MockBehavior::Panic,
            ..Self::default()
        }
    }

    pub fn with_account(mut self, email: &str, password: &str, identity: AuthIdentity) -> Self {
        self.accounts
            .insert(email.to_lowercase(), (password.to_string(), identity));
        self
    }

    /// Queue `name=value` on every session lookup, like a provider refreshing tokens.
    pub fn with_refreshed_cookie(mut self, name: &str, value: &str) -> Self {
        self.refreshed_cookies
            .push((name.to_string(), value.to_string()));
        self
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    async fn misbehave(&self) -> Result<(), AuthError> {
        match self.behavior {
            MockBehavior::Answer => Ok(()),
            MockBehavior::Fail => Err(AuthError::Rejected { status: 503 }),
            MockBehavior::Hang => std::future::pending().await,
            MockBehavior::Panic => panic!("mock identity provider panicked"),
        }
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn get_user(
        &self,
        cookies: &RequestCookies,
        pending: &mut PendingCookies,
    ) -> Result<Option<AuthIdentity>, AuthError> {
        self.misbehave().await?;

        for (name, value) in &self.refreshed_cookies {
            pending.set(name, value, None);
        }

        if self.fixed_identity.is_some() {
            return Ok(self.fixed_identity);
        }

        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(cookies
            .get(ACCESS_TOKEN_COOKIE)
            .and_then(|token| sessions.get(token).copied()))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, AuthError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.misbehave().await?;

        let identity = match self.accounts.get(&email.trim().to_lowercase()) {
            Some((expected, identity)) if expected == password => *identity,
            _ => return Err(AuthError::InvalidCredentials),
        };

        let tokens = SessionTokens {
            access_token: format!("mock-access-{}", Uuid::new_v4()),
            refresh_token: format!("mock-refresh-{}", Uuid::new_v4()),
            expires_in: 3600,
        };
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tokens.access_token.clone(), identity);

        Ok(SignedIn { identity, tokens })
    }

    async fn sign_out(
        &self,
        cookies: &RequestCookies,
        pending: &mut PendingCookies,
    ) -> Result<(), AuthError> {
        self.misbehave().await?;

        if let Some(token) = cookies.get(ACCESS_TOKEN_COOKIE) {
            self.sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(token);
        }
        pending.remove(ACCESS_TOKEN_COOKIE);
        pending.remove(REFRESH_TOKEN_COOKIE);
        Ok(())
    }
}
