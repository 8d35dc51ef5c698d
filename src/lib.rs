use axum::{
    Router,
    http::HeaderName,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access control core.
pub mod gateway;
pub mod rate_limit;
pub mod redirect;
pub mod routes;
pub mod session;

// Identity provider, persistence and HTTP surface.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;

// --- Public Re-exports ---

pub use auth::{AuthProvider, AuthProviderState, MockAuthProvider, SupabaseAuthProvider};
pub use config::AppConfig;
pub use rate_limit::{LoginAttemptLimiter, RateLimitConfig, RateLimitStatus};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use routes::RouteClassifier;

/// ApiDoc
///
/// OpenAPI description of the gateway's own endpoints, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::login, handlers::logout),
    components(schemas(models::LoginRequest, models::LoginResponse, models::Role)),
    tags((name = "portal-gateway", description = "Access control gateway and login API"))
)]
pub struct ApiDoc;

/// AppState
///
/// Unified, cheaply clonable state shared by the gateway middleware and the handlers.
/// Components are pulled out of it with `FromRef` where a narrower view is enough
/// (see `session::SessionResolver`).
#[derive(Clone)]
pub struct AppState {
    /// External identity provider.
    pub auth: AuthProviderState,
    /// Static route tables, compiled and validated at startup.
    pub routes: Arc<RouteClassifier>,
    /// Process-wide failed-login bookkeeping.
    pub limiter: Arc<LoginAttemptLimiter>,
    pub config: AppConfig,
}

impl AppState {
    /// State with the platform route tables and a fresh limiter.
    pub fn new(config: AppConfig, auth: AuthProviderState) -> Self {
        Self {
            auth,
            routes: Arc::new(RouteClassifier::standard()),
            limiter: Arc::new(LoginAttemptLimiter::new()),
            config,
        }
    }
}

/// create_router
///
/// The gateway with only its own endpoints mounted. Every other path falls through to
/// the not-found page.
pub fn create_router(state: AppState) -> Router {
    create_router_with_content(state, Router::new())
}

/// create_router_with_content
///
/// Mounts the host application's `content` routes behind the gateway. The content router
/// must not set its own fallback.
pub fn create_router_with_content(state: AppState, content: Router<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(handlers::openapi))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/no-access", get(handlers::no_access))
        .route("/not-found", get(handlers::not_found))
        .merge(content)
        .fallback(handlers::not_found)
        // The gateway wraps every route and the fallback, so unknown paths are classified too.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gateway::gateway_middleware,
        ))
        .with_state(state);

    // Observability and correlation layers, outermost so redirects are traced as well.
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Puts the `x-request-id` next to method and URI on the request span, so every log line
/// of one request (gateway decision included) can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
