pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;

use axum::{
    extract::FromRef,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::Key;
use service_core::middleware::{
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ClaimConfig;
use crate::services::delivery::{EmailProvider, SmsProvider};
use crate::services::session::SessionService;
use crate::services::webauthn::WebauthnService;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub config: ClaimConfig,
    pub store: Arc<dyn Store>,
    pub email: Arc<dyn EmailProvider>,
    pub sms: Arc<dyn SmsProvider>,
    pub webauthn: Arc<WebauthnService>,
    pub session: SessionService,
    pub cookie_key: Key,
    pub claim_start_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        state.cookie_key.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    // Claim-start fans out real emails and SMS, so it gets its own tighter
    // limit on top of the global one.
    let claim_start_limiter = state.claim_start_rate_limiter.clone();
    let claim_start_route = Router::new()
        .route("/claim/start", post(handlers::claim::start_claim))
        .layer(from_fn_with_state(
            claim_start_limiter,
            ip_rate_limit_middleware,
        ));

    let admin_routes = Router::new()
        .route("/admin/bins", post(handlers::admin::create_bin))
        .route(
            "/admin/claim-contacts",
            post(handlers::admin::create_claim_contact),
        )
        .layer(from_fn_with_state(
            state.clone(),
            handlers::admin::admin_auth_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();

    let allowed_origins: Vec<HeaderValue> = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}", o, e);
                None
            }
        })
        .collect();

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(claim_start_route)
        .route("/claim/verify", post(handlers::claim::verify_claim))
        .route("/claim/status", get(handlers::claim::claim_status))
        .route(
            "/webauthn/register/options",
            post(handlers::webauthn::register_options),
        )
        .route(
            "/webauthn/register/verify",
            post(handlers::webauthn::register_verify),
        )
        .route(
            "/webauthn/login/options",
            post(handlers::webauthn::login_options),
        )
        .route(
            "/webauthn/login/verify",
            post(handlers::webauthn::login_verify),
        )
        .route("/session", get(handlers::session::get_session))
        .route("/auth/logout", post(handlers::session::logout))
        .merge(admin_routes)
        .with_state(state)
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_credentials(true)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::HeaderName::from_static("x-admin-key"),
                ]),
        )
}
