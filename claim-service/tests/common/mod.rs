//! Test helpers: an in-memory application with mock delivery providers.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use axum_extra::extract::cookie::Key;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

use claim_service::{
    build_router,
    config::{
        ClaimConfig, DatabaseConfig, Environment, OtpConfig, RateLimitConfig, SecurityConfig,
        SessionConfig, SmtpConfig, TwilioConfig, WebAuthnConfig,
    },
    models::{ClaimContact, Role, User},
    services::delivery::{MockEmailProvider, MockSmsProvider},
    services::session::SessionService,
    services::webauthn::WebauthnService,
    store::{MemStore, Store},
    AppState,
};

pub const TEST_ADMIN_API_KEY: &str = "test-admin-key-12345";
pub const TEST_OTP_SECRET: &str = "test-otp-secret";

const TEST_COOKIE_KEY: &str =
    "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemStore>,
    pub email: Arc<MockEmailProvider>,
    pub sms: Arc<MockSmsProvider>,
    router: Router,
}

pub fn test_config() -> ClaimConfig {
    ClaimConfig {
        common: service_core::config::Config { port: 0 },
        environment: Environment::Dev,
        service_name: "claim-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "warn".to_string(),
        app_name: "QR Label".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
        },
        otp: OtpConfig {
            secret: TEST_OTP_SECRET.to_string(),
            code_ttl_hours: 24,
            claim_token_ttl_days: 7,
            expose_dev_code: true,
        },
        session: SessionConfig {
            jwt_secret: "test-session-secret-test-session-secret".to_string(),
            ttl_days: 30,
            cookie_secure: false,
            cookie_key: TEST_COOKIE_KEY.to_string(),
        },
        webauthn: WebAuthnConfig {
            rp_id: "localhost".to_string(),
            rp_origin: "http://localhost:3000".to_string(),
            rp_name: "QR Label".to_string(),
        },
        smtp: SmtpConfig {
            enabled: false,
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: String::new(),
            from_email: "noreply@localhost".to_string(),
            from_name: "QR Label".to_string(),
        },
        twilio: TwilioConfig {
            enabled: false,
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            admin_api_key: TEST_ADMIN_API_KEY.to_string(),
        },
        rate_limit: RateLimitConfig {
            claim_start_attempts: 1000,
            claim_start_window_seconds: 60,
            global_ip_limit: 10000,
            global_ip_window_seconds: 60,
        },
    }
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_providers(MockEmailProvider::new(), MockSmsProvider::new())
    }

    pub fn with_providers(email: MockEmailProvider, sms: MockSmsProvider) -> Self {
        let config = test_config();
        let store = Arc::new(MemStore::new());
        let email = Arc::new(email);
        let sms = Arc::new(sms);

        let webauthn =
            Arc::new(WebauthnService::new(&config.webauthn).expect("webauthn test config"));
        let session = SessionService::new(&config.session);
        let cookie_key = Key::from(config.session.cookie_key.as_bytes());

        let claim_start_rate_limiter =
            service_core::middleware::rate_limit::create_ip_rate_limiter(
                config.rate_limit.claim_start_attempts,
                config.rate_limit.claim_start_window_seconds,
            );
        let ip_rate_limiter = service_core::middleware::rate_limit::create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        let state = AppState {
            config,
            store: store.clone(),
            email: email.clone(),
            sms: sms.clone(),
            webauthn,
            session,
            cookie_key,
            claim_start_rate_limiter,
            ip_rate_limiter,
        };

        let router = build_router(state.clone());

        Self {
            state,
            store,
            email,
            sms,
            router,
        }
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "10.0.0.1")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn get(&self, path: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .uri(path)
            .header("x-forwarded-for", "10.0.0.1")
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Full response, for tests that need to look at headers.
    pub async fn post_json_raw(
        &self,
        path: &str,
        body: serde_json::Value,
        cookie: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "10.0.0.1");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed")
    }

    /// Full response for a GET, for tests that need to look at headers.
    pub async fn get_raw(&self, path: &str, request_id: Option<&str>) -> axum::response::Response {
        let mut builder = Request::builder()
            .method("GET")
            .uri(path)
            .header("x-forwarded-for", "10.0.0.1");
        if let Some(id) = request_id {
            builder = builder.header("x-request-id", id);
        }
        let request = builder.body(Body::empty()).unwrap();
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed")
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body read failed")
            .to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    /// Seed a bin with a token, bypassing the admin surface.
    pub async fn seed_bin(&self, token: &str) -> Uuid {
        let bin = claim_service::models::Bin::new("Test bin".to_string(), None, None, None);
        self.store.insert_bin(&bin).await.unwrap();
        self.store.insert_bin_token(token, bin.id).await.unwrap();
        bin.id
    }

    pub async fn seed_contact(
        &self,
        bin_id: Uuid,
        role: Role,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Uuid {
        let contact = ClaimContact::new(
            bin_id,
            role,
            email.map(String::from),
            phone.map(String::from),
        );
        self.store.insert_claim_contact(&contact).await.unwrap();
        contact.id
    }

    pub async fn seed_user(&self) -> Uuid {
        let user = User::new();
        self.store.insert_user(&user).await.unwrap();
        user.id
    }

    pub fn expire_verification(&self, id: Uuid, when: DateTime<Utc>) {
        self.store.set_verification_expiry(id, when).unwrap();
    }
}
