use claim_service::{
    build_router,
    config::ClaimConfig,
    db,
    services::delivery::{SmtpEmailProvider, TwilioSmsProvider},
    services::session::SessionService,
    services::webauthn::WebauthnService,
    store::PgStore,
    AppState,
};
use axum_extra::extract::cookie::Key;
use service_core::error::AppError;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = ClaimConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting claim service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migrations failed: {}", e)))?;

    let store = Arc::new(PgStore::new(pool));

    let email = Arc::new(
        SmtpEmailProvider::new(config.smtp.clone())
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("SMTP init failed: {}", e)))?,
    );
    let sms = Arc::new(TwilioSmsProvider::new(config.twilio.clone()));

    let webauthn = Arc::new(WebauthnService::new(&config.webauthn)?);
    let session = SessionService::new(&config.session);
    let cookie_key = Key::from(config.session.cookie_key.as_bytes());

    let claim_start_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.claim_start_attempts,
        config.rate_limit.claim_start_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );

    let port = config.common.port;
    let state = AppState {
        config,
        store,
        email,
        sms,
        webauthn,
        session,
        cookie_key,
        claim_start_rate_limiter,
        ip_rate_limiter,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
