// merchant-console backend
// Session & authentication core for the merchant administration console.
// The console's CRUD surfaces (discounts, bookings, loyalty, onboarding)
// consume this subsystem through `GET /auth/me` and the session middleware.

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod auth;
pub mod config;

use auth::{AuthContext, AuthError, OidcClient, SessionCodec, SessionStore, auth_router};
use config::AppConfig;

/// Build the shared authentication context from validated configuration.
pub fn build_auth_context(config: &AppConfig) -> Result<Arc<AuthContext>, AuthError> {
    let provider = OidcClient::new(config.auth.provider.clone())?;

    Ok(Arc::new(AuthContext {
        codec: SessionCodec::from_secret(&config.auth.session_secret),
        store: SessionStore::new(config.auth.cookie_secure),
        provider: Arc::new(provider),
        home_url: config.auth.home_url.clone(),
        error_url: config.auth.error_url.clone(),
    }))
}

/// Assemble the application router. The auth subsystem is mounted under
/// `/auth`; console API routers nest alongside it and guard themselves with
/// `auth::require_session`.
pub fn build_router(ctx: Arc<AuthContext>) -> Router {
    Router::new()
        .nest("/auth", auth_router(ctx))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the HTTP server and run until `shutdown_rx` fires.
pub async fn start_server(
    config: AppConfig,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let ctx = build_auth_context(&config)?;
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr()).await?;
    info!(addr = %config.server.bind_addr(), "merchant-console listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        })
        .await?;

    Ok(())
}
