//! Web server module for receiving inbound mail.
//!
//! This module provides the HTTP surface that:
//! - Receives forwarded mail from Mailgun and Cloudflare
//! - Verifies authentication
//! - Dispatches each message and reports the outcome
//! - Lists a member's mail-in addresses for the site's settings page
//!
//! There is no server binary: the mail-in core has no storage of its own,
//! so the host site embeds the server. It builds a `Mailin` over its own
//! `Host` implementation and hands it to [`serve`] (or mounts [`router`]
//! into its own axum app):
//!
//! ```ignore
//! let config = Config::from_env();
//! let mailin = Mailin::new(config.capabilities.clone(), Arc::new(SiteHost::connect()?));
//! mailin::web::serve(AppState::new(config, mailin)).await?;
//! ```

pub mod handlers;
pub mod signature;

use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use handlers::{
    cloudflare_mailin, health, mailgun_mailin, mailin_addresses, AddressesResponse, AppState,
    HealthResponse, MailinResponse,
};
pub use signature::{
    is_signature_verification_enabled, verify_mailgun_signature, RouteSignature, SignatureError,
};

/// Mailgun accepts messages up to 25 MB; attachments arrive inline in the post.
const MAILGUN_BODY_LIMIT: usize = 30 * 1024 * 1024;

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/mailin/mailgun",
            post(mailgun_mailin).layer(DefaultBodyLimit::max(MAILGUN_BODY_LIMIT)),
        )
        .route("/mailin/addresses/:username", get(mailin_addresses))
        .route("/mailin/cloudflare", post(cloudflare_mailin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on the configured port until SIGINT or SIGTERM.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));

    info!(
        port = state.config.port,
        cloudflare_auth_configured = state.config.cloudflare_auth_token.is_some(),
        mailgun_signing_configured = state.config.mailgun_signing_key.is_some(),
        mailin_domain = ?state.config.mailin_domain,
        "web_server_starting"
    );

    let listener = TcpListener::bind(addr).await?;

    info!(address = %addr, "web_server_listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
