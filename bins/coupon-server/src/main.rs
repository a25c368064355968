//! coupon-server — distributes single-use discount codes over HTTP.
//!
//! Anonymous visitors claim codes at `/claim-coupon`, limited to one
//! claim per network address per cooldown window and one claim per
//! session ever. Administrators manage the inventory and audit claims
//! under `/admin/*` after exchanging a username and secret for a
//! 24-hour credential.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

mod config;
mod routes;

use config::Config;
use coupon_core::auth::AdminAuth;
use coupon_core::claim::ClaimService;
use coupon_core::traits::CouponStore;
use coupon_store::RocksStore;

/// Shared application state passed to every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer, shared by the claim path and admin handlers.
    pub store: Arc<dyn CouponStore>,
    /// Claim orchestrator (eligibility + allocation + ledger write).
    pub claims: ClaimService,
    /// Admin credential issuing and verification.
    pub auth: AdminAuth,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("Failed to load server configuration")?;

    info!(
        bind = %config.bind_addr,
        data_dir = %config.data_dir.display(),
        cooldown_secs = config.cooldown_secs,
        "Starting coupon-server"
    );

    if config.admin_password == config::DEFAULT_ADMIN_PASSWORD {
        warn!("COUPON_ADMIN_PASSWORD not set, using the default bootstrap password");
    }
    if config.token_secret == config::DEFAULT_TOKEN_SECRET {
        warn!("COUPON_TOKEN_SECRET not set, issued credentials will not survive redeploys safely");
    }

    let store: Arc<dyn CouponStore> = Arc::new(
        RocksStore::open(config.db_path())
            .with_context(|| format!("Failed to open store at {}", config.db_path().display()))?,
    );

    let auth = AdminAuth::new(store.clone(), config.token_secret.as_bytes());
    if auth
        .bootstrap(&config.admin_username, &config.admin_password)
        .context("Failed to bootstrap the default administrator")?
    {
        info!(username = %config.admin_username, "bootstrapped default administrator");
    }

    let claims = ClaimService::new(store.clone(), config.cooldown());

    let state = AppState { store, claims, auth };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("Listening on http://{}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("HTTP server error")?;

    Ok(())
}
