//! RTH Admin Backend
//! Mission: Serve admin login and session management for the RTH Bandung dashboard

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, time::interval};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rth_admin::{
    app::build_router,
    auth::{AuthState, RevocationList},
    config::{AppConfig, ServerArgs},
    db::Database,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    let config = AppConfig::try_from(ServerArgs::parse()).context("Invalid configuration")?;

    info!(
        "🚀 RTH admin backend starting ({:?} mode)",
        config.run_mode
    );

    // One connection for the life of the process
    let db = Database::open(&config.database_url)?;
    let auth_state = AuthState::new(db.clone(), &config);

    auth_state
        .admins
        .ensure_bootstrap_admin(config.bootstrap_admin.as_ref())?;

    info!(
        "🔐 Authentication initialized, token lifetime {}s",
        auth_state.jwt_handler.ttl().as_secs()
    );

    tokio::spawn(revocation_purge(
        auth_state.revocations.clone(),
        config.purge_interval,
    ));

    let app = build_router(auth_state, db);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("👋 Server stopped");
    Ok(())
}

/// Periodically drop revocation entries whose window has passed
async fn revocation_purge(revocations: Arc<RevocationList>, period: Duration) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        if let Err(e) = revocations.purge_expired() {
            warn!("Revocation purge failed (will retry next tick): {}", e);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rth_admin=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate-root .env when started from elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
