use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use tracing::{error, info, warn};

use book_catalog::{
    AppState, Config, build_app, pg_store::PgStore, serve, spawn_limiter_pruning,
};

const LIMITER_PRUNE_EVERY: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,book_catalog=debug,sqlx=warn,tower_http=info".into()
            }),
        )
        .json()
        .init();

    info!("Starting book catalog API v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let state = match config.database_url.as_deref() {
        Some(url) => AppState::new(Arc::new(PgStore::connect(url).await?), config.clone()),
        None => {
            warn!("DATABASE_URL not set, using the in-memory store");
            AppState::in_memory(config.clone())
        }
    };

    let _pruning = spawn_limiter_pruning(state.login_limiter.clone(), LIMITER_PRUNE_EVERY);
    let app = build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    serve(listener, app, stop_requested())
        .await
        .map_err(|e| anyhow!("Server error: {e}"))?;

    info!("Server shut down gracefully");
    Ok(())
}

/// Resolves on the first interrupt or terminate request. A signal source that
/// cannot be registered is logged and never fires.
async fn stop_requested() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for interrupts");
            std::future::pending::<()>().await;
        }
        "interrupt"
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for terminate requests");
                std::future::pending::<()>().await;
            }
        }
        "terminate"
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<&str>();

    let signal = tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    };
    info!(signal, "stop requested, draining connections");
}
