//! Verification agent binary
//!
//! # Usage
//!
//! ```bash
//! AGENT_DATABASE_URL=postgres://... \
//! AGENT_PRIMARY_ENGINE="/opt/ocr/tesseract.sh" \
//! AGENT_SECONDARY_ENGINE="python3 /opt/ocr/paddle.py" \
//! cargo run --bin verification-agent
//! ```
//!
//! # Environment Variables
//!
//! * `AGENT_HOST` / `AGENT_PORT` - HTTP bind address (default: 0.0.0.0:8080)
//! * `AGENT_DATABASE_URL` - PostgreSQL connection string (falls back to `DATABASE_URL`)
//! * `AGENT_EVIDENCE_ROOT` - Directory holding uploaded evidence
//! * `AGENT_PRIMARY_ENGINE` / `AGENT_SECONDARY_ENGINE` / `AGENT_CLOUD_ENGINE` - OCR engine commands
//! * `AGENT_POLL_INTERVAL_SECS`, `AGENT_BATCH_SIZE`, `AGENT_CLAIM_PAUSE_MS`, `AGENT_ERROR_BACKOFF_SECS`
//! * `AGENT_LOG_LEVEL` / `AGENT_LOG_JSON` - Log filter and format
//! * `AGENT_VERIFICATION__*` - Verification thresholds, e.g. `AGENT_VERIFICATION__TOLERANCE=0.05`

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;

use infra_db::{create_pool, run_migrations, PostgresClaimStore};
use interface_agent::{
    create_router, telemetry::init_tracing, wiring::build_pipeline, AgentConfig, AppState,
    Worker, WorkerSettings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AgentConfig::from_env().context("loading agent configuration")?;
    init_tracing(&config.log_level, config.log_json);

    tracing::info!(
        addr = %config.server_addr(),
        evidence_root = %config.evidence_root.display(),
        "Starting verification agent"
    );

    let pool = create_pool(config.database())
        .await
        .context("connecting to database")?;
    run_migrations(&pool).await.context("applying migrations")?;

    let store = Arc::new(PostgresClaimStore::new(pool));
    let pipeline = Arc::new(build_pipeline(&config, store.clone()));
    let tiers: Vec<_> = pipeline.tiers().iter().map(|t| t.name().to_string()).collect();
    tracing::info!(?tiers, "Verification pipeline ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = Worker::new(pipeline.clone(), store.clone(), WorkerSettings::from(&config));
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let app = create_router(AppState::new(pipeline, store));
    let addr: SocketAddr = config.server_addr().parse().context("parsing bind address")?;
    let listener = TcpListener::bind(addr).await.context("binding listener")?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    worker_handle.await.context("joining worker")?;
    tracing::info!("Agent shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
