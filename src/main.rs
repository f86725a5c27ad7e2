mod api;
mod config;
mod db;
mod engine;
mod error;
mod gateway;
mod provider;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::store::SqliteStore;
use crate::engine::AlertEngine;
use crate::error::{AppError, Result};
use crate::gateway::FcmGateway;
use crate::provider::KmaForecastProvider;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Engine with production collaborators ---
    let store = Arc::new(SqliteStore::new(pool));
    let provider = Arc::new(KmaForecastProvider::new(&cfg)?);
    let gateway = Arc::new(FcmGateway::new(&cfg)?);

    let engine = Arc::new(AlertEngine::new(
        provider,
        store.clone(),
        store.clone(),
        store.clone(),
        gateway,
        store,
    ));

    // --- Scheduled evaluation cycles ---
    let scheduler_engine = Arc::clone(&engine);
    let interval_secs = cfg.cycle_interval_secs;
    let lookahead_hours = cfg.lookahead_hours;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.tick().await; // first cycle fires after one full interval

        loop {
            ticker.tick().await;
            match scheduler_engine.run_cycle(lookahead_hours).await {
                Ok(summary) => info!(
                    checked = summary.checked_markets,
                    sent = summary.alerts_sent,
                    "Scheduled cycle done",
                ),
                Err(AppError::CycleInProgress) => {
                    warn!("Previous cycle still running, skipping this tick")
                }
                Err(e) => error!("Scheduled cycle failed: {e}"),
            }
        }
    });
    info!("Evaluation cycles scheduled every {interval_secs}s ({lookahead_hours}h horizon)");

    // --- HTTP API server ---
    let app = router(ApiState { engine });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
