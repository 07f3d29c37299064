//! Engine binary for the Peatnet game economy.
//!
//! Wires the engine to its infrastructure and keeps it running until
//! Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `peatnet-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` and run migrations
//! 4. Build the engine over the `PostgreSQL` store
//! 5. Connect to NATS, start the event bridge and the operation inbox
//! 6. Start the danger scheduler and passive income loops
//! 7. Wait for Ctrl-C, then stop every task and close the pool

mod bridge;
mod error;
mod inbox;

use std::path::Path;
use std::sync::Arc;

use peatnet_core::clock::{Clock, SystemClock};
use peatnet_core::config::{EngineConfig, LoggingConfig};
use peatnet_core::dice::{Dice, SeededDice};
use peatnet_core::{Engine, runner};
use peatnet_db::{PostgresConfig, PostgresPool, PostgresStore};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Config file looked up relative to the working directory.
const CONFIG_PATH: &str = "peatnet-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any startup step fails.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration. Logging is not up yet, so report afterwards.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        config_file = from_file,
        seed = ?config.world.seed,
        danger_interval_secs = config.dangers.interval_secs,
        "peatnet-engine starting"
    );

    // 3. Connect to PostgreSQL.
    let pg_config = PostgresConfig::from_infrastructure(&config.infrastructure);
    let pool = PostgresPool::connect(&pg_config).await?;
    pool.run_migrations().await?;

    // 4. Build the engine.
    let store = Arc::new(PostgresStore::new(&pool));
    let dice = SeededDice::from_seed(config.world.seed);
    let nats_url = config.infrastructure.nats_url.clone();
    let engine = Engine::new(
        store,
        Arc::new(SystemClock) as Arc<dyn Clock>,
        Arc::new(dice) as Arc<dyn Dice>,
        config,
    );

    // 5. Connect to NATS.
    info!(nats_url = %nats_url, "connecting to NATS");
    let client = async_nats::connect(nats_url.as_str())
        .await
        .map_err(|e| AppError::Nats {
            message: format!("failed to connect to NATS at {nats_url}: {e}"),
        })?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = vec![tokio::spawn(bridge::run_event_bridge(
        client.clone(),
        engine.subscribe(),
        shutdown_rx.clone(),
    ))];
    let inbox = tokio::spawn(inbox::serve(
        engine.clone(),
        client,
        shutdown_rx.clone(),
    ));

    // 6. Background loops.
    handles.extend(runner::spawn_loops(&engine, &shutdown_rx));
    info!("peatnet-engine running");

    // 7. Shutdown.
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    if shutdown_tx.send(true).is_err() {
        warn!("every task already stopped");
    }

    match inbox.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "operation inbox failed"),
        Err(err) => warn!(error = %err, "operation inbox task panicked"),
    }
    for handle in handles {
        if let Err(err) = handle.await {
            warn!(error = %err, "background task panicked");
        }
    }

    pool.close().await;
    info!("peatnet-engine shutdown complete");
    Ok(())
}

/// Load `peatnet-config.yaml`, or defaults when it does not exist.
///
/// Returns the config and whether it came from the file.
fn load_config() -> Result<(EngineConfig, bool), AppError> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        Ok((EngineConfig::from_file(path)?, true))
    } else {
        Ok((EngineConfig::parse("{}")?, false))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the config level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
