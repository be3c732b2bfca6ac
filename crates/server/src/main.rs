mod bootstrap;
mod health;
mod scheduler;

use std::time::Duration;

use anyhow::Result;
use tierbatch_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;

use crate::health::HealthState;
use crate::scheduler::Scheduler;

fn init_logging(config: &AppConfig) {
    use tierbatch_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        HealthState::new(app.db_pool.clone(), app.runs.clone()),
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(app.job.clone(), app.schedule);
    let scheduler_task = if app.config.schedule.enabled {
        Some(scheduler.clone().spawn(shutdown_rx))
    } else {
        tracing::info!(
            event_name = "scheduler.disabled",
            correlation_id = "bootstrap",
            "schedule.enabled is false; runs start only from the CLI"
        );
        None
    };

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "tierbatch-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "tierbatch-server stopping"
    );

    let _ = shutdown_tx.send(true);
    if let Some(task) = scheduler_task {
        let _ = task.await;
    }

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, scheduler.wait_idle()).await.is_err() {
        tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "active run did not finish within the shutdown grace period"
        );
    }

    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
