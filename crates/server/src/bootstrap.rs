use std::sync::Arc;

use thiserror::Error;
use tierbatch_core::batch::{JobOptions, RunStore, TierRecalculationJob};
use tierbatch_core::config::{AppConfig, ConfigError, LoadOptions};
use tierbatch_core::schedule::MonthlySchedule;
use tierbatch_db::{
    connect_with_config, migrations, DbPool, SqlBatchRunRepository, SqlCustomerRepository,
    SqlTierRepository,
};
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub schedule: MonthlySchedule,
    pub job: TierRecalculationJob,
    pub runs: Arc<dyn RunStore>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

#[cfg_attr(not(test), allow(dead_code))]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let schedule = config.monthly_schedule()?;

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let runs: Arc<dyn RunStore> = Arc::new(SqlBatchRunRepository::new(db_pool.clone()));
    let job = TierRecalculationJob::new(
        Arc::new(SqlCustomerRepository::new(db_pool.clone())),
        Arc::new(SqlTierRepository::new(db_pool.clone())),
        runs.clone(),
        JobOptions::from_config(&config.batch),
    );

    Ok(Application { config, db_pool, schedule, job, runs })
}
