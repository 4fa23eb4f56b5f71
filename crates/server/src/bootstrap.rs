use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use goalrunner_agent::HttpGoalAgent;
use goalrunner_core::config::{AppConfig, ConfigError, LoadOptions};
use goalrunner_core::pipeline::GoalPipeline;
use goalrunner_db::{connect_with_settings, migrations, DbPool, SqlAccountStore};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub store: Arc<SqlAccountStore>,
    pub pipeline: Arc<GoalPipeline>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("agent http client construction failed: {0}")]
    AgentClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let store = Arc::new(SqlAccountStore::new(db_pool.clone()));
    let agent =
        Arc::new(HttpGoalAgent::from_config(&config.agent).map_err(BootstrapError::AgentClient)?);
    let pipeline = Arc::new(GoalPipeline::new(store.clone(), agent));
    info!(
        event_name = "system.bootstrap.pipeline_ready",
        agent_endpoint = %config.agent.endpoint_url,
        "goal pipeline assembled"
    );

    Ok(Application { config, db_pool, store, pipeline })
}
