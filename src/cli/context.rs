//! Shared wiring for CLI commands.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::adapters::broker::HttpQueueBroker;
use crate::adapters::events::LogEventSink;
use crate::adapters::resolver::StaticVariableResolver;
use crate::adapters::sqlite::{
    all_embedded_migrations, create_pool, Migrator, PoolConfig, SqliteRunRepository,
};
use crate::domain::models::Config;
use crate::domain::ports::QueueBroker;
use crate::infrastructure::logging::SecretScrubber;
use crate::services::{AdmissionController, Dispatcher, QueueReconciler, RunService};

/// Fully wired application services for one CLI invocation.
pub struct AppContext {
    pub config: Config,
    pub runs: Arc<RunService>,
    pub dispatcher: Dispatcher,
    pub reconciler: QueueReconciler,
}

impl AppContext {
    /// Open the run store, apply migrations, and wire services against the
    /// configured HTTP broker.
    pub async fn init(config: Config, scrubber: &SecretScrubber) -> Result<Self> {
        let pool = create_pool(
            &config.database.path,
            Some(PoolConfig {
                max_connections: config.database.max_connections,
                ..Default::default()
            }),
        )
        .await
        .context("Failed to open run store")?;

        Migrator::new(pool.clone())
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .context("Failed to run migrations")?;

        // Config-declared secrets are redacted from any error output even if
        // a broker error echoes a payload fragment back.
        for specs in config.variables.values() {
            for spec in specs.iter().filter(|s| s.secret) {
                scrubber.register_secret(&spec.value);
            }
        }

        let repo = Arc::new(SqliteRunRepository::new(pool));
        let broker: Arc<dyn QueueBroker> = Arc::new(
            HttpQueueBroker::new(&config.broker)
                .map_err(|e| anyhow::anyhow!("Failed to build broker client: {e}"))?,
        );
        let events = Arc::new(LogEventSink);
        let runs = Arc::new(RunService::new(repo.clone(), events.clone()));

        let resolver = Arc::new(StaticVariableResolver::from_config(&config.variables));
        let admission =
            AdmissionController::new(broker.clone(), config.capacity.clone());
        let dispatcher = Dispatcher::new(resolver, admission, broker.clone(), runs.clone());
        let reconciler = QueueReconciler::new(
            repo,
            broker,
            events,
            config.reconciler.clone(),
        );

        Ok(Self {
            config,
            runs,
            dispatcher,
            reconciler,
        })
    }
}
