use crate::{
    clock::{Clock, SystemClock},
    config::Config,
    services::{BatchService, CreditSelector, ExecutionRunner, JWTService, SchedulingService},
    store::{PostgresStore, RetirementStore},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database};
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RetirementStore>,
    pub clock: Arc<dyn Clock>,
    pub jwt_service: Arc<JWTService>,
    pub scheduling_service: Arc<SchedulingService>,
    pub batch_service: Arc<BatchService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        // Connect to database
        let mut options = ConnectOptions::new(config.database.url.clone());
        options
            .max_connections(config.database.max_connections)
            .connect_timeout(Duration::from_secs(config.database.connect_timeout_secs))
            .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
            .sqlx_logging(false);
        let db = Database::connect(options).await?;

        if config.database.run_migrations {
            Migrator::up(&db, None).await?;
            tracing::info!("Applied pending migrations");
        }

        let store: Arc<dyn RetirementStore> = Arc::new(PostgresStore::new(db));
        Ok(Self::with_store(config, store, Arc::new(SystemClock)))
    }

    /// Wire the services around an existing store and clock
    pub fn with_store(
        config: Config,
        store: Arc<dyn RetirementStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let jwt_service = Arc::new(JWTService::new(Arc::new(config.auth.clone())));
        let selector = Arc::new(CreditSelector::new(
            store.clone(),
            clock.clone(),
            config.scheduler.max_allocation_retries,
        ));
        let runner = Arc::new(ExecutionRunner::new(
            store.clone(),
            clock.clone(),
            selector,
        ));
        let scheduling_service = Arc::new(SchedulingService::new(
            store.clone(),
            clock.clone(),
            runner.clone(),
            &config.scheduler,
        ));
        let batch_service = Arc::new(BatchService::new(
            store.clone(),
            clock.clone(),
            runner,
            &config.batch,
        ));

        Self {
            store,
            clock,
            jwt_service,
            scheduling_service,
            batch_service,
            config: Arc::new(config),
        }
    }
}
