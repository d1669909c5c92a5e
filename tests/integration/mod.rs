// Integration tests

mod api_test;
mod concurrency_test;
mod faulty_store;
mod postgres_test;
mod store_failure_test;

use carbon_retire::{
    clock::ManualClock,
    config::{AuthConfig, BatchConfig, Config, DatabaseConfig, SchedulerConfig, ServerConfig},
    models::credit::Credit,
    store::{MemoryStore, RetirementStore},
    AppState,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use time::{macros::datetime, OffsetDateTime};
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration-secret-key-with-at-least-32-chars";

/// Fully wired application over the in-memory store and a manual clock
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub company_id: Uuid,
    pub user_id: Uuid,
}

impl TestApp {
    pub fn new() -> Self {
        Self::wrapped(test_config(), |store| store as Arc<dyn RetirementStore>)
    }

    /// Wire the services over `wrap(store)`; `self.store` stays the bare
    /// in-memory store so tests can inspect what actually landed.
    pub fn wrapped<F>(config: Config, wrap: F) -> Self
    where
        F: FnOnce(Arc<MemoryStore>) -> Arc<dyn RetirementStore>,
    {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(datetime!(2026-01-31 09:00 UTC)));
        let state = AppState::with_store(config, wrap(store.clone()), clock.clone());

        Self {
            state,
            store,
            clock,
            company_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        }
    }

    /// Add a credit for this app's company
    pub async fn fund(&self, purpose: &str, amount: i64) -> Credit {
        self.fund_company(self.company_id, purpose, amount, None).await
    }

    pub async fn fund_company(
        &self,
        company_id: Uuid,
        purpose: &str,
        amount: i64,
        expiry_date: Option<OffsetDateTime>,
    ) -> Credit {
        let credit = Credit {
            id: Uuid::new_v4(),
            company_id,
            purpose: purpose.to_string(),
            remaining_amount: Decimal::new(amount, 0),
            expiry_date,
            created_at: datetime!(2025-01-01 00:00 UTC),
        };
        self.store.insert_credit(&credit).await.unwrap();
        credit
    }

    pub async fn remaining(&self, credit_id: Uuid) -> Decimal {
        self.store
            .get_credit(credit_id)
            .await
            .unwrap()
            .unwrap()
            .remaining_amount
    }
}

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout_secs: 30,
        },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            connect_timeout_secs: 1,
            acquire_timeout_secs: 1,
            run_migrations: false,
        },
        auth: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_string(),
        },
        scheduler: SchedulerConfig {
            lock_timeout_ms: 200,
            ..SchedulerConfig::default()
        },
        batch: BatchConfig::default(),
    }
}

// Test setup helpers
pub async fn setup_test_environment() {
    // Load test environment variables
    dotenvy::from_filename(".env.test").ok();
}
