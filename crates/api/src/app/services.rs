//! Store wiring and background tasks.
//!
//! One `AppServices` value owns every store handle as a trait object, so
//! the handlers are identical whether the process runs on the in-memory
//! stores (dev, tests) or on Postgres (`DATABASE_URL` set).

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::info;

use walletcore_auth::SessionGateway;
use walletcore_infra::in_memory::{
    InMemoryLedgerStore, InMemoryPaymentRequestStore, InMemorySessionStore, InMemoryUserStore,
};
use walletcore_infra::postgres::{
    init_pool, PostgresLedgerStore, PostgresPaymentRequestStore, PostgresSessionStore,
    PostgresUserStore,
};
use walletcore_infra::{
    spawn_sweeper, LedgerStore, PaymentRequestStore, SessionResolver, SessionStore,
    TransferService, UserStore,
};

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// When set, all stores run on Postgres; otherwise in-memory.
    pub database_url: Option<String>,
    pub session_ttl_minutes: i64,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let session_ttl_minutes = std::env::var("SESSION_TTL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(walletcore_auth::session::DEFAULT_TTL_MINUTES);
        let sweep_secs = std::env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            session_ttl_minutes,
            sweep_interval: Duration::from_secs(sweep_secs),
        }
    }

    /// In-memory stores, short TTL, no env reads. Used by the test server.
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            database_url: None,
            session_ttl_minutes: 30,
            sweep_interval: Duration::from_secs(300),
        }
    }
}

pub struct AppServices {
    pub ledger: Arc<dyn LedgerStore>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub requests: Arc<dyn PaymentRequestStore>,
    pub transfers: TransferService,
    pub gateway: Arc<dyn SessionGateway>,
    pub session_ttl: ChronoDuration,
}

pub async fn build_services(config: &Config) -> AppServices {
    let (ledger, users, sessions, requests): (
        Arc<dyn LedgerStore>,
        Arc<dyn UserStore>,
        Arc<dyn SessionStore>,
        Arc<dyn PaymentRequestStore>,
    ) = match &config.database_url {
        Some(url) => {
            let pool = init_pool(url)
                .await
                .unwrap_or_else(|e| panic!("failed to connect to postgres: {e}"));
            info!("stores: postgres");
            (
                Arc::new(PostgresLedgerStore::new(pool.clone())),
                Arc::new(PostgresUserStore::new(pool.clone())),
                Arc::new(PostgresSessionStore::new(pool.clone())),
                Arc::new(PostgresPaymentRequestStore::new(pool)),
            )
        }
        None => {
            info!("stores: in-memory");
            (
                Arc::new(InMemoryLedgerStore::new()),
                Arc::new(InMemoryUserStore::new()),
                Arc::new(InMemorySessionStore::new()),
                Arc::new(InMemoryPaymentRequestStore::new()),
            )
        }
    };

    spawn_sweeper(sessions.clone(), requests.clone(), config.sweep_interval);

    let gateway: Arc<dyn SessionGateway> = Arc::new(SessionResolver::new(sessions.clone()));
    let transfers = TransferService::new(ledger.clone());

    AppServices {
        ledger,
        users,
        sessions,
        requests,
        transfers,
        gateway,
        session_ttl: ChronoDuration::minutes(config.session_ttl_minutes),
    }
}
