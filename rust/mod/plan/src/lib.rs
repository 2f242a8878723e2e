pub mod api;
pub mod axis;
pub mod engine;
pub mod matcher;
pub mod model;
pub mod store;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use planwerk_core::Module;
use planwerk_sql::SQLStore;
use shop::store::ShopStore;

use engine::PlanEngine;
use store::PlanStore;
use worker::WorkerConfig;

/// Configuration for the plan module.
#[derive(Debug, Clone)]
pub struct PlanConfig {
    /// How long an unconfirmed reservation holds its machine (seconds).
    pub reservation_ttl_secs: i64,
    /// How often the watchdog sweeps for lapsed reservations (seconds).
    pub expiry_check_interval_secs: u64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: 900,
            expiry_check_interval_secs: 30,
        }
    }
}

/// Plan module — order intake, capability matching, and the shift scheduler.
///
/// Shares the shop module's machine store: reservations flip the same
/// machine rows the registry serves.
pub struct PlanModule {
    engine: Arc<PlanEngine>,
    _worker_cancel: tokio_util::sync::CancellationToken,
}

impl PlanModule {
    /// Create the plan module, initialise storage, and start the watchdog.
    pub fn new(
        db: Arc<dyn SQLStore>,
        machines: Arc<ShopStore>,
    ) -> Result<Self, planwerk_core::ServiceError> {
        Self::with_config(db, machines, PlanConfig::default())
    }

    /// Create with explicit configuration.
    pub fn with_config(
        db: Arc<dyn SQLStore>,
        machines: Arc<ShopStore>,
        config: PlanConfig,
    ) -> Result<Self, planwerk_core::ServiceError> {
        let store = Arc::new(PlanStore::new(db)?);
        let engine = Arc::new(PlanEngine::new(
            store,
            machines,
            config.reservation_ttl_secs,
        ));
        let cancel = worker::start(
            Arc::clone(&engine),
            WorkerConfig {
                expiry_check_interval: config.expiry_check_interval_secs,
            },
        );

        Ok(Self {
            engine,
            _worker_cancel: cancel,
        })
    }

    /// Get a reference to the engine.
    pub fn engine(&self) -> &Arc<PlanEngine> {
        &self.engine
    }
}

impl Module for PlanModule {
    fn name(&self) -> &str {
        "plan"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.engine))
    }
}
