use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::engine::PlanEngine;

/// Configuration for the background reservation watchdog.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to sweep for lapsed reservations (seconds).
    pub expiry_check_interval: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            expiry_check_interval: 30,
        }
    }
}

/// Start the background reservation-expiry watchdog.
///
/// A caller that reserves a machine and never confirms would otherwise
/// leave it RESERVED forever; the watchdog marks lapsed reservations
/// EXPIRED and returns their machines to FREE.
///
/// Returns a CancellationToken that stops the worker when cancelled.
pub fn start(engine: Arc<PlanEngine>, config: WorkerConfig) -> CancellationToken {
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        let interval = Duration::from_secs(config.expiry_check_interval.max(1));

        tokio::spawn(async move {
            info!("reservation expiry watchdog started (interval={interval:?})");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("reservation expiry watchdog stopped");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        debug!("expiry watchdog scan");
                        match engine.expire_reservations() {
                            Ok(0) => {}
                            Ok(n) => info!("expiry watchdog: expired {n} reservations"),
                            Err(e) => error!("expiry watchdog error: {e}"),
                        }
                    }
                }
            }
        });
    }

    cancel
}
