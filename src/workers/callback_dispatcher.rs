use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::callbacks::engine::CallbackEngine;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CallbackDispatcherConfig {
    /// How often the discovery sweeps run.
    pub scan_interval: Duration,
}

impl Default for CallbackDispatcherConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(5),
        }
    }
}

impl CallbackDispatcherConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.scan_interval = Duration::from_secs(
            std::env::var("CALLBACK_SCAN_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.scan_interval.as_secs()),
        );
        cfg
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Periodically drives the discovery sweeps of the callback engine.
///
/// Each cycle is independent: a failed sweep is logged and retried on the
/// next tick, so a database outage delays notifications instead of killing
/// the worker.
pub struct CallbackDispatcherWorker {
    engine: Arc<CallbackEngine>,
    config: CallbackDispatcherConfig,
}

impl CallbackDispatcherWorker {
    pub fn new(engine: Arc<CallbackEngine>, config: CallbackDispatcherConfig) -> Self {
        Self { engine, config }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            "callback dispatcher worker started"
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("callback dispatcher worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.scan_interval) => {
                    self.run_cycle().await;
                }
            }
        }

        info!("callback dispatcher worker stopped");
    }

    async fn run_cycle(&self) {
        self.engine.purge_expired_guards();
        if let Err(e) = self.engine.run_success_sweep().await {
            error!(error = %e, "success callback sweep failed");
        }
        if let Err(e) = self.engine.run_failure_sweep().await {
            error!(error = %e, "failure callback sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cadence_is_five_seconds() {
        let cfg = CallbackDispatcherConfig::default();
        assert_eq!(cfg.scan_interval, Duration::from_secs(5));
    }
}
