use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::callbacks::dedup::InFlightGuard;
use crate::callbacks::delivery::CallbackHttpClient;
use crate::callbacks::queue::DeliveryQueue;
use crate::callbacks::status::TransactionStatus;
use crate::callbacks::store::TransactionStore;
use crate::callbacks::types::{CallbackKind, DeliveryJob};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DeliveryPoolConfig {
    /// Concurrent delivery workers per queue.
    pub workers: usize,
    /// Total attempts per job, the first try included.
    pub max_attempts: u32,
    /// Fixed delay before a failed job re-enters its queue. Long on purpose:
    /// merchant DR receivers are polled integrations, not real-time ones.
    pub retry_delay: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Response body read cap in bytes.
    pub max_response_bytes: usize,
}

impl Default for DeliveryPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 5,
            retry_delay: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            max_response_bytes: 64 * 1024,
        }
    }
}

impl DeliveryPoolConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.workers = std::env::var("CALLBACK_DELIVERY_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(cfg.workers);
        cfg.max_attempts = std::env::var("CALLBACK_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(cfg.max_attempts);
        cfg.retry_delay = Duration::from_secs(
            std::env::var("CALLBACK_RETRY_DELAY_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.retry_delay.as_secs()),
        );
        cfg.request_timeout = Duration::from_secs(
            std::env::var("CALLBACK_HTTP_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.request_timeout.as_secs()),
        );
        cfg.max_response_bytes = std::env::var("CALLBACK_MAX_RESPONSE_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(cfg.max_response_bytes);
        cfg
    }
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// Bounded pool of delivery workers draining one queue.
///
/// Workers share the single consumer side of the queue through a mutex, so
/// in-flight HTTP calls never exceed the pool size. A failed attempt with
/// tries remaining is handed to a detached timer that re-enqueues the job
/// after the back-off delay, freeing the worker slot immediately.
#[derive(Clone)]
pub struct DeliveryWorkerPool {
    config: DeliveryPoolConfig,
    http: CallbackHttpClient,
    store: Arc<dyn TransactionStore>,
    guard: Arc<InFlightGuard>,
    queue: DeliveryQueue,
    receiver: Arc<Mutex<mpsc::Receiver<DeliveryJob>>>,
}

impl DeliveryWorkerPool {
    pub fn new(
        config: DeliveryPoolConfig,
        http: CallbackHttpClient,
        store: Arc<dyn TransactionStore>,
        guard: Arc<InFlightGuard>,
        queue: DeliveryQueue,
        receiver: mpsc::Receiver<DeliveryJob>,
    ) -> Self {
        Self {
            config,
            http,
            store,
            guard,
            queue,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    fn kind(&self) -> CallbackKind {
        self.queue.kind()
    }

    pub async fn run(self, shutdown_rx: watch::Receiver<bool>) {
        let workers = self.config.workers.max(1);
        info!(
            callback = self.kind().as_str(),
            workers,
            max_attempts = self.config.max_attempts,
            retry_delay_secs = self.config.retry_delay.as_secs(),
            "callback delivery pool started"
        );

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let worker = self.clone();
            let shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                worker.worker_loop(worker_id, shutdown).await;
            }));
        }
        futures::future::join_all(handles).await;

        info!(callback = self.kind().as_str(), "callback delivery pool stopped");
    }

    async fn worker_loop(&self, worker_id: usize, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            let job = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
                job = self.next_job() => match job {
                    Some(job) => job,
                    // All producer handles dropped.
                    None => break,
                },
            };
            self.process(job).await;
        }
        debug!(
            callback = self.kind().as_str(),
            worker_id, "delivery worker exited"
        );
    }

    async fn next_job(&self) -> Option<DeliveryJob> {
        self.receiver.lock().await.recv().await
    }

    async fn process(&self, job: DeliveryJob) {
        match self.http.deliver(&job).await {
            Ok(receipt) => {
                info!(
                    callback = self.kind().as_str(),
                    transaction_id = %job.transaction_id,
                    correlation_id = %job.correlation_id,
                    attempt = job.attempt,
                    result = %receipt.merchant_result,
                    "merchant acknowledged callback"
                );
                if let Err(err) = self
                    .store
                    .record_callback_outcome(
                        &job.transaction_id,
                        job.notify_status,
                        Some(receipt.acked_at),
                        &receipt.merchant_result,
                    )
                    .await
                {
                    error!(
                        transaction_id = %job.transaction_id,
                        error = %err,
                        "failed to record callback acknowledgement"
                    );
                }
                self.guard.release(&job.transaction_id);
            }
            Err(err) => {
                warn!(
                    callback = self.kind().as_str(),
                    transaction_id = %job.transaction_id,
                    correlation_id = %job.correlation_id,
                    attempt = job.attempt,
                    max_attempts = self.config.max_attempts,
                    error = %err,
                    "callback delivery attempt failed"
                );
                if job.attempt >= self.config.max_attempts {
                    self.record_exhausted(&job).await;
                    self.guard.release(&job.transaction_id);
                } else {
                    self.schedule_retry(job);
                }
            }
        }
    }

    /// Terminal failure write after the last attempt. The success path
    /// resets the transaction to its awaiting state so an operator can
    /// re-deliver later; the failure path keeps the transaction's own
    /// status. Either way the result column becomes the `failed` sentinel,
    /// which takes the row out of discovery.
    async fn record_exhausted(&self, job: &DeliveryJob) {
        error!(
            callback = self.kind().as_str(),
            transaction_id = %job.transaction_id,
            correlation_id = %job.correlation_id,
            attempts = job.attempt,
            "callback delivery exhausted all attempts"
        );
        let status = exhausted_status(job.kind, job.notify_status);
        if let Err(err) = self
            .store
            .record_callback_outcome(&job.transaction_id, status, None, "failed")
            .await
        {
            error!(
                transaction_id = %job.transaction_id,
                error = %err,
                "failed to record exhausted callback"
            );
        }
    }

    /// Hand the job to a detached timer that re-enqueues it after the
    /// back-off delay. The guard entry stays held so discovery cannot
    /// double-enqueue the transaction while the timer runs.
    fn schedule_retry(&self, mut job: DeliveryJob) {
        job.attempt += 1;
        let queue = self.queue.clone();
        let guard = Arc::clone(&self.guard);
        let delay = self.config.retry_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let transaction_id = job.transaction_id.clone();
            if let Err(err) = queue.push(job).await {
                warn!(
                    transaction_id = %transaction_id,
                    error = %err,
                    "dropping callback retry"
                );
                guard.release(&transaction_id);
            }
        });
    }
}

/// Status code written when a job runs out of attempts.
fn exhausted_status(kind: CallbackKind, notify_status: TransactionStatus) -> TransactionStatus {
    match kind {
        CallbackKind::Success => TransactionStatus::AwaitingNotification,
        CallbackKind::Failure => notify_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_success_returns_to_awaiting_state() {
        assert_eq!(
            exhausted_status(CallbackKind::Success, TransactionStatus::Completed),
            TransactionStatus::AwaitingNotification
        );
    }

    #[test]
    fn exhausted_failure_keeps_the_notified_status() {
        assert_eq!(
            exhausted_status(CallbackKind::Failure, TransactionStatus::Failed),
            TransactionStatus::Failed
        );
        assert_eq!(
            exhausted_status(CallbackKind::Failure, TransactionStatus::Created),
            TransactionStatus::Created
        );
    }

    #[test]
    fn default_pool_matches_the_retry_contract() {
        let cfg = DeliveryPoolConfig::default();
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.retry_delay, Duration::from_secs(300));
        assert!(cfg.workers >= 1);
    }
}
