//! Discovery sweeps and job admission.
//!
//! The engine owns the path from a durable transaction row to an in-memory
//! [`DeliveryJob`]: sweep, guard acquisition, merchant lookup, payload
//! build, enqueue. A storage error on the sweep query aborts that sweep
//! (the next cycle retries); a per-row problem drops that row with a log
//! and releases its guard so a later sweep can pick it up again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::callbacks::dedup::InFlightGuard;
use crate::callbacks::payload::{
    build_failure_payload, build_success_payload, PayloadError, WireFormat,
};
use crate::callbacks::queue::{DeliveryQueue, EnqueueError};
use crate::callbacks::store::{MerchantDirectory, StoreError, TransactionStore};
use crate::callbacks::types::{CallbackKind, DeliveryJob, MerchantProfile, Transaction};
use crate::logging::mask_msisdn;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("transaction {transaction_id} not found")]
    TransactionNotFound { transaction_id: String },
    #[error("transaction {transaction_id} with status {status_code} is not eligible for re-delivery")]
    NotRedeliverable {
        transaction_id: String,
        status_code: i32,
    },
    #[error("a delivery for transaction {transaction_id} is already in flight")]
    AlreadyInFlight { transaction_id: String },
    #[error("no merchant registered for app key {app_key} / app id {app_id}")]
    UnknownMerchant { app_key: String, app_id: String },
    #[error("no callback url configured for app {app_id}")]
    MissingCallbackUrl { app_id: String },
    #[error("delivery queue is full")]
    QueueFull,
    #[error("delivery queue is closed")]
    QueueClosed,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Counters returned by one sweep invocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub enqueued: usize,
}

/// Discovery and admission engine shared by the dispatcher and the admin
/// surface.
pub struct CallbackEngine {
    store: Arc<dyn TransactionStore>,
    merchants: Arc<dyn MerchantDirectory>,
    guard: Arc<InFlightGuard>,
    success_queue: DeliveryQueue,
    failure_queue: DeliveryQueue,
    failure_window: Duration,
}

impl CallbackEngine {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        merchants: Arc<dyn MerchantDirectory>,
        guard: Arc<InFlightGuard>,
        success_queue: DeliveryQueue,
        failure_queue: DeliveryQueue,
        failure_window: Duration,
    ) -> Self {
        CallbackEngine {
            store,
            merchants,
            guard,
            success_queue,
            failure_queue,
            failure_window,
        }
    }

    /// Find confirmed transactions still owed a success callback and enqueue
    /// one job each.
    pub async fn run_success_sweep(&self) -> Result<SweepStats, EngineError> {
        let transactions = self.store.find_awaiting_success_callback().await?;
        self.enqueue_all(transactions, CallbackKind::Success).await
    }

    /// Find recently failed transactions whose merchant opted into failure
    /// notifications and enqueue one job each.
    pub async fn run_failure_sweep(&self) -> Result<SweepStats, EngineError> {
        let transactions = self
            .store
            .find_awaiting_failure_callback(self.failure_window)
            .await?;
        self.enqueue_all(transactions, CallbackKind::Failure).await
    }

    async fn enqueue_all(
        &self,
        transactions: Vec<Transaction>,
        kind: CallbackKind,
    ) -> Result<SweepStats, EngineError> {
        let mut stats = SweepStats {
            scanned: transactions.len(),
            ..SweepStats::default()
        };
        for transaction in &transactions {
            if self.enqueue_discovered(transaction, kind).await? {
                stats.enqueued += 1;
            }
        }
        if stats.enqueued > 0 {
            info!(
                callback = kind.as_str(),
                scanned = stats.scanned,
                enqueued = stats.enqueued,
                "enqueued merchant callbacks"
            );
        }
        Ok(stats)
    }

    /// Admit one discovered transaction. Returns Ok(false) when the row is
    /// skipped; only a closed queue is fatal to the whole sweep.
    async fn enqueue_discovered(
        &self,
        transaction: &Transaction,
        kind: CallbackKind,
    ) -> Result<bool, EngineError> {
        if !self.guard.try_acquire(&transaction.id) {
            return Ok(false);
        }

        let profile = match self.lookup_profile(transaction).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(
                    transaction_id = %transaction.id,
                    callback = kind.as_str(),
                    error = %err,
                    "dropping discovered callback"
                );
                self.guard.release(&transaction.id);
                return Ok(false);
            }
        };

        // The failure sweep query already joins on the opt-in flag, but a
        // fake or stale directory snapshot may disagree with the row.
        if kind == CallbackKind::Failure && !profile.fail_callback {
            self.guard.release(&transaction.id);
            return Ok(false);
        }

        let job = match self.prepare_job(transaction, &profile, kind) {
            Ok(job) => job,
            Err(err) => {
                warn!(
                    transaction_id = %transaction.id,
                    callback = kind.as_str(),
                    error = %err,
                    "dropping discovered callback"
                );
                self.guard.release(&transaction.id);
                return Ok(false);
            }
        };

        match self.queue_for(kind).push(job).await {
            Ok(()) => {
                debug!(
                    transaction_id = %transaction.id,
                    callback = kind.as_str(),
                    subscriber = %mask_msisdn(&transaction.user_mdn),
                    "queued merchant callback"
                );
                Ok(true)
            }
            // A waiting push only fails when the consumer side is gone.
            Err(_) => {
                self.guard.release(&transaction.id);
                Err(EngineError::QueueClosed)
            }
        }
    }

    /// Operator-driven re-delivery of the success callback.
    ///
    /// Unlike discovery this is explicit about why it refused: the admin
    /// surface maps each variant to an HTTP status. The callback always
    /// carries the completed status code, whether or not the original
    /// delivery ever happened.
    pub async fn requeue_transaction(&self, transaction_id: &str) -> Result<(), EngineError> {
        let transaction = self
            .store
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| EngineError::TransactionNotFound {
                transaction_id: transaction_id.to_string(),
            })?;

        let redeliverable = transaction
            .status()
            .map(|status| status.is_redeliverable())
            .unwrap_or(false);
        if !redeliverable {
            return Err(EngineError::NotRedeliverable {
                transaction_id: transaction.id.clone(),
                status_code: transaction.status_code,
            });
        }

        let profile = self.lookup_profile(&transaction).await?;

        if !self.guard.try_acquire(&transaction.id) {
            return Err(EngineError::AlreadyInFlight {
                transaction_id: transaction.id.clone(),
            });
        }

        let job = match self.prepare_job(&transaction, &profile, CallbackKind::Success) {
            Ok(job) => job,
            Err(err) => {
                self.guard.release(&transaction.id);
                return Err(err);
            }
        };

        match self.success_queue.try_push(job) {
            Ok(()) => {
                info!(transaction_id, "re-enqueued success callback");
                Ok(())
            }
            Err(EnqueueError::Full) => {
                self.guard.release(&transaction.id);
                Err(EngineError::QueueFull)
            }
            Err(EnqueueError::Closed) => {
                self.guard.release(&transaction.id);
                Err(EngineError::QueueClosed)
            }
        }
    }

    /// Evict expired guard entries. Called once per dispatcher cycle.
    pub fn purge_expired_guards(&self) {
        let purged = self.guard.purge_expired();
        if purged > 0 {
            debug!(purged, "evicted expired in-flight guard entries");
        }
    }

    async fn lookup_profile(
        &self,
        transaction: &Transaction,
    ) -> Result<MerchantProfile, EngineError> {
        self.merchants
            .find_by_app(&transaction.app_key, &transaction.app_id)
            .await?
            .ok_or_else(|| EngineError::UnknownMerchant {
                app_key: transaction.app_key.clone(),
                app_id: transaction.app_id.clone(),
            })
    }

    fn prepare_job(
        &self,
        transaction: &Transaction,
        profile: &MerchantProfile,
        kind: CallbackKind,
    ) -> Result<DeliveryJob, EngineError> {
        let url = profile.resolve_callback_url(transaction).ok_or_else(|| {
            EngineError::MissingCallbackUrl {
                app_id: transaction.app_id.clone(),
            }
        })?;
        let format = WireFormat::resolve(profile);
        let built = match kind {
            CallbackKind::Success => build_success_payload(transaction, &format, Utc::now())?,
            CallbackKind::Failure => build_failure_payload(transaction, &format, Utc::now())?,
        };
        Ok(DeliveryJob {
            correlation_id: Uuid::new_v4(),
            transaction_id: transaction.id.clone(),
            url,
            secret: profile.secret.clone(),
            body: built.body,
            notify_status: built.notify_status,
            kind,
            attempt: 1,
        })
    }

    fn queue_for(&self, kind: CallbackKind) -> &DeliveryQueue {
        match kind {
            CallbackKind::Success => &self.success_queue,
            CallbackKind::Failure => &self.failure_queue,
        }
    }
}
