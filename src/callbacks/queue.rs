//! Bounded delivery queues.
//!
//! One queue per outcome kind sits between discovery and the worker pools.
//! Capacity is deliberately small: once a queue fills, `push` suspends the
//! sweep instead of buffering without limit, so a slow merchant backlog
//! slows discovery down rather than growing memory. FIFO order holds from
//! push to pop; workers run concurrently, so completion order does not.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::callbacks::types::{CallbackKind, DeliveryJob};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("delivery queue is full")]
    Full,
    #[error("delivery queue is closed")]
    Closed,
}

/// Producer handle for one delivery queue. Cheap to clone.
#[derive(Clone)]
pub struct DeliveryQueue {
    kind: CallbackKind,
    sender: mpsc::Sender<DeliveryJob>,
}

impl DeliveryQueue {
    /// Create a queue and the single consumer side the worker pool owns.
    pub fn bounded(kind: CallbackKind, capacity: usize) -> (Self, mpsc::Receiver<DeliveryJob>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (DeliveryQueue { kind, sender }, receiver)
    }

    pub fn kind(&self) -> CallbackKind {
        self.kind
    }

    /// Enqueue a job, waiting while the queue is at capacity.
    pub async fn push(&self, job: DeliveryJob) -> Result<(), EnqueueError> {
        self.sender.send(job).await.map_err(|_| EnqueueError::Closed)
    }

    /// Enqueue without waiting. Used by paths that must not stall on a full
    /// queue, like the admin re-enqueue endpoint.
    pub fn try_push(&self, job: DeliveryJob) -> Result<(), EnqueueError> {
        self.sender.try_send(job).map_err(|err| match err {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}
