//! Merchant callback delivery engine.
//!
//! Transactions reach their terminal states asynchronously (carrier DRs,
//! provider webhooks, polling); this module owns everything needed to tell the
//! merchant about it afterwards: discovery of notifiable transactions, duplicate
//! suppression while a delivery is in flight, wire payload construction, body
//! signing, bounded queueing and the HTTP delivery itself.

pub mod dedup;
pub mod delivery;
pub mod engine;
pub mod payload;
pub mod queue;
pub mod signing;
pub mod status;
pub mod store;
pub mod types;

pub use dedup::InFlightGuard;
pub use delivery::{CallbackHttpClient, DeliveryError, DeliveryReceipt};
pub use engine::{CallbackEngine, EngineError, SweepStats};
pub use payload::{build_failure_payload, build_success_payload, SchemaVariant, WireFormat};
pub use queue::{DeliveryQueue, EnqueueError};
pub use signing::{sign_body, verify_body_signature};
pub use status::TransactionStatus;
pub use store::{MerchantDirectory, StoreError, TransactionStore};
pub use types::{CallbackKind, DeliveryJob, MerchantApp, MerchantProfile, Transaction};
