//! Pulsegate backend
//!
//! Carrier-billing payment gateway backend: discovers settled and failed
//! transactions, builds signed merchant callbacks and delivers them with
//! bounded retry, plus the operational HTTP surface (health probes and the
//! admin re-enqueue endpoint).

pub mod error;

#[cfg(feature = "database")]
pub mod api;
#[cfg(feature = "database")]
pub mod callbacks;
#[cfg(feature = "database")]
pub mod config;
#[cfg(feature = "database")]
pub mod database;
#[cfg(feature = "database")]
pub mod health;
#[cfg(feature = "database")]
pub mod logging;
#[cfg(feature = "database")]
pub mod middleware;
#[cfg(feature = "database")]
pub mod workers;
