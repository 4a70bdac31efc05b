//! Tracing initialisation and log hygiene helpers
//!
//! Output format follows `LoggingConfig`: JSON lines when `LOG_FORMAT=json`
//! (the deployment default), human-readable otherwise. `RUST_LOG` overrides
//! the configured level when set.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Initialise the global tracing subscriber
///
/// Must be called once, before any log line is emitted.
pub fn init_tracing() {
    let config = LoggingConfig::from_env().unwrap_or_else(|_| LoggingConfig {
        level: "INFO".to_string(),
        format: LogFormat::Plain,
        enable_tracing: false,
    });

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let span_events = if config.enable_tracing {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_events(span_events),
                )
                .init();
        }
        LogFormat::Plain => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(true).with_span_events(span_events))
                .init();
        }
    }
}

/// Mask an MSISDN for logging, keeping the operator prefix and the last two
/// digits. MSISDNs are subscriber PII and must never appear in full in logs.
pub fn mask_msisdn(msisdn: &str) -> String {
    let digits: Vec<char> = msisdn.chars().collect();
    if digits.len() <= 6 {
        return "*".repeat(digits.len());
    }

    let mut masked = String::with_capacity(digits.len());
    masked.extend(&digits[..4]);
    masked.extend(std::iter::repeat('*').take(digits.len() - 6));
    masked.extend(&digits[digits.len() - 2..]);
    masked
}
