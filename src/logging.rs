//! Structured logging setup.
//!
//! `RUST_LOG` takes precedence over the configured level. Initialization is
//! idempotent: if a global subscriber already exists it is left in place.

use std::sync::OnceLock;

use serde::Deserialize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, for terminals.
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

/// Installs the global `tracing` subscriber.
pub fn init(log_level: &str, format: LogFormat) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = build_filter(log_level);
        let registry = tracing_subscriber::registry().with(filter);

        let result = match format {
            LogFormat::Pretty => registry
                .with(fmt::layer().with_target(true).with_level(true))
                .try_init(),
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_target(true)
                        .with_current_span(false),
                )
                .try_init(),
        };

        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - keeping it");
        }

        tracing::info!(level = %log_level, format = ?format, "[LOGGING] Initialized");
    });
}

/// `RUST_LOG` if set and valid, else the configured level, else `info`.
fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init("debug", LogFormat::Pretty);
        init("warn", LogFormat::Json);
        assert!(LOGGER_INITIALIZED.get().is_some());
    }

    #[test]
    fn log_format_deserializes_snake_case() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
    }
}
