//! Structured logging setup. Console output with an `EnvFilter`, plus an
//! optional JSON layer for log shippers when `ADUANA_LOG_JSON` is set.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process. Safe to call from every
/// entry point; later calls are no-ops, and an already-installed global
/// subscriber (e.g. from a test harness) is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("aduana_core=info,sqlx=warn"));

        let json_output = std::env::var("ADUANA_LOG_JSON").is_ok();

        let result = if json_output {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(true))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true))
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("global tracing subscriber already installed, keeping it");
        }
    });
}
