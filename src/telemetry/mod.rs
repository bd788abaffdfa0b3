//! Telemetry
//!
//! Tracing subscriber setup. Debug builds get human-readable text output;
//! otherwise log lines are structured JSON. The filter comes from RUST_LOG
//! when set, else the service default.

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::Settings;

/// Initialize the global tracing subscriber. Call once at startup.
pub fn init_tracing(settings: &Settings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if settings.debug { "debug" } else { "info" }));

    if settings.debug {
        Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }

    info!(
        service = %settings.app_name,
        provider = %settings.llm_provider,
        "telemetry initialized"
    );
}
