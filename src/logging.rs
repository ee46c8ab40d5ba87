//! `tracing` initialization: an `EnvFilter` driven by `RUST_LOG` (falling
//! back to `info`), with JSON or human-readable output selected by
//! [`crate::config::AppConfig::log_json`].

use tracing_subscriber::{fmt, EnvFilter};

pub fn init(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}
