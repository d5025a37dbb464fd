//! `tracing` subscriber setup.
//!
//! The engine only emits events through the `tracing` macros; embedding
//! containers call [`init_tracing`] once at startup (or install their own
//! subscriber). `RUST_LOG` directives take precedence over the configured level.

use tracing_subscriber::EnvFilter;

use crate::config::SharedConfig;

/// Install the global subscriber described by `shared`.
///
/// Subsequent calls are ignored, so tests may call it freely.
pub fn init_tracing(shared: &SharedConfig) {
    let filter = EnvFilter::builder()
        .with_default_directive(shared.log_level.as_tracing().into())
        .from_env_lossy();

    let result = if shared.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .compact()
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
