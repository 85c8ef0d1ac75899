//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events; binaries and tests decide where
//! they go by calling [`init_tracing`] once at startup.

use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber filtered by `RUST_LOG` (default
/// `info`). With `json` set, events are written as JSON lines.
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
