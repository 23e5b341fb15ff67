//! `tracing` initialization, shared by the binary and integration
//! tests — exactly the teacher's `services/server/src/main.rs` pattern:
//! an env var picks the level, and only the binary installs a
//! subscriber; every library crate just emits events.

use tracing_subscriber::EnvFilter;

const LOG_LEVEL_VAR: &str = "ICINGA2_LOG";

/// Installs the global subscriber. Safe to call more than once per
/// process (e.g. from multiple integration test binaries) — later
/// calls are ignored.
pub fn init() {
    let filter = std::env::var(LOG_LEVEL_VAR).unwrap_or_else(|_| "info".to_owned());
    let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter)).try_init();
}
