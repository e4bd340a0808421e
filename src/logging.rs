//! Tracing subscriber setup for acceptance runs.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

/// Filter directives are read from this variable (`RUST_LOG` syntax).
pub const LOG_ENV: &str = "TF_ACC_LOG";
pub const DEFAULT_FILTER: &str = "warn";

static INIT: OnceLock<bool> = OnceLock::new();

fn filter_from(raw: Option<&str>) -> EnvFilter {
    raw.filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a fmt subscriber writing to the test writer.
///
/// Safe to call from every test; only the first call installs anything.
/// Returns whether this process ended up with our subscriber installed.
pub fn init() -> bool {
    *INIT.get_or_init(|| {
        let raw = std::env::var(LOG_ENV).ok();
        tracing_subscriber::fmt()
            .with_env_filter(filter_from(raw.as_deref()))
            .with_test_writer()
            .with_target(false)
            .try_init()
            .is_ok()
    })
}
