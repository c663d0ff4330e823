//! Logging setup.
//!
//! All modules log through `tracing`. Levels in use:
//! - ERROR: a run failed for a structural or configuration reason
//! - WARN: task failures, ignored progress-sink errors
//! - INFO: run and phase lifecycle
//! - DEBUG: scheduling decisions, agent process spawns
//!
//! Debug mode can be enabled with `--debug` or `PHASEFLOW_DEBUG=1`.
//! `RUST_LOG` overrides the default filter entirely. Output goes to stderr
//! so stdout stays free for plans and results.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Environment variable that turns on debug mode.
pub const DEBUG_ENV: &str = "PHASEFLOW_DEBUG";

fn env_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Default filter directive for the given mode.
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "phaseflow=debug"
    } else {
        "phaseflow=info"
    }
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed; the call is then
/// a no-op apart from recording debug mode.
pub fn init(debug: bool, json: bool) -> bool {
    let env_debug = std::env::var(DEBUG_ENV)
        .map(|v| env_flag(&v))
        .unwrap_or(false);
    let debug_enabled = debug || env_debug;
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug_enabled)));
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt.json())
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt)
            .try_init()
            .is_ok()
    }
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}
