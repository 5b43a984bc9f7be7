//! Process-wide `tracing` setup.
//!
//! Filters come from `LIFE_LOG` using the usual `EnvFilter` syntax, e.g.
//! `LIFE_LOG=game_of_life_rows::scatter=debug,info`. The default level is `info`.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub const FILTER_ENV: &str = "LIFE_LOG";

static INIT: Once = Once::new();

/// Installs the global subscriber. Later calls do nothing.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        // Another subscriber may already be installed (e.g. by a test harness).
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
