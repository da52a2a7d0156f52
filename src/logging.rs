// 📜 Logging - tracing subscriber for the CLI

use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Per-module log levels, e.g. `ROSTER_LOG=roster_reconcile::enrichment=debug`
pub const LOG_ENV: &str = "ROSTER_LOG";

pub const DEFAULT_FILTER: &str = "roster_reconcile=info";

/// Install the global subscriber (stderr, so stdout stays the run report).
/// Safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    });
}
