use std::sync::Once;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "RTJIT_LOG";

static INIT: Once = Once::new();

/// Install the global fmt subscriber. Safe to call more than once.
pub fn init_logging() {
    init_with_default("warn");
}

/// Install the global subscriber with `default` as the filter when
/// `RTJIT_LOG` is unset.
pub fn init_with_default(default: &str) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
