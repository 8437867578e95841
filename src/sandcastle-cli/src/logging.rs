//! Logging setup.
//!
//! Diagnostics go to stderr through `tracing`; stdout belongs to the
//! supervised command. `RUST_LOG` takes precedence over the debug flag.

use tracing_subscriber::EnvFilter;

/// Environment flag enabling debug logging. Set by `--debug` so an external
/// enforcer inherits it.
pub const DEBUG_ENV: &str = "SANDCASTLE_DEBUG";

const DEBUG_FILTER: &str = "sandcastle_cli=debug,sandcastle_sandbox=debug,sandcastle_config=debug";
const DEFAULT_FILTER: &str = "warn";

/// Whether [`DEBUG_ENV`] holds a truthy value (`1`, `true`, `yes`, `on`).
pub fn debug_env_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Filter directive used when `RUST_LOG` is not set.
pub fn filter_directive(debug: bool) -> &'static str {
    if debug { DEBUG_FILTER } else { DEFAULT_FILTER }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(debug)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
