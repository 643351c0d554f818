use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// Install the compact fmt subscriber. Diagnostics for conflicting spans,
/// malformed traces and data-quality findings are emitted as `warn!` events
/// and land here. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .compact()
        .try_init();
}
