use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sets up the global `tracing` subscriber, reading the level filter from `RUST_LOG` and falling
/// back to `info`.  Calling it again after a subscriber is in place does nothing.
pub fn trace_init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_ok()
    {
        tracing::trace!("Loading emoji facility.");
    }
}
