use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` selects the levels, `info` when
/// unset. Calling it again is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
