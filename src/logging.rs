use tracing_subscriber::EnvFilter;

/// Pick the filter directive: `RUST_LOG` when set, otherwise the configured one.
pub fn resolve_filter(env_value: Option<String>, configured: &str) -> EnvFilter {
    env_value
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_new(configured).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the global subscriber. Logs go to stderr so `replay` output on
/// stdout stays clean. Calling this twice is harmless.
pub fn init(configured_filter: &str) {
    let filter = resolve_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), configured_filter);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
