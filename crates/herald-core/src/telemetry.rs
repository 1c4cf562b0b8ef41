use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber for structured logging.
///
/// - Debug builds: pretty-printed human-readable output
/// - Release builds: JSON-formatted output for log aggregation
///
/// `HERALD_LOG_FORMAT=json|text` overrides the build default. The log level
/// is controlled by the `RUST_LOG` environment variable, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json(std::env::var("HERALD_LOG_FORMAT").ok().as_deref()) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

fn use_json(format: Option<&str>) -> bool {
    match format {
        Some("json") => true,
        Some("text") => false,
        _ => !cfg!(debug_assertions),
    }
}
