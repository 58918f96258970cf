use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Reads the filter from `ATTENTION_LOG`, falling back to `default_level`.
pub fn log_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env("ATTENTION_LOG")
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a stderr fmt subscriber, keeping stdout free for report output.
///
/// Returns false if a global subscriber was already set.
pub fn init_tracing(default_level: &str) -> bool {
    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(log_filter(default_level))
        .with(stderr_layer)
        .try_init()
        .is_ok()
}
