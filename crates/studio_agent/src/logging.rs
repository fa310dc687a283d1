use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "STUDIO_AGENT_LOG";
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Installs a stderr subscriber filtered by `STUDIO_AGENT_LOG`.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
