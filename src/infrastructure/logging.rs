// Tracing subscriber setup
use crate::infrastructure::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Called once by `main` before any
/// panel starts; `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
