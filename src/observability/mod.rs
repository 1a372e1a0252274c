// Tracing bootstrap

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber. Safe to call once per process;
/// later calls are ignored (tests may race to install it).
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    if config.json {
        let _ = fmt()
            .with_env_filter(filter)
            .json()
            .try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}
