//! Tracing initialisation: env-filter level, JSON toggle, optional log
//! file.

use std::fs::OpenOptions;
use std::sync::Arc;

use opine_core::config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Initialise the global subscriber from configuration.
///
/// # Errors
///
/// Returns an I/O error when the configured log file cannot be opened.
pub fn init(config: &LogConfig) -> std::io::Result<()> {
    let filter = EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=warn"));

    match &config.file {
        Some(path) => {
            let file = Arc::new(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?,
            );
            if config.json {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(file)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(file)
                    .with_ansi(false)
                    .init();
            }
        },
        None => {
            if config.json {
                tracing_subscriber::fmt().json().with_env_filter(filter).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(filter).init();
            }
        },
    }
    Ok(())
}
