use tierbatch_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Installs a stderr subscriber so stdout carries only the JSON command result.
/// Safe to call more than once; later calls are ignored.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
