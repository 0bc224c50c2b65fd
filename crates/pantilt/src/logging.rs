use crate::config::{LogConfig, LogFormat};

/// Install a stderr `tracing` subscriber. A second call is a no-op.
pub fn init_logging(config: &LogConfig) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(config.level.as_filter())
        .with_ansi(false)
        .with_target(config.with_target);

    match config.format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
