use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Install the process-wide `tracing` subscriber once.
///
/// `RUST_LOG` takes precedence over `default_level`. Later calls are no-ops,
/// as is a call made after some other subscriber was installed.
pub fn init_logging(default_level: &str) {
    LOGGER_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        let _ = fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_line_number(true)
            .try_init();

        tracing::info!(level = default_level, "logging initialized");
    });
}
