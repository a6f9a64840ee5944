//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable holding the log filter directive
pub const LOG_ENV_VAR: &str = "MDECK_LOG";

const LOG_FILE_NAME: &str = "mdeck.log";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/mirror-deck/logs/`; stdout is left
/// untouched because headless mode writes NDJSON there.
/// Log level is controlled by the `MDECK_LOG` environment variable.
///
/// # Examples
/// ```bash
/// MDECK_LOG=debug mdeck watch
/// MDECK_LOG=mdeck_app=trace mdeck mirror R58M123
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);

    // Default to info for our crates, allow override via MDECK_LOG
    let env_filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| {
        EnvFilter::new("mirror_deck=info,mdeck_app=info,mdeck_daemon=info,warn")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Mirror Deck starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("mirror-deck").join("logs"))
}
