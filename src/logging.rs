use crate::app_dirs::AppDirs;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

/// Environment variable holding the log filter directives
pub const LOG_ENV: &str = "SOUNDSPAN_LOG";

/// Install a file-backed subscriber. The terminal belongs to the UI, so logs
/// go to the state directory. Returns the log file path on success.
pub fn init() -> std::io::Result<PathBuf> {
    let path = AppDirs::log_path().unwrap_or_else(|| PathBuf::from("soundspan.log"));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(filter)
        .try_init();

    Ok(path)
}
