use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "soundspan";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// `$HOME/.local/state/soundspan`, or the platform data dir when HOME is unset
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join(APP_NAME),
            )
        } else {
            ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn ledger_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("ledger.db"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("soundspan.log"))
    }

    /// Result uploads waiting to be shipped
    pub fn outbox_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("outbox.jsonl"))
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_files_share_a_directory() {
        if let (Some(ledger), Some(log)) = (AppDirs::ledger_path(), AppDirs::log_path()) {
            assert_eq!(ledger.parent(), log.parent());
            assert!(ledger.ends_with("ledger.db"));
        }
    }
}
