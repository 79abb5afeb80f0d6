use crate::app_dirs::AppDirs;
use crate::ledger::AlertPolicy;
use crate::trial_clock::TrialTiming;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub timing: TrialTiming,
    pub alert: AlertPolicy,
    /// Account id attached to result uploads. Uploads are queued only when set.
    pub user_id: Option<i64>,
    /// Label attached to result uploads
    pub difficulty: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timing: TrialTiming::default(),
            alert: AlertPolicy::default(),
            user_id: None,
            difficulty: "medium".to_string(),
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("soundspan_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    /// Missing or unreadable files fall back to defaults
    fn load(&self) -> Config {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return Config::default(),
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring malformed config");
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
