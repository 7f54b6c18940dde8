use crate::error::{EngineError, EngineResult};
use crate::passage::DEFAULT_LANGUAGE;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_DURATION_SECS: u32 = 30;

/// Host preferences: what the next session starts with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub duration_secs: u32,
    pub language: String,
    pub tester: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_DURATION_SECS,
            language: DEFAULT_LANGUAGE.to_string(),
            tester: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> EngineResult<()> {
        if self.duration_secs == 0 {
            return Err(EngineError::InvalidDuration(self.duration_secs));
        }
        Ok(())
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> EngineResult<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "typetrial") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("typetrial_config.json")
        };
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
    /// Falls back to defaults when the file is missing, unreadable or invalid.
    fn load(&self) -> Config {
        let Ok(bytes) = fs::read(&self.path) else {
            return Config::default();
        };
        match serde_json::from_slice::<Config>(&bytes) {
            Ok(cfg) if cfg.validate().is_ok() => cfg,
            Ok(cfg) => {
                warn!(
                    path = %self.path.display(),
                    duration = cfg.duration_secs,
                    "invalid config, using defaults"
                );
                Config::default()
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    %err,
                    "unreadable config, using defaults"
                );
                Config::default()
            }
        }
    }

    fn save(&self, cfg: &Config) -> EngineResult<()> {
        cfg.validate()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
