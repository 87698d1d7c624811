use crate::domain::{
    config::SerialMonConfig,
    error::{SerialMonError, SerialMonResult},
};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for the per-user configuration file
    pub fn new() -> SerialMonResult<Self> {
        Ok(Self {
            config_path: Self::default_config_path()?,
        })
    }

    /// Manager for an explicit configuration file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_config(&self) -> SerialMonResult<SerialMonConfig> {
        if self.config_path.exists() {
            self.load_config_from_path(&self.config_path)
        } else {
            Ok(SerialMonConfig::default())
        }
    }

    /// Save configuration, creating the parent directory if needed
    pub fn save_config(&self, config: &SerialMonConfig) -> SerialMonResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| SerialMonError::Config {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }
        self.save_config_to_path(&self.config_path, config)
    }

    /// Write a default configuration file; refuses to overwrite one
    pub fn init_config(&self) -> SerialMonResult<()> {
        if self.config_path.exists() {
            return Err(SerialMonError::Config {
                message: format!(
                    "Configuration already exists at {}",
                    self.config_path.display()
                ),
            });
        }
        self.save_config(&SerialMonConfig::default())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Log file used when the configuration names none
    pub fn default_log_path() -> SerialMonResult<PathBuf> {
        let cache = dirs::cache_dir().ok_or_else(|| SerialMonError::Config {
            message: "Could not determine cache directory".to_string(),
        })?;
        Ok(cache.join("serialmon").join("serial-monitor.log"))
    }

    fn default_config_path() -> SerialMonResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| SerialMonError::Config {
            message: "Could not determine home directory".to_string(),
        })?;
        Ok(home.join(".config").join("serialmon").join("config.toml"))
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> SerialMonResult<SerialMonConfig> {
        let content = fs::read_to_string(path).map_err(|e| SerialMonError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| SerialMonError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &SerialMonConfig) -> SerialMonResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| SerialMonError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| SerialMonError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }
}
