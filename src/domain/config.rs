use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;

/// Standard baud rates offered when cycling through rates
pub const BAUD_RATES: [u32; 15] = [
    300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 74880, 115200, 230400, 250000, 500000,
    1000000, 2000000,
];

/// serialmon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SerialMonConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
    /// Serial monitor configuration
    #[serde(default)]
    pub monitor: MonitorSettings,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Settings consulted by the serial monitor session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorSettings {
    /// Skip the test write issued right after the port opens
    #[serde(default)]
    pub disable_testing_open: bool,
    /// OS error codes tolerated during the test write
    #[serde(default = "default_benign_write_error_codes")]
    pub benign_write_error_codes: Vec<i32>,
    /// Baud rate used when none is given
    #[serde(default = "default_baud_rate")]
    pub default_baud_rate: u32,
    /// Port used when none is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_port: Option<String>,
    /// Session log file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_benign_write_error_codes() -> Vec<i32> {
    // Windows ERROR_SEM_TIMEOUT, reported by some USB CDC drivers on the first write
    vec![121]
}

fn default_baud_rate() -> u32 {
    115200
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            disable_testing_open: false,
            benign_write_error_codes: default_benign_write_error_codes(),
            default_baud_rate: default_baud_rate(),
            default_port: None,
            log_file: None,
        }
    }
}

impl MonitorSettings {
    /// Whether an OS error code observed on the test write counts as success
    pub fn is_benign_write_error(&self, os_code: Option<i32>) -> bool {
        os_code.is_some_and(|code| self.benign_write_error_codes.contains(&code))
    }
}

/// Source of monitor settings, read each time a port is opened
pub trait SettingsSource: Send + Sync {
    fn monitor_settings(&self) -> MonitorSettings;
}

impl SettingsSource for MonitorSettings {
    fn monitor_settings(&self) -> MonitorSettings {
        self.clone()
    }
}

impl SettingsSource for RwLock<MonitorSettings> {
    fn monitor_settings(&self) -> MonitorSettings {
        match self.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Next entry of [`BAUD_RATES`] after `current`, wrapping around.
pub fn next_baud_rate(current: u32) -> u32 {
    BAUD_RATES
        .iter()
        .copied()
        .find(|rate| *rate > current)
        .unwrap_or(BAUD_RATES[0])
}
