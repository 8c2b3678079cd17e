use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "skateback".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Discovery
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,

    // Advanced BLE Settings
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
    #[serde(default = "default_control_char_uuid")]
    pub ble_control_char_uuid: String,

    // Stop gesture
    #[serde(default = "default_stop_press_window_ms")]
    pub stop_press_window_ms: u64,

    // Actuation bridge
    #[serde(default = "default_actuation_addr")]
    pub actuation_addr: String,
    #[serde(default = "default_bridge_backoff_ms")]
    pub bridge_backoff_ms: u64,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            scan_timeout_ms: default_scan_timeout_ms(),
            ble_service_uuid: default_service_uuid(),
            ble_control_char_uuid: default_control_char_uuid(),
            stop_press_window_ms: default_stop_press_window_ms(),
            actuation_addr: default_actuation_addr(),
            bridge_backoff_ms: default_bridge_backoff_ms(),
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn stop_press_window(&self) -> Duration {
        Duration::from_millis(self.stop_press_window_ms)
    }

    pub fn bridge_backoff(&self) -> Duration {
        Duration::from_millis(self.bridge_backoff_ms)
    }
}

fn default_device_name() -> String {
    "mypi".to_string()
}
fn default_scan_timeout_ms() -> u64 {
    10_000
}
fn default_service_uuid() -> String {
    "12345678-1234-5678-1234-56789abcdef0".to_string()
}
fn default_control_char_uuid() -> String {
    "abcdef01-1234-5678-1234-56789abcdef0".to_string()
}
fn default_stop_press_window_ms() -> u64 {
    2_000
}
fn default_actuation_addr() -> String {
    "127.0.0.1:65432".to_string()
}
fn default_bridge_backoff_ms() -> u64 {
    1_000
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("SkateBack");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployed_board() {
        let settings = Settings::default();
        assert_eq!(settings.device_name, "mypi");
        assert_eq!(settings.scan_timeout(), Duration::from_secs(10));
        assert_eq!(settings.stop_press_window(), Duration::from_secs(2));
        assert_eq!(settings.actuation_addr, "127.0.0.1:65432");
        assert_eq!(settings.bridge_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn empty_file_falls_back_to_defaults_per_field() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.device_name, "mypi");
        assert_eq!(settings.ble_service_uuid, "12345678-1234-5678-1234-56789abcdef0");
        assert_eq!(settings.log_settings.level, "info");
    }

    #[test]
    fn partial_file_keeps_overrides() {
        let settings: Settings =
            serde_json::from_str(r#"{"device_name":"bench-board","scan_timeout_ms":500}"#).unwrap();
        assert_eq!(settings.device_name, "bench-board");
        assert_eq!(settings.scan_timeout(), Duration::from_millis(500));
        assert_eq!(settings.actuation_addr, "127.0.0.1:65432");
    }
}
