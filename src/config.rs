//! Persistent settings stored as JSON on disk.

use crate::platform;
use crate::AppError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Use this file instead of the OS hosts file.
    pub hosts_path: Option<PathBuf>,
    /// Where the pristine hosts snapshot is kept.
    pub backup_path: Option<PathBuf>,
    pub default_duration_minutes: u64,
    pub default_reminder_minutes: u64,
    /// Upper bound on waiting for the reminder thread when a session stops.
    pub disarm_timeout_ms: u64,
    pub countdown_tick_ms: u64,
    pub flush_dns: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hosts_path: None,
            backup_path: None,
            default_duration_minutes: 50,
            default_reminder_minutes: 25,
            disarm_timeout_ms: 2_000,
            countdown_tick_ms: 1_000,
            flush_dns: true,
        }
    }
}

impl Settings {
    /// `FOCUS_ENGINE_HOSTS` wins over the settings file, which wins over the OS default.
    pub fn hosts_path(&self) -> PathBuf {
        if std::env::var_os(platform::HOSTS_PATH_ENV).is_some_and(|p| !p.is_empty()) {
            return platform::hosts_file_path();
        }
        self.hosts_path
            .clone()
            .unwrap_or_else(platform::hosts_file_path)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.backup_path
            .clone()
            .unwrap_or_else(platform::default_backup_path)
    }

    pub fn disarm_timeout(&self) -> Duration {
        Duration::from_millis(self.disarm_timeout_ms)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms.max(1))
    }

    fn validate(self) -> Result<Self, AppError> {
        if self.default_duration_minutes == 0 || self.default_reminder_minutes == 0 {
            return Err(AppError::Config(
                "default durations must be positive".into(),
            ));
        }
        Ok(self)
    }
}

pub fn settings_path() -> PathBuf {
    platform::config_dir().join("settings.json")
}

/// Load settings from disk, returning defaults if the file doesn't exist.
pub fn load() -> Result<Settings, AppError> {
    load_from(&settings_path())
}

pub fn load_from(path: &Path) -> Result<Settings, AppError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let data = fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&data)
        .map_err(|e| AppError::Config(format!("Invalid settings in {}: {e}", path.display())))?;
    settings.validate()
}

/// Persist settings, creating the parent directory if needed.
pub fn save(settings: &Settings) -> Result<(), AppError> {
    save_to(&settings_path(), settings)
}

pub fn save_to(path: &Path, settings: &Settings) -> Result<(), AppError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let data = serde_json::to_string_pretty(settings)?;
    fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_from(&dir.path().join("settings.json")).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.disarm_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"backup_path": "/var/tmp/hosts.bak", "flush_dns": false}"#).unwrap();

        let settings = load_from(&path).unwrap();
        assert_eq!(settings.backup_path(), PathBuf::from("/var/tmp/hosts.bak"));
        assert!(!settings.flush_dns);
        assert_eq!(settings.default_duration_minutes, 50);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/settings.json");
        let settings = Settings {
            default_reminder_minutes: 10,
            ..Settings::default()
        };

        save_to(&path, &settings).unwrap();
        assert_eq!(load_from(&path).unwrap(), settings);
    }

    #[test]
    fn rejects_zero_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"default_duration_minutes": 0}"#).unwrap();

        assert!(matches!(load_from(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(load_from(&path), Err(AppError::Config(_))));
    }
}
