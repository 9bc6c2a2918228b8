//! OS-specific paths and the DNS cache invalidator.

use crate::AppError;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Environment variable that points the engine at a different hosts file.
pub const HOSTS_PATH_ENV: &str = "FOCUS_ENGINE_HOSTS";

const BACKUP_FILENAME: &str = "hosts.focus.backup";

/// Return the system hosts file path, honouring `FOCUS_ENGINE_HOSTS`.
pub fn hosts_file_path() -> PathBuf {
    if let Some(path) = std::env::var_os(HOSTS_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    if cfg!(target_os = "windows") {
        let root = std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\Windows".into());
        PathBuf::from(root).join(r"System32\drivers\etc\hosts")
    } else {
        PathBuf::from("/etc/hosts")
    }
}

/// Return the app's config directory.
///   macOS / Linux: ~/.focusengine/
///   Windows:       %APPDATA%\FocusEngine\
pub fn config_dir() -> PathBuf {
    if cfg!(target_os = "windows") {
        directories::BaseDirs::new()
            .map(|b| b.config_dir().join("FocusEngine"))
            .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData\FocusEngine"))
    } else {
        directories::BaseDirs::new()
            .map(|b| b.home_dir().join(".focusengine"))
            .unwrap_or_else(|| PathBuf::from("/tmp/.focusengine"))
    }
}

/// Directory holding the task and blocked-site lists and the instance lock.
pub fn data_dir() -> PathBuf {
    config_dir().join("data")
}

/// Where the pristine hosts snapshot lives unless overridden in settings.
pub fn default_backup_path() -> PathBuf {
    config_dir().join(BACKUP_FILENAME)
}

// =========================================================================
// DNS cache invalidation
// =========================================================================

/// Asks the OS to drop cached name resolutions after the hosts file changed.
pub trait DnsFlusher: Send + Sync {
    fn flush(&self) -> Result<(), AppError>;
}

/// Flushes through the platform's resolver tooling.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDnsFlusher;

impl DnsFlusher for SystemDnsFlusher {
    fn flush(&self) -> Result<(), AppError> {
        if cfg!(target_os = "windows") {
            run("ipconfig", &["/flushdns"])
        } else if cfg!(target_os = "macos") {
            run("dscacheutil", &["-flushcache"])?;
            run("killall", &["-HUP", "mDNSResponder"])
        } else {
            run("resolvectl", &["flush-caches"])
        }
    }
}

/// Used when flushing is switched off in settings.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFlusher;

impl DnsFlusher for NoopFlusher {
    fn flush(&self) -> Result<(), AppError> {
        debug!("DNS flush disabled in settings");
        Ok(())
    }
}

fn run(program: &str, args: &[&str]) -> Result<(), AppError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| AppError::Dns(format!("cannot run {program}: {e}")))?;

    if !output.status.success() {
        return Err(AppError::Dns(format!(
            "{program} exited with {}",
            output.status
        )));
    }
    debug!(program, "DNS cache flushed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_lives_in_config_dir() {
        let backup = default_backup_path();
        assert_eq!(backup.parent(), Some(config_dir().as_path()));
        assert!(data_dir().starts_with(config_dir()));
    }

    #[test]
    fn noop_flusher_never_fails() {
        assert!(NoopFlusher.flush().is_ok());
    }
}
