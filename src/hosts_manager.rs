//! Safe hosts-file manipulation with a one-time pristine backup.
//!
//! The engine only ever appends `127.0.0.1<TAB>domain` lines. It never edits
//! or removes lines in place: unblocking copies the backup snapshot back over
//! the live file, so whatever was appended disappears with it.
//!
//! The backup is taken once and never overwritten. If the process dies in the
//! middle of a session, restoring always lands on the state from before the
//! engine first touched the file.

use crate::platform::DnsFlusher;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const LOOPBACK_IP: &str = "127.0.0.1";

#[derive(Error, Debug)]
pub enum HostsError {
    #[error("hosts file not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("permission denied on {} (running as admin/root?)", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("hosts backup not found at {}; cannot restore automatically", .0.display())]
    BackupMissing(PathBuf),
}

impl HostsError {
    fn io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => HostsError::NotFound(path),
            io::ErrorKind::PermissionDenied => HostsError::PermissionDenied { path, source },
            _ => HostsError::Io { path, source },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStatus {
    Created,
    AlreadyPresent,
}

/// Canonical override line for `domain`, without the trailing newline.
pub fn override_line(domain: &str) -> String {
    format!("{LOOPBACK_IP}\t{domain}")
}

/// Whole-line, whitespace-tolerant match for an existing override of `domain`.
fn has_override(content: &str, domain: &str) -> bool {
    content.lines().any(|line| {
        let mut fields = line.split_whitespace();
        fields.next() == Some(LOOPBACK_IP)
            && fields.next() == Some(domain)
            && fields.next().is_none()
    })
}

/// The system hosts file plus its sidecar backup snapshot.
pub struct HostsStore {
    hosts_path: PathBuf,
    backup_path: PathBuf,
    flusher: Arc<dyn DnsFlusher>,
}

impl HostsStore {
    pub fn new(
        hosts_path: impl Into<PathBuf>,
        backup_path: impl Into<PathBuf>,
        flusher: Arc<dyn DnsFlusher>,
    ) -> Self {
        Self {
            hosts_path: hosts_path.into(),
            backup_path: backup_path.into(),
            flusher,
        }
    }

    pub fn hosts_path(&self) -> &Path {
        &self.hosts_path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn has_backup(&self) -> bool {
        self.backup_path.is_file()
    }

    /// Snapshot the live hosts file unless a snapshot already exists.
    pub fn ensure_backup(&self) -> Result<BackupStatus, HostsError> {
        if self.has_backup() {
            debug!(backup = %self.backup_path.display(), "hosts backup already present");
            return Ok(BackupStatus::AlreadyPresent);
        }
        if !self.hosts_path.exists() {
            return Err(HostsError::NotFound(self.hosts_path.clone()));
        }

        info!(backup = %self.backup_path.display(), "Backing up hosts file...");

        if let Some(dir) = self.backup_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| HostsError::io(dir, e))?;
        }

        let content = fs::read(&self.hosts_path).map_err(|e| HostsError::io(&self.hosts_path, e))?;

        // Write then rename: a torn snapshot must never count as an existing backup.
        let partial = self.partial_backup_path();
        fs::write(&partial, &content).map_err(|e| HostsError::io(&partial, e))?;
        fs::rename(&partial, &self.backup_path)
            .map_err(|e| HostsError::io(&self.backup_path, e))?;

        info!("Backup successful.");
        Ok(BackupStatus::Created)
    }

    /// Append an override for every domain not already blocked.
    ///
    /// Returns how many lines were added; zero means everything was already
    /// in place, which is still success.
    pub fn apply(&self, domains: &[String]) -> Result<usize, HostsError> {
        info!("Applying website blocks...");

        let existing = if self.hosts_path.exists() {
            let bytes =
                fs::read(&self.hosts_path).map_err(|e| HostsError::io(&self.hosts_path, e))?;
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            String::new()
        };

        let mut pending: Vec<&str> = Vec::new();
        for domain in domains {
            if !has_override(&existing, domain) && !pending.contains(&domain.as_str()) {
                pending.push(domain);
            }
        }

        if pending.is_empty() {
            info!("Website blocking applied. 0 new entries added.");
            return Ok(0);
        }

        let mut block = String::new();
        if !existing.is_empty() && !existing.ends_with(|c: char| c == '\n' || c == '\r') {
            block.push('\n');
        }
        for domain in &pending {
            info!("Blocking: {domain}");
            block.push_str(&override_line(domain));
            block.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.hosts_path)
            .map_err(|e| HostsError::io(&self.hosts_path, e))?;
        let original_len = file
            .metadata()
            .map_err(|e| HostsError::io(&self.hosts_path, e))?
            .len();
        if let Err(e) = file.write_all(block.as_bytes()).and_then(|_| file.sync_all()) {
            // A short write leaves a torn override line; cut back to what was there.
            if let Err(undo) = file.set_len(original_len) {
                warn!("Could not undo partial hosts file write: {undo}");
            }
            return Err(HostsError::io(&self.hosts_path, e));
        }

        self.flush_dns();
        info!(
            "Website blocking applied. {} new entries added.",
            pending.len()
        );
        Ok(pending.len())
    }

    /// Replace the live hosts file with the backup snapshot, verbatim.
    pub fn restore(&self) -> Result<(), HostsError> {
        if !self.has_backup() {
            return Err(HostsError::BackupMissing(self.backup_path.clone()));
        }

        info!("Restoring hosts file from backup...");

        if let Some(dir) = self.hosts_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| HostsError::io(dir, e))?;
        }

        if self.hosts_path.exists() {
            if let Err(e) = fs::remove_file(&self.hosts_path) {
                warn!("Could not remove current hosts file before restore: {e}");
            }
        }

        fs::copy(&self.backup_path, &self.hosts_path).map_err(|e| match e.kind() {
            // The only file copy() must find is the backup.
            io::ErrorKind::NotFound => HostsError::BackupMissing(self.backup_path.clone()),
            _ => HostsError::io(&self.hosts_path, e),
        })?;

        self.flush_dns();
        info!("Hosts file restored.");
        Ok(())
    }

    fn partial_backup_path(&self) -> PathBuf {
        let mut name = self
            .backup_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".partial");
        self.backup_path.with_file_name(name)
    }

    fn flush_dns(&self) {
        info!("Flushing DNS cache...");
        if let Err(e) = self.flusher.flush() {
            warn!("Failed to flush DNS cache automatically: {e}");
        }
    }
}
