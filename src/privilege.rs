//! Privilege oracle: may this process rewrite the hosts file?

use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::debug;

pub trait PrivilegeOracle: Send + Sync {
    fn has_elevated_privilege(&self) -> bool;
}

/// Answers by opening the hosts file for appending without writing to it.
///
/// This covers Administrator on Windows, root on Unix, and any ACL that grants
/// the current user write access, without needing per-OS token inspection.
pub struct HostsAccessOracle {
    hosts_path: PathBuf,
}

impl HostsAccessOracle {
    pub fn new(hosts_path: impl Into<PathBuf>) -> Self {
        Self {
            hosts_path: hosts_path.into(),
        }
    }
}

impl PrivilegeOracle for HostsAccessOracle {
    fn has_elevated_privilege(&self) -> bool {
        // A missing file is the hosts store's error to report, not ours.
        if !self.hosts_path.exists() {
            debug!(path = %self.hosts_path.display(), "hosts file missing, deferring to store");
            return true;
        }

        match OpenOptions::new().append(true).open(&self.hosts_path) {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "hosts file is not writable");
                false
            }
        }
    }
}
