//! Focus Engine — timed website blocking through the hosts file.
//!
//! Blocks a user-maintained list of domains for the length of a focus session
//! by appending loopback overrides to the system hosts file, reminds the user
//! of their current task on a fixed interval, and puts the hosts file back
//! exactly as it was when the session ends.
//!
//! The pieces, leaf-first:
//!   privilege      can this process write the hosts file?
//!   platform       OS paths and DNS cache flushing
//!   hosts_manager  one-time backup, append-only overrides, whole-file restore
//!   blocklist      blocked domains and focus tasks
//!   scheduler      background reminder thread
//!   session        the Idle/Focusing state machine tying it together

pub mod activity;
pub mod blocklist;
pub mod config;
pub mod hosts_manager;
pub mod lock;
pub mod notify;
pub mod platform;
pub mod privilege;
pub mod scheduler;
pub mod session;
pub mod store;

pub use blocklist::{BlockList, ListError, TaskList};
pub use hosts_manager::{BackupStatus, HostsError, HostsStore};
pub use scheduler::{DisarmOutcome, ReminderScheduler, SchedulerError};
pub use session::{
    Collaborators, Phase, SessionController, SessionError, StopReason, StopReport, StopWarning,
};

use std::io;
use thiserror::Error;

// =========================================================================
// Error type
// =========================================================================

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Hosts(#[from] HostsError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    List(#[from] ListError),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("DNS flush failed: {0}")]
    Dns(String),

    #[error("Notification failed: {0}")]
    Notify(String),
}
