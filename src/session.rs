//! Focus session state machine.
//!
//! `Idle` → `start` → `Focusing` → `stop` (user, countdown expiry, or
//! shutdown) → `Idle`.
//!
//! Blocking and phase move in lock-step: a start that fails anywhere before
//! the transition leaves the phase `Idle` and no reminder armed, and a stop
//! always ends in `Idle` even when unblocking fails. Ordering on the way in
//! is backup, apply, then arm; on the way out it is disarm, then restore.

use crate::blocklist::{BlockList, ListError, TaskList, DEFAULT_BLOCKED_SITES};
use crate::hosts_manager::{HostsError, HostsStore};
use crate::notify::NotificationSink;
use crate::privilege::PrivilegeOracle;
use crate::scheduler::{DisarmOutcome, ReminderScheduler, SchedulerError};
use crate::store::{ListStore, BLOCKED_SITES_KEY, TASKS_KEY};
use crate::AppError;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const REMINDER_TITLE: &str = "Focus Session Reminder";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("a focus session is already running")]
    AlreadyFocusing,

    #[error("administrator privileges are needed to block websites; restart as Administrator/root")]
    InsufficientPrivilege,

    #[error("your blocked sites list is empty; add sites first")]
    EmptyBlockList,

    #[error("could not apply website blocks: {0}")]
    BlockingFailed(#[from] HostsError),

    #[error("could not start reminders: {0}")]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Focusing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    User,
    Completed,
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::User => "stopped by user",
            StopReason::Completed => "completed",
            StopReason::Shutdown => "stopped for shutdown",
        })
    }
}

/// Something that went wrong while stopping. The session ended regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopWarning {
    RestoreFailed { error: String, backup_path: PathBuf },
    PrivilegeMissing { backup_path: PathBuf },
    SchedulerSlowShutdown,
}

impl fmt::Display for StopWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopWarning::RestoreFailed { error, backup_path } => write!(
                f,
                "Could not automatically restore the hosts file ({error}). \
                 Restore it manually from '{}'.",
                backup_path.display()
            ),
            StopWarning::PrivilegeMissing { backup_path } => write!(
                f,
                "Admin rights needed to unblock websites. Restart as Admin, \
                 or restore the hosts file manually from '{}'.",
                backup_path.display()
            ),
            StopWarning::SchedulerSlowShutdown => {
                f.write_str("The reminder thread did not stop cleanly.")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub reason: StopReason,
    pub warnings: Vec<StopWarning>,
}

/// Requests the foreground can make while the countdown runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Stop,
    /// The process was asked to terminate.
    Shutdown,
}

/// The presentation side of the foreground countdown.
pub trait Foreground {
    /// Wait up to `timeout` for the user to ask for something.
    fn wait(&mut self, timeout: Duration) -> Option<Request>;

    /// Ask whether a running session may be stopped so the process can exit.
    fn confirm_shutdown(&mut self) -> bool;

    fn show_remaining(&mut self, remaining_secs: u64);
}

/// External capabilities the controller consults but does not own.
pub struct Collaborators {
    pub privilege: Arc<dyn PrivilegeOracle>,
    pub notifier: Arc<dyn NotificationSink>,
    pub store: Arc<dyn ListStore>,
}

#[derive(Debug, Default)]
struct SessionState {
    phase: Phase,
    ends_at: Option<Instant>,
    reminder_interval: Option<Duration>,
}

/// `MM:SS`, with minutes running past 59 for long sessions.
pub fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub fn reminder_message(task: Option<&str>) -> String {
    match task {
        Some(task) => format!("Focus Reminder: Remember your task - {task}"),
        None => "Focus Reminder: Stay on track!".to_string(),
    }
}

pub struct SessionController {
    hosts: HostsStore,
    scheduler: ReminderScheduler,
    privilege: Arc<dyn PrivilegeOracle>,
    notifier: Arc<dyn NotificationSink>,
    store: Arc<dyn ListStore>,
    sites: BlockList,
    tasks: TaskList,
    state: SessionState,
}

impl SessionController {
    /// Build the controller and load both lists from the store.
    pub fn new(
        hosts: HostsStore,
        scheduler: ReminderScheduler,
        collaborators: Collaborators,
    ) -> Result<Self, AppError> {
        let Collaborators {
            privilege,
            notifier,
            store,
        } = collaborators;

        let sites = store.load_lines(BLOCKED_SITES_KEY, DEFAULT_BLOCKED_SITES)?;
        let tasks = store.load_lines(TASKS_KEY, &[])?;
        let sites = BlockList::from_lines(&sites);
        let tasks = TaskList::from_lines(&tasks);

        Ok(Self {
            hosts,
            scheduler,
            privilege,
            notifier,
            store,
            sites,
            tasks,
            state: SessionState::default(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn is_focusing(&self) -> bool {
        self.state.phase == Phase::Focusing
    }

    pub fn reminders_armed(&self) -> bool {
        self.scheduler.is_armed()
    }

    pub fn reminder_interval(&self) -> Option<Duration> {
        self.state.reminder_interval
    }

    pub fn hosts(&self) -> &HostsStore {
        &self.hosts
    }

    pub fn blocked_sites(&self) -> &[String] {
        self.sites.as_slice()
    }

    pub fn tasks(&self) -> &[String] {
        self.tasks.as_slice()
    }

    // =====================================================================
    // Session lifecycle
    // =====================================================================

    pub fn start(&mut self, duration_secs: u64, reminder_secs: u64) -> Result<(), SessionError> {
        if self.is_focusing() {
            warn!("Start ignored: a focus session is already running.");
            return Err(SessionError::AlreadyFocusing);
        }
        if duration_secs == 0 || reminder_secs == 0 {
            return Err(SessionError::InvalidParameter(
                "duration and reminder interval must be positive".into(),
            ));
        }
        let now = Instant::now();
        let ends_at = now
            .checked_add(Duration::from_secs(duration_secs))
            .ok_or_else(|| SessionError::InvalidParameter("duration is too long".into()))?;
        if !self.privilege.has_elevated_privilege() {
            error!("Admin privileges required to block websites.");
            return Err(SessionError::InsufficientPrivilege);
        }
        if self.sites.is_empty() {
            warn!("Start cancelled: Blocked sites list is empty.");
            return Err(SessionError::EmptyBlockList);
        }

        if let Err(e) = self.hosts.ensure_backup() {
            error!("Session start failed: Could not back up the hosts file. {e}");
            return Err(e.into());
        }
        if let Err(e) = self.hosts.apply(self.sites.as_slice()) {
            error!("Session start failed: Could not apply website blocks. {e}");
            self.unwind_start();
            return Err(e.into());
        }

        let interval = Duration::from_secs(reminder_secs);
        self.state = SessionState {
            phase: Phase::Focusing,
            ends_at: Some(ends_at),
            reminder_interval: Some(interval),
        };

        let task = self.tasks.first().map(str::to_string);
        let notifier = Arc::clone(&self.notifier);
        let armed = self.scheduler.arm(interval, move || {
            send_reminder(notifier.as_ref(), task.as_deref());
            Ok(())
        });
        if let Err(e) = armed {
            error!("Could not start reminder thread: {e}");
            self.unwind_start();
            return Err(e.into());
        }

        info!(
            "Focus session started (Duration: {}, Reminder every {}).",
            format_clock(duration_secs),
            format_clock(reminder_secs)
        );
        Ok(())
    }

    /// End the running session. Returns `None` when already idle.
    pub fn stop(&mut self, reason: StopReason) -> Option<StopReport> {
        if !self.is_focusing() {
            debug!("Stop requested while idle.");
            return None;
        }
        info!("Focus session {reason}.");

        let mut warnings = Vec::new();

        if self.scheduler.disarm() == DisarmOutcome::TimedOut {
            warnings.push(StopWarning::SchedulerSlowShutdown);
        }
        self.state.reminder_interval = None;

        let backup_path = self.hosts.backup_path().to_path_buf();
        if self.privilege.has_elevated_privilege() {
            if let Err(e) = self.hosts.restore() {
                error!("Could not restore hosts file: {e}");
                warnings.push(StopWarning::RestoreFailed {
                    error: e.to_string(),
                    backup_path,
                });
            }
        } else {
            warn!("Cannot unblock websites without Admin rights.");
            warnings.push(StopWarning::PrivilegeMissing { backup_path });
        }

        self.state = SessionState::default();
        info!("Focus session ended.");
        Some(StopReport { reason, warnings })
    }

    // =====================================================================
    // Countdown
    // =====================================================================

    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        if !self.is_focusing() {
            return None;
        }
        self.state
            .ends_at
            .map(|ends_at| ends_at.saturating_duration_since(now))
    }

    /// Whole seconds left, rounded up so the display reaches zero only at expiry.
    pub fn remaining_seconds(&self) -> Option<u64> {
        self.remaining_seconds_at(Instant::now())
    }

    pub fn remaining_seconds_at(&self, now: Instant) -> Option<u64> {
        self.remaining_at(now).map(|left| {
            let secs = left.as_secs();
            if left.subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        })
    }

    /// One countdown step at `now`: stops the session once it has run out.
    pub fn tick_at(&mut self, now: Instant) -> Option<StopReport> {
        let ends_at = self.state.ends_at.filter(|_| self.is_focusing())?;
        if now >= ends_at {
            info!("Session Complete!");
            return self.stop(StopReason::Completed);
        }
        None
    }

    pub fn tick(&mut self) -> Option<StopReport> {
        self.tick_at(Instant::now())
    }

    /// Drive the countdown until the session ends.
    ///
    /// Every `tick` the remaining time is recomputed and shown; expiry stops
    /// the session as `Completed`. A shutdown request only stops it when the
    /// foreground confirms; otherwise the session keeps running.
    pub fn run_countdown(
        &mut self,
        tick: Duration,
        foreground: &mut dyn Foreground,
    ) -> Option<StopReport> {
        loop {
            let now = Instant::now();
            if let Some(report) = self.tick_at(now) {
                return Some(report);
            }
            let remaining = self.remaining_seconds_at(now)?;
            foreground.show_remaining(remaining);

            let deadline = now + tick;
            match foreground.wait(tick) {
                Some(Request::Stop) => return self.stop(StopReason::User),
                Some(Request::Shutdown) => {
                    if foreground.confirm_shutdown() {
                        info!("Stopping session due to app closing.");
                        return self.stop(StopReason::Shutdown);
                    }
                    info!("Close cancelled by user.");
                }
                None => {
                    // The foreground may return early with nothing to report.
                    let left = deadline.saturating_duration_since(Instant::now());
                    if !left.is_zero() {
                        thread::sleep(left);
                    }
                }
            }
        }
    }

    // =====================================================================
    // Lists
    // =====================================================================

    /// Add a site (and its `www.` counterpart) and persist the list.
    pub fn add_blocked_site(&mut self, input: &str) -> Result<Vec<String>, AppError> {
        let mut next = self.sites.clone();
        let added = next.add(input)?;
        self.store.save_lines(BLOCKED_SITES_KEY, next.as_slice())?;
        self.sites = next;
        info!("Blocked site(s) added: {}", added.join(", "));
        Ok(added)
    }

    pub fn remove_blocked_site(&mut self, input: &str) -> Result<String, AppError> {
        let mut next = self.sites.clone();
        let removed = next.remove(input)?;
        self.store.save_lines(BLOCKED_SITES_KEY, next.as_slice())?;
        self.sites = next;
        info!("Blocked site(s) removed: {removed}");
        Ok(removed)
    }

    pub fn add_task(&mut self, input: &str) -> Result<String, AppError> {
        self.ensure_tasks_editable()?;
        let mut next = self.tasks.clone();
        let added = next.add(input)?;
        self.store.save_lines(TASKS_KEY, next.as_slice())?;
        self.tasks = next;
        info!("Task added: '{added}'");
        Ok(added)
    }

    pub fn remove_task(&mut self, input: &str) -> Result<String, AppError> {
        self.ensure_tasks_editable()?;
        let mut next = self.tasks.clone();
        let removed = next.remove(input)?;
        self.store.save_lines(TASKS_KEY, next.as_slice())?;
        self.tasks = next;
        info!("Task removed: '{removed}'");
        Ok(removed)
    }

    fn ensure_tasks_editable(&self) -> Result<(), ListError> {
        if self.is_focusing() {
            return Err(ListError::SessionActive);
        }
        Ok(())
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    /// Roll a half-finished start back to `Idle`.
    fn unwind_start(&mut self) {
        if let Err(e) = self.hosts.restore() {
            error!("Could not restore hosts file while aborting start: {e}");
        }
        self.state = SessionState::default();
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(report) = self.stop(StopReason::Shutdown) {
            for warning in &report.warnings {
                warn!("{warning}");
            }
        }
    }
}

fn send_reminder(notifier: &dyn NotificationSink, task: Option<&str>) {
    match task {
        Some(task) => info!("Reminder sent for task: {task}"),
        None => info!("Generic focus reminder sent."),
    }
    notifier.notify(REMINDER_TITLE, &reminder_message(task));
}
