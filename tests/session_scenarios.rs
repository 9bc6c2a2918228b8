//! End-to-end session scenarios against a scratch hosts file.

use focus_engine::hosts_manager::override_line;
use focus_engine::notify::NotificationSink;
use focus_engine::platform::DnsFlusher;
use focus_engine::privilege::PrivilegeOracle;
use focus_engine::session::{Foreground, Request, REMINDER_TITLE};
use focus_engine::store::{FileListStore, ListStore, BLOCKED_SITES_KEY, TASKS_KEY};
use focus_engine::{
    AppError, Collaborators, HostsError, HostsStore, ListError, Phase, ReminderScheduler,
    SessionController, SessionError, StopReason, StopWarning,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const PRISTINE: &str = "127.0.0.1 localhost\n::1 localhost\n";

// =========================================================================
// Fakes
// =========================================================================

struct TogglePrivilege(AtomicBool);

impl PrivilegeOracle for TogglePrivilege {
    fn has_elevated_privilege(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RecordingSink(Mutex<Vec<(String, String)>>);

impl RecordingSink {
    fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, title: &str, body: &str) {
        self.0.lock().unwrap().push((title.to_string(), body.to_string()));
    }
}

#[derive(Default)]
struct CountingFlusher(AtomicUsize);

impl DnsFlusher for CountingFlusher {
    fn flush(&self) -> Result<(), AppError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Never asks to stop; the countdown runs to expiry.
struct PatientForeground {
    shown: Vec<u64>,
}

impl Foreground for PatientForeground {
    fn wait(&mut self, timeout: Duration) -> Option<Request> {
        thread::sleep(timeout);
        None
    }

    fn confirm_shutdown(&mut self) -> bool {
        false
    }

    fn show_remaining(&mut self, remaining_secs: u64) {
        self.shown.push(remaining_secs);
    }
}

// =========================================================================
// Fixture
// =========================================================================

struct Fixture {
    dir: TempDir,
    privilege: Arc<TogglePrivilege>,
    sink: Arc<RecordingSink>,
    flusher: Arc<CountingFlusher>,
}

impl Fixture {
    fn new(sites: &[&str], tasks: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hosts"), PRISTINE).unwrap();

        let store = FileListStore::new(dir.path().join("data"));
        let lines = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        store.save_lines(BLOCKED_SITES_KEY, &lines(sites)).unwrap();
        store.save_lines(TASKS_KEY, &lines(tasks)).unwrap();

        Self {
            dir,
            privilege: Arc::new(TogglePrivilege(AtomicBool::new(true))),
            sink: Arc::new(RecordingSink::default()),
            flusher: Arc::new(CountingFlusher::default()),
        }
    }

    fn hosts_path(&self) -> PathBuf {
        self.dir.path().join("hosts")
    }

    fn backup_path(&self) -> PathBuf {
        self.dir.path().join("backup").join("hosts.focus.backup")
    }

    fn controller(&self) -> SessionController {
        self.controller_with_backup(&self.backup_path())
    }

    fn controller_with_backup(&self, backup: &Path) -> SessionController {
        SessionController::new(
            HostsStore::new(self.hosts_path(), backup, self.flusher.clone()),
            ReminderScheduler::new(Duration::from_secs(2)),
            Collaborators {
                privilege: self.privilege.clone(),
                notifier: self.sink.clone(),
                store: Arc::new(FileListStore::new(self.dir.path().join("data"))),
            },
        )
        .unwrap()
    }

    fn hosts(&self) -> String {
        fs::read_to_string(self.hosts_path()).unwrap()
    }

    fn flushes(&self) -> usize {
        self.flusher.0.load(Ordering::SeqCst)
    }
}

fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn start_backs_up_blocks_and_reminds() {
    let fx = Fixture::new(&["example.com", "example.net"], &["Draft chapter"]);
    let mut controller = fx.controller();

    controller.start(50 * 60, 25 * 60).unwrap();

    assert_eq!(controller.phase(), Phase::Focusing);
    assert_eq!(fs::read_to_string(fx.backup_path()).unwrap(), PRISTINE);
    assert_eq!(
        fx.hosts(),
        format!(
            "{PRISTINE}{}\n{}\n",
            override_line("example.com"),
            override_line("example.net")
        )
    );
    assert!(wait_until(Duration::from_secs(1), || fx.sink.count() == 1));
    assert_eq!(
        fx.sink.0.lock().unwrap()[0],
        (
            REMINDER_TITLE.to_string(),
            "Focus Reminder: Remember your task - Draft chapter".to_string()
        )
    );

    controller.stop(StopReason::User).unwrap();
}

#[test]
fn second_start_is_rejected_without_touching_the_file() {
    let fx = Fixture::new(&["example.com"], &[]);
    let mut controller = fx.controller();
    controller.start(600, 300).unwrap();
    let blocked = fx.hosts();

    assert!(matches!(controller.start(600, 300), Err(SessionError::AlreadyFocusing)));

    assert_eq!(fx.hosts(), blocked);
    assert!(controller.is_focusing());
    assert!(wait_until(Duration::from_secs(1), || fx.sink.count() == 1));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(fx.sink.count(), 1);

    controller.stop(StopReason::User).unwrap();
}

#[test]
fn stop_while_idle_changes_nothing() {
    let fx = Fixture::new(&["example.com"], &[]);
    let mut controller = fx.controller();

    assert_eq!(controller.stop(StopReason::User), None);

    assert_eq!(fx.hosts(), PRISTINE);
    assert!(!fx.backup_path().exists());
    assert!(!controller.reminders_armed());
    assert_eq!(fx.flushes(), 0);
}

#[test]
fn start_without_privilege_leaves_everything_idle() {
    let fx = Fixture::new(&["example.com"], &[]);
    fx.privilege.0.store(false, Ordering::SeqCst);
    let mut controller = fx.controller();

    assert!(matches!(controller.start(600, 300), Err(SessionError::InsufficientPrivilege)));

    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(fx.hosts(), PRISTINE);
    assert!(!fx.backup_path().exists());
    assert!(!controller.reminders_armed());
}

#[test]
fn expiry_stops_exactly_once() {
    let fx = Fixture::new(&["example.com"], &[]);
    let mut controller = fx.controller();
    controller.start(60, 3600).unwrap();
    let after_expiry = Instant::now() + Duration::from_secs(61);

    let report = controller.tick_at(after_expiry).unwrap();

    assert_eq!(report.reason, StopReason::Completed);
    assert!(report.warnings.is_empty());
    assert_eq!(controller.tick_at(after_expiry), None);
    assert_eq!(controller.phase(), Phase::Idle);
    assert!(!controller.reminders_armed());
    assert_eq!(fx.hosts(), PRISTINE);
}

#[test]
fn countdown_runs_to_completion() {
    let fx = Fixture::new(&["example.com"], &[]);
    let mut controller = fx.controller();
    controller.start(1, 3600).unwrap();
    let mut foreground = PatientForeground { shown: Vec::new() };

    let report = controller
        .run_countdown(Duration::from_millis(50), &mut foreground)
        .unwrap();

    assert_eq!(report.reason, StopReason::Completed);
    assert_eq!(foreground.shown.first(), Some(&1));
    assert!(foreground.shown.iter().all(|&secs| secs >= 1));
    assert_eq!(fx.hosts(), PRISTINE);
}

// =========================================================================
// Invariants
// =========================================================================

#[test]
fn failed_backup_aborts_start() {
    let fx = Fixture::new(&["example.com"], &[]);
    let blocker = fx.dir.path().join("not-a-dir");
    fs::write(&blocker, "").unwrap();
    let mut controller = fx.controller_with_backup(&blocker.join("hosts.focus.backup"));

    assert!(matches!(
        controller.start(600, 300),
        Err(SessionError::BlockingFailed(HostsError::Io { .. }))
    ));

    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(fx.hosts(), PRISTINE);
    assert!(!controller.reminders_armed());
    assert_eq!(fx.sink.count(), 0);
}

#[test]
fn unwritable_hosts_file_aborts_start_after_backup() {
    let fx = Fixture::new(&["example.com", "example.net"], &["Draft chapter"]);
    let mut permissions = fs::metadata(fx.hosts_path()).unwrap().permissions();
    permissions.set_readonly(true);
    fs::set_permissions(fx.hosts_path(), permissions).unwrap();
    if fs::OpenOptions::new().append(true).open(fx.hosts_path()).is_ok() {
        // Running as root: file modes are not enforced.
        return;
    }
    let mut controller = fx.controller();

    assert!(matches!(
        controller.start(600, 300),
        Err(SessionError::BlockingFailed(HostsError::PermissionDenied { .. }))
    ));

    assert!(fx.backup_path().is_file());
    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(fx.hosts(), PRISTINE);
    assert!(!controller.reminders_armed());
    assert_eq!(fx.sink.count(), 0);
}

#[test]
fn missing_hosts_file_aborts_start() {
    let fx = Fixture::new(&["example.com"], &[]);
    fs::remove_file(fx.hosts_path()).unwrap();
    let mut controller = fx.controller();

    assert!(matches!(
        controller.start(600, 300),
        Err(SessionError::BlockingFailed(HostsError::NotFound(_)))
    ));
    assert_eq!(controller.phase(), Phase::Idle);
    assert!(!fx.hosts_path().exists());
}

#[test]
fn empty_block_list_is_rejected() {
    let fx = Fixture::new(&["example.com"], &[]);
    let mut controller = fx.controller();
    controller.remove_blocked_site("example.com").unwrap();

    assert!(matches!(controller.start(600, 300), Err(SessionError::EmptyBlockList)));
    assert_eq!(fx.hosts(), PRISTINE);
}

#[test]
fn privilege_lost_mid_session_still_ends_it() {
    let fx = Fixture::new(&["example.com"], &[]);
    let mut controller = fx.controller();
    controller.start(600, 300).unwrap();
    fx.privilege.0.store(false, Ordering::SeqCst);

    let report = controller.stop(StopReason::User).unwrap();

    assert_eq!(
        report.warnings,
        vec![StopWarning::PrivilegeMissing {
            backup_path: fx.backup_path()
        }]
    );
    assert_eq!(controller.phase(), Phase::Idle);
    assert!(fx.hosts().contains(&override_line("example.com")));
    assert_eq!(fs::read_to_string(fx.backup_path()).unwrap(), PRISTINE);
}

#[test]
fn backup_survives_repeated_sessions() {
    let fx = Fixture::new(&["example.com"], &[]);
    let mut controller = fx.controller();

    controller.start(600, 300).unwrap();
    controller.stop(StopReason::User).unwrap();
    fs::write(fx.hosts_path(), "10.0.0.1 intranet\n").unwrap();
    controller.start(600, 300).unwrap();
    controller.stop(StopReason::Completed).unwrap();

    // The second session restores the first snapshot, not the edited file.
    assert_eq!(fx.hosts(), PRISTINE);
}

#[test]
fn dns_is_flushed_after_apply_and_restore() {
    let fx = Fixture::new(&["example.com"], &[]);
    let mut controller = fx.controller();

    controller.start(600, 300).unwrap();
    assert_eq!(fx.flushes(), 1);
    controller.stop(StopReason::User).unwrap();
    assert_eq!(fx.flushes(), 2);
}

#[test]
fn lists_persist_across_controllers() {
    let fx = Fixture::new(&["example.com"], &[]);
    {
        let mut controller = fx.controller();
        controller.add_blocked_site("www.example.org").unwrap();
        controller.add_task("Draft chapter").unwrap();
        assert!(matches!(
            controller.add_task("  "),
            Err(AppError::List(ListError::Empty))
        ));
    }

    let controller = fx.controller();
    assert_eq!(
        controller.blocked_sites(),
        ["example.com", "www.example.org", "example.org"]
    );
    assert_eq!(controller.tasks(), ["Draft chapter"]);
}

#[test]
fn dropping_a_running_controller_restores_hosts() {
    let fx = Fixture::new(&["example.com"], &[]);
    let mut controller = fx.controller();
    controller.start(600, 300).unwrap();
    assert_ne!(fx.hosts(), PRISTINE);

    drop(controller);

    assert_eq!(fx.hosts(), PRISTINE);
}
