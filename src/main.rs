//! Focus Engine — command-line front end.
//!
//! Usage:
//!   focus-engine start [--duration MINS] [--reminder MINS]
//!   focus-engine restore
//!   focus-engine sites list|add <domain>|remove <domain>
//!   focus-engine tasks list|add <text>|remove <text>
//!   focus-engine status
//!   focus-engine paths
//!   focus-engine settings [--write]
//!
//! Blocking writes the system hosts file, so `start` and `restore` need
//! Administrator/root. Set `FOCUS_ENGINE_HOSTS` to point the engine at a
//! scratch file instead.

use clap::{Parser, Subcommand};
use focus_engine::activity::ActivityLog;
use focus_engine::config::{self, Settings};
use focus_engine::lock::InstanceLock;
use focus_engine::notify::DesktopNotifier;
use focus_engine::platform::{self, DnsFlusher, NoopFlusher, SystemDnsFlusher};
use focus_engine::privilege::{HostsAccessOracle, PrivilegeOracle};
use focus_engine::session::{format_clock, Foreground, Request};
use focus_engine::store::FileListStore;
use focus_engine::{
    AppError, Collaborators, HostsStore, ListError, ReminderScheduler, SessionController,
    SessionError, StopReport,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LOCK_FILE: &str = "engine.lock";
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "focus-engine")]
#[command(about = "Block distracting websites for the length of a focus session")]
#[command(version)]
#[command(after_help = r#"EXAMPLES:
    focus-engine start                      # 50 min session, reminder every 25 min
    focus-engine start -d 90 -r 30          # 90 min session, reminder every 30 min
    focus-engine sites add news.example.com # also blocks www.news.example.com
    focus-engine tasks add Write the report
    focus-engine restore                    # put the hosts file back by hand

While a session runs, type 'stop' (or 'q') and press Enter to end it early."#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a focus session and count down in the foreground
    #[command(alias = "s")]
    Start {
        /// Session length in minutes (default from settings)
        #[arg(short, long, value_name = "MINS")]
        duration: Option<u64>,

        /// Minutes between reminders (default from settings)
        #[arg(short, long, value_name = "MINS")]
        reminder: Option<u64>,
    },

    /// Restore the hosts file from the backup snapshot
    Restore,

    /// Manage blocked sites
    Sites {
        #[command(subcommand)]
        action: ListAction,
    },

    /// Manage focus tasks
    Tasks {
        #[command(subcommand)]
        action: ListAction,
    },

    /// Show whether a session is running
    #[command(alias = "st")]
    Status,

    /// Print the files the engine reads and writes
    Paths,

    /// Show the effective settings
    Settings {
        /// Write them to the settings file, creating it if needed
        #[arg(long)]
        write: bool,
    },
}

#[derive(Subcommand)]
enum ListAction {
    /// Show the list
    #[command(alias = "ls")]
    List,

    /// Add an entry
    Add {
        #[arg(required = true, num_args = 1..)]
        entry: Vec<String>,
    },

    /// Remove an entry
    #[command(alias = "rm")]
    Remove {
        #[arg(required = true, num_args = 1..)]
        entry: Vec<String>,
    },
}

// =========================================================================
// Entry point
// =========================================================================

fn main() {
    let activity = ActivityLog::default();
    init_tracing(&activity);

    let cli = Cli::parse();
    let result = config::load().and_then(|settings| match cli.command {
        Commands::Start { duration, reminder } => {
            run_start(&settings, duration, reminder, &activity)
        }
        Commands::Restore => run_restore(&settings),
        Commands::Sites { action } => run_sites(&settings, action),
        Commands::Tasks { action } => run_tasks(&settings, action),
        Commands::Status => run_status(&settings),
        Commands::Paths => run_paths(&settings),
        Commands::Settings { write } => run_settings(&settings, write),
    });

    if let Err(e) = result {
        eprintln!("[FocusEngine] Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(activity: &ActivityLog) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .with(activity.layer())
        .init();
}

fn build_controller(settings: &Settings) -> Result<SessionController, AppError> {
    let hosts_path = settings.hosts_path();
    let hosts = HostsStore::new(&hosts_path, settings.backup_path(), flusher(settings));
    let collaborators = Collaborators {
        privilege: Arc::new(HostsAccessOracle::new(&hosts_path)),
        notifier: Arc::new(DesktopNotifier::detect()),
        store: Arc::new(FileListStore::new(platform::data_dir())),
    };
    SessionController::new(
        hosts,
        ReminderScheduler::new(settings.disarm_timeout()),
        collaborators,
    )
}

fn flusher(settings: &Settings) -> Arc<dyn DnsFlusher> {
    if settings.flush_dns {
        Arc::new(SystemDnsFlusher)
    } else {
        Arc::new(NoopFlusher)
    }
}

fn lock_path() -> PathBuf {
    platform::data_dir().join(LOCK_FILE)
}

// =========================================================================
// start
// =========================================================================

fn run_start(
    settings: &Settings,
    duration: Option<u64>,
    reminder: Option<u64>,
    activity: &ActivityLog,
) -> Result<(), AppError> {
    let duration = duration.unwrap_or(settings.default_duration_minutes);
    let reminder = reminder.unwrap_or(settings.default_reminder_minutes);

    let _lock = InstanceLock::acquire(&lock_path())?;
    let mut controller = build_controller(settings)?;

    // Catch signals before the hosts file is touched.
    let mut foreground = TerminalForeground::attach()?;
    controller.start(duration.saturating_mul(60), reminder.saturating_mul(60))?;
    println!("Focus session started: {duration} min, reminder every {reminder} min.");
    println!("Type 'stop' and press Enter to end the session early.");

    let report = controller.run_countdown(settings.countdown_tick(), &mut foreground);
    drop(foreground);
    println!();

    if let Some(report) = report {
        print_report(&report);
    }
    print_activity(activity);
    Ok(())
}

fn print_report(report: &StopReport) {
    println!("Session {}.", report.reason);
    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
}

fn print_activity(activity: &ActivityLog) {
    let entries = activity.entries();
    if entries.is_empty() {
        return;
    }
    println!();
    println!("Recent activity:");
    for entry in entries.iter().rev() {
        println!("  {entry}");
    }
}

enum Input {
    Line(String),
    Signal,
}

/// Countdown front end on the controlling terminal.
///
/// Stdin lines and termination signals are forwarded into one channel by
/// background threads, so the countdown can wait on both with a timeout.
struct TerminalForeground {
    input: Receiver<Input>,
    #[cfg(unix)]
    _signals: SignalForwarder,
}

impl TerminalForeground {
    fn attach() -> Result<Self, AppError> {
        let (tx, rx) = mpsc::channel();
        #[cfg(unix)]
        let signals = SignalForwarder::spawn(tx.clone())?;

        thread::Builder::new()
            .name("focus-stdin".into())
            .spawn(move || read_stdin(tx))?;

        Ok(Self {
            input: rx,
            #[cfg(unix)]
            _signals: signals,
        })
    }
}

fn read_stdin(tx: Sender<Input>) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if tx.send(Input::Line(line)).is_err() {
            break;
        }
    }
    debug!("stdin closed");
}

impl Foreground for TerminalForeground {
    fn wait(&mut self, timeout: Duration) -> Option<Request> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.input.recv_timeout(left) {
                Ok(Input::Signal) => return Some(Request::Shutdown),
                Ok(Input::Line(line)) => match line.trim().to_lowercase().as_str() {
                    "stop" | "q" | "quit" => return Some(Request::Stop),
                    "" => {}
                    other => println!("\nUnknown command '{other}'. Type 'stop' to end the session."),
                },
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None
                }
            }
        }
    }

    fn confirm_shutdown(&mut self) -> bool {
        print!("\nA focus session is running. Stop it and exit? [y/N] ");
        let _ = io::stdout().flush();

        match self.input.recv_timeout(CONFIRM_TIMEOUT) {
            Ok(Input::Line(answer)) => {
                matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
            }
            // A second signal while asking is taken as a yes.
            Ok(Input::Signal) => true,
            Err(_) => {
                println!();
                false
            }
        }
    }

    fn show_remaining(&mut self, remaining_secs: u64) {
        print!("\r~ {} remaining ~ ", format_clock(remaining_secs));
        let _ = io::stdout().flush();
    }
}

/// Forwards SIGINT/SIGTERM into the foreground's input channel.
#[cfg(unix)]
struct SignalForwarder {
    handle: signal_hook::iterator::Handle,
    thread: Option<thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl SignalForwarder {
    fn spawn(tx: Sender<Input>) -> Result<Self, AppError> {
        use signal_hook::consts::signal::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("focus-signals".into())
            .spawn(move || {
                for signal in signals.forever() {
                    debug!(signal, "termination signal received");
                    if tx.send(Input::Signal).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

#[cfg(unix)]
impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// =========================================================================
// restore
// =========================================================================

fn run_restore(settings: &Settings) -> Result<(), AppError> {
    let lock_path = lock_path();
    if InstanceLock::is_held(&lock_path) {
        return Err(AppError::Lock(
            "a focus session is running; stop it instead of restoring by hand".into(),
        ));
    }

    let hosts_path = settings.hosts_path();
    if !HostsAccessOracle::new(&hosts_path).has_elevated_privilege() {
        return Err(SessionError::InsufficientPrivilege.into());
    }

    let hosts = HostsStore::new(&hosts_path, settings.backup_path(), flusher(settings));
    hosts.restore()?;
    info!("Hosts file restored by hand.");
    println!(
        "Restored {} from {}.",
        hosts.hosts_path().display(),
        hosts.backup_path().display()
    );
    Ok(())
}

// =========================================================================
// sites / tasks
// =========================================================================

fn run_sites(settings: &Settings, action: ListAction) -> Result<(), AppError> {
    let mut controller = build_controller(settings)?;
    match action {
        ListAction::List => print_list("Blocked sites", controller.blocked_sites()),
        ListAction::Add { entry } => {
            for site in controller.add_blocked_site(&entry.join(" "))? {
                println!("Added: {site}");
            }
        }
        ListAction::Remove { entry } => {
            let removed = controller.remove_blocked_site(&entry.join(" "))?;
            println!("Removed: {removed}");
        }
    }
    Ok(())
}

fn run_tasks(settings: &Settings, action: ListAction) -> Result<(), AppError> {
    if !matches!(action, ListAction::List) {
        ensure_no_session(&lock_path())?;
    }
    let mut controller = build_controller(settings)?;
    match action {
        ListAction::List => print_list("Tasks", controller.tasks()),
        ListAction::Add { entry } => {
            let added = controller.add_task(&entry.join(" "))?;
            println!("Added: {added}");
        }
        ListAction::Remove { entry } => {
            let removed = controller.remove_task(&entry.join(" "))?;
            println!("Removed: {removed}");
        }
    }
    Ok(())
}

/// A running session lives in another process and would never see the edit.
fn ensure_no_session(lock_path: &Path) -> Result<(), AppError> {
    if InstanceLock::is_held(lock_path) {
        return Err(ListError::SessionActive.into());
    }
    Ok(())
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        println!("{title}: (none)");
        return;
    }
    println!("{title}:");
    for (i, item) in items.iter().enumerate() {
        println!("  {:>2}. {item}", i + 1);
    }
}

// =========================================================================
// status / paths / settings
// =========================================================================

fn run_status(settings: &Settings) -> Result<(), AppError> {
    let running = InstanceLock::is_held(&lock_path());
    let backup = settings.backup_path();

    println!("Session:  {}", if running { "running" } else { "idle" });
    println!(
        "Backup:   {}",
        if backup.is_file() { "present" } else { "not taken yet" }
    );
    Ok(())
}

fn run_paths(settings: &Settings) -> Result<(), AppError> {
    println!("Hosts:    {}", settings.hosts_path().display());
    println!("Backup:   {}", settings.backup_path().display());
    println!("Settings: {}", config::settings_path().display());
    println!("Data:     {}", platform::data_dir().display());
    Ok(())
}

fn run_settings(settings: &Settings, write: bool) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    if write {
        config::save(settings)?;
        println!("Saved to {}", config::settings_path().display());
    }
    Ok(())
}
