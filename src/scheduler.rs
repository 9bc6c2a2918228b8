//! Background reminder thread.
//!
//! Once armed, the callback runs immediately and then once per interval until
//! the scheduler is disarmed. Errors and panics raised by the callback are
//! logged here and never stop the loop.

use crate::AppError;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("reminder scheduler is already armed")]
    AlreadyArmed,

    #[error("reminder interval must be greater than zero")]
    ZeroInterval,

    #[error("failed to spawn reminder thread: {0}")]
    Spawn(#[source] io::Error),
}

/// How a disarm went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisarmOutcome {
    NotArmed,
    Stopped,
    /// The thread was still busy when the wait ran out. It is left to finish
    /// on its own and exits at its next stop check.
    TimedOut,
    Panicked,
}

struct Armed {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct ReminderScheduler {
    disarm_timeout: Duration,
    armed: Option<Armed>,
}

impl ReminderScheduler {
    pub fn new(disarm_timeout: Duration) -> Self {
        Self {
            disarm_timeout,
            armed: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Start the reminder thread. Only one thread may be armed at a time.
    pub fn arm<F>(&mut self, interval: Duration, on_tick: F) -> Result<(), SchedulerError>
    where
        F: FnMut() -> Result<(), AppError> + Send + 'static,
    {
        if self.armed.is_some() {
            return Err(SchedulerError::AlreadyArmed);
        }
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("focus-reminders".into())
            .spawn(move || {
                info!("Scheduler thread started.");
                let mut on_tick = on_tick;
                loop {
                    fire(&mut on_tick);
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Scheduler thread stopped.");
            })
            .map_err(SchedulerError::Spawn)?;

        self.armed = Some(Armed { stop_tx, handle });
        Ok(())
    }

    /// Signal the thread to stop and wait for it, up to the disarm timeout.
    pub fn disarm(&mut self) -> DisarmOutcome {
        let Some(armed) = self.armed.take() else {
            return DisarmOutcome::NotArmed;
        };

        // A send error means the thread already exited.
        let _ = armed.stop_tx.send(());
        debug!("Waiting for scheduler thread...");
        join_with_timeout(armed.handle, self.disarm_timeout)
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        if self.is_armed() {
            self.disarm();
        }
    }
}

fn fire<F>(on_tick: &mut F)
where
    F: FnMut() -> Result<(), AppError>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| on_tick())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Error in scheduler loop: {e}"),
        Err(payload) => error!("Reminder callback panicked: {}", panic_message(&*payload)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> DisarmOutcome {
    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = done_tx.send(handle.join());
    });

    match done_rx.recv_timeout(timeout) {
        Ok(Ok(())) => DisarmOutcome::Stopped,
        Ok(Err(_)) | Err(RecvTimeoutError::Disconnected) => {
            error!("Scheduler thread panicked while stopping.");
            DisarmOutcome::Panicked
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Warning: Scheduler thread did not stop cleanly."
            );
            DisarmOutcome::TimedOut
        }
    }
}
