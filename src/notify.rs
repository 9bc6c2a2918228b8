//! Desktop notifications for reminders.
//!
//! Delivery is best-effort: a missing or failing backend is logged and the
//! caller never sees an error.

use crate::AppError;
use notify_rust::Notification;
use std::time::Duration;
use tracing::{debug, info, warn};

const APP_NAME: &str = "Focus Engine";
const DISPLAY_TIME: Duration = Duration::from_secs(15);

pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Available notification backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Native notifications: D-Bus on Linux/BSD, Notification Center on
    /// macOS, toasts on Windows
    Desktop,
    /// Nothing to show a popup with; the log line is all there is
    LogOnly,
}

impl Backend {
    pub fn detect() -> Self {
        // Without a session bus (ssh, containers, services) there is nobody
        // to talk to on Linux.
        let headless = cfg!(all(unix, not(target_os = "macos")))
            && std::env::var_os("DBUS_SESSION_BUS_ADDRESS").is_none();
        if headless {
            debug!("no D-Bus session bus, notifications go to the log only");
            Self::LogOnly
        } else {
            Self::Desktop
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::LogOnly => "log",
        }
    }

    fn send(&self, title: &str, body: &str) -> Result<(), AppError> {
        match self {
            Self::Desktop => Notification::new()
                .appname(APP_NAME)
                .summary(title)
                .body(body)
                .timeout(DISPLAY_TIME)
                .show()
                .map(|_| ())
                .map_err(|e| AppError::Notify(e.to_string())),
            Self::LogOnly => Ok(()),
        }
    }
}

/// Shows reminders through whatever the desktop offers.
pub struct DesktopNotifier {
    backend: Backend,
}

impl DesktopNotifier {
    pub fn detect() -> Self {
        Self::with_backend(Backend::detect())
    }

    pub fn with_backend(backend: Backend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

impl NotificationSink for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(backend = self.backend.name(), "{title}: {body}");
        if let Err(e) = self.backend.send(title, body) {
            warn!("Failed to send desktop notification: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_only_backend_never_fails() {
        let notifier = DesktopNotifier::with_backend(Backend::LogOnly);
        notifier.notify("Focus Session Reminder", "Focus Reminder: Stay on track!");
        assert_eq!(notifier.backend(), Backend::LogOnly);
        assert!(Backend::LogOnly.send("title", "body").is_ok());
    }

    #[test]
    fn backends_have_log_names() {
        assert_eq!(Backend::Desktop.name(), "desktop");
        assert_eq!(Backend::LogOnly.name(), "log");
    }
}
