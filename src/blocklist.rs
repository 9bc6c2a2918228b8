//! Blocked domains and focus tasks.
//!
//! Both lists are plain ordered data. Persistence goes through the list store
//! and is the session controller's job.

use thiserror::Error;
use tracing::warn;

/// Seeded into the blocked-sites store the first time it is absent or empty.
pub const DEFAULT_BLOCKED_SITES: &[&str] = &[
    "www.youtube.com",
    "youtube.com",
    "www.facebook.com",
    "facebook.com",
    "www.twitter.com",
    "twitter.com",
    "www.instagram.com",
    "instagram.com",
    "www.reddit.com",
    "reddit.com",
    "www.tiktok.com",
    "tiktok.com",
    "www.netflix.com",
    "netflix.com",
    "www.twitch.tv",
    "twitch.tv",
];

const WWW_PREFIX: &str = "www.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    #[error("entry is empty")]
    Empty,

    #[error("'{0}' is not a valid domain (e.g. www.example.com or example.com)")]
    InvalidDomain(String),

    #[error("'{0}' is already in the list")]
    Duplicate(String),

    #[error("'{0}' is not in the list")]
    NotFound(String),

    #[error("tasks cannot be edited while a focus session is running")]
    SessionActive,
}

/// Lowercase `input`, drop any URL scheme, path, query or port, and check
/// that what is left looks like a domain.
pub fn normalize_domain(input: &str) -> Result<String, ListError> {
    let lowered = input.trim().to_lowercase();
    if lowered.is_empty() {
        return Err(ListError::Empty);
    }

    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(lowered.as_str());
    let host = without_scheme
        .split(|c: char| matches!(c, '/' | '?' | '#' | ':'))
        .next()
        .unwrap_or_default();

    if !is_valid_domain(host) {
        return Err(ListError::InvalidDomain(input.trim().to_string()));
    }
    Ok(host.to_string())
}

fn is_valid_domain(host: &str) -> bool {
    host.contains('.')
        && !host.starts_with('.')
        && !host.ends_with('.')
        && !host.contains("..")
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// The same site with a literal `www.` prefix added or removed.
///
/// Returns `None` when toggling would not leave a usable domain
/// (`www.com` has no bare counterpart).
pub fn www_counterpart(domain: &str) -> Option<String> {
    let toggled = match domain.strip_prefix(WWW_PREFIX) {
        Some(bare) => bare.to_string(),
        None => format!("{WWW_PREFIX}{domain}"),
    };
    is_valid_domain(&toggled).then_some(toggled)
}

// =========================================================================
// Block list
// =========================================================================

/// Ordered set of normalized domains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockList {
    sites: Vec<String>,
}

impl BlockList {
    /// Build from stored lines, skipping anything that no longer validates.
    pub fn from_lines(lines: &[String]) -> Self {
        let mut list = Self::default();
        for line in lines {
            match normalize_domain(line) {
                Ok(domain) if !list.contains(&domain) => list.sites.push(domain),
                Ok(_) => {}
                Err(e) => warn!("Skipping stored blocked site: {e}"),
            }
        }
        list
    }

    pub fn as_slice(&self) -> &[String] {
        &self.sites
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.sites.iter().any(|s| s == domain)
    }

    /// Add a site and its `www.` counterpart, returning what was new.
    pub fn add(&mut self, input: &str) -> Result<Vec<String>, ListError> {
        let domain = normalize_domain(input)?;
        let mut added = Vec::new();

        let counterpart = www_counterpart(&domain);
        for candidate in std::iter::once(domain.clone()).chain(counterpart) {
            if !self.contains(&candidate) {
                self.sites.push(candidate.clone());
                added.push(candidate);
            }
        }

        if added.is_empty() {
            return Err(ListError::Duplicate(domain));
        }
        Ok(added)
    }

    /// Remove exactly `input`; its counterpart stays.
    pub fn remove(&mut self, input: &str) -> Result<String, ListError> {
        let wanted = input.trim().to_lowercase();
        let index = self
            .sites
            .iter()
            .position(|s| *s == wanted)
            .ok_or_else(|| ListError::NotFound(input.trim().to_string()))?;
        Ok(self.sites.remove(index))
    }
}

// =========================================================================
// Task list
// =========================================================================

/// What the user is meant to be working on. The first entry is the one
/// named in reminders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskList {
    tasks: Vec<String>,
}

impl TaskList {
    pub fn from_lines(lines: &[String]) -> Self {
        let mut list = Self::default();
        for line in lines {
            let task = line.trim();
            if !task.is_empty() && !list.tasks.iter().any(|t| t == task) {
                list.tasks.push(task.to_string());
            }
        }
        list
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tasks
    }

    pub fn first(&self) -> Option<&str> {
        self.tasks.first().map(String::as_str)
    }

    pub fn add(&mut self, input: &str) -> Result<String, ListError> {
        let task = input.trim();
        if task.is_empty() {
            return Err(ListError::Empty);
        }
        if self.tasks.iter().any(|t| t == task) {
            return Err(ListError::Duplicate(task.to_string()));
        }
        self.tasks.push(task.to_string());
        Ok(task.to_string())
    }

    pub fn remove(&mut self, input: &str) -> Result<String, ListError> {
        let task = input.trim();
        let index = self
            .tasks
            .iter()
            .position(|t| t == task)
            .ok_or_else(|| ListError::NotFound(task.to_string()))?;
        Ok(self.tasks.remove(index))
    }
}
