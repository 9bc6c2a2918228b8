//! Line-oriented list storage for tasks and blocked sites.
//!
//! Each key maps to one UTF-8 text file, one entry per line.

use crate::AppError;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const TASKS_KEY: &str = "tasks";
pub const BLOCKED_SITES_KEY: &str = "blocked_sites";

pub trait ListStore: Send + Sync {
    /// Load the lines stored under `key`. When nothing usable is stored yet,
    /// `defaults` are persisted and returned instead.
    fn load_lines(&self, key: &str, defaults: &[&str]) -> Result<Vec<String>, AppError>;

    fn save_lines(&self, key: &str, lines: &[String]) -> Result<(), AppError>;
}

enum Stored {
    Found(Vec<String>),
    NotFound,
}

/// Plain-text files under a directory: `<dir>/<key>.txt`.
pub struct FileListStore {
    dir: PathBuf,
}

impl FileListStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.txt"))
    }

    fn read(&self, key: &str) -> Result<Stored, AppError> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Ok(Stored::NotFound);
        }

        let content = fs::read_to_string(&path)?;
        let lines: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Stored::Found(lines))
    }
}

impl ListStore for FileListStore {
    fn load_lines(&self, key: &str, defaults: &[&str]) -> Result<Vec<String>, AppError> {
        match self.read(key)? {
            Stored::Found(lines) if !lines.is_empty() => {
                info!("Loaded {} items from {key}.", lines.len());
                Ok(lines)
            }
            Stored::Found(_) | Stored::NotFound => {
                let lines: Vec<String> = defaults.iter().map(|s| s.to_string()).collect();
                if lines.is_empty() {
                    debug!("{key} is empty and has no defaults");
                    return Ok(lines);
                }
                info!("{key} not found, using/saving default list.");
                if let Err(e) = self.save_lines(key, &lines) {
                    warn!("Could not save default {key}: {e}");
                }
                Ok(lines)
            }
        }
    }

    fn save_lines(&self, key: &str, lines: &[String]) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir)?;
        let mut data = String::new();
        for line in lines {
            data.push_str(line);
            data.push('\n');
        }
        fs::write(self.path_for(key), data)?;
        debug!("Saved {} items to {key}.", lines.len());
        Ok(())
    }
}
