//! Command history for the interactive console, persisted across sessions.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::debug;

/// Upper bound on persisted entries; the oldest are dropped first.
const MAX_ENTRIES: usize = 1000;

/// File name under the user's home directory.
const HISTORY_FILE: &str = ".liqshell_history";

/// Command history backed by a plain text file, one entry per line.
///
/// Loading tolerates a missing file and saving tolerates a missing home
/// directory; history is a convenience, never a reason to fail a session.
#[derive(Debug, Default)]
pub struct History {
    path: Option<PathBuf>,
    entries: Vec<String>,
}

impl History {
    /// In-memory history with no backing file.
    pub fn ephemeral() -> Self {
        Self::default()
    }

    /// History backed by `path`, loading any existing entries.
    pub fn load(path: PathBuf) -> Self {
        let entries = match fs::read_to_string(&path) {
            Ok(text) => text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                debug!("could not read history {}: {}", path.display(), err);
                Vec::new()
            }
        };
        Self {
            path: Some(path),
            entries,
        }
    }

    /// The default per-user history location, if a home directory exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(HISTORY_FILE))
    }

    /// Record one submitted command.
    ///
    /// Blank input and immediate repeats are skipped, matching the usual
    /// readline behavior.
    pub fn push(&mut self, entry: &str) {
        let entry = entry.trim();
        if entry.is_empty() || self.entries.last().is_some_and(|last| last == entry) {
            return;
        }
        self.entries.push(entry.to_string());
        if self.entries.len() > MAX_ENTRIES {
            let excess = self.entries.len() - MAX_ENTRIES;
            self.entries.drain(..excess);
        }
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Write the entries back to the backing file, if any.
    pub fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let text = if self.entries.is_empty() {
            String::new()
        } else {
            self.entries.join("\n") + "\n"
        };
        if let Err(err) = fs::write(path, text) {
            debug!("could not write history {}: {}", path.display(), err);
        }
    }
}
