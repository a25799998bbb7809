//! Single-line editor state for the interactive console.
//!
//! Pure state plus edit operations; the console drives it with key events
//! and renders the result. History navigation works over a caller-provided
//! slice so the editor stays free of persistence concerns.

use std::io;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// Puts the terminal in raw mode for the lifetime of the guard.
///
/// Cooked mode comes back on drop, so early returns and panics cannot
/// leave the shell unusable.
pub(crate) struct RawModeGuard;

impl RawModeGuard {
    pub(crate) fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Editing state for one input line.
#[derive(Debug, Default)]
pub(crate) struct LineEditor {
    buffer: String,
    /// Byte offset of the cursor within `buffer`, always a char boundary.
    cursor: usize,
    /// Position while browsing history, indexing into the entries slice;
    /// `None` while editing a fresh line.
    nav: Option<usize>,
    /// The in-progress line stashed while browsing history.
    saved: String,
}

impl LineEditor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn buffer(&self) -> &str {
        &self.buffer
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Column the cursor occupies, in characters, saturating at the edge
    /// of the terminal coordinate range.
    pub(crate) fn cursor_column(&self) -> u16 {
        let column = self.buffer[..self.cursor].chars().count();
        u16::try_from(column).unwrap_or(u16::MAX)
    }

    /// Hand over the finished line and reset for the next one.
    pub(crate) fn take(&mut self) -> String {
        self.cursor = 0;
        self.nav = None;
        std::mem::take(&mut self.buffer)
    }

    pub(crate) fn insert(&mut self, c: char) {
        self.buffer.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    pub(crate) fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let prev = prev_boundary(&self.buffer, self.cursor);
        self.buffer.replace_range(prev..self.cursor, "");
        self.cursor = prev;
    }

    pub(crate) fn delete(&mut self) {
        if self.cursor >= self.buffer.len() {
            return;
        }
        let next = next_boundary(&self.buffer, self.cursor);
        self.buffer.replace_range(self.cursor..next, "");
    }

    pub(crate) fn move_left(&mut self) {
        if self.cursor > 0 {
            self.cursor = prev_boundary(&self.buffer, self.cursor);
        }
    }

    pub(crate) fn move_right(&mut self) {
        if self.cursor < self.buffer.len() {
            self.cursor = next_boundary(&self.buffer, self.cursor);
        }
    }

    pub(crate) fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub(crate) fn move_end(&mut self) {
        self.cursor = self.buffer.len();
    }

    pub(crate) fn kill_to_start(&mut self) {
        self.buffer.replace_range(..self.cursor, "");
        self.cursor = 0;
    }

    pub(crate) fn kill_to_end(&mut self) {
        self.buffer.truncate(self.cursor);
    }

    /// Delete back to the start of the previous word.
    pub(crate) fn kill_word_back(&mut self) {
        let mut idx = self.cursor;
        while idx > 0 && self.buffer[..idx].ends_with(char::is_whitespace) {
            idx = prev_boundary(&self.buffer, idx);
        }
        while idx > 0 && !self.buffer[..idx].ends_with(char::is_whitespace) {
            idx = prev_boundary(&self.buffer, idx);
        }
        self.buffer.replace_range(idx..self.cursor, "");
        self.cursor = idx;
    }

    /// Step back through history, stashing the current draft first.
    pub(crate) fn history_up(&mut self, entries: &[String]) {
        let next = match self.nav {
            None if entries.is_empty() => return,
            None => {
                self.saved = self.buffer.clone();
                entries.len() - 1
            }
            Some(0) => return,
            Some(i) => i - 1,
        };
        self.nav = Some(next);
        self.buffer = entries[next].clone();
        self.cursor = self.buffer.len();
    }

    /// Step forward through history, restoring the draft past the newest
    /// entry.
    pub(crate) fn history_down(&mut self, entries: &[String]) {
        match self.nav {
            None => {}
            Some(i) if i + 1 < entries.len() => {
                self.nav = Some(i + 1);
                self.buffer = entries[i + 1].clone();
                self.cursor = self.buffer.len();
            }
            Some(_) => {
                self.nav = None;
                self.buffer = std::mem::take(&mut self.saved);
                self.cursor = self.buffer.len();
            }
        }
    }

    /// The word being completed: the text before the cursor while the
    /// cursor is still inside the first word, `None` once arguments have
    /// started.
    pub(crate) fn completion_prefix(&self) -> Option<String> {
        let before = &self.buffer[..self.cursor];
        if before.contains(char::is_whitespace) {
            return None;
        }
        Some(before.to_string())
    }

    /// Replace the first word with a completed command name.
    pub(crate) fn accept_completion(&mut self, name: &str) {
        match self.buffer.find(char::is_whitespace) {
            Some(idx) => {
                let rest = self.buffer[idx..].to_string();
                self.buffer = format!("{}{}", name, rest);
                self.cursor = name.len();
            }
            None => {
                self.buffer = format!("{} ", name);
                self.cursor = self.buffer.len();
            }
        }
    }
}

fn prev_boundary(s: &str, idx: usize) -> usize {
    let mut idx = idx - 1;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn next_boundary(s: &str, idx: usize) -> usize {
    let mut idx = idx + 1;
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
