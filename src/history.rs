use std::{
    collections::VecDeque,
    io::{self, Write},
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Local};

use crate::protocol;

/// A relayed message as it was when broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLine {
    pub at: DateTime<Local>,
    pub text: String,
}

impl HistoryLine {
    /// `[DD/MM/YYYY HH:MM:SS] <text>`
    pub fn render(&self) -> String {
        format!("[{}]{}", protocol::timestamp(&self.at), self.text)
    }
}

/// Append-only log of everything broadcast, replayed to newcomers.
///
/// Unbounded unless a limit is given, in which case the oldest lines are
/// dropped first.
pub struct History {
    lines: Mutex<VecDeque<HistoryLine>>,
    limit: Option<usize>,
}

impl History {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            limit,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HistoryLine>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stamps `text` with the current time and appends it, then runs `then`
    /// before the history lock is released. The text is stored with a leading
    /// space so the rendered line reads `[stamp] text`.
    pub fn append_with<T>(&self, text: &str, then: impl FnOnce() -> T) -> T {
        let mut lines = self.lock();
        lines.push_back(HistoryLine {
            at: Local::now(),
            text: format!(" {}", text),
        });
        if let Some(limit) = self.limit {
            while lines.len() > limit {
                lines.pop_front();
            }
        }
        then()
    }

    #[cfg(test)]
    pub(crate) fn append(&self, text: &str) {
        self.append_with(text, || ())
    }

    /// Runs `f` over the retained lines with no append able to slip in.
    pub fn with_lines<T>(&self, f: impl FnOnce(&VecDeque<HistoryLine>) -> T) -> T {
        f(&self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn lines(&self) -> Vec<HistoryLine> {
        self.lock().iter().cloned().collect()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Writes `lines` oldest first as `[stamp] text` and flushes.
pub fn write_replay<W: Write + ?Sized>(lines: &[HistoryLine], writer: &mut W) -> io::Result<usize> {
    for line in lines {
        writer.write_all(line.render().as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(lines.len())
}
