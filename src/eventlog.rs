//! Plain-text lifecycle log: one timestamped line per join, leave and
//! interrupted username entry.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::Local;
use tracing::warn;

use crate::protocol;

#[derive(Clone, Debug, Default)]
pub struct EventLog {
    path: Option<PathBuf>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Appends `[DD/MM/YYYY HH:MM:SS] <event>`. The file is opened for each
    /// event; failures are reported through tracing and otherwise ignored.
    pub fn record(&self, event: &str) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        if let Err(err) = append_line(path, event) {
            warn!(path = %path.display(), error = %err, "could not write event log");
        }
    }

    pub fn joined(&self, username: &str) {
        self.record(&format!("{} joined the chat", username));
    }

    pub fn left(&self, username: &str) {
        self.record(&format!("{} disconnected", username));
    }

    pub fn username_interrupted(&self, peer: &str) {
        self.record(&format!(
            "connection {} closed during username entry",
            peer
        ));
    }
}

fn append_line(path: &Path, event: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "[{}] {}", protocol::timestamp(&Local::now()), event)
}
