//! Append-only, timestamped activity log kept per build environment
//!
//! Entries are mirrored to `tracing` so the process log and the log returned
//! to the caller stay in step.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// One log line
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Shared handle to an environment's activity log. Clones append to the same log.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn record(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.entries.lock().push(LogEntry {
            at: Utc::now(),
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every entry so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Render the whole log, one timestamped line per entry
    pub fn render(&self) -> String {
        let entries = self.entries.lock();
        let mut out = String::new();
        for entry in entries.iter() {
            out.push_str(&entry.at.format(TIMESTAMP_FORMAT).to_string());
            out.push(' ');
            out.push_str(&entry.message);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let log = ActivityLog::new();
        let other = log.clone();
        log.record("first");
        other.record("second");

        let messages: Vec<String> = log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, ["first", "second"]);
    }

    #[test]
    fn render_is_timestamped_and_ordered() {
        let log = ActivityLog::new();
        log.record("exec [/tmp] git fetch");
        log.record("done");

        let rendered = log.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" exec [/tmp] git fetch"));
        // "YYYY/MM/DD HH:MM:SS " prefix
        assert_eq!(&lines[0][4..5], "/");
        assert_eq!(&lines[0][19..20], " ");
    }

    #[test]
    fn entries_are_monotonic() {
        let log = ActivityLog::new();
        for i in 0..5 {
            log.record(format!("step {i}"));
        }
        let entries = log.entries();
        assert!(entries.windows(2).all(|w| w[0].at <= w[1].at));
    }
}
