use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;

/// Entries kept before the oldest are dropped.
const MAX_ENTRIES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Sent,
    Received,
    Error,
    Info,
}

#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    pub message: String,
    /// Peer name for link traffic, empty otherwise
    pub peer: String,
    pub timestamp: DateTime<Local>,
}

impl ActivityEntry {
    /// Local `HH:MM:SS` of the entry.
    pub fn time_of_day(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

impl fmt::Display for ActivityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = match self.kind {
            ActivityKind::Sent => "->",
            ActivityKind::Received => "<-",
            ActivityKind::Error => "!",
            ActivityKind::Info => "i",
        };
        write!(f, "[{}] {} {}", self.time_of_day(), icon, self.message)?;
        if !self.peer.is_empty() {
            write!(f, " (from: {})", self.peer)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityStats {
    pub total: usize,
    pub sent: usize,
    pub received: usize,
    pub errors: usize,
    pub info: usize,
}

impl fmt::Display for ActivityStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Sent: {} | Received: {} | Errors: {} | Info: {}",
            self.total, self.sent, self.received, self.errors, self.info
        )
    }
}

/// Newest-first record of link activity shown to the user.
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    stats: ActivityStats,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: ActivityKind, message: impl Into<String>, peer: &str) {
        match kind {
            ActivityKind::Sent => self.stats.sent += 1,
            ActivityKind::Received => self.stats.received += 1,
            ActivityKind::Error => self.stats.errors += 1,
            ActivityKind::Info => self.stats.info += 1,
        }
        self.stats.total += 1;

        self.entries.push_front(ActivityEntry {
            kind,
            message: message.into(),
            peer: peer.to_string(),
            timestamp: Local::now(),
        });
        self.entries.truncate(MAX_ENTRIES);
    }

    pub fn entries(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    /// Counters over everything recorded since the last clear.
    pub fn stats(&self) -> ActivityStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats = ActivityStats::default();
    }
}
