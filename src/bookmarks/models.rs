//! Bookmark data models.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Largest clock a stamp may carry. Clocks are stored as signed SQLite
/// integers.
pub const MAX_CLOCK: u64 = i64::MAX as u64;

/// Logical write stamp attached to every status record.
///
/// Stamps are totally ordered by `clock` first and `replica_id` second, so
/// two contexts that write the same key concurrently still agree on a winner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub clock: u64,
    pub replica_id: String,
}

impl Stamp {
    pub fn new(clock: u64, replica_id: impl Into<String>) -> Self {
        Self {
            clock,
            replica_id: replica_id.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.clock <= MAX_CLOCK
    }
}

impl Ord for Stamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.clock
            .cmp(&other.clock)
            .then_with(|| self.replica_id.cmp(&other.replica_id))
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The bookmarked flag of one schedule event, as stored and replicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub event_id: String,
    pub bookmarked: bool,
    pub stamp: Stamp,
}

impl StatusRecord {
    /// Returns true if this record wins over `other` under last-writer-wins.
    pub fn supersedes(&self, other: &StatusRecord) -> bool {
        self.stamp > other.stamp
    }
}

/// Where a status change came from, from the point of view of the context
/// observing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    Local,
    Remote,
}

/// Notification delivered to `on_change` listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub event_id: String,
    pub bookmarked: bool,
    pub origin: ChangeOrigin,
}

/// Result of importing a text blob of event ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Tokens that matched one of the accepted id forms.
    pub accepted: usize,
    /// Tokens that were dropped.
    pub ignored: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(clock: u64, replica: &str, bookmarked: bool) -> StatusRecord {
        StatusRecord {
            event_id: "2025-1".to_string(),
            bookmarked,
            stamp: Stamp::new(clock, replica),
        }
    }

    #[test]
    fn higher_clock_wins() {
        assert!(record(2, "a", false).supersedes(&record(1, "b", true)));
        assert!(!record(1, "b", true).supersedes(&record(2, "a", false)));
    }

    #[test]
    fn replica_id_breaks_ties() {
        assert!(record(3, "b", true).supersedes(&record(3, "a", false)));
        assert!(!record(3, "a", false).supersedes(&record(3, "b", true)));
    }

    #[test]
    fn clocks_past_sqlite_range_are_invalid() {
        assert!(Stamp::new(MAX_CLOCK, "a").is_valid());
        assert!(!Stamp::new(MAX_CLOCK + 1, "a").is_valid());
        assert!(!Stamp::new(u64::MAX, "a").is_valid());
    }

    #[test]
    fn identical_record_does_not_supersede_itself() {
        let r = record(5, "a", true);
        assert!(!r.supersedes(&r.clone()));
    }
}
