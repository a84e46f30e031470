//! In-memory replica of one context's bookmark state.
//!
//! Every context owns a replica and merges the records it receives from its
//! peers with last-writer-wins on the record stamp.

use std::collections::HashMap;

use super::models::{Stamp, StatusRecord, MAX_CLOCK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Older than, or identical to, the record already held.
    Stale,
    /// Accepted, but the flag reads the same as before.
    Restamped,
    /// Accepted and the flag flipped.
    Changed,
}

impl MergeOutcome {
    pub fn is_accepted(&self) -> bool {
        *self != MergeOutcome::Stale
    }
}

pub struct StatusReplica {
    replica_id: String,
    records: Vec<StatusRecord>,
    index: HashMap<String, usize>,
    clock: u64,
}

impl StatusReplica {
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            records: Vec::new(),
            index: HashMap::new(),
            clock: 0,
        }
    }

    /// Builds a replica from previously persisted records.
    pub fn from_records(
        replica_id: impl Into<String>,
        records: impl IntoIterator<Item = StatusRecord>,
    ) -> Self {
        let mut replica = Self::new(replica_id);
        for record in records {
            replica.merge(record);
        }
        replica
    }

    pub fn get(&self, event_id: &str) -> Option<&StatusRecord> {
        self.index
            .get(event_id)
            .map(|position| &self.records[*position])
    }

    pub fn is_bookmarked(&self, event_id: &str) -> bool {
        self.get(event_id).map(|r| r.bookmarked).unwrap_or(false)
    }

    /// Records a local write.
    ///
    /// Returns the stamped record to persist and broadcast, or None if the
    /// value is already the current one or the clock is exhausted.
    pub fn set_local(&mut self, event_id: &str, bookmarked: bool) -> Option<StatusRecord> {
        // An absent key already reads as false
        if self.is_bookmarked(event_id) == bookmarked {
            return None;
        }

        let clock = self.clock.checked_add(1).filter(|c| *c <= MAX_CLOCK)?;
        self.clock = clock;
        let record = StatusRecord {
            event_id: event_id.to_string(),
            bookmarked,
            stamp: Stamp::new(clock, self.replica_id.clone()),
        };
        self.put(record.clone());
        Some(record)
    }

    /// Merges a record from another context.
    ///
    /// Stale and duplicate records are dropped, as are records whose clock
    /// is out of range.
    pub fn merge(&mut self, record: StatusRecord) -> MergeOutcome {
        if !record.stamp.is_valid() {
            return MergeOutcome::Stale;
        }
        self.clock = self.clock.max(record.stamp.clock);
        let previous = match self.get(&record.event_id) {
            Some(current) if !record.supersedes(current) => return MergeOutcome::Stale,
            Some(current) => current.bookmarked,
            None => false,
        };
        let outcome = if previous != record.bookmarked {
            MergeOutcome::Changed
        } else {
            MergeOutcome::Restamped
        };
        self.put(record);
        outcome
    }

    /// All records, in first-write order.
    pub fn records(&self) -> &[StatusRecord] {
        &self.records
    }

    pub fn bookmarked_ids(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|r| r.bookmarked)
            .map(|r| r.event_id.as_str())
    }

    fn put(&mut self, record: StatusRecord) {
        match self.index.get(&record.event_id) {
            Some(position) => self.records[*position] = record,
            None => {
                self.index
                    .insert(record.event_id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(event_id: &str, bookmarked: bool, clock: u64, replica: &str) -> StatusRecord {
        StatusRecord {
            event_id: event_id.to_string(),
            bookmarked,
            stamp: Stamp::new(clock, replica),
        }
    }

    #[test]
    fn absent_key_reads_false() {
        let replica = StatusReplica::new("a");
        assert!(!replica.is_bookmarked("2025-1"));
        assert!(replica.get("2025-1").is_none());
    }

    #[test]
    fn local_writes_advance_the_clock() {
        let mut replica = StatusReplica::new("a");
        let first = replica.set_local("2025-1", true).unwrap();
        let second = replica.set_local("2025-1", false).unwrap();
        assert_eq!(first.stamp, Stamp::new(1, "a"));
        assert_eq!(second.stamp, Stamp::new(2, "a"));
        assert!(!replica.is_bookmarked("2025-1"));
    }

    #[test]
    fn equal_writes_are_noops() {
        let mut replica = StatusReplica::new("a");
        assert!(replica.set_local("2025-1", false).is_none());
        assert!(replica.set_local("2025-1", true).is_some());
        assert!(replica.set_local("2025-1", true).is_none());
    }

    #[test]
    fn merge_applies_newer_and_drops_stale() {
        let mut replica = StatusReplica::new("a");
        assert_eq!(
            replica.merge(remote("2025-1", true, 3, "b")),
            MergeOutcome::Changed
        );
        assert_eq!(
            replica.merge(remote("2025-1", false, 2, "b")),
            MergeOutcome::Stale
        );
        assert_eq!(
            replica.merge(remote("2025-1", true, 3, "b")),
            MergeOutcome::Stale
        );
        assert!(replica.is_bookmarked("2025-1"));

        // A local write after a merge must win over what was merged
        let record = replica.set_local("2025-1", false).unwrap();
        assert_eq!(record.stamp.clock, 4);
    }

    #[test]
    fn merge_breaks_ties_on_replica_id() {
        let from_a = remote("2025-5", true, 4, "a");
        let from_b = remote("2025-5", false, 4, "b");

        let mut left = StatusReplica::new("left");
        let mut right = StatusReplica::new("right");
        left.merge(from_a.clone());
        right.merge(from_b.clone());

        assert_eq!(left.merge(from_b), MergeOutcome::Changed);
        assert_eq!(right.merge(from_a), MergeOutcome::Stale);
        assert!(!left.is_bookmarked("2025-5"));
        assert!(!right.is_bookmarked("2025-5"));
        assert_eq!(left.get("2025-5"), right.get("2025-5"));
    }

    #[test]
    fn out_of_range_clock_is_rejected() {
        let mut replica = StatusReplica::new("a");
        assert_eq!(
            replica.merge(remote("2025-1", true, u64::MAX, "b")),
            MergeOutcome::Stale
        );
        assert!(!replica.is_bookmarked("2025-1"));

        let record = replica.set_local("2025-1", true).unwrap();
        assert_eq!(record.stamp.clock, 1);
    }

    #[test]
    fn exhausted_clock_declines_local_writes() {
        let mut replica = StatusReplica::new("a");
        assert_eq!(
            replica.merge(remote("2025-1", true, MAX_CLOCK, "b")),
            MergeOutcome::Changed
        );
        assert!(replica.set_local("2025-2", true).is_none());
        assert!(!replica.is_bookmarked("2025-2"));
    }

    #[test]
    fn merge_with_same_value_only_restamps() {
        let mut replica = StatusReplica::new("a");
        replica.set_local("2025-1", true);
        assert_eq!(
            replica.merge(remote("2025-1", true, 9, "b")),
            MergeOutcome::Restamped
        );
        assert_eq!(replica.get("2025-1").unwrap().stamp, Stamp::new(9, "b"));
    }

    #[test]
    fn bookmarked_ids_keep_first_write_order() {
        let mut replica = StatusReplica::new("a");
        replica.set_local("2025-9", true);
        replica.set_local("2025-2", true);
        replica.set_local("2025-3", true);
        replica.set_local("2025-2", false);
        replica.set_local("2025-9", false);
        replica.set_local("2025-9", true);
        assert_eq!(
            replica.bookmarked_ids().collect::<Vec<_>>(),
            vec!["2025-9", "2025-3"]
        );
    }
}
