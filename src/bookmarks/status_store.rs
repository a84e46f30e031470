use anyhow::Result;

use super::models::StatusRecord;
use super::sync_events::StoredEvent;

/// Durable storage for bookmark status records.
pub trait StatusStore: Send + Sync {
    /// Returns every stored record, in insertion order.
    fn load(&self) -> Result<Vec<StatusRecord>>;

    /// Returns the stored record for the given event id.
    /// Returns Ok(None) if the event id was never set.
    fn get_value(&self, event_id: &str) -> Result<Option<StatusRecord>>;

    /// Persists a record if it supersedes the stored one (or none is stored).
    /// Returns the appended log event when something was written,
    /// Ok(None) when the record was stale or a duplicate.
    fn save(&self, record: &StatusRecord) -> Result<Option<StoredEvent>>;
}

/// Append-only log of persisted status changes, used to catch up peers that
/// reconnect after being offline.
pub trait StatusEventLog: Send + Sync {
    /// Returns all events with seq greater than `since_seq`, oldest first.
    fn get_events_since(&self, since_seq: i64) -> Result<Vec<StoredEvent>>;

    /// Returns the latest sequence number, or 0 if the log is empty.
    fn get_current_seq(&self) -> Result<i64>;

    /// Returns the oldest sequence number still in the log.
    /// Returns Ok(None) if the log is empty.
    fn get_min_seq(&self) -> Result<Option<i64>>;

    /// Deletes events logged before the given unix timestamp.
    /// Returns the number of events deleted.
    fn prune_events_older_than(&self, before_timestamp: i64) -> Result<u64>;
}

/// Combined trait for a status store carrying its own event log.
pub trait FullStatusStore: StatusStore + StatusEventLog {}

impl<T: StatusStore + StatusEventLog> FullStatusStore for T {}
