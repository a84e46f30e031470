//! Sync event types for cross-context synchronization.
//!
//! These are the messages relayed between browser contexts (tabs, devices)
//! sharing the same bookmark store, and the entries of the persisted event log.

use serde::{Deserialize, Serialize};

use super::models::StatusRecord;

/// Events exchanged between contexts.
///
/// Serialized using serde's adjacently tagged representation:
/// `{"type": "event_name", "payload": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum BookmarkEvent {
    #[serde(rename = "status_changed")]
    StatusChanged { record: StatusRecord },

    /// Full state, sent when a peer is too far behind for the event log.
    #[serde(rename = "snapshot")]
    Snapshot { records: Vec<StatusRecord> },
}

impl BookmarkEvent {
    /// Get the event type string for database storage.
    pub fn event_type(&self) -> &'static str {
        match self {
            BookmarkEvent::StatusChanged { .. } => "status_changed",
            BookmarkEvent::Snapshot { .. } => "snapshot",
        }
    }

    /// The records carried by this event.
    pub fn records(&self) -> &[StatusRecord] {
        match self {
            BookmarkEvent::StatusChanged { record } => std::slice::from_ref(record),
            BookmarkEvent::Snapshot { records } => records,
        }
    }
}

/// An event as it travels over a sync channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncEnvelope {
    /// Replica id of the context that produced the change.
    pub origin: String,
    /// Sequence number in the relaying store's event log, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
    /// Replica id of the context whose event log `seq` belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,
    pub event: BookmarkEvent,
}

impl SyncEnvelope {
    pub fn new(origin: impl Into<String>, event: BookmarkEvent) -> Self {
        Self {
            origin: origin.into(),
            seq: None,
            log_id: None,
            event,
        }
    }

    /// Tags the envelope with its position in `log_id`'s event log. A missing
    /// seq clears both fields.
    pub fn with_log_seq(mut self, log_id: impl Into<String>, seq: Option<i64>) -> Self {
        self.log_id = seq.map(|_| log_id.into());
        self.seq = seq;
        self
    }

    /// The seq, if it was assigned by the event log of `log_id`.
    pub fn seq_in_log(&self, log_id: &str) -> Option<i64> {
        match &self.log_id {
            Some(id) if id == log_id => self.seq,
            _ => None,
        }
    }
}

/// An event stored in the event log with its sequence number and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredEvent {
    pub seq: i64,
    #[serde(flatten)]
    pub event: BookmarkEvent,
    pub server_timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::models::Stamp;

    fn record(event_id: &str, bookmarked: bool) -> StatusRecord {
        StatusRecord {
            event_id: event_id.to_string(),
            bookmarked,
            stamp: Stamp::new(7, "replica-a"),
        }
    }

    #[test]
    fn test_status_changed_serialization() {
        let event = BookmarkEvent::StatusChanged {
            record: record("2025-10", true),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"status_changed\""));
        assert!(json.contains("2025-10"));
        assert!(json.contains("replica-a"));

        let parsed: BookmarkEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_envelope_omits_missing_seq() {
        let envelope = SyncEnvelope::new(
            "tab-1",
            BookmarkEvent::StatusChanged {
                record: record("2025-3", false),
            },
        );
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("seq"));

        let json = serde_json::to_string(&envelope.clone().with_log_seq("server", Some(12)))
            .unwrap();
        assert!(json.contains("\"seq\":12"));
        assert!(json.contains("\"log_id\":\"server\""));
    }

    #[test]
    fn test_seq_only_counts_in_its_own_log() {
        let envelope = SyncEnvelope::new(
            "tab-1",
            BookmarkEvent::StatusChanged {
                record: record("2025-3", true),
            },
        )
        .with_log_seq("tab-1", Some(4));
        assert_eq!(envelope.seq_in_log("tab-1"), Some(4));
        assert_eq!(envelope.seq_in_log("server"), None);

        let unlogged = envelope.with_log_seq("server", None);
        assert_eq!(unlogged.log_id, None);
        assert_eq!(unlogged.seq_in_log("server"), None);
    }

    #[test]
    fn test_envelope_parses_client_json() {
        let json = r#"{
            "origin": "phone",
            "event": {
                "type": "status_changed",
                "payload": {
                    "record": {
                        "event_id": "2024-5",
                        "bookmarked": true,
                        "stamp": {"clock": 3, "replica_id": "phone"}
                    }
                }
            }
        }"#;
        let envelope: SyncEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.origin, "phone");
        assert_eq!(envelope.seq, None);
        assert_eq!(envelope.event.records().len(), 1);
        assert_eq!(envelope.event.records()[0].event_id, "2024-5");
    }

    #[test]
    fn test_stored_event_serialization() {
        let stored = StoredEvent {
            seq: 42,
            event: BookmarkEvent::StatusChanged {
                record: record("2025-1", true),
            },
            server_timestamp: 1738400000,
        };
        let json = serde_json::to_string(&stored).unwrap();
        assert!(json.contains("\"seq\":42"));
        assert!(json.contains("status_changed"));
        assert!(json.contains("1738400000"));

        let parsed: StoredEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(stored, parsed);
    }

    #[test]
    fn test_event_type_method() {
        assert_eq!(
            BookmarkEvent::StatusChanged {
                record: record("x", true)
            }
            .event_type(),
            "status_changed"
        );
        assert_eq!(
            BookmarkEvent::Snapshot { records: vec![] }.event_type(),
            "snapshot"
        );
    }
}
