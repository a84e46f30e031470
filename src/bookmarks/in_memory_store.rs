//! Non-persisted status store.
//!
//! Used in tests and as the fallback when the durable store cannot be opened.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use super::models::StatusRecord;
use super::status_store::{StatusEventLog, StatusStore};
use super::sync_events::{BookmarkEvent, StoredEvent};

#[derive(Default)]
struct Inner {
    records: Vec<StatusRecord>,
    index: HashMap<String, usize>,
    events: Vec<StoredEvent>,
    next_seq: i64,
}

#[derive(Default)]
pub struct InMemoryStatusStore {
    inner: Mutex<Inner>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl StatusStore for InMemoryStatusStore {
    fn load(&self) -> Result<Vec<StatusRecord>> {
        Ok(self.inner.lock().unwrap().records.clone())
    }

    fn get_value(&self, event_id: &str) -> Result<Option<StatusRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .index
            .get(event_id)
            .map(|position| inner.records[*position].clone()))
    }

    fn save(&self, record: &StatusRecord) -> Result<Option<StoredEvent>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.index.get(&record.event_id).copied() {
            Some(position) => {
                if !record.supersedes(&inner.records[position]) {
                    return Ok(None);
                }
                inner.records[position] = record.clone();
            }
            None => {
                let position = inner.records.len();
                inner.records.push(record.clone());
                inner.index.insert(record.event_id.clone(), position);
            }
        }

        inner.next_seq += 1;
        let stored = StoredEvent {
            seq: inner.next_seq,
            event: BookmarkEvent::StatusChanged {
                record: record.clone(),
            },
            server_timestamp: now_secs(),
        };
        inner.events.push(stored.clone());
        Ok(Some(stored))
    }
}

impl StatusEventLog for InMemoryStatusStore {
    fn get_events_since(&self, since_seq: i64) -> Result<Vec<StoredEvent>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.seq > since_seq)
            .cloned()
            .collect())
    }

    fn get_current_seq(&self) -> Result<i64> {
        Ok(self.inner.lock().unwrap().next_seq)
    }

    fn get_min_seq(&self) -> Result<Option<i64>> {
        Ok(self.inner.lock().unwrap().events.first().map(|e| e.seq))
    }

    fn prune_events_older_than(&self, before_timestamp: i64) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.events.len();
        inner
            .events
            .retain(|e| e.server_timestamp >= before_timestamp);
        Ok((before - inner.events.len()) as u64)
    }
}
