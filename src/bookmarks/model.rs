//! The bookmark model facade.
//!
//! A [`BookmarkModel`] is one context's view of the bookmark store: it keeps
//! an in-memory replica that answers reads, writes changes through to the
//! persistent store and exchanges them with the other contexts on its
//! synchronizer.

use std::sync::{Arc, Mutex, Weak};

use anyhow::Result;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::import_export::{format_export, parse_import};
use super::listeners::{ListenerRegistry, Subscription};
use super::models::{ChangeOrigin, ImportSummary, StatusChange, StatusRecord};
use super::replica::{MergeOutcome, StatusReplica};
use super::status_store::FullStatusStore;
use super::sync_events::{BookmarkEvent, StoredEvent, SyncEnvelope};
use crate::sync::{SyncError, Synchronizer};

pub const DEFAULT_YEAR: u16 = 2025;

/// What a reconnecting peer needs to catch up from a given sequence number.
#[derive(Debug, Clone, PartialEq)]
pub enum CatchUp {
    /// Every logged event after the requested sequence number.
    Events(Vec<StoredEvent>),
    /// The log no longer reaches back far enough; full state as of `seq`.
    Snapshot { records: Vec<StatusRecord>, seq: i64 },
}

pub struct BookmarkModel {
    replica_id: String,
    default_year: u16,
    store: Arc<dyn FullStatusStore>,
    synchronizer: Arc<dyn Synchronizer>,
    replica: Mutex<StatusReplica>,
    listeners: Arc<ListenerRegistry>,
}

impl BookmarkModel {
    /// Creates a model with a fresh replica id, seeded from the store.
    pub fn new(
        store: Arc<dyn FullStatusStore>,
        synchronizer: Arc<dyn Synchronizer>,
        default_year: u16,
    ) -> Result<Self> {
        Self::with_replica_id(
            uuid::Uuid::new_v4().to_string(),
            store,
            synchronizer,
            default_year,
        )
    }

    pub fn with_replica_id(
        replica_id: impl Into<String>,
        store: Arc<dyn FullStatusStore>,
        synchronizer: Arc<dyn Synchronizer>,
        default_year: u16,
    ) -> Result<Self> {
        let replica_id = replica_id.into();
        let records = store.load()?;
        debug!(
            "Replica {} starting with {} stored records",
            replica_id,
            records.len()
        );
        Ok(Self {
            replica: Mutex::new(StatusReplica::from_records(replica_id.clone(), records)),
            replica_id,
            default_year,
            store,
            synchronizer,
            listeners: Arc::new(ListenerRegistry::default()),
        })
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    pub fn default_year(&self) -> u16 {
        self.default_year
    }

    /// Returns the flag for the event, false if it was never set.
    pub fn get_status(&self, event_id: &str) -> bool {
        self.replica.lock().unwrap().is_bookmarked(event_id)
    }

    /// Sets the flag for the event.
    ///
    /// Persisting and propagating the change happen before returning, but
    /// their failures are only logged. Writing the current value is a no-op.
    pub fn set_status(&self, event_id: &str, bookmarked: bool) {
        let record = {
            let mut replica = self.replica.lock().unwrap();
            match replica.set_local(event_id, bookmarked) {
                Some(record) => record,
                None if replica.is_bookmarked(event_id) == bookmarked => {
                    debug!("{} already set to {}", event_id, bookmarked);
                    return;
                }
                None => {
                    warn!(
                        "Replica {} clock exhausted, dropping write to {}",
                        self.replica_id, event_id
                    );
                    return;
                }
            }
        };

        let seq = self.persist(&record).map(|stored| stored.seq);
        let envelope = SyncEnvelope::new(
            self.replica_id.clone(),
            BookmarkEvent::StatusChanged { record },
        )
        .with_log_seq(self.replica_id.clone(), seq);
        self.propagate(envelope);

        self.listeners.notify(&StatusChange {
            event_id: event_id.to_string(),
            bookmarked,
            origin: ChangeOrigin::Local,
        });
    }

    /// Registers a callback invoked whenever the event's flag changes, locally
    /// or through synchronization. The callback stays registered as long as
    /// the returned subscription is alive.
    pub fn on_change<F>(&self, event_id: &str, callback: F) -> Subscription
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        self.listeners.register(event_id, Arc::new(callback))
    }

    pub fn export_bookmarked_ids(&self) -> String {
        format_export(self.replica.lock().unwrap().bookmarked_ids())
    }

    /// Bookmarks every event id found in the text. Unrecognized tokens are
    /// skipped.
    pub fn import_from_text(&self, text: &str) -> ImportSummary {
        let parsed = parse_import(text, self.default_year);
        for event_id in &parsed.event_ids {
            self.set_status(event_id, true);
        }
        let summary = ImportSummary {
            accepted: parsed.event_ids.len(),
            ignored: parsed.ignored,
        };
        info!(
            "Imported {} bookmarks, ignored {} tokens",
            summary.accepted, summary.ignored
        );
        summary
    }

    /// Merges changes received from another context.
    ///
    /// Returns true if at least one record was newer than what this replica
    /// held. Listeners are only notified for flags that actually flipped.
    pub fn apply_remote(&self, envelope: &SyncEnvelope) -> bool {
        self.merge_remote(envelope).is_some()
    }

    /// Like [`apply_remote`](Self::apply_remote), then forwards the envelope
    /// to the other contexts on this model's synchronizer when it carried
    /// anything new.
    pub fn relay_remote(&self, envelope: &SyncEnvelope) -> bool {
        match self.merge_remote(envelope) {
            Some(seq) => {
                self.propagate(envelope.clone().with_log_seq(self.replica_id.clone(), seq));
                true
            }
            None => false,
        }
    }

    /// Returns every record held by this replica, in first-write order.
    pub fn snapshot(&self) -> Vec<StatusRecord> {
        self.replica.lock().unwrap().records().to_vec()
    }

    /// Receives every envelope sent on this model's channel from now on,
    /// including the model's own.
    pub fn subscribe_sync(&self) -> broadcast::Receiver<SyncEnvelope> {
        self.synchronizer.subscribe()
    }

    pub fn listener_count(&self, event_id: &str) -> usize {
        self.listeners.count(event_id)
    }

    /// Works out what a peer that has seen the log up to `since` is missing.
    pub fn catch_up(&self, since: i64) -> Result<CatchUp> {
        let current = self.store.get_current_seq()?;
        let reachable = match self.store.get_min_seq()? {
            Some(min_seq) => min_seq <= since.saturating_add(1),
            None => since >= current,
        };
        if since <= current && reachable {
            return Ok(CatchUp::Events(self.store.get_events_since(since)?));
        }
        debug!(
            "Log cannot serve since={} (current {}), sending snapshot",
            since, current
        );
        Ok(CatchUp::Snapshot {
            records: self.store.load()?,
            seq: current,
        })
    }

    /// Deletes logged events older than the given unix timestamp.
    pub fn prune_events_older_than(&self, before_timestamp: i64) -> Result<u64> {
        self.store.prune_events_older_than(before_timestamp)
    }

    /// Re-reads the store and merges anything this replica missed, e.g. after
    /// its sync receiver fell behind.
    pub fn reload_from_store(&self) -> Result<usize> {
        let records = self.store.load()?;
        let changes = self.merge_records(&records);
        let count = changes.len();
        for change in changes {
            self.listeners.notify(&change);
        }
        Ok(count)
    }

    /// Starts applying the envelopes other contexts send on the synchronizer.
    ///
    /// The receiver is subscribed before this returns, so nothing sent after
    /// the call is missed. The task stops once the model is dropped or the
    /// channel closes.
    pub fn spawn_sync_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut receiver = self.synchronizer.subscribe();
        let model: Weak<Self> = Arc::downgrade(self);
        let replica_id = self.replica_id.clone();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => {
                        if envelope.origin == replica_id {
                            continue;
                        }
                        let Some(model) = model.upgrade() else {
                            break;
                        };
                        model.apply_remote(&envelope);
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Replica {} sync receiver lagged by {} messages", replica_id, n);
                        let Some(model) = model.upgrade() else {
                            break;
                        };
                        if let Err(err) = model.reload_from_store() {
                            warn!("Failed to reload bookmarks after lag: {}", err);
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Sync channel closed for replica {}", replica_id);
                        break;
                    }
                }
            }
        })
    }

    /// Merges, persists and notifies. Returns the log seq of the last
    /// persisted record when anything was accepted.
    fn merge_remote(&self, envelope: &SyncEnvelope) -> Option<Option<i64>> {
        if envelope.origin == self.replica_id {
            return None;
        }

        let mut accepted = Vec::new();
        let mut changes = Vec::new();
        {
            let mut replica = self.replica.lock().unwrap();
            for record in envelope.event.records() {
                if !record.stamp.is_valid() {
                    warn!(
                        "Dropping {} from {}: clock {} out of range",
                        record.event_id, envelope.origin, record.stamp.clock
                    );
                    continue;
                }
                let outcome = replica.merge(record.clone());
                if outcome == MergeOutcome::Changed {
                    changes.push(StatusChange {
                        event_id: record.event_id.clone(),
                        bookmarked: record.bookmarked,
                        origin: ChangeOrigin::Remote,
                    });
                }
                if outcome.is_accepted() {
                    accepted.push(record);
                }
            }
        }
        if accepted.is_empty() {
            debug!(
                "Nothing new in {} from {}",
                envelope.event.event_type(),
                envelope.origin
            );
            return None;
        }

        let mut last_seq = None;
        for record in accepted {
            if let Some(stored) = self.persist(record) {
                last_seq = Some(stored.seq);
            }
        }
        for change in changes {
            self.listeners.notify(&change);
        }
        Some(last_seq)
    }

    fn merge_records(&self, records: &[StatusRecord]) -> Vec<StatusChange> {
        let mut replica = self.replica.lock().unwrap();
        records
            .iter()
            .filter(|record| replica.merge((*record).clone()) == MergeOutcome::Changed)
            .map(|record| StatusChange {
                event_id: record.event_id.clone(),
                bookmarked: record.bookmarked,
                origin: ChangeOrigin::Remote,
            })
            .collect()
    }

    fn persist(&self, record: &StatusRecord) -> Option<StoredEvent> {
        match self.store.save(record) {
            Ok(stored) => stored,
            Err(err) => {
                warn!("Failed to persist bookmark {}: {}", record.event_id, err);
                None
            }
        }
    }

    fn propagate(&self, envelope: SyncEnvelope) {
        match self.synchronizer.broadcast(envelope) {
            Ok(receivers) => debug!("Sync message delivered to {} receivers", receivers),
            Err(SyncError::NoListeners(channel)) => {
                debug!("Nobody listening on {}", channel)
            }
        }
    }
}
