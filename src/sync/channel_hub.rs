use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;

use super::{SyncError, Synchronizer};
use crate::bookmarks::SyncEnvelope;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Registry of named in-process broadcast channels.
///
/// Every context that asks for the same name gets a handle on the same
/// channel, the way browser tabs of one origin share a broadcast channel.
pub struct ChannelHub {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<SyncEnvelope>>>,
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ChannelHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a handle on the named channel, creating it on first use.
    pub fn channel(&self, name: &str) -> BroadcastChannel {
        let mut channels = self.channels.lock().unwrap();
        let sender = channels
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Opening sync channel {}", name);
                broadcast::channel(self.capacity).0
            })
            .clone();
        BroadcastChannel {
            name: name.to_string(),
            sender,
        }
    }
}

/// One context's handle on a named channel.
#[derive(Clone)]
pub struct BroadcastChannel {
    name: String,
    sender: broadcast::Sender<SyncEnvelope>,
}

impl Synchronizer for BroadcastChannel {
    fn broadcast(&self, envelope: SyncEnvelope) -> Result<usize, SyncError> {
        self.sender
            .send(envelope)
            .map_err(|_| SyncError::NoListeners(self.name.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<SyncEnvelope> {
        self.sender.subscribe()
    }
}
