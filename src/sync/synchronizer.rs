use thiserror::Error;
use tokio::sync::broadcast;

use crate::bookmarks::SyncEnvelope;

/// Errors that can occur while propagating a change to other contexts.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No context is listening on channel {0}")]
    NoListeners(String),
}

/// Propagates local changes to the other contexts sharing a store, and
/// delivers theirs.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait Synchronizer: Send + Sync {
    /// Sends an envelope to every subscriber of the channel, the sender's own
    /// subscription included.
    /// Returns the number of subscribers that received it.
    fn broadcast(&self, envelope: SyncEnvelope) -> Result<usize, SyncError>;

    /// Starts receiving envelopes sent after this call.
    fn subscribe(&self) -> broadcast::Receiver<SyncEnvelope>;
}

/// Synchronizer for a context that shares its store with nobody.
pub struct NoOpSynchronizer {
    // Never sent on; kept alive so that receivers park instead of closing
    sender: broadcast::Sender<SyncEnvelope>,
}

impl Default for NoOpSynchronizer {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }
}

impl Synchronizer for NoOpSynchronizer {
    fn broadcast(&self, _envelope: SyncEnvelope) -> Result<usize, SyncError> {
        Ok(0)
    }

    fn subscribe(&self) -> broadcast::Receiver<SyncEnvelope> {
        self.sender.subscribe()
    }
}
