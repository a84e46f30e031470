//! Cross-context synchronization.
//!
//! Contexts sharing a bookmark store exchange [`SyncEnvelope`]s over named
//! broadcast channels.
//!
//! [`SyncEnvelope`]: crate::bookmarks::SyncEnvelope

mod channel_hub;
mod synchronizer;

pub use channel_hub::{BroadcastChannel, ChannelHub, DEFAULT_CHANNEL_CAPACITY};
pub use synchronizer::{NoOpSynchronizer, SyncError, Synchronizer};
#[cfg(feature = "mock")]
pub use synchronizer::MockSynchronizer;
