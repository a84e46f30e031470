//! Schedule bookmarks library
//!
//! Bookmark state for conference schedule pages: persisted per store,
//! synchronized between contexts sharing a channel, and bound to the
//! bookmark toggles of a page.

pub mod binder;
pub mod bookmarks;
pub mod config;
pub mod server;
pub mod sqlite_persistence;
pub mod sync;

// Re-export commonly used types for convenience
pub use bookmarks::{BookmarkContext, BookmarkModel, StoreSettings};
pub use server::{run_server, RequestsLoggingLevel};
pub use sync::ChannelHub;
