mod context;
mod import_export;
mod in_memory_store;
mod listeners;
mod model;
mod models;
mod replica;
mod sqlite_status_store;
mod status_store;
mod sync_events;

pub use context::{BookmarkContext, StoreSettings, DEFAULT_CHANNEL_NAME, DEFAULT_STORE_ID};
pub use import_export::{format_export, parse_import, ParsedImport};
pub use in_memory_store::InMemoryStatusStore;
pub use listeners::{ChangeCallback, Subscription};
pub use model::{BookmarkModel, CatchUp, DEFAULT_YEAR};
pub use models::{ChangeOrigin, ImportSummary, Stamp, StatusChange, StatusRecord, MAX_CLOCK};
pub use replica::{MergeOutcome, StatusReplica};
pub use sqlite_status_store::SqliteStatusStore;
pub use status_store::{FullStatusStore, StatusEventLog, StatusStore};
pub use sync_events::{BookmarkEvent, StoredEvent, SyncEnvelope};
