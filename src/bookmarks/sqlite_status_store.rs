use crate::sqlite_column;
use crate::sqlite_persistence::{
    open_versioned, Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::debug;

use super::models::{Stamp, StatusRecord};
use super::status_store::{StatusEventLog, StatusStore};
use super::sync_events::{BookmarkEvent, StoredEvent};

/// V 0
const BOOKMARK_STATUS_TABLE_V_0: Table = Table {
    name: "bookmark_status",
    columns: &[
        sqlite_column!(
            "event_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("bookmarked", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
};

/// V 1
const BOOKMARK_STATUS_TABLE_V_1: Table = Table {
    name: "bookmark_status",
    columns: &[
        sqlite_column!(
            "event_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("bookmarked", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "clock",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "replica_id",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
    ],
    indices: &[],
};
const BOOKMARK_EVENT_TABLE_V_1: Table = Table {
    name: "bookmark_event",
    columns: &[
        sqlite_column!(
            "seq",
            &SqlType::Integer,
            is_primary_key = true,
            is_autoincrement = true
        ),
        sqlite_column!("event_type", &SqlType::Text, non_null = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_bookmark_event_created", "created")],
};

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[BOOKMARK_STATUS_TABLE_V_0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[BOOKMARK_STATUS_TABLE_V_1, BOOKMARK_EVENT_TABLE_V_1],
        migration: Some(|conn: &Connection| {
            // Pre-sync rows get clock 0 so that any replicated write wins over them
            conn.execute(
                "ALTER TABLE bookmark_status ADD COLUMN clock INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
            conn.execute(
                "ALTER TABLE bookmark_status ADD COLUMN replica_id TEXT NOT NULL DEFAULT ''",
                [],
            )?;
            BOOKMARK_EVENT_TABLE_V_1.create(conn)?;
            Ok(())
        }),
    },
];

#[derive(Clone)]
pub struct SqliteStatusStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStatusStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = open_versioned(db_path, VERSIONED_SCHEMAS)
            .with_context(|| format!("Failed to open bookmark store at {:?}", db_path))?;
        Ok(SqliteStatusStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn record_from_row(row: &rusqlite::Row) -> rusqlite::Result<StatusRecord> {
    Ok(StatusRecord {
        event_id: row.get(0)?,
        bookmarked: row.get::<_, i64>(1)? != 0,
        stamp: Stamp {
            clock: row.get::<_, i64>(2)? as u64,
            replica_id: row.get(3)?,
        },
    })
}

impl StatusStore for SqliteStatusStore {
    fn load(&self) -> Result<Vec<StatusRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT event_id, bookmarked, clock, replica_id FROM bookmark_status ORDER BY rowid",
        )?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn get_value(&self, event_id: &str) -> Result<Option<StatusRecord>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT event_id, bookmarked, clock, replica_id FROM bookmark_status WHERE event_id = ?1",
                params![event_id],
                record_from_row,
            )
            .optional()?)
    }

    fn save(&self, record: &StatusRecord) -> Result<Option<StoredEvent>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        // Last-writer-wins: the conflicting row is only replaced by a strictly newer stamp
        let changed = tx.execute(
            "INSERT INTO bookmark_status (event_id, bookmarked, clock, replica_id) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(event_id) DO UPDATE SET
                bookmarked = excluded.bookmarked,
                clock = excluded.clock,
                replica_id = excluded.replica_id,
                updated = cast(strftime('%s','now') as int)
             WHERE excluded.clock > bookmark_status.clock
                OR (excluded.clock = bookmark_status.clock AND excluded.replica_id > bookmark_status.replica_id)",
            params![
                record.event_id,
                record.bookmarked as i64,
                record.stamp.clock as i64,
                record.stamp.replica_id
            ],
        )?;
        if changed == 0 {
            debug!(
                "Ignoring stale write for {} from {}",
                record.event_id, record.stamp.replica_id
            );
            return Ok(None);
        }

        let event = BookmarkEvent::StatusChanged {
            record: record.clone(),
        };
        tx.execute(
            "INSERT INTO bookmark_event (event_type, payload) VALUES (?1, ?2)",
            params![event.event_type(), serde_json::to_string(&event)?],
        )?;
        let seq = tx.last_insert_rowid();
        let server_timestamp: i64 = tx.query_row(
            "SELECT created FROM bookmark_event WHERE seq = ?1",
            params![seq],
            |row| row.get(0),
        )?;
        tx.commit()?;

        Ok(Some(StoredEvent {
            seq,
            event,
            server_timestamp,
        }))
    }
}

impl StatusEventLog for SqliteStatusStore {
    fn get_events_since(&self, since_seq: i64) -> Result<Vec<StoredEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT seq, payload, created FROM bookmark_event WHERE seq > ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(params![since_seq], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(seq, payload, server_timestamp)| {
                let event: BookmarkEvent = serde_json::from_str(&payload)
                    .with_context(|| format!("Corrupted payload for event {}", seq))?;
                Ok(StoredEvent {
                    seq,
                    event,
                    server_timestamp,
                })
            })
            .collect()
    }

    fn get_current_seq(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        // sqlite_sequence keeps the high-water mark even after the log is pruned
        let seq = conn
            .query_row(
                "SELECT seq FROM sqlite_sequence WHERE name = 'bookmark_event'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(seq.unwrap_or(0))
    }

    fn get_min_seq(&self) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT MIN(seq) FROM bookmark_event", [], |row| {
            row.get::<_, Option<i64>>(0)
        })?)
    }

    fn prune_events_older_than(&self, before_timestamp: i64) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM bookmark_event WHERE created < ?1",
            params![before_timestamp],
        )?;
        Ok(deleted as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_persistence::BASE_DB_VERSION;
    use tempfile::TempDir;

    fn create_tmp_store() -> (SqliteStatusStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let temp_file_path = temp_dir.path().join("test.db");
        let store = SqliteStatusStore::new(&temp_file_path).unwrap();
        (store, temp_dir)
    }

    fn record(event_id: &str, bookmarked: bool, clock: u64, replica: &str) -> StatusRecord {
        StatusRecord {
            event_id: event_id.to_string(),
            bookmarked,
            stamp: Stamp::new(clock, replica),
        }
    }

    #[test]
    fn test_absent_event_id() {
        let (store, _temp_dir) = create_tmp_store();
        assert_eq!(store.get_value("2025-1").unwrap(), None);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn saves_and_overwrites_with_newer_stamp() {
        let (store, _temp_dir) = create_tmp_store();

        let first = store.save(&record("2025-10", true, 1, "a")).unwrap();
        assert_eq!(first.map(|e| e.seq), Some(1));
        assert!(store.get_value("2025-10").unwrap().unwrap().bookmarked);

        let second = store.save(&record("2025-10", false, 2, "a")).unwrap();
        assert_eq!(second.map(|e| e.seq), Some(2));
        assert_eq!(
            store.get_value("2025-10").unwrap(),
            Some(record("2025-10", false, 2, "a"))
        );
    }

    #[test]
    fn ignores_stale_and_duplicate_writes() {
        let (store, _temp_dir) = create_tmp_store();
        store.save(&record("2025-10", true, 4, "b")).unwrap();

        assert!(store.save(&record("2025-10", false, 3, "z")).unwrap().is_none());
        assert!(store.save(&record("2025-10", false, 4, "a")).unwrap().is_none());
        assert!(store.save(&record("2025-10", true, 4, "b")).unwrap().is_none());
        assert!(store.get_value("2025-10").unwrap().unwrap().bookmarked);
        assert_eq!(store.get_current_seq().unwrap(), 1);

        // Same clock, larger replica id wins
        assert!(store.save(&record("2025-10", false, 4, "c")).unwrap().is_some());
        assert!(!store.get_value("2025-10").unwrap().unwrap().bookmarked);
    }

    #[test]
    fn load_returns_insertion_order() {
        let (store, _temp_dir) = create_tmp_store();
        store.save(&record("2025-30", true, 1, "a")).unwrap();
        store.save(&record("2025-4", true, 2, "a")).unwrap();
        store.save(&record("2025-30", false, 3, "a")).unwrap();

        let ids: Vec<_> = store
            .load()
            .unwrap()
            .into_iter()
            .map(|r| r.event_id)
            .collect();
        assert_eq!(ids, vec!["2025-30", "2025-4"]);
    }

    #[test]
    fn persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reopen.db");
        {
            let store = SqliteStatusStore::new(&path).unwrap();
            store.save(&record("2025-7", true, 1, "a")).unwrap();
        }
        let store = SqliteStatusStore::new(&path).unwrap();
        assert_eq!(
            store.get_value("2025-7").unwrap(),
            Some(record("2025-7", true, 1, "a"))
        );
        assert_eq!(store.get_current_seq().unwrap(), 1);
    }

    #[test]
    fn event_log_since_and_prune() {
        let (store, _temp_dir) = create_tmp_store();
        store.save(&record("2025-1", true, 1, "a")).unwrap();
        store.save(&record("2025-2", true, 2, "a")).unwrap();
        store.save(&record("2025-3", true, 3, "a")).unwrap();

        let events = store.get_events_since(1).unwrap();
        assert_eq!(events.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(
            events[0].event,
            BookmarkEvent::StatusChanged {
                record: record("2025-2", true, 2, "a")
            }
        );
        assert_eq!(store.get_min_seq().unwrap(), Some(1));

        assert_eq!(store.prune_events_older_than(i64::MAX).unwrap(), 3);
        assert_eq!(store.get_min_seq().unwrap(), None);
        assert_eq!(store.get_current_seq().unwrap(), 3);

        let next = store.save(&record("2025-4", true, 4, "a")).unwrap();
        assert_eq!(next.map(|e| e.seq), Some(4));
    }

    #[test]
    fn test_migration_v0_to_v1() {
        let temp_dir = TempDir::new().unwrap();
        let temp_file_path = temp_dir.path().join("test_migration.db");

        {
            let conn = Connection::open(&temp_file_path).unwrap();
            VERSIONED_SCHEMAS[0].create(&conn).unwrap();
            conn.execute(
                "INSERT INTO bookmark_status (event_id, bookmarked) VALUES (?1, ?2)",
                params!["2024-12", 1],
            )
            .unwrap();
        }

        let store = SqliteStatusStore::new(&temp_file_path).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            let db_version: i64 = conn
                .query_row("PRAGMA user_version;", [], |row| row.get(0))
                .unwrap();
            assert_eq!(db_version, BASE_DB_VERSION as i64 + 1);
        }

        let migrated = store.get_value("2024-12").unwrap().unwrap();
        assert!(migrated.bookmarked);
        assert_eq!(migrated.stamp, Stamp::new(0, ""));

        // Any replicated write beats a pre-sync row
        assert!(store
            .save(&record("2024-12", false, 1, "a"))
            .unwrap()
            .is_some());
    }
}
