//! Transactional outbox for lifecycle events.
//!
//! # Responsibility
//! - Persist one row per event in the same transaction as the mutation.
//! - Replay undispatched rows to an `EventSink` and mark them dispatched.
//!
//! # Invariants
//! - Rows are replayed in insertion order.
//! - A row is marked dispatched only after its sink call returned, so a crash
//!   in between replays it again (at-least-once).

use super::{EventKind, EventSink, RepositoryEvent};
use crate::db::{DbError, DbResult};
use crate::logging::StoreLogger;
use crate::migrate::SqlMigration;
use crate::model::record::json_to_record;
use rusqlite::{params, Connection};
use std::sync::Arc;

/// DDL creating the outbox table.
pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            dispatched_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_pending ON {table} (dispatched_at, id);"
    )
}

pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {table};")
}

/// Ledger name of the built-in migration creating the outbox table.
pub const OUTBOX_MIGRATION: &str = "2024_05_01_000000_create_event_outbox";

/// Ledger migration creating (and dropping) the outbox table.
pub fn migration(table: &str) -> SqlMigration {
    SqlMigration::new(OUTBOX_MIGRATION, create_table_sql(table), drop_table_sql(table))
}

/// Appends `event` to the outbox on the caller's connection/transaction.
pub fn append(conn: &Connection, table: &str, event: &RepositoryEvent) -> DbResult<i64> {
    conn.execute(
        &format!("INSERT INTO {table} (event, entity_id, payload) VALUES (?1, ?2, ?3);"),
        params![event.name, event.id, event.payload().to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Replays pending outbox rows to a sink.
pub struct OutboxDispatcher<'conn> {
    conn: &'conn Connection,
    table: String,
    sink: Arc<dyn EventSink>,
    logger: Arc<dyn StoreLogger>,
}

struct PendingRow {
    id: i64,
    event: String,
    payload: String,
}

impl<'conn> OutboxDispatcher<'conn> {
    pub fn new(
        conn: &'conn Connection,
        table: impl Into<String>,
        sink: Arc<dyn EventSink>,
        logger: Arc<dyn StoreLogger>,
    ) -> Self {
        Self {
            conn,
            table: table.into(),
            sink,
            logger,
        }
    }

    pub fn pending_count(&self) -> DbResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE dispatched_at IS NULL;",
                self.table
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Dispatches up to `limit` pending rows and returns how many were sent.
    ///
    /// Rows whose payload cannot be decoded are logged and marked dispatched
    /// so they do not block the queue.
    pub fn drain(&self, limit: u32) -> DbResult<usize> {
        let pending = self.load_pending(limit)?;
        let mut dispatched = 0;

        for row in pending {
            match decode_event(&row) {
                Some(event) => {
                    self.sink.emit(&event);
                    dispatched += 1;
                }
                None => self.logger.error(
                    "outbox_payload_invalid",
                    &[
                        ("table", self.table.clone()),
                        ("key", row.id.to_string()),
                        ("event", row.event.clone()),
                    ],
                ),
            }
            self.conn.execute(
                &format!(
                    "UPDATE {} SET dispatched_at = datetime('now') WHERE id = ?1;",
                    self.table
                ),
                [row.id],
            )?;
        }

        if dispatched > 0 {
            self.logger.info(
                "outbox_drained",
                &[
                    ("table", self.table.clone()),
                    ("count", dispatched.to_string()),
                ],
            );
        }
        Ok(dispatched)
    }

    fn load_pending(&self, limit: u32) -> DbResult<Vec<PendingRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, event, payload
             FROM {}
             WHERE dispatched_at IS NULL
             ORDER BY id ASC
             LIMIT ?1;",
            self.table
        ))?;
        let rows = stmt
            .query_map([i64::from(limit)], |row| {
                Ok(PendingRow {
                    id: row.get(0)?,
                    event: row.get(1)?,
                    payload: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)?;
        Ok(rows)
    }
}

fn decode_event(row: &PendingRow) -> Option<RepositoryEvent> {
    let payload: serde_json::Value = serde_json::from_str(&row.payload).ok()?;
    let kind = match payload.get("kind")?.as_str()? {
        "created" => EventKind::Created,
        "updated" => EventKind::Updated,
        "deleted" => EventKind::Deleted,
        _ => return None,
    };

    Some(RepositoryEvent {
        name: row.event.clone(),
        kind,
        entity: payload.get("entity")?.as_str()?.to_string(),
        id: payload.get("id")?.as_i64()?,
        data: payload.get("data").and_then(json_to_record),
        previous: payload.get("previous").and_then(json_to_record),
    })
}
