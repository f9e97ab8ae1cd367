//! Ledger table access. All functions run on the caller's connection or
//! transaction.

use crate::db::{table_exists, DbResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// One applied migration as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub migration: String,
    pub batch: i64,
    pub created_at: String,
}

pub(super) fn ensure(conn: &Connection, table: &str) -> DbResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            migration TEXT NOT NULL UNIQUE,
            batch INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );"
    ))?;
    Ok(())
}

pub(super) fn exists(conn: &Connection, table: &str) -> DbResult<bool> {
    table_exists(conn, table)
}

/// Applied entries in application order.
pub(super) fn entries(conn: &Connection, table: &str) -> DbResult<Vec<LedgerEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT migration, batch, created_at FROM {table} ORDER BY id ASC;"
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(LedgerEntry {
                migration: row.get(0)?,
                batch: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(super) fn max_batch(conn: &Connection, table: &str) -> DbResult<i64> {
    let max: Option<i64> = conn.query_row(
        &format!("SELECT MAX(batch) FROM {table};"),
        [],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(0))
}

/// Distinct batch numbers, newest first.
pub(super) fn batches_desc(conn: &Connection, table: &str) -> DbResult<Vec<i64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT batch FROM {table} ORDER BY batch DESC;"
    ))?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(rows)
}

/// Names in `batch`, most recently applied first.
pub(super) fn batch_members_desc(
    conn: &Connection,
    table: &str,
    batch: i64,
) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT migration FROM {table} WHERE batch = ?1 ORDER BY id DESC;"
    ))?;
    let rows = stmt
        .query_map([batch], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

pub(super) fn is_recorded(conn: &Connection, table: &str, name: &str) -> DbResult<bool> {
    let found = conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE migration = ?1 LIMIT 1;"),
            [name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(super) fn record(conn: &Connection, table: &str, name: &str, batch: i64) -> DbResult<()> {
    conn.execute(
        &format!("INSERT INTO {table} (migration, batch) VALUES (?1, ?2);"),
        params![name, batch],
    )?;
    Ok(())
}

pub(super) fn remove(conn: &Connection, table: &str, name: &str) -> DbResult<()> {
    conn.execute(
        &format!("DELETE FROM {table} WHERE migration = ?1;"),
        [name],
    )?;
    Ok(())
}
