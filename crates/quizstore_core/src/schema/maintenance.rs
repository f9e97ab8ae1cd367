//! Index and statistics maintenance for the quiz schema.
//!
//! # Responsibility
//! - Refresh planner statistics for the hot tables.
//! - Create reporting indexes that an older or standard install lacks.
//!
//! # Invariants
//! - Only tables that exist are touched; a missing table is skipped.
//! - An index is created only when no index of that name exists.

use super::tables::SchemaTables;
use super::SchemaResult;
use crate::config::StoreConfig;
use crate::db::table_exists;
use crate::logging::StoreLogger;
use rusqlite::{Connection, OptionalExtension};
use std::sync::Arc;
use std::time::Instant;

/// Composite index known to the optimized profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeIndex {
    /// Short table name, resolved through `SchemaTables`.
    pub table: &'static str,
    pub name: &'static str,
    pub columns: &'static str,
}

impl CompositeIndex {
    pub fn index_name(&self, table: &str) -> String {
        format!("{table}_{}", self.name)
    }

    pub fn create_sql(&self, table: &str) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({});",
            self.index_name(table),
            self.columns
        )
    }
}

pub const COMPOSITE_INDEXES: &[CompositeIndex] = &[
    CompositeIndex {
        table: "quizzes",
        name: "active_recent",
        columns: "is_active, created_at",
    },
    CompositeIndex {
        table: "questions",
        name: "quiz_active_sort",
        columns: "quiz_id, is_active, sort_order",
    },
    CompositeIndex {
        table: "questions",
        name: "active_required",
        columns: "is_active, is_required",
    },
    CompositeIndex {
        table: "archetypes",
        name: "active_sort",
        columns: "is_active, sort_order",
    },
    CompositeIndex {
        table: "results",
        name: "quiz_date",
        columns: "quiz_id, completed_at",
    },
    CompositeIndex {
        table: "results",
        name: "archetype_date",
        columns: "archetype_id, completed_at",
    },
    CompositeIndex {
        table: "results",
        name: "date_score",
        columns: "completed_at, score",
    },
    CompositeIndex {
        table: "prospects",
        name: "name_email",
        columns: "first_name, last_name, email",
    },
];

pub struct SchemaMaintenance<'conn> {
    conn: &'conn Connection,
    tables: SchemaTables,
    logger: Arc<dyn StoreLogger>,
}

impl<'conn> SchemaMaintenance<'conn> {
    pub fn new(conn: &'conn Connection, config: &StoreConfig, logger: Arc<dyn StoreLogger>) -> Self {
        Self {
            conn,
            tables: SchemaTables::new(config),
            logger,
        }
    }

    /// Runs `ANALYZE` on each existing hot table, then `PRAGMA optimize`.
    /// Returns the analyzed tables.
    pub fn optimize_tables(&self) -> SchemaResult<Vec<String>> {
        let started_at = Instant::now();
        let mut analyzed = Vec::new();
        for table in self.tables.hot() {
            if !table_exists(self.conn, table)? {
                continue;
            }
            self.conn.execute_batch(&format!("ANALYZE {table};"))?;
            analyzed.push(table.to_string());
        }
        self.conn.execute_batch("PRAGMA optimize;")?;

        self.logger.info(
            "schema_tables_optimized",
            &[
                ("count", analyzed.len().to_string()),
                ("duration_ms", started_at.elapsed().as_millis().to_string()),
            ],
        );
        Ok(analyzed)
    }

    /// Creates every known composite index that is absent. Returns the names
    /// of the indexes created.
    pub fn add_missing_indexes(&self) -> SchemaResult<Vec<String>> {
        let mut created = Vec::new();
        for index in COMPOSITE_INDEXES {
            let Some(table) = self.tables.resolve(index.table) else {
                continue;
            };
            if !table_exists(self.conn, table)? {
                continue;
            }
            let name = index.index_name(table);
            if self.index_exists(&name)? {
                continue;
            }
            self.conn.execute_batch(&index.create_sql(table))?;
            self.logger
                .info("schema_index_created", &[("index", name.clone())]);
            created.push(name);
        }
        Ok(created)
    }

    fn index_exists(&self, name: &str) -> SchemaResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1 LIMIT 1;",
                [name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
