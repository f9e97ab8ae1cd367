//! SQLite-backed generic repository with cache-aside reads and lifecycle
//! events.
//!
//! # Responsibility
//! - Implement `Repository` for any table with an integer primary key.
//! - Stamp `created_at`/`updated_at` when the table has those columns.
//! - Invalidate the cache namespace and publish events after each write.
//! - Time reads and batch inserts when query monitoring is enabled.
//!
//! The cache namespace is the full table name, so stores with different
//! host prefixes can share one cache backend.
//!
//! # Invariants
//! - Reads populate the cache only with non-empty results, and only when no
//!   write bumped the namespace generation while the read was in flight.
//! - With the outbox enabled, the mutation and its outbox row commit together.
//! - `begin_transaction`/`commit`/`rollback` are flat: no nesting, no savepoints.

use super::monitor::QueryMonitor;
use super::naming::{entity_name, fnv1a_hex};
use super::{Criterion, ListArgs, Page, RepoError, RepoResult, Repository, RepositoryContext};
use crate::cache::RepositoryCache;
use crate::db::{table_columns, table_exists};
use crate::events::{outbox, EventSink, RepositoryEvent};
use crate::logging::StoreLogger;
use crate::model::record::{record_size, value_to_json, Record};
use crate::query::{Direction, QueryBuilder, QueryResult};
use rusqlite::types::Value;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::Arc;
use std::time::Instant;

const PRIMARY_KEY: &str = "id";
const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";

/// Generic repository bound to one table.
pub struct SqliteRepository<'conn> {
    conn: &'conn Connection,
    table: String,
    entity: String,
    event_prefix: String,
    columns: Vec<String>,
    cache: Option<RepositoryCache>,
    logger: Arc<dyn StoreLogger>,
    events: Arc<dyn EventSink>,
    outbox_table: Option<String>,
    monitor: Option<QueryMonitor<'conn>>,
}

impl<'conn> SqliteRepository<'conn> {
    /// Binds a repository to the fully prefixed `table`.
    ///
    /// # Errors
    /// - `MissingRequiredTable` when `table` (or the enabled outbox) is absent.
    /// - `MissingRequiredColumn` when `table` has no `id` column.
    pub fn try_new(
        conn: &'conn Connection,
        table: impl Into<String>,
        context: &RepositoryContext,
    ) -> RepoResult<Self> {
        let table = table.into();
        let columns = table_columns(conn, &table)?;
        if columns.is_empty() {
            return Err(RepoError::MissingRequiredTable(table));
        }
        if !columns.iter().any(|column| column == PRIMARY_KEY) {
            return Err(RepoError::MissingRequiredColumn {
                table,
                column: PRIMARY_KEY.to_string(),
            });
        }

        let config = &context.config;
        let outbox_table = if config.outbox_enabled {
            let name = config.outbox_table_name();
            if !table_exists(conn, &name)? {
                return Err(RepoError::MissingRequiredTable(name));
            }
            Some(name)
        } else {
            None
        };

        let entity = entity_name(&table, &config.table_prefix, &config.namespace_prefix);
        let cache = match (&context.cache, config.cache_enabled) {
            (Some(backend), true) => Some(RepositoryCache::new(table.clone(), Arc::clone(backend))),
            _ => None,
        };

        let monitor = QueryMonitor::try_new(conn, &table, config, Arc::clone(&context.logger))?;

        Ok(Self {
            conn,
            table,
            entity,
            event_prefix: config.namespace_prefix.clone(),
            columns,
            cache,
            logger: Arc::clone(&context.logger),
            events: Arc::clone(&context.events),
            outbox_table,
            monitor,
        })
    }

    /// Binds a repository to `<table_prefix><namespace_prefix><name>`.
    pub fn for_table(
        conn: &'conn Connection,
        name: &str,
        context: &RepositoryContext,
    ) -> RepoResult<Self> {
        Self::try_new(conn, context.config.table(name), context)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn logger(&self) -> &dyn StoreLogger {
        self.logger.as_ref()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|known| known == column)
    }

    /// Fresh query builder on this repository's table.
    pub fn query(&self) -> QueryBuilder<'conn> {
        QueryBuilder::new(self.conn, self.table.clone())
    }

    /// Filtered listing: every criterion must hold. No caching.
    pub fn find_where(&self, conditions: &[(&str, Criterion)], args: &ListArgs) -> Vec<Record> {
        let started = Instant::now();
        let query = conditions
            .iter()
            .fold(self.query(), |query, (column, criterion)| match criterion {
                Criterion::Eq(value) => query.where_eq(*column, value.clone()),
                Criterion::In(values) => query.where_in(*column, values.iter().cloned()),
                Criterion::Null => query.where_null(*column),
            })
            .order_by(args.order_by.as_str(), args.direction);
        let query = match args.limit.filter(|limit| *limit > 0) {
            Some(limit) => query.limit(limit),
            None => query,
        };
        let query = if args.offset > 0 {
            query.offset(args.offset)
        } else {
            query
        };

        match query.get() {
            Ok(rows) => {
                self.record_timing("find_where", started, rows.iter().map(record_size).sum());
                rows
            }
            Err(err) => {
                self.log_failure("find_where", &conditions.len().to_string(), &err);
                Vec::new()
            }
        }
    }

    /// Inserts every row in one statement, then flushes the cache namespace.
    ///
    /// A bulk path: no per-row lifecycle events or outbox rows. Returns
    /// `false` for an empty batch or any failure; nothing is inserted then.
    pub fn insert_batch(&self, mut rows: Vec<Record>) -> bool {
        if rows.is_empty() {
            return false;
        }
        let started = Instant::now();
        let outcome = self.write_scope(|| {
            for row in &mut rows {
                self.stamp(row, &[CREATED_AT, UPDATED_AT])?;
            }
            Ok(self.query().insert_many(&rows)?)
        });

        match outcome {
            Ok(inserted) => {
                self.logger.info(
                    "repository_batch_inserted",
                    &[("table", self.table.clone()), ("rows", inserted.to_string())],
                );
                if let Some(cache) = &self.cache {
                    cache.flush();
                }
                self.record_timing("insert_batch", started, rows.iter().map(record_size).sum());
                true
            }
            Err(err) => {
                self.log_failure("insert_batch", &rows.len().to_string(), &err);
                false
            }
        }
    }

    pub fn begin_transaction(&self) -> RepoResult<()> {
        self.conn.execute_batch("BEGIN;")?;
        Ok(())
    }

    pub fn commit(&self) -> RepoResult<()> {
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    pub fn rollback(&self) -> RepoResult<()> {
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Cache-aside single-row lookup shared by `find`, `find_by` and the
    /// domain repositories.
    pub fn cached_first<F>(&self, operation: &str, key: &str, fetch: F) -> Option<Record>
    where
        F: FnOnce() -> QueryResult<Option<Record>>,
    {
        let observed_generation = match &self.cache {
            Some(cache) => {
                if let Some(hit) = cache.get(key) {
                    return Some(hit);
                }
                Some(cache.generation())
            }
            None => None,
        };

        match fetch() {
            Ok(Some(found)) => {
                if let (Some(cache), Some(generation)) = (&self.cache, observed_generation) {
                    cache.set(key, found.clone(), generation);
                }
                Some(found)
            }
            Ok(None) => None,
            Err(err) => {
                self.log_failure(operation, key, &err);
                None
            }
        }
    }

    pub(crate) fn log_failure(&self, operation: &str, key: &str, err: &dyn std::fmt::Display) {
        self.logger.error(
            "repository_operation_failed",
            &[
                ("table", self.table.clone()),
                ("operation", operation.to_string()),
                ("key", key.to_string()),
                ("error", err.to_string()),
            ],
        );
    }

    fn record_timing(&self, query_type: &str, started: Instant, payload_bytes: usize) {
        if let Some(monitor) = &self.monitor {
            monitor.record(query_type, started.elapsed(), payload_bytes);
        }
    }

    fn log_success(&self, message: &str, id: i64) {
        self.logger.info(
            message,
            &[("table", self.table.clone()), ("id", id.to_string())],
        );
    }

    fn invalidate(&self, id: i64) {
        if let Some(cache) = &self.cache {
            cache.delete(&find_key(id));
            // Keyed lookups (`findby_*`) may hold the same row under other
            // keys; advancing the generation retires all of them.
            cache.flush();
        }
    }

    fn stamp(&self, data: &mut Record, columns: &[&str]) -> rusqlite::Result<()> {
        let missing = columns
            .iter()
            .filter(|column| self.has_column(column) && !data.contains_key(**column))
            .collect::<Vec<_>>();
        if missing.is_empty() {
            return Ok(());
        }

        let now: String = self
            .conn
            .query_row("SELECT datetime('now');", [], |row| row.get(0))?;
        for column in missing {
            data.insert((*column).to_string(), Value::Text(now.clone()));
        }
        Ok(())
    }

    /// Runs `work` inside an immediate transaction when the outbox is on and
    /// no caller transaction is open; otherwise runs it directly.
    fn write_scope<T>(&self, work: impl FnOnce() -> RepoResult<T>) -> RepoResult<T> {
        if self.outbox_table.is_none() || !self.conn.is_autocommit() {
            return work();
        }
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let value = work()?;
        tx.commit()?;
        Ok(value)
    }

    fn record_outbox(&self, event: &RepositoryEvent) -> RepoResult<()> {
        if let Some(table) = &self.outbox_table {
            outbox::append(self.conn, table, event)?;
        }
        Ok(())
    }

    fn publish(&self, event: &RepositoryEvent) {
        self.events.emit(event);
    }
}

impl Repository for SqliteRepository<'_> {
    fn find(&self, id: i64) -> Option<Record> {
        self.cached_first("find", &find_key(id), || {
            let started = Instant::now();
            let found = self.query().where_eq(PRIMARY_KEY, id).first();
            let payload = match &found {
                Ok(Some(row)) => record_size(row),
                _ => 0,
            };
            self.record_timing("find", started, payload);
            found
        })
    }

    fn find_by(&self, column: &str, value: &Value) -> Option<Record> {
        let key = format!(
            "findby_{column}_{}",
            fnv1a_hex(&value_to_json(value).to_string())
        );
        self.cached_first("find_by", &key, || {
            self.query().where_eq(column, value.clone()).first()
        })
    }

    fn all(&self, order: &[(&str, Direction)]) -> Vec<Record> {
        let started = Instant::now();
        let query = order
            .iter()
            .fold(self.query(), |query, (column, direction)| {
                query.order_by(*column, *direction)
            });
        match query.get() {
            Ok(rows) => {
                self.record_timing("all", started, rows.iter().map(record_size).sum());
                rows
            }
            Err(err) => {
                self.log_failure("all", "*", &err);
                Vec::new()
            }
        }
    }

    fn paginate(&self, page: u64, per_page: u64, order: &[(&str, Direction)]) -> Page {
        let started = Instant::now();
        let page = page.max(1);
        let per_page = per_page.max(1);
        let offset = (page - 1).saturating_mul(per_page);

        let query = order
            .iter()
            .fold(self.query(), |query, (column, direction)| {
                query.order_by(*column, *direction)
            })
            .limit(per_page)
            .offset(offset);

        let loaded = query
            .get()
            .and_then(|items| self.query().count().map(|total| (items, total)));
        match loaded {
            Ok((items, total)) => {
                self.record_timing("paginate", started, items.iter().map(record_size).sum());
                Page {
                    items,
                    total,
                    page,
                    per_page,
                    total_pages: total.div_ceil(per_page),
                }
            }
            Err(err) => {
                self.log_failure("paginate", &page.to_string(), &err);
                Page::empty(page, per_page)
            }
        }
    }

    fn create(&self, mut data: Record) -> Option<i64> {
        let outcome = self.write_scope(|| {
            self.stamp(&mut data, &[CREATED_AT, UPDATED_AT])?;
            let id = self.query().insert(&data)?;
            let event =
                RepositoryEvent::created(&self.event_prefix, &self.entity, id, data.clone());
            self.record_outbox(&event)?;
            Ok(event)
        });

        match outcome {
            Ok(event) => {
                self.log_success("repository_record_created", event.id);
                self.invalidate(event.id);
                self.publish(&event);
                Some(event.id)
            }
            Err(err) => {
                self.log_failure("create", "new", &err);
                None
            }
        }
    }

    fn update(&self, id: i64, mut data: Record) -> bool {
        let previous = self.find(id);
        let outcome = self.write_scope(|| {
            self.stamp(&mut data, &[UPDATED_AT])?;
            let changed = self.query().where_eq(PRIMARY_KEY, id).update(&data)?;
            if changed == 0 {
                return Ok(None);
            }
            let event = RepositoryEvent::updated(
                &self.event_prefix,
                &self.entity,
                id,
                data.clone(),
                previous.clone(),
            );
            self.record_outbox(&event)?;
            Ok(Some(event))
        });

        match outcome {
            Ok(Some(event)) => {
                self.log_success("repository_record_updated", id);
                self.invalidate(id);
                self.publish(&event);
                true
            }
            Ok(None) => false,
            Err(err) => {
                self.log_failure("update", &id.to_string(), &err);
                false
            }
        }
    }

    fn delete(&self, id: i64) -> bool {
        let previous = self.find(id);
        let outcome = self.write_scope(|| {
            let changed = self.query().where_eq(PRIMARY_KEY, id).delete()?;
            if changed == 0 {
                return Ok(None);
            }
            let event =
                RepositoryEvent::deleted(&self.event_prefix, &self.entity, id, previous.clone());
            self.record_outbox(&event)?;
            Ok(Some(event))
        });

        match outcome {
            Ok(Some(event)) => {
                self.log_success("repository_record_deleted", id);
                self.invalidate(id);
                self.publish(&event);
                true
            }
            Ok(None) => false,
            Err(err) => {
                self.log_failure("delete", &id.to_string(), &err);
                false
            }
        }
    }

    fn exists(&self, id: i64) -> bool {
        match self.query().where_eq(PRIMARY_KEY, id).count() {
            Ok(count) => count > 0,
            Err(err) => {
                self.log_failure("exists", &id.to_string(), &err);
                false
            }
        }
    }

    fn count(&self, conditions: &Record) -> u64 {
        let query = conditions
            .iter()
            .fold(self.query(), |query, (column, value)| {
                query.where_eq(column.as_str(), value.clone())
            });
        query.count().unwrap_or_else(|err| {
            self.log_failure("count", "*", &err);
            0
        })
    }
}

fn find_key(id: i64) -> String {
    format!("find_{id}")
}
