//! Repository layer: generic table persistence plus domain repositories.
//!
//! # Responsibility
//! - Define the shape-independent `Repository` contract over plain records.
//! - Compose query builder, cache, logger and event sink per table.
//!
//! # Invariants
//! - CRUD calls never return errors; failures are logged with table,
//!   operation and key, then degrade to `None`/`false`/empty/0.
//! - Every successful write invalidates the cache namespace before events fire.
//! - Construction errors (`RepoError`) are the only errors surfaced.

use crate::cache::{Cache, MemoryCache};
use crate::config::StoreConfig;
use crate::db::DbError;
use crate::events::{EventSink, NullEventSink};
use crate::logging::{FacadeLogger, StoreLogger};
use crate::model::record::Record;
use crate::query::{Direction, QueryError};
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

pub mod archetype_repo;
pub mod base;
pub mod monitor;
pub mod naming;
pub mod prospect_repo;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Query(QueryError),
    MissingRequiredTable(String),
    MissingRequiredColumn { table: String, column: String },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "repository requires column `{column}` in table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid repository data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<QueryError> for RepoError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One page of rows plus totals.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Record>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl Page {
    pub fn empty(page: u64, per_page: u64) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page,
            per_page,
            total_pages: 0,
        }
    }
}

/// Filter applied to one column by `SqliteRepository::find_where`.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    Eq(Value),
    /// An empty list matches nothing.
    In(Vec<Value>),
    Null,
}

impl From<Value> for Criterion {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            other => Self::Eq(other),
        }
    }
}

impl From<Vec<Value>> for Criterion {
    fn from(values: Vec<Value>) -> Self {
        Self::In(values)
    }
}

/// Ordering and paging for `SqliteRepository::find_where`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListArgs {
    pub order_by: String,
    pub direction: Direction,
    /// `None` or `Some(0)` returns every matching row.
    pub limit: Option<u64>,
    pub offset: u64,
}

impl Default for ListArgs {
    fn default() -> Self {
        Self {
            order_by: "id".to_string(),
            direction: Direction::Desc,
            limit: None,
            offset: 0,
        }
    }
}

/// Generic CRUD contract over one table.
pub trait Repository {
    fn find(&self, id: i64) -> Option<Record>;
    fn find_by(&self, column: &str, value: &Value) -> Option<Record>;
    fn all(&self, order: &[(&str, Direction)]) -> Vec<Record>;
    fn paginate(&self, page: u64, per_page: u64, order: &[(&str, Direction)]) -> Page;
    /// Returns the new row id.
    fn create(&self, data: Record) -> Option<i64>;
    fn update(&self, id: i64, data: Record) -> bool;
    fn delete(&self, id: i64) -> bool;
    fn exists(&self, id: i64) -> bool;
    /// Counts rows matching every `column = value` pair.
    fn count(&self, conditions: &Record) -> u64;
}

/// Collaborators shared by every repository of one store.
#[derive(Clone)]
pub struct RepositoryContext {
    pub config: StoreConfig,
    /// `None` disables caching regardless of `config.cache_enabled`.
    pub cache: Option<Arc<dyn Cache>>,
    pub logger: Arc<dyn StoreLogger>,
    pub events: Arc<dyn EventSink>,
}

impl RepositoryContext {
    /// Builds a context with an in-memory cache (when enabled), facade logging
    /// and no event listeners.
    pub fn new(config: StoreConfig) -> Self {
        let cache: Option<Arc<dyn Cache>> = if config.cache_enabled {
            Some(match config.cache_ttl_secs {
                Some(secs) => Arc::new(MemoryCache::with_ttl(Duration::from_secs(secs))),
                None => Arc::new(MemoryCache::new()),
            })
        } else {
            None
        };

        Self {
            config,
            cache,
            logger: Arc::new(FacadeLogger),
            events: Arc::new(NullEventSink),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn StoreLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}

impl Default for RepositoryContext {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
