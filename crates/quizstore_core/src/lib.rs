//! Persistence core for the money quiz store.
//! This crate owns query construction, repositories, caching, lifecycle
//! events and schema migrations.

pub mod cache;
pub mod config;
pub mod db;
pub mod events;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod query;
pub mod repo;
pub mod schema;

pub use cache::{Cache, MemoryCache, RepositoryCache};
pub use config::{ConfigError, StoreConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use events::{EventBus, EventSink, RepositoryEvent};
pub use logging::{default_log_level, init_logging, logging_status, StoreLogger};
pub use migrate::{MigrationError, MigrationRegistry, MigrationResult, Migrator};
pub use model::Record;
pub use query::{QueryBuilder, QueryError, QueryResult};
pub use repo::archetype_repo::ArchetypeRepository;
pub use repo::base::SqliteRepository;
pub use repo::prospect_repo::ProspectRepository;
pub use repo::{Criterion, ListArgs, Page, RepoError, RepoResult, Repository, RepositoryContext};
pub use schema::{SchemaError, SchemaMaintenance, SchemaProfile, VersionedUpgrader};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
