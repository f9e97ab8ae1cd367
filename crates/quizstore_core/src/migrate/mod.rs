//! Ledger-tracked, batch-based schema migrations.
//!
//! # Responsibility
//! - Hold an explicit registry of named migrations (`registry`).
//! - Apply, roll back and report them against a ledger table (`migrator`).
//!
//! # Invariants
//! - A migration name is recorded in the ledger at most once.
//! - Every migration applied by one `run()` shares one batch number.
//! - Each migration runs in its own transaction; the first failure aborts
//!   the run and is returned, never swallowed.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod ledger;
mod migrator;
mod registry;

pub use ledger::LedgerEntry;
pub use migrator::{MigrationLists, MigrationStatus, Migrator, RunReport};
pub use registry::{
    class_name, is_valid_migration_name, FnMigration, Migration, MigrationRegistry, SqlMigration,
};

pub type MigrationResult<T> = Result<T, MigrationError>;

#[derive(Debug)]
pub enum MigrationError {
    Db(DbError),
    /// Name does not follow `YYYY_MM_DD_HHMMSS_snake_case`.
    InvalidName(String),
    DuplicateName(String),
    /// Ledger references a migration the registry does not know.
    UnknownMigration(String),
    /// `up`/`down` or its ledger write failed; the transaction was rolled back.
    Failed { migration: String, source: DbError },
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidName(name) => write!(f, "invalid migration name `{name}`"),
            Self::DuplicateName(name) => write!(f, "migration already registered: {name}"),
            Self::UnknownMigration(name) => write!(f, "unknown migration in ledger: {name}"),
            Self::Failed { migration, source } => {
                write!(f, "migration `{migration}` failed: {source}")
            }
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Failed { source, .. } => Some(source),
            Self::InvalidName(_) | Self::DuplicateName(_) | Self::UnknownMigration(_) => None,
        }
    }
}

impl From<DbError> for MigrationError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for MigrationError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
