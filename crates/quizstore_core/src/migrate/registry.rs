//! Explicit migration registry.
//!
//! Migrations are declared in code and registered by name; nothing is
//! discovered from the filesystem or resolved from strings at run time.

use super::{MigrationError, MigrationResult};
use crate::db::DbResult;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

static MIGRATION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}_\d{2}_\d{2}_\d{6}_[a-z0-9]+(?:_[a-z0-9]+)*$")
        .expect("valid migration name regex")
});
static TIMESTAMP_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}_\d{2}_\d{2}_\d{6}_").expect("valid prefix regex"));

/// One reversible schema change.
pub trait Migration: Send + Sync {
    /// Sortable `YYYY_MM_DD_HHMMSS_snake_case` name; also the ledger key.
    fn name(&self) -> &str;
    fn up(&self, conn: &Connection) -> DbResult<()>;
    fn down(&self, conn: &Connection) -> DbResult<()>;
}

/// Migration defined by two SQL batches.
#[derive(Debug, Clone)]
pub struct SqlMigration {
    name: String,
    up_sql: String,
    down_sql: String,
}

impl SqlMigration {
    pub fn new(
        name: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
        }
    }
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, conn: &Connection) -> DbResult<()> {
        conn.execute_batch(&self.up_sql)?;
        Ok(())
    }

    fn down(&self, conn: &Connection) -> DbResult<()> {
        conn.execute_batch(&self.down_sql)?;
        Ok(())
    }
}

type Step = Box<dyn Fn(&Connection) -> DbResult<()> + Send + Sync>;

/// Migration defined by two closures, for changes plain SQL cannot express.
pub struct FnMigration {
    name: String,
    up: Step,
    down: Step,
}

impl FnMigration {
    pub fn new<U, D>(name: impl Into<String>, up: U, down: D) -> Self
    where
        U: Fn(&Connection) -> DbResult<()> + Send + Sync + 'static,
        D: Fn(&Connection) -> DbResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            up: Box::new(up),
            down: Box::new(down),
        }
    }
}

impl Debug for FnMigration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMigration")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Migration for FnMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, conn: &Connection) -> DbResult<()> {
        (self.up)(conn)
    }

    fn down(&self, conn: &Connection) -> DbResult<()> {
        (self.down)(conn)
    }
}

/// Name-ordered set of migrations.
#[derive(Default, Clone)]
pub struct MigrationRegistry {
    migrations: BTreeMap<String, Arc<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one migration.
    ///
    /// # Errors
    /// - `InvalidName` when the name lacks the timestamp prefix.
    /// - `DuplicateName` when the name is already registered.
    pub fn register(&mut self, migration: impl Migration + 'static) -> MigrationResult<()> {
        self.register_shared(Arc::new(migration))
    }

    pub fn register_shared(&mut self, migration: Arc<dyn Migration>) -> MigrationResult<()> {
        let name = migration.name().to_string();
        if !is_valid_migration_name(&name) {
            return Err(MigrationError::InvalidName(name));
        }
        if self.migrations.contains_key(&name) {
            return Err(MigrationError::DuplicateName(name));
        }
        self.migrations.insert(name, migration);
        Ok(())
    }

    /// Chaining form of `register`.
    pub fn with(mut self, migration: impl Migration + 'static) -> MigrationResult<Self> {
        self.register(migration)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.migrations.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Migration>> {
        self.migrations.get(name).cloned()
    }

    /// Registered names in lexical (application) order.
    pub fn names(&self) -> Vec<String> {
        self.migrations.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Migration>)> {
        self.migrations
            .iter()
            .map(|(name, migration)| (name.as_str(), migration))
    }
}

impl Debug for MigrationRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("migrations", &self.names())
            .finish()
    }
}

pub fn is_valid_migration_name(name: &str) -> bool {
    MIGRATION_NAME.is_match(name)
}

/// StudlyCase label for a migration name, e.g.
/// `2024_01_01_000000_create_quizzes` -> `CreateQuizzes`.
pub fn class_name(name: &str) -> String {
    TIMESTAMP_PREFIX
        .replace(name, "")
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
