//! Quiz domain schema, expressed as ledger migrations.
//!
//! # Responsibility
//! - Declare the domain tables, seed data and every legacy version step as
//!   ordinary registered migrations.
//! - Keep the legacy version scalar in step with the ledger (`upgrader`).
//! - Offer statistics and index maintenance (`maintenance`).
//!
//! # Invariants
//! - The ledger is the single record of schema state; the version scalar is
//!   written only after every migration of an upgrade succeeded.
//! - Both profiles register the same migration names; they differ only in
//!   what the table-creation step creates.

use crate::config::StoreConfig;
use crate::db::DbError;
use crate::events::outbox;
use crate::migrate::{FnMigration, Migration, MigrationError, MigrationRegistry, SqlMigration};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

mod maintenance;
mod seed;
mod tables;
mod upgrader;
mod version;

pub use maintenance::{CompositeIndex, SchemaMaintenance, COMPOSITE_INDEXES};
pub use seed::{archetype_count, DEFAULT_QUIZ_SLUG};
pub use tables::SchemaTables;
pub use upgrader::{UpgradeReport, VersionedUpgrader, VERSION_OPTION};
pub use version::SchemaVersion;

/// Version the bundled migrations bring a database to.
pub const CURRENT_VERSION: SchemaVersion = SchemaVersion::new(4, 0, 0);

pub const CREATE_TABLES: &str = "2024_01_01_000000_create_quiz_tables";
pub const SEED_DEFAULTS: &str = "2024_01_01_000100_seed_default_content";
pub const ADD_REPORTING_INDEXES: &str = "2024_02_01_000000_add_reporting_indexes";
pub const ADD_RESULT_METADATA: &str = "2024_03_01_000000_add_result_metadata";
pub const ADD_PROSPECT_GDPR_FIELDS: &str = "2024_04_01_000000_add_prospect_gdpr_fields";

pub type SchemaResult<T> = Result<T, SchemaError>;

#[derive(Debug)]
pub enum SchemaError {
    Db(DbError),
    Migration(MigrationError),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Migration(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SchemaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Migration(err) => Some(err),
        }
    }
}

impl From<DbError> for SchemaError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SchemaError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<MigrationError> for SchemaError {
    fn from(value: MigrationError) -> Self {
        Self::Migration(value)
    }
}

/// Which table-creation step the schema uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaProfile {
    #[default]
    Standard,
    /// Adds composite reporting indexes and the query-performance table.
    Optimized,
}

/// One registered migration plus the legacy version that implies it.
#[derive(Clone)]
pub struct SchemaStep {
    pub migration: Arc<dyn Migration>,
    /// `None` for steps that postdate the version scalar; those are never
    /// baselined and always run through the ledger.
    pub introduced_in: Option<SchemaVersion>,
}

impl SchemaStep {
    fn new(migration: impl Migration + 'static, introduced_in: Option<SchemaVersion>) -> Self {
        Self {
            migration: Arc::new(migration),
            introduced_in,
        }
    }

    pub fn name(&self) -> &str {
        self.migration.name()
    }
}

/// Every schema step, in ledger order.
pub fn steps(config: &StoreConfig, profile: SchemaProfile) -> Vec<SchemaStep> {
    let t = SchemaTables::new(config);
    let v1 = Some(SchemaVersion::new(1, 0, 0));

    let create_sql = match profile {
        SchemaProfile::Standard => tables::create_standard_sql(&t),
        SchemaProfile::Optimized => tables::create_optimized_sql(&t),
    };

    let (seed_archetypes, seed_quizzes) = (t.archetypes.clone(), t.quizzes.clone());
    let (unseed_archetypes, unseed_quizzes) = (t.archetypes.clone(), t.quizzes.clone());
    let seed = FnMigration::new(
        SEED_DEFAULTS,
        move |conn| seed::seed_defaults(conn, &seed_archetypes, &seed_quizzes),
        move |conn| seed::remove_defaults(conn, &unseed_archetypes, &unseed_quizzes),
    );

    let reporting_indexes = SqlMigration::new(
        ADD_REPORTING_INDEXES,
        format!(
            "CREATE INDEX IF NOT EXISTS {results}_user_quiz ON {results} (user_id, quiz_id);
             CREATE INDEX IF NOT EXISTS {prospects}_email_created ON {prospects} (email, created_at);",
            results = t.results,
            prospects = t.prospects,
        ),
        format!(
            "DROP INDEX IF EXISTS {results}_user_quiz;
             DROP INDEX IF EXISTS {prospects}_email_created;",
            results = t.results,
            prospects = t.prospects,
        ),
    );

    let result_metadata = SqlMigration::new(
        ADD_RESULT_METADATA,
        format!("ALTER TABLE {} ADD COLUMN metadata TEXT;", t.results),
        format!("ALTER TABLE {} DROP COLUMN metadata;", t.results),
    );

    let gdpr_fields = SqlMigration::new(
        ADD_PROSPECT_GDPR_FIELDS,
        format!(
            "ALTER TABLE {prospects} ADD COLUMN gdpr_consent_date TEXT;
             ALTER TABLE {prospects} ADD COLUMN data_retention_date TEXT;
             UPDATE {prospects} SET gdpr_consent_date = created_at WHERE consent_terms = 1;",
            prospects = t.prospects,
        ),
        format!(
            "ALTER TABLE {prospects} DROP COLUMN data_retention_date;
             ALTER TABLE {prospects} DROP COLUMN gdpr_consent_date;",
            prospects = t.prospects,
        ),
    );

    vec![
        SchemaStep::new(
            SqlMigration::new(CREATE_TABLES, create_sql, tables::drop_all_sql(&t)),
            v1,
        ),
        SchemaStep::new(seed, v1),
        SchemaStep::new(reporting_indexes, Some(SchemaVersion::new(2, 0, 0))),
        SchemaStep::new(result_metadata, Some(SchemaVersion::new(3, 0, 0))),
        SchemaStep::new(gdpr_fields, Some(SchemaVersion::new(4, 0, 0))),
        SchemaStep::new(outbox::migration(&config.outbox_table_name()), None),
    ]
}

/// Registry holding every schema step.
pub fn registry(config: &StoreConfig, profile: SchemaProfile) -> Result<MigrationRegistry, MigrationError> {
    let mut registry = MigrationRegistry::new();
    for step in steps(config, profile) {
        registry.register_shared(step.migration)?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::{registry, steps, SchemaProfile, SchemaVersion, CREATE_TABLES};
    use crate::config::StoreConfig;

    #[test]
    fn both_profiles_register_the_same_names() {
        let config = StoreConfig::default();
        let standard = registry(&config, SchemaProfile::Standard).unwrap();
        let optimized = registry(&config, SchemaProfile::Optimized).unwrap();
        assert_eq!(standard.names(), optimized.names());
        assert_eq!(standard.names().first().map(String::as_str), Some(CREATE_TABLES));
    }

    #[test]
    fn legacy_versions_never_decrease_along_the_ledger() {
        let tagged = steps(&StoreConfig::default(), SchemaProfile::Standard)
            .into_iter()
            .filter_map(|step| step.introduced_in)
            .collect::<Vec<SchemaVersion>>();
        assert_eq!(tagged.len(), 5);
        assert!(tagged.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
