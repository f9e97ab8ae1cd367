//! Operator CLI for the quiz store schema.
//!
//! # Responsibility
//! - Run, inspect and roll back ledger migrations against one database file.
//! - Drive the versioned upgrade and index maintenance.
//!
//! # Invariants
//! - Every command opens its own connection and exits non-zero on error.
//! - Machine-readable results are printed as JSON on stdout.

use clap::{Parser, Subcommand};
use log::error;
use quizstore_core::logging::FacadeLogger;
use quizstore_core::{
    default_log_level, init_logging, open_db, SchemaMaintenance, SchemaProfile, StoreConfig,
    StoreLogger, VersionedUpgrader,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Quiz store schema and maintenance tool.
#[derive(Parser)]
#[command(name = "quizstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite database file.
    #[arg(long, env = "QUIZSTORE_DB", global = true, default_value = "quizstore.sqlite3")]
    db: PathBuf,

    /// JSON configuration file; defaults apply when omitted.
    #[arg(long, env = "QUIZSTORE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Absolute directory for rolling log files; logging is off when omitted.
    #[arg(long, env = "QUIZSTORE_LOG_DIR", global = true)]
    log_dir: Option<String>,

    /// Log level: trace, debug, info, warn or error.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ledger migrations.
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Bring the schema to the current version.
    Upgrade {
        /// Create tables with composite reporting indexes.
        #[arg(long)]
        optimized: bool,
    },
    /// Statistics and index maintenance.
    Maintain {
        #[command(subcommand)]
        action: MaintainAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply every pending migration as one batch.
    Run,
    /// Print completed and pending migrations.
    Status,
    /// Roll back the newest batches.
    Rollback {
        /// Number of batches to roll back.
        #[arg(long, default_value = "1")]
        steps: u32,
    },
    /// Roll back every batch.
    Reset {
        /// Required; without it nothing is rolled back.
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum MaintainAction {
    /// Refresh planner statistics.
    Optimize,
    /// Create composite indexes that are missing.
    Indexes,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(&cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    let conn = open_db(&cli.db)?;
    let logger: Arc<dyn StoreLogger> = Arc::new(FacadeLogger);

    let output = match &cli.command {
        Commands::Migrate { action } => {
            let migrator = VersionedUpgrader::new(&conn, config, logger).migrator()?;
            match action {
                MigrateAction::Run => serde_json::to_value(migrator.run()?)?,
                MigrateAction::Status => serde_json::to_value(migrator.status()?)?,
                MigrateAction::Rollback { steps } => {
                    serde_json::json!({ "rolled_back": migrator.rollback(*steps)? })
                }
                MigrateAction::Reset { confirm } => {
                    let rolled_back = migrator.reset(*confirm)?;
                    serde_json::json!({
                        "confirmed": rolled_back.is_some(),
                        "rolled_back": rolled_back.unwrap_or_default(),
                    })
                }
            }
        }
        Commands::Upgrade { optimized } => {
            let profile = if *optimized {
                SchemaProfile::Optimized
            } else {
                SchemaProfile::Standard
            };
            let upgrader = VersionedUpgrader::new(&conn, config, logger).with_profile(profile);
            serde_json::to_value(upgrader.upgrade()?)?
        }
        Commands::Maintain { action } => {
            let maintenance = SchemaMaintenance::new(&conn, &config, logger);
            match action {
                MaintainAction::Optimize => {
                    serde_json::json!({ "analyzed": maintenance.optimize_tables()? })
                }
                MaintainAction::Indexes => {
                    serde_json::json!({ "created": maintenance.add_missing_indexes()? })
                }
            }
        }
    };

    Ok(output)
}
