//! Fluent, parameterized statement construction over one table.
//!
//! # Responsibility
//! - Accumulate projection, join, filter, grouping and paging state.
//! - Render one statement with `?` placeholders and execute it on demand.
//!
//! # Invariants
//! - Literals are always bound, never interpolated.
//! - Identifiers are validated before they are written into SQL text.
//! - `update`/`delete` refuse to run without at least one WHERE condition.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod builder;
mod clause;

pub use builder::QueryBuilder;
pub use clause::{Boolean, Condition, Direction, Join, JoinType, Operator};

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug)]
pub enum QueryError {
    Db(DbError),
    /// A table/column/expression failed identifier validation.
    InvalidIdentifier(String),
    /// A join used a non-comparison operator or a direction string was unknown.
    InvalidOperator(String),
    /// `update`/`delete` called with no WHERE condition.
    MissingWhereClause,
    /// `insert`/`update` called with no columns.
    EmptyData,
    /// A batch row carried a column the first row of the batch lacks.
    UnexpectedColumn(String),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidIdentifier(value) => write!(f, "invalid SQL identifier `{value}`"),
            Self::InvalidOperator(value) => write!(f, "invalid operator `{value}`"),
            Self::MissingWhereClause => {
                write!(f, "refusing to update or delete without a WHERE condition")
            }
            Self::EmptyData => write!(f, "no columns given for write"),
            Self::UnexpectedColumn(column) => {
                write!(f, "batch row has column `{column}` missing from the first row")
            }
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for QueryError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for QueryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
