//! Row-level data model shared by the query and repository layers.
//!
//! # Invariants
//! - Repositories exchange plain records, never typed domain objects.

pub mod record;

pub use record::Record;
