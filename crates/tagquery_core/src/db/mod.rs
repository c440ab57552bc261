//! SQLite storage bootstrap for the persisted index.
//!
//! # Responsibility
//! - Open and configure SQLite connections used by the builder and query engines.
//! - Apply the index schema migrations in deterministic order.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - No index relation is read or written before migrations succeed.
//! - Per-tag relations are created at build time, not by migrations.
//! - Each knowledge field owns a separate database file; fields never share
//!   relations.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{field_db_path, open_db, open_db_in_memory, open_field_db};

pub type DbResult<T> = Result<T, DbError>;

/// Storage-layer failure shared by build and query paths.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was written by a newer build of this crate.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Field names become directory names and must be plain identifiers.
    InvalidFieldName(String),
    Io(std::io::Error),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "index schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::InvalidFieldName(field) => write!(f, "invalid field name `{field}`"),
            Self::Io(err) => write!(f, "io: {err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::InvalidFieldName(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Quotes an SQL identifier, doubling embedded quotes.
///
/// Only names read from the tag registry or generated by the query engine
/// reach this function; user input never does.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
