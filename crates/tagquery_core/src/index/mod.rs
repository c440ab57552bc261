//! Persisted index: build pipeline and read-side lookups.
//!
//! # Responsibility
//! - Rebuild tag-membership, precedence, TF and IDF relations from a corpus.
//! - Serve registry-backed lookups (tag counts, single-tag listings).
//!
//! # Invariants
//! - A rebuild replaces the whole index in one transaction or changes nothing.
//! - Every tag relation is listed in `relation_registry`; query code only
//!   references relation names read from there.

pub mod builder;
pub mod reader;

use crate::db::DbError;
use crate::model::note::NoteValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Index rebuild failure. The previous index stays intact.
#[derive(Debug)]
pub enum BuildError {
    /// Note at `position` (0-based corpus order) is structurally invalid.
    InvalidNote {
        position: usize,
        title: String,
        source: NoteValidationError,
    },
    /// Two notes hash to the same identifier.
    DuplicateTitle {
        title: String,
        first: usize,
        second: usize,
    },
    Db(DbError),
}

impl Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNote {
                position,
                title,
                source,
            } => write!(f, "invalid note #{position} `{title}`: {source}"),
            Self::DuplicateTitle {
                title,
                first,
                second,
            } => write!(
                f,
                "duplicate note title `{title}` at positions {first} and {second}"
            ),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidNote { source, .. } => Some(source),
            Self::DuplicateTitle { .. } => None,
            Self::Db(err) => Some(err),
        }
    }
}

impl From<DbError> for BuildError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for BuildError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Summary of one successful rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub note_count: usize,
    /// Distinct user tags; the universal tag is not counted.
    pub tag_count: usize,
    pub term_count: usize,
}
