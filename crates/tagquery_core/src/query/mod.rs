//! Query compilation and evaluation over the persisted index.
//!
//! # Responsibility
//! - Parse boolean tag expressions and evaluate them as staged set operations.
//! - Rank notes against natural-language phrases by TF-IDF.
//! - Route composite queries and collapse engine failures at the boundary.
//!
//! # Invariants
//! - Syntax errors are raised before any temporary relation exists.
//! - Temporary relations never outlive the query invocation that made them.
//! - Every storage read of one query runs inside one [`ReadSnapshot`], so a
//!   concurrent rebuild is seen entirely or not at all.
//! - Engines return `Ok(vec![])` for a valid query without matches.

pub mod ast;
pub mod boolean;
pub mod relevance;
pub mod router;

use crate::db::{quote_identifier, DbError};
use log::warn;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique number for naming per-query temporary objects.
pub(crate) fn next_session() -> u64 {
    NEXT_SESSION.fetch_add(1, Ordering::Relaxed)
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Failure raised by the boolean and relevance engines.
#[derive(Debug)]
pub enum QueryError {
    /// Malformed boolean expression. `position` is a byte offset into `query`.
    Syntax {
        query: String,
        position: usize,
        message: String,
    },
    /// Well-formed expression referencing a tag absent from the index.
    UnknownTag(String),
    /// The index was built with another stemmer language.
    LanguageMismatch {
        indexed: String,
        configured: String,
    },
    Db(DbError),
    InvalidData(String),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax {
                query,
                position,
                message,
            } => write!(f, "syntax error at {position} in `{query}`: {message}"),
            Self::UnknownTag(tag) => write!(f, "unknown tag `{tag}`"),
            Self::LanguageMismatch {
                indexed,
                configured,
            } => write!(
                f,
                "index was built for language `{indexed}`, queries configured for `{configured}`"
            ),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid index row: {message}"),
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

impl QueryError {
    pub(crate) fn syntax(query: &str, position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            query: query.to_string(),
            position,
            message: message.into(),
        }
    }

    /// Stable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "syntax_error",
            Self::UnknownTag(_) => "unknown_tag",
            Self::LanguageMismatch { .. } => "language_mismatch",
            Self::Db(_) => "db_error",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

/// Savepoint pinning one consistent view of the index for a query.
///
/// Outside a transaction the savepoint opens a deferred read transaction;
/// inside one (a router holding its own snapshot) it nests. Dropping an
/// unreleased snapshot rolls back to it.
pub(crate) struct ReadSnapshot<'conn> {
    conn: &'conn Connection,
    name: String,
    released: bool,
}

impl<'conn> ReadSnapshot<'conn> {
    pub(crate) fn begin(conn: &'conn Connection) -> QueryResult<Self> {
        let name = format!("snapshot_{}", next_session());
        conn.execute_batch(&format!("SAVEPOINT {};", quote_identifier(&name)))?;
        Ok(Self {
            conn,
            name,
            released: false,
        })
    }

    pub(crate) fn release(mut self) -> QueryResult<()> {
        self.released = true;
        self.conn
            .execute_batch(&format!("RELEASE {};", quote_identifier(&self.name)))?;
        Ok(())
    }
}

impl Drop for ReadSnapshot<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let quoted = quote_identifier(&self.name);
        if let Err(err) = self
            .conn
            .execute_batch(&format!("ROLLBACK TO {quoted}; RELEASE {quoted};"))
        {
            warn!(
                "event=query_snapshot module=query status=error savepoint={} error={}",
                self.name, err
            );
        }
    }
}
