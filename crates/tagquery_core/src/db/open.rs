//! Connection bootstrap for index databases.
//!
//! # Invariants
//! - Returned connections have the index schema fully migrated.
//! - Returned connections wait up to `BUSY_TIMEOUT` on a locked database, so
//!   readers tolerate a concurrent rebuild transaction.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const FIELD_DB_FILE_NAME: &str = "index.db";

/// Opens (or creates) an index database file and applies pending migrations.
///
/// Each thread that serves queries should open its own connection.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    open_with("file", || Connection::open(path))
}

/// Returns `<root>/<field>/index.db`, the index file of one knowledge field.
///
/// Field names are restricted to ASCII alphanumerics, `_` and `-`.
pub fn field_db_path(root: impl AsRef<Path>, field: &str) -> DbResult<PathBuf> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(DbError::InvalidFieldName(field.to_string()));
    }
    Ok(root.as_ref().join(field).join(FIELD_DB_FILE_NAME))
}

/// Opens the index of one knowledge field, creating its directory if needed.
pub fn open_field_db(root: impl AsRef<Path>, field: &str) -> DbResult<Connection> {
    let path = field_db_path(root, field)?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    open_db(&path)
}

/// Opens an in-memory index database and applies pending migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with("memory", Connection::open_in_memory)
}

fn open_with(
    mode: &'static str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = connect().map_err(|err| {
        error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={err}",
            started_at.elapsed().as_millis(),
        );
        err
    })?;

    if let Err(err) = bootstrap_connection(&mut conn) {
        error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={err}",
            started_at.elapsed().as_millis(),
        );
        return Err(err);
    }

    info!(
        "event=db_open module=db status=ok mode={mode} duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

fn bootstrap_connection(conn: &mut Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    apply_migrations(conn)?;
    Ok(())
}
