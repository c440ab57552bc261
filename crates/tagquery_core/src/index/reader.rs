//! Read-side lookups over the persisted index.
//!
//! # Invariants
//! - Relation names come from `relation_registry` only.
//! - Listings are ordered by precedence; tag counts by count then name.

use crate::config::StemLanguage;
use crate::db::quote_identifier;
use crate::model::note::{NoteId, UNIVERSAL_TAG};
use crate::query::{QueryError, QueryResult, ReadSnapshot};
use rusqlite::{Connection, OptionalExtension};

/// One entry of the tag cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub tag: String,
    pub note_count: u32,
}

/// Read-only view of a built index.
pub struct IndexReader<'conn> {
    conn: &'conn Connection,
}

impl<'conn> IndexReader<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Returns the registered relation for `tag`, if the tag is indexed.
    pub fn relation_for(&self, tag: &str) -> QueryResult<Option<String>> {
        let relation = self
            .conn
            .query_row(
                "SELECT relation FROM relation_registry WHERE tag = ?1;",
                [tag],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(relation)
    }

    /// Same as [`Self::relation_for`] but fails with `UnknownTag`.
    pub fn require_relation(&self, tag: &str) -> QueryResult<String> {
        self.relation_for(tag)?
            .ok_or_else(|| QueryError::UnknownTag(tag.to_string()))
    }

    /// User tags with note counts, most used first, ties by tag name.
    pub fn tag_counts(&self) -> QueryResult<Vec<TagCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT tag, note_count
             FROM relation_registry
             WHERE tag != ?1
             ORDER BY note_count DESC, tag ASC;",
        )?;
        let rows = stmt.query_map([UNIVERSAL_TAG], |row| {
            Ok(TagCount {
                tag: row.get(0)?,
                note_count: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Members of one tag in corpus order.
    pub fn notes_for_tag(&self, tag: &str) -> QueryResult<Vec<NoteId>> {
        let snapshot = ReadSnapshot::begin(self.conn)?;
        let relation = self.require_relation(tag)?;
        let members = self.ordered_members(&relation)?;
        snapshot.release()?;
        Ok(members)
    }

    /// Number of notes in the last successful build.
    pub fn note_count(&self) -> QueryResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM precedences;", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|_| QueryError::InvalidData(format!("count {count}")))
    }

    /// Stemmer language recorded by the last build; `None` before any build.
    pub fn indexed_language(&self) -> QueryResult<Option<StemLanguage>> {
        let code = self
            .conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'language';",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        code.map(|code| {
            code.parse::<StemLanguage>()
                .map_err(|err| QueryError::InvalidData(err.to_string()))
        })
        .transpose()
    }

    /// Title of an indexed note, for presentation lookups.
    pub fn title_for(&self, note_id: &NoteId) -> QueryResult<Option<String>> {
        let title = self
            .conn
            .query_row(
                "SELECT title FROM precedences WHERE note_id = ?1;",
                [note_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(title)
    }

    /// Rows of `relation` joined with precedences, ascending.
    pub(crate) fn ordered_members(&self, relation: &str) -> QueryResult<Vec<NoteId>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT a.note_id
             FROM {} a
             JOIN precedences p ON p.note_id = a.note_id
             ORDER BY p.precedence ASC;",
            quote_identifier(relation)
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, NoteId>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
