//! Composite query routing.
//!
//! A composite query is `<natural language> <separator> <tag expression>`,
//! either part optional. With both parts, relevance results are filtered by
//! membership in the boolean results and keep relevance order: the boolean
//! branch never reorders or adds notes.
//!
//! # Invariants
//! - Engine errors become [`QueryOutcome::Unprocessable`]; their detail is
//!   logged here and not propagated.
//! - A query with neither part is processed and empty, not rejected.
//! - With both parts, the two engines read the same snapshot of the index.

use crate::config::EngineConfig;
use crate::model::note::NoteId;
use crate::query::boolean::TagQueryEngine;
use crate::query::relevance::RelevanceQueryEngine;
use crate::query::{QueryResult, ReadSnapshot};
use log::{info, warn};
use rusqlite::Connection;
use std::collections::HashSet;
use std::time::Instant;

/// Result handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Query was processed; the list may be empty.
    Found(Vec<NoteId>),
    /// Query could not be processed (bad syntax, unknown tag, storage failure).
    Unprocessable,
}

impl QueryOutcome {
    pub fn is_unprocessable(&self) -> bool {
        matches!(self, Self::Unprocessable)
    }

    /// Processed with no matching notes.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Found(ids) if ids.is_empty())
    }

    pub fn note_ids(&self) -> Option<&[NoteId]> {
        match self {
            Self::Found(ids) => Some(ids),
            Self::Unprocessable => None,
        }
    }
}

/// Parts of a composite query after splitting and trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParts<'q> {
    pub natural_language: Option<&'q str>,
    pub tag_expression: Option<&'q str>,
}

/// Splits `raw` on every `separator`; the text part precedes the first one
/// and the tag part lies between the first and the second. Anything after a
/// second separator is ignored. Blank parts become `None`.
pub fn split_query<'q>(raw: &'q str, separator: &str) -> QueryParts<'q> {
    let mut segments = raw.split(separator);
    let text = segments.next().unwrap_or_default();
    QueryParts {
        natural_language: non_blank(text),
        tag_expression: segments.next().and_then(non_blank),
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Dispatches composite queries to the tag and relevance engines.
pub struct QueryRouter<'conn> {
    conn: &'conn Connection,
    tags: TagQueryEngine<'conn>,
    relevance: RelevanceQueryEngine<'conn>,
    separator: String,
}

impl<'conn> QueryRouter<'conn> {
    pub fn new(conn: &'conn Connection, config: &EngineConfig) -> Self {
        Self {
            conn,
            tags: TagQueryEngine::new(conn, config),
            relevance: RelevanceQueryEngine::new(conn, config),
            separator: config.query_separator.clone(),
        }
    }

    /// Runs a composite query.
    pub fn find_notes(&self, raw: &str) -> QueryOutcome {
        let started_at = Instant::now();
        let parts = split_query(raw, &self.separator);

        match self.dispatch(&parts) {
            Ok(ids) => {
                info!(
                    "event=query_route module=query status=ok duration_ms={} has_text={} has_tags={} results={}",
                    started_at.elapsed().as_millis(),
                    parts.natural_language.is_some(),
                    parts.tag_expression.is_some(),
                    ids.len()
                );
                QueryOutcome::Found(ids)
            }
            Err(err) => {
                warn!(
                    "event=query_route module=query status=unprocessable duration_ms={} has_text={} has_tags={} error_code={}",
                    started_at.elapsed().as_millis(),
                    parts.natural_language.is_some(),
                    parts.tag_expression.is_some(),
                    err.code()
                );
                QueryOutcome::Unprocessable
            }
        }
    }

    fn dispatch(&self, parts: &QueryParts<'_>) -> QueryResult<Vec<NoteId>> {
        match (parts.natural_language, parts.tag_expression) {
            (Some(text), Some(tags)) => {
                let snapshot = ReadSnapshot::begin(self.conn)?;
                let ranked = self.relevance.find_notes(text)?;
                let allowed: HashSet<NoteId> = self.tags.find_notes(tags)?.into_iter().collect();
                snapshot.release()?;
                Ok(ranked
                    .into_iter()
                    .filter(|note_id| allowed.contains(note_id))
                    .collect())
            }
            (Some(text), None) => self.relevance.find_notes(text),
            (None, Some(tags)) => self.tags.find_notes(tags),
            (None, None) => Ok(Vec::new()),
        }
    }
}
