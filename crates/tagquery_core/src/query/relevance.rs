//! TF-IDF ranking of notes against a natural-language phrase.
//!
//! # Invariants
//! - Query text goes through the same [`TextNormalizer`] as indexed text.
//! - Repeated query words count once.
//! - Notes sharing no term with the query are absent, not scored zero.
//! - Order is score descending, then precedence ascending.
//! - Query terms are staged in a temporary relation and joined, so phrase
//!   length is not bounded by the statement parameter limit.

use crate::config::EngineConfig;
use crate::db::quote_identifier;
use crate::index::reader::IndexReader;
use crate::model::note::NoteId;
use crate::query::{next_session, QueryError, QueryResult, ReadSnapshot};
use crate::text::TextNormalizer;
use log::{info, warn};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::time::Instant;

/// One ranked note.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredNote {
    pub note_id: NoteId,
    pub score: f64,
}

/// Ranks notes by the sum of `log_tf * log_idf` over shared terms.
pub struct RelevanceQueryEngine<'conn> {
    conn: &'conn Connection,
    normalizer: TextNormalizer,
}

impl<'conn> RelevanceQueryEngine<'conn> {
    pub fn new(conn: &'conn Connection, config: &EngineConfig) -> Self {
        Self {
            conn,
            normalizer: TextNormalizer::new(config.language),
        }
    }

    /// Returns matching note identifiers, most relevant first.
    pub fn find_notes(&self, phrase: &str) -> QueryResult<Vec<NoteId>> {
        Ok(self
            .score_notes(phrase)?
            .into_iter()
            .map(|scored| scored.note_id)
            .collect())
    }

    /// Returns matching notes with their TF-IDF scores, most relevant first.
    ///
    /// # Errors
    /// - `LanguageMismatch` when the index was built with another stemmer.
    pub fn score_notes(&self, phrase: &str) -> QueryResult<Vec<ScoredNote>> {
        let started_at = Instant::now();
        let result = self.run(phrase);
        match &result {
            Ok(scored) => info!(
                "event=relevance_query module=query status=ok duration_ms={} query_len={} results={}",
                started_at.elapsed().as_millis(),
                phrase.len(),
                scored.len()
            ),
            Err(err) => warn!(
                "event=relevance_query module=query status=error duration_ms={} query_len={} error_code={} error={}",
                started_at.elapsed().as_millis(),
                phrase.len(),
                err.code(),
                err
            ),
        }
        result
    }

    fn run(&self, phrase: &str) -> QueryResult<Vec<ScoredNote>> {
        let terms = self.normalizer.unique_terms(phrase);
        let snapshot = ReadSnapshot::begin(self.conn)?;
        self.ensure_language_matches()?;

        let scored = if terms.is_empty() {
            Vec::new()
        } else {
            let staged = TermRelation::stage(self.conn, &terms)?;
            self.score_against(&staged)?
        };
        snapshot.release()?;
        Ok(scored)
    }

    fn score_against(&self, terms: &TermRelation<'_>) -> QueryResult<Vec<ScoredNote>> {
        let sql = format!(
            "SELECT
                tf.note_id AS note_id,
                SUM(tf.log_tf * idf.log_idf) AS score
             FROM temp.{} q
             JOIN tf ON tf.term = q.term
             JOIN idf ON idf.term = tf.term
             JOIN precedences p ON p.note_id = tf.note_id
             GROUP BY tf.note_id
             ORDER BY score DESC, MIN(p.precedence) ASC, tf.note_id ASC;",
            quote_identifier(&terms.name)
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(ScoredNote {
                note_id: row.get("note_id")?,
                score: row.get("score")?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn ensure_language_matches(&self) -> QueryResult<()> {
        let configured = self.normalizer.language();
        match IndexReader::new(self.conn).indexed_language()? {
            Some(indexed) if indexed != configured => Err(QueryError::LanguageMismatch {
                indexed: indexed.code().to_string(),
                configured: configured.code().to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Distinct query terms of one invocation; dropped with the value.
struct TermRelation<'conn> {
    conn: &'conn Connection,
    name: String,
}

impl<'conn> TermRelation<'conn> {
    fn stage(conn: &'conn Connection, terms: &BTreeSet<String>) -> QueryResult<Self> {
        let name = format!("terms{}", next_session());
        let quoted = quote_identifier(&name);
        conn.execute_batch(&format!(
            "CREATE TEMP TABLE {quoted} (term TEXT PRIMARY KEY NOT NULL);"
        ))?;
        let relation = Self { conn, name };

        let mut insert = conn.prepare(&format!("INSERT INTO temp.{quoted} (term) VALUES (?1);"))?;
        for term in terms {
            insert.execute([term])?;
        }
        Ok(relation)
    }
}

impl Drop for TermRelation<'_> {
    fn drop(&mut self) {
        let sql = format!("DROP TABLE IF EXISTS temp.{};", quote_identifier(&self.name));
        if let Err(err) = self.conn.execute_batch(&sql) {
            warn!(
                "event=relevance_query_cleanup module=query status=error relation={} error={}",
                self.name, err
            );
        }
    }
}
