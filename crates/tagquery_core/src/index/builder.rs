//! Full index rebuild from an ordered note stream.
//!
//! # Responsibility
//! - Validate the whole corpus before touching storage.
//! - Replace tag, precedence, TF and IDF relations inside one transaction.
//!
//! # Invariants
//! - In-memory collections are ordered, so an unchanged corpus is written in
//!   the same order and yields identical relations.
//! - Stale tags and terms vanish: every previous tag relation is dropped.
//! - Tag relations are named by ordinal (`tag_0000`, ...) in tag order, never
//!   by tag text, so tags differing only in case get distinct relations.
//! - An empty corpus leaves only the (empty) universal relation.

use crate::config::EngineConfig;
use crate::db::quote_identifier;
use crate::index::{BuildError, BuildReport};
use crate::model::note::{CorpusNote, NoteId, UNIVERSAL_TAG};
use crate::text::TextNormalizer;
use log::{error, info, warn};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Rebuilds the persisted index on one connection.
pub struct IndexBuilder<'conn> {
    conn: &'conn mut Connection,
    normalizer: TextNormalizer,
    vacuum_after_build: bool,
}

impl<'conn> IndexBuilder<'conn> {
    /// Constructs a builder over a migrated connection.
    pub fn new(conn: &'conn mut Connection, config: &EngineConfig) -> Self {
        Self {
            conn,
            normalizer: TextNormalizer::new(config.language),
            vacuum_after_build: config.vacuum_after_build,
        }
    }

    /// Replaces the index with the content of `notes`.
    ///
    /// Iteration order of `notes` defines precedence.
    ///
    /// # Errors
    /// - `InvalidNote` / `DuplicateTitle` when any note is invalid; nothing is
    ///   written in that case.
    /// - `Db` when storage fails; the transaction is rolled back.
    pub fn build<I>(&mut self, notes: I) -> Result<BuildReport, BuildError>
    where
        I: IntoIterator<Item = CorpusNote>,
    {
        let started_at = Instant::now();
        info!(
            "event=index_build module=index status=start language={}",
            self.normalizer.language()
        );

        let result = BuildPlan::collect(notes, &self.normalizer)
            .and_then(|plan| self.write(&plan).map(|()| plan.report()));

        match result {
            Ok(report) => {
                info!(
                    "event=index_build module=index status=ok duration_ms={} notes={} tags={} terms={}",
                    started_at.elapsed().as_millis(),
                    report.note_count,
                    report.tag_count,
                    report.term_count
                );
                Ok(report)
            }
            Err(err) => {
                error!(
                    "event=index_build module=index status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn write(&mut self, plan: &BuildPlan) -> Result<(), BuildError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        clear_index(&tx)?;
        write_tag_relations(&tx, plan)?;
        write_precedences(&tx, plan)?;
        write_term_statistics(&tx, plan)?;
        tx.execute(
            "INSERT INTO index_meta (key, value) VALUES ('language', ?1), ('note_count', ?2);",
            params![
                self.normalizer.language().code(),
                plan.notes.len().to_string()
            ],
        )?;
        tx.commit()?;

        if self.vacuum_after_build {
            compact(self.conn);
        }
        Ok(())
    }
}

/// Everything a rebuild writes, computed before the transaction opens.
struct BuildPlan {
    /// `(id, title)` in precedence order.
    notes: Vec<(NoteId, String)>,
    /// Tag to members in precedence order.
    tag_members: BTreeMap<String, Vec<NoteId>>,
    /// Per-note raw term counts, in precedence order.
    term_counts: Vec<(NoteId, BTreeMap<String, u32>)>,
    /// Number of notes containing each term.
    document_frequency: BTreeMap<String, u32>,
}

impl BuildPlan {
    fn collect<I>(notes: I, normalizer: &TextNormalizer) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = CorpusNote>,
    {
        let mut plan = Self {
            notes: Vec::new(),
            tag_members: BTreeMap::new(),
            term_counts: Vec::new(),
            document_frequency: BTreeMap::new(),
        };
        let mut positions: HashMap<NoteId, usize> = HashMap::new();

        for (position, note) in notes.into_iter().enumerate() {
            let tags = note
                .validated_tags()
                .map_err(|source| BuildError::InvalidNote {
                    position,
                    title: note.title.clone(),
                    source,
                })?;
            let note_id = note.id();
            if let Some(first) = positions.insert(note_id.clone(), position) {
                return Err(BuildError::DuplicateTitle {
                    title: note.title.trim().to_string(),
                    first,
                    second: position,
                });
            }

            for tag in tags {
                plan.tag_members
                    .entry(tag)
                    .or_default()
                    .push(note_id.clone());
            }

            let mut counts: BTreeMap<String, u32> = BTreeMap::new();
            for term in normalizer.terms(&note.indexed_text()) {
                *counts.entry(term).or_insert(0) += 1;
            }
            for term in counts.keys() {
                *plan.document_frequency.entry(term.clone()).or_insert(0) += 1;
            }

            plan.term_counts.push((note_id.clone(), counts));
            plan.notes.push((note_id, note.title.trim().to_string()));
        }

        Ok(plan)
    }

    fn report(&self) -> BuildReport {
        BuildReport {
            note_count: self.notes.len(),
            tag_count: self.tag_members.len(),
            term_count: self.document_frequency.len(),
        }
    }
}

fn clear_index(tx: &Transaction<'_>) -> Result<(), BuildError> {
    let stale = {
        let mut stmt = tx.prepare("SELECT relation FROM relation_registry WHERE tag != ?1;")?;
        let rows = stmt.query_map([UNIVERSAL_TAG], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    for relation in stale {
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {};",
            quote_identifier(&relation)
        ))?;
    }

    tx.execute("DELETE FROM relation_registry WHERE tag != ?1;", [UNIVERSAL_TAG])?;
    tx.execute_batch(
        "DELETE FROM tag_all_notes;
         DELETE FROM precedences;
         DELETE FROM tf;
         DELETE FROM idf;
         DELETE FROM index_meta;",
    )?;
    Ok(())
}

fn write_tag_relations(tx: &Transaction<'_>, plan: &BuildPlan) -> Result<(), BuildError> {
    let mut register = tx.prepare(
        "INSERT INTO relation_registry (tag, relation, note_count) VALUES (?1, ?2, ?3)
         ON CONFLICT(tag) DO UPDATE SET note_count = excluded.note_count;",
    )?;

    for (ordinal, (tag, members)) in plan.tag_members.iter().enumerate() {
        let relation = relation_name(ordinal);
        let quoted = quote_identifier(&relation);
        tx.execute_batch(&format!(
            "CREATE TABLE {quoted} (note_id TEXT NOT NULL);
             CREATE UNIQUE INDEX {} ON {quoted} (note_id);",
            quote_identifier(&format!("idx_{relation}")),
        ))?;
        let mut insert = tx.prepare(&format!("INSERT INTO {quoted} (note_id) VALUES (?1);"))?;
        for note_id in members {
            insert.execute([note_id])?;
        }
        register.execute(params![tag, relation, members.len() as i64])?;
    }

    let mut insert_universal = tx.prepare(&format!(
        "INSERT INTO {} (note_id) VALUES (?1);",
        quote_identifier(UNIVERSAL_RELATION)
    ))?;
    for (note_id, _) in &plan.notes {
        insert_universal.execute([note_id])?;
    }
    register.execute(params![
        UNIVERSAL_TAG,
        UNIVERSAL_RELATION,
        plan.notes.len() as i64
    ])?;
    Ok(())
}

fn write_precedences(tx: &Transaction<'_>, plan: &BuildPlan) -> Result<(), BuildError> {
    let mut insert =
        tx.prepare("INSERT INTO precedences (note_id, precedence, title) VALUES (?1, ?2, ?3);")?;
    for (precedence, (note_id, title)) in plan.notes.iter().enumerate() {
        insert.execute(params![note_id, precedence as i64, title])?;
    }
    Ok(())
}

fn write_term_statistics(tx: &Transaction<'_>, plan: &BuildPlan) -> Result<(), BuildError> {
    let mut insert_tf = tx.prepare("INSERT INTO tf (term, note_id, log_tf) VALUES (?1, ?2, ?3);")?;
    for (note_id, counts) in &plan.term_counts {
        for (term, count) in counts {
            insert_tf.execute(params![term, note_id, log_tf(*count)])?;
        }
    }

    let total = plan.notes.len();
    let mut insert_idf = tx.prepare("INSERT INTO idf (term, log_idf) VALUES (?1, ?2);")?;
    for (term, containing) in &plan.document_frequency {
        insert_idf.execute(params![term, log_idf(total, *containing)])?;
    }
    Ok(())
}

/// Runs `VACUUM` on a committed index. Failure leaves a valid, uncompacted
/// file and is only logged.
fn compact(conn: &Connection) -> bool {
    match conn.execute_batch("VACUUM;") {
        Ok(()) => true,
        Err(err) => {
            warn!(
                "event=index_vacuum module=index status=error error_code=vacuum_failed error={}",
                err
            );
            false
        }
    }
}

const UNIVERSAL_RELATION: &str = "tag_all_notes";

/// Physical relation for the `ordinal`-th tag in tag order.
fn relation_name(ordinal: usize) -> String {
    format!("tag_{ordinal:04}")
}

/// `ln(1 + count)`.
pub(crate) fn log_tf(count: u32) -> f64 {
    f64::from(count).ln_1p()
}

/// `ln(total / containing)`; zero for a term present in every note.
pub(crate) fn log_idf(total: usize, containing: u32) -> f64 {
    (total as f64 / f64::from(containing)).ln()
}

#[cfg(test)]
mod tests {
    use super::{compact, log_idf, log_tf, relation_name, BuildPlan};
    use crate::db::open_db_in_memory;
    use crate::config::StemLanguage;
    use crate::index::BuildError;
    use crate::model::note::CorpusNote;
    use crate::text::TextNormalizer;

    #[test]
    fn weights_follow_log_formulas() {
        assert!((log_tf(1) - 2f64.ln()).abs() < 1e-12);
        assert!((log_tf(3) - 4f64.ln()).abs() < 1e-12);
        assert!((log_idf(4, 1) - 4f64.ln()).abs() < 1e-12);
        assert_eq!(log_idf(3, 3), 0.0);
    }

    #[test]
    fn compact_failure_is_reported_not_raised() {
        let conn = open_db_in_memory().unwrap();
        assert!(compact(&conn));

        conn.execute_batch("BEGIN;").unwrap();
        assert!(!compact(&conn));
        conn.execute_batch("ROLLBACK;").unwrap();
    }

    #[test]
    fn relation_names_are_ordinal() {
        assert_eq!(relation_name(0), "tag_0000");
        assert_eq!(relation_name(42), "tag_0042");
        assert_eq!(relation_name(12345), "tag_12345");
    }

    #[test]
    fn plan_counts_terms_and_document_frequency() {
        let normalizer = TextNormalizer::new(StemLanguage::English);
        let plan = BuildPlan::collect(
            vec![
                CorpusNote::new("Cats", ["pets"], "cat cats dog"),
                CorpusNote::new("Dogs", ["pets"], "dog"),
            ],
            &normalizer,
        )
        .unwrap();

        assert_eq!(plan.notes.len(), 2);
        assert_eq!(plan.tag_members["pets"].len(), 2);
        assert_eq!(plan.term_counts[0].1["cat"], 3);
        assert_eq!(plan.document_frequency["dog"], 2);
        assert_eq!(plan.document_frequency["cat"], 1);
    }

    #[test]
    fn plan_rejects_duplicate_titles() {
        let normalizer = TextNormalizer::new(StemLanguage::English);
        let err = BuildPlan::collect(
            vec![
                CorpusNote::new("Same", Vec::<String>::new(), ""),
                CorpusNote::new(" Same ", Vec::<String>::new(), ""),
            ],
            &normalizer,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            BuildError::DuplicateTitle {
                first: 0,
                second: 1,
                ..
            }
        ));
    }
}
