//! Boolean tag query evaluation by staged temporary relations.
//!
//! # Responsibility
//! - Resolve tag atoms against the relation registry.
//! - Evaluate the AST post-order, materializing one temporary relation per
//!   `Not`/`And`/`Or` node, then order the final relation by precedence.
//!
//! # Invariants
//! - Parsing and tag resolution finish before the first temporary relation.
//! - Temporary relation names embed a process-wide session number, so two
//!   identical queries never share a name, on one connection or across many.
//! - Every temporary relation is dropped when the query returns.

use crate::config::EngineConfig;
use crate::db::quote_identifier;
use crate::index::reader::IndexReader;
use crate::model::note::{NoteId, UNIVERSAL_TAG};
use crate::query::ast::{parse_with_limits, Expr, ParseLimits};
use crate::query::{next_session, QueryError, QueryResult, ReadSnapshot};
use log::{info, warn};
use rusqlite::Connection;
use std::collections::HashMap;
use std::time::Instant;

/// Compiles boolean tag expressions into set operations over the index.
///
/// AND is an intersection, OR a de-duplicated union, NOT the complement
/// against the universal relation. Output follows corpus precedence.
pub struct TagQueryEngine<'conn> {
    conn: &'conn Connection,
    limits: ParseLimits,
}

impl<'conn> TagQueryEngine<'conn> {
    pub fn new(conn: &'conn Connection, config: &EngineConfig) -> Self {
        Self {
            conn,
            limits: ParseLimits::from(config),
        }
    }

    /// Returns identifiers of notes matching `query`, in corpus order.
    ///
    /// # Errors
    /// - `Syntax` for a malformed expression; storage is not touched.
    /// - `UnknownTag` for a tag absent from the index; storage is not written.
    pub fn find_notes(&self, query: &str) -> QueryResult<Vec<NoteId>> {
        let started_at = Instant::now();
        let result = self.evaluate(query);
        match &result {
            Ok((ids, staged)) => info!(
                "event=tag_query module=query status=ok duration_ms={} query_len={} staged_relations={} results={}",
                started_at.elapsed().as_millis(),
                query.len(),
                staged,
                ids.len()
            ),
            Err(err) => warn!(
                "event=tag_query module=query status=error duration_ms={} query_len={} error_code={} error={}",
                started_at.elapsed().as_millis(),
                query.len(),
                err.code(),
                err
            ),
        }
        result.map(|(ids, _)| ids)
    }

    /// Parses `query` and checks every tag exists, without evaluating it.
    pub fn compile(&self, query: &str) -> QueryResult<Expr> {
        let expr = parse_with_limits(query, self.limits)?;
        self.resolve(&expr)?;
        Ok(expr)
    }

    fn evaluate(&self, query: &str) -> QueryResult<(Vec<NoteId>, usize)> {
        let expr = parse_with_limits(query, self.limits)?;
        let snapshot = ReadSnapshot::begin(self.conn)?;
        let relations = self.resolve(&expr)?;

        let evaluated = {
            let mut scope = StagingScope::new(self.conn, &relations);
            let final_relation = scope.stage(&expr)?;
            let ids = IndexReader::new(self.conn).ordered_members(&final_relation)?;
            (ids, scope.staged.len())
        };
        snapshot.release()?;
        Ok(evaluated)
    }

    /// Maps every referenced tag, plus the universal tag, to its relation.
    fn resolve(&self, expr: &Expr) -> QueryResult<HashMap<String, String>> {
        let reader = IndexReader::new(self.conn);
        let mut relations = HashMap::new();
        for tag in expr.tags() {
            relations.insert(tag.to_string(), reader.require_relation(tag)?);
        }
        relations.insert(
            UNIVERSAL_TAG.to_string(),
            reader.require_relation(UNIVERSAL_TAG)?,
        );
        Ok(relations)
    }
}

/// Temporary relations of one query invocation; dropped with the scope.
struct StagingScope<'a> {
    conn: &'a Connection,
    relations: &'a HashMap<String, String>,
    session: u64,
    staged: Vec<String>,
}

impl<'a> StagingScope<'a> {
    fn new(conn: &'a Connection, relations: &'a HashMap<String, String>) -> Self {
        Self {
            conn,
            relations,
            session: next_session(),
            staged: Vec::new(),
        }
    }

    /// Post-order evaluation; returns the relation holding `expr`'s members.
    fn stage(&mut self, expr: &Expr) -> QueryResult<String> {
        match expr {
            Expr::Leaf(tag) => self.relation(tag),
            Expr::Not(child) => {
                let operand = self.stage(child)?;
                let universe = self.relation(UNIVERSAL_TAG)?;
                self.materialize(&complement_sql(&universe, &operand))
            }
            Expr::And(children) => {
                let operands = self.stage_all(children)?;
                self.materialize(&intersection_sql(&operands))
            }
            Expr::Or(children) => {
                let operands = self.stage_all(children)?;
                self.materialize(&union_sql(&operands))
            }
        }
    }

    fn stage_all(&mut self, children: &[Expr]) -> QueryResult<Vec<String>> {
        children.iter().map(|child| self.stage(child)).collect()
    }

    fn relation(&self, tag: &str) -> QueryResult<String> {
        self.relations
            .get(tag)
            .cloned()
            .ok_or_else(|| QueryError::UnknownTag(tag.to_string()))
    }

    fn materialize(&mut self, select_sql: &str) -> QueryResult<String> {
        let name = format!("q{}_{}", self.session, self.staged.len());
        let quoted = quote_identifier(&name);
        self.conn
            .execute_batch(&format!("CREATE TEMP TABLE {quoted} AS {select_sql};"))?;
        self.staged.push(name.clone());
        self.conn.execute_batch(&format!(
            "CREATE UNIQUE INDEX temp.{} ON {quoted} (note_id);",
            quote_identifier(&format!("idx_{name}"))
        ))?;
        Ok(name)
    }
}

impl Drop for StagingScope<'_> {
    fn drop(&mut self) {
        for name in self.staged.iter().rev() {
            let sql = format!("DROP TABLE IF EXISTS temp.{};", quote_identifier(name));
            if let Err(err) = self.conn.execute_batch(&sql) {
                warn!(
                    "event=tag_query_cleanup module=query status=error relation={} error={}",
                    name, err
                );
            }
        }
    }
}

fn intersection_sql(operands: &[String]) -> String {
    let mut sql = format!(
        "SELECT r0.note_id AS note_id FROM {} r0",
        quote_identifier(&operands[0])
    );
    for (idx, operand) in operands.iter().enumerate().skip(1) {
        sql.push_str(&format!(
            " JOIN {} r{idx} ON r{idx}.note_id = r0.note_id",
            quote_identifier(operand)
        ));
    }
    sql
}

fn union_sql(operands: &[String]) -> String {
    operands
        .iter()
        .map(|operand| format!("SELECT note_id FROM {}", quote_identifier(operand)))
        .collect::<Vec<_>>()
        .join(" UNION ")
}

fn complement_sql(universe: &str, operand: &str) -> String {
    format!(
        "SELECT u.note_id AS note_id FROM {} u
         WHERE NOT EXISTS (SELECT 1 FROM {} o WHERE o.note_id = u.note_id)",
        quote_identifier(universe),
        quote_identifier(operand)
    )
}
