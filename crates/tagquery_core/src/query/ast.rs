//! Boolean tag expression grammar.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or_expr  := and_expr ("OR" and_expr)*
//! and_expr := not_expr ("AND" not_expr)*
//! not_expr := "NOT" not_expr | primary
//! primary  := TAG | "(" or_expr ")"
//! ```
//!
//! # Invariants
//! - Operators are the exact words `AND`, `OR`, `NOT`; any other word made of
//!   alphanumerics and `_` is a tag atom.
//! - `And`/`Or` nodes always hold at least two operands and never hold a
//!   direct child of the same operator.
//! - Nesting depth is checked before each descent, so recursion is bounded by
//!   [`ParseLimits::max_depth`] whatever the input length.

use crate::config::{EngineConfig, DEFAULT_MAX_QUERY_DEPTH, DEFAULT_MAX_QUERY_NODES};
use crate::model::note::is_tag_char;
use crate::query::{QueryError, QueryResult};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Parsed boolean tag expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Leaf(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    /// Total number of nodes, leaves included.
    pub fn node_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Not(child) => 1 + child.node_count(),
            Self::And(children) | Self::Or(children) => {
                1 + children.iter().map(Expr::node_count).sum::<usize>()
            }
        }
    }

    /// Distinct tags referenced by the expression.
    pub fn tags(&self) -> BTreeSet<&str> {
        let mut tags = BTreeSet::new();
        self.collect_tags(&mut tags);
        tags
    }

    fn collect_tags<'a>(&'a self, tags: &mut BTreeSet<&'a str>) {
        match self {
            Self::Leaf(tag) => {
                tags.insert(tag.as_str());
            }
            Self::Not(child) => child.collect_tags(tags),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_tags(tags);
                }
            }
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leaf(tag) => f.write_str(tag),
            Self::Not(child) => write!(f, "NOT {child}"),
            Self::And(children) => write_joined(f, children, " AND "),
            Self::Or(children) => write_joined(f, children, " OR "),
        }
    }
}

fn write_joined(f: &mut Formatter<'_>, children: &[Expr], separator: &str) -> std::fmt::Result {
    f.write_str("(")?;
    for (idx, child) in children.iter().enumerate() {
        if idx > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}

/// Size bounds applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Maximum AST nodes, leaves included.
    pub max_nodes: usize,
    /// Maximum nesting of `(` and `NOT`.
    pub max_depth: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_QUERY_NODES,
            max_depth: DEFAULT_MAX_QUERY_DEPTH,
        }
    }
}

impl From<&EngineConfig> for ParseLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_nodes: config.max_query_nodes,
            max_depth: config.max_query_depth,
        }
    }
}

/// Parses a boolean tag expression with the default limits.
pub fn parse(query: &str) -> QueryResult<Expr> {
    parse_with_limits(query, ParseLimits::default())
}

/// Parses a boolean tag expression, rejecting trees above `limits`.
pub fn parse_with_limits(query: &str, limits: ParseLimits) -> QueryResult<Expr> {
    let tokens = tokenize(query)?;
    if tokens.is_empty() {
        return Err(QueryError::syntax(query, 0, "empty tag expression"));
    }

    let mut parser = Parser {
        query,
        tokens,
        cursor: 0,
        depth: 0,
        max_depth: limits.max_depth,
    };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        let message = match token.kind {
            TokenKind::RParen => "unbalanced `)`".to_string(),
            _ => format!("expected AND or OR before {}", token.kind),
        };
        return Err(QueryError::syntax(query, token.position, message));
    }

    let nodes = expr.node_count();
    if nodes > limits.max_nodes {
        return Err(QueryError::syntax(
            query,
            0,
            format!(
                "expression too large: {nodes} nodes, limit {}",
                limits.max_nodes
            ),
        ));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Tag(String),
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LParen => f.write_str("`(`"),
            Self::RParen => f.write_str("`)`"),
            Self::And => f.write_str("`AND`"),
            Self::Or => f.write_str("`OR`"),
            Self::Not => f.write_str("`NOT`"),
            Self::Tag(tag) => write!(f, "tag `{tag}`"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(query: &str) -> QueryResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = query.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        let kind = match c {
            c if c.is_whitespace() => continue,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            c if is_tag_char(c) => {
                let mut end = position + c.len_utf8();
                while let Some(&(idx, next)) = chars.peek() {
                    if !is_tag_char(next) {
                        break;
                    }
                    end = idx + next.len_utf8();
                    chars.next();
                }
                let word = &query[position..end];
                match word {
                    "AND" => TokenKind::And,
                    "OR" => TokenKind::Or,
                    "NOT" => TokenKind::Not,
                    _ if c.is_numeric() => {
                        return Err(QueryError::syntax(
                            query,
                            position,
                            format!("tag `{word}` cannot start with a digit"),
                        ));
                    }
                    _ => TokenKind::Tag(word.to_string()),
                }
            }
            other => {
                return Err(QueryError::syntax(
                    query,
                    position,
                    format!("unexpected character {other:?}"),
                ));
            }
        };
        tokens.push(Token { kind, position });
    }

    Ok(tokens)
}

struct Parser<'q> {
    query: &'q str,
    tokens: Vec<Token>,
    cursor: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn next_if(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|token| &token.kind == kind) {
            self.cursor += 1;
            return true;
        }
        false
    }

    fn end_position(&self) -> usize {
        self.query.len()
    }

    /// Enters one nesting level opened by the token at `position`.
    fn descend(&mut self, position: usize) -> QueryResult<()> {
        if self.depth >= self.max_depth {
            return Err(QueryError::syntax(
                self.query,
                position,
                format!("expression nested too deeply, limit {}", self.max_depth),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_or(&mut self) -> QueryResult<Expr> {
        let mut operands = vec![self.parse_and()?];
        while self.next_if(&TokenKind::Or) {
            operands.push(self.parse_and()?);
        }
        Ok(fold_nary(operands, NaryOp::Or))
    }

    fn parse_and(&mut self) -> QueryResult<Expr> {
        let mut operands = vec![self.parse_not()?];
        while self.next_if(&TokenKind::And) {
            operands.push(self.parse_not()?);
        }
        Ok(fold_nary(operands, NaryOp::And))
    }

    fn parse_not(&mut self) -> QueryResult<Expr> {
        let position = self.peek().map(|token| token.position);
        if self.next_if(&TokenKind::Not) {
            self.descend(position.unwrap_or_default())?;
            let operand = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> QueryResult<Expr> {
        let Some(token) = self.tokens.get(self.cursor).cloned() else {
            return Err(QueryError::syntax(
                self.query,
                self.end_position(),
                "unexpected end of expression, expected a tag",
            ));
        };
        self.cursor += 1;

        match token.kind {
            TokenKind::Tag(tag) => Ok(Expr::Leaf(tag)),
            TokenKind::LParen => {
                self.descend(token.position)?;
                let inner = self.parse_or()?;
                if self.next_if(&TokenKind::RParen) {
                    self.depth -= 1;
                    return Ok(inner);
                }
                let position = self
                    .peek()
                    .map_or(self.end_position(), |next| next.position);
                Err(QueryError::syntax(
                    self.query,
                    position,
                    format!("unbalanced `(` opened at {}", token.position),
                ))
            }
            other => Err(QueryError::syntax(
                self.query,
                token.position,
                format!("expected a tag, found {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum NaryOp {
    And,
    Or,
}

/// Builds an n-ary node, splicing in children that use the same operator.
fn fold_nary(operands: Vec<Expr>, op: NaryOp) -> Expr {
    let mut flat = Vec::with_capacity(operands.len());
    for operand in operands {
        match (op, operand) {
            (NaryOp::And, Expr::And(children)) | (NaryOp::Or, Expr::Or(children)) => {
                flat.extend(children)
            }
            (_, other) => flat.push(other),
        }
    }
    if flat.len() == 1 {
        if let Some(only) = flat.pop() {
            return only;
        }
    }
    match op {
        NaryOp::And => Expr::And(flat),
        NaryOp::Or => Expr::Or(flat),
    }
}
