//! Note record, identity and tag rules.
//!
//! # Invariants
//! - `NoteId` is the truncated SHA-256 hex digest of the trimmed title.
//! - Tags are non-empty, do not start with a digit, and contain only
//!   alphanumerics or `_`, so every tag is a valid boolean query atom.
//! - Tags are case-sensitive: `List` and `list` are distinct tags.
//! - Operator keywords and the universal tag name are not valid tags.

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter, Write};

/// Tag held by every indexed note; complement universe for `NOT`.
pub const UNIVERSAL_TAG: &str = "all_notes";

/// Words reserved by the boolean query grammar.
pub const OPERATOR_KEYWORDS: &[&str] = &["AND", "OR", "NOT"];

const NOTE_ID_HEX_LEN: usize = 64;

/// Stable note identifier derived from the title.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Hashes a note title into its identifier.
    pub fn from_title(title: &str) -> Self {
        let digest = Sha256::digest(title.trim().as_bytes());
        let mut hex = String::with_capacity(NOTE_ID_HEX_LEN);
        for byte in digest.iter() {
            // Writing into a String cannot fail.
            let _ = write!(hex, "{byte:02x}");
        }
        hex.truncate(NOTE_ID_HEX_LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ToSql for NoteId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for NoteId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(|text| Self(text.to_string()))
    }
}

/// One note as supplied by the corpus reader. Corpus order defines precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusNote {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub body: String,
}

impl CorpusNote {
    pub fn new(
        title: impl Into<String>,
        tags: impl IntoIterator<Item = impl Into<String>>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            tags: tags.into_iter().map(Into::into).collect(),
            body: body.into(),
        }
    }

    pub fn id(&self) -> NoteId {
        NoteId::from_title(&self.title)
    }

    /// Validates the record and returns its de-duplicated, trimmed tag set.
    pub fn validated_tags(&self) -> Result<BTreeSet<String>, NoteValidationError> {
        if self.title.trim().is_empty() {
            return Err(NoteValidationError::EmptyTitle);
        }
        self.tags.iter().map(|tag| validate_tag(tag)).collect()
    }

    /// Text fed to the normalizer: the title line followed by the body.
    pub fn indexed_text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }
}

/// Rejection reason for a structurally invalid note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteValidationError {
    EmptyTitle,
    EmptyTag,
    TagStartsWithDigit(String),
    ReservedCharacter { tag: String, character: char },
    /// Operator keyword or the universal tag name.
    ReservedTagName(String),
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "note title cannot be empty"),
            Self::EmptyTag => write!(f, "tag cannot be empty"),
            Self::TagStartsWithDigit(tag) => write!(f, "tag `{tag}` starts with a digit"),
            Self::ReservedCharacter { tag, character } => {
                write!(f, "tag `{tag}` contains reserved character {character:?}")
            }
            Self::ReservedTagName(tag) => write!(f, "tag name `{tag}` is reserved"),
        }
    }
}

impl Error for NoteValidationError {}

/// Validates one tag and returns it trimmed.
///
/// Never renames: an invalid tag is an error, not a candidate for rewriting.
pub fn validate_tag(raw: &str) -> Result<String, NoteValidationError> {
    let tag = raw.trim();
    let Some(first) = tag.chars().next() else {
        return Err(NoteValidationError::EmptyTag);
    };
    if first.is_numeric() {
        return Err(NoteValidationError::TagStartsWithDigit(tag.to_string()));
    }
    if let Some(character) = tag.chars().find(|c| !is_tag_char(*c)) {
        return Err(NoteValidationError::ReservedCharacter {
            tag: tag.to_string(),
            character,
        });
    }
    if tag == UNIVERSAL_TAG || OPERATOR_KEYWORDS.contains(&tag) {
        return Err(NoteValidationError::ReservedTagName(tag.to_string()));
    }
    Ok(tag.to_string())
}

/// Characters allowed inside tags and tag atoms of boolean queries.
pub(crate) fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
