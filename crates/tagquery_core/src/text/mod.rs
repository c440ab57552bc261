//! Text normalization and stemming shared by index build and relevance queries.
//!
//! # Invariants
//! - Index build and query paths call the same [`TextNormalizer`], so a query
//!   term matches an indexed term exactly when their stems are equal.

use crate::config::StemLanguage;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::Stemmer;
use std::collections::BTreeSet;

static PUNCTUATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]+").expect("valid punctuation regex"));

/// Case-folds, strips punctuation, tokenizes and stems text.
pub struct TextNormalizer {
    language: StemLanguage,
    stemmer: Stemmer,
}

impl TextNormalizer {
    pub fn new(language: StemLanguage) -> Self {
        Self {
            language,
            stemmer: Stemmer::create(language.algorithm()),
        }
    }

    pub fn language(&self) -> StemLanguage {
        self.language
    }

    /// Returns every stemmed token in text order, repetitions included.
    pub fn terms(&self, text: &str) -> Vec<String> {
        standardize(text)
            .split_whitespace()
            .map(|word| self.stemmer.stem(word).into_owned())
            .collect()
    }

    /// Returns the distinct stemmed tokens of `text`.
    pub fn unique_terms(&self, text: &str) -> BTreeSet<String> {
        self.terms(text).into_iter().collect()
    }
}

/// Lowercases text and replaces punctuation runs with a single space.
pub fn standardize(text: &str) -> String {
    PUNCTUATION_RE.replace_all(&text.to_lowercase(), " ").into_owned()
}
