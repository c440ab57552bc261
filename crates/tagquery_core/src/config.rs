//! Engine configuration passed explicitly into the builder and query engines.
//!
//! # Invariants
//! - Index build and relevance queries must use the same `language`; the
//!   language of the last build is recorded in `index_meta`.
//! - `query_separator` is never empty.

use rust_stemmers::Algorithm;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Separator between the natural-language part and the tag expression part.
pub const DEFAULT_QUERY_SEPARATOR: &str = "tags:";
/// Upper bound on AST nodes per boolean query.
pub const DEFAULT_MAX_QUERY_NODES: usize = 256;
/// Upper bound on nested parentheses and `NOT` chains per boolean query.
pub const DEFAULT_MAX_QUERY_DEPTH: usize = 64;

/// Snowball stemmer languages supported for TF-IDF statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StemLanguage {
    #[serde(rename = "ar")]
    Arabic,
    #[serde(rename = "da")]
    Danish,
    #[serde(rename = "nl")]
    Dutch,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "fi")]
    Finnish,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "de")]
    German,
    #[serde(rename = "el")]
    Greek,
    #[serde(rename = "hu")]
    Hungarian,
    #[serde(rename = "it")]
    Italian,
    #[serde(rename = "no")]
    Norwegian,
    #[serde(rename = "pt")]
    Portuguese,
    #[serde(rename = "ro")]
    Romanian,
    #[serde(rename = "ru")]
    Russian,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "sv")]
    Swedish,
    #[serde(rename = "ta")]
    Tamil,
    #[serde(rename = "tr")]
    Turkish,
}

const LANGUAGE_CODES: &[(StemLanguage, &str)] = &[
    (StemLanguage::Arabic, "ar"),
    (StemLanguage::Danish, "da"),
    (StemLanguage::Dutch, "nl"),
    (StemLanguage::English, "en"),
    (StemLanguage::Finnish, "fi"),
    (StemLanguage::French, "fr"),
    (StemLanguage::German, "de"),
    (StemLanguage::Greek, "el"),
    (StemLanguage::Hungarian, "hu"),
    (StemLanguage::Italian, "it"),
    (StemLanguage::Norwegian, "no"),
    (StemLanguage::Portuguese, "pt"),
    (StemLanguage::Romanian, "ro"),
    (StemLanguage::Russian, "ru"),
    (StemLanguage::Spanish, "es"),
    (StemLanguage::Swedish, "sv"),
    (StemLanguage::Tamil, "ta"),
    (StemLanguage::Turkish, "tr"),
];

impl StemLanguage {
    /// Two-letter code used in config files and `index_meta`.
    pub fn code(self) -> &'static str {
        LANGUAGE_CODES
            .iter()
            .find(|(language, _)| *language == self)
            .map_or("", |(_, code)| code)
    }

    pub(crate) fn algorithm(self) -> Algorithm {
        match self {
            Self::Arabic => Algorithm::Arabic,
            Self::Danish => Algorithm::Danish,
            Self::Dutch => Algorithm::Dutch,
            Self::English => Algorithm::English,
            Self::Finnish => Algorithm::Finnish,
            Self::French => Algorithm::French,
            Self::German => Algorithm::German,
            Self::Greek => Algorithm::Greek,
            Self::Hungarian => Algorithm::Hungarian,
            Self::Italian => Algorithm::Italian,
            Self::Norwegian => Algorithm::Norwegian,
            Self::Portuguese => Algorithm::Portuguese,
            Self::Romanian => Algorithm::Romanian,
            Self::Russian => Algorithm::Russian,
            Self::Spanish => Algorithm::Spanish,
            Self::Swedish => Algorithm::Swedish,
            Self::Tamil => Algorithm::Tamil,
            Self::Turkish => Algorithm::Turkish,
        }
    }
}

impl Display for StemLanguage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for StemLanguage {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        LANGUAGE_CODES
            .iter()
            .find(|(_, code)| *code == normalized)
            .map(|(language, _)| *language)
            .ok_or(ConfigError::UnsupportedLanguage(normalized))
    }
}

/// Configuration error raised by [`EngineConfig::validate`] and language parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnsupportedLanguage(String),
    EmptySeparator,
    ZeroNodeBudget,
    ZeroDepthBudget,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLanguage(code) => write!(f, "unsupported stemmer language `{code}`"),
            Self::EmptySeparator => write!(f, "query separator cannot be empty"),
            Self::ZeroNodeBudget => write!(f, "max_query_nodes must be positive"),
            Self::ZeroDepthBudget => write!(f, "max_query_depth must be positive"),
        }
    }
}

impl Error for ConfigError {}

/// Settings shared by [`crate::IndexBuilder`] and the query engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Main language of the notes; selects the Snowball stemmer.
    pub language: StemLanguage,
    /// Token splitting a composite query into text and tag parts.
    pub query_separator: String,
    /// Run `VACUUM` after a successful rebuild to reclaim pages left by
    /// dropped tag relations.
    pub vacuum_after_build: bool,
    /// Maximum number of AST nodes a boolean query may contain.
    pub max_query_nodes: usize,
    /// Maximum nesting of parentheses and `NOT` a boolean query may reach.
    pub max_query_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language: StemLanguage::Russian,
            query_separator: DEFAULT_QUERY_SEPARATOR.to_string(),
            vacuum_after_build: true,
            max_query_nodes: DEFAULT_MAX_QUERY_NODES,
            max_query_depth: DEFAULT_MAX_QUERY_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Default configuration with an explicit stemmer language.
    pub fn with_language(language: StemLanguage) -> Self {
        Self {
            language,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query_separator.trim().is_empty() {
            return Err(ConfigError::EmptySeparator);
        }
        if self.max_query_nodes == 0 {
            return Err(ConfigError::ZeroNodeBudget);
        }
        if self.max_query_depth == 0 {
            return Err(ConfigError::ZeroDepthBudget);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig, StemLanguage};

    #[test]
    fn language_codes_round_trip_through_from_str() {
        for code in ["en", "ru", "de", " RU "] {
            let language: StemLanguage = code.parse().expect("known code should parse");
            assert_eq!(language.code(), code.trim().to_ascii_lowercase());
        }
    }

    #[test]
    fn unknown_language_is_rejected() {
        let err = "xx".parse::<StemLanguage>().unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedLanguage("xx".to_string()));
    }

    #[test]
    fn validate_rejects_blank_separator() {
        let config = EngineConfig {
            query_separator: "  ".to_string(),
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptySeparator));
    }

    #[test]
    fn partial_json_config_falls_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"language":"en","max_query_nodes":32}"#).unwrap();
        assert_eq!(config.language, StemLanguage::English);
        assert_eq!(config.max_query_nodes, 32);
        assert_eq!(config.max_query_depth, 64);
        assert_eq!(config.query_separator, "tags:");
        assert!(config.vacuum_after_build);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_budgets() {
        let no_nodes = EngineConfig {
            max_query_nodes: 0,
            ..EngineConfig::default()
        };
        assert_eq!(no_nodes.validate(), Err(ConfigError::ZeroNodeBudget));

        let no_depth = EngineConfig {
            max_query_depth: 0,
            ..EngineConfig::default()
        };
        assert_eq!(no_depth.validate(), Err(ConfigError::ZeroDepthBudget));
    }
}
