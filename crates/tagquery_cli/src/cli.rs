use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tagquery_core::StemLanguage;

#[derive(Debug, Parser)]
#[command(
    name = "tagquery_cli",
    version,
    about = "Build a note index and run tag, relevance and composite queries"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that the core library is linked
    Ping,
    /// Print the core library version
    Version,
    /// Rebuild the index from a JSON array of notes
    Build {
        /// Index database file, created when missing
        db: PathBuf,
        /// Corpus file: `[{"title", "tags", "body"}, ...]`
        corpus: PathBuf,
        /// Stemmer language code (`ru`, `en`, ...)
        #[arg(long)]
        language: Option<StemLanguage>,
    },
    /// Run a composite `text tags: expression` query
    Query {
        /// Index database file
        db: PathBuf,
        /// Stemmer language code; must match the one the index was built with
        #[arg(long)]
        language: Option<StemLanguage>,
        /// Query words, joined with single spaces
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
        words: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_build_with_language() {
        let cli = Cli::parse_from([
            "tagquery_cli",
            "build",
            "index.db",
            "notes.json",
            "--language",
            "en",
        ]);
        match cli.command {
            Command::Build {
                db,
                corpus,
                language,
            } => {
                assert_eq!(db, PathBuf::from("index.db"));
                assert_eq!(corpus, PathBuf::from("notes.json"));
                assert_eq!(language, Some(StemLanguage::English));
            }
            _ => panic!("expected build command"),
        }
    }

    #[test]
    fn parse_query_collects_words() {
        let cli = Cli::parse_from([
            "tagquery_cli",
            "query",
            "index.db",
            "fresh",
            "bread",
            "tags:",
            "food",
            "AND",
            "NOT",
            "fish",
        ]);
        match cli.command {
            Command::Query {
                language, words, ..
            } => {
                assert_eq!(language, None);
                assert_eq!(words.join(" "), "fresh bread tags: food AND NOT fish");
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn invalid_input_is_rejected() {
        assert!(Cli::try_parse_from(["tagquery_cli", "frobnicate"]).is_err());
        assert!(Cli::try_parse_from(["tagquery_cli", "query", "index.db"]).is_err());
        assert!(Cli::try_parse_from([
            "tagquery_cli",
            "build",
            "index.db",
            "notes.json",
            "--language",
            "klingon",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["tagquery_cli"]).is_err());
    }
}
