//! CLI smoke and ops entry point.
//!
//! # Responsibility
//! - Verify `tagquery_core` linkage (`ping`, `version`).
//! - Build an index from a JSON corpus file and run composite queries
//!   against it, for local sanity checks.
//!
//! Logging is enabled only when `TAGQUERY_LOG_DIR` names an absolute directory.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use log::info;
use std::env;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use tagquery_core::db::open_db;
use tagquery_core::{
    default_log_level, init_logging, CorpusNote, EngineConfig, IndexBuilder, QueryOutcome,
    QueryRouter, StemLanguage,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_cli_logging() {
        eprintln!("logging disabled: {err}");
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
    }
}

fn init_cli_logging() -> Result<(), String> {
    match env::var("TAGQUERY_LOG_DIR") {
        Ok(dir) => init_logging(default_log_level(), &dir),
        Err(_) => Ok(()),
    }
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Ping => {
            println!("tagquery_core ping={}", tagquery_core::ping());
            Ok(())
        }
        Command::Version => {
            println!("tagquery_core version={}", tagquery_core::core_version());
            Ok(())
        }
        Command::Build {
            db,
            corpus,
            language,
        } => build(&db, &corpus, language),
        Command::Query {
            db,
            language,
            words,
        } => query(&db, language, &words.join(" ")),
    }
}

fn build(db_path: &Path, corpus_path: &Path, language: Option<StemLanguage>) -> Result<(), String> {
    let config = config_for(language)?;

    let raw = fs::read_to_string(corpus_path)
        .map_err(|err| format!("failed to read corpus `{}`: {err}", corpus_path.display()))?;
    let notes: Vec<CorpusNote> = serde_json::from_str(&raw).map_err(|err| {
        format!(
            "corpus `{}` is not a JSON note array: {err}",
            corpus_path.display()
        )
    })?;

    let mut conn = open_db(db_path).map_err(|err| err.to_string())?;
    let report = IndexBuilder::new(&mut conn, &config)
        .build(notes)
        .map_err(|err| err.to_string())?;

    info!(
        "event=cli_build module=cli status=ok notes={} tags={}",
        report.note_count, report.tag_count
    );
    println!(
        "indexed notes={} tags={} terms={} language={}",
        report.note_count, report.tag_count, report.term_count, config.language
    );
    Ok(())
}

fn query(db_path: &Path, language: Option<StemLanguage>, raw: &str) -> Result<(), String> {
    let config = config_for(language)?;

    let conn = open_db(db_path).map_err(|err| err.to_string())?;
    let router = QueryRouter::new(&conn, &config);
    match router.find_notes(raw) {
        QueryOutcome::Found(ids) => {
            for id in ids {
                println!("{id}");
            }
        }
        QueryOutcome::Unprocessable => println!("unprocessable"),
    }
    Ok(())
}

fn config_for(language: Option<StemLanguage>) -> Result<EngineConfig, String> {
    let config = language
        .map(EngineConfig::with_language)
        .unwrap_or_default();
    config.validate().map_err(|err| err.to_string())?;
    Ok(config)
}
