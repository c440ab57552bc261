use rusqlite::Connection;
use tagquery_core::db::open_db_in_memory;
use tagquery_core::{
    CorpusNote, EngineConfig, IndexBuilder, NoteId, QueryError, RelevanceQueryEngine,
    StemLanguage,
};

const NO_TAGS: [&str; 0] = [];

fn english() -> EngineConfig {
    EngineConfig::with_language(StemLanguage::English)
}

fn indexed(notes: Vec<CorpusNote>, config: &EngineConfig) -> Connection {
    let mut conn = open_db_in_memory().unwrap();
    IndexBuilder::new(&mut conn, config).build(notes).unwrap();
    conn
}

fn greek_letters() -> Vec<CorpusNote> {
    vec![
        CorpusNote::new("P1", ["greek"], "alpha beta"),
        CorpusNote::new("P2", ["greek"], "alpha gamma"),
        CorpusNote::new("P3", ["greek"], "beta delta"),
        CorpusNote::new("P4", ["greek"], "gamma delta"),
    ]
}

fn ids(titles: &[&str]) -> Vec<NoteId> {
    titles.iter().map(|title| NoteId::from_title(title)).collect()
}

#[test]
fn notes_are_ranked_by_score_then_precedence() {
    let conn = indexed(greek_letters(), &english());
    let engine = RelevanceQueryEngine::new(&conn, &english());

    assert_eq!(
        engine.find_notes("alpha beta").unwrap(),
        ids(&["P1", "P2", "P3"])
    );

    let scored = engine.score_notes("alpha beta").unwrap();
    let unit = 2f64.ln() * 2f64.ln();
    assert!((scored[0].score - 2.0 * unit).abs() < 1e-12);
    assert!((scored[1].score - unit).abs() < 1e-12);
    assert!((scored[2].score - unit).abs() < 1e-12);
}

#[test]
fn notes_without_shared_terms_are_absent() {
    let conn = indexed(greek_letters(), &english());
    let engine = RelevanceQueryEngine::new(&conn, &english());

    assert!(engine.find_notes("omega").unwrap().is_empty());
    assert_eq!(engine.find_notes("delta").unwrap(), ids(&["P3", "P4"]));
}

#[test]
fn repeated_query_words_count_once() {
    let conn = indexed(greek_letters(), &english());
    let engine = RelevanceQueryEngine::new(&conn, &english());

    assert_eq!(
        engine.score_notes("alpha alpha ALPHA beta").unwrap(),
        engine.score_notes("alpha beta").unwrap()
    );
}

#[test]
fn more_shared_terms_score_higher() {
    let conn = indexed(
        vec![
            CorpusNote::new("One", NO_TAGS, "red"),
            CorpusNote::new("Two", NO_TAGS, "red green"),
            CorpusNote::new("Three", NO_TAGS, "red green blue"),
            CorpusNote::new("Filler", NO_TAGS, "nothing shared"),
        ],
        &english(),
    );
    let engine = RelevanceQueryEngine::new(&conn, &english());

    assert_eq!(
        engine.find_notes("red green blue").unwrap(),
        ids(&["Three", "Two", "One"])
    );
}

#[test]
fn empty_or_punctuation_only_query_is_empty_result() {
    let conn = indexed(greek_letters(), &english());
    let engine = RelevanceQueryEngine::new(&conn, &english());

    assert!(engine.find_notes("").unwrap().is_empty());
    assert!(engine.find_notes("   ").unwrap().is_empty());
    assert!(engine.find_notes("?!... ,;").unwrap().is_empty());
}

#[test]
fn query_is_normalized_like_indexed_text() {
    let conn = indexed(
        vec![
            CorpusNote::new("Jogging", NO_TAGS, "She runs every morning."),
            CorpusNote::new("Swimming", NO_TAGS, "Laps in the pool"),
        ],
        &english(),
    );
    let engine = RelevanceQueryEngine::new(&conn, &english());

    assert_eq!(engine.find_notes("Running!").unwrap(), ids(&["Jogging"]));
    assert_eq!(engine.find_notes("POOL?").unwrap(), ids(&["Swimming"]));
}

#[test]
fn titles_are_searchable() {
    let conn = indexed(
        vec![
            CorpusNote::new("Quicksort", NO_TAGS, "divide and conquer"),
            CorpusNote::new("Heaps", NO_TAGS, "priority queues"),
        ],
        &english(),
    );
    let engine = RelevanceQueryEngine::new(&conn, &english());

    assert_eq!(engine.find_notes("quicksort").unwrap(), ids(&["Quicksort"]));
}

#[test]
fn russian_words_are_stemmed() {
    let config = EngineConfig::default();
    let conn = indexed(
        vec![
            CorpusNote::new("Улов", ["рыбалка"], "Большие рыбы в реке."),
            CorpusNote::new("Выпечка", ["кухня"], "Свежие булки и хлеб."),
        ],
        &config,
    );
    let engine = RelevanceQueryEngine::new(&conn, &config);

    assert_eq!(engine.find_notes("рыба").unwrap(), ids(&["Улов"]));
    assert_eq!(engine.find_notes("булка").unwrap(), ids(&["Выпечка"]));
}

#[test]
fn language_mismatch_is_reported() {
    let conn = indexed(greek_letters(), &english());
    let engine = RelevanceQueryEngine::new(&conn, &EngineConfig::default());

    match engine.find_notes("alpha") {
        Err(QueryError::LanguageMismatch {
            indexed,
            configured,
        }) => {
            assert_eq!(indexed, "en");
            assert_eq!(configured, "ru");
        }
        other => panic!("expected language mismatch, got {other:?}"),
    }
}

#[test]
fn unbuilt_index_returns_nothing() {
    let conn = open_db_in_memory().unwrap();
    let engine = RelevanceQueryEngine::new(&conn, &english());
    assert!(engine.find_notes("alpha").unwrap().is_empty());
}

#[test]
fn phrases_with_many_distinct_words_are_scored() {
    let conn = indexed(
        vec![
            CorpusNote::new("Needle", NO_TAGS, "w39999x and w7x"),
            CorpusNote::new("Hay", NO_TAGS, "w12x"),
            CorpusNote::new("Straw", NO_TAGS, "unrelated"),
        ],
        &english(),
    );
    let engine = RelevanceQueryEngine::new(&conn, &english());

    let phrase = (0..40_000)
        .map(|i| format!("w{i}x"))
        .collect::<Vec<_>>()
        .join(" ");
    assert_eq!(engine.find_notes(&phrase).unwrap(), ids(&["Needle", "Hay"]));

    let leftover: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_temp_master WHERE type = 'table';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(leftover, 0);
}
