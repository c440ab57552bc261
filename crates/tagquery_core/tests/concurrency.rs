use std::sync::{Arc, Barrier};
use std::thread;
use tagquery_core::db::{open_db, open_db_in_memory};
use tagquery_core::{
    CorpusNote, EngineConfig, IndexBuilder, NoteId, QueryOutcome, QueryRouter, StemLanguage,
    TagQueryEngine,
};

const WORKERS: usize = 8;
const ROUNDS: usize = 20;

fn corpus() -> Vec<CorpusNote> {
    vec![
        CorpusNote::new("A", ["letters"], "first letter"),
        CorpusNote::new("B", ["letters"], "second letter"),
        CorpusNote::new("C", ["letters", "list"], "a list of letters"),
        CorpusNote::new("D", ["letters"], "fourth letter"),
        CorpusNote::new("1", ["digits"], "first digit"),
        CorpusNote::new("2", ["digits"], "second digit"),
    ]
}

fn rearranged_corpus() -> Vec<CorpusNote> {
    vec![
        CorpusNote::new("2", ["digits", "list"], "second digit in a list"),
        CorpusNote::new("E", ["letters"], "fifth letter"),
        CorpusNote::new("A", ["letters", "list"], "first letter"),
        CorpusNote::new("1", ["digits"], "first digit"),
    ]
}

fn config() -> EngineConfig {
    EngineConfig::with_language(StemLanguage::English)
}

const REBUILD_QUERIES: [&str; 3] = [
    "tags: letters OR digits",
    "tags: list AND NOT digits",
    "first letter tags: letters",
];

fn answers_for(notes: Vec<CorpusNote>) -> Vec<QueryOutcome> {
    let mut conn = open_db_in_memory().unwrap();
    IndexBuilder::new(&mut conn, &config()).build(notes).unwrap();
    let router = QueryRouter::new(&conn, &config());
    REBUILD_QUERIES
        .iter()
        .map(|query| router.find_notes(query))
        .collect()
}

#[test]
fn identical_queries_on_separate_connections_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    {
        let mut conn = open_db(&path).unwrap();
        IndexBuilder::new(&mut conn, &config()).build(corpus()).unwrap();
    }

    let expected: Vec<NoteId> = ["C", "1", "2"]
        .iter()
        .map(|title| NoteId::from_title(title))
        .collect();
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles = (0..WORKERS)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            let expected = expected.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let engine = TagQueryEngine::new(&conn, &config());
                barrier.wait();
                for _ in 0..ROUNDS {
                    let found = engine
                        .find_notes("digits OR NOT (letters AND NOT list)")
                        .unwrap();
                    assert_eq!(found, expected);
                }
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn composite_queries_run_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    {
        let mut conn = open_db(&path).unwrap();
        IndexBuilder::new(&mut conn, &config()).build(corpus()).unwrap();
    }

    let handles = (0..WORKERS)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let router = QueryRouter::new(&conn, &config());
                (0..ROUNDS)
                    .map(|_| router.find_notes("second tags: NOT letters"))
                    .collect::<Vec<_>>()
            })
        })
        .collect::<Vec<_>>();

    let expected = QueryOutcome::Found(vec![NoteId::from_title("2")]);
    for handle in handles {
        for outcome in handle.join().unwrap() {
            assert_eq!(outcome, expected);
        }
    }
}

#[test]
fn readers_see_either_index_while_another_connection_rebuilds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    let mut build_config = config();
    build_config.vacuum_after_build = false;
    {
        let mut conn = open_db(&path).unwrap();
        IndexBuilder::new(&mut conn, &build_config)
            .build(corpus())
            .unwrap();
    }

    let before = answers_for(corpus());
    let after = answers_for(rearranged_corpus());
    assert_ne!(before, after);

    let barrier = Arc::new(Barrier::new(WORKERS + 1));
    let readers = (0..WORKERS)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            let (before, after) = (before.clone(), after.clone());
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let router = QueryRouter::new(&conn, &config());
                barrier.wait();
                for _ in 0..ROUNDS {
                    for (index, query) in REBUILD_QUERIES.iter().enumerate() {
                        let outcome = router.find_notes(query);
                        assert!(
                            outcome == before[index] || outcome == after[index],
                            "{query}: {outcome:?}"
                        );
                    }
                }
            })
        })
        .collect::<Vec<_>>();

    let writer = {
        let path = path.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let mut conn = open_db(&path).unwrap();
            barrier.wait();
            for round in 0..ROUNDS {
                let notes = if round % 2 == 0 {
                    rearranged_corpus()
                } else {
                    corpus()
                };
                IndexBuilder::new(&mut conn, &build_config)
                    .build(notes)
                    .unwrap();
            }
        })
    };

    for reader in readers {
        reader.join().unwrap();
    }
    writer.join().unwrap();
}
