use irqa_core::{
    build_index, AnalyzerConfig, BuildSession, Document, Error, InvertedIndex, SearchRequest, Searcher, Similarity,
    StopwordSource,
};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn sample_docs() -> Vec<Document> {
    vec![
        Document::new("abc").field("title", "static void").field("contents", "elim static void world"),
        Document::new("efg").field("title", "public int").field("contents", "eliminating public int world apples indices"),
    ]
}

fn build_sample(dir: &Path, config: AnalyzerConfig) {
    build_index(dir, config, sample_docs()).unwrap();
}

fn docids(results: &[irqa_core::ScoredResult]) -> Vec<&str> {
    results.iter().map(|r| r.docid.as_str()).collect()
}

#[test]
fn apple_finds_efg_when_stemming() {
    let dir = tempdir().unwrap();
    let config = AnalyzerConfig::default();
    build_sample(dir.path(), config.clone());
    let searcher = Searcher::open_path(dir.path(), config.build().unwrap()).unwrap();
    for sim in [Similarity::from_name("BM25"), Similarity::from_name("TFIDF")] {
        let results = searcher.search("apple", 5, sim).unwrap();
        assert_eq!(docids(&results), vec!["efg"]);
    }
}

#[test]
fn apple_finds_nothing_without_stemming() {
    let dir = tempdir().unwrap();
    let config = AnalyzerConfig { stopwords: StopwordSource::Builtin, stemming: false };
    build_sample(dir.path(), config.clone());
    let searcher = Searcher::open_path(dir.path(), config.build().unwrap()).unwrap();
    assert!(searcher.search("apple", 5, Similarity::default()).unwrap().is_empty());
}

#[test]
fn stopword_file_applies_to_index_and_query() {
    let dir = tempdir().unwrap();
    let stop_path = dir.path().join("stopwords.txt");
    let mut f = std::fs::File::create(&stop_path).unwrap();
    writeln!(f, "world\n  static  ").unwrap();
    let config = AnalyzerConfig::with_stopword_file(&stop_path);
    let index_dir = dir.path().join("index");
    build_sample(&index_dir, config.clone());

    let index = InvertedIndex::open(&index_dir).unwrap();
    assert!(index.postings_for("world").is_empty());
    let searcher = Searcher::open_path(&index_dir, config.build().unwrap()).unwrap();
    assert!(searcher.search("world", 5, Similarity::default()).unwrap().is_empty());
    assert!(searcher.search("static world", 5, Similarity::default()).unwrap().is_empty());
}

#[test]
fn round_trip_preserves_statistics() {
    let dir = tempdir().unwrap();
    let analyzer = AnalyzerConfig::default().build().unwrap();
    let mut session = BuildSession::with_analyzer(dir.path(), analyzer).unwrap();
    for doc in sample_docs() {
        session.add(&doc).unwrap();
    }
    let before = session.index().clone();
    session.commit().unwrap();

    let after = InvertedIndex::open(dir.path()).unwrap();
    assert_eq!(after, before);
    assert_eq!(after.total_documents(), 2);
    assert_eq!(after.document_length("abc"), before.document_length("abc"));
    assert_eq!(after.average_document_length(), before.average_document_length());
    assert_eq!(after.postings_for("world"), vec![("abc", 1), ("efg", 1)]);
}

#[test]
fn searches_are_deterministic() {
    let dir = tempdir().unwrap();
    build_sample(dir.path(), AnalyzerConfig::default());
    let searcher = Searcher::open_path(dir.path(), Default::default()).unwrap();
    let a = searcher.search("static world public indices", 5, Similarity::default()).unwrap();
    let b = searcher.search("static world public indices", 5, Similarity::default()).unwrap();
    assert_eq!(a, b);
    assert_eq!(format!("{a:?}"), format!("{b:?}"));
}

#[test]
fn top_k_bound() {
    let dir = tempdir().unwrap();
    let docs = (0..20).map(|i| Document::new(format!("d{i}")).field("contents", format!("shared token{i}")));
    build_index(dir.path(), AnalyzerConfig::default(), docs).unwrap();
    let searcher = Searcher::open_path(dir.path(), Default::default()).unwrap();
    for k in [0, 1, 5, 20, 50] {
        let results = searcher.search("shared", k, Similarity::default()).unwrap();
        assert_eq!(results.len(), k.min(20));
    }
    // Equal scores come back in indexing order.
    let results = searcher.search("shared", 3, Similarity::default()).unwrap();
    assert_eq!(docids(&results), vec!["d0", "d1", "d2"]);
}

#[test]
fn empty_index_returns_nothing() {
    let dir = tempdir().unwrap();
    BuildSession::begin(dir.path(), AnalyzerConfig::default()).unwrap().commit().unwrap();
    let searcher = Searcher::open_path(dir.path(), Default::default()).unwrap();
    assert!(searcher.search("anything at all", 5, Similarity::TfIdf).unwrap().is_empty());
}

#[test]
fn field_selection_ors_across_fields() {
    let dir = tempdir().unwrap();
    let docs = vec![
        Document::new("p1").field("contents", "newton laws of motion"),
        Document::new("p2").field("contents", "timeline").field("sec", "classical mechanics motion"),
    ];
    build_index(dir.path(), AnalyzerConfig::default(), docs).unwrap();
    let searcher = Searcher::open_path(dir.path(), Default::default()).unwrap();

    let contents = searcher.search_fields("mechanics", 5, Similarity::default(), &["contents"]).unwrap();
    assert!(contents.is_empty());
    let both = searcher.search_fields("mechanics motion", 5, Similarity::default(), &["contents", "sec"]).unwrap();
    assert_eq!(both.len(), 2);
    assert_eq!(both[0].docid, "p2");

    let hits = searcher.execute(&SearchRequest::new("motion").k(1).fields(["sec"])).unwrap();
    assert_eq!(hits.total_hits, 1);
    assert_eq!(docids(&hits.results), vec!["p2"]);
}

#[test]
fn searcher_lifecycle() {
    let dir = tempdir().unwrap();
    build_sample(dir.path(), AnalyzerConfig::default());
    let searcher = Searcher::new(dir.path(), Default::default());
    assert!(matches!(searcher.search("world", 5, Similarity::default()), Err(Error::IndexNotOpen { .. })));
    searcher.open().unwrap();
    assert!(searcher.is_open());
    assert_eq!(searcher.search("world", 5, Similarity::default()).unwrap().len(), 2);
    assert_eq!(searcher.meta().unwrap().analyzer, Some(AnalyzerConfig::default()));
    searcher.close();
    assert!(matches!(searcher.search("world", 5, Similarity::default()), Err(Error::IndexNotOpen { .. })));
}

#[test]
fn index_under_construction_cannot_be_opened() {
    let dir = tempdir().unwrap();
    build_sample(dir.path(), AnalyzerConfig::default());
    let session = BuildSession::begin(dir.path(), AnalyzerConfig::default()).unwrap();
    let err = Searcher::open_path(dir.path(), Default::default()).err().unwrap();
    assert!(matches!(err, Error::IndexLocked { .. }));
    drop(session);
    Searcher::open_path(dir.path(), Default::default()).unwrap();
}

#[test]
fn lock_left_by_a_killed_writer_does_not_block_index() {
    let dir = tempdir().unwrap();
    build_sample(dir.path(), AnalyzerConfig::default());
    {
        // A writer that dies holds its lock until the OS closes the descriptor; the file stays.
        let file = OpenOptions::new().write(true).create(true).truncate(false).open(dir.path().join("write.lock")).unwrap();
        file.try_lock_exclusive().unwrap();
        let err = Searcher::open_path(dir.path(), Default::default()).err().unwrap();
        assert!(matches!(err, Error::IndexLocked { .. }));
    }
    assert!(dir.path().join("write.lock").exists());
    let searcher = Searcher::open_path(dir.path(), Default::default()).unwrap();
    assert_eq!(searcher.search("world", 5, Similarity::default()).unwrap().len(), 2);
    searcher.close();
    BuildSession::begin(dir.path(), AnalyzerConfig::default()).unwrap().commit().unwrap();
}

#[test]
fn duplicate_docid_is_rejected_and_session_continues() {
    let dir = tempdir().unwrap();
    let mut session = BuildSession::begin(dir.path(), AnalyzerConfig::default()).unwrap();
    session.add(&sample_docs()[0]).unwrap();
    let before = session.index().clone();
    let err = session.add(&Document::new("abc").field("contents", "other text")).unwrap_err();
    assert!(matches!(err, Error::DuplicateDocument { ref docid } if docid == "abc"));
    assert_eq!(session.index(), &before);
    session.add(&sample_docs()[1]).unwrap();
    assert_eq!(session.commit().unwrap().num_docs, 2);
}

#[test]
fn concurrent_readers_agree() {
    let dir = tempdir().unwrap();
    let docs = (0..200).map(|i| {
        Document::new(format!("doc-{i}")).field("contents", format!("passage {i} mentions topic{} and topic{}", i % 7, i % 13))
    });
    build_index(dir.path(), AnalyzerConfig::default(), docs).unwrap();
    let searcher = Arc::new(Searcher::open_path(dir.path(), Default::default()).unwrap());
    let expected = searcher.search("topic3 topic5", 10, Similarity::default()).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let searcher = Arc::clone(&searcher);
            std::thread::spawn(move || searcher.search("topic3 topic5", 10, Similarity::default()).unwrap())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), expected);
    }
}
