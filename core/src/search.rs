//! Ranked retrieval over an opened index.
//!
//! A [`Searcher`] moves through `Unopened -> Opened -> Closed`; only an opened searcher
//! answers queries. Opening loads the whole index into memory behind an `Arc`, so
//! queries from any number of threads share it without further locking.

use crate::error::{Error, Result};
use crate::index::{DocId, FieldView, InvertedIndex};
use crate::lock::ReadLock;
use crate::persist::{read_index, IndexPaths, MetaFile};
use crate::similarity::Similarity;
use crate::tokenizer::Analyzer;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult {
    pub docid: String,
    pub score: f32,
    /// Insertion ordinal, used to break score ties.
    #[serde(skip)]
    pub doc_id: DocId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hits {
    /// Size of the candidate set before truncation to `k`.
    pub total_hits: usize,
    pub results: Vec<ScoredResult>,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub text: String,
    pub k: usize,
    pub similarity: Similarity,
    /// Fields to search; `None` searches all of them.
    pub fields: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), k: 10, similarity: Similarity::default(), fields: None }
    }

    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn similarity(mut self, similarity: Similarity) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Decode raw query bytes. Text that is not UTF-8 cannot be tokenized.
pub fn parse_query(raw: &[u8]) -> Result<&str> {
    std::str::from_utf8(raw).map_err(|e| Error::QueryParse {
        input: String::from_utf8_lossy(raw).into_owned(),
        reason: e.to_string(),
    })
}

/// Score every document matching at least one query term and keep the best `k`.
///
/// Results are ordered by descending score, then by insertion order.
pub fn rank(index: &InvertedIndex, view: &FieldView<'_>, analyzer: &Analyzer, text: &str, k: usize, similarity: Similarity) -> Hits {
    let empty = Hits { total_hits: 0, results: Vec::new() };
    if view.is_empty() || view.num_docs() == 0 {
        return empty;
    }

    // Distinct terms in order of first occurrence keep score summation deterministic.
    let mut seen = HashSet::new();
    let term_ids: Vec<_> = analyzer
        .analyze(text)
        .terms()
        .filter_map(|term| index.term_id(&term))
        .filter(|tid| seen.insert(*tid))
        .collect();
    if term_ids.is_empty() {
        return empty;
    }

    let n = view.num_docs();
    let avg_len = view.average_length() as f32;
    let mut scores: HashMap<DocId, f32> = HashMap::new();
    for tid in term_ids {
        let postings = view.postings(tid);
        if postings.is_empty() {
            continue;
        }
        let idf = similarity.idf(n, postings.len());
        for p in postings {
            let contrib = similarity.term_score(idf, p.tf, view.doc_length(p.doc_id), avg_len);
            *scores.entry(p.doc_id).or_insert(0.0) += contrib;
        }
    }

    let mut scored: Vec<(DocId, f32)> = scores.into_iter().collect();
    let total_hits = scored.len();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    let results = scored
        .into_iter()
        .filter_map(|(doc_id, score)| {
            index.external_id(doc_id).map(|docid| ScoredResult { docid: docid.to_string(), score, doc_id })
        })
        .collect();
    Hits { total_hits, results }
}

enum State {
    Unopened,
    Opened { index: Arc<InvertedIndex>, meta: MetaFile },
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Unopened => "unopened",
            State::Opened { .. } => "opened",
            State::Closed => "closed",
        }
    }
}

pub struct Searcher {
    paths: IndexPaths,
    analyzer: Analyzer,
    state: RwLock<State>,
}

impl Searcher {
    /// `analyzer` must match the one the index was built with; this is not checked.
    pub fn new<P: AsRef<Path>>(path: P, analyzer: Analyzer) -> Self {
        Self { paths: IndexPaths::new(path), analyzer, state: RwLock::new(State::Unopened) }
    }

    /// Create and open in one step.
    pub fn open_path<P: AsRef<Path>>(path: P, analyzer: Analyzer) -> Result<Self> {
        let searcher = Self::new(path, analyzer);
        searcher.open()?;
        Ok(searcher)
    }

    /// Load the index from disk. Opening an open searcher is a no-op; a closed one is reloaded.
    pub fn open(&self) -> Result<()> {
        let mut state = self.state.write();
        if matches!(*state, State::Opened { .. }) {
            return Ok(());
        }
        let guard = ReadLock::acquire(&self.paths)?;
        let (index, meta) = read_index(&self.paths)?;
        drop(guard);
        tracing::debug!(
            path = %self.paths.root.display(),
            num_docs = index.total_documents(),
            num_terms = index.num_terms(),
            "index opened"
        );
        *state = State::Opened { index: Arc::new(index), meta };
        Ok(())
    }

    /// Queries already running keep their snapshot; later ones fail until reopened.
    pub fn close(&self) {
        let mut state = self.state.write();
        if matches!(*state, State::Opened { .. }) {
            tracing::debug!(path = %self.paths.root.display(), "index closed");
        }
        *state = State::Closed;
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.read(), State::Opened { .. })
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Shared handle to the opened index.
    pub fn snapshot(&self) -> Result<Arc<InvertedIndex>> {
        match &*self.state.read() {
            State::Opened { index, .. } => Ok(Arc::clone(index)),
            other => Err(Error::IndexNotOpen { state: other.name() }),
        }
    }

    pub fn meta(&self) -> Result<MetaFile> {
        match &*self.state.read() {
            State::Opened { meta, .. } => Ok(meta.clone()),
            other => Err(Error::IndexNotOpen { state: other.name() }),
        }
    }

    /// Top-`k` documents over all fields.
    pub fn search(&self, question: &str, k: usize, similarity: Similarity) -> Result<Vec<ScoredResult>> {
        let index = self.snapshot()?;
        Ok(rank(&index, &index.view_all(), &self.analyzer, question, k, similarity).results)
    }

    /// Top-`k` documents matching in any of `fields`.
    pub fn search_fields<S: AsRef<str>>(&self, question: &str, k: usize, similarity: Similarity, fields: &[S]) -> Result<Vec<ScoredResult>> {
        let index = self.snapshot()?;
        Ok(rank(&index, &index.view(fields), &self.analyzer, question, k, similarity).results)
    }

    pub fn execute(&self, request: &SearchRequest) -> Result<Hits> {
        let index = self.snapshot()?;
        let view = match &request.fields {
            Some(fields) => index.view(fields),
            None => index.view_all(),
        };
        let hits = rank(&index, &view, &self.analyzer, &request.text, request.k, request.similarity);
        tracing::debug!(
            query = %request.text,
            similarity = %request.similarity,
            total_hits = hits.total_hits,
            returned = hits.results.len(),
            "search"
        );
        Ok(hits)
    }
}
