//! Index build sessions.
//!
//! A [`BuildSession`] owns the index being written and the directory's write lock.
//! It is consumed by [`BuildSession::commit`] or [`BuildSession::abort`]; dropping it
//! on an error path releases the lock as well, and so does the death of the process.

use crate::config::AnalyzerConfig;
use crate::error::Result;
use crate::index::{DocId, InvertedIndex};
use crate::lock::WriteLock;
use crate::persist::{write_index, IndexPaths, MetaFile};
use crate::tokenizer::Analyzer;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A document as delivered by a corpus reader: its id plus ordered `(field, text)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub docid: String,
    pub fields: Vec<(String, String)>,
}

impl Document {
    pub fn new(docid: impl Into<String>) -> Self {
        Self { docid: docid.into(), fields: Vec::new() }
    }

    pub fn field(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fields.push((name.into(), text.into()));
        self
    }
}

pub struct BuildSession {
    paths: IndexPaths,
    analyzer: Analyzer,
    config: Option<AnalyzerConfig>,
    index: InvertedIndex,
    _lock: WriteLock,
}

impl BuildSession {
    /// Start building into `path`, analyzing with `config`. The configuration is
    /// recorded in the index metadata on commit.
    pub fn begin<P: AsRef<Path>>(path: P, config: AnalyzerConfig) -> Result<Self> {
        let analyzer = config.build()?;
        Self::start(path.as_ref(), analyzer, Some(config))
    }

    pub fn with_analyzer<P: AsRef<Path>>(path: P, analyzer: Analyzer) -> Result<Self> {
        Self::start(path.as_ref(), analyzer, None)
    }

    fn start(path: &Path, analyzer: Analyzer, config: Option<AnalyzerConfig>) -> Result<Self> {
        let paths = IndexPaths::new(path);
        let lock = WriteLock::acquire(&paths)?;
        tracing::debug!(path = %path.display(), "build session started");
        Ok(Self { paths, analyzer, config, index: InvertedIndex::new(), _lock: lock })
    }

    pub fn add_document<I, K, V>(&mut self, docid: &str, fields: I) -> Result<DocId>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.index.add_document(&self.analyzer, docid, fields)
    }

    pub fn add(&mut self, doc: &Document) -> Result<DocId> {
        self.add_document(&doc.docid, doc.fields.iter().map(|(n, t)| (n.as_str(), t.as_str())))
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Persist the index and release the write lock.
    pub fn commit(self) -> Result<MetaFile> {
        let meta = write_index(&self.paths, &self.index, self.config.as_ref())?;
        tracing::info!(
            num_docs = meta.num_docs,
            num_terms = meta.num_terms,
            output = %self.paths.root.display(),
            "index build complete"
        );
        Ok(meta)
    }

    /// Discard everything added so far without touching the stored index.
    pub fn abort(self) {
        tracing::debug!(path = %self.paths.root.display(), docs = self.index.total_documents(), "build session aborted");
    }
}

/// Build and persist an index from a document stream in one session.
pub fn build_index<P, I>(path: P, config: AnalyzerConfig, docs: I) -> Result<MetaFile>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = Document>,
{
    let mut session = BuildSession::begin(path, config)?;
    for doc in docs {
        session.add(&doc)?;
    }
    session.commit()
}
