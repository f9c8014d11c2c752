//! Error types for the retrieval engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Stopword list or other configuration input could not be loaded.
    #[error("configuration error in {source_name}: {reason}")]
    Config { source_name: String, reason: String },

    /// The docid was already added during this build session.
    #[error("duplicate document id: {docid}")]
    DuplicateDocument { docid: String },

    /// Persisted index data failed validation on open.
    #[error("corrupt index at {}: {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    /// A query was issued against a searcher that is not open.
    #[error("index is not open (searcher is {state})")]
    IndexNotOpen { state: &'static str },

    #[error("cannot parse query {input:?}: {reason}")]
    QueryParse { input: String, reason: String },

    /// Another build session holds the write lock of this index directory.
    #[error("index at {} is locked for writing", path.display())]
    IndexLocked { path: PathBuf },

    #[error("{op} failed for {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { op, path: path.into(), source }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptIndex { path: path.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
