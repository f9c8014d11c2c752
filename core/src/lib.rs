//! Inverted-index retrieval engine: analysis, index construction, persistence and
//! BM25 / TF-IDF ranked search.

pub mod builder;
pub mod config;
pub mod error;
pub mod index;
mod lock;
pub mod persist;
pub mod search;
pub mod similarity;
pub mod tokenizer;

pub use builder::{build_index, BuildSession, Document};
pub use config::{AnalyzerConfig, StopwordSource};
pub use error::{Error, Result};
pub use index::{DocId, FieldIndex, InvertedIndex, Posting, TermId};
pub use search::{parse_query, Hits, ScoredResult, SearchRequest, Searcher};
pub use similarity::{Bm25Params, Similarity};
pub use tokenizer::{Analyzer, StopwordSet, Term};
