//! Relevance scoring models.
//!
//! Both models score one (term, document) pair from corpus statistics; a document's
//! score is the sum over the distinct query terms it contains.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const BM25_K1: f32 = 1.2;
pub const BM25_B: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: BM25_K1, b: BM25_B }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Similarity {
    /// Classic TF-IDF: raw tf times `ln(N / df) + 1`.
    TfIdf,
    Bm25(Bm25Params),
}

impl Default for Similarity {
    fn default() -> Self {
        Similarity::Bm25(Bm25Params::default())
    }
}

impl Similarity {
    /// Select a model by name. `"TFIDF"` and `"BM25"` are recognized exactly;
    /// anything else, typos included, falls back to BM25.
    pub fn from_name(name: &str) -> Self {
        match name {
            "TFIDF" => Similarity::TfIdf,
            "BM25" => Similarity::default(),
            other => {
                tracing::warn!(similarity = other, "unrecognized similarity, using BM25");
                Similarity::default()
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Similarity::TfIdf => "TFIDF",
            Similarity::Bm25(_) => "BM25",
        }
    }

    /// Per-term weight independent of the document. `df` must be at least 1.
    pub fn idf(&self, num_docs: usize, df: usize) -> f32 {
        let df = df.max(1);
        let n = num_docs.max(df) as f32;
        let df = df as f32;
        match self {
            Similarity::TfIdf => (n / df).ln() + 1.0,
            Similarity::Bm25(_) => (1.0 + (n - df + 0.5) / (df + 0.5)).ln(),
        }
    }

    /// Score contribution of one term occurring `tf` times in a document of `doc_len` terms.
    pub fn term_score(&self, idf: f32, tf: u32, doc_len: u32, avg_doc_len: f32) -> f32 {
        let tf = tf as f32;
        match self {
            Similarity::TfIdf => tf * idf,
            Similarity::Bm25(params) => {
                let Bm25Params { k1, b } = *params;
                let avg = if avg_doc_len > 0.0 { avg_doc_len } else { 1.0 };
                let norm = 1.0 - b + b * (doc_len as f32 / avg);
                idf * (tf * (k1 + 1.0)) / (tf + k1 * norm)
            }
        }
    }
}

impl From<&str> for Similarity {
    fn from(name: &str) -> Self {
        Similarity::from_name(name)
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
