use crate::error::Result;
use crate::tokenizer::{Analyzer, StopwordSet};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopwordSource {
    /// Built-in English list.
    Builtin,
    None,
    /// Text file with one stopword per line.
    File(PathBuf),
}

/// How an [`Analyzer`] is assembled. Recorded in the index metadata at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub stopwords: StopwordSource,
    #[serde(default = "default_stemming")]
    pub stemming: bool,
}

fn default_stemming() -> bool { true }

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { stopwords: StopwordSource::Builtin, stemming: default_stemming() }
    }
}

impl AnalyzerConfig {
    pub fn with_stopword_file(path: impl Into<PathBuf>) -> Self {
        Self { stopwords: StopwordSource::File(path.into()), ..Self::default() }
    }

    pub fn build(&self) -> Result<Analyzer> {
        let stopwords = match &self.stopwords {
            StopwordSource::Builtin => StopwordSet::english(),
            StopwordSource::None => StopwordSet::empty(),
            StopwordSource::File(path) => StopwordSet::load(path)?,
        };
        Ok(Analyzer::new(stopwords, self.stemming))
    }
}
