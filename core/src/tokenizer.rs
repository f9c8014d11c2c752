use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

/// A normalized index term.
pub type Term = String;

lazy_static! {
    static ref RE: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref ENGLISH_STOPWORDS: StopwordSet = {
        // Contractions are split on the apostrophe, so only their fragments are listed.
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "d","did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "ll","m","me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "re","s","same","she","should","so","some","such",
            "t","than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","ve","very",
            "was","we","were","what","when","where","which","while","who","whom","why","will","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        StopwordSet::from_words(words.iter().copied())
    };
}

/// Immutable set of terms dropped during analysis. Cloning shares the underlying set.
#[derive(Debug, Clone, Default)]
pub struct StopwordSet {
    words: Arc<HashSet<String>>,
}

impl StopwordSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in English list.
    pub fn english() -> Self {
        ENGLISH_STOPWORDS.clone()
    }

    /// Entries are trimmed and lowercased; blank entries are skipped.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words: Arc::new(words) }
    }

    /// Load a stopword file with one term per line.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source_name = path.display().to_string();
        let f = File::open(path).map_err(|e| Error::Config { source_name: source_name.clone(), reason: e.to_string() })?;
        Self::from_reader(f, &source_name)
    }

    /// Read stopwords line by line; `source_name` only labels errors.
    pub fn from_reader<R: Read>(reader: R, source_name: &str) -> Result<Self> {
        let mut words = Vec::new();
        for (lineno, line) in BufReader::new(reader).lines().enumerate() {
            let line = line.map_err(|e| Error::Config {
                source_name: source_name.to_string(),
                reason: format!("line {}: {e}", lineno + 1),
            })?;
            words.push(line);
        }
        Ok(Self::from_words(words))
    }

    pub fn contains(&self, term: &str) -> bool {
        self.words.contains(term)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Turns raw text into index terms: NFKC, lowercase, split on non-alphanumerics,
/// stopword removal and optional English stemming, in that order.
#[derive(Debug, Clone)]
pub struct Analyzer {
    stopwords: StopwordSet,
    stemming: bool,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(StopwordSet::english(), true)
    }
}

impl Analyzer {
    pub fn new(stopwords: StopwordSet, stemming: bool) -> Self {
        Self { stopwords, stemming }
    }

    pub fn stopwords(&self) -> &StopwordSet {
        &self.stopwords
    }

    pub fn stemming(&self) -> bool {
        self.stemming
    }

    /// Normalize `text` once; terms are produced lazily by [`Analyzed::terms`].
    pub fn analyze(&self, text: &str) -> Analyzed<'_> {
        let buffer = text.nfkc().collect::<String>().to_lowercase();
        Analyzed { analyzer: self, buffer }
    }

    pub fn normalize(&self, text: &str) -> Vec<Term> {
        self.analyze(text).terms().collect()
    }

    fn stem(&self, token: &str) -> Term {
        if self.stemming {
            STEMMER.stem(token).into_owned()
        } else {
            token.to_string()
        }
    }
}

/// Normalized text awaiting tokenization. Each call to `terms` restarts the sequence.
pub struct Analyzed<'a> {
    analyzer: &'a Analyzer,
    buffer: String,
}

impl<'a> Analyzed<'a> {
    pub fn terms(&self) -> impl Iterator<Item = Term> + '_ {
        let analyzer = self.analyzer;
        RE.find_iter(&self.buffer)
            .map(|m| m.as_str())
            .filter(move |tok| !analyzer.stopwords.contains(tok))
            .map(move |tok| analyzer.stem(tok))
    }
}
