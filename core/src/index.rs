use crate::error::{Error, Result};
use crate::tokenizer::Analyzer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type TermId = u32;
/// Internal document ordinal, assigned in insertion order.
pub type DocId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
}

/// Postings and lengths of one indexed field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIndex {
    pub name: String,
    pub postings: HashMap<TermId, Vec<Posting>>, // postings sorted by doc_id
    /// Emitted term count per document, indexed by `DocId` (0 when the document lacks the field).
    pub lengths: Vec<u32>,
    pub total_length: u64,
}

impl FieldIndex {
    fn new(name: &str, num_docs: usize) -> Self {
        Self { name: name.to_string(), lengths: vec![0; num_docs], ..Self::default() }
    }
}

/// In-memory inverted index. Written by a single build session, then read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvertedIndex {
    pub(crate) dictionary: HashMap<String, TermId>,
    pub(crate) terms: Vec<String>,
    pub(crate) docs: Vec<String>,
    pub(crate) doc_ids: HashMap<String, DocId>,
    pub(crate) fields: Vec<FieldIndex>,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Analyze every field of a document and append its postings.
    ///
    /// Fields sharing a name are treated as one stream. On error the index is left untouched.
    pub fn add_document<I, K, V>(&mut self, analyzer: &Analyzer, docid: &str, fields: I) -> Result<DocId>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if self.doc_ids.contains_key(docid) {
            return Err(Error::DuplicateDocument { docid: docid.to_string() });
        }

        // Analyze everything before mutating so a failure cannot leave a half-added document.
        let mut per_field: Vec<(String, HashMap<String, u32>, u32)> = Vec::new();
        for (name, text) in fields {
            let name = name.as_ref();
            let slot = match per_field.iter().position(|(n, _, _)| n == name) {
                Some(i) => i,
                None => {
                    per_field.push((name.to_string(), HashMap::new(), 0));
                    per_field.len() - 1
                }
            };
            let (_, tf_counts, length) = &mut per_field[slot];
            for term in analyzer.analyze(text.as_ref()).terms() {
                *tf_counts.entry(term).or_insert(0) += 1;
                *length += 1;
            }
        }

        let doc_id = self.docs.len() as DocId;
        self.docs.push(docid.to_string());
        self.doc_ids.insert(docid.to_string(), doc_id);
        for field in self.fields.iter_mut() {
            field.lengths.push(0);
        }

        for (name, tf_counts, length) in per_field {
            let fid = self.field_slot(&name);
            // Sort by term so term ids are assigned deterministically.
            let mut tf_counts: Vec<(String, u32)> = tf_counts.into_iter().collect();
            tf_counts.sort_unstable();
            for (term, tf) in tf_counts {
                let tid = self.intern(term);
                self.fields[fid].postings.entry(tid).or_default().push(Posting { doc_id, tf });
            }
            let field = &mut self.fields[fid];
            field.lengths[doc_id as usize] = length;
            field.total_length += length as u64;
        }
        Ok(doc_id)
    }

    fn field_slot(&mut self, name: &str) -> usize {
        match self.fields.iter().position(|f| f.name == name) {
            Some(i) => i,
            None => {
                self.fields.push(FieldIndex::new(name, self.docs.len()));
                self.fields.len() - 1
            }
        }
    }

    fn intern(&mut self, term: String) -> TermId {
        if let Some(&tid) = self.dictionary.get(&term) {
            return tid;
        }
        let tid = self.terms.len() as TermId;
        self.terms.push(term.clone());
        self.dictionary.insert(term, tid);
        tid
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.dictionary.get(term).copied()
    }

    /// `(docid, tf)` pairs for `term` over all fields, in insertion order.
    pub fn postings_for(&self, term: &str) -> Vec<(&str, u32)> {
        let Some(tid) = self.term_id(term) else { return Vec::new() };
        self.view_all()
            .postings(tid)
            .into_iter()
            .map(|p| (self.docs[p.doc_id as usize].as_str(), p.tf))
            .collect()
    }

    /// Postings of `term` in a single field.
    pub fn field_postings(&self, field: &str, term: &str) -> &[Posting] {
        let found = self.field(field).zip(self.term_id(term));
        match found.and_then(|(f, tid)| f.postings.get(&tid)) {
            Some(p) => p.as_slice(),
            None => &[],
        }
    }

    /// Total emitted terms of a document across all fields.
    pub fn document_length(&self, docid: &str) -> Option<u32> {
        self.doc_ids.get(docid).map(|&d| self.doc_length(d))
    }

    pub fn doc_length(&self, doc_id: DocId) -> u32 {
        self.fields.iter().map(|f| f.lengths.get(doc_id as usize).copied().unwrap_or(0)).sum()
    }

    pub fn field_length(&self, field: &str, doc_id: DocId) -> u32 {
        self.field(field).and_then(|f| f.lengths.get(doc_id as usize).copied()).unwrap_or(0)
    }

    pub fn total_documents(&self) -> usize {
        self.docs.len()
    }

    pub fn average_document_length(&self) -> f64 {
        self.view_all().average_length()
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn external_id(&self, doc_id: DocId) -> Option<&str> {
        self.docs.get(doc_id as usize).map(String::as_str)
    }

    fn field(&self, name: &str) -> Option<&FieldIndex> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Statistics over the concatenation of every field.
    pub fn view_all(&self) -> FieldView<'_> {
        FieldView { num_docs: self.docs.len(), fields: self.fields.iter().collect() }
    }

    /// Statistics over the concatenation of the named fields. Unknown names are ignored.
    pub fn view<S: AsRef<str>>(&self, names: &[S]) -> FieldView<'_> {
        let fields = self
            .fields
            .iter()
            .filter(|f| names.iter().any(|n| n.as_ref() == f.name))
            .collect();
        FieldView { num_docs: self.docs.len(), fields }
    }
}

/// A set of fields scored as one logical stream.
pub struct FieldView<'a> {
    num_docs: usize,
    fields: Vec<&'a FieldIndex>,
}

impl<'a> FieldView<'a> {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    /// Postings of `tid` with term frequencies summed across the view's fields.
    pub fn postings(&self, tid: TermId) -> Vec<Posting> {
        let lists: Vec<&Vec<Posting>> = self.fields.iter().filter_map(|f| f.postings.get(&tid)).collect();
        match lists.as_slice() {
            [] => Vec::new(),
            [single] => single.to_vec(),
            many => {
                let mut merged: BTreeMap<DocId, u32> = BTreeMap::new();
                for list in many {
                    for p in list.iter() {
                        *merged.entry(p.doc_id).or_insert(0) += p.tf;
                    }
                }
                merged.into_iter().map(|(doc_id, tf)| Posting { doc_id, tf }).collect()
            }
        }
    }

    pub fn doc_length(&self, doc_id: DocId) -> u32 {
        self.fields.iter().map(|f| f.lengths.get(doc_id as usize).copied().unwrap_or(0)).sum()
    }

    pub fn average_length(&self) -> f64 {
        if self.num_docs == 0 {
            return 0.0;
        }
        let total: u64 = self.fields.iter().map(|f| f.total_length).sum();
        total as f64 / self.num_docs as f64
    }
}
