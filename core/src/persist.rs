use crate::config::AnalyzerConfig;
use crate::error::{Error, Result};
use crate::index::{DocId, FieldIndex, InvertedIndex, TermId};
use crate::lock::{ReadLock, WriteLock};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, create_dir_all, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub num_docs: u32,
    pub num_terms: u32,
    pub total_length: u64,
    pub fields: Vec<String>,
    /// Analyzer the index was built with, when known.
    #[serde(default)]
    pub analyzer: Option<AnalyzerConfig>,
    pub created_at: String,
}

impl MetaFile {
    pub fn average_document_length(&self) -> f64 {
        if self.num_docs == 0 { 0.0 } else { self.total_length as f64 / self.num_docs as f64 }
    }
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn dictionary(&self) -> PathBuf { self.root.join("dictionary.bin") }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn postings_dir(&self) -> PathBuf { self.root.join("postings") }
    fn field_postings(&self, field: usize) -> PathBuf { self.postings_dir().join(format!("{field:04}.postings.bin")) }
    pub fn write_lock(&self) -> PathBuf { self.root.join("write.lock") }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut f = File::create(path).map_err(|e| Error::io("create", path, e))?;
    f.write_all(bytes).map_err(|e| Error::io("write", path, e))?;
    f.sync_all().map_err(|e| Error::io("sync", path, e))
}

/// Missing component files mean an incomplete index rather than an I/O failure.
fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::corrupt(path, "file is missing")),
        Err(e) => return Err(Error::io("open", path, e)),
    };
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).map_err(|e| Error::io("read", path, e))?;
    Ok(buf)
}

fn save_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = bincode::serialize(value)
        .map_err(|e| Error::io("serialize", path, io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;
    write_file(path, &bytes)
}

fn load_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let buf = read_file(path)?;
    bincode::deserialize(&buf).map_err(|e| Error::corrupt(path, format!("undecodable: {e}")))
}

pub fn save_dictionary(paths: &IndexPaths, terms: &Vec<String>) -> Result<()> {
    save_bin(&paths.dictionary(), terms)
}

pub fn load_dictionary(paths: &IndexPaths) -> Result<Vec<String>> {
    load_bin(&paths.dictionary())
}

pub fn save_docs(paths: &IndexPaths, docs: &Vec<String>) -> Result<()> {
    save_bin(&paths.docs(), docs)
}

pub fn load_docs(paths: &IndexPaths) -> Result<Vec<String>> {
    load_bin(&paths.docs())
}

pub fn save_field(paths: &IndexPaths, field_no: usize, field: &FieldIndex) -> Result<()> {
    let dir = paths.postings_dir();
    create_dir_all(&dir).map_err(|e| Error::io("create directory", &dir, e))?;
    save_bin(&paths.field_postings(field_no), field)
}

pub fn load_field(paths: &IndexPaths, field_no: usize) -> Result<FieldIndex> {
    load_bin(&paths.field_postings(field_no))
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let path = paths.meta();
    let json = serde_json::to_string_pretty(meta)
        .map_err(|e| Error::io("serialize", &path, io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;
    write_file(&path, json.as_bytes())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let path = paths.meta();
    let buf = read_file(&path)?;
    serde_json::from_slice(&buf).map_err(|e| Error::corrupt(&path, format!("invalid metadata: {e}")))
}

/// Write every component of `index` under `paths.root`. `meta.json` goes last so an
/// interrupted write is caught by [`read_index`].
pub fn write_index(paths: &IndexPaths, index: &InvertedIndex, analyzer: Option<&AnalyzerConfig>) -> Result<MetaFile> {
    create_dir_all(&paths.root).map_err(|e| Error::io("create directory", &paths.root, e))?;
    match fs::remove_file(paths.meta()) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io("remove", paths.meta(), e)),
    }
    // Field files are numbered; a previous index with more fields would leave some behind.
    match fs::remove_dir_all(paths.postings_dir()) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io("remove", paths.postings_dir(), e)),
    }

    save_dictionary(paths, &index.terms)?;
    save_docs(paths, &index.docs)?;
    for (no, field) in index.fields.iter().enumerate() {
        save_field(paths, no, field)?;
    }

    let meta = MetaFile {
        version: FORMAT_VERSION,
        num_docs: index.docs.len() as u32,
        num_terms: index.terms.len() as u32,
        total_length: index.fields.iter().map(|f| f.total_length).sum(),
        fields: index.fields.iter().map(|f| f.name.clone()).collect(),
        analyzer: analyzer.cloned(),
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "".into()),
    };
    save_meta(paths, &meta)?;
    Ok(meta)
}

/// Load and validate a persisted index.
pub fn read_index(paths: &IndexPaths) -> Result<(InvertedIndex, MetaFile)> {
    if !paths.root.is_dir() {
        return Err(Error::io(
            "open index",
            &paths.root,
            io::Error::new(io::ErrorKind::NotFound, "index directory does not exist"),
        ));
    }
    let meta = load_meta(paths)?;
    if meta.version != FORMAT_VERSION {
        return Err(Error::corrupt(paths.meta(), format!("unsupported format version {}", meta.version)));
    }

    let terms = load_dictionary(paths)?;
    if terms.len() != meta.num_terms as usize {
        return Err(Error::corrupt(paths.dictionary(), format!("{} terms, metadata says {}", terms.len(), meta.num_terms)));
    }
    let mut dictionary: HashMap<String, TermId> = HashMap::with_capacity(terms.len());
    for (tid, term) in terms.iter().enumerate() {
        if dictionary.insert(term.clone(), tid as TermId).is_some() {
            return Err(Error::corrupt(paths.dictionary(), format!("term {term:?} listed twice")));
        }
    }

    let docs = load_docs(paths)?;
    if docs.len() != meta.num_docs as usize {
        return Err(Error::corrupt(paths.docs(), format!("{} documents, metadata says {}", docs.len(), meta.num_docs)));
    }
    let mut doc_ids: HashMap<String, DocId> = HashMap::with_capacity(docs.len());
    for (doc_id, docid) in docs.iter().enumerate() {
        if doc_ids.insert(docid.clone(), doc_id as DocId).is_some() {
            return Err(Error::corrupt(paths.docs(), format!("document {docid:?} listed twice")));
        }
    }

    let mut fields = Vec::with_capacity(meta.fields.len());
    for (no, name) in meta.fields.iter().enumerate() {
        let field = load_field(paths, no)?;
        validate_field(&paths.field_postings(no), name, &field, docs.len(), terms.len())?;
        fields.push(field);
    }
    let total: u64 = fields.iter().map(|f| f.total_length).sum();
    if total != meta.total_length {
        return Err(Error::corrupt(paths.meta(), format!("total length {} does not match postings ({total})", meta.total_length)));
    }

    let index = InvertedIndex { dictionary, terms, docs, doc_ids, fields };
    Ok((index, meta))
}

fn validate_field(path: &Path, name: &str, field: &FieldIndex, num_docs: usize, num_terms: usize) -> Result<()> {
    if field.name != name {
        return Err(Error::corrupt(path, format!("holds field {:?}, expected {name:?}", field.name)));
    }
    if field.lengths.len() != num_docs {
        return Err(Error::corrupt(path, format!("{} document lengths for {num_docs} documents", field.lengths.len())));
    }
    let mut tf_sums = vec![0u64; num_docs];
    for (&tid, postings) in &field.postings {
        if tid as usize >= num_terms {
            return Err(Error::corrupt(path, format!("term id {tid} out of range")));
        }
        if postings.is_empty() {
            return Err(Error::corrupt(path, format!("empty posting list for term id {tid}")));
        }
        let mut prev: Option<DocId> = None;
        for p in postings {
            if p.doc_id as usize >= num_docs {
                return Err(Error::corrupt(path, format!("document id {} out of range", p.doc_id)));
            }
            if prev.map_or(false, |d| d >= p.doc_id) {
                return Err(Error::corrupt(path, format!("postings of term id {tid} not in document order")));
            }
            if p.tf == 0 {
                return Err(Error::corrupt(path, format!("zero term frequency for term id {tid}")));
            }
            tf_sums[p.doc_id as usize] += p.tf as u64;
            prev = Some(p.doc_id);
        }
    }
    for (doc_id, (&len, &sum)) in field.lengths.iter().zip(&tf_sums).enumerate() {
        if len as u64 != sum {
            return Err(Error::corrupt(path, format!("document {doc_id} has length {len} but {sum} postings")));
        }
    }
    let total: u64 = field.lengths.iter().map(|&l| l as u64).sum();
    if total != field.total_length {
        return Err(Error::corrupt(path, format!("total length {} does not match document lengths ({total})", field.total_length)));
    }
    Ok(())
}

impl InvertedIndex {
    /// Persist to a directory, replacing any index already stored there. Fails with
    /// `IndexLocked` while a build session is writing to the same directory.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let paths = IndexPaths::new(path);
        let _lock = WriteLock::acquire(&paths)?;
        write_index(&paths, self, None).map(|_| ())
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<InvertedIndex> {
        let paths = IndexPaths::new(path);
        let _lock = ReadLock::acquire(&paths)?;
        read_index(&paths).map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuildSession;
    use crate::index::Posting;
    use crate::tokenizer::Analyzer;
    use tempfile::tempdir;

    fn sample() -> InvertedIndex {
        let a = Analyzer::default();
        let mut idx = InvertedIndex::new();
        idx.add_document(&a, "abc", [("title", "static void"), ("contents", "elim static void world")]).unwrap();
        idx.add_document(&a, "efg", [("title", "public int"), ("contents", "eliminating public int world apples indices")]).unwrap();
        idx
    }

    #[test]
    fn round_trip_is_exact() {
        let dir = tempdir().unwrap();
        let idx = sample();
        idx.persist(dir.path()).unwrap();
        let back = InvertedIndex::open(dir.path()).unwrap();
        assert_eq!(back, idx);
        assert_eq!(back.average_document_length(), idx.average_document_length());
    }

    #[test]
    fn metadata_records_analyzer_and_counts() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let cfg = AnalyzerConfig::default();
        let written = write_index(&paths, &sample(), Some(&cfg)).unwrap();
        let (_, meta) = read_index(&paths).unwrap();
        assert_eq!(meta, written);
        assert_eq!(meta.num_docs, 2);
        assert_eq!(meta.fields, vec!["title".to_string(), "contents".to_string()]);
        assert_eq!(meta.analyzer, Some(cfg));
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempdir().unwrap();
        let err = InvertedIndex::open(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn missing_meta_is_corrupt() {
        let dir = tempdir().unwrap();
        sample().persist(dir.path()).unwrap();
        fs::remove_file(dir.path().join("meta.json")).unwrap();
        assert!(matches!(InvertedIndex::open(dir.path()), Err(Error::CorruptIndex { .. })));
    }

    #[test]
    fn garbage_postings_are_corrupt() {
        let dir = tempdir().unwrap();
        sample().persist(dir.path()).unwrap();
        fs::write(dir.path().join("postings/0000.postings.bin"), b"\x01\x02garbage").unwrap();
        assert!(matches!(InvertedIndex::open(dir.path()), Err(Error::CorruptIndex { .. })));
    }

    #[test]
    fn inconsistent_lengths_are_corrupt() {
        let dir = tempdir().unwrap();
        let mut idx = sample();
        idx.fields[1].lengths[0] += 1;
        idx.fields[1].total_length += 1;
        idx.persist(dir.path()).unwrap();
        let err = InvertedIndex::open(dir.path()).unwrap_err();
        match err {
            Error::CorruptIndex { reason, .. } => assert!(reason.contains("length"), "{reason}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    fn corrupt_reason(idx: &InvertedIndex) -> String {
        let dir = tempdir().unwrap();
        idx.persist(dir.path()).unwrap();
        match InvertedIndex::open(dir.path()) {
            Err(Error::CorruptIndex { reason, .. }) => reason,
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn term_id_out_of_range_is_corrupt() {
        let mut idx = sample();
        let bogus = idx.num_terms() as TermId + 5;
        idx.fields[1].postings.insert(bogus, vec![Posting { doc_id: 0, tf: 1 }]);
        let reason = corrupt_reason(&idx);
        assert!(reason.contains(&format!("term id {bogus} out of range")), "{reason}");
    }

    #[test]
    fn postings_out_of_order_are_corrupt() {
        let mut idx = sample();
        let world = idx.term_id("world").unwrap();
        let list = idx.fields[1].postings.get_mut(&world).unwrap();
        assert_eq!(list.len(), 2);
        list.reverse();
        let reason = corrupt_reason(&idx);
        assert!(reason.contains("not in document order"), "{reason}");
    }

    #[test]
    fn zero_term_frequency_is_corrupt() {
        let mut idx = sample();
        let world = idx.term_id("world").unwrap();
        idx.fields[1].postings.get_mut(&world).unwrap()[0].tf = 0;
        let reason = corrupt_reason(&idx);
        assert!(reason.contains("zero term frequency"), "{reason}");
    }

    #[test]
    fn empty_posting_list_is_corrupt() {
        let mut idx = sample();
        let world = idx.term_id("world").unwrap();
        assert!(idx.fields[0].postings.get(&world).is_none());
        idx.fields[0].postings.insert(world, Vec::new());
        let reason = corrupt_reason(&idx);
        assert!(reason.contains(&format!("empty posting list for term id {world}")), "{reason}");
    }

    #[test]
    fn rewrite_with_fewer_fields_drops_old_postings() {
        let dir = tempdir().unwrap();
        sample().persist(dir.path()).unwrap();
        assert!(dir.path().join("postings/0001.postings.bin").exists());

        let a = Analyzer::default();
        let mut narrow = InvertedIndex::new();
        narrow.add_document(&a, "only", [("contents", "static world")]).unwrap();
        narrow.persist(dir.path()).unwrap();
        assert!(dir.path().join("postings/0000.postings.bin").exists());
        assert!(!dir.path().join("postings/0001.postings.bin").exists());
        assert_eq!(InvertedIndex::open(dir.path()).unwrap(), narrow);
    }

    #[test]
    fn persist_is_refused_during_a_build() {
        let dir = tempdir().unwrap();
        sample().persist(dir.path()).unwrap();
        let session = BuildSession::with_analyzer(dir.path(), Analyzer::default()).unwrap();
        let err = InvertedIndex::new().persist(dir.path()).unwrap_err();
        assert!(matches!(err, Error::IndexLocked { .. }));
        assert_eq!(read_index(&IndexPaths::new(dir.path())).unwrap().0, sample());
        session.abort();
        InvertedIndex::new().persist(dir.path()).unwrap();
        assert_eq!(InvertedIndex::open(dir.path()).unwrap().total_documents(), 0);
    }

    #[test]
    fn bad_version_is_corrupt() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let mut meta = write_index(&paths, &sample(), None).unwrap();
        meta.version = 99;
        save_meta(&paths, &meta).unwrap();
        assert!(matches!(read_index(&paths), Err(Error::CorruptIndex { .. })));
    }

    #[test]
    fn empty_index_round_trips() {
        let dir = tempdir().unwrap();
        InvertedIndex::new().persist(dir.path()).unwrap();
        let back = InvertedIndex::open(dir.path()).unwrap();
        assert_eq!(back.total_documents(), 0);
        assert_eq!(back.average_document_length(), 0.0);
    }
}
