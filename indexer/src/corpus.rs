use anyhow::{bail, Context, Result};
use irqa_core::Document;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// JSON and JSONL files under `input`, or `input` itself when it is a file.
pub fn collect_inputs(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

/// Stream the documents of one file into `sink`, in file order.
pub fn read_documents<F>(file: &Path, mut sink: F) -> Result<()>
where
    F: FnMut(Document) -> Result<()>,
{
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            let value: Value = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: invalid JSON", file.display(), lineno + 1))?;
            sink(document_from_value(value).with_context(|| format!("{}:{}", file.display(), lineno + 1))?)?;
        }
    } else {
        let json: Value = serde_json::from_reader(reader).with_context(|| format!("{}: invalid JSON", file.display()))?;
        match json {
            Value::Array(arr) => {
                for (i, v) in arr.into_iter().enumerate() {
                    sink(document_from_value(v).with_context(|| format!("{}: entry {i}", file.display()))?)?;
                }
            }
            obj @ Value::Object(_) => sink(document_from_value(obj).with_context(|| file.display().to_string())?)?,
            _ => bail!("{}: expected an object or an array of objects", file.display()),
        }
    }
    Ok(())
}

/// `docid` (or `id`) becomes the stored identifier; every other string or
/// string-array member becomes an indexed field, in the order it appears.
pub fn document_from_value(value: Value) -> Result<Document> {
    let Value::Object(mut map) = value else { bail!("document is not a JSON object") };
    // shift_remove keeps the remaining members in document order.
    let docid = map.shift_remove("docid");
    let id = map.shift_remove("id");
    let docid = match docid.or(id) {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => bail!("docid must be a string, got {other}"),
        None => bail!("document has no docid"),
    };
    Ok(Document { docid, fields: text_fields(map) })
}

fn text_fields(map: Map<String, Value>) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    for (name, value) in map {
        let text = match value {
            Value::String(s) => s,
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            _ => continue,
        };
        fields.push((name, text));
    }
    fields
}
