use anyhow::{Context, Result};
use irqa_core::{SearchRequest, Searcher, Similarity};
use rayon::prelude::*;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const PROGRESS_EVERY: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    pub question: String,
    /// Docid of the passage holding the answer.
    pub paragraph_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub questions: usize,
    pub answered: usize,
    pub elapsed: Duration,
}

impl EvalReport {
    /// Percentage of questions whose gold passage was retrieved.
    pub fn accuracy(&self) -> f64 {
        if self.questions == 0 { 0.0 } else { self.answered as f64 / self.questions as f64 * 100.0 }
    }
}

pub fn load_questions(path: &Path) -> Result<Vec<Question>> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let questions = serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parsing {}", path.display()))?;
    Ok(questions)
}

/// Count the questions whose gold passage appears in the top `k` results.
/// Questions are independent, so they are searched in parallel.
pub fn evaluate(
    searcher: &Searcher,
    questions: &[Question],
    k: usize,
    similarity: Similarity,
    fields: Option<&[String]>,
) -> irqa_core::Result<EvalReport> {
    let start = Instant::now();
    let done = AtomicUsize::new(0);
    let outcomes = questions
        .par_iter()
        .map(|q| -> irqa_core::Result<bool> {
            let mut request = SearchRequest::new(q.question.as_str()).k(k).similarity(similarity);
            if let Some(fields) = fields {
                request = request.fields(fields.iter().cloned());
            }
            let hits = searcher.execute(&request)?;
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            if n % PROGRESS_EVERY == 0 {
                tracing::info!(questions = n, midtime_s = start.elapsed().as_secs_f64(), "evaluation progress");
            }
            Ok(hits.results.iter().any(|r| r.docid == q.paragraph_id))
        })
        .collect::<irqa_core::Result<Vec<bool>>>()?;

    Ok(EvalReport {
        questions: questions.len(),
        answered: outcomes.into_iter().filter(|&hit| hit).count(),
        elapsed: start.elapsed(),
    })
}
