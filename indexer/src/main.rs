use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use irqa_core::persist::{load_meta, IndexPaths};
use irqa_core::{AnalyzerConfig, BuildSession, Error, Searcher, Similarity, StopwordSource};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

mod corpus;
mod eval;

#[derive(Parser)]
#[command(name = "irqa-indexer")]
#[command(about = "Build, query and evaluate a BM25 / TF-IDF passage index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct AnalyzerArgs {
    /// Stopword file, one term per line (default: built-in English list, or the list recorded in the index)
    #[arg(long)]
    stopwords: Option<PathBuf>,
    /// Disable English stemming
    #[arg(long, default_value_t = false)]
    no_stem: bool,
}

impl AnalyzerArgs {
    fn is_set(&self) -> bool {
        self.stopwords.is_some() || self.no_stem
    }

    fn config(&self) -> AnalyzerConfig {
        let stopwords = match &self.stopwords {
            Some(path) => StopwordSource::File(path.clone()),
            None => StopwordSource::Builtin,
        };
        AnalyzerConfig { stopwords, stemming: !self.no_stem }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        #[command(flatten)]
        analyzer: AnalyzerArgs,
        /// Fail on a duplicate docid instead of skipping it
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Print the top-k passages for one question
    Query {
        #[arg(long)]
        index: String,
        #[arg(long)]
        q: String,
        #[arg(long, default_value_t = 5)]
        k: usize,
        /// TFIDF or BM25; anything else means BM25
        #[arg(long, default_value = "BM25")]
        sim: String,
        /// Restrict the search to these fields (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,
        #[command(flatten)]
        analyzer: AnalyzerArgs,
    },
    /// Measure top-k accuracy for a question set against one or more indexes
    Eval {
        /// Index directory (repeatable)
        #[arg(long = "index", required = true)]
        indexes: Vec<String>,
        /// JSON array of {"question", "paragraph_id"} records
        #[arg(long)]
        questions: String,
        #[arg(long, default_value_t = 5)]
        k: usize,
        #[arg(long, default_value = "BM25")]
        sim: String,
        #[arg(long = "field")]
        fields: Vec<String>,
        #[command(flatten)]
        analyzer: AnalyzerArgs,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, analyzer, strict } => build(&input, &output, analyzer.config(), strict),
        Commands::Query { index, q, k, sim, fields, analyzer } => query(&index, &q, k, &sim, &fields, &analyzer),
        Commands::Eval { indexes, questions, k, sim, fields, analyzer } => {
            run_eval(&indexes, &questions, k, &sim, &fields, &analyzer)
        }
    }
}

fn build(input: &str, output: &str, config: AnalyzerConfig, strict: bool) -> Result<()> {
    let files = corpus::collect_inputs(Path::new(input));
    if files.is_empty() {
        anyhow::bail!("no .json or .jsonl input found at {input}");
    }

    let mut session = BuildSession::begin(output, config)?;
    let mut skipped = 0usize;
    for file in &files {
        corpus::read_documents(file, |doc| match session.add(&doc) {
            Ok(_) => Ok(()),
            Err(Error::DuplicateDocument { docid }) if !strict => {
                tracing::warn!(%docid, file = %file.display(), "skipping duplicate document");
                skipped += 1;
                Ok(())
            }
            Err(e) => Err(e.into()),
        })?;
    }
    tracing::info!(files = files.len(), skipped, "ingested documents");
    session.commit()?;
    Ok(())
}

/// The analyzer given on the command line, else the one recorded at build time.
fn resolve_analyzer(index: &str, args: &AnalyzerArgs) -> Result<AnalyzerConfig> {
    if args.is_set() {
        return Ok(args.config());
    }
    let meta = load_meta(&IndexPaths::new(index)).with_context(|| format!("reading metadata of {index}"))?;
    Ok(meta.analyzer.unwrap_or_default())
}

fn open_searcher(index: &str, args: &AnalyzerArgs) -> Result<Searcher> {
    let analyzer = resolve_analyzer(index, args)?.build()?;
    Searcher::open_path(index, analyzer).with_context(|| format!("opening index {index}"))
}

fn query(index: &str, q: &str, k: usize, sim: &str, fields: &[String], args: &AnalyzerArgs) -> Result<()> {
    let searcher = open_searcher(index, args)?;
    let similarity = Similarity::from_name(sim);
    let results = if fields.is_empty() {
        searcher.search(q, k, similarity)?
    } else {
        searcher.search_fields(q, k, similarity, fields)?
    };
    for (rank, r) in results.iter().enumerate() {
        println!("{q}\t{}\t{}\t{:.6}", r.docid, rank + 1, r.score);
    }
    searcher.close();
    Ok(())
}

fn run_eval(indexes: &[String], questions: &str, k: usize, sim: &str, fields: &[String], args: &AnalyzerArgs) -> Result<()> {
    let questions = eval::load_questions(Path::new(questions))?;
    let similarity = Similarity::from_name(sim);
    let fields = (!fields.is_empty()).then_some(fields);
    for index in indexes {
        let searcher = open_searcher(index, args)?;
        let report = eval::evaluate(&searcher, &questions, k, similarity, fields)?;
        searcher.close();
        println!(
            "{index}\tacc={:.6}\t{}/{}\t{:.3}s",
            report.accuracy(),
            report.answered,
            report.questions,
            report.elapsed.as_secs_f64()
        );
    }
    Ok(())
}
