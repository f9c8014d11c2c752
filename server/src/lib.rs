use anyhow::{Context, Result};
use axum::{extract::{Query, State}, http::StatusCode, routing::get, Json, Router};
use irqa_core::persist::{load_meta, IndexPaths};
use irqa_core::{AnalyzerConfig, Error, SearchRequest, Searcher, Similarity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    /// "TFIDF" or "BM25"; unrecognized names fall back to BM25.
    #[serde(default)]
    pub sim: Option<String>,
    /// Comma-separated field names; all fields when absent.
    #[serde(default)]
    pub fields: Option<String>,
}
fn default_k() -> usize { 5 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub similarity: &'static str,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub docid: String,
    pub score: f32,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub num_docs: u32,
    pub num_terms: u32,
    pub fields: Vec<String>,
    pub average_document_length: f64,
    pub created_at: String,
}

#[derive(Clone)]
pub struct AppState {
    pub searcher: Arc<Searcher>,
}

/// Open the index at `index_dir` with the analyzer recorded at build time.
pub fn build_app(index_dir: String) -> Result<Router> {
    Ok(router(open_searcher(&index_dir, None)?))
}

/// Open a shared searcher. `analyzer` overrides the recorded configuration; it must
/// match what the index was built with.
pub fn open_searcher(index_dir: &str, analyzer: Option<AnalyzerConfig>) -> Result<Arc<Searcher>> {
    let config = match analyzer {
        Some(config) => config,
        None => {
            let meta = load_meta(&IndexPaths::new(index_dir)).with_context(|| format!("reading metadata of {index_dir}"))?;
            meta.analyzer.unwrap_or_default()
        }
    };
    let searcher = Searcher::open_path(index_dir, config.build()?).with_context(|| format!("opening index {index_dir}"))?;
    Ok(Arc::new(searcher))
}

pub fn router(searcher: Arc<Searcher>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/stats", get(stats_handler))
        .route("/search", get(search_handler))
        .with_state(AppState { searcher })
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn error_response(err: Error) -> (StatusCode, String) {
    let status = match err {
        Error::IndexNotOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Error::QueryParse { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let similarity = params.sim.as_deref().map(Similarity::from_name).unwrap_or_default();
    let mut request = SearchRequest::new(params.q.as_str()).k(params.k.min(MAX_K)).similarity(similarity);
    if let Some(fields) = params.fields.as_deref() {
        let fields: Vec<&str> = fields.split(',').map(str::trim).filter(|f| !f.is_empty()).collect();
        if !fields.is_empty() {
            request = request.fields(fields);
        }
    }

    let searcher = Arc::clone(&state.searcher);
    let hits = tokio::task::spawn_blocking(move || searcher.execute(&request))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(error_response)?;

    let results = hits.results.into_iter().map(|r| SearchHit { docid: r.docid, score: r.score }).collect();
    let elapsed = start.elapsed();
    Ok(Json(SearchResponse {
        query: params.q,
        similarity: similarity.name(),
        took_s: elapsed.as_secs_f64(),
        total_hits: hits.total_hits,
        results,
    }))
}

pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>, (StatusCode, String)> {
    let meta = state.searcher.meta().map_err(error_response)?;
    Ok(Json(StatsResponse {
        num_docs: meta.num_docs,
        num_terms: meta.num_terms,
        average_document_length: meta.average_document_length(),
        fields: meta.fields,
        created_at: meta.created_at,
    }))
}
