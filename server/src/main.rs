use anyhow::Result;
use clap::Parser;
use irqa_core::{AnalyzerConfig, StopwordSource};
use irqa_server::{open_searcher, router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Stopword file overriding the one recorded in the index
    #[arg(long)]
    stopwords: Option<PathBuf>,
    /// Disable stemming (overrides the recorded analyzer)
    #[arg(long, default_value_t = false)]
    no_stem: bool,
}

impl Args {
    fn analyzer_override(&self) -> Option<AnalyzerConfig> {
        if self.stopwords.is_none() && !self.no_stem {
            return None;
        }
        let stopwords = self.stopwords.clone().map_or(StopwordSource::Builtin, StopwordSource::File);
        Some(AnalyzerConfig { stopwords, stemming: !self.no_stem })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let searcher = open_searcher(&args.index, args.analyzer_override())?;
    let app = router(Arc::clone(&searcher));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, index = %args.index, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    searcher.close();
    tracing::info!("server stopped");
    Ok(())
}
