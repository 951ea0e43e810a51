use anyhow::Context;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use askdoc::chunking::Chunker;
use askdoc::config::AppConfig;
use askdoc::embeddings::create_embedder;
use askdoc::fetch::HttpFetcher;
use askdoc::index::{create_index, ScoreMetric};
use askdoc::llm::{create_llm_client, CompletionParams};
use askdoc::pipeline::Pipeline;
use askdoc::reasoner::Synthesizer;
use askdoc::retriever::Retriever;
use askdoc::routes::{create_router, AppState};
use askdoc::store::create_chunk_store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(version = askdoc::VERSION, "Starting askdoc");

    let metrics_handle = askdoc::metrics::install_recorder()?;
    askdoc::metrics::describe();

    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(
        config.fetch.timeout_secs,
    ))?);
    let embedder = create_embedder(&config.embedding)?;
    let index = create_index(&config.index)?;
    let metric = ScoreMetric::parse(&config.index.metric)?;
    let llm = create_llm_client(&config.llm)?;
    let store = create_chunk_store(&config.database).await?;
    let chunker = Chunker::new()?;

    let retriever = Retriever::new(
        embedder,
        index,
        metric,
        Duration::from_secs(config.embedding.timeout_secs),
        Duration::from_secs(config.index.timeout_secs),
    );
    let synthesizer = Synthesizer::new(
        llm,
        CompletionParams::from(&config.llm),
        Duration::from_secs(config.llm.timeout_secs),
    );
    let pipeline = Pipeline::new(
        fetcher,
        chunker,
        retriever,
        synthesizer,
        store,
        config.chunking.clone(),
        config.retrieval.clone(),
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        pipeline: Arc::new(pipeline),
    };
    let app = create_router(state, metrics_handle);

    let host: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid server.host '{}'", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
