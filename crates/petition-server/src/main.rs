mod logging;
mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use petition_core::{
    config::Config,
    embed::Embedder,
    index::{AnnParams, IndexStore, VectorIndex},
    workflow::Workflow,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use logging::{BroadcastLayer, LogRing};
use routes::{create_petition, health, recent_logs, sse_logs};

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub workflow: Workflow,
    pub store: Arc<IndexStore>,
    pub config: Arc<Config>,
    pub backend_name: String,
    pub start_time: Instant,
    pub log_tx: broadcast::Sender<String>,
    pub log_ring: LogRing,
}

/// A query embedder that knows its width must agree with the index it feeds.
fn check_dimensions(embedder: &dyn Embedder, index: &VectorIndex) -> anyhow::Result<()> {
    if let Some(dims) = embedder.dimensions() {
        if dims != index.dimensions() {
            anyhow::bail!(
                "{} embedder produces {dims}-dim vectors but the {:?} index holds {}-dim embeddings",
                embedder.name(),
                index.kind(),
                index.dimensions()
            );
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ── main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (log_tx, _) = broadcast::channel::<String>(1024);
    let log_ring: LogRing = Arc::default();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "petition_server=info,petition_core=info,tower_http=debug".into()),
        )
        .with(fmt::layer())
        .with(BroadcastLayer {
            tx: log_tx.clone(),
            ring: Arc::clone(&log_ring),
        })
        .init();

    let config = Arc::new(Config::from_env()?);

    let store = Arc::new(IndexStore::load(&config.index_dir, AnnParams::from_config(&config))?);
    let (structure_embedder, content_embedder) = petition_agent::build_embedders(&config);
    check_dimensions(structure_embedder.as_ref(), &store.structure)?;
    check_dimensions(content_embedder.as_ref(), &store.content)?;

    let backend = petition_agent::build_backend(&config)?;
    let backend_name = backend.name().to_string();
    info!(
        backend = %backend_name,
        embedder = %config.embedder,
        structure_entries = store.structure.len(),
        content_entries = store.content.len(),
        "petition engine ready"
    );

    let workflow = Workflow::from_config(
        &config,
        Arc::clone(&store),
        structure_embedder,
        content_embedder,
        backend,
    );

    let state = Arc::new(AppState {
        workflow,
        store,
        config: Arc::clone(&config),
        backend_name,
        start_time: Instant::now(),
        log_tx,
        log_ring,
    });

    let app = Router::new()
        // Health
        .route("/api/health", get(health))
        // Petitions
        .route("/api/petitions", post(create_petition))
        // Logs
        .route("/api/logs", get(sse_logs))
        .route("/api/logs/recent", get(recent_logs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.web_bind, config.web_port);
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("index store released");
    Ok(())
}
