use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use petition_core::{error::PetitionError, format::PetitionOutput, input::PetitionRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;

use crate::AppState;

// ── Error helper ──────────────────────────────────────────────────────────

pub(crate) fn internal(e: impl std::fmt::Display) -> StatusCode {
    tracing::error!("internal error: {e}");
    StatusCode::INTERNAL_SERVER_ERROR
}

/// HTTP status for a workflow that stopped on `error`.
pub(crate) fn status_for(error: &PetitionError) -> StatusCode {
    match error {
        PetitionError::Validation { .. }
        | PetitionError::RetrievalInsufficient { .. }
        | PetitionError::FeedbackExhausted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PetitionError::RetrievalFailed(_) | PetitionError::GenerationService(_) => StatusCode::BAD_GATEWAY,
        PetitionError::Internal(e) => internal(e),
    }
}

// ── Query types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(crate) struct RecentQuery {
    limit: Option<usize>,
}

// ── Handlers ──────────────────────────────────────────────────────────────

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "backend": state.backend_name,
        "embedder": state.config.embedder,
        "uptime_s": state.start_time.elapsed().as_secs(),
        "indexes": {
            "structure": state.store.structure.len(),
            "content": state.store.content.len(),
            "dimensions": state.store.structure.dimensions(),
        },
    }))
}

pub(crate) async fn create_petition(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PetitionRequest>,
) -> (StatusCode, Json<PetitionOutput>) {
    info!(
        jurisdiction = %req.jurisdiction,
        petition_type = %req.petition_type,
        "petition request received"
    );
    match state.workflow.run(req).await {
        Ok(done) => (StatusCode::OK, Json(PetitionOutput::from_state(&done))),
        Err(failure) => (status_for(&failure.error), Json(PetitionOutput::from_failure(&failure))),
    }
}

pub(crate) async fn recent_logs(
    State(state): State<Arc<AppState>>,
    Query(q): Query<RecentQuery>,
) -> Json<Value> {
    let limit = q.limit.unwrap_or(100);
    let ring = state.log_ring.lock().unwrap_or_else(|e| e.into_inner());
    let lines: Vec<Value> = ring
        .iter()
        .skip(ring.len().saturating_sub(limit))
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();
    Json(json!(lines))
}

// Log stream SSE

pub(crate) async fn sse_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    // Subscribe before snapshotting ring to avoid race
    let live_rx = state.log_tx.subscribe();
    let history: Vec<String> = state
        .log_ring
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .cloned()
        .collect();
    tokio::spawn(async move {
        for line in history {
            if tx.send(line).is_err() {
                return;
            }
        }
        let mut live_rx = live_rx;
        loop {
            match live_rx.recv().await {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });
    let stream = UnboundedReceiverStream::new(rx)
        .map(|data| Ok::<_, std::convert::Infallible>(Event::default().data(data)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}
