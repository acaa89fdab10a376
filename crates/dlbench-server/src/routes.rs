use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use serde::Serialize;
use tracing::info;

use dlbench_core::{ExecutionContext, Framing, MemoryProfile, TransferStrategy, select};

use crate::dispatch::Downloader;
use crate::response::DownloadError;

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub downloader: Arc<Downloader>,
}

// ── Response types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyInfo {
    pub endpoint: &'static str,
    pub strategy: TransferStrategy,
    pub execution_context: ExecutionContext,
    pub memory_profile: MemoryProfile,
    pub framing: Framing,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyListing {
    pub worker_threads: usize,
    pub carrier_threads: usize,
    pub strategies: Vec<StrategyInfo>,
}

// ── Handlers ────────────────────────────────────────────────────────────

/// GET /download/{strategy}/{name} — serve one file with the endpoint's strategy.
pub async fn download(
    State(state): State<AppState>,
    Path((endpoint, name)): Path<(String, String)>,
) -> Result<Response, DownloadError> {
    let (strategy, context) =
        select(&endpoint).ok_or_else(|| DownloadError::UnknownStrategy(endpoint.clone()))?;
    info!("{} [{}] on {:?}", strategy, name, context);

    let response = state.downloader.serve(strategy, &name).await?;
    Ok(response)
}

/// GET /strategies — what each endpoint does and where it runs.
pub async fn strategies(State(state): State<AppState>) -> Json<StrategyListing> {
    let strategies = TransferStrategy::ALL
        .into_iter()
        .map(|s| StrategyInfo {
            endpoint: s.endpoint(),
            strategy: s,
            execution_context: s.execution_context(),
            memory_profile: s.memory_profile(),
            framing: s.framing(),
        })
        .collect();

    Json(StrategyListing {
        worker_threads: state.downloader.workers().size(),
        carrier_threads: state.downloader.lightweight().carriers(),
        strategies,
    })
}

/// GET /health — liveness check.
pub async fn health() -> &'static str {
    "ok"
}
