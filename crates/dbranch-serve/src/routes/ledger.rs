//! Ledger status endpoints.
//!
//! Read-only views of the ledger database the curator follows, and of how far
//! the curator's checkpoints trail its tip.

use axum::Json;
use axum::extract::State;
use dbranch_core::{LedgerMeta, LedgerSyncStatus};
use dbranch_curator::BlockStatus;
use serde::{Deserialize, Serialize};

use crate::cache::get_or_compute;
use crate::error::ApiError;
use crate::state::{AppState, LedgerView};

fn ledger(state: &AppState) -> Result<&LedgerView, ApiError> {
    state
        .ledger
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("no ledger database configured".to_string()))
}

async fn cached_meta(state: &AppState) -> Result<LedgerMeta, ApiError> {
    let ledger = ledger(state)?;
    let meta: Option<LedgerMeta> = get_or_compute(&state.cache, "db_meta", || async {
        Ok(ledger.source.meta().await?)
    })
    .await?;
    meta.ok_or_else(|| ApiError::NotFound("ledger metadata".to_string()))
}

async fn cached_sync(state: &AppState) -> Result<LedgerSyncStatus, ApiError> {
    let ledger = ledger(state)?;
    get_or_compute(&state.cache, "db_sync", || async {
        Ok(ledger.source.sync_status().await?)
    })
    .await
}

async fn cached_block(state: &AppState) -> Result<BlockStatus, ApiError> {
    let ledger = ledger(state)?;
    get_or_compute(&state.cache, "db_block", || async {
        Ok(BlockStatus::load(ledger.source.as_ref(), &ledger.checkpoints, &ledger.addresses).await?)
    })
    .await
}

// ═══════════════════════════════════════════════════════════════════════════
// Individual views
// ═══════════════════════════════════════════════════════════════════════════

/// `GET /api/v0/db/meta`
pub async fn meta(State(state): State<AppState>) -> Result<Json<LedgerMeta>, ApiError> {
    Ok(Json(cached_meta(&state).await?))
}

/// `GET /api/v0/db/sync`
///
/// How much of the chain's history the ledger database holds and how old its
/// newest block is.
pub async fn sync_status(
    State(state): State<AppState>,
) -> Result<Json<LedgerSyncStatus>, ApiError> {
    Ok(Json(cached_sync(&state).await?))
}

/// `GET /api/v0/db/block`
///
/// Ledger tip against the curator's checkpoint for each watched address.
pub async fn block_status(State(state): State<AppState>) -> Result<Json<BlockStatus>, ApiError> {
    Ok(Json(cached_block(&state).await?))
}

// ═══════════════════════════════════════════════════════════════════════════
// Overview
// ═══════════════════════════════════════════════════════════════════════════

/// All ledger status views in one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverviewResponse {
    /// Absent until the database has written its metadata row.
    pub meta: Option<LedgerMeta>,
    pub sync: LedgerSyncStatus,
    pub block: BlockStatus,
}

/// `GET /api/v0/db/overview`
pub async fn overview(State(state): State<AppState>) -> Result<Json<OverviewResponse>, ApiError> {
    let meta = match cached_meta(&state).await {
        Ok(meta) => Some(meta),
        Err(ApiError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };
    Ok(Json(OverviewResponse {
        meta,
        sync: cached_sync(&state).await?,
        block: cached_block(&state).await?,
    }))
}
