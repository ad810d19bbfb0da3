use axum::extract::State;

use crate::{services::shipment_sync::SyncOutcome, ApiResponse, ApiResult, AppState};

/// POST /api/v1/shipments/sync
///
/// Runs one reconciliation batch now. Returns the `skipped` outcome when a
/// batch is already in flight.
pub async fn trigger_sync(State(state): State<AppState>) -> ApiResult<SyncOutcome> {
    let outcome = state.shipment_sync.run_batch().await;
    Ok(axum::Json(ApiResponse::success(outcome)))
}
