use axum::extract::{Path, State};
use tracing::info;

use crate::{services::return_labels::ReturnLabelResult, ApiResponse, ApiResult, AppState};

/// POST /api/v1/orders/:id/return-label
///
/// Buys and registers the reverse-logistics label for an order approved for return.
pub async fn generate_return_label(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
) -> ApiResult<ReturnLabelResult> {
    info!(order_id, "Return label requested");
    let result = state.return_labels.generate(order_id).await?;
    Ok(axum::Json(ApiResponse::success(result)))
}
