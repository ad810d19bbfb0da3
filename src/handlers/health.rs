use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use sea_orm::ConnectionTrait;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: &'static str,
    pub timestamp: String,
    pub database: ComponentStatus,
    pub sync_in_flight: bool,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.db.execute_unprepared("SELECT 1").await {
        Ok(_) => ComponentStatus::Up,
        Err(e) => {
            tracing::warn!(error = %e, "Health check database ping failed");
            ComponentStatus::Down
        }
    };
    let status_code = match database {
        ComponentStatus::Up => StatusCode::OK,
        ComponentStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    let body = HealthResponse {
        status: database.clone(),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database,
        sync_in_flight: state.shipment_sync.is_running(),
    };
    (status_code, Json(body))
}
