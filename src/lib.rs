//! Storefront logistics library
//!
//! Carrier reconciliation and reverse-logistics label generation for the toy
//! storefront backend.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod carrier;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod repositories;
pub mod scheduler;
pub mod services;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{AdminToken, AuthRouterExt};
use crate::carrier::CarrierClient;
use crate::repositories::ShipmentRepository;
use crate::services::return_labels::ReturnLabelService;
use crate::services::shipment_sync::ShipmentSyncService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub shipment_sync: Arc<ShipmentSyncService>,
    pub return_labels: Arc<ReturnLabelService>,
}

impl AppState {
    /// Wires both services over one repository and one carrier client.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        carrier: Arc<dyn CarrierClient>,
    ) -> Self {
        let repository = ShipmentRepository::new(db.clone());
        let shipment_sync = Arc::new(ShipmentSyncService::new(
            repository.clone(),
            carrier.clone(),
            config.sync.candidate_delay(),
        ));
        let return_labels = Arc::new(ReturnLabelService::new(
            repository,
            carrier,
            config.return_depot.clone(),
        ));

        Self {
            db,
            config: Arc::new(config),
            shipment_sync,
            return_labels,
        }
    }
}

// Common response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Admin routes under `/api/v1`, all behind the admin bearer token
pub fn api_v1_routes(admin_token: AdminToken) -> Router<AppState> {
    Router::new()
        .route(
            "/orders/:id/return-label",
            post(handlers::returns::generate_return_label),
        )
        .route("/shipments/sync", post(handlers::shipments::trigger_sync))
        .with_admin_token(admin_token)
}

pub fn app_router(state: AppState) -> Router {
    let admin_token = AdminToken::new(state.config.admin_api_token.clone());
    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/v1", api_v1_routes(admin_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
