//! Fulfillment API Library
//!
//! Inventory ledger, supplier import processing, and order fulfillment
//! for digital product variants. Catalog data, authentication, and
//! presentation live in sibling services; this crate owns the per-variant
//! stock counters and every path that mutates them.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Assembles the full application router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/inventory/:variant_id", get(handlers::inventory::get_inventory))
        .route(
            "/inventory/:variant_id/adjust",
            post(handlers::inventory::adjust_inventory),
        )
        .route("/imports", post(handlers::imports::create_import))
        .route("/imports/:id", get(handlers::imports::get_import))
        .route("/imports/:id/status", post(handlers::imports::transition_status))
        .route(
            "/imports/:id/payment-status",
            post(handlers::imports::transition_payment_status),
        )
        .route("/imports/status/bulk", post(handlers::imports::bulk_transition))
        .route("/orders", post(handlers::orders::place_order))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .route("/orders/status/bulk", post(handlers::orders::bulk_update_status))
        .route(
            "/variants/:variant_id/pending-imports",
            get(handlers::reports::pending_imports),
        )
        .route("/variants/:variant_id/warranty", get(handlers::reports::warranty))
        .route("/variants/:variant_id/history", get(handlers::reports::history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    Json(json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "service": "fulfillment-api",
        "environment": state.config.environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
