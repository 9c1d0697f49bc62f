use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::exposure::{HistoryEntry, PendingImport},
    services::warranty::WarrantyAssessment,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct WarrantyQuery {
    /// Reference instant for the assessment; defaults to the current time.
    pub now: Option<DateTime<Utc>>,
}

/// GET /variants/:variant_id/pending-imports
pub async fn pending_imports(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
) -> Result<Json<Vec<PendingImport>>, ServiceError> {
    let pending = state
        .services
        .exposure
        .pending_imports_for_variant(variant_id)
        .await?;
    Ok(Json(pending))
}

/// GET /variants/:variant_id/warranty
pub async fn warranty(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
    Query(query): Query<WarrantyQuery>,
) -> Result<Json<Option<WarrantyAssessment>>, ServiceError> {
    let now = query.now.unwrap_or_else(Utc::now);
    let assessment = state
        .services
        .exposure
        .warranty_for_variant(variant_id, now)
        .await?;
    Ok(Json(assessment))
}

/// GET /variants/:variant_id/history
pub async fn history(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
) -> Result<Json<Vec<HistoryEntry>>, ServiceError> {
    let history = state
        .services
        .exposure
        .history_for_variant(variant_id)
        .await?;
    Ok(Json(history))
}
