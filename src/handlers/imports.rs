use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::import_batch::{ImportPaymentStatus, ImportStatus},
    errors::ServiceError,
    services::imports::{BatchTransitionOutcome, CreateImportBatchRequest, ImportBatchResponse},
    AppState,
};

use super::identity::AdminUser;

#[derive(Debug, Deserialize)]
pub struct TransitionImportStatusRequest {
    pub status: ImportStatus,
}

#[derive(Debug, Deserialize)]
pub struct TransitionPaymentStatusRequest {
    pub status: ImportPaymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct BulkTransitionRequest {
    pub batch_ids: Vec<Uuid>,
    pub status: ImportStatus,
}

/// POST /imports (admin only).
pub async fn create_import(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(request): Json<CreateImportBatchRequest>,
) -> Result<(StatusCode, Json<ImportBatchResponse>), ServiceError> {
    let response = state.services.imports.create_batch(admin.id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /imports/:id
pub async fn get_import(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<ImportBatchResponse>, ServiceError> {
    let response = state.services.imports.get_batch(batch_id).await?;
    Ok(Json(response))
}

/// POST /imports/:id/status (admin only).
pub async fn transition_status(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(batch_id): Path<Uuid>,
    Json(request): Json<TransitionImportStatusRequest>,
) -> Result<Json<crate::entities::import_batch::Model>, ServiceError> {
    let batch = state
        .services
        .imports
        .transition_import_status(Some(admin.id), batch_id, request.status)
        .await?;
    Ok(Json(batch))
}

/// POST /imports/:id/payment-status (admin only).
pub async fn transition_payment_status(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(batch_id): Path<Uuid>,
    Json(request): Json<TransitionPaymentStatusRequest>,
) -> Result<Json<crate::entities::import_batch::Model>, ServiceError> {
    let batch = state
        .services
        .imports
        .transition_payment_status(Some(admin.id), batch_id, request.status)
        .await?;
    Ok(Json(batch))
}

/// POST /imports/status/bulk (admin only).
pub async fn bulk_transition(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(request): Json<BulkTransitionRequest>,
) -> Result<Json<Vec<BatchTransitionOutcome>>, ServiceError> {
    let outcomes = state
        .services
        .imports
        .bulk_transition(Some(admin.id), &request.batch_ids, request.status)
        .await?;
    Ok(Json(outcomes))
}
