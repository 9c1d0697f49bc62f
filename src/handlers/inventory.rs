use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::exposure::StockClassification,
    services::ledger::{InventoryAdjustment, LedgerChange},
    AppState,
};

use super::identity::AdminUser;

#[derive(Debug, Serialize)]
pub struct InventoryStatusResponse {
    pub variant_id: Uuid,
    pub quantity: i32,
    pub classification: StockClassification,
}

#[derive(Debug, Deserialize)]
pub struct AdjustInventoryRequest {
    /// Signed change, clamped at zero.
    pub delta: Option<i32>,
    /// Absolute replacement quantity; must be non-negative.
    pub quantity: Option<i32>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdjustInventoryResponse {
    pub variant_id: Uuid,
    pub old_quantity: i32,
    pub new_quantity: i32,
}

/// GET /inventory/:variant_id
pub async fn get_inventory(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
) -> Result<Json<InventoryStatusResponse>, ServiceError> {
    let quantity = state.services.ledger.quantity_of(variant_id).await?;
    let classification = state.services.exposure.classify_stock(variant_id).await?;

    Ok(Json(InventoryStatusResponse {
        variant_id,
        quantity,
        classification,
    }))
}

/// POST /inventory/:variant_id/adjust (admin only). Manual correction.
pub async fn adjust_inventory(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(variant_id): Path<Uuid>,
    Json(request): Json<AdjustInventoryRequest>,
) -> Result<Json<AdjustInventoryResponse>, ServiceError> {
    let adjustment = match (request.delta, request.quantity) {
        (Some(delta), None) => InventoryAdjustment::Delta(delta),
        (None, Some(quantity)) => InventoryAdjustment::SetQuantity(quantity),
        _ => {
            return Err(ServiceError::ValidationError(
                "provide exactly one of 'delta' or 'quantity'".to_string(),
            ))
        }
    };

    let LedgerChange {
        old_quantity,
        new_quantity,
        ..
    } = state
        .services
        .ledger
        .adjust_inventory(Some(admin.id), variant_id, adjustment, request.reason)
        .await?;

    Ok(Json(AdjustInventoryResponse {
        variant_id,
        old_quantity,
        new_quantity,
    }))
}
