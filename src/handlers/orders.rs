use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::fulfillment::{BulkOrderStatusOutcome, OrderResponse, PlaceOrderRequest},
    AppState,
};

use super::identity::{AdminUser, CurrentUser};

#[derive(Debug, Deserialize)]
pub struct BulkOrderStatusRequest {
    pub order_ids: Vec<Uuid>,
    pub status: OrderStatus,
}

/// POST /orders. The sole entry point that converts a cart into
/// committed stock consumption.
pub async fn place_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ServiceError> {
    let response = state
        .services
        .fulfillment
        .place_order(user.id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let response = state.services.fulfillment.get_order(order_id).await?;
    Ok(Json(response))
}

/// POST /orders/:id/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let response = state
        .services
        .fulfillment
        .cancel_order(Some(user.id), order_id)
        .await?;
    Ok(Json(response))
}

/// POST /orders/status/bulk (admin only).
pub async fn bulk_update_status(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(request): Json<BulkOrderStatusRequest>,
) -> Result<Json<BulkOrderStatusOutcome>, ServiceError> {
    let outcome = state
        .services
        .fulfillment
        .bulk_update_status(Some(admin.id), &request.order_ids, request.status)
        .await?;
    Ok(Json(outcome))
}
