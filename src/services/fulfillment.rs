use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::import_batch::{self, ImportStatus},
    entities::import_batch_item,
    entities::order::{self, Entity as Orders, OrderStatus},
    entities::order_item::{self, Entity as OrderItems},
    errors::ServiceError,
    events::{Event, EventSender},
};

use super::{audit, ledger};

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub variant_id: Uuid,
    pub quantity: i32,
    pub retail_price: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    #[validate(length(min = 1, message = "An order requires at least one line item"))]
    pub items: Vec<OrderLineRequest>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Serialize)]
pub struct SkippedOrder {
    pub order_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct BulkOrderStatusOutcome {
    pub updated: Vec<Uuid>,
    pub skipped: Vec<SkippedOrder>,
}

/// Orchestrates the conversion of carts into committed stock consumption
/// and its reversal. The only writer of order rows, and (with the import
/// service) one of the two writers of the ledger.
#[derive(Clone)]
pub struct FulfillmentService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl FulfillmentService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Places an order: every line's decrement, the order row, its items,
    /// and the audit entry commit as one unit. Any single shortfall fails
    /// the whole order with the offending variant reported.
    #[instrument(skip(self, request), fields(user_id = %user_id, lines = request.items.len()))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;
        for line in &request.items {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "line for variant {} must have a positive quantity, got {}",
                    line.variant_id, line.quantity
                )));
            }
            if line.retail_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "line for variant {} must not have a negative retail price",
                    line.variant_id
                )));
            }
        }

        let mut attempts = 0;
        let response = loop {
            attempts += 1;
            match self.try_place_order(user_id, &request).await {
                Err(ServiceError::ConcurrencyConflict { .. }) if attempts == 1 => {
                    warn!(%user_id, "order placement lost a version race, retrying once");
                    continue;
                }
                other => break other?,
            }
        };

        if let Err(e) = self
            .event_sender
            .send(Event::OrderPlaced {
                order_id: response.order.id,
                user_id,
                total: response.order.total,
                line_count: response.items.len(),
            })
            .await
        {
            warn!(error = %e, order_id = %response.order.id, "failed to send order placed event");
        }

        Ok(response)
    }

    async fn try_place_order(
        &self,
        user_id: Uuid,
        request: &PlaceOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.db.begin().await?;

        // Fail fast on the first shortfall; the rollback discards any
        // decrements already applied for earlier lines.
        for line in &request.items {
            ledger::decrement(&txn, line.variant_id, line.quantity).await?;
        }

        let total: Decimal = request
            .items
            .iter()
            .map(|line| line.retail_price * Decimal::from(line.quantity))
            .sum();

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            status: Set(OrderStatus::Processing.to_string()),
            total: Set(total),
            notes: Set(request.notes.clone()),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let net_price = latest_cost_basis(&txn, line.variant_id).await?;
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                variant_id: Set(line.variant_id),
                quantity: Set(line.quantity),
                retail_price: Set(line.retail_price),
                net_price: Set(net_price),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        audit::record(
            &txn,
            Some(user_id),
            "order.place",
            "order",
            order_id,
            Some(json!({
                "total": total,
                "lines": items
                    .iter()
                    .map(|i| json!({ "variant_id": i.variant_id, "quantity": i.quantity }))
                    .collect::<Vec<_>>(),
            })),
        )
        .await?;

        txn.commit().await?;

        info!(%order_id, total = %total, "order placed");

        Ok(OrderResponse { order, items })
    }

    /// Cancels a non-terminal order, restoring every line's stock in the
    /// same transaction as the status flip.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        actor: Option<Uuid>,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let mut attempts = 0;
        let response = loop {
            attempts += 1;
            match self.try_cancel_order(actor, order_id).await {
                Err(ServiceError::ConcurrencyConflict { .. }) if attempts == 1 => {
                    warn!(%order_id, "order cancellation lost a version race, retrying once");
                    continue;
                }
                other => break other?,
            }
        };

        if let Err(e) = self.event_sender.send(Event::OrderCancelled { order_id }).await {
            warn!(error = %e, %order_id, "failed to send order cancelled event");
        }

        Ok(response)
    }

    async fn try_cancel_order(
        &self,
        actor: Option<Uuid>,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Orders::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", order_id))?;

        let current = parse_order_status(&order.status)?;
        if !current.can_transition_to(OrderStatus::Cancelled) {
            return Err(ServiceError::InvalidStateTransition {
                kind: "order status",
                from: current.to_string(),
                to: OrderStatus::Cancelled.to_string(),
            });
        }

        let items = OrderItems::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&txn)
            .await?;

        for item in &items {
            ledger::increment(&txn, item.variant_id, item.quantity).await?;
        }

        let now = Utc::now();
        write_order_status(&txn, &order, OrderStatus::Cancelled, now).await?;

        audit::record(
            &txn,
            actor,
            "order.cancel",
            "order",
            order_id,
            Some(json!({
                "from": current.to_string(),
                "restored_lines": items.len(),
            })),
        )
        .await?;

        txn.commit().await?;

        info!(%order_id, restored_lines = items.len(), "order cancelled, stock restored");

        let updated = order::Model {
            status: OrderStatus::Cancelled.to_string(),
            updated_at: Some(now),
            version: order.version + 1,
            ..order
        };
        Ok(OrderResponse {
            order: updated,
            items,
        })
    }

    /// Administrative bulk status change in one transaction with one
    /// summarizing audit entry. Moving into a rollback state performs the
    /// same per-order stock reversal as `cancel_order`; orders that are
    /// already terminal (or missing) are skipped and reported.
    #[instrument(skip(self, order_ids), fields(orders = order_ids.len(), new_status = %new_status))]
    pub async fn bulk_update_status(
        &self,
        actor: Option<Uuid>,
        order_ids: &[Uuid],
        new_status: OrderStatus,
    ) -> Result<BulkOrderStatusOutcome, ServiceError> {
        if order_ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "bulk status update requires at least one order id".to_string(),
            ));
        }

        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            match self.try_bulk_update(actor, order_ids, new_status).await {
                Err(ServiceError::ConcurrencyConflict { .. }) if attempts == 1 => {
                    warn!("bulk order update lost a version race, retrying once");
                    continue;
                }
                other => break other?,
            }
        };

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusBulkUpdated {
                new_status: new_status.to_string(),
                updated: outcome.updated.len(),
                skipped: outcome.skipped.len(),
            })
            .await
        {
            warn!(error = %e, "failed to send bulk order status event");
        }

        Ok(outcome)
    }

    async fn try_bulk_update(
        &self,
        actor: Option<Uuid>,
        order_ids: &[Uuid],
        new_status: OrderStatus,
    ) -> Result<BulkOrderStatusOutcome, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        let mut updated = Vec::new();
        let mut skipped = Vec::new();

        for &order_id in order_ids {
            let order = match Orders::find_by_id(order_id).one(&txn).await? {
                Some(order) => order,
                None => {
                    skipped.push(SkippedOrder {
                        order_id,
                        reason: ServiceError::not_found("order", order_id).to_string(),
                    });
                    continue;
                }
            };

            let current = parse_order_status(&order.status)?;
            if !current.can_transition_to(new_status) {
                skipped.push(SkippedOrder {
                    order_id,
                    reason: ServiceError::InvalidStateTransition {
                        kind: "order status",
                        from: current.to_string(),
                        to: new_status.to_string(),
                    }
                    .to_string(),
                });
                continue;
            }

            if new_status.reverses_stock() {
                let items = OrderItems::find()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .all(&txn)
                    .await?;
                for item in &items {
                    ledger::increment(&txn, item.variant_id, item.quantity).await?;
                }
            }

            write_order_status(&txn, &order, new_status, now).await?;
            updated.push(order_id);
        }

        // One summarizing entry for the whole bulk change.
        audit::record(
            &txn,
            actor,
            "order.bulk_status",
            "order",
            "bulk",
            Some(json!({
                "to": new_status.to_string(),
                "updated": updated,
                "skipped": skipped
                    .iter()
                    .map(|s| json!({ "order_id": s.order_id, "reason": s.reason }))
                    .collect::<Vec<_>>(),
            })),
        )
        .await?;

        txn.commit().await?;

        info!(
            updated = updated.len(),
            skipped = skipped.len(),
            "bulk order status update committed"
        );

        Ok(BulkOrderStatusOutcome { updated, skipped })
    }

    /// Fetches an order with its line items.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db;

        let order = Orders::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", order_id))?;

        let items = OrderItems::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await?;

        Ok(OrderResponse { order, items })
    }
}

/// Conditional status write keyed on the order's version.
async fn write_order_status<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
    new_status: OrderStatus,
    now: chrono::DateTime<Utc>,
) -> Result<(), ServiceError> {
    let result = Orders::update_many()
        .col_expr(order::Column::Status, Expr::value(new_status.to_string()))
        .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)))
        .col_expr(order::Column::Version, Expr::value(order.version + 1))
        .filter(order::Column::Id.eq(order.id))
        .filter(order::Column::Version.eq(order.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrencyConflict {
            entity: "order",
            id: order.id.to_string(),
        });
    }
    Ok(())
}

/// Cost basis snapshot: the net price on the most recently completed
/// import line for the variant, when any exists.
async fn latest_cost_basis<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
) -> Result<Option<Decimal>, ServiceError> {
    let row = import_batch_item::Entity::find()
        .filter(import_batch_item::Column::VariantId.eq(variant_id))
        .find_also_related(import_batch::Entity)
        .filter(import_batch::Column::ImportStatus.eq(ImportStatus::Completed.to_string()))
        .order_by_desc(import_batch::Column::CompletedAt)
        .one(conn)
        .await?;

    Ok(row.map(|(item, _)| item.net_price))
}

fn parse_order_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    raw.parse()
        .map_err(|_| ServiceError::InternalError(format!("unrecognized order status '{raw}'")))
}
