use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, SqlErr,
    TransactionTrait,
};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::inventory_record::{self, Entity as InventoryRecords},
    errors::ServiceError,
    events::{Event, EventSender},
};

use super::audit;

/// Outcome of a single ledger write.
#[derive(Debug, Clone, Copy)]
pub struct LedgerChange {
    pub record_id: i64,
    pub old_quantity: i32,
    pub new_quantity: i32,
}

/// Returns the current quantity for a variant; a variant without a record
/// holds zero stock.
pub async fn quantity_of<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
) -> Result<i32, ServiceError> {
    let record = find_record(conn, variant_id).await?;
    Ok(record.map(|r| r.quantity).unwrap_or(0))
}

pub async fn find_record<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
) -> Result<Option<inventory_record::Model>, ServiceError> {
    InventoryRecords::find()
        .filter(inventory_record::Column::VariantId.eq(variant_id))
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Adds `amount` (> 0) to a variant's stock, creating the record on first
/// write. Runs inside the caller's transaction.
pub async fn increment<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    amount: i32,
) -> Result<LedgerChange, ServiceError> {
    if amount <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "increment amount must be positive, got {amount}"
        )));
    }

    match find_record(conn, variant_id).await? {
        Some(record) => {
            let new_quantity = record.quantity + amount;
            write_quantity(conn, &record, new_quantity).await?;
            Ok(LedgerChange {
                record_id: record.id,
                old_quantity: record.quantity,
                new_quantity,
            })
        }
        None => create_record(conn, variant_id, amount).await,
    }
}

/// Removes `amount` (> 0) from a variant's stock. Fails with
/// `InsufficientStock` when the variant cannot cover the request; the
/// caller decides whether that aborts a surrounding transaction.
pub async fn decrement<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    amount: i32,
) -> Result<LedgerChange, ServiceError> {
    if amount <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "decrement amount must be positive, got {amount}"
        )));
    }

    let record = find_record(conn, variant_id)
        .await?
        .ok_or(ServiceError::InsufficientStock {
            variant_id,
            available: 0,
            requested: amount,
        })?;

    if record.quantity < amount {
        return Err(ServiceError::InsufficientStock {
            variant_id,
            available: record.quantity,
            requested: amount,
        });
    }

    let new_quantity = record.quantity - amount;
    write_quantity(conn, &record, new_quantity).await?;
    Ok(LedgerChange {
        record_id: record.id,
        old_quantity: record.quantity,
        new_quantity,
    })
}

/// Applies a signed delta with the floor clamped to zero. Administrative
/// corrections only; order and import flows use `increment`/`decrement`
/// so shortfalls are never silently absorbed.
pub async fn adjust_clamped<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    delta: i32,
) -> Result<LedgerChange, ServiceError> {
    match find_record(conn, variant_id).await? {
        Some(record) => {
            let new_quantity = (record.quantity + delta).max(0);
            write_quantity(conn, &record, new_quantity).await?;
            Ok(LedgerChange {
                record_id: record.id,
                old_quantity: record.quantity,
                new_quantity,
            })
        }
        None => create_record(conn, variant_id, delta.max(0)).await,
    }
}

/// Sets a variant's quantity outright, clamping negative targets to
/// zero. Administrative corrections never fail on the floor.
pub async fn set_quantity<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    quantity: i32,
) -> Result<LedgerChange, ServiceError> {
    let quantity = quantity.max(0);

    match find_record(conn, variant_id).await? {
        Some(record) => {
            write_quantity(conn, &record, quantity).await?;
            Ok(LedgerChange {
                record_id: record.id,
                old_quantity: record.quantity,
                new_quantity: quantity,
            })
        }
        None => create_record(conn, variant_id, quantity).await,
    }
}

/// Conditional quantity write keyed on the record's version. Zero rows
/// affected means another transaction moved the record first; the caller
/// retries its whole operation.
async fn write_quantity<C: ConnectionTrait>(
    conn: &C,
    record: &inventory_record::Model,
    new_quantity: i32,
) -> Result<(), ServiceError> {
    let result = InventoryRecords::update_many()
        .col_expr(inventory_record::Column::Quantity, Expr::value(new_quantity))
        .col_expr(
            inventory_record::Column::Version,
            Expr::value(record.version + 1),
        )
        .col_expr(inventory_record::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory_record::Column::Id.eq(record.id))
        .filter(inventory_record::Column::Version.eq(record.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrencyConflict {
            entity: "inventory record",
            id: record.variant_id.to_string(),
        });
    }
    Ok(())
}

async fn create_record<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    quantity: i32,
) -> Result<LedgerChange, ServiceError> {
    let now = Utc::now();
    let record = inventory_record::ActiveModel {
        variant_id: Set(variant_id),
        quantity: Set(quantity),
        version: Set(1),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match record.insert(conn).await {
        Ok(created) => Ok(LedgerChange {
            record_id: created.id,
            old_quantity: 0,
            new_quantity: quantity,
        }),
        // A concurrent first write for the same variant beat us to the
        // unique slot; surface it as a conflict so the operation retries.
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Err(ServiceError::ConcurrencyConflict {
                entity: "inventory record",
                id: variant_id.to_string(),
            }),
            _ => Err(ServiceError::DatabaseError(err)),
        },
    }
}

/// How an administrative correction is expressed.
#[derive(Debug, Clone, Copy)]
pub enum InventoryAdjustment {
    /// Apply a signed delta, clamped at zero.
    Delta(i32),
    /// Replace the quantity outright; negative values are rejected.
    SetQuantity(i32),
}

/// Service wrapper for the standalone ledger operations the admin surface
/// uses. Order and import flows call the module-level functions inside
/// their own transactions instead.
#[derive(Clone)]
pub struct LedgerService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl LedgerService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn quantity_of(&self, variant_id: Uuid) -> Result<i32, ServiceError> {
        quantity_of(&*self.db, variant_id).await
    }

    /// Manual stock correction. Always clamped at zero and always
    /// audited, in one transaction.
    #[instrument(skip(self), fields(variant_id = %variant_id))]
    pub async fn adjust_inventory(
        &self,
        actor: Option<Uuid>,
        variant_id: Uuid,
        adjustment: InventoryAdjustment,
        reason: Option<String>,
    ) -> Result<LedgerChange, ServiceError> {
        let txn = self.db.begin().await?;

        let change = match adjustment {
            InventoryAdjustment::Delta(delta) => adjust_clamped(&txn, variant_id, delta).await?,
            InventoryAdjustment::SetQuantity(quantity) => {
                set_quantity(&txn, variant_id, quantity).await?
            }
        };

        audit::record(
            &txn,
            actor,
            "inventory.adjust",
            "inventory_record",
            variant_id,
            Some(json!({
                "old_quantity": change.old_quantity,
                "new_quantity": change.new_quantity,
                "reason": reason.as_deref(),
            })),
        )
        .await?;

        txn.commit().await?;

        info!(
            old_quantity = change.old_quantity,
            new_quantity = change.new_quantity,
            "inventory adjusted"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::InventoryAdjusted {
                variant_id,
                old_quantity: change.old_quantity,
                new_quantity: change.new_quantity,
                reason,
            })
            .await
        {
            warn!(error = %e, %variant_id, "failed to send inventory adjusted event");
        }

        Ok(change)
    }
}
