use std::sync::Arc;

use chrono::{DateTime, Utc};
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
    entities::import_batch::{self, Entity as ImportBatches, ImportPaymentStatus, ImportStatus},
    entities::import_batch_item::{self, Entity as ImportBatchItems},
    errors::ServiceError,
    events::{Event, EventSender},
};

use super::{audit, ledger};

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportBatchLineRequest {
    pub variant_id: Uuid,
    pub quantity: i32,
    pub net_price: Decimal,
    pub warranty_period_days: Option<i32>,
    pub warranty_expiry: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateImportBatchRequest {
    pub supplier_id: Uuid,
    pub reference: Option<String>,
    /// Overrides the computed sum of net_price * quantity when provided.
    pub total_amount: Option<Decimal>,
    #[validate(length(min = 1, message = "An import batch requires at least one line item"))]
    pub items: Vec<ImportBatchLineRequest>,
}

#[derive(Debug, Serialize)]
pub struct ImportBatchResponse {
    pub batch: import_batch::Model,
    pub items: Vec<import_batch_item::Model>,
}

#[derive(Debug, Serialize)]
pub struct BatchTransitionOutcome {
    pub batch_id: Uuid,
    pub success: bool,
    /// Status the batch held before a successful transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Supplier import lifecycle. The transition into `Completed` is the only
/// path that credits the inventory ledger, and it does so atomically with
/// the status flip.
#[derive(Clone)]
pub struct ImportService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl ImportService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Persists a new batch in `Draft`. Never touches the ledger.
    #[instrument(skip(self, request), fields(supplier_id = %request.supplier_id, lines = request.items.len()))]
    pub async fn create_batch(
        &self,
        user_id: Uuid,
        request: CreateImportBatchRequest,
    ) -> Result<ImportBatchResponse, ServiceError> {
        request.validate()?;
        for line in &request.items {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "line for variant {} must have a positive quantity, got {}",
                    line.variant_id, line.quantity
                )));
            }
            if line.net_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "line for variant {} must not have a negative net price",
                    line.variant_id
                )));
            }
            if matches!(line.warranty_period_days, Some(days) if days <= 0) {
                return Err(ServiceError::ValidationError(format!(
                    "line for variant {} must have a positive warranty period",
                    line.variant_id
                )));
            }
        }

        let total_amount = request.total_amount.unwrap_or_else(|| {
            request
                .items
                .iter()
                .map(|line| line.net_price * Decimal::from(line.quantity))
                .sum()
        });

        let batch_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.db.begin().await?;

        let batch = import_batch::ActiveModel {
            id: Set(batch_id),
            supplier_id: Set(request.supplier_id),
            user_id: Set(user_id),
            reference: Set(request.reference.clone()),
            total_amount: Set(total_amount),
            import_status: Set(ImportStatus::Draft.to_string()),
            payment_status: Set(ImportPaymentStatus::Pending.to_string()),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let item = import_batch_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                import_id: Set(batch_id),
                variant_id: Set(line.variant_id),
                inventory_id: Set(None),
                quantity: Set(line.quantity),
                net_price: Set(line.net_price),
                warranty_period_days: Set(line.warranty_period_days),
                warranty_expiry: Set(line.warranty_expiry),
                notes: Set(line.notes.clone()),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        audit::record(
            &txn,
            Some(user_id),
            "import_batch.create",
            "import_batch",
            batch_id,
            Some(json!({
                "supplier_id": request.supplier_id,
                "lines": items.len(),
                "total_amount": total_amount,
            })),
        )
        .await?;

        txn.commit().await?;

        info!(%batch_id, total = %total_amount, "import batch created");

        if let Err(e) = self
            .event_sender
            .send(Event::ImportBatchCreated {
                batch_id,
                supplier_id: request.supplier_id,
                line_count: items.len(),
            })
            .await
        {
            warn!(error = %e, %batch_id, "failed to send import batch created event");
        }

        Ok(ImportBatchResponse { batch, items })
    }

    /// Fetches a batch with its line items.
    #[instrument(skip(self))]
    pub async fn get_batch(&self, batch_id: Uuid) -> Result<ImportBatchResponse, ServiceError> {
        let db = &*self.db;

        let batch = ImportBatches::find_by_id(batch_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("import batch", batch_id))?;

        let items = ImportBatchItems::find()
            .filter(import_batch_item::Column::ImportId.eq(batch_id))
            .order_by_asc(import_batch_item::Column::CreatedAt)
            .all(db)
            .await?;

        Ok(ImportBatchResponse { batch, items })
    }

    /// Moves a batch along the delivery lifecycle. Entering `Completed`
    /// credits every line's variant and back-fills the denormalized
    /// inventory link, all in one transaction with the status flip.
    #[instrument(skip(self), fields(batch_id = %batch_id, new_status = %new_status))]
    pub async fn transition_import_status(
        &self,
        actor: Option<Uuid>,
        batch_id: Uuid,
        new_status: ImportStatus,
    ) -> Result<import_batch::Model, ServiceError> {
        let mut attempts = 0;
        let updated = loop {
            attempts += 1;
            match self.try_transition(actor, batch_id, new_status).await {
                Err(ServiceError::ConcurrencyConflict { .. }) if attempts == 1 => {
                    warn!(%batch_id, "import transition lost a version race, retrying once");
                    continue;
                }
                other => break other?,
            }
        };

        if let Err(e) = self
            .event_sender
            .send(Event::ImportStatusChanged {
                batch_id,
                old_status: updated.0,
                new_status: new_status.to_string(),
            })
            .await
        {
            warn!(error = %e, %batch_id, "failed to send import status event");
        }
        if new_status == ImportStatus::Completed {
            if let Err(e) = self
                .event_sender
                .send(Event::ImportCompleted {
                    batch_id,
                    line_count: updated.2,
                })
                .await
            {
                warn!(error = %e, %batch_id, "failed to send import completed event");
            }
        }

        Ok(updated.1)
    }

    async fn try_transition(
        &self,
        actor: Option<Uuid>,
        batch_id: Uuid,
        new_status: ImportStatus,
    ) -> Result<(String, import_batch::Model, usize), ServiceError> {
        let txn = self.db.begin().await?;

        let batch = ImportBatches::find_by_id(batch_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("import batch", batch_id))?;

        let current = parse_import_status(&batch.import_status)?;
        if !current.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStateTransition {
                kind: "import status",
                from: current.to_string(),
                to: new_status.to_string(),
            });
        }

        let now = Utc::now();
        let credited_lines = apply_import_transition(&txn, &batch, new_status, now).await?;

        audit::record(
            &txn,
            actor,
            "import_batch.status",
            "import_batch",
            batch_id,
            Some(json!({
                "from": current.to_string(),
                "to": new_status.to_string(),
                "credited_lines": credited_lines,
            })),
        )
        .await?;

        txn.commit().await?;

        info!(from = %current, to = %new_status, credited_lines, "import batch transitioned");

        let updated = import_batch::Model {
            import_status: new_status.to_string(),
            completed_at: if new_status == ImportStatus::Completed {
                Some(now)
            } else {
                batch.completed_at
            },
            updated_at: Some(now),
            version: batch.version + 1,
            ..batch
        };
        Ok((current.to_string(), updated, credited_lines))
    }

    /// Applies one validated transition to every batch in the list. Each
    /// batch is evaluated independently; invalid batches contribute an
    /// error outcome and no writes. All applied changes plus one
    /// summarizing audit entry commit atomically.
    #[instrument(skip(self, batch_ids), fields(batches = batch_ids.len(), new_status = %new_status))]
    pub async fn bulk_transition(
        &self,
        actor: Option<Uuid>,
        batch_ids: &[Uuid],
        new_status: ImportStatus,
    ) -> Result<Vec<BatchTransitionOutcome>, ServiceError> {
        if batch_ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "bulk transition requires at least one batch id".to_string(),
            ));
        }

        let mut attempts = 0;
        let outcomes = loop {
            attempts += 1;
            match self.try_bulk_transition(actor, batch_ids, new_status).await {
                Err(ServiceError::ConcurrencyConflict { .. }) if attempts == 1 => {
                    warn!("bulk import transition lost a version race, retrying once");
                    continue;
                }
                other => break other?,
            }
        };

        for outcome in outcomes.iter().filter(|o| o.success) {
            if let Err(e) = self
                .event_sender
                .send(Event::ImportStatusChanged {
                    batch_id: outcome.batch_id,
                    old_status: outcome.from.clone().unwrap_or_default(),
                    new_status: new_status.to_string(),
                })
                .await
            {
                warn!(error = %e, batch_id = %outcome.batch_id, "failed to send import status event");
            }
        }

        Ok(outcomes)
    }

    async fn try_bulk_transition(
        &self,
        actor: Option<Uuid>,
        batch_ids: &[Uuid],
        new_status: ImportStatus,
    ) -> Result<Vec<BatchTransitionOutcome>, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        let mut outcomes = Vec::with_capacity(batch_ids.len());
        let mut applied = Vec::new();

        for &batch_id in batch_ids {
            let batch = match ImportBatches::find_by_id(batch_id).one(&txn).await? {
                Some(batch) => batch,
                None => {
                    outcomes.push(BatchTransitionOutcome {
                        batch_id,
                        success: false,
                        from: None,
                        error: Some(
                            ServiceError::not_found("import batch", batch_id).to_string(),
                        ),
                    });
                    continue;
                }
            };

            let current = parse_import_status(&batch.import_status)?;
            if !current.can_transition_to(new_status) {
                outcomes.push(BatchTransitionOutcome {
                    batch_id,
                    success: false,
                    from: Some(current.to_string()),
                    error: Some(
                        ServiceError::InvalidStateTransition {
                            kind: "import status",
                            from: current.to_string(),
                            to: new_status.to_string(),
                        }
                        .to_string(),
                    ),
                });
                continue;
            }

            apply_import_transition(&txn, &batch, new_status, now).await?;
            applied.push(batch_id);
            outcomes.push(BatchTransitionOutcome {
                batch_id,
                success: true,
                from: Some(current.to_string()),
                error: None,
            });
        }

        // One summarizing entry for the whole bulk change, not one per batch.
        audit::record(
            &txn,
            actor,
            "import_batch.bulk_status",
            "import_batch",
            "bulk",
            Some(json!({
                "to": new_status.to_string(),
                "applied": applied,
                "rejected": outcomes
                    .iter()
                    .filter(|o| !o.success)
                    .map(|o| json!({ "batch_id": o.batch_id, "error": o.error }))
                    .collect::<Vec<_>>(),
            })),
        )
        .await?;

        txn.commit().await?;

        info!(
            applied = applied.len(),
            rejected = outcomes.len() - applied.len(),
            "bulk import transition committed"
        );

        Ok(outcomes)
    }

    /// Payment lifecycle, independent of delivery. Never touches the
    /// ledger. Rejected once paid in full or once the batch is cancelled.
    #[instrument(skip(self), fields(batch_id = %batch_id, new_status = %new_status))]
    pub async fn transition_payment_status(
        &self,
        actor: Option<Uuid>,
        batch_id: Uuid,
        new_status: ImportPaymentStatus,
    ) -> Result<import_batch::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let batch = ImportBatches::find_by_id(batch_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("import batch", batch_id))?;

        let import_status = parse_import_status(&batch.import_status)?;
        if import_status == ImportStatus::Cancelled {
            return Err(ServiceError::ValidationError(format!(
                "payment status of cancelled batch {batch_id} cannot change"
            )));
        }

        let current = parse_payment_status(&batch.payment_status)?;
        if !current.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStateTransition {
                kind: "payment status",
                from: current.to_string(),
                to: new_status.to_string(),
            });
        }

        let now = Utc::now();
        let result = ImportBatches::update_many()
            .col_expr(
                import_batch::Column::PaymentStatus,
                Expr::value(new_status.to_string()),
            )
            .col_expr(import_batch::Column::UpdatedAt, Expr::value(Some(now)))
            .col_expr(import_batch::Column::Version, Expr::value(batch.version + 1))
            .filter(import_batch::Column::Id.eq(batch_id))
            .filter(import_batch::Column::Version.eq(batch.version))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrencyConflict {
                entity: "import batch",
                id: batch_id.to_string(),
            });
        }

        audit::record(
            &txn,
            actor,
            "import_batch.payment_status",
            "import_batch",
            batch_id,
            Some(json!({
                "from": current.to_string(),
                "to": new_status.to_string(),
            })),
        )
        .await?;

        txn.commit().await?;

        if let Err(e) = self
            .event_sender
            .send(Event::ImportPaymentStatusChanged {
                batch_id,
                old_status: current.to_string(),
                new_status: new_status.to_string(),
            })
            .await
        {
            warn!(error = %e, %batch_id, "failed to send payment status event");
        }

        Ok(import_batch::Model {
            payment_status: new_status.to_string(),
            updated_at: Some(now),
            version: batch.version + 1,
            ..batch
        })
    }
}

/// Writes one validated status change. Entering `Completed` credits every
/// line's variant on the ledger and back-fills `inventory_id`; the
/// conditional version update keeps a racing transition from completing
/// the same batch twice. Returns the number of credited lines.
async fn apply_import_transition<C: ConnectionTrait>(
    conn: &C,
    batch: &import_batch::Model,
    new_status: ImportStatus,
    now: DateTime<Utc>,
) -> Result<usize, ServiceError> {
    let mut credited_lines = 0;

    if new_status == ImportStatus::Completed {
        let items = ImportBatchItems::find()
            .filter(import_batch_item::Column::ImportId.eq(batch.id))
            .all(conn)
            .await?;

        for item in items {
            let change = ledger::increment(conn, item.variant_id, item.quantity).await?;
            let mut active: import_batch_item::ActiveModel = item.into();
            active.inventory_id = Set(Some(change.record_id));
            active.update(conn).await?;
            credited_lines += 1;
        }
    }

    let mut update = ImportBatches::update_many()
        .col_expr(
            import_batch::Column::ImportStatus,
            Expr::value(new_status.to_string()),
        )
        .col_expr(import_batch::Column::UpdatedAt, Expr::value(Some(now)))
        .col_expr(import_batch::Column::Version, Expr::value(batch.version + 1))
        .filter(import_batch::Column::Id.eq(batch.id))
        .filter(import_batch::Column::Version.eq(batch.version));
    if new_status == ImportStatus::Completed {
        update = update.col_expr(import_batch::Column::CompletedAt, Expr::value(Some(now)));
    }

    let result = update.exec(conn).await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrencyConflict {
            entity: "import batch",
            id: batch.id.to_string(),
        });
    }

    Ok(credited_lines)
}

fn parse_import_status(raw: &str) -> Result<ImportStatus, ServiceError> {
    raw.parse()
        .map_err(|_| ServiceError::InternalError(format!("unrecognized import status '{raw}'")))
}

fn parse_payment_status(raw: &str) -> Result<ImportPaymentStatus, ServiceError> {
    raw.parse()
        .map_err(|_| ServiceError::InternalError(format!("unrecognized payment status '{raw}'")))
}
