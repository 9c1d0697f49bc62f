use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use strum::Display;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::import_batch::{self, ImportStatus},
    entities::import_batch_item::{self, Entity as ImportBatchItems},
    errors::ServiceError,
};

use super::ledger;
use super::warranty::{self, WarrantyAssessment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum StockClassification {
    #[strum(serialize = "Out of Stock")]
    #[serde(rename = "Out of Stock")]
    OutOfStock,
    #[strum(serialize = "Low Stock")]
    #[serde(rename = "Low Stock")]
    LowStock,
    #[strum(serialize = "In Stock")]
    #[serde(rename = "In Stock")]
    InStock,
}

/// Classifies a quantity against a low-stock threshold.
pub fn classify(quantity: i32, low_stock_threshold: i32) -> StockClassification {
    if quantity == 0 {
        StockClassification::OutOfStock
    } else if quantity < low_stock_threshold {
        StockClassification::LowStock
    } else {
        StockClassification::InStock
    }
}

/// An import line whose batch is still in flight: admins see stock that
/// is expected but not yet credited to the ledger.
#[derive(Debug, Serialize)]
pub struct PendingImport {
    pub batch_id: Uuid,
    pub supplier_id: Uuid,
    pub reference: Option<String>,
    pub import_status: String,
    pub quantity: i32,
    pub net_price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// One completed import line in a variant's purchase history, annotated
/// for audit and customer-support views.
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub batch_id: Uuid,
    pub supplier_id: Uuid,
    pub imported_by: Uuid,
    pub reference: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub quantity: i32,
    pub net_price: Decimal,
    pub warranty_period_days: Option<i32>,
    pub warranty_expiry: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Read-only queries over ledger state plus import batch history. Runs
/// with the store's default read consistency; never writes.
#[derive(Clone)]
pub struct ExposureService {
    db: Arc<DbPool>,
    low_stock_threshold: i32,
}

impl ExposureService {
    pub fn new(db: Arc<DbPool>, low_stock_threshold: i32) -> Self {
        Self {
            db,
            low_stock_threshold,
        }
    }

    #[instrument(skip(self))]
    pub async fn classify_stock(&self, variant_id: Uuid) -> Result<StockClassification, ServiceError> {
        let quantity = ledger::quantity_of(&*self.db, variant_id).await?;
        Ok(classify(quantity, self.low_stock_threshold))
    }

    /// Lines of batches still in flight (pending or processing) for the
    /// variant, oldest batch first.
    #[instrument(skip(self))]
    pub async fn pending_imports_for_variant(
        &self,
        variant_id: Uuid,
    ) -> Result<Vec<PendingImport>, ServiceError> {
        let rows = ImportBatchItems::find()
            .filter(import_batch_item::Column::VariantId.eq(variant_id))
            .find_also_related(import_batch::Entity)
            .filter(
                import_batch::Column::ImportStatus.is_in([
                    ImportStatus::Pending.to_string(),
                    ImportStatus::Processing.to_string(),
                ]),
            )
            .order_by_asc(import_batch::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(item, batch)| {
                let batch = batch?;
                Some(PendingImport {
                    batch_id: batch.id,
                    supplier_id: batch.supplier_id,
                    reference: batch.reference,
                    import_status: batch.import_status,
                    quantity: item.quantity,
                    net_price: item.net_price,
                    created_at: batch.created_at,
                })
            })
            .collect())
    }

    /// Warranty state for the variant at `now`. The most recently
    /// completed batch's line is authoritative; warranty is not
    /// cumulative across purchases. `None` means the variant has no
    /// completed import history.
    #[instrument(skip(self))]
    pub async fn warranty_for_variant(
        &self,
        variant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<WarrantyAssessment>, ServiceError> {
        let row = ImportBatchItems::find()
            .filter(import_batch_item::Column::VariantId.eq(variant_id))
            .find_also_related(import_batch::Entity)
            .filter(import_batch::Column::ImportStatus.eq(ImportStatus::Completed.to_string()))
            .order_by_desc(import_batch::Column::CompletedAt)
            .one(&*self.db)
            .await?;

        Ok(row.map(|(item, batch)| {
            let completed_at = batch.and_then(|b| b.completed_at);
            warranty::assess(&item, completed_at, now)
        }))
    }

    /// Chronological list of completed import lines affecting the
    /// variant.
    #[instrument(skip(self))]
    pub async fn history_for_variant(
        &self,
        variant_id: Uuid,
    ) -> Result<Vec<HistoryEntry>, ServiceError> {
        let rows = ImportBatchItems::find()
            .filter(import_batch_item::Column::VariantId.eq(variant_id))
            .find_also_related(import_batch::Entity)
            .filter(import_batch::Column::ImportStatus.eq(ImportStatus::Completed.to_string()))
            .order_by_asc(import_batch::Column::CompletedAt)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(item, batch)| {
                let batch = batch?;
                Some(HistoryEntry {
                    batch_id: batch.id,
                    supplier_id: batch.supplier_id,
                    imported_by: batch.user_id,
                    reference: batch.reference,
                    completed_at: batch.completed_at,
                    quantity: item.quantity,
                    net_price: item.net_price,
                    warranty_period_days: item.warranty_period_days,
                    warranty_expiry: item.warranty_expiry,
                    notes: item.notes,
                })
            })
            .collect())
    }
}
