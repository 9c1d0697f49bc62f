use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A line within a supplier import. Immutable once the owning batch
/// reaches `completed`; `inventory_id` is back-filled by the completing
/// transaction once the inventory record is guaranteed to exist.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "import_batch_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub import_id: Uuid,
    pub variant_id: Uuid,
    pub inventory_id: Option<i64>,
    pub quantity: i32,
    pub net_price: Decimal,
    pub warranty_period_days: Option<i32>,
    pub warranty_expiry: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::import_batch::Entity",
        from = "Column::ImportId",
        to = "super::import_batch::Column::Id"
    )]
    ImportBatch,
}

impl Related<super::import_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ImportBatch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
