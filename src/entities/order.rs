use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub total: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Customer order lifecycle. Orders are created in `Processing` because
/// stock is consumed at placement; `Cancelled` and `Refunded` are the
/// rollback states whose entry reverses the ledger effect.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Processing,
    Confirmed,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded)
    }

    /// Entering this state undoes the stock consumption of placement.
    pub fn reverses_stock(self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Processing => 0,
            Self::Confirmed => 1,
            Self::Delivered => 2,
            Self::Cancelled | Self::Refunded => u8::MAX,
        }
    }

    /// Forward moves along the lifecycle, plus rollback into cancelled or
    /// refunded from any non-terminal state.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next.reverses_stock() {
            return true;
        }
        next.rank() > self.rank()
    }
}
