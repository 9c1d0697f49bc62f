use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "import_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub user_id: Uuid,
    pub reference: Option<String>,
    pub total_amount: Decimal,
    pub import_status: String,
    pub payment_status: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::import_batch_item::Entity")]
    ImportBatchItem,
}

impl Related<super::import_batch_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ImportBatchItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Delivery lifecycle of a supplier import. Entering `Completed` is the
/// only transition that writes to the inventory ledger.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Draft,
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl ImportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// draft -> pending -> processing -> completed, with cancelled
    /// reachable from every non-terminal state.
    pub fn can_transition_to(self, next: ImportStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Pending)
                | (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Draft, Self::Cancelled)
                | (Self::Pending, Self::Cancelled)
                | (Self::Processing, Self::Cancelled)
        )
    }
}

/// Payment side of an import batch. Independent of the delivery lifecycle
/// and never gates ledger effects.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ImportPaymentStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl ImportPaymentStatus {
    pub fn can_transition_to(self, next: ImportPaymentStatus) -> bool {
        match (self, next) {
            (Self::Paid, _) | (Self::Cancelled, _) => false,
            (Self::Pending, Self::PartiallyPaid | Self::Paid | Self::Cancelled) => true,
            (Self::PartiallyPaid, Self::Paid | Self::Cancelled) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_status_happy_path() {
        assert!(ImportStatus::Draft.can_transition_to(ImportStatus::Pending));
        assert!(ImportStatus::Pending.can_transition_to(ImportStatus::Processing));
        assert!(ImportStatus::Processing.can_transition_to(ImportStatus::Completed));
    }

    #[test]
    fn import_status_cancel_from_non_terminal_only() {
        assert!(ImportStatus::Draft.can_transition_to(ImportStatus::Cancelled));
        assert!(ImportStatus::Pending.can_transition_to(ImportStatus::Cancelled));
        assert!(ImportStatus::Processing.can_transition_to(ImportStatus::Cancelled));
        assert!(!ImportStatus::Completed.can_transition_to(ImportStatus::Cancelled));
        assert!(!ImportStatus::Cancelled.can_transition_to(ImportStatus::Cancelled));
    }

    #[test]
    fn import_status_no_skipping_or_reopening() {
        assert!(!ImportStatus::Draft.can_transition_to(ImportStatus::Completed));
        assert!(!ImportStatus::Pending.can_transition_to(ImportStatus::Completed));
        assert!(!ImportStatus::Completed.can_transition_to(ImportStatus::Processing));
        assert!(!ImportStatus::Cancelled.can_transition_to(ImportStatus::Pending));
    }

    #[test]
    fn payment_status_terminal_states() {
        assert!(ImportPaymentStatus::Pending.can_transition_to(ImportPaymentStatus::Paid));
        assert!(ImportPaymentStatus::Pending.can_transition_to(ImportPaymentStatus::PartiallyPaid));
        assert!(ImportPaymentStatus::PartiallyPaid.can_transition_to(ImportPaymentStatus::Paid));
        assert!(!ImportPaymentStatus::Paid.can_transition_to(ImportPaymentStatus::Cancelled));
        assert!(!ImportPaymentStatus::Cancelled.can_transition_to(ImportPaymentStatus::Pending));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ImportStatus::Draft,
            ImportStatus::Pending,
            ImportStatus::Processing,
            ImportStatus::Completed,
            ImportStatus::Cancelled,
        ] {
            let raw = status.to_string();
            assert_eq!(raw.parse::<ImportStatus>().unwrap(), status);
        }
        assert_eq!(ImportPaymentStatus::PartiallyPaid.to_string(), "partially_paid");
    }
}
