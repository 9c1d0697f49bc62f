use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::import_batch_item;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarrantyStatus {
    Active,
    Expired,
    /// The line item carries no warranty information.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarrantyAssessment {
    pub effective_expiry: Option<DateTime<Utc>>,
    pub status: WarrantyStatus,
    /// Whole days until expiry, rounded up; zero when expired or unknown.
    pub days_remaining: i64,
}

/// Derives warranty state for an import line item at `now`. An explicit
/// expiry on the item wins; otherwise the expiry is the owning batch's
/// completion instant plus the warranty period.
pub fn assess(
    item: &import_batch_item::Model,
    completed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> WarrantyAssessment {
    match effective_expiry(item, completed_at) {
        None => WarrantyAssessment {
            effective_expiry: None,
            status: WarrantyStatus::Unknown,
            days_remaining: 0,
        },
        Some(expiry) if expiry > now => WarrantyAssessment {
            effective_expiry: Some(expiry),
            status: WarrantyStatus::Active,
            days_remaining: days_until(expiry, now),
        },
        Some(expiry) => WarrantyAssessment {
            effective_expiry: Some(expiry),
            status: WarrantyStatus::Expired,
            days_remaining: 0,
        },
    }
}

fn effective_expiry(
    item: &import_batch_item::Model,
    completed_at: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    if let Some(explicit) = item.warranty_expiry {
        return Some(explicit);
    }
    match (item.warranty_period_days, completed_at) {
        (Some(days), Some(completed)) => Some(completed + Duration::days(days as i64)),
        _ => None,
    }
}

fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (expiry - now).num_seconds();
    if seconds <= 0 {
        return 0;
    }
    (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn item(
        warranty_period_days: Option<i32>,
        warranty_expiry: Option<DateTime<Utc>>,
    ) -> import_batch_item::Model {
        import_batch_item::Model {
            id: Uuid::new_v4(),
            import_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            inventory_id: None,
            quantity: 1,
            net_price: dec!(10.00),
            warranty_period_days,
            warranty_expiry,
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn period_days_derive_expiry_from_completion() {
        let completed = utc(2025, 1, 1);
        let now = utc(2025, 6, 1);

        let result = assess(&item(Some(365), None), Some(completed), now);

        assert_eq!(result.effective_expiry, Some(utc(2026, 1, 1)));
        assert_eq!(result.status, WarrantyStatus::Active);
        assert_eq!(result.days_remaining, 214);
    }

    #[test]
    fn explicit_expiry_wins_over_period() {
        let explicit = utc(2025, 3, 1);
        let result = assess(
            &item(Some(365), Some(explicit)),
            Some(utc(2025, 1, 1)),
            utc(2025, 2, 1),
        );

        assert_eq!(result.effective_expiry, Some(explicit));
        assert_eq!(result.days_remaining, 28);
    }

    #[test]
    fn no_warranty_data_is_unknown() {
        let result = assess(&item(None, None), Some(utc(2025, 1, 1)), utc(2025, 2, 1));

        assert_eq!(result.status, WarrantyStatus::Unknown);
        assert_eq!(result.effective_expiry, None);
        assert_eq!(result.days_remaining, 0);
    }

    #[test]
    fn period_without_completion_is_unknown() {
        let result = assess(&item(Some(90), None), None, utc(2025, 2, 1));
        assert_eq!(result.status, WarrantyStatus::Unknown);
    }

    #[test]
    fn past_expiry_is_expired_with_zero_days() {
        let result = assess(&item(Some(30), None), Some(utc(2025, 1, 1)), utc(2025, 6, 1));

        assert_eq!(result.status, WarrantyStatus::Expired);
        assert_eq!(result.days_remaining, 0);
    }

    #[test]
    fn expiry_exactly_now_counts_as_expired() {
        let completed = utc(2025, 1, 1);
        let result = assess(&item(Some(30), None), Some(completed), utc(2025, 1, 31));

        assert_eq!(result.status, WarrantyStatus::Expired);
    }

    #[test]
    fn partial_day_rounds_up() {
        let expiry = Utc.with_ymd_and_hms(2025, 1, 2, 6, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let result = assess(&item(None, Some(expiry)), None, now);

        assert_eq!(result.days_remaining, 2);
    }

    proptest! {
        #[test]
        fn days_remaining_is_consistent_with_status(
            period_days in proptest::option::of(1i32..5_000),
            completion_offset_secs in -200_000_000i64..200_000_000,
            now_offset_secs in -200_000_000i64..200_000_000,
        ) {
            let base = utc(2025, 1, 1);
            let completed = base + Duration::seconds(completion_offset_secs);
            let now = base + Duration::seconds(now_offset_secs);

            let result = assess(&item(period_days, None), Some(completed), now);

            prop_assert!(result.days_remaining >= 0);
            match result.status {
                WarrantyStatus::Active => {
                    prop_assert!(result.effective_expiry.unwrap() > now);
                    prop_assert!(result.days_remaining >= 1);
                }
                WarrantyStatus::Expired => {
                    prop_assert!(result.effective_expiry.unwrap() <= now);
                    prop_assert_eq!(result.days_remaining, 0);
                }
                WarrantyStatus::Unknown => {
                    prop_assert!(result.effective_expiry.is_none());
                    prop_assert_eq!(result.days_remaining, 0);
                }
            }
        }
    }
}
