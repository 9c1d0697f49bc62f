use std::sync::Arc;

use crate::{
    db::DbPool,
    events::EventSender,
    services::{
        exposure::ExposureService, fulfillment::FulfillmentService, imports::ImportService,
        ledger::LedgerService,
    },
};

pub mod identity;
pub mod imports;
pub mod inventory;
pub mod orders;
pub mod reports;

/// Aggregated services used by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub ledger: LedgerService,
    pub imports: ImportService,
    pub fulfillment: FulfillmentService,
    pub exposure: ExposureService,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, low_stock_threshold: i32) -> Self {
        Self {
            ledger: LedgerService::new(db.clone(), event_sender.clone()),
            imports: ImportService::new(db.clone(), event_sender.clone()),
            fulfillment: FulfillmentService::new(db.clone(), event_sender),
            exposure: ExposureService::new(db, low_stock_threshold),
        }
    }
}
