use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Handle for publishing events onto the in-process channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Events emitted after a mutation commits. These are observability
/// signals; the audit log written inside the transaction is the durable
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        user_id: Uuid,
        total: Decimal,
        line_count: usize,
    },
    OrderCancelled {
        order_id: Uuid,
    },
    OrderStatusBulkUpdated {
        new_status: String,
        updated: usize,
        skipped: usize,
    },
    ImportBatchCreated {
        batch_id: Uuid,
        supplier_id: Uuid,
        line_count: usize,
    },
    ImportStatusChanged {
        batch_id: Uuid,
        old_status: String,
        new_status: String,
    },
    ImportCompleted {
        batch_id: Uuid,
        line_count: usize,
    },
    ImportPaymentStatusChanged {
        batch_id: Uuid,
        old_status: String,
        new_status: String,
    },
    InventoryAdjusted {
        variant_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
        reason: Option<String>,
    },
}

/// Consumes events from the channel and logs them. Runs until every
/// sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPlaced {
                order_id,
                user_id,
                total,
                line_count,
            } => {
                info!(%order_id, %user_id, %total, line_count, "order placed");
            }
            Event::OrderCancelled { order_id } => {
                info!(%order_id, "order cancelled");
            }
            Event::OrderStatusBulkUpdated {
                new_status,
                updated,
                skipped,
            } => {
                info!(%new_status, updated, skipped, "bulk order status update");
            }
            Event::ImportBatchCreated {
                batch_id,
                supplier_id,
                line_count,
            } => {
                info!(%batch_id, %supplier_id, line_count, "import batch created");
            }
            Event::ImportStatusChanged {
                batch_id,
                old_status,
                new_status,
            } => {
                info!(%batch_id, %old_status, %new_status, "import status changed");
            }
            Event::ImportCompleted {
                batch_id,
                line_count,
            } => {
                info!(%batch_id, line_count, "import completed, stock credited");
            }
            Event::ImportPaymentStatusChanged {
                batch_id,
                old_status,
                new_status,
            } => {
                info!(%batch_id, %old_status, %new_status, "import payment status changed");
            }
            Event::InventoryAdjusted {
                variant_id,
                old_quantity,
                new_quantity,
                reason,
            } => {
                info!(%variant_id, old_quantity, new_quantity, ?reason, "inventory adjusted");
            }
        }
    }

    info!("Event channel closed; stopping event processing loop");
}
