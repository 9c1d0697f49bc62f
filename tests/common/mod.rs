#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use fulfillment_api::{
    config::AppConfig,
    db,
    entities::import_batch::ImportStatus,
    events::{self, EventSender},
    handlers::AppServices,
    services::imports::{CreateImportBatchRequest, ImportBatchLineRequest},
    services::ledger::InventoryAdjustment,
    AppState,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Helper harness for spinning up an application state backed by a fresh
/// on-disk SQLite database. A single-connection pool keeps every test
/// deterministic while still exercising real transactions.
pub struct TestApp {
    pub state: AppState,
    db_path: PathBuf,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_path =
            std::env::temp_dir().join(format!("fulfillment_test_{}.db", Uuid::new_v4()));

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            cfg.low_stock_threshold,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        Self {
            state,
            db_path,
            _event_task: event_task,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Seeds stock for a variant through the administrative adjustment
    /// path.
    pub async fn seed_stock(&self, variant_id: Uuid, quantity: i32) {
        self.services()
            .ledger
            .adjust_inventory(
                None,
                variant_id,
                InventoryAdjustment::SetQuantity(quantity),
                Some("seed".to_string()),
            )
            .await
            .expect("seed adjust");
    }

    /// Creates a batch and walks it to `Completed`, crediting the ledger.
    pub async fn completed_batch(
        &self,
        admin_id: Uuid,
        lines: Vec<ImportBatchLineRequest>,
    ) -> Uuid {
        let batch_id = self.draft_batch(admin_id, lines).await;
        for status in [
            ImportStatus::Pending,
            ImportStatus::Processing,
            ImportStatus::Completed,
        ] {
            self.services()
                .imports
                .transition_import_status(Some(admin_id), batch_id, status)
                .await
                .expect("batch transition");
        }
        batch_id
    }

    /// Creates a batch and leaves it in `Draft`.
    pub async fn draft_batch(&self, admin_id: Uuid, lines: Vec<ImportBatchLineRequest>) -> Uuid {
        let response = self
            .services()
            .imports
            .create_batch(
                admin_id,
                CreateImportBatchRequest {
                    supplier_id: Uuid::new_v4(),
                    reference: Some("TEST-REF".to_string()),
                    total_amount: None,
                    items: lines,
                },
            )
            .await
            .expect("create batch");
        response.batch.id
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        // SQLite leaves -wal/-shm files alongside the database file.
        let _ = std::fs::remove_file(&self.db_path);
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = self.db_path.clone().into_os_string();
            sidecar.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(sidecar));
        }
    }
}

pub fn import_line(variant_id: Uuid, quantity: i32, net_price: Decimal) -> ImportBatchLineRequest {
    ImportBatchLineRequest {
        variant_id,
        quantity,
        net_price,
        warranty_period_days: None,
        warranty_expiry: None,
        notes: None,
    }
}

pub fn warranty_line(
    variant_id: Uuid,
    quantity: i32,
    net_price: Decimal,
    warranty_period_days: i32,
) -> ImportBatchLineRequest {
    ImportBatchLineRequest {
        variant_id,
        quantity,
        net_price,
        warranty_period_days: Some(warranty_period_days),
        warranty_expiry: None,
        notes: None,
    }
}
