mod common;

use assert_matches::assert_matches;
use common::{import_line, TestApp};
use fulfillment_api::entities::audit_log;
use fulfillment_api::entities::import_batch::{ImportPaymentStatus, ImportStatus};
use fulfillment_api::errors::ServiceError;
use fulfillment_api::services::imports::CreateImportBatchRequest;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

#[tokio::test]
async fn create_batch_computes_total_from_lines() {
    let app = TestApp::new().await;
    let admin = Uuid::new_v4();

    let response = app
        .services()
        .imports
        .create_batch(
            admin,
            CreateImportBatchRequest {
                supplier_id: Uuid::new_v4(),
                reference: None,
                total_amount: None,
                items: vec![
                    import_line(Uuid::new_v4(), 3, dec!(10.50)),
                    import_line(Uuid::new_v4(), 2, dec!(4.25)),
                ],
            },
        )
        .await
        .unwrap();

    assert_eq!(response.batch.total_amount, dec!(40.00));
    assert_eq!(response.batch.import_status, "draft");
    assert_eq!(response.batch.payment_status, "pending");
    assert_eq!(response.items.len(), 2);
}

#[tokio::test]
async fn create_batch_honors_explicit_total() {
    let app = TestApp::new().await;

    let response = app
        .services()
        .imports
        .create_batch(
            Uuid::new_v4(),
            CreateImportBatchRequest {
                supplier_id: Uuid::new_v4(),
                reference: None,
                total_amount: Some(dec!(99.99)),
                items: vec![import_line(Uuid::new_v4(), 1, dec!(1.00))],
            },
        )
        .await
        .unwrap();

    assert_eq!(response.batch.total_amount, dec!(99.99));
}

#[tokio::test]
async fn create_batch_rejects_empty_and_non_positive_lines() {
    let app = TestApp::new().await;
    let admin = Uuid::new_v4();

    let empty = app
        .services()
        .imports
        .create_batch(
            admin,
            CreateImportBatchRequest {
                supplier_id: Uuid::new_v4(),
                reference: None,
                total_amount: None,
                items: vec![],
            },
        )
        .await;
    assert_matches!(empty, Err(ServiceError::ValidationError(_)));

    let zero_quantity = app
        .services()
        .imports
        .create_batch(
            admin,
            CreateImportBatchRequest {
                supplier_id: Uuid::new_v4(),
                reference: None,
                total_amount: None,
                items: vec![import_line(Uuid::new_v4(), 0, dec!(5.00))],
            },
        )
        .await;
    assert_matches!(zero_quantity, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn completing_a_batch_credits_every_line_once() {
    let app = TestApp::new().await;
    let admin = Uuid::new_v4();
    let variant_a = Uuid::new_v4();
    let variant_b = Uuid::new_v4();

    let batch_id = app
        .completed_batch(
            admin,
            vec![
                import_line(variant_a, 5, dec!(2.00)),
                import_line(variant_b, 3, dec!(7.00)),
            ],
        )
        .await;

    assert_eq!(app.services().ledger.quantity_of(variant_a).await.unwrap(), 5);
    assert_eq!(app.services().ledger.quantity_of(variant_b).await.unwrap(), 3);

    let response = app.services().imports.get_batch(batch_id).await.unwrap();
    assert_eq!(response.batch.import_status, "completed");
    assert!(response.batch.completed_at.is_some());
    for item in &response.items {
        assert!(item.inventory_id.is_some());
    }
}

#[tokio::test]
async fn recompleting_a_completed_batch_is_rejected() {
    let app = TestApp::new().await;
    let admin = Uuid::new_v4();
    let variant = Uuid::new_v4();

    let batch_id = app
        .completed_batch(admin, vec![import_line(variant, 4, dec!(1.00))])
        .await;

    let result = app
        .services()
        .imports
        .transition_import_status(Some(admin), batch_id, ImportStatus::Completed)
        .await;

    assert_matches!(
        result,
        Err(ServiceError::InvalidStateTransition { ref from, ref to, .. })
            if from == "completed" && to == "completed"
    );
    // No double credit.
    assert_eq!(app.services().ledger.quantity_of(variant).await.unwrap(), 4);
}

#[tokio::test]
async fn cancelling_a_pending_batch_never_touches_the_ledger() {
    let app = TestApp::new().await;
    let admin = Uuid::new_v4();
    let variant = Uuid::new_v4();

    let batch_id = app
        .draft_batch(admin, vec![import_line(variant, 9, dec!(3.00))])
        .await;
    app.services()
        .imports
        .transition_import_status(Some(admin), batch_id, ImportStatus::Pending)
        .await
        .unwrap();
    app.services()
        .imports
        .transition_import_status(Some(admin), batch_id, ImportStatus::Cancelled)
        .await
        .unwrap();

    assert_eq!(app.services().ledger.quantity_of(variant).await.unwrap(), 0);

    // Terminal: nothing moves out of cancelled.
    let reopen = app
        .services()
        .imports
        .transition_import_status(Some(admin), batch_id, ImportStatus::Pending)
        .await;
    assert_matches!(reopen, Err(ServiceError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn skipping_lifecycle_stages_is_rejected() {
    let app = TestApp::new().await;
    let admin = Uuid::new_v4();

    let batch_id = app
        .draft_batch(admin, vec![import_line(Uuid::new_v4(), 1, dec!(1.00))])
        .await;

    let result = app
        .services()
        .imports
        .transition_import_status(Some(admin), batch_id, ImportStatus::Completed)
        .await;

    assert_matches!(result, Err(ServiceError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn payment_status_moves_independently_of_delivery() {
    let app = TestApp::new().await;
    let admin = Uuid::new_v4();
    let variant = Uuid::new_v4();

    let batch_id = app
        .draft_batch(admin, vec![import_line(variant, 2, dec!(5.00))])
        .await;

    app.services()
        .imports
        .transition_payment_status(Some(admin), batch_id, ImportPaymentStatus::PartiallyPaid)
        .await
        .unwrap();
    app.services()
        .imports
        .transition_payment_status(Some(admin), batch_id, ImportPaymentStatus::Paid)
        .await
        .unwrap();

    // Paying never credits stock, and paid is terminal.
    assert_eq!(app.services().ledger.quantity_of(variant).await.unwrap(), 0);
    let out_of_paid = app
        .services()
        .imports
        .transition_payment_status(Some(admin), batch_id, ImportPaymentStatus::Cancelled)
        .await;
    assert_matches!(out_of_paid, Err(ServiceError::InvalidStateTransition { .. }));

    // Delivery lifecycle is unaffected by payment state.
    let response = app.services().imports.get_batch(batch_id).await.unwrap();
    assert_eq!(response.batch.import_status, "draft");
}

#[tokio::test]
async fn cancelled_batch_refuses_payment_changes() {
    let app = TestApp::new().await;
    let admin = Uuid::new_v4();

    let batch_id = app
        .draft_batch(admin, vec![import_line(Uuid::new_v4(), 1, dec!(1.00))])
        .await;
    app.services()
        .imports
        .transition_import_status(Some(admin), batch_id, ImportStatus::Cancelled)
        .await
        .unwrap();

    let result = app
        .services()
        .imports
        .transition_payment_status(Some(admin), batch_id, ImportPaymentStatus::Paid)
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn bulk_transition_reports_per_batch_outcomes() {
    let app = TestApp::new().await;
    let admin = Uuid::new_v4();

    let draft_a = app
        .draft_batch(admin, vec![import_line(Uuid::new_v4(), 1, dec!(1.00))])
        .await;
    let draft_b = app
        .draft_batch(admin, vec![import_line(Uuid::new_v4(), 2, dec!(2.00))])
        .await;
    let missing = Uuid::new_v4();

    let outcomes = app
        .services()
        .imports
        .bulk_transition(Some(admin), &[draft_a, draft_b, missing], ImportStatus::Pending)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].success);
    assert!(outcomes[1].success);
    assert!(!outcomes[2].success);
    assert!(outcomes[2].error.as_deref().unwrap().contains("not found"));

    // The two applied batches really moved.
    for id in [draft_a, draft_b] {
        let batch = app.services().imports.get_batch(id).await.unwrap().batch;
        assert_eq!(batch.import_status, "pending");
    }

    // One summarizing audit entry for the whole bulk change.
    let entries = audit_log::Entity::find()
        .filter(audit_log::Column::Action.eq("import_batch.bulk_status"))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn bulk_completion_credits_only_valid_batches() {
    let app = TestApp::new().await;
    let admin = Uuid::new_v4();
    let variant_ready = Uuid::new_v4();
    let variant_draft = Uuid::new_v4();

    let ready = app
        .draft_batch(admin, vec![import_line(variant_ready, 6, dec!(1.00))])
        .await;
    for status in [ImportStatus::Pending, ImportStatus::Processing] {
        app.services()
            .imports
            .transition_import_status(Some(admin), ready, status)
            .await
            .unwrap();
    }
    let still_draft = app
        .draft_batch(admin, vec![import_line(variant_draft, 6, dec!(1.00))])
        .await;

    let outcomes = app
        .services()
        .imports
        .bulk_transition(Some(admin), &[ready, still_draft], ImportStatus::Completed)
        .await
        .unwrap();

    assert!(outcomes[0].success);
    assert!(!outcomes[1].success);
    assert_eq!(
        app.services().ledger.quantity_of(variant_ready).await.unwrap(),
        6
    );
    assert_eq!(
        app.services().ledger.quantity_of(variant_draft).await.unwrap(),
        0
    );
}
