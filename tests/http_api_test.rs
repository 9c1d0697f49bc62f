mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use common::TestApp;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn router(app: &TestApp) -> Router {
    fulfillment_api::app_router(app.state.clone())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, user: Option<(Uuid, &str)>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some((id, role)) = user {
        builder = builder.header("x-user-id", id.to_string()).header("x-user-role", role);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_database_state() {
    let app = TestApp::new().await;

    let response = router(&app)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn import_creation_requires_an_identified_admin() {
    let app = TestApp::new().await;
    let payload = json!({
        "supplier_id": Uuid::new_v4(),
        "items": [{ "variant_id": Uuid::new_v4(), "quantity": 1, "net_price": "2.00" }],
    });

    let anonymous = router(&app)
        .oneshot(post_json("/imports", None, payload.clone()))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let customer = router(&app)
        .oneshot(post_json(
            "/imports",
            Some((Uuid::new_v4(), "customer")),
            payload.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(customer.status(), StatusCode::FORBIDDEN);

    let admin = router(&app)
        .oneshot(post_json("/imports", Some((Uuid::new_v4(), "admin")), payload))
        .await
        .unwrap();
    assert_eq!(admin.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn placing_an_order_over_http_reports_shortfalls_verbatim() {
    let app = TestApp::new().await;
    let variant = Uuid::new_v4();
    app.seed_stock(variant, 2).await;

    let payload = json!({
        "items": [{ "variant_id": variant, "quantity": 5, "retail_price": "3.00" }],
    });

    let response = router(&app)
        .oneshot(post_json("/orders", Some((Uuid::new_v4(), "customer")), payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["details"]["available"], 2);
    assert_eq!(body["details"]["requested"], 5);
    assert_eq!(body["details"]["variant_id"], variant.to_string());
}

#[tokio::test]
async fn order_flow_round_trips_over_http() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let variant = Uuid::new_v4();
    app.seed_stock(variant, 8).await;

    let placed = router(&app)
        .oneshot(post_json(
            "/orders",
            Some((customer, "customer")),
            json!({
                "items": [{ "variant_id": variant, "quantity": 3, "retail_price": "4.00" }],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(placed.status(), StatusCode::CREATED);
    let placed_body = body_json(placed).await;
    let order_id = placed_body["order"]["id"].as_str().unwrap().to_string();
    assert_eq!(placed_body["order"]["status"], "processing");

    let inventory = router(&app)
        .oneshot(
            Request::builder()
                .uri(format!("/inventory/{variant}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let inventory_body = body_json(inventory).await;
    assert_eq!(inventory_body["quantity"], 5);
    assert_eq!(inventory_body["classification"], "In Stock");

    let cancelled = router(&app)
        .oneshot(post_json(
            &format!("/orders/{order_id}/cancel"),
            Some((customer, "customer")),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(cancelled.status(), StatusCode::OK);

    let after = router(&app)
        .oneshot(
            Request::builder()
                .uri(format!("/inventory/{variant}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let after_body = body_json(after).await;
    assert_eq!(after_body["quantity"], 8);
}

#[tokio::test]
async fn manual_adjustment_requires_exactly_one_mode() {
    let app = TestApp::new().await;
    let variant = Uuid::new_v4();
    let admin = Some((Uuid::new_v4(), "admin"));

    let both = router(&app)
        .oneshot(post_json(
            &format!("/inventory/{variant}/adjust"),
            admin,
            json!({ "delta": 2, "quantity": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(both.status(), StatusCode::BAD_REQUEST);

    let set = router(&app)
        .oneshot(post_json(
            &format!("/inventory/{variant}/adjust"),
            admin,
            json!({ "quantity": 5, "reason": "recount" }),
        ))
        .await
        .unwrap();
    assert_eq!(set.status(), StatusCode::OK);
    let body = body_json(set).await;
    assert_eq!(body["new_quantity"], 5);
}
