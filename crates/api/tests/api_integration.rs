//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Money, StudentId};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{Balance, CanteenStore, InMemoryStore, MenuItem, Student};
use tower::ServiceExt;

use api::config::Config;
use api::routes::AppState;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, Arc<AppState<InMemoryStore>>) {
    let state = api::create_default_state(InMemoryStore::new(), &Config::default());
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

/// A seeded canteen with one student and one menu item.
struct Canteen {
    app: axum::Router,
    state: Arc<AppState<InMemoryStore>>,
    student: Student,
    item: MenuItem,
}

async fn seeded(balance: Money, price: Money, stock: i32) -> Canteen {
    let (app, state) = setup();
    let student = Student::new("Ada", "ada@example.edu");
    let item = MenuItem::new("Veg Thali", price, stock);
    state.store.insert_student(&student).await.unwrap();
    state.store.insert_menu_item(&item).await.unwrap();
    state
        .store
        .insert_balance(&Balance::new(student.id, balance))
        .await
        .unwrap();
    Canteen {
        app,
        state,
        student,
        item,
    }
}

fn student_request(method: &str, uri: &str, student: StudentId, body: Option<Value>) -> Request<Body> {
    request(method, uri, Some(student), "STUDENT", body)
}

fn staff_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    request(method, uri, None, "STAFF", body)
}

fn request(
    method: &str,
    uri: &str,
    user: Option<StudentId>,
    roles: &str,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-roles", roles);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn place_order(canteen: &Canteen, quantity: u32) -> (StatusCode, Value) {
    send(
        &canteen.app,
        student_request(
            "POST",
            "/orders",
            canteen.student.id,
            Some(json!({
                "items": [{ "menu_item_id": canteen.item.id.to_string(), "quantity": quantity }]
            })),
        ),
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_order() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;

    let (status, json) = place_order(&canteen, 2).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "PAID");
    assert_eq!(json["total_cents"], 2000);
    assert_eq!(json["student_id"], canteen.student.id.to_string());
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
    assert_eq!(json["items"][0]["unit_price_cents"], 1000);
    assert!(json.get("warning").is_none());

    let balance = canteen.state.store.get_balance(canteen.student.id).await.unwrap().unwrap();
    assert_eq!(balance.amount, Money::from_units(30));
    let item = canteen.state.store.get_menu_item(canteen.item.id).await.unwrap().unwrap();
    assert_eq!(item.stock, 8);
}

#[tokio::test]
async fn test_create_order_requires_identity() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    let body = json!({ "items": [{ "menu_item_id": canteen.item.id.to_string(), "quantity": 1 }] });

    let anonymous = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, json) = send(&canteen.app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");

    let (status, json) = send(&canteen.app, staff_request("POST", "/orders", Some(body))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_students_cannot_list_all_orders() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;

    let (status, _) = send(
        &canteen.app,
        student_request("GET", "/orders", canteen.student.id, None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_insufficient_stock_is_conflict() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 1).await;

    let (status, json) = place_order(&canteen, 3).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INSUFFICIENT_STOCK");
    assert_eq!(canteen.state.store.order_count().await, 0);
}

#[tokio::test]
async fn test_insufficient_balance_is_conflict() {
    let canteen = seeded(Money::from_units(5), Money::from_units(10), 10).await;

    let (status, json) = place_order(&canteen, 1).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INSUFFICIENT_BALANCE");
    let item = canteen.state.store.get_menu_item(canteen.item.id).await.unwrap().unwrap();
    assert_eq!(item.stock, 10);
}

#[tokio::test]
async fn test_unknown_menu_item_is_not_found() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;

    let (status, json) = send(
        &canteen.app,
        student_request(
            "POST",
            "/orders",
            canteen.student.id,
            Some(json!({ "items": [{ "menu_item_id": common::MenuItemId::new().to_string(), "quantity": 1 }] })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_body_is_bad_input() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;

    let (status, json) = send(
        &canteen.app,
        student_request(
            "POST",
            "/orders",
            canteen.student.id,
            Some(json!({
                "items": [{ "menu_item_id": canteen.item.id.to_string(), "quantity": -1 }]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_INPUT");
    assert!(json["error"].as_str().is_some());

    let broken = Request::builder()
        .method("POST")
        .uri("/menu-items/00000000-0000-0000-0000-000000000000/stock")
        .header("x-user-roles", "STAFF")
        .header("content-type", "application/json")
        .body(Body::from("{\"delta\": "))
        .unwrap();
    let (status, json) = send(&canteen.app, broken).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_INPUT");

    let item = canteen.state.store.get_menu_item(canteen.item.id).await.unwrap().unwrap();
    assert_eq!(item.stock, 10);
    assert_eq!(canteen.state.store.order_count().await, 0);
}

#[tokio::test]
async fn test_malformed_order_id_is_bad_request() {
    let (app, _) = setup();

    let (status, json) = send(&app, staff_request("POST", "/orders/not-a-uuid/dispatch", None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_INPUT");
}

#[tokio::test]
async fn test_order_visibility() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    let (_, created) = place_order(&canteen, 1).await;
    let uri = format!("/orders/{}", created["id"].as_str().unwrap());

    let (status, json) = send(&canteen.app, student_request("GET", &uri, canteen.student.id, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], created["id"]);

    let (status, _) = send(&canteen.app, staff_request("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&canteen.app, student_request("GET", &uri, StudentId::new(), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(
        &canteen.app,
        student_request("GET", "/orders/my-orders", canteen.student.id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_dispatch_and_confirm_collection() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    let (_, created) = place_order(&canteen, 1).await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, json) = send(
        &canteen.app,
        staff_request("POST", &format!("/orders/{id}/dispatch"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "AWAITING_CONFIRMATION");
    assert_eq!(
        json["warning"],
        domain::notifications::NO_DEVICE_TOKEN_WARNING
    );

    let (status, json) = send(
        &canteen.app,
        staff_request("POST", &format!("/orders/{id}/dispatch"), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INVALID_STATE");

    let (status, _) = send(
        &canteen.app,
        student_request(
            "POST",
            &format!("/orders/{id}/confirm-collection"),
            StudentId::new(),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(
        &canteen.app,
        student_request(
            "POST",
            &format!("/orders/{id}/confirm-collection"),
            canteen.student.id,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "COMPLETED");
}

#[tokio::test]
async fn test_dispatch_push_goes_to_gateway() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    canteen
        .state
        .store
        .set_device_token(canteen.student.id, "device-abc")
        .await
        .unwrap();
    let mut pushes = canteen.state.notifier.subscribe_pushes();
    let (_, created) = place_order(&canteen, 1).await;
    let id = created["id"].as_str().unwrap();

    let (status, json) = send(
        &canteen.app,
        staff_request("POST", &format!("/orders/{id}/dispatch"), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json.get("warning").is_none());
    let push = pushes.recv().await.unwrap();
    assert_eq!(push.device_token, "device-abc");
    assert_eq!(push.message.title, "Order Ready for Collection");
}

#[tokio::test]
async fn test_update_status_overrides_without_checks() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    let (_, created) = place_order(&canteen, 1).await;
    let uri = format!("/orders/{}/status", created["id"].as_str().unwrap());

    let (status, json) = send(
        &canteen.app,
        staff_request("PATCH", &uri, Some(json!({ "status": "completed" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "COMPLETED");

    let (status, json) = send(
        &canteen.app,
        staff_request("PATCH", &uri, Some(json!({ "status": "SHIPPED" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_INPUT");
}

#[tokio::test]
async fn test_rfid_registration_and_lookup() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    let (_, created) = place_order(&canteen, 1).await;

    let (status, _) = send(
        &canteen.app,
        student_request(
            "POST",
            "/rfid/register",
            canteen.student.id,
            Some(json!({ "tag_id": "TAG-1", "otp": "000000x" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let code = canteen.state.rfid.otp_store().issue(&canteen.student.email);
    let (status, json) = send(
        &canteen.app,
        student_request(
            "POST",
            "/rfid/register",
            canteen.student.id,
            Some(json!({ "tag_id": "TAG-1", "otp": code })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["tag_id"], "TAG-1");
    assert_eq!(json["student_id"], canteen.student.id.to_string());

    let (status, json) = send(&canteen.app, staff_request("GET", "/orders/rfid/TAG-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], created["id"]);

    let (status, _) = send(
        &canteen.app,
        student_request("GET", "/orders/rfid/TAG-1", canteen.student.id, None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(&canteen.app, staff_request("GET", "/orders/rfid/TAG-404", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_rfid_request_otp_and_admin_register() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;

    let (status, json) = send(
        &canteen.app,
        student_request("POST", "/rfid/request-otp", canteen.student.id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "OTP sent to your registered email.");
    assert_eq!(canteen.state.rfid.otp_store().len(), 1);

    let (status, _) = send(
        &canteen.app,
        staff_request(
            "POST",
            "/rfid/admin/register",
            Some(json!({ "tag_id": "TAG-9", "student_id": canteen.student.id.to_string() })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &canteen.app,
        student_request("GET", "/rfid/TAG-9", canteen.student.id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["student_id"], canteen.student.id.to_string());
}

#[tokio::test]
async fn test_payment_callback_for_settled_order_is_rejected() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    let (_, created) = place_order(&canteen, 1).await;

    let (status, json) = send(
        &canteen.app,
        Request::builder()
            .method("POST")
            .uri("/payment/callback")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "order_id": created["id"],
                    "amount_cents": 1000,
                    "status": "SUCCESS"
                })
                .to_string(),
            ))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "DUPLICATE_TRANSACTION");
    assert_eq!(canteen.state.store.transaction_count().await, 1);
}

#[tokio::test]
async fn test_failed_payment_callback_is_ignored() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    let (_, created) = place_order(&canteen, 1).await;

    let (status, json) = send(
        &canteen.app,
        Request::builder()
            .method("POST")
            .uri("/payment/callback")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "transaction_reference": "ref-1",
                    "order_id": created["id"],
                    "amount_cents": 1000,
                    "status": "failure"
                })
                .to_string(),
            ))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ignored");
}

#[tokio::test]
async fn test_payment_initiation_is_owner_only() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    let (_, created) = place_order(&canteen, 1).await;
    let uri = format!("/orders/{}/pay", created["id"].as_str().unwrap());

    let (status, json) = send(&canteen.app, student_request("POST", &uri, canteen.student.id, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Payment initiated.");
    assert!(json["transaction_reference"].as_str().is_some());

    let (status, _) = send(&canteen.app, student_request("POST", &uri, StudentId::new(), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_balance_endpoints() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    let id = canteen.student.id;

    let (status, json) = send(
        &canteen.app,
        staff_request("POST", &format!("/balances/{id}/credit"), Some(json!({ "amount_cents": 1250 }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["amount_cents"], 6250);

    let (status, _) = send(
        &canteen.app,
        staff_request("POST", &format!("/balances/{id}/credit"), Some(json!({ "amount_cents": 0 }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &canteen.app,
        staff_request("PUT", &format!("/balances/{id}"), Some(json!({ "amount_cents": -1 }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        &canteen.app,
        staff_request("PUT", &format!("/balances/{id}"), Some(json!({ "amount_cents": 900 }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["amount_cents"], 900);

    let (status, json) = send(&canteen.app, student_request("GET", "/balances/me", id, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["amount_cents"], 900);

    let (status, _) = send(
        &canteen.app,
        student_request("GET", "/balances/me", StudentId::new(), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_restock_and_low_stock_alert() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    let mut alerts = canteen.state.notifier.subscribe(notify::StaffTopic::StockAlerts);
    let uri = format!("/menu-items/{}/stock", canteen.item.id);

    let (status, json) = send(&canteen.app, staff_request("POST", &uri, Some(json!({ "delta": -8 })))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stock"], 2);
    let alert = alerts.recv().await.unwrap();
    assert_eq!(alert.payload["stock"], 2);

    let (status, json) = send(&canteen.app, staff_request("POST", &uri, Some(json!({ "delta": -3 })))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INSUFFICIENT_STOCK");
}

#[tokio::test]
async fn test_transactions_and_daily_earnings() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    place_order(&canteen, 1).await;
    place_order(&canteen, 2).await;

    let (status, json) = send(&canteen.app, staff_request("GET", "/transactions", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (status, json) = send(
        &canteen.app,
        student_request("GET", "/transactions/mine", canteen.student.id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (status, json) = send(&canteen.app, staff_request("GET", "/earnings/daily", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["daily_earnings_cents"], 3000);
}

#[tokio::test]
async fn test_device_token_registration() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;

    let (status, _) = send(
        &canteen.app,
        student_request(
            "POST",
            "/students/me/device-token",
            canteen.student.id,
            Some(json!({ "token": "  " })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &canteen.app,
        student_request(
            "POST",
            "/students/me/device-token",
            canteen.student.id,
            Some(json!({ "token": "device-xyz" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let student = canteen.state.store.get_student(canteen.student.id).await.unwrap().unwrap();
    assert_eq!(student.device_token.as_deref(), Some("device-xyz"));

    let (status, _) = send(
        &canteen.app,
        student_request(
            "POST",
            "/students/me/device-token",
            StudentId::new(),
            Some(json!({ "token": "device-xyz" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_staff_events_topic_must_exist() {
    let (app, _) = setup();

    let (status, json) = send(&app, staff_request("GET", "/staff/events/lunch-rush", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_INPUT");

    let response = app
        .oneshot(staff_request("GET", "/staff/events/new-orders", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let canteen = seeded(Money::from_units(50), Money::from_units(10), 10).await;
    place_order(&canteen, 1).await;

    let response = canteen
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_created_total"));
}
