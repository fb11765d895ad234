mod common;

use axum::http::{Method, StatusCode};
use pharmacy_api::entities::inventory;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{json, Value};
use uuid::Uuid;

use common::{decimal, TestApp};

async fn draft_po(app: &TestApp, medicine: Uuid) -> Value {
    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "supplier_name": "MedSupply Ltd",
                "items": [
                    {
                        "medicine_id": medicine,
                        "quantity": 40,
                        "unit_cost": "2.25",
                        "batch_number": "MS-001",
                        "expiry_date": "2028-05-01",
                    },
                    { "medicine_id": medicine, "quantity": 10, "unit_cost": "3.75" },
                ],
            })),
            Some(&app.pharmacist.token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"].clone()
}

async fn move_po(app: &TestApp, id: &str, status: &str) -> (StatusCode, Value) {
    app.call(
        Method::PUT,
        &format!("/api/v1/purchase-orders/{}/status", id),
        Some(json!({ "status": status })),
        Some(&app.pharmacist.token),
    )
    .await
}

#[tokio::test]
async fn purchase_order_total_is_sum_of_lines() {
    let app = TestApp::new().await;
    let medicine = app.create_medicine("Paracetamol", dec!(2.25)).await;

    let po = draft_po(&app, medicine).await;
    assert_eq!(po["status"], "DRAFT");
    assert_eq!(decimal(&po["total"]), dec!(127.50));
    assert_eq!(po["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn receiving_books_one_lot_per_line() {
    let app = TestApp::new().await;
    let medicine = app.create_medicine("Paracetamol", dec!(2.25)).await;
    let po = draft_po(&app, medicine).await;
    let id = po["id"].as_str().unwrap().to_string();

    let (status, body) = move_po(&app, &id, "ORDERED").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ORDERED");

    let (status, body) = move_po(&app, &id, "RECEIVED").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "RECEIVED");
    assert!(body["data"]["received_at"].is_string());

    let lots = inventory::Entity::find()
        .filter(inventory::Column::MedicineId.eq(medicine))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(lots.len(), 2);
    assert_eq!(lots.iter().map(|lot| lot.quantity).sum::<i32>(), 50);
    let named = lots.iter().find(|lot| lot.batch_number == "MS-001").unwrap();
    assert_eq!(named.quantity, 40);
    assert_eq!(named.expiry_date, Some(common::date("2028-05-01")));
    let generated = lots.iter().find(|lot| lot.batch_number != "MS-001").unwrap();
    assert!(generated.batch_number.starts_with("PO-"));

    assert_eq!(
        app.state
            .services
            .inventory
            .medicine_stock(medicine)
            .await
            .unwrap(),
        50
    );
}

#[tokio::test]
async fn purchase_orders_follow_their_lifecycle() {
    let app = TestApp::new().await;
    let medicine = app.create_medicine("Paracetamol", dec!(2.25)).await;
    let po = draft_po(&app, medicine).await;
    let id = po["id"].as_str().unwrap().to_string();

    let (status, _) = move_po(&app, &id, "RECEIVED").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = move_po(&app, &id, "CANCELLED").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = move_po(&app, &id, "ORDERED").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let lots = inventory::Entity::find()
        .filter(inventory::Column::MedicineId.eq(medicine))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert!(lots.is_empty());
}

#[tokio::test]
async fn purchase_orders_reject_bad_input() {
    let app = TestApp::new().await;
    let medicine = app.create_medicine("Paracetamol", dec!(2.25)).await;

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({ "supplier_name": "MedSupply Ltd", "items": [] })),
            Some(&app.pharmacist.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "supplier_name": "MedSupply Ltd",
                "items": [{ "medicine_id": medicine, "quantity": 5, "unit_cost": "-1.00" }],
            })),
            Some(&app.pharmacist.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "supplier_name": "MedSupply Ltd",
                "items": [{ "medicine_id": Uuid::new_v4(), "quantity": 5, "unit_cost": "1.00" }],
            })),
            Some(&app.pharmacist.token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn staff_cannot_manage_purchase_orders() {
    let app = TestApp::new().await;
    let medicine = app.create_medicine("Paracetamol", dec!(2.25)).await;
    let po = draft_po(&app, medicine).await;

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/v1/purchase-orders/{}/status", po["id"].as_str().unwrap()),
            Some(json!({ "status": "ORDERED" })),
            Some(&app.staff.token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            Method::GET,
            "/api/v1/purchase-orders?status=DRAFT",
            None,
            Some(&app.admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}
