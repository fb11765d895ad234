mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use pharmacy_api::services::orders::{OrderLine, PlaceOrder};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{body_json, decimal, TestApp, TestUser};

const BOUNDARY: &str = "pharmacy-test-boundary";

async fn placed_order(app: &TestApp, owner: Uuid) -> Uuid {
    let medicine = app.create_medicine("Insulin Glargine", dec!(12.50)).await;
    app.create_lot(medicine, "INS", 10, None).await;
    app.state
        .services
        .orders
        .place_order(
            owner,
            PlaceOrder {
                items: vec![OrderLine {
                    medicine_id: medicine,
                    quantity: 2,
                }],
                ..Default::default()
            },
        )
        .await
        .expect("order placed")
        .order
        .id
}

fn multipart_body(filename: &str, contents: &[u8], order_id: Option<Uuid>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(order_id) = order_id {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"order_id\"\r\n\r\n{}\r\n",
                BOUNDARY, order_id
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn upload(
    app: &TestApp,
    user: &TestUser,
    filename: &str,
    contents: &[u8],
    order_id: Option<Uuid>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/prescriptions")
        .header("authorization", format!("Bearer {}", user.token))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(filename, contents, order_id)))
        .unwrap();
    let response = app.send(request).await;
    let status = response.status();
    (status, body_json(response).await)
}

async fn file_claim(app: &TestApp, order_id: Uuid, amount: &str) -> (StatusCode, Value) {
    app.call(
        Method::POST,
        "/api/v1/insurance-claims",
        Some(json!({
            "order_id": order_id,
            "provider": "HealthFirst",
            "policy_number": "HF-2231",
            "claim_amount": amount,
        })),
        Some(&app.staff.token),
    )
    .await
}

async fn review(app: &TestApp, claim: &str, status: &str, token: &str) -> (StatusCode, Value) {
    app.call(
        Method::PUT,
        &format!("/api/v1/insurance-claims/{}/review", claim),
        Some(json!({ "status": status, "notes": "checked" })),
        Some(token),
    )
    .await
}

#[tokio::test]
async fn claims_cannot_exceed_the_order_total() {
    let app = TestApp::new().await;
    let order = placed_order(&app, app.customer.id).await;

    let (status, _) = file_claim(&app, order, "25.01").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = file_claim(&app, order, "0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = file_claim(&app, Uuid::new_v4(), "1.00").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = file_claim(&app, order, "25.00").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "SUBMITTED");
    assert_eq!(decimal(&body["data"]["claim_amount"]), dec!(25.00));
}

#[tokio::test]
async fn claims_are_approved_then_paid() {
    let app = TestApp::new().await;
    let order = placed_order(&app, app.customer.id).await;
    let (_, body) = file_claim(&app, order, "10.00").await;
    let claim = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = review(&app, &claim, "APPROVED", &app.staff.token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = review(&app, &claim, "PAID", &app.pharmacist.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = review(&app, &claim, "APPROVED", &app.pharmacist.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "APPROVED");
    assert_eq!(body["data"]["reviewer_notes"], "checked");
    assert_eq!(
        body["data"]["reviewed_by"],
        app.pharmacist.id.to_string()
    );

    let (status, body) = review(&app, &claim, "PAID", &app.admin.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "PAID");

    let (status, _) = review(&app, &claim, "REJECTED", &app.admin.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::GET,
            "/api/v1/insurance-claims",
            None,
            Some(&app.customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn upload_stores_file_and_pending_record() {
    let app = TestApp::new().await;
    let order = placed_order(&app, app.customer.id).await;

    let (status, body) = upload(&app, &app.customer, "Rx-Scan.PDF", b"%PDF-1.4 test", Some(order)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["status"], "PENDING");
    assert_eq!(body["data"]["original_filename"], "Rx-Scan.PDF");
    assert_eq!(body["data"]["order_id"], order.to_string());

    let stored = body["data"]["file_path"].as_str().unwrap();
    assert!(stored.ends_with(".pdf"));
    assert!(stored.starts_with(&app.state.config.upload_dir));
    let contents = std::fs::read(stored).expect("upload written to disk");
    assert_eq!(contents, b"%PDF-1.4 test");
}

#[tokio::test]
async fn upload_rejects_unsupported_files() {
    let app = TestApp::new().await;

    let (status, body) = upload(&app, &app.customer, "payload.exe", b"MZ", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("allowed"));

    let (status, _) = upload(&app, &app.customer, "empty.png", b"", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let other = app.new_customer("other@pharmacy.test").await;
    let foreign_order = placed_order(&app, other.id).await;
    let (status, _) = upload(&app, &app.customer, "rx.jpg", b"jpeg", Some(foreign_order)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_uploads_are_rejected() {
    let app = TestApp::with_config(|cfg| cfg.max_upload_bytes = 16).await;
    let (status, _) = upload(&app, &app.customer, "rx.png", &[7u8; 32], None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn customers_see_only_their_prescriptions() {
    let app = TestApp::new().await;
    let other = app.new_customer("other@pharmacy.test").await;

    let (_, mine) = upload(&app, &app.customer, "mine.png", b"png", None).await;
    let (_, theirs) = upload(&app, &other, "theirs.png", b"png", None).await;
    let theirs_id = theirs["data"]["id"].as_str().unwrap();

    let (status, body) = app
        .call(Method::GET, "/api/v1/prescriptions", None, Some(&app.customer.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], mine["data"]["id"]);

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/v1/prescriptions/{}", theirs_id),
            None,
            Some(&app.customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .call(Method::GET, "/api/v1/prescriptions", None, Some(&app.pharmacist.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
}

#[tokio::test]
async fn pharmacists_verify_pending_prescriptions() {
    let app = TestApp::new().await;
    let (_, uploaded) = upload(&app, &app.customer, "rx.jpeg", b"jpeg", None).await;
    let id = uploaded["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/prescriptions/{}/verify", id);

    let (status, _) = app
        .call(
            Method::PUT,
            &uri,
            Some(json!({ "status": "VERIFIED" })),
            Some(&app.customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::PUT,
            &uri,
            Some(json!({ "status": "PENDING" })),
            Some(&app.pharmacist.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            Method::PUT,
            &uri,
            Some(json!({ "status": "VERIFIED", "notes": "Signature matches" })),
            Some(&app.pharmacist.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "VERIFIED");
    assert_eq!(body["data"]["verified_by"], app.pharmacist.id.to_string());

    let (status, _) = app
        .call(
            Method::PUT,
            &uri,
            Some(json!({ "status": "REJECTED" })),
            Some(&app.pharmacist.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/prescriptions/{}", id),
            None,
            Some(&app.customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "VERIFIED");
}
