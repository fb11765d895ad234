mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use pharmacy_api::entities::audit_log;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;

use common::{body_json, TestApp};

#[tokio::test]
async fn health_reports_database() {
    let app = TestApp::new().await;
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["checks"]["database"], "healthy");
}

#[tokio::test]
async fn missing_or_bad_tokens_are_unauthorized() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/v1/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Unauthorized");

    let (status, body) = app
        .call(Method::GET, "/api/v1/orders", None, Some("not-a-jwt"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn roles_outside_the_allow_list_are_forbidden() {
    let app = TestApp::new().await;

    for (uri, token) in [
        ("/api/v1/inventory", &app.customer.token),
        ("/api/v1/purchase-orders", &app.staff.token),
        ("/api/v1/users", &app.pharmacist.token),
        ("/api/v1/audit-logs", &app.staff.token),
        ("/api/v1/customers", &app.customer.token),
    ] {
        let (status, body) = app.call(Method::GET, uri, None, Some(token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        assert_eq!(body["error"], "Insufficient permissions");
    }

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/medicines",
            Some(json!({ "name": "Forbidden", "price": "1.00" })),
            Some(&app.staff.token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn request_id_is_echoed_and_enveloped() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/orders")
        .header("x-request-id", "smoke-req-1")
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.headers()["x-request-id"], "smoke-req-1");
    let body = body_json(response).await;
    assert_eq!(body["request_id"], "smoke-req-1");

    let response = app.request(Method::GET, "/health", None, None).await;
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn register_then_login() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "name": "Dana",
                "email": "Dana@Example.com",
                "password": "correct horse battery",
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["role"], "CUSTOMER");
    assert_eq!(body["data"]["email"], "dana@example.com");
    assert!(body["data"].get("password_hash").is_none());

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "name": "Dana again",
                "email": "dana@example.com",
                "password": "another password",
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": "dana@example.com", "password": "wrong password" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid email or password");

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": "dana@example.com", "password": "correct horse battery" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["access_token"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["token_type"], "Bearer");

    let (status, body) = app.call(Method::GET, "/api/v1/me", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Dana");
}

#[tokio::test]
async fn role_changes_apply_to_existing_tokens() {
    let app = TestApp::new().await;
    let target = app.customer.clone();

    let (status, _) = app
        .call(Method::GET, "/api/v1/inventory", None, Some(&target.token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/v1/users/{}/role", target.id),
            Some(json!({ "role": "STAFF" })),
            Some(&app.admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "STAFF");

    let (status, _) = app
        .call(Method::GET, "/api/v1/inventory", None, Some(&target.token))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/v1/users/{}/active", target.id),
            Some(json!({ "is_active": false })),
            Some(&app.admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(Method::GET, "/api/v1/me", None, Some(&target.token))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admins_cannot_demote_or_disable_themselves() {
    let app = TestApp::new().await;
    let admin = &app.admin;

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/v1/users/{}/role", admin.id),
            Some(json!({ "role": "STAFF" })),
            Some(&admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/v1/users/{}/active", admin.id),
            Some(json!({ "is_active": false })),
            Some(&admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn catalog_is_public_and_reports_stock() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/categories",
            Some(json!({ "name": "Antibiotics" })),
            Some(&app.pharmacist.token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let category = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/medicines",
            Some(json!({
                "name": "Amoxicillin 500mg",
                "price": "12.50",
                "category_id": category,
                "requires_prescription": true,
            })),
            Some(&app.pharmacist.token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let medicine = body["data"]["id"].as_str().unwrap().parse().unwrap();
    app.create_lot(medicine, "A", 3, Some("2026-01-01")).await;
    app.create_lot(medicine, "B", 4, None).await;

    let other = app.create_medicine("Ibuprofen", dec!(2.25)).await;
    app.create_lot(other, "I", 9, None).await;

    let (status, body) = app
        .call(Method::GET, "/api/v1/medicines?search=Amoxi", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["stock"], 7);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/v1/medicines?category_id={}", category),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/categories",
            Some(json!({ "name": "Antibiotics" })),
            Some(&app.pharmacist.token),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn mutations_write_one_audit_row() {
    let app = TestApp::new().await;
    let medicine = app.create_medicine("Amlodipine", dec!(3.75)).await;
    app.create_lot(medicine, "AML", 10, None).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [{ "medicine_id": medicine, "quantity": 2 }] })),
            Some(&app.customer.token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let rows = audit_log::Entity::find()
        .filter(audit_log::Column::EntityType.eq("order"))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].action, "order.placed");
    assert_eq!(rows[0].entity_id.as_deref(), Some(order_id.as_str()));
    assert_eq!(rows[0].user_id, Some(app.customer.id));

    let (status, body) = app
        .call(
            Method::GET,
            "/api/v1/audit-logs?entity_type=order",
            None,
            Some(&app.admin.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["action"], "order.placed");
}

#[tokio::test]
async fn inventory_reports() {
    let app = TestApp::new().await;
    let low = app.create_medicine("Warfarin", dec!(2.25)).await;
    let high = app.create_medicine("Vitamin D", dec!(2.25)).await;
    app.create_lot(low, "W1", 2, Some("2000-01-01")).await;
    app.create_lot(high, "V1", 500, None).await;

    let (status, body) = app
        .call(Method::GET, "/api/v1/inventory/low-stock", None, Some(&app.staff.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["medicine_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Warfarin"]);

    let (status, body) = app
        .call(
            Method::GET,
            "/api/v1/inventory/expiring?days=30",
            None,
            Some(&app.staff.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["batch_number"], "W1");

    for days in ["-1", "3651", "100000000"] {
        let (status, body) = app
            .call(
                Method::GET,
                &format!("/api/v1/inventory/expiring?days={}", days),
                None,
                Some(&app.staff.token),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "days={}", days);
        assert_eq!(body["success"], false);
    }

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/inventory",
            Some(json!({ "medicine_id": low, "batch_number": "NEG", "quantity": -1 })),
            Some(&app.staff.token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn customer_records_lifecycle() {
    let app = TestApp::new().await;
    let token = app.staff.token.clone();

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/customers",
            Some(json!({ "name": "Walk-in", "email": "not-an-email" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/customers",
            Some(json!({
                "name": "Rosa Diaz",
                "phone": "555-0142",
                "allergies": "Penicillin",
            })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/v1/customers/{}", id),
            Some(json!({ "notes": "Prefers generics" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["notes"], "Prefers generics");
    assert_eq!(body["data"]["allergies"], "Penicillin");

    let (_, body) = app
        .call(Method::GET, "/api/v1/customers?search=0142", None, Some(&token))
        .await;
    assert_eq!(body["data"]["total"], 1);

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/v1/customers/{}", id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/v1/customers/{}", id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app
        .call(Method::GET, "/api/v1/customers", None, Some(&token))
        .await;
    assert_eq!(body["data"]["total"], 0);
}
