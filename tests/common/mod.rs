#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{NaiveDate, Utc};
use pharmacy_api::{
    build_router,
    config::AppConfig,
    db,
    entities::{inventory, user, Role},
    services::{catalog::CreateMedicine, inventory::CreateLot},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// A seeded account and a valid bearer token for it
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

/// Helper harness for spinning up an application backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin: TestUser,
    pub pharmacist: TestUser,
    pub staff: TestUser,
    pub customer: TestUser,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Fresh database with migrations applied; `tweak` adjusts the config first
    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("pharmacy_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_JWT_SECRET.to_string(),
            "test".to_string(),
        );
        // one connection keeps SQLite writers serialized
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.db_acquire_timeout_secs = 30;
        cfg.upload_dir = dir.path().join("uploads").display().to_string();
        tweak(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(pool, cfg);
        let router = build_router(state.clone());

        let admin = seed_user(&state, "admin@pharmacy.test", Role::Admin).await;
        let pharmacist = seed_user(&state, "pharmacist@pharmacy.test", Role::Pharmacist).await;
        let staff = seed_user(&state, "staff@pharmacy.test", Role::Staff).await;
        let customer = seed_user(&state, "customer@pharmacy.test", Role::Customer).await;

        Self {
            router,
            state,
            admin,
            pharmacist,
            staff,
            customer,
            _dir: dir,
        }
    }

    /// Another CUSTOMER account
    pub async fn new_customer(&self, email: &str) -> TestUser {
        seed_user(&self.state, email, Role::Customer).await
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request and decode the JSON envelope
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, token).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn create_medicine(&self, name: &str, price: Decimal) -> Uuid {
        self.state
            .services
            .catalog
            .create_medicine(CreateMedicine {
                name: name.to_string(),
                description: None,
                manufacturer: Some("Acme Pharma".to_string()),
                price,
                category_id: None,
                requires_prescription: false,
            })
            .await
            .expect("seed medicine")
            .id
    }

    pub async fn create_lot(
        &self,
        medicine_id: Uuid,
        batch: &str,
        quantity: i32,
        expiry: Option<&str>,
    ) -> Uuid {
        self.state
            .services
            .inventory
            .create_lot(CreateLot {
                medicine_id,
                batch_number: batch.to_string(),
                quantity,
                expiry_date: expiry.map(date),
            })
            .await
            .expect("seed lot")
            .id
    }

    pub async fn lot_quantity(&self, lot_id: Uuid) -> i32 {
        inventory::Entity::find_by_id(lot_id)
            .one(&*self.state.db)
            .await
            .expect("lot lookup")
            .expect("lot exists")
            .quantity
    }
}

/// Inserts a user row directly; password hashing is skipped for speed
pub async fn seed_user(state: &AppState, email: &str, role: Role) -> TestUser {
    let now = Utc::now();
    let model = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(format!("{} user", role)),
        email: Set(email.to_string()),
        password_hash: Set("not-a-real-hash".to_string()),
        role: Set(role),
        phone: Set(None),
        address: Set(None),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*state.db)
    .await
    .expect("seed user");

    let token = state
        .auth
        .generate_token(&model)
        .expect("issue token")
        .access_token;

    TestUser {
        id: model.id,
        email: model.email,
        token,
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

pub fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
}

/// Decimal fields are serialized as strings
pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .expect("decimal encoded as string")
        .parse()
        .expect("parsable decimal")
}
