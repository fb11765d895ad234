//! Row builders for service tests that run against a real database

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait, EntityTrait};
use uuid::Uuid;

use crate::entities::{inventory, medicine, user, Role};

pub(crate) async fn customer<C: ConnectionTrait>(conn: &C) -> Uuid {
    let now = Utc::now();
    let id = Uuid::new_v4();
    user::ActiveModel {
        id: Set(id),
        name: Set("Test Customer".to_string()),
        email: Set(format!("{}@pharmacy.test", id.simple())),
        password_hash: Set("not-a-real-hash".to_string()),
        role: Set(Role::Customer),
        phone: Set(None),
        address: Set(None),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await
    .expect("seed customer");
    id
}

pub(crate) async fn medicine<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    price: Decimal,
) -> medicine::Model {
    let now = Utc::now();
    medicine::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(None),
        manufacturer: Set(None),
        price: Set(price),
        category_id: Set(None),
        requires_prescription: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
    }
    .insert(conn)
    .await
    .expect("seed medicine")
}

pub(crate) async fn lot<C: ConnectionTrait>(
    conn: &C,
    medicine_id: Uuid,
    quantity: i32,
    expiry_date: Option<NaiveDate>,
) -> inventory::Model {
    let now = Utc::now();
    inventory::ActiveModel {
        id: Set(Uuid::new_v4()),
        medicine_id: Set(medicine_id),
        batch_number: Set(format!("LOT-{}", &Uuid::new_v4().simple().to_string()[..8])),
        quantity: Set(quantity),
        expiry_date: Set(expiry_date),
        version: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
    }
    .insert(conn)
    .await
    .expect("seed lot")
}

pub(crate) async fn reload_lot<C: ConnectionTrait>(conn: &C, id: Uuid) -> inventory::Model {
    inventory::Entity::find_by_id(id)
        .one(conn)
        .await
        .expect("query lot")
        .expect("lot exists")
}
