pub mod audit_log;
pub mod category;
pub mod customer;
pub mod insurance_claim;
pub mod inventory;
pub mod medicine;
pub mod order;
pub mod order_item;
pub mod order_item_lot;
pub mod payment;
pub mod prescription;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod user;

pub use order::OrderStatus;
pub use user::Role;
