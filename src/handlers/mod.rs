pub mod audit;
pub mod auth;
pub mod catalog;
pub mod common;
pub mod customers;
pub mod insurance;
pub mod inventory;
pub mod orders;
pub mod prescriptions;
pub mod purchase_orders;
pub mod users;

use std::sync::Arc;

use crate::{
    auth::AuthService,
    config::AppConfig,
    db::DbPool,
    services::{
        audit::AuditService, catalog::CatalogService, customers::CustomerService,
        insurance::InsuranceService, inventory::InventoryService,
        order_status::OrderStatusService, orders::OrderService,
        prescriptions::PrescriptionService, procurement::ProcurementService, users::UserService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<UserService>,
    pub catalog: Arc<CatalogService>,
    pub inventory: Arc<InventoryService>,
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub procurement: Arc<ProcurementService>,
    pub insurance: Arc<InsuranceService>,
    pub prescriptions: Arc<PrescriptionService>,
    pub customers: Arc<CustomerService>,
    pub audit: Arc<AuditService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, auth_service: Arc<AuthService>, config: &AppConfig) -> Self {
        Self {
            users: Arc::new(UserService::new(db_pool.clone(), auth_service)),
            catalog: Arc::new(CatalogService::new(db_pool.clone())),
            inventory: Arc::new(InventoryService::new(
                db_pool.clone(),
                config.low_stock_threshold,
                config.expiry_warning_days,
            )),
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                config.skip_expired_lots,
            )),
            order_status: Arc::new(OrderStatusService::new(db_pool.clone())),
            procurement: Arc::new(ProcurementService::new(db_pool.clone())),
            insurance: Arc::new(InsuranceService::new(db_pool.clone())),
            prescriptions: Arc::new(PrescriptionService::new(
                db_pool.clone(),
                config.upload_dir.clone(),
                config.max_upload_bytes,
            )),
            customers: Arc::new(CustomerService::new(db_pool.clone())),
            audit: Arc::new(AuditService::new(db_pool)),
        }
    }
}
