pub mod allocation;
pub mod audit;
pub mod catalog;
pub mod customers;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod insurance;
pub mod inventory;
pub mod order_status;
pub mod orders;
pub mod prescriptions;
pub mod procurement;
pub mod users;
