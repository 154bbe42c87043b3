//! Database module: connection pools, dialect rules, catalog introspection and the
//! relational store the pipeline reads through.

pub mod connection;
pub mod dialect;
pub mod store;
pub mod warehouse;

mod mysql;
mod postgres;
mod sqlite;
mod value;

pub use connection::{init_pool, DbPool};
pub use dialect::Dialect;
pub use store::{FetchedRows, WarehouseStore};
pub use warehouse::SqlxWarehouse;
