//! Query execution against the warehouse

pub mod executor;
pub mod result;

pub use executor::{enforce_row_limit, has_row_limit, QueryExecutor};
pub use result::{QueryResult, Row};
