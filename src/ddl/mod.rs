pub mod dialect;
pub mod query;
