//! Per-dialect session handlers.

pub mod mysql;
pub mod postgres;

pub use mysql::MysqlRelayProxy;
pub use postgres::PostgresProxy;
