//! PostgreSQL persistence adapter.
//!
//! Callers never see raw query construction: every operation here is
//! parameterised, SQL text lives in this crate only, and the analytics
//! surface executes nothing outside its fixed statement set. Connection
//! pooling is deadpool-postgres; transient failures retry with jittered
//! exponential backoff.

pub mod admin;
pub mod analytics;
pub mod annotations;
pub mod audit;
pub mod batches;
pub mod conversations;
mod error;
pub mod export;
pub mod feedback;
pub mod matview;
pub mod pool;
pub mod retry;
pub mod schema;
pub mod topics;

pub use deadpool_postgres::Pool;
pub use error::{classify_pg_error, classify_pool_error};
pub use pool::{connect, connect_lazy, health_check, PoolStats};
