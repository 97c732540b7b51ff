//! Store adapters.

pub mod postgres;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use postgres::PgStore;
