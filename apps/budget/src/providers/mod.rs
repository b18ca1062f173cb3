//! Adapters for the budget ports.

pub mod fake_exchange;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use fake_exchange::FakeExchangeRateService;
