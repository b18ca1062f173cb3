//! Budget: reference application for doca.
//!
//! Budgets are aggregates of recurring incomes and expenses. Use cases
//! reach storage only through the `BudgetRepository` and
//! `ExchangeRateService` ports; which adapters serve them is decided once at
//! startup from [`config::Config`].

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod ports;
pub mod providers;
pub mod use_cases;

pub use error::BudgetError;

/// Short description used by the CLI.
pub fn about() -> String {
    format!("budget v{}: ports, adapters and units of work demo", env!("CARGO_PKG_VERSION"))
}

/// Register the ports and bind the adapters selected by `cfg`.
pub fn bootstrap(cfg: &config::Config) -> Result<(), BudgetError> {
    ports::register()?;
    doca::bootstrap(Some(cfg.adapters()?))?;
    Ok(())
}
