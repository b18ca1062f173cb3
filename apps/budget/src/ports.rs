//! Ports of the budget application.

use doca::Repository;

use crate::domain::{Amount, Budget, Currency};
use crate::error::BudgetError;

pub trait BudgetRepository: Repository {
    /// The budget with this id, or `NotFound`.
    fn get_by_id(&self, budget_id: &str) -> doca::Result<Budget>;

    /// Store the budget. With `create`, fails with `AlreadyExists` when the
    /// id is taken.
    fn save(&self, budget: &mut Budget, create: bool) -> doca::Result<()>;

    fn save_all(&self, budgets: &mut [Budget]) -> doca::Result<()>;
}
doca::repository_port!(BudgetRepository);

pub trait ExchangeRateService: Send + Sync {
    fn convert_currency(&self, amount: Amount, from: Currency, to: Currency) -> Result<Amount, BudgetError>;
}
doca::service_port!(ExchangeRateService);

/// Register the application's ports; safe to call more than once.
pub fn register() -> doca::Result<()> {
    doca::port::register::<dyn BudgetRepository>()?;
    doca::port::register::<dyn ExchangeRateService>()
}
