//! Application use cases.

use std::str::FromStr;
use std::sync::Arc;

use doca::{Command, UnitOfWork, UseCase};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Amount, Budget, Currency, Frequency};
use crate::error::BudgetError;
use crate::ports::{BudgetRepository, ExchangeRateService};

doca::unit_of_work! {
    /// Repositories written together by the budget use cases.
    pub struct BudgetUow {
        pub budgets: dyn BudgetRepository,
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateBudgetCmd {
    pub title: String,
    pub currency: Currency,
}

impl Command for CreateBudgetCmd {}

/// Create a new budget; fails with `AlreadyExists` when the title is taken.
#[derive(Debug, Default)]
pub struct CreateBudget;

impl UseCase for CreateBudget {
    type Command = CreateBudgetCmd;
    type Output = Budget;
    type Error = BudgetError;
    const NAME: &'static str = "CreateBudget";

    fn inject() -> doca::Result<Self> {
        Ok(Self)
    }

    fn exec(&self, cmd: CreateBudgetCmd) -> Result<Budget, BudgetError> {
        let mut uow = UnitOfWork::<BudgetUow>::new()?;
        let budget = uow.run(|uow| -> Result<Budget, BudgetError> {
            let mut budget = Budget::create(cmd.title, cmd.currency);
            uow.budgets.save(&mut budget, true)?;
            Ok(budget)
        })?;
        info!(budget = %budget.title, "budget created");
        Ok(budget)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Income,
    Expense,
}

impl FromStr for OperationKind {
    type Err = BudgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(OperationKind::Income),
            "expense" => Ok(OperationKind::Expense),
            _ => Err(BudgetError::InvalidOperation(
                "Budget operation must be income or expense".into(),
            )),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Operation {
    pub source: String,
    pub frequency: Frequency,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub kind: OperationKind,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AddToBudgetCmd {
    pub budget_id: String,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl Command for AddToBudgetCmd {}

/// Apply incomes and expenses to an existing budget, all or nothing.
#[derive(Debug, Default)]
pub struct AddToBudget;

impl UseCase for AddToBudget {
    type Command = AddToBudgetCmd;
    type Output = Budget;
    type Error = BudgetError;
    const NAME: &'static str = "AddToBudget";

    fn inject() -> doca::Result<Self> {
        Ok(Self)
    }

    fn exec(&self, cmd: AddToBudgetCmd) -> Result<Budget, BudgetError> {
        let mut uow = UnitOfWork::<BudgetUow>::new()?;
        uow.run(|uow| -> Result<Budget, BudgetError> {
            let mut budget = uow.budgets.get_by_id(&cmd.budget_id)?;
            for op in &cmd.operations {
                match op.kind {
                    OperationKind::Income => budget.add_income(&op.source, op.frequency, op.amount)?,
                    OperationKind::Expense => budget.add_expense(&op.source, op.frequency, op.amount)?,
                }
            }
            uow.budgets.save(&mut budget, false)?;
            Ok(budget)
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalculateCashFlowCmd {
    pub budget_id: String,
    pub currency: Currency,
}

impl Command for CalculateCashFlowCmd {}

/// Monthly cash flow of a budget, converted to the requested currency.
///
/// Reads through an injected repository without a unit of work.
pub struct CalculateCashFlow {
    exchange_rates: Arc<dyn ExchangeRateService>,
    budgets: Arc<dyn BudgetRepository>,
}

impl UseCase for CalculateCashFlow {
    type Command = CalculateCashFlowCmd;
    type Output = Amount;
    type Error = BudgetError;
    const NAME: &'static str = "CalculateCashFlow";

    fn inject() -> doca::Result<Self> {
        Ok(Self {
            exchange_rates: doca::inject::<dyn ExchangeRateService>()?,
            budgets: doca::inject::<dyn BudgetRepository>()?,
        })
    }

    fn exec(&self, cmd: CalculateCashFlowCmd) -> Result<Amount, BudgetError> {
        let budget = self.budgets.get_by_id(&cmd.budget_id)?;
        let cash_flow = budget.cash_flow_per_month();
        self.exchange_rates
            .convert_currency(cash_flow, budget.currency, cmd.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_kind_parsing() {
        assert_eq!("income".parse::<OperationKind>().ok(), Some(OperationKind::Income));
        assert_eq!("expense".parse::<OperationKind>().ok(), Some(OperationKind::Expense));
        assert!(matches!(
            "refund".parse::<OperationKind>(),
            Err(BudgetError::InvalidOperation(_))
        ));
    }

    #[test]
    fn add_command_from_json() {
        let cmd: AddToBudgetCmd = serde_json::from_str(
            r#"{
                "budget_id": "integration tests",
                "operations": [
                    {"source": "Work", "frequency": "monthly", "amount": 1000000, "type": "income"},
                    {"source": "Mortgage", "frequency": "monthly", "amount": 500000, "type": "expense"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(cmd.operations.len(), 2);
        assert_eq!(cmd.operations[1].kind, OperationKind::Expense);
        assert_eq!(cmd.operations[0].amount.to_string(), "10000.00");
    }
}
