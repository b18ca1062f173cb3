use doca::{DocaError, EntityError};
use thiserror::Error;

use crate::domain::Currency;

#[derive(Debug, Error)]
pub enum BudgetError {
    #[error(transparent)]
    Doca(#[from] DocaError),

    #[error("can not convert from {from} to {to}")]
    UnsupportedConversion { from: Currency, to: Currency },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<EntityError> for BudgetError {
    fn from(err: EntityError) -> Self {
        BudgetError::Doca(err.into())
    }
}

impl BudgetError {
    pub fn entity(&self) -> Option<&EntityError> {
        match self {
            BudgetError::Doca(DocaError::Entity(err)) => Some(err),
            _ => None,
        }
    }
}
