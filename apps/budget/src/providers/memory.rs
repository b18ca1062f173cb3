//! In-memory budget repository.

use std::sync::Arc;

use doca::adapters::memory::MemoryStore;
use doca::{Entity, EntityError, Tracked};

use crate::domain::Budget;
use crate::ports::BudgetRepository;

const BUDGETS: &str = "budgets";

pub type InMemoryBudgetRepo = Tracked<MemoryStore>;

/// A repository over the process-wide memory database `db_name`.
pub fn budget_repo(db_name: &str) -> Arc<dyn BudgetRepository> {
    Tracked::shared(MemoryStore::named(db_name))
}

impl BudgetRepository for Tracked<MemoryStore> {
    fn get_by_id(&self, budget_id: &str) -> doca::Result<Budget> {
        let id = Budget::id_for(budget_id);
        self.typed_session()?
            .get::<Budget>(BUDGETS, &id)?
            .ok_or_else(|| EntityError::not_found(Budget::KIND, id).into())
    }

    fn save(&self, budget: &mut Budget, create: bool) -> doca::Result<()> {
        self.track(budget, |budget: &mut Budget| -> doca::Result<()> {
            let session = self.typed_session()?;
            let id = budget.id();
            if create && session.contains(BUDGETS, &id)? {
                return Err(EntityError::already_exists(Budget::KIND, id).into());
            }
            session.put(BUDGETS, &id, budget.clone())?;
            Ok(())
        })
    }

    fn save_all(&self, budgets: &mut [Budget]) -> doca::Result<()> {
        self.track_all(budgets, |budgets: &mut [Budget]| -> doca::Result<()> {
            let session = self.typed_session()?;
            for budget in budgets.iter() {
                session.put(BUDGETS, &budget.id(), budget.clone())?;
            }
            Ok(())
        })
    }
}
