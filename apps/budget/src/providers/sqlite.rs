//! SQLite budget repository: budgets are JSON documents in the `budgets`
//! collection.

use std::sync::Arc;

use doca::{Entity, EntityError, Tracked};
use sqlite_session::SqliteDatabase;

use crate::domain::Budget;
use crate::ports::BudgetRepository;

const BUDGETS: &str = "budgets";

pub type SqliteBudgetRepo = Tracked<SqliteDatabase>;

pub fn budget_repo(db: SqliteDatabase) -> Arc<dyn BudgetRepository> {
    Tracked::shared(db)
}

impl BudgetRepository for Tracked<SqliteDatabase> {
    fn get_by_id(&self, budget_id: &str) -> doca::Result<Budget> {
        let id = Budget::id_for(budget_id);
        self.typed_session()?
            .get_document::<Budget>(BUDGETS, &id)?
            .ok_or_else(|| EntityError::not_found(Budget::KIND, id).into())
    }

    fn save(&self, budget: &mut Budget, create: bool) -> doca::Result<()> {
        self.track(budget, |budget: &mut Budget| -> doca::Result<()> {
            let session = self.typed_session()?;
            let id = budget.id();
            if create && session.contains(BUDGETS, &id)? {
                return Err(EntityError::already_exists(Budget::KIND, id).into());
            }
            session.put_document(BUDGETS, &id, &*budget)?;
            Ok(())
        })
    }

    fn save_all(&self, budgets: &mut [Budget]) -> doca::Result<()> {
        self.track_all(budgets, |budgets: &mut [Budget]| -> doca::Result<()> {
            let session = self.typed_session()?;
            for budget in budgets.iter() {
                session.put_document(BUDGETS, &budget.id(), budget)?;
            }
            Ok(())
        })
    }
}
