use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use budget::config::{Config, StorageProvider};
use budget::domain::{Amount, Budget, BudgetCreated, Currency, ExpenseAdded, Frequency, IncomeAdded};
use budget::ports::{BudgetRepository, ExchangeRateService};
use budget::providers::FakeExchangeRateService;
use budget::use_cases::{
    AddToBudget, AddToBudgetCmd, CalculateCashFlow, CalculateCashFlowCmd, CreateBudget,
    CreateBudgetCmd, Operation, OperationKind,
};
use budget::BudgetError;
use doca::adapters::memory::MemoryDatabase;
use doca::{execute, inject, DocaError, EntityError, EventBus, EventRef};

static BINDINGS: Mutex<()> = Mutex::new(());

/// Serialize tests (the binding table is process-wide) and bind a fresh
/// in-memory database called `db`.
fn setup(db: &str) -> MutexGuard<'static, ()> {
    let guard = BINDINGS.lock().unwrap_or_else(PoisonError::into_inner);
    doca::clear();
    MemoryDatabase::drop_named(db);
    EventBus::reset_current();
    let cfg = Config { memory_db: db.into(), ..Config::default() };
    budget::bootstrap(&cfg).unwrap();
    guard
}

fn drain(bus: &EventBus) -> Vec<EventRef> {
    std::iter::from_fn(|| bus.try_take_event()).collect()
}

fn create(title: &str) -> Result<Budget, BudgetError> {
    execute::<CreateBudget>(CreateBudgetCmd { title: title.into(), currency: Currency::Cad })
}

fn salary_and_mortgage(budget_id: &str) -> AddToBudgetCmd {
    AddToBudgetCmd {
        budget_id: budget_id.into(),
        operations: vec![
            Operation {
                source: "Work".into(),
                frequency: Frequency::Monthly,
                amount: "10000".parse().unwrap(),
                kind: OperationKind::Income,
            },
            Operation {
                source: "Mortgage".into(),
                frequency: Frequency::Monthly,
                amount: "5000".parse().unwrap(),
                kind: OperationKind::Expense,
            },
        ],
    }
}

#[test]
fn create_budget_stores_it_and_publishes_one_event() {
    let _guard = setup("e2e-create");

    let created = create("Integration Tests").unwrap();

    let stored = inject::<dyn BudgetRepository>().unwrap().get_by_id("integration tests").unwrap();
    assert_eq!(stored, created);
    assert_eq!(stored.title, "Integration Tests");
    assert_eq!(stored.currency, Currency::Cad);
    assert!(stored.incomes.is_empty() && stored.expenses.is_empty());

    let events = drain(&EventBus::current());
    assert_eq!(events.len(), 1);
    let created_event = events[0].downcast_ref::<BudgetCreated>().map(|e| e.budget_id.clone());
    assert_eq!(created_event.as_deref(), Some("integration tests"));
}

#[test]
fn creating_an_existing_budget_fails_and_commits_nothing() {
    let _guard = setup("e2e-duplicate");
    create("Home").unwrap();
    drain(&EventBus::current());

    let err = create("HOME").unwrap_err();

    assert!(matches!(err.entity(), Some(EntityError::AlreadyExists { kind: "Budget", .. })));
    assert_eq!(err.to_string(), "Budget home already exists");
    assert!(EventBus::current().is_empty());
    assert_eq!(MemoryDatabase::named("e2e-duplicate").count("budgets").unwrap(), 1);
}

#[test]
fn operations_then_cash_flow_in_usd() {
    let _guard = setup("e2e-cashflow");
    create("Integration Tests").unwrap();

    let budget = execute::<AddToBudget>(salary_and_mortgage("integration tests")).unwrap();
    assert_eq!(budget.incomes.len(), 1);
    assert_eq!(budget.expenses.len(), 1);

    let events = drain(&EventBus::current());
    assert_eq!(events.len(), 3);
    assert!(events[0].is::<BudgetCreated>());
    assert!(events[1].is::<IncomeAdded>());
    assert!(events[2].is::<ExpenseAdded>());

    let cash_flow = execute::<CalculateCashFlow>(CalculateCashFlowCmd {
        budget_id: "integration tests".into(),
        currency: Currency::Usd,
    })
    .unwrap();
    assert_eq!(cash_flow.to_string(), "3750.00");
}

#[test]
fn failing_operation_rolls_back_the_whole_command() {
    let _guard = setup("e2e-atomic");
    create("Home").unwrap();
    execute::<AddToBudget>(salary_and_mortgage("home")).unwrap();
    drain(&EventBus::current());

    // "Bonus" is new but "Work" is already an income of the budget.
    let mut cmd = salary_and_mortgage("home");
    cmd.operations.truncate(1);
    cmd.operations.insert(
        0,
        Operation {
            source: "Bonus".into(),
            frequency: Frequency::Yearly,
            amount: Amount::from_minor(100_000),
            kind: OperationKind::Income,
        },
    );
    let err = execute::<AddToBudget>(cmd).unwrap_err();

    assert!(matches!(err.entity(), Some(EntityError::AlreadyExists { kind: "Income", .. })));
    assert!(EventBus::current().is_empty());
    let stored = inject::<dyn BudgetRepository>().unwrap().get_by_id("home").unwrap();
    assert_eq!(stored.incomes.len(), 1);
}

#[test]
fn adding_to_a_missing_budget_is_not_found() {
    let _guard = setup("e2e-missing");

    let err = execute::<AddToBudget>(salary_and_mortgage("nope")).unwrap_err();

    assert!(matches!(err, BudgetError::Doca(DocaError::Entity(EntityError::NotFound { .. }))));
}

#[test]
fn commit_failure_publishes_no_events() {
    let _guard = setup("e2e-commit-failure");
    MemoryDatabase::named("e2e-commit-failure").fail_commits(true);

    let err = create("Home").unwrap_err();

    assert!(matches!(err, BudgetError::Doca(DocaError::Session(_))));
    assert!(EventBus::current().is_empty());
    MemoryDatabase::named("e2e-commit-failure").fail_commits(false);
}

struct HalfRate;

impl ExchangeRateService for HalfRate {
    fn convert_currency(&self, amount: Amount, _: Currency, _: Currency) -> Result<Amount, BudgetError> {
        amount
            .checked_scale(1, 2)
            .ok_or_else(|| BudgetError::InvalidOperation("cannot halve".into()))
    }
}

#[test]
fn rebinding_a_port_replaces_the_adapter() {
    let _guard = setup("e2e-rebind");
    create("Home").unwrap();
    execute::<AddToBudget>(salary_and_mortgage("home")).unwrap();

    let half: Arc<dyn ExchangeRateService> = Arc::new(HalfRate);
    doca::bind_instance::<dyn ExchangeRateService>(Arc::clone(&half));
    assert!(Arc::ptr_eq(&inject::<dyn ExchangeRateService>().unwrap(), &half));

    let cash_flow = execute::<CalculateCashFlow>(CalculateCashFlowCmd {
        budget_id: "home".into(),
        currency: Currency::Usd,
    })
    .unwrap();
    assert_eq!(cash_flow.to_string(), "2500.00");

    doca::bind_instance::<dyn ExchangeRateService>(Arc::new(FakeExchangeRateService));
}

#[test]
fn unconfigured_port_fails_the_use_case() {
    let _guard = setup("e2e-unconfigured");
    doca::clear();

    let err = execute::<CalculateCashFlow>(CalculateCashFlowCmd {
        budget_id: "home".into(),
        currency: Currency::Usd,
    })
    .err()
    .unwrap();

    assert_eq!(err.to_string(), "adapter for ExchangeRateService port not configured");
}

#[test]
fn sqlite_storage_end_to_end() {
    let _guard = setup("e2e-sqlite-unused");
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config {
        storage_provider: StorageProvider::Sqlite,
        db_path: dir.path().join("budget.db"),
        ..Config::default()
    };
    budget::bootstrap(&cfg).unwrap();

    create("Integration Tests").unwrap();
    assert!(create("integration tests").is_err());
    execute::<AddToBudget>(salary_and_mortgage("integration tests")).unwrap();
    let cash_flow = execute::<CalculateCashFlow>(CalculateCashFlowCmd {
        budget_id: "integration tests".into(),
        currency: Currency::Eur,
    })
    .unwrap();

    assert_eq!(cash_flow.to_string(), "3400.00");
    assert_eq!(drain(&EventBus::current()).len(), 3);
}

#[tokio::test]
async fn events_reach_an_async_consumer_of_the_task_bus() {
    let guard = setup("e2e-async");
    let bus = EventBus::new();

    let consumer = {
        let bus = bus.clone();
        tokio::spawn(async move { bus.take_event().await })
    };
    let created = bus
        .clone()
        .scope(async { create("Async") })
        .await
        .unwrap();

    let event = consumer.await.unwrap();
    assert_eq!(
        event.downcast_ref::<BudgetCreated>().map(|e| e.title.clone()),
        Some(created.title)
    );
    assert!(EventBus::current().is_empty());
    drop(guard);
}
