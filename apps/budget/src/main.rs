use std::env;
use std::process;

use budget::config::{Config, StorageProvider};
use budget::domain::{Amount, Budget, Currency, Frequency};
use budget::use_cases::{
    AddToBudget, AddToBudgetCmd, CalculateCashFlow, CalculateCashFlowCmd, CreateBudget,
    CreateBudgetCmd, Operation, OperationKind,
};
use budget::BudgetError;
use doca::{execute, EventBus};

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  budget create <title> <currency>\n  budget add <budget-id> income|expense <source> <frequency> <amount>\n  budget cashflow <budget-id> <currency>\n  budget demo\n\nNotes:\n  - STORAGE_PROVIDER=memory (default) keeps data for the current run only; use STORAGE_PROVIDER=sqlite and DB_PATH to persist.\n  - Frequencies: yearly, monthly, semi-monthly, bi-weekly, weekly, daily.",
        budget::about()
    );
}

fn parse<T: std::str::FromStr<Err = String>>(value: Option<String>, what: &str) -> Result<T, String> {
    let Some(value) = value else {
        return Err(format!("missing <{what}>"));
    };
    value.parse()
}

/// Print every event the last command published.
fn print_events() {
    let bus = EventBus::current();
    while let Some(event) = bus.try_take_event() {
        println!("event: {} {:?}", event.name(), event);
    }
}

fn print_budget(budget: &Budget) {
    println!(
        "{} ({}): {} incomes, {} expenses, cash flow {} / month",
        budget.title,
        budget.currency,
        budget.incomes.len(),
        budget.expenses.len(),
        budget.cash_flow_per_month()
    );
}

fn fail(e: BudgetError) -> String {
    e.to_string()
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1); // skip program name

    let Some(cmd) = args.next() else {
        print_usage();
        return Ok(());
    };

    match cmd.as_str() {
        "create" => {
            let Some(title) = args.next() else {
                return Err("missing <title> for create".into());
            };
            let currency: Currency = parse(args.next(), "currency")?;
            let budget = execute::<CreateBudget>(CreateBudgetCmd { title, currency }).map_err(fail)?;
            print_budget(&budget);
            print_events();
            Ok(())
        }
        "add" => {
            let Some(budget_id) = args.next() else {
                return Err("missing <budget-id> for add".into());
            };
            let kind: OperationKind = match args.next() {
                Some(k) => k.parse().map_err(fail)?,
                None => return Err("missing income|expense for add".into()),
            };
            let Some(source) = args.next() else {
                return Err("missing <source> for add".into());
            };
            let frequency: Frequency = parse(args.next(), "frequency")?;
            let amount: Amount = parse(args.next(), "amount")?;

            let op = Operation { source, frequency, amount, kind };
            let budget = execute::<AddToBudget>(AddToBudgetCmd { budget_id, operations: vec![op] })
                .map_err(fail)?;
            print_budget(&budget);
            print_events();
            Ok(())
        }
        "cashflow" => {
            let Some(budget_id) = args.next() else {
                return Err("missing <budget-id> for cashflow".into());
            };
            let currency: Currency = parse(args.next(), "currency")?;
            let cash_flow =
                execute::<CalculateCashFlow>(CalculateCashFlowCmd { budget_id, currency }).map_err(fail)?;
            println!("{cash_flow} {currency}");
            Ok(())
        }
        "demo" => demo().map_err(fail),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

/// Create a budget, add a salary and a mortgage, print the cash flow in USD.
fn demo() -> Result<(), BudgetError> {
    let budget = execute::<CreateBudget>(CreateBudgetCmd {
        title: "Demo".into(),
        currency: Currency::Cad,
    })?;
    print_events();

    let operations = vec![
        Operation {
            source: "Work".into(),
            frequency: Frequency::Monthly,
            amount: Amount::from_minor(1_000_000),
            kind: OperationKind::Income,
        },
        Operation {
            source: "Mortgage".into(),
            frequency: Frequency::Monthly,
            amount: Amount::from_minor(500_000),
            kind: OperationKind::Expense,
        },
    ];
    let budget = execute::<AddToBudget>(AddToBudgetCmd {
        budget_id: Budget::id_for(&budget.title),
        operations,
    })?;
    print_budget(&budget);
    print_events();

    let cash_flow = execute::<CalculateCashFlow>(CalculateCashFlowCmd {
        budget_id: Budget::id_for(&budget.title),
        currency: Currency::Usd,
    })?;
    println!("{cash_flow} {}", Currency::Usd);
    Ok(())
}

fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };

    budget::logging::init_tracing(&cfg);
    if cfg.storage_provider == StorageProvider::Memory {
        tracing::warn!("STORAGE_PROVIDER=memory: budgets are lost when the process exits");
    }

    if let Err(e) = budget::bootstrap(&cfg) {
        eprintln!("bootstrap failed: {e}");
        process::exit(1);
    }

    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
