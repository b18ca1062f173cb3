//! Budget domain: a budget is a set of recurring incomes and expenses in one
//! currency.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use doca::{utc_now, AggregateRoot, Entity, EntityError, Event, PendingEvents};
use serde::{Deserialize, Serialize};

/// ISO 4217 currency codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "CAD")]
    Cad,
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "USD")]
    Usd,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Cad => "CAD",
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Currency::Cad => "Canadian dollar",
            Currency::Eur => "Euro",
            Currency::Usd => "United States dollar",
        }
    }
}

impl FromStr for Currency {
    type Err = String;

    /// Accepts the code or the full name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Currency::Cad, Currency::Eur, Currency::Usd]
            .into_iter()
            .find(|c| s.eq_ignore_ascii_case(c.code()) || s.eq_ignore_ascii_case(c.name()))
            .ok_or_else(|| format!("unknown currency '{s}'"))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// How many times per year an income or expense occurs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Yearly,
    Monthly,
    SemiMonthly,
    BiWeekly,
    Weekly,
    Daily,
}

impl Frequency {
    pub fn per_year(&self) -> i64 {
        match self {
            Frequency::Yearly => 1,
            Frequency::Monthly => 12,
            Frequency::SemiMonthly => 24,
            Frequency::BiWeekly => 26,
            Frequency::Weekly => 52,
            Frequency::Daily => 365,
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "yearly" => Ok(Frequency::Yearly),
            "monthly" => Ok(Frequency::Monthly),
            "semi_monthly" => Ok(Frequency::SemiMonthly),
            "bi_weekly" => Ok(Frequency::BiWeekly),
            "weekly" => Ok(Frequency::Weekly),
            "daily" => Ok(Frequency::Daily),
            _ => Err(format!("unknown frequency '{s}'")),
        }
    }
}

/// Money in minor units (cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    /// `self * num / den`, rounded half away from zero; `None` when `den`
    /// is zero.
    pub fn checked_scale(&self, num: i64, den: i64) -> Option<Amount> {
        if den == 0 {
            return None;
        }
        Some(Amount(div_round(i128::from(self.0) * i128::from(num), i128::from(den))))
    }
}

fn div_round(n: i128, d: i128) -> i64 {
    let q = n / d;
    let r = n % d;
    let q = if 2 * r.abs() >= d.abs() { q + n.signum() * d.signum() } else { q };
    i64::try_from(q).unwrap_or(if q > 0 { i64::MAX } else { i64::MIN })
}

impl FromStr for Amount {
    type Err = String;

    /// Parses `"10000"`, `"12.5"` or `"-3.25"`; at most two decimals.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid amount '{s}'");
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() || frac.len() > 2 || !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac: i64 = format!("{frac:0<2}").parse().map_err(|_| invalid())?;
        let minor = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(invalid)?;
        Ok(Amount(if negative { -minor } else { minor }))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Money a person or entity receives in exchange for their labor or investment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Income {
    pub source: String,
    pub frequency: Frequency,
    pub amount: Amount,
}

impl Entity for Income {
    type Id = String;
    const KIND: &'static str = "Income";

    fn id(&self) -> String {
        self.source.to_lowercase()
    }
}

/// Payment for an item, service, or other category of costs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub source: String,
    pub frequency: Frequency,
    pub price: Amount,
}

impl Entity for Expense {
    type Id = String;
    const KIND: &'static str = "Expense";

    fn id(&self) -> String {
        self.source.to_lowercase()
    }
}

#[derive(Clone, Debug)]
pub struct BudgetCreated {
    pub budget_id: String,
    pub title: String,
    pub currency: Currency,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct IncomeAdded {
    pub budget_id: String,
    pub source: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct ExpenseAdded {
    pub budget_id: String,
    pub source: String,
    pub at: DateTime<Utc>,
}

impl Event for BudgetCreated {
    fn timestamp(&self) -> DateTime<Utc> {
        self.at
    }
}

impl Event for IncomeAdded {
    fn timestamp(&self) -> DateTime<Utc> {
        self.at
    }
}

impl Event for ExpenseAdded {
    fn timestamp(&self) -> DateTime<Utc> {
        self.at
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Budget {
    pub title: String,
    pub currency: Currency,
    #[serde(default)]
    pub incomes: Vec<Income>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(skip)]
    events: PendingEvents,
}

impl Budget {
    /// Budget ids are the lower-cased title.
    pub fn id_for(title: &str) -> String {
        title.to_lowercase()
    }

    /// Start a new, empty budget.
    pub fn create(title: impl Into<String>, currency: Currency) -> Self {
        let mut budget = Self {
            title: title.into(),
            currency,
            incomes: Vec::new(),
            expenses: Vec::new(),
            events: PendingEvents::new(),
        };
        budget.add_event(BudgetCreated {
            budget_id: budget.id(),
            title: budget.title.clone(),
            currency,
            at: utc_now(),
        });
        budget
    }

    pub fn add_income(&mut self, source: &str, frequency: Frequency, amount: Amount) -> Result<(), EntityError> {
        let income = Income { source: source.to_string(), frequency, amount };
        if self.incomes.iter().any(|i| i.same_identity(&income)) {
            return Err(EntityError::already_exists(Income::KIND, income.id()));
        }
        self.incomes.push(income);
        self.add_event(IncomeAdded { budget_id: self.id(), source: source.to_string(), at: utc_now() });
        Ok(())
    }

    pub fn add_expense(&mut self, source: &str, frequency: Frequency, price: Amount) -> Result<(), EntityError> {
        let expense = Expense { source: source.to_string(), frequency, price };
        if self.expenses.iter().any(|e| e.same_identity(&expense)) {
            return Err(EntityError::already_exists(Expense::KIND, expense.id()));
        }
        self.expenses.push(expense);
        self.add_event(ExpenseAdded { budget_id: self.id(), source: source.to_string(), at: utc_now() });
        Ok(())
    }

    /// Net amount per month: yearly incomes minus yearly expenses, over 12.
    pub fn cash_flow_per_month(&self) -> Amount {
        let incomes: i128 = self
            .incomes
            .iter()
            .map(|i| i128::from(i.amount.minor()) * i128::from(i.frequency.per_year()))
            .sum();
        let expenses: i128 = self
            .expenses
            .iter()
            .map(|e| i128::from(e.price.minor()) * i128::from(e.frequency.per_year()))
            .sum();
        Amount(div_round(incomes - expenses, 12))
    }
}

impl PartialEq for Budget {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.currency == other.currency
            && self.incomes == other.incomes
            && self.expenses == other.expenses
    }
}

impl Entity for Budget {
    type Id = String;
    const KIND: &'static str = "Budget";

    fn id(&self) -> String {
        Self::id_for(&self.title)
    }
}

impl AggregateRoot for Budget {
    fn pending(&self) -> &PendingEvents {
        &self.events
    }

    fn pending_mut(&mut self) -> &mut PendingEvents {
        &mut self.events
    }
}
