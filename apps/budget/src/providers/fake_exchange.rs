use crate::domain::{Amount, Currency};
use crate::error::BudgetError;
use crate::ports::ExchangeRateService;

/// Fixed CAD rates, in hundredths.
#[derive(Debug, Default)]
pub struct FakeExchangeRateService;

impl FakeExchangeRateService {
    fn rate_from_cad(to: Currency) -> i64 {
        match to {
            Currency::Cad => 100,
            Currency::Eur => 68,
            Currency::Usd => 75,
        }
    }
}

impl ExchangeRateService for FakeExchangeRateService {
    fn convert_currency(&self, amount: Amount, from: Currency, to: Currency) -> Result<Amount, BudgetError> {
        if from != Currency::Cad {
            return Err(BudgetError::UnsupportedConversion { from, to });
        }
        amount
            .checked_scale(Self::rate_from_cad(to), 100)
            .ok_or_else(|| BudgetError::InvalidOperation(format!("cannot convert {amount} to {to}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_from_cad_only() {
        let svc = FakeExchangeRateService;
        let cad = Amount::from_minor(500_000);

        assert_eq!(svc.convert_currency(cad, Currency::Cad, Currency::Usd).unwrap().to_string(), "3750.00");
        assert_eq!(svc.convert_currency(cad, Currency::Cad, Currency::Eur).unwrap().to_string(), "3400.00");
        assert_eq!(svc.convert_currency(cad, Currency::Cad, Currency::Cad).unwrap(), cad);
        assert!(matches!(
            svc.convert_currency(cad, Currency::Usd, Currency::Cad),
            Err(BudgetError::UnsupportedConversion { from: Currency::Usd, .. })
        ));
    }
}
