use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode, Zero};

use super::errors::MoneyError;

/// An immutable, non-negative amount in a single currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Money {
    amount: BigDecimal,
    currency: String,
}

impl Money {
    pub fn new(amount: BigDecimal, currency: &str) -> Result<Self, MoneyError> {
        if amount < BigDecimal::zero() {
            return Err(MoneyError::Negative(amount.to_string()));
        }
        Ok(Self {
            amount,
            currency: currency.trim().to_uppercase(),
        })
    }

    pub fn zero(currency: &str) -> Self {
        Self {
            amount: BigDecimal::zero(),
            currency: currency.trim().to_uppercase(),
        }
    }

    /// Parse a decimal string as sent by the store API, e.g. `"19.99"`.
    pub fn parse(amount: &str, currency: &str) -> Result<Self, MoneyError> {
        let trimmed = amount.trim();
        let value = BigDecimal::from_str(trimmed)
            .map_err(|_| MoneyError::Malformed(amount.to_string()))?;
        Self::new(value, currency)
    }

    pub fn amount(&self) -> &BigDecimal {
        &self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount > BigDecimal::zero()
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(Money {
            amount: &self.amount + &other.amount,
            currency: self.currency.clone(),
        })
    }

    pub fn multiply(&self, factor: &BigDecimal) -> Result<Money, MoneyError> {
        Money::new(&self.amount * factor, &self.currency)
    }

    /// Two-decimal representation used on the wire, e.g. `"10.00"`.
    pub fn to_store_format(&self) -> String {
        self.amount
            .with_scale_round(2, RoundingMode::HalfUp)
            .to_string()
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_store_format(), self.currency)
    }
}
