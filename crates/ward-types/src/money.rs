//! Integer-minor-units money arithmetic.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Currency {
    pub code: String,
    /// Minor-unit exponent; `factor() == 10^exponent`.
    pub exponent: u8,
}

impl Currency {
    pub fn new(code: impl Into<String>, exponent: u8) -> Self {
        Self {
            code: code.into(),
            exponent,
        }
    }

    pub fn factor(&self) -> i64 {
        10i64.pow(self.exponent as u32)
    }

    pub fn usd() -> Self {
        Self::new("USD", 2)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("currency mismatch: {0} vs {1}")]
    CurrencyMismatch(String, String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    Overflow,
    #[error("malformed money amount `{0}`")]
    Malformed(String),
}

/// An integer amount in minor units, paired with its [`Currency`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    fn checked_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency.code != other.currency.code {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.code.clone(),
                other.currency.code.clone(),
            ));
        }
        Ok(())
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.checked_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    pub fn sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.checked_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    pub fn divide(&self, divisor: i64) -> Result<Money, MoneyError> {
        if divisor == 0 {
            return Err(MoneyError::DivisionByZero);
        }
        Ok(Money::new(self.amount / divisor, self.currency.clone()))
    }

    /// Formats as a fixed-point decimal string, e.g. `12.34 USD`.
    pub fn format(&self) -> String {
        let factor = self.currency.factor();
        let whole = self.amount / factor;
        let frac = (self.amount % factor).abs();
        format!(
            "{whole}.{frac:0width$} {code}",
            width = self.currency.exponent as usize,
            code = self.currency.code
        )
    }

    /// Parses the output of [`Money::format`] back into a `Money`.
    pub fn parse(s: &str, exponent: u8) -> Result<Money, MoneyError> {
        let mut parts = s.trim().splitn(2, ' ');
        let number = parts.next().ok_or_else(|| MoneyError::Malformed(s.to_string()))?;
        let code = parts
            .next()
            .ok_or_else(|| MoneyError::Malformed(s.to_string()))?
            .to_string();

        let negative = number.starts_with('-');
        let mut num_parts = number.trim_start_matches('-').splitn(2, '.');
        let whole: i64 = num_parts
            .next()
            .unwrap_or("0")
            .parse()
            .map_err(|_| MoneyError::Malformed(s.to_string()))?;
        let frac_str = num_parts.next().unwrap_or("0");
        let frac: i64 = frac_str
            .parse()
            .map_err(|_| MoneyError::Malformed(s.to_string()))?;

        let factor = 10i64.pow(exponent as u32);
        let frac_factor = 10i64.pow(frac_str.len() as u32);
        let scaled_frac = frac * (factor / frac_factor.max(1));

        let amount = whole * factor + scaled_frac;
        let amount = if negative { -amount } else { amount };

        Ok(Money::new(amount, Currency::new(code, exponent)))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}
