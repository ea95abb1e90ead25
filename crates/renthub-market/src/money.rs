//! Money type for prices and payment amounts.
//!
//! Amounts are held in the smallest unit of the currency and parsed from
//! decimal strings without going through floating point.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::MarketError;

/// Currencies accepted for listings and payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Currency {
    #[default]
    CAD,
    USD,
    EUR,
    GBP,
    JPY,
}

impl Currency {
    /// Get the currency code (e.g., "CAD").
    pub fn code(&self) -> &'static str {
        match self {
            Currency::CAD => "CAD",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
        }
    }

    /// Get the currency symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::CAD => "CA$",
            Currency::USD => "$",
            Currency::EUR => "\u{20ac}",
            Currency::GBP => "\u{00a3}",
            Currency::JPY => "\u{00a5}",
        }
    }

    /// Number of decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Parse a currency code string.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "CAD" => Some(Currency::CAD),
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "JPY" => Some(Currency::JPY),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A monetary value with currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Money {
    /// Amount in smallest currency unit (e.g., cents).
    pub amount_cents: i64,
    /// The currency.
    pub currency: Currency,
}

impl Money {
    /// Create a Money value from cents.
    pub fn new(amount_cents: i64, currency: Currency) -> Self {
        Self {
            amount_cents,
            currency,
        }
    }

    /// Parse a decimal amount such as `"12.5"` or `"-3.00"`.
    ///
    /// ```
    /// use renthub_market::money::{Currency, Money};
    /// let price = Money::parse("49.9", Currency::CAD).unwrap();
    /// assert_eq!(price.amount_cents, 4990);
    /// ```
    pub fn parse(amount: &str, currency: Currency) -> Result<Self, MarketError> {
        let invalid = || MarketError::Validation(format!("invalid amount: {:?}", amount));

        let trimmed = amount.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

        let places = currency.decimal_places() as usize;
        if whole.is_empty() && fraction.is_empty()
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
            || fraction.len() > places
        {
            return Err(invalid());
        }

        let scale = 10_i64.pow(places as u32);
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let fraction: i64 = if fraction.is_empty() {
            0
        } else {
            format!("{:0<width$}", fraction, width = places)
                .parse()
                .map_err(|_| invalid())?
        };

        let cents = whole
            .checked_mul(scale)
            .and_then(|v| v.checked_add(fraction))
            .ok_or_else(invalid)?;
        Ok(Self::new(if negative { -cents } else { cents }, currency))
    }

    /// Create a zero amount in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Check if this is negative.
    pub fn is_negative(&self) -> bool {
        self.amount_cents < 0
    }

    /// Convert to a decimal value for display and indexing.
    pub fn to_decimal(&self) -> f64 {
        let divisor = 10_i64.pow(self.currency.decimal_places());
        self.amount_cents as f64 / divisor as f64
    }

    /// Format as a display string (e.g., "CA$49.99").
    pub fn display(&self) -> String {
        format!("{}{}", self.currency.symbol(), self.display_amount())
    }

    /// Format without symbol (e.g., "49.99").
    pub fn display_amount(&self) -> String {
        let places = self.currency.decimal_places() as usize;
        format!("{:.places$}", self.to_decimal())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.display_amount(), self.currency.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amounts() {
        assert_eq!(Money::parse("12", Currency::CAD).unwrap().amount_cents, 1200);
        assert_eq!(Money::parse("12.5", Currency::CAD).unwrap().amount_cents, 1250);
        assert_eq!(Money::parse(" 0.07 ", Currency::USD).unwrap().amount_cents, 7);
        assert_eq!(Money::parse(".5", Currency::USD).unwrap().amount_cents, 50);
        assert_eq!(Money::parse("-3.00", Currency::USD).unwrap().amount_cents, -300);
        assert_eq!(Money::parse("300", Currency::JPY).unwrap().amount_cents, 300);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Money::parse("", Currency::CAD).is_err());
        assert!(Money::parse("abc", Currency::CAD).is_err());
        assert!(Money::parse("1.234", Currency::CAD).is_err());
        assert!(Money::parse("1.5", Currency::JPY).is_err());
        assert!(Money::parse("1e5", Currency::CAD).is_err());
    }

    #[test]
    fn test_display() {
        let m = Money::new(4999, Currency::USD);
        assert_eq!(m.display(), "$49.99");
        assert_eq!(m.to_string(), "49.99 USD");
    }

    #[test]
    fn test_currency_codes() {
        assert_eq!(Currency::from_code("cad"), Some(Currency::CAD));
        assert_eq!(Currency::from_code("XYZ"), None);
    }
}
