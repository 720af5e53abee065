//! Fixed-point money.
//!
//! Amounts are stored as `i64` minor units (e.g. cents) together with the
//! currency they are denominated in. The HTTP layer speaks decimal strings
//! ("40.00"); parsing enforces the currency's minor-unit precision so a
//! request can never smuggle in sub-cent amounts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported currencies.
///
/// Each account is fixed to one currency; conversion is out of scope.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Zar,
    Jpy,
}

impl Currency {
    /// Number of decimal digits in the minor unit (ISO 4217 exponent).
    pub fn exponent(self) -> u32 {
        match self {
            Currency::Jpy => 0,
            _ => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Zar => "ZAR",
            Currency::Jpy => "JPY",
        }
    }

    fn scale(self) -> i64 {
        10i64.pow(self.exponent())
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "ZAR" => Ok(Currency::Zar),
            "JPY" => Ok(Currency::Jpy),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("malformed amount: {0}")]
    Malformed(String),

    #[error("amount exceeds {currency} precision of {exponent} decimal places")]
    PrecisionExceeded { currency: Currency, exponent: u32 },

    #[error("amount out of range")]
    Overflow,

    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },
}

/// An amount of money in a specific currency, in minor units.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    minor: i64,
    currency: Currency,
}

impl Money {
    pub fn from_minor(minor: i64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self { minor: 0, currency }
    }

    pub fn minor(&self) -> i64 {
        self.minor
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    pub fn checked_add(self, other: Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let minor = self.minor.checked_add(other.minor).ok_or(MoneyError::Overflow)?;
        Ok(Money { minor, currency: self.currency })
    }

    fn ensure_same_currency(&self, other: Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }

    /// Parse a decimal string ("40.00") into minor units.
    ///
    /// At most `currency.exponent()` fractional digits are accepted; "40" and
    /// "40.0" are valid USD amounts, "40.005" is not. Signs are rejected —
    /// wire amounts are unsigned, direction is carried separately.
    pub fn parse(input: &str, currency: Currency) -> Result<Money, MoneyError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(MoneyError::Malformed("empty amount".to_string()));
        }
        if s.starts_with('+') || s.starts_with('-') {
            return Err(MoneyError::Malformed("signed amounts are not accepted".to_string()));
        }

        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MoneyError::Malformed(input.to_string()));
        }
        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MoneyError::Malformed(input.to_string()));
        }

        let exponent = currency.exponent();
        if frac_part.len() as u32 > exponent {
            // Trailing zeros beyond the exponent are still precision noise we
            // refuse, matching the strictest reading of "at most the minor
            // unit precision".
            if frac_part[exponent as usize..].bytes().any(|b| b != b'0') || exponent == 0 {
                return Err(MoneyError::PrecisionExceeded { currency, exponent });
            }
        }

        let units: i64 = int_part.parse().map_err(|_| MoneyError::Overflow)?;

        let mut frac: i64 = 0;
        for d in 0..exponent as usize {
            let digit = frac_part.as_bytes().get(d).map(|b| (b - b'0') as i64).unwrap_or(0);
            frac = frac * 10 + digit;
        }

        units
            .checked_mul(currency.scale())
            .and_then(|v| v.checked_add(frac))
            .map(|minor| Money { minor, currency })
            .ok_or(MoneyError::Overflow)
    }
}

impl core::fmt::Display for Money {
    /// Formats as a plain decimal string without the currency code ("40.00").
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let scale = self.currency.scale();
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        let units = abs / scale as u64;
        if self.currency.exponent() == 0 {
            write!(f, "{sign}{units}")
        } else {
            let frac = abs % scale as u64;
            write!(
                f,
                "{sign}{units}.{frac:0width$}",
                width = self.currency.exponent() as usize
            )
        }
    }
}
