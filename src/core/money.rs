use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use super::error::EngineError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Currency([u8; 3]);

impl Currency {
    pub const EUR: Currency = Currency(*b"EUR");
    pub const USD: Currency = Currency(*b"USD");

    pub fn new(code: &str) -> Result<Currency, EngineError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(EngineError::InvalidParameter(format!(
                "currency code must be three uppercase ASCII letters, got {code:?}"
            )));
        }
        Ok(Currency([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn code(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rounding {
    HalfUp,
    HalfEven,
    Down,
}

impl Rounding {
    fn strategy(self) -> RoundingStrategy {
        match self {
            Rounding::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            Rounding::HalfEven => RoundingStrategy::MidpointNearestEven,
            Rounding::Down => RoundingStrategy::ToZero,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RoundingPolicy {
    pub mode: Rounding,
    pub decimals: u32,
}

impl RoundingPolicy {
    pub const fn minor_units(mode: Rounding) -> RoundingPolicy {
        RoundingPolicy { mode, decimals: 2 }
    }
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        RoundingPolicy::minor_units(Rounding::HalfEven)
    }
}

/// Exact decimal amount tagged with a currency. Arithmetic never passes
/// through binary floating point; rounding happens only when a
/// `RoundingPolicy` is applied explicitly.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Money {
        Money { amount, currency }
    }

    pub fn zero(currency: Currency) -> Money {
        Money::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    fn check_currency(&self, other: &Money) -> Result<(), EngineError> {
        if self.currency != other.currency {
            return Err(EngineError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }

    pub fn checked_add(self, other: Money) -> Result<Money, EngineError> {
        self.check_currency(&other)?;
        Ok(Money::new(self.amount + other.amount, self.currency))
    }

    pub fn checked_sub(self, other: Money) -> Result<Money, EngineError> {
        self.check_currency(&other)?;
        Ok(Money::new(self.amount - other.amount, self.currency))
    }

    pub fn times(self, factor: Decimal) -> Money {
        Money::new(self.amount * factor, self.currency)
    }

    pub fn divided_by(self, divisor: Decimal) -> Result<Money, EngineError> {
        if divisor.is_zero() {
            return Err(EngineError::InvalidParameter(
                "division of a monetary amount by zero".to_string(),
            ));
        }
        Ok(Money::new(self.amount / divisor, self.currency))
    }

    pub fn min(self, other: Money) -> Result<Money, EngineError> {
        self.check_currency(&other)?;
        Ok(if other.amount < self.amount { other } else { self })
    }

    pub fn max(self, other: Money) -> Result<Money, EngineError> {
        self.check_currency(&other)?;
        Ok(if other.amount > self.amount { other } else { self })
    }

    pub fn rounded(self, policy: RoundingPolicy) -> Money {
        let mut amount = self
            .amount
            .round_dp_with_strategy(policy.decimals, policy.mode.strategy());
        amount.rescale(policy.decimals);
        Money::new(amount, self.currency)
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Money) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        self.amount.partial_cmp(&other.amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// A rate where `Percentage::new(dec!(7))` means 7%.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Percentage(Decimal);

impl Percentage {
    pub const ZERO: Percentage = Percentage(Decimal::ZERO);

    pub fn new(rate: Decimal) -> Percentage {
        Percentage(rate)
    }

    pub fn rate(&self) -> Decimal {
        self.0
    }

    pub fn fraction(&self) -> Decimal {
        self.0 / dec!(100)
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn of(&self, money: Money) -> Money {
        money.times(self.fraction())
    }
}

impl Add for Percentage {
    type Output = Percentage;

    fn add(self, rhs: Percentage) -> Percentage {
        Percentage(self.0 + rhs.0)
    }
}

impl Sub for Percentage {
    type Output = Percentage;

    fn sub(self, rhs: Percentage) -> Percentage {
        Percentage(self.0 - rhs.0)
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}
