use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::error::EngineError;
use super::money::{Currency, Money, Percentage};

#[derive(Clone, Debug, PartialEq)]
pub struct Tier {
    upper_bound: Option<Money>,
    rate: Percentage,
}

impl Tier {
    pub fn up_to(upper_bound: Money, rate: Percentage) -> Tier {
        Tier {
            upper_bound: Some(upper_bound),
            rate,
        }
    }

    pub fn unbounded(rate: Percentage) -> Tier {
        Tier {
            upper_bound: None,
            rate,
        }
    }

    pub fn upper_bound(&self) -> Option<&Money> {
        self.upper_bound.as_ref()
    }

    pub fn rate(&self) -> Percentage {
        self.rate
    }
}

/// An ordered bracket schedule evaluated marginally: each slice of the value
/// is charged at its bracket's rate and the slices are summed, like
/// progressive income tax. Shared between broker service fees and the
/// wealth tax. A schedule may end with a bounded tier, in which case value
/// above the top bound accrues no fee.
#[derive(Clone, Debug, PartialEq)]
pub struct TieredFee {
    tiers: Vec<Tier>,
}

impl TieredFee {
    pub fn new(tiers: Vec<Tier>) -> Result<TieredFee, EngineError> {
        if tiers.is_empty() {
            return Err(EngineError::UnknownBracket(
                "schedule contains no tiers".to_string(),
            ));
        }

        let mut currency: Option<Currency> = None;
        let mut previous_bound: Option<Decimal> = None;
        let last = tiers.len() - 1;
        for (index, tier) in tiers.iter().enumerate() {
            match tier.upper_bound() {
                Some(bound) => {
                    if let Some(existing) = currency {
                        if existing != bound.currency() {
                            return Err(EngineError::CurrencyMismatch {
                                left: existing,
                                right: bound.currency(),
                            });
                        }
                    }
                    currency = Some(bound.currency());
                    if let Some(previous) = previous_bound {
                        if bound.amount() <= previous {
                            return Err(EngineError::UnknownBracket(format!(
                                "tier bounds must be strictly increasing, {} follows {}",
                                bound.amount(),
                                previous
                            )));
                        }
                    }
                    previous_bound = Some(bound.amount());
                }
                None => {
                    if index != last {
                        return Err(EngineError::UnknownBracket(
                            "only the last tier may be unbounded".to_string(),
                        ));
                    }
                }
            }
            if tier.rate().is_negative() {
                return Err(EngineError::UnknownBracket(format!(
                    "tier rate must be non-negative, got {}",
                    tier.rate()
                )));
            }
        }

        Ok(TieredFee { tiers })
    }

    pub fn flat(rate: Percentage) -> Result<TieredFee, EngineError> {
        TieredFee::new(vec![Tier::unbounded(rate)])
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Marginal-bracket evaluation of the full annual fee on `value`.
    pub fn annual_fee(&self, value: &Money) -> Result<Money, EngineError> {
        let amount = value.amount();
        if amount <= Decimal::ZERO {
            return Ok(Money::zero(value.currency()));
        }

        let mut total = Decimal::ZERO;
        let mut lower = Decimal::ZERO;
        for tier in &self.tiers {
            let slice_top = match tier.upper_bound() {
                Some(bound) => {
                    if bound.currency() != value.currency() {
                        return Err(EngineError::CurrencyMismatch {
                            left: bound.currency(),
                            right: value.currency(),
                        });
                    }
                    amount.min(bound.amount())
                }
                None => amount,
            };
            if slice_top > lower {
                total += (slice_top - lower) * tier.rate().fraction();
            }
            lower = slice_top;
            if lower >= amount {
                break;
            }
        }
        Ok(Money::new(total, value.currency()))
    }

    /// Annual fee prorated to a billing period of `months` months.
    pub fn fee(&self, value: &Money, months: u32) -> Result<Money, EngineError> {
        let annual = self.annual_fee(value)?;
        Ok(annual.times(Decimal::from(months) / dec!(12)))
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PercentageFee {
    rate: Percentage,
}

impl PercentageFee {
    pub fn new(rate: Percentage) -> Result<PercentageFee, EngineError> {
        if rate.is_negative() {
            return Err(EngineError::InvalidParameter(format!(
                "fee rate must be non-negative, got {rate}"
            )));
        }
        Ok(PercentageFee { rate })
    }

    pub fn zero() -> PercentageFee {
        PercentageFee {
            rate: Percentage::ZERO,
        }
    }

    pub fn rate(&self) -> Percentage {
        self.rate
    }

    pub fn fee_on(&self, amount: Money) -> Money {
        self.rate.of(amount)
    }
}

/// Annual progressive tax on net investment value. The first bracket
/// carries rate zero to model the tax-free threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct WealthTax {
    brackets: TieredFee,
}

impl WealthTax {
    pub fn new(brackets: TieredFee) -> WealthTax {
        WealthTax { brackets }
    }

    pub fn exempt() -> Result<WealthTax, EngineError> {
        Ok(WealthTax::new(TieredFee::flat(Percentage::ZERO)?))
    }

    /// Dutch box-3 style brackets: an exempt threshold followed by
    /// progressively heavier rates on the value above it.
    pub fn dutch_box3() -> Result<WealthTax, EngineError> {
        let eur = |amount: Decimal| Money::new(amount, Currency::EUR);
        let brackets = TieredFee::new(vec![
            Tier::up_to(eur(dec!(57000)), Percentage::ZERO),
            Tier::up_to(eur(dec!(1000000)), Percentage::new(dec!(1.2))),
            Tier::unbounded(Percentage::new(dec!(1.6))),
        ])?;
        Ok(WealthTax::new(brackets))
    }

    pub fn tax_on(&self, value: &Money) -> Result<Money, EngineError> {
        self.brackets.annual_fee(value)
    }
}
