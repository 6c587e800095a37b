use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

use super::error::EngineError;
use super::fees::{PercentageFee, TieredFee};
use super::money::{Currency, Money, Percentage};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BillingPeriod {
    Monthly,
    Quarterly,
    Annual,
}

impl BillingPeriod {
    pub fn months(self) -> u32 {
        match self {
            BillingPeriod::Monthly => 1,
            BillingPeriod::Quarterly => 3,
            BillingPeriod::Annual => 12,
        }
    }

    pub fn closes(self, month: u32) -> bool {
        month % self.months() == 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Broker {
    name: String,
    product: String,
    transaction_fee: Money,
    service_fee: TieredFee,
    billing: BillingPeriod,
    entry_fee: PercentageFee,
    exit_fee: PercentageFee,
    dividend_fee: PercentageFee,
    url: String,
}

impl Broker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        product: impl Into<String>,
        transaction_fee: Money,
        service_fee: TieredFee,
        billing: BillingPeriod,
        entry_fee: PercentageFee,
        exit_fee: PercentageFee,
        dividend_fee: PercentageFee,
        url: impl Into<String>,
    ) -> Broker {
        Broker {
            name: name.into(),
            product: product.into(),
            transaction_fee,
            service_fee,
            billing,
            entry_fee,
            exit_fee,
            dividend_fee,
            url: url.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn billing(&self) -> BillingPeriod {
        self.billing
    }

    pub fn transaction_fee(&self) -> &Money {
        &self.transaction_fee
    }

    pub fn dividend_fee(&self) -> &PercentageFee {
        &self.dividend_fee
    }

    /// Flat transaction fee plus the percentage entry fee on a buy order.
    pub fn entry_costs(&self, order: &Money) -> Result<Money, EngineError> {
        self.transaction_fee.checked_add(self.entry_fee.fee_on(*order))
    }

    /// Exit-side counterpart of `entry_costs`; available for withdrawal
    /// modeling, not exercised by the projection loop.
    pub fn exit_costs(&self, amount: &Money) -> Result<Money, EngineError> {
        self.transaction_fee.checked_add(self.exit_fee.fee_on(*amount))
    }

    /// Service fee for one billing period, computed from the current value.
    pub fn service_fee(&self, value: &Money) -> Result<Money, EngineError> {
        self.service_fee.fee(value, self.billing.months())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fund {
    name: String,
    expense_ratio: Percentage,
    small_caps: bool,
}

impl Fund {
    pub fn new(
        name: impl Into<String>,
        expense_ratio: Percentage,
        small_caps: bool,
    ) -> Result<Fund, EngineError> {
        if expense_ratio.is_negative() {
            return Err(EngineError::InvalidParameter(format!(
                "expense ratio must be non-negative, got {expense_ratio}"
            )));
        }
        Ok(Fund {
            name: name.into(),
            expense_ratio,
            small_caps,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expense_ratio(&self) -> Percentage {
        self.expense_ratio
    }

    pub fn small_caps(&self) -> bool {
        self.small_caps
    }

    /// Monthly growth factor: the fund's expense ratio is subtracted from
    /// the nominal annual rate before taking the twelfth root, so twelve
    /// applications reproduce the net annual rate exactly.
    pub fn monthly_growth_factor(&self, annual_return: Percentage) -> Result<Decimal, EngineError> {
        let net_annual = Decimal::ONE + (annual_return - self.expense_ratio).fraction();
        if net_annual <= Decimal::ZERO {
            return Err(EngineError::InvalidParameter(format!(
                "net annual return of {} leaves no value to grow",
                annual_return - self.expense_ratio
            )));
        }
        Ok(net_annual.powd(Decimal::ONE / dec!(12)))
    }
}

#[derive(Clone, Debug)]
struct Holding {
    fund: Fund,
    allocation: Percentage,
    value: Money,
}

/// A fixed fund allocation plus the value accumulated per fund during a
/// simulation run. Allocations must sum to exactly 100%.
#[derive(Clone, Debug)]
pub struct Portfolio {
    holdings: Vec<Holding>,
    currency: Currency,
}

impl Portfolio {
    pub fn new(
        allocations: Vec<(Fund, Percentage)>,
        currency: Currency,
    ) -> Result<Portfolio, EngineError> {
        if allocations.is_empty() {
            return Err(EngineError::InvalidParameter(
                "portfolio needs at least one fund".to_string(),
            ));
        }

        let mut total = Percentage::ZERO;
        for (fund, allocation) in &allocations {
            if allocation.is_negative() {
                return Err(EngineError::InvalidParameter(format!(
                    "allocation for {} must be non-negative, got {allocation}",
                    fund.name()
                )));
            }
            total = total + *allocation;
        }
        if total.rate() != dec!(100) {
            return Err(EngineError::InvalidParameter(format!(
                "allocations must sum to 100%, got {total}"
            )));
        }

        let holdings = allocations
            .into_iter()
            .map(|(fund, allocation)| Holding {
                fund,
                allocation,
                value: Money::zero(currency),
            })
            .collect();
        Ok(Portfolio { holdings, currency })
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn funds(&self) -> impl Iterator<Item = &Fund> {
        self.holdings.iter().map(|holding| &holding.fund)
    }

    pub fn contains_small_caps(&self) -> bool {
        self.holdings.iter().any(|holding| holding.fund.small_caps())
    }

    pub fn value(&self) -> Money {
        let total = self
            .holdings
            .iter()
            .fold(Decimal::ZERO, |sum, holding| sum + holding.value.amount());
        Money::new(total, self.currency)
    }

    /// Splits `amount` across funds proportionally to their allocations.
    /// The last fund absorbs the remainder so the sum of per-fund shares
    /// reconstructs `amount` exactly.
    pub fn invest(&mut self, amount: Money) -> Result<(), EngineError> {
        if amount.currency() != self.currency {
            return Err(EngineError::CurrencyMismatch {
                left: self.currency,
                right: amount.currency(),
            });
        }
        if amount.is_negative() {
            return Err(EngineError::InvalidParameter(format!(
                "cannot invest a negative amount ({amount})"
            )));
        }

        let mut remainder = amount;
        let last = self.holdings.len() - 1;
        for (index, holding) in self.holdings.iter_mut().enumerate() {
            let share = if index == last {
                remainder
            } else {
                holding.allocation.of(amount)
            };
            holding.value = holding.value.checked_add(share)?;
            remainder = remainder.checked_sub(share)?;
        }
        Ok(())
    }

    pub fn apply_growth(&mut self, factors: &[Decimal]) {
        for (holding, factor) in self.holdings.iter_mut().zip(factors) {
            holding.value = holding.value.times(*factor);
        }
    }

    pub fn monthly_growth_factors(
        &self,
        annual_return: Percentage,
    ) -> Result<Vec<Decimal>, EngineError> {
        self.holdings
            .iter()
            .map(|holding| holding.fund.monthly_growth_factor(annual_return))
            .collect()
    }

    /// Quarterly dividend distribution: a quarter of the annual yield on
    /// each fund's current value, net of the broker's dividend fee,
    /// reinvested into the same fund.
    pub fn distribute_quarterly_dividends(
        &mut self,
        annual_yield: Percentage,
        dividend_fee: &PercentageFee,
    ) -> Result<(), EngineError> {
        let quarterly_fraction = annual_yield.fraction() / dec!(4);
        for holding in &mut self.holdings {
            let dividend = holding.value.times(quarterly_fraction);
            let net = dividend.checked_sub(dividend_fee.fee_on(dividend))?;
            holding.value = holding.value.checked_add(net)?;
        }
        Ok(())
    }

    /// Deducts `amount` pro rata across funds by current value; the last
    /// fund absorbs the rounding remainder.
    pub fn deduct(&mut self, amount: &Money) -> Result<(), EngineError> {
        if amount.currency() != self.currency {
            return Err(EngineError::CurrencyMismatch {
                left: self.currency,
                right: amount.currency(),
            });
        }
        if amount.is_zero() {
            return Ok(());
        }
        let total = self.value().amount();
        if total <= Decimal::ZERO {
            return Ok(());
        }

        let mut remainder = *amount;
        let last = self.holdings.len() - 1;
        for (index, holding) in self.holdings.iter_mut().enumerate() {
            let share = if index == last {
                remainder
            } else {
                amount.times(holding.value.amount() / total)
            };
            holding.value = holding.value.checked_sub(share)?;
            remainder = remainder.checked_sub(share)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        for holding in &mut self.holdings {
            holding.value = Money::zero(self.currency);
        }
    }
}
