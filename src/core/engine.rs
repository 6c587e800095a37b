use super::error::EngineError;
use super::fees::WealthTax;
use super::money::{Money, Percentage};
use super::types::{Broker, Portfolio};

const MONTHS_PER_QUARTER: u32 = 3;
const MONTHS_PER_YEAR: u32 = 12;

/// Month-stepped projection of a recurring investment plan under one
/// broker's fee schedule. `run` may be called exactly once; build a new
/// `Simulation` with a fresh `Portfolio` for every scenario.
#[derive(Debug)]
pub struct Simulation<'a> {
    wealth_tax: &'a WealthTax,
    broker: &'a Broker,
    portfolio: Portfolio,
    initial: Money,
    monthly: Money,
    annual_return: Percentage,
    dividend_yield: Percentage,
    total_service_fees: Money,
    total_taxes_paid: Money,
    contributed: Money,
    completed: bool,
}

impl<'a> Simulation<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wealth_tax: &'a WealthTax,
        broker: &'a Broker,
        portfolio: Portfolio,
        initial: Money,
        monthly: Money,
        annual_return: Percentage,
        dividend_yield: Percentage,
    ) -> Result<Simulation<'a>, EngineError> {
        let currency = portfolio.currency();
        for amount in [&initial, &monthly, broker.transaction_fee()] {
            if amount.currency() != currency {
                return Err(EngineError::CurrencyMismatch {
                    left: currency,
                    right: amount.currency(),
                });
            }
        }
        if initial.is_negative() || monthly.is_negative() {
            return Err(EngineError::InvalidParameter(
                "contributions must be non-negative".to_string(),
            ));
        }
        if annual_return.is_negative() {
            return Err(EngineError::InvalidParameter(format!(
                "expected annual return must be non-negative, got {annual_return}"
            )));
        }
        if dividend_yield.is_negative() {
            return Err(EngineError::InvalidParameter(format!(
                "expected dividend yield must be non-negative, got {dividend_yield}"
            )));
        }

        Ok(Simulation {
            wealth_tax,
            broker,
            portfolio,
            initial,
            monthly,
            annual_return,
            dividend_yield,
            total_service_fees: Money::zero(currency),
            total_taxes_paid: Money::zero(currency),
            contributed: Money::zero(currency),
            completed: false,
        })
    }

    /// Projects the plan over `years`. Validation happens up front so the
    /// run either completes fully or fails before touching the portfolio.
    pub fn run(&mut self, years: u32) -> Result<(), EngineError> {
        if self.completed {
            return Err(EngineError::AlreadyRun);
        }
        if years == 0 || years > 100 {
            return Err(EngineError::InvalidParameter(
                "years must be between 1 and 100".to_string(),
            ));
        }

        let growth_factors = self.portfolio.monthly_growth_factors(self.annual_return)?;
        for contribution in [self.initial, self.monthly] {
            if contribution.is_zero() {
                continue;
            }
            let costs = self.broker.entry_costs(&contribution)?;
            if contribution.checked_sub(costs)?.is_negative() {
                return Err(EngineError::InvalidParameter(format!(
                    "entry costs of {costs} exceed the contribution of {contribution}"
                )));
            }
        }

        for month in 1..=years * MONTHS_PER_YEAR {
            let contribution = if month == 1 { self.initial } else { self.monthly };
            // No buy order is placed for a zero contribution, so no
            // transaction costs accrue in months without a deposit.
            if !contribution.is_zero() {
                self.contributed = self.contributed.checked_add(contribution)?;
                let order = contribution.checked_sub(self.broker.entry_costs(&contribution)?)?;
                self.portfolio.invest(order)?;
            }
            self.portfolio.apply_growth(&growth_factors);

            if month % MONTHS_PER_QUARTER == 0 {
                self.portfolio
                    .distribute_quarterly_dividends(self.dividend_yield, self.broker.dividend_fee())?;
            }
            if self.broker.billing().closes(month) {
                let fee = self.broker.service_fee(&self.portfolio.value())?;
                self.portfolio.deduct(&fee)?;
                self.total_service_fees = self.total_service_fees.checked_add(fee)?;
            }
            if month % MONTHS_PER_YEAR == 0 {
                let tax = self.wealth_tax.tax_on(&self.portfolio.value())?;
                self.portfolio.deduct(&tax)?;
                self.total_taxes_paid = self.total_taxes_paid.checked_add(tax)?;
            }
        }

        self.completed = true;
        Ok(())
    }

    pub fn portfolio_value(&self) -> Money {
        self.portfolio.value()
    }

    pub fn total_service_fees(&self) -> Money {
        self.total_service_fees
    }

    pub fn total_taxes_paid(&self) -> Money {
        self.total_taxes_paid
    }

    /// Sum of all deposits before fees: the initial contribution plus
    /// `12 * years - 1` monthly contributions.
    pub fn total_contributed(&self) -> Money {
        self.contributed
    }

    pub fn net_result(&self) -> Result<Money, EngineError> {
        self.portfolio.value().checked_sub(self.contributed)
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fees::{PercentageFee, Tier, TieredFee};
    use crate::core::money::{Currency, RoundingPolicy};
    use crate::core::types::{BillingPeriod, Fund};
    use proptest::prelude::*;
    use proptest::test_runner::Config;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn eur(amount: Decimal) -> Money {
        Money::new(amount, Currency::EUR)
    }

    fn pct(rate: Decimal) -> Percentage {
        Percentage::new(rate)
    }

    fn flat_broker(service_rate: Decimal) -> Broker {
        Broker::new(
            "Test Broker",
            "Test Product",
            eur(dec!(0)),
            TieredFee::flat(pct(service_rate)).expect("valid schedule"),
            BillingPeriod::Quarterly,
            PercentageFee::zero(),
            PercentageFee::zero(),
            PercentageFee::zero(),
            "https://broker.test",
        )
    }

    fn single_fund_portfolio(expense_ratio: Decimal) -> Portfolio {
        Portfolio::new(
            vec![(
                Fund::new("Test Fund", pct(expense_ratio), false).expect("valid fund"),
                pct(dec!(100)),
            )],
            Currency::EUR,
        )
        .expect("valid portfolio")
    }

    struct ScenarioOutcome {
        value: Decimal,
        service_fees: Decimal,
        taxes: Decimal,
    }

    #[allow(clippy::too_many_arguments)]
    fn run_scenario(
        initial: Decimal,
        monthly: Decimal,
        expense_ratio: Decimal,
        annual_return: Decimal,
        dividend_yield: Decimal,
        service_rate: Decimal,
        years: u32,
    ) -> ScenarioOutcome {
        let wealth_tax = WealthTax::dutch_box3().expect("valid brackets");
        let broker = flat_broker(service_rate);
        let portfolio = single_fund_portfolio(expense_ratio);
        let mut simulation = Simulation::new(
            &wealth_tax,
            &broker,
            portfolio,
            eur(initial),
            eur(monthly),
            pct(annual_return),
            pct(dividend_yield),
        )
        .expect("valid configuration");
        simulation.run(years).expect("first run succeeds");

        let policy = RoundingPolicy::default();
        ScenarioOutcome {
            value: simulation.portfolio_value().rounded(policy).amount(),
            service_fees: simulation.total_service_fees().rounded(policy).amount(),
            taxes: simulation.total_taxes_paid().rounded(policy).amount(),
        }
    }

    #[test]
    fn initial_deposit_without_rates_is_preserved() {
        let outcome = run_scenario(dec!(1000), dec!(0), dec!(0), dec!(0), dec!(0), dec!(0), 1);
        assert_eq!(outcome.value, dec!(1000.00));
        assert_eq!(outcome.service_fees, dec!(0.00));
    }

    #[test]
    fn monthly_deposits_accumulate_without_rates() {
        let outcome = run_scenario(dec!(1000), dec!(100), dec!(0), dec!(0), dec!(0), dec!(0), 1);
        assert_eq!(outcome.value, dec!(2100.00));

        let outcome = run_scenario(dec!(1000), dec!(100), dec!(0), dec!(0), dec!(0), dec!(0), 2);
        assert_eq!(outcome.value, dec!(3300.00));
    }

    #[test]
    fn growth_and_quarterly_dividends_compound() {
        let outcome = run_scenario(dec!(1000), dec!(0), dec!(0), dec!(5), dec!(2), dec!(0), 1);
        assert_eq!(outcome.value, dec!(1071.16));
        assert_eq!(outcome.service_fees, dec!(0.00));
    }

    #[test]
    fn service_fees_drag_on_the_full_plan() {
        let outcome = run_scenario(
            dec!(1000),
            dec!(100),
            dec!(0.15),
            dec!(7),
            dec!(2),
            dec!(0.24),
            1,
        );
        assert_eq!(outcome.value, dec!(2236.60));
        assert_eq!(outcome.service_fees, dec!(4.15));

        let outcome = run_scenario(
            dec!(1000),
            dec!(100),
            dec!(0.15),
            dec!(7),
            dec!(2),
            dec!(0.24),
            2,
        );
        assert_eq!(outcome.value, dec!(3690.04));
        assert_eq!(outcome.service_fees, dec!(11.68));

        let outcome = run_scenario(
            dec!(1000),
            dec!(100),
            dec!(0.15),
            dec!(7),
            dec!(2),
            dec!(0.24),
            10,
        );
        assert_eq!(outcome.value, dec!(20958.23));
        assert_eq!(outcome.service_fees, dec!(235.25));
    }

    #[test]
    fn portfolios_below_the_exemption_pay_no_wealth_tax() {
        let outcome = run_scenario(
            dec!(1000),
            dec!(100),
            dec!(0.15),
            dec!(7),
            dec!(2),
            dec!(0.24),
            10,
        );
        assert_eq!(outcome.taxes, dec!(0.00));
    }

    #[test]
    fn wealth_tax_is_charged_at_year_end_above_the_exemption() {
        let outcome = run_scenario(dec!(100000), dec!(0), dec!(0), dec!(0), dec!(0), dec!(0), 1);
        // 43000 over the 57000 threshold at 1.2%.
        assert_eq!(outcome.taxes, dec!(516.00));
        assert_eq!(outcome.value, dec!(99484.00));
    }

    #[test]
    fn entry_costs_reduce_every_buy_order() {
        let wealth_tax = WealthTax::exempt().expect("valid brackets");
        let broker = Broker::new(
            "Test Broker",
            "Test Product",
            eur(dec!(2)),
            TieredFee::flat(Percentage::ZERO).expect("valid schedule"),
            BillingPeriod::Quarterly,
            PercentageFee::new(pct(dec!(0.25))).expect("non-negative"),
            PercentageFee::zero(),
            PercentageFee::zero(),
            "https://broker.test",
        );
        let mut simulation = Simulation::new(
            &wealth_tax,
            &broker,
            single_fund_portfolio(dec!(0)),
            eur(dec!(1000)),
            eur(dec!(100)),
            Percentage::ZERO,
            Percentage::ZERO,
        )
        .expect("valid configuration");
        simulation.run(1).expect("first run succeeds");

        // 1000 - 2 - 2.50 invested in month one, 100 - 2 - 0.25 thereafter.
        assert_eq!(simulation.portfolio_value().amount(), dec!(2070.75));
        assert_eq!(simulation.total_contributed().amount(), dec!(2100));
        let net = simulation.net_result().expect("same currency");
        assert_eq!(net.amount(), dec!(-29.25));
    }

    #[test]
    fn tiered_service_fee_uses_marginal_brackets() {
        let wealth_tax = WealthTax::exempt().expect("valid brackets");
        let schedule = TieredFee::new(vec![
            Tier::up_to(eur(dec!(10000)), pct(dec!(0.24))),
            Tier::unbounded(pct(dec!(0.12))),
        ])
        .expect("valid schedule");
        let broker = Broker::new(
            "Test Broker",
            "Test Product",
            eur(dec!(0)),
            schedule,
            BillingPeriod::Annual,
            PercentageFee::zero(),
            PercentageFee::zero(),
            PercentageFee::zero(),
            "https://broker.test",
        );
        let mut simulation = Simulation::new(
            &wealth_tax,
            &broker,
            single_fund_portfolio(dec!(0)),
            eur(dec!(20000)),
            eur(dec!(0)),
            Percentage::ZERO,
            Percentage::ZERO,
        )
        .expect("valid configuration");
        simulation.run(1).expect("first run succeeds");

        // 10000 at 0.24% plus 10000 at 0.12%, charged once at year end.
        assert_eq!(simulation.total_service_fees().amount(), dec!(36));
        assert_eq!(simulation.portfolio_value().amount(), dec!(19964));
    }

    #[test]
    fn run_twice_is_rejected() {
        let wealth_tax = WealthTax::exempt().expect("valid brackets");
        let broker = flat_broker(dec!(0));
        let mut simulation = Simulation::new(
            &wealth_tax,
            &broker,
            single_fund_portfolio(dec!(0)),
            eur(dec!(1000)),
            eur(dec!(100)),
            Percentage::ZERO,
            Percentage::ZERO,
        )
        .expect("valid configuration");
        simulation.run(1).expect("first run succeeds");
        assert_eq!(simulation.run(1), Err(EngineError::AlreadyRun));
    }

    #[test]
    fn zero_years_is_rejected_before_any_mutation() {
        let wealth_tax = WealthTax::exempt().expect("valid brackets");
        let broker = flat_broker(dec!(0));
        let mut simulation = Simulation::new(
            &wealth_tax,
            &broker,
            single_fund_portfolio(dec!(0)),
            eur(dec!(1000)),
            eur(dec!(100)),
            Percentage::ZERO,
            Percentage::ZERO,
        )
        .expect("valid configuration");
        assert!(matches!(
            simulation.run(0),
            Err(EngineError::InvalidParameter(_))
        ));
        assert!(simulation.portfolio_value().is_zero());
    }

    #[test]
    fn negative_parameters_are_rejected_at_construction() {
        let wealth_tax = WealthTax::exempt().expect("valid brackets");
        let broker = flat_broker(dec!(0));
        let result = Simulation::new(
            &wealth_tax,
            &broker,
            single_fund_portfolio(dec!(0)),
            eur(dec!(-1)),
            eur(dec!(100)),
            Percentage::ZERO,
            Percentage::ZERO,
        );
        assert!(matches!(result, Err(EngineError::InvalidParameter(_))));

        let result = Simulation::new(
            &wealth_tax,
            &broker,
            single_fund_portfolio(dec!(0)),
            eur(dec!(1000)),
            eur(dec!(100)),
            pct(dec!(-5)),
            Percentage::ZERO,
        );
        assert!(matches!(result, Err(EngineError::InvalidParameter(_))));
    }

    #[test]
    fn deposits_in_another_currency_are_rejected() {
        let wealth_tax = WealthTax::exempt().expect("valid brackets");
        let broker = flat_broker(dec!(0));
        let result = Simulation::new(
            &wealth_tax,
            &broker,
            single_fund_portfolio(dec!(0)),
            Money::new(dec!(1000), Currency::USD),
            eur(dec!(100)),
            Percentage::ZERO,
            Percentage::ZERO,
        );
        assert!(matches!(result, Err(EngineError::CurrencyMismatch { .. })));
    }

    #[test]
    fn identical_configurations_produce_identical_outcomes() {
        let first = run_scenario(
            dec!(1000),
            dec!(100),
            dec!(0.15),
            dec!(7),
            dec!(2),
            dec!(0.24),
            2,
        );
        let second = run_scenario(
            dec!(1000),
            dec!(100),
            dec!(0.15),
            dec!(7),
            dec!(2),
            dec!(0.24),
            2,
        );
        assert_eq!(first.value, second.value);
        assert_eq!(first.service_fees, second.service_fees);
    }

    #[test]
    fn a_reset_portfolio_behaves_like_a_fresh_one() {
        let wealth_tax = WealthTax::exempt().expect("valid brackets");
        let broker = flat_broker(dec!(0.24));

        let mut used = single_fund_portfolio(dec!(0.15));
        used.invest(eur(dec!(500))).expect("same currency");
        used.reset();

        let mut recycled = Simulation::new(
            &wealth_tax,
            &broker,
            used,
            eur(dec!(1000)),
            eur(dec!(100)),
            pct(dec!(7)),
            pct(dec!(2)),
        )
        .expect("valid configuration");
        recycled.run(1).expect("first run succeeds");

        let mut fresh = Simulation::new(
            &wealth_tax,
            &broker,
            single_fund_portfolio(dec!(0.15)),
            eur(dec!(1000)),
            eur(dec!(100)),
            pct(dec!(7)),
            pct(dec!(2)),
        )
        .expect("valid configuration");
        fresh.run(1).expect("first run succeeds");

        assert_eq!(
            recycled.portfolio_value().amount(),
            fresh.portfolio_value().amount()
        );
        assert_eq!(
            recycled.total_service_fees().amount(),
            fresh.total_service_fees().amount()
        );
    }

    proptest! {
        #![proptest_config(Config::with_cases(24))]

        #[test]
        fn value_is_monotone_in_the_monthly_contribution(
            initial in 0u32..5_000,
            monthly in 0u32..1_000,
            bump in 1u32..500,
            annual_return in 0u32..12,
            dividend_yield in 0u32..4,
            years in 1u32..4,
        ) {
            let low = run_scenario(
                Decimal::from(initial),
                Decimal::from(monthly),
                dec!(0.15),
                Decimal::from(annual_return),
                Decimal::from(dividend_yield),
                dec!(0.24),
                years,
            );
            let high = run_scenario(
                Decimal::from(initial),
                Decimal::from(monthly + bump),
                dec!(0.15),
                Decimal::from(annual_return),
                Decimal::from(dividend_yield),
                dec!(0.24),
                years,
            );
            prop_assert!(high.value >= low.value);
        }

        #[test]
        fn invest_never_leaks_value_across_allocations(
            cut in 1u32..100,
            cents in 0u64..10_000_000,
        ) {
            let allocations = vec![
                (
                    Fund::new("World", pct(dec!(0.2)), false).expect("valid fund"),
                    pct(Decimal::from(cut)),
                ),
                (
                    Fund::new("Small Cap", pct(dec!(0.35)), true).expect("valid fund"),
                    pct(Decimal::from(100 - cut)),
                ),
            ];
            let mut portfolio =
                Portfolio::new(allocations, Currency::EUR).expect("valid portfolio");
            let amount = Decimal::new(cents as i64, 2);
            portfolio.invest(eur(amount)).expect("same currency");
            prop_assert_eq!(portfolio.value().amount(), amount);
        }
    }
}
