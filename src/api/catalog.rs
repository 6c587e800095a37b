use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::core::{
    BillingPeriod, Broker, Currency, EngineError, Fund, Money, Percentage, PercentageFee, Tier,
    TieredFee,
};

const COMBINATIONS_JSON: &str = include_str!("../../data/combinations.json");

/// One broker/portfolio pairing offered for comparison, resolved from the
/// embedded combinations data against the broker and fund catalogs.
#[derive(Clone, Debug)]
pub struct Combination {
    pub broker: Broker,
    pub allocations: Vec<(Fund, Percentage)>,
    pub automated_investing: bool,
}

impl Combination {
    pub fn contains_small_caps(&self) -> bool {
        self.allocations.iter().any(|(fund, _)| fund.small_caps())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CombinationSpec {
    broker: String,
    portfolio: Vec<AllocationSpec>,
    automated_investing: bool,
}

#[derive(Debug, Deserialize)]
struct AllocationSpec {
    allocation: Decimal,
    fund: String,
}

pub fn combinations() -> Result<Vec<Combination>, EngineError> {
    let brokers = brokers()?;
    let funds = funds()?;
    let specs: Vec<CombinationSpec> = serde_json::from_str(COMBINATIONS_JSON).map_err(|e| {
        EngineError::InvalidParameter(format!("combinations data is malformed: {e}"))
    })?;

    specs
        .into_iter()
        .map(|spec| {
            let broker = brokers
                .iter()
                .find(|broker| broker.name() == spec.broker)
                .cloned()
                .ok_or_else(|| {
                    EngineError::InvalidParameter(format!(
                        "unknown broker {:?} in combinations data",
                        spec.broker
                    ))
                })?;
            let allocations = spec
                .portfolio
                .into_iter()
                .map(|entry| {
                    let fund = funds
                        .iter()
                        .find(|fund| fund.name() == entry.fund)
                        .cloned()
                        .ok_or_else(|| {
                            EngineError::InvalidParameter(format!(
                                "unknown fund {:?} in combinations data",
                                entry.fund
                            ))
                        })?;
                    Ok((fund, Percentage::new(entry.allocation)))
                })
                .collect::<Result<Vec<_>, EngineError>>()?;
            Ok(Combination {
                broker,
                allocations,
                automated_investing: spec.automated_investing,
            })
        })
        .collect()
}

fn eur(amount: Decimal) -> Money {
    Money::new(amount, Currency::EUR)
}

fn rate(value: Decimal) -> Percentage {
    Percentage::new(value)
}

fn flat_fee(value: Decimal) -> Result<PercentageFee, EngineError> {
    PercentageFee::new(rate(value))
}

fn brokers() -> Result<Vec<Broker>, EngineError> {
    Ok(vec![
        Broker::new(
            "Meesman",
            "Indexbeleggen",
            eur(dec!(0)),
            TieredFee::flat(Percentage::ZERO)?,
            BillingPeriod::Annual,
            flat_fee(dec!(0.25))?,
            flat_fee(dec!(0.25))?,
            PercentageFee::zero(),
            "https://www.meesman.nl",
        ),
        Broker::new(
            "DEGIRO",
            "Basic",
            eur(dec!(1)),
            TieredFee::flat(Percentage::ZERO)?,
            BillingPeriod::Annual,
            PercentageFee::zero(),
            PercentageFee::zero(),
            PercentageFee::zero(),
            "https://www.degiro.nl",
        ),
        Broker::new(
            "ABN AMRO",
            "Zelf Beleggen Basis",
            eur(dec!(0)),
            TieredFee::new(vec![
                Tier::up_to(eur(dec!(100000)), rate(dec!(0.20))),
                Tier::up_to(eur(dec!(400000)), rate(dec!(0.12))),
                Tier::unbounded(rate(dec!(0.06))),
            ])?,
            BillingPeriod::Quarterly,
            PercentageFee::zero(),
            PercentageFee::zero(),
            PercentageFee::zero(),
            "https://www.abnamro.nl/nl/prive/beleggen",
        ),
        Broker::new(
            "Rabobank",
            "Rabo Beleggen",
            eur(dec!(0)),
            TieredFee::new(vec![
                Tier::up_to(eur(dec!(100000)), rate(dec!(0.30))),
                Tier::up_to(eur(dec!(250000)), rate(dec!(0.20))),
                Tier::unbounded(rate(dec!(0.10))),
            ])?,
            BillingPeriod::Quarterly,
            PercentageFee::zero(),
            PercentageFee::zero(),
            PercentageFee::zero(),
            "https://www.rabobank.nl/particulieren/beleggen",
        ),
        Broker::new(
            "Brand New Day",
            "Zelf Beleggen",
            eur(dec!(0)),
            TieredFee::flat(rate(dec!(0.44)))?,
            BillingPeriod::Quarterly,
            PercentageFee::zero(),
            PercentageFee::zero(),
            PercentageFee::zero(),
            "https://www.brandnewday.nl",
        ),
    ])
}

fn funds() -> Result<Vec<Fund>, EngineError> {
    Ok(vec![
        Fund::new(
            "Meesman Indexfonds Aandelen Wereldwijd Totaal",
            rate(dec!(0.50)),
            true,
        )?,
        Fund::new("Vanguard FTSE All-World UCITS ETF", rate(dec!(0.22)), false)?,
        Fund::new(
            "iShares MSCI World Small Cap UCITS ETF",
            rate(dec!(0.35)),
            true,
        )?,
        Fund::new(
            "Northern Trust World Custom ESG Equity Index Fund",
            rate(dec!(0.15)),
            false,
        )?,
        Fund::new(
            "Northern Trust World Small Cap ESG Low Carbon Index Fund",
            rate(dec!(0.25)),
            true,
        )?,
        Fund::new("BND Wereld Indexfonds", rate(dec!(0.28)), false)?,
    ])
}
