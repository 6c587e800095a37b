mod engine;
mod error;
mod fees;
mod money;
mod types;

pub use engine::Simulation;
pub use error::EngineError;
pub use fees::{PercentageFee, Tier, TieredFee, WealthTax};
pub use money::{Currency, Money, Percentage, Rounding, RoundingPolicy};
pub use types::{BillingPeriod, Broker, Fund, Portfolio};
