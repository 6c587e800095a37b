use thiserror::Error;

use super::money::Currency;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("cannot combine {left} with {right}")]
    CurrencyMismatch { left: Currency, right: Currency },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("simulation already ran; build a new one with a fresh portfolio")]
    AlreadyRun,
    #[error("malformed fee schedule: {0}")]
    UnknownBracket(String),
}
