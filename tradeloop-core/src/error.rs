//! Crate-wide error type.

use thiserror::Error;

use crate::domain::OrderError;
use crate::exchange::ExchangeError;
use crate::hooks::{ConfigError, HookError};
use crate::ledger::LedgerError;

/// Umbrella error for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
