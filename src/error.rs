//! Error type for operations a caller can be refused.
//!
//! Numeric trouble inside the tick (negative or non-finite prices, deck end)
//! is clamped where it happens and never shows up here.

use crate::types::CompanyId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("watch order rejected: capacity of {limit} standing orders reached")]
    WatchCapacity { limit: usize },

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("unknown company {0}")]
    UnknownCompany(CompanyId),

    #[error("unknown sector {0}")]
    UnknownSector(String),

    #[error("symbol {0} is already listed")]
    DuplicateSymbol(String),

    #[error("company {0} is not trading")]
    InactiveCompany(CompanyId),

    #[error("insufficient cash")]
    InsufficientCash,

    #[error("insufficient shares")]
    InsufficientShares,

    #[error("a player choice is pending; resolve it before advancing")]
    ChoicePending,

    #[error("no player choice is pending")]
    NoPendingChoice,

    #[error("run is over")]
    RunOver,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SimResult<T> = Result<T, SimError>;
