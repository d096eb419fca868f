use crate::scheduler::SessionPhase;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NightError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Customer '{id}' not found in catalog")]
    UnknownCustomer { id: String },

    #[error("Customer '{id}' is not {expected}")]
    WrongPartition { id: String, expected: &'static str },

    #[error("Illegal session transition: {from:?} -> {to:?}")]
    IllegalTransition { from: SessionPhase, to: SessionPhase },

    #[error("Lock poisoned for key '{key}'")]
    LockPoisoned { key: String },

    #[error("No checkpoint stored under '{key}'")]
    CheckpointMissing { key: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type NightResult<T> = Result<T, NightError>;
