use serde::{Deserialize, Serialize};
use thiserror::Error;

mod roster;
mod round;
mod session;

pub use roster::{Player, PlayerSummary, Roster};
pub use round::{Assignment, DrawPhase, DrawRecord, DrawStatus, Round, RoundSnapshot};
pub use session::{Session, SessionGate};

pub type PlayerId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[serde(alias = "user")]
    Member,
}

/// Stable, machine-checkable error classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Conflict,
    NotFound,
    Unauthorized,
    Unauthenticated,
    Forbidden,
    InvalidInput,
    InvalidState,
    Exhausted,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("invalid credentials")]
    Unauthorized,
    #[error("not authenticated")]
    Unauthenticated,
    #[error("{0} access required")]
    Forbidden(&'static str),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("no valid assignments available")]
    Exhausted,
}

impl ExchangeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExchangeError::Conflict(_) => ErrorKind::Conflict,
            ExchangeError::NotFound(_) => ErrorKind::NotFound,
            ExchangeError::Unauthorized => ErrorKind::Unauthorized,
            ExchangeError::Unauthenticated => ErrorKind::Unauthenticated,
            ExchangeError::Forbidden(_) => ErrorKind::Forbidden,
            ExchangeError::InvalidInput(_) => ErrorKind::InvalidInput,
            ExchangeError::InvalidState(_) => ErrorKind::InvalidState,
            ExchangeError::Exhausted => ErrorKind::Exhausted,
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

pub(crate) fn require_field(value: &str, what: &str) -> ExchangeResult<()> {
    if value.is_empty() {
        return Err(ExchangeError::InvalidInput(format!("{what} required")));
    }
    Ok(())
}
