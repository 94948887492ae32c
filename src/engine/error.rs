//! Error types for engine operations.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::model::{AccountId, EventId, GameId, TournamentId};
use crate::store::StoreError;
use crate::{Amount, Odds};

/// Stable, machine-readable error class handed to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidAmount,
    InsufficientFunds,
    InvalidState,
    Conflict,
    StoreFailure,
}

/// The kind of row a [`CoreError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Account,
    LedgerEntry,
    Wager,
    Event,
    Outcome,
    Game,
    Tournament,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Account => "account",
            Resource::LedgerEntry => "ledger entry",
            Resource::Wager => "wager",
            Resource::Event => "event",
            Resource::Outcome => "outcome",
            Resource::Game => "game",
            Resource::Tournament => "tournament",
        };
        f.write_str(name)
    }
}

/// Top-level error returned by every engine operation.
///
/// Validation errors are raised before anything is written; a failing unit
/// of work leaves the store untouched whatever the variant.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} {1} not found")]
    NotFound(Resource, u64),

    #[error("account {0} is not allowed to perform this operation")]
    Unauthorized(AccountId),

    #[error("invalid amount {0}")]
    InvalidAmount(Amount),

    #[error("amount total out of range")]
    Overflow,

    #[error("invalid odds {0}")]
    InvalidOdds(Odds),

    #[error("invalid score delta {0}")]
    InvalidScore(i64),

    #[error("invalid participant capacity {0}")]
    InvalidCapacity(usize),

    #[error("bet {amount} outside limits [{min}, {max}] of game {game}")]
    BetOutOfRange {
        game: GameId,
        amount: Amount,
        min: Amount,
        max: Amount,
    },

    #[error("ledger legs for account {account} total {entries}, not the delta {delta}")]
    Unbalanced {
        account: AccountId,
        delta: Amount,
        entries: Amount,
    },

    #[error("insufficient funds for account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Amount,
        requested: Amount,
    },

    #[error(transparent)]
    InvalidState(#[from] StateError),

    #[error("account {account} already joined tournament {tournament}")]
    AlreadyJoined {
        account: AccountId,
        tournament: TournamentId,
    },

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

/// Operations refused because of the current lifecycle state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("event {0} is not accepting bets")]
    EventNotBettable(EventId),
    #[error("event {0} is already settled")]
    EventAlreadySettled(EventId),
    #[error("event {0} is not upcoming")]
    EventNotUpcoming(EventId),
    #[error("game {0} is not active")]
    GameInactive(GameId),
    #[error("game {0} has no resolver for its category")]
    GameNotPlayable(GameId),
    #[error("tournament {0} is full")]
    TournamentFull(TournamentId),
    #[error("tournament {0} is not a draft")]
    TournamentNotDraft(TournamentId),
    #[error("tournament {0} is not open for registration")]
    TournamentNotOpen(TournamentId),
    #[error("tournament {0} is not in progress")]
    TournamentNotActive(TournamentId),
    #[error("tournament {0} is already finished")]
    TournamentFinished(TournamentId),
    #[error("account {account} is not a participant of tournament {tournament}")]
    NotParticipant {
        account: AccountId,
        tournament: TournamentId,
    },
    #[error("account {0} is restricted")]
    AccountRestricted(AccountId),
    #[error("account {0} is inactive")]
    AccountInactive(AccountId),
    #[error("account {0} cannot transfer to itself")]
    SelfTransfer(AccountId),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound(..) => ErrorKind::NotFound,
            CoreError::Unauthorized(_) => ErrorKind::Unauthorized,
            CoreError::InvalidAmount(_)
            | CoreError::Overflow
            | CoreError::InvalidOdds(_)
            | CoreError::InvalidScore(_)
            | CoreError::InvalidCapacity(_)
            | CoreError::BetOutOfRange { .. }
            | CoreError::Unbalanced { .. } => ErrorKind::InvalidAmount,
            CoreError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            CoreError::InvalidState(_) => ErrorKind::InvalidState,
            CoreError::AlreadyJoined { .. } => ErrorKind::Conflict,
            CoreError::Store(_) => ErrorKind::StoreFailure,
        }
    }

    /// Payload for the transport layer: the kind plus a human readable message.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}
