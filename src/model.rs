//! Core domain types for the wager engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Amount, Odds};

pub type AccountId = u64;
pub type EntryId = u64;
pub type WagerId = u64;
pub type EventId = u64;
pub type OutcomeId = u64;
pub type GameId = u64;
pub type TournamentId = u64;
pub type ParticipantId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Player,
    Administrator,
}

/// Identity of the account a request acts for, as validated by the session
/// provider. The engine trusts it and never re-derives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub account: AccountId,
    pub is_admin: bool,
}

impl Caller {
    pub fn player(account: AccountId) -> Self {
        Self {
            account,
            is_admin: false,
        }
    }

    pub fn admin(account: AccountId) -> Self {
        Self {
            account,
            is_admin: true,
        }
    }

    /// Whether this caller may see rows owned by `owner`.
    pub fn can_see(&self, owner: AccountId) -> bool {
        self.is_admin || self.account == owner
    }
}

/// A user balance. Only the balance enforcer writes `balance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub role: Role,
    pub balance: Amount,
    pub is_active: bool,
    pub is_restricted: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: AccountId, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            id,
            role,
            balance: Amount::ZERO,
            is_active: true,
            is_restricted: false,
            created_at: now,
        }
    }

    /// Debits are refused on inactive or restricted accounts.
    pub fn can_debit(&self) -> bool {
        self.is_active && !self.is_restricted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    Bet,
    Win,
    Refund,
    Transfer,
    TournamentEntry,
    TournamentPrize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

/// What produced a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "reference_type",
    content = "reference_id",
    rename_all = "snake_case"
)]
pub enum Reference {
    Wager(WagerId),
    Tournament(TournamentId),
    /// Counterparty of a transfer.
    Account(AccountId),
}

/// One balance-affecting event. Never updated or deleted once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    #[serde(rename = "account_id")]
    pub account: AccountId,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub amount: Amount,
    pub status: EntryStatus,
    pub reference: Option<Reference>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A ledger leg handed to the balance enforcer, which stamps id, account,
/// status and time when it appends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub kind: EntryKind,
    pub amount: Amount,
    pub reference: Option<Reference>,
    pub description: String,
}

impl EntryDraft {
    pub fn new(kind: EntryKind, amount: Amount, description: impl Into<String>) -> Self {
        Self {
            kind,
            amount,
            reference: None,
            description: description.into(),
        }
    }

    pub fn referencing(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerKind {
    Game,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
    Refunded,
}

impl WagerStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WagerStatus::Pending)
    }
}

/// A bet. `odds` is frozen at placement and is the only multiplier ever used
/// to pay it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    #[serde(rename = "account_id")]
    pub account: AccountId,
    #[serde(rename = "type")]
    pub kind: WagerKind,
    #[serde(rename = "game_id", skip_serializing_if = "Option::is_none")]
    pub game: Option<GameId>,
    #[serde(rename = "event_id", skip_serializing_if = "Option::is_none")]
    pub event: Option<EventId>,
    #[serde(rename = "outcome_id", skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeId>,
    pub amount: Amount,
    pub odds: Odds,
    pub status: WagerStatus,
    pub payout: Amount,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Upcoming,
    Live,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn is_bettable(self) -> bool {
        matches!(self, EventStatus::Upcoming | EventStatus::Live)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

/// One of an event's mutually exclusive results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: OutcomeId,
    #[serde(rename = "event_id")]
    pub event: EventId,
    pub name: String,
    pub odds: Odds,
    pub is_winner: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameCategory {
    Slots,
    Dice,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Active,
    Inactive,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    pub category: GameCategory,
    pub status: GameStatus,
    pub min_bet: Amount,
    pub max_bet: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Draft,
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl TournamentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TournamentStatus::Completed | TournamentStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub status: TournamentStatus,
    pub entry_fee: Amount,
    pub prize_pool: Amount,
    pub max_participants: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    #[serde(rename = "tournament_id")]
    pub tournament: TournamentId,
    #[serde(rename = "account_id")]
    pub account: AccountId,
    pub score: i64,
    /// Assigned when the tournament ends.
    pub rank: Option<u32>,
    pub prize_won: Amount,
    pub joined_at: DateTime<Utc>,
}

/// A request replayed by [`Engine::run`](crate::Engine::run).
#[derive(Debug, Clone)]
pub enum Command {
    OpenAccount {
        role: Role,
    },
    Deposit {
        account: AccountId,
        amount: Amount,
    },
    Withdrawal {
        account: AccountId,
        amount: Amount,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    CreateEvent {
        account: AccountId,
        name: String,
    },
    AddOutcome {
        account: AccountId,
        event: EventId,
        name: String,
        odds: Odds,
    },
    StartEvent {
        account: AccountId,
        event: EventId,
    },
    PlaceBet {
        account: AccountId,
        event: EventId,
        outcome: OutcomeId,
        amount: Amount,
    },
    Settle {
        account: AccountId,
        event: EventId,
        outcome: OutcomeId,
    },
    Cancel {
        account: AccountId,
        event: EventId,
    },
    CreateGame {
        account: AccountId,
        category: GameCategory,
        min_bet: Amount,
        max_bet: Amount,
    },
    Play {
        account: AccountId,
        game: GameId,
        amount: Amount,
    },
    SetRestricted {
        account: AccountId,
        target: AccountId,
        restricted: bool,
    },
    SetActive {
        account: AccountId,
        target: AccountId,
        active: bool,
    },
    SetOutcomeOdds {
        account: AccountId,
        outcome: OutcomeId,
        odds: Odds,
    },
    SetGameStatus {
        account: AccountId,
        game: GameId,
        status: GameStatus,
    },
    CreateTournament {
        account: AccountId,
        name: String,
        entry_fee: Amount,
        prize_pool: Amount,
        max_participants: usize,
    },
    OpenTournament {
        account: AccountId,
        tournament: TournamentId,
    },
    StartTournament {
        account: AccountId,
        tournament: TournamentId,
    },
    JoinTournament {
        account: AccountId,
        tournament: TournamentId,
    },
    LeaveTournament {
        account: AccountId,
        tournament: TournamentId,
    },
    UpdateScore {
        account: AccountId,
        tournament: TournamentId,
        participant: AccountId,
        delta: i64,
    },
    EndTournament {
        account: AccountId,
        tournament: TournamentId,
    },
    CancelTournament {
        account: AccountId,
        tournament: TournamentId,
    },
}

impl Command {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::OpenAccount { .. } => "open account",
            Command::Deposit { .. } => "deposit",
            Command::Withdrawal { .. } => "withdrawal",
            Command::Transfer { .. } => "transfer",
            Command::CreateEvent { .. } => "create event",
            Command::AddOutcome { .. } => "add outcome",
            Command::StartEvent { .. } => "start event",
            Command::PlaceBet { .. } => "place bet",
            Command::Settle { .. } => "settle",
            Command::Cancel { .. } => "cancel",
            Command::CreateGame { .. } => "create game",
            Command::Play { .. } => "play",
            Command::SetRestricted { .. } => "set restricted",
            Command::SetActive { .. } => "set active",
            Command::SetOutcomeOdds { .. } => "set outcome odds",
            Command::SetGameStatus { .. } => "set game status",
            Command::CreateTournament { .. } => "create tournament",
            Command::OpenTournament { .. } => "open tournament",
            Command::StartTournament { .. } => "start tournament",
            Command::JoinTournament { .. } => "join tournament",
            Command::LeaveTournament { .. } => "leave tournament",
            Command::UpdateScore { .. } => "update score",
            Command::EndTournament { .. } => "end tournament",
            Command::CancelTournament { .. } => "cancel tournament",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wager() -> Wager {
        Wager {
            id: 7,
            account: 1,
            kind: WagerKind::Event,
            game: None,
            event: Some(3),
            outcome: Some(4),
            amount: Amount::from_minor(200),
            odds: Odds::from_hundredths(300),
            status: WagerStatus::Won,
            payout: Amount::from_minor(600),
            settled_at: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn wager_keeps_client_field_names() {
        let json = serde_json::to_value(wager()).unwrap();
        assert_eq!(json["amount"], 200);
        assert_eq!(json["odds"], 300);
        assert_eq!(json["payout"], 600);
        assert_eq!(json["status"], "won");
        assert!(json["settled_at"].is_string());
        assert_eq!(json["event_id"], 3);
        assert!(json.get("game_id").is_none());
    }

    #[test]
    fn ledger_entry_reference_is_tagged() {
        let entry = LedgerEntry {
            id: 1,
            account: 1,
            kind: EntryKind::TournamentPrize,
            amount: Amount::from_minor(500),
            status: EntryStatus::Completed,
            reference: Some(Reference::Tournament(9)),
            description: "prize".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(entry).unwrap();
        assert_eq!(json["type"], "tournament_prize");
        assert_eq!(json["reference"]["reference_type"], "tournament");
        assert_eq!(json["reference"]["reference_id"], 9);
    }

    #[test]
    fn status_predicates() {
        assert!(EventStatus::Upcoming.is_bettable());
        assert!(EventStatus::Live.is_bettable());
        assert!(!EventStatus::Completed.is_bettable());
        assert!(EventStatus::Cancelled.is_terminal());
        assert!(!WagerStatus::Pending.is_terminal());
        assert!(WagerStatus::Refunded.is_terminal());
        assert!(TournamentStatus::Completed.is_terminal());
        assert!(!TournamentStatus::InProgress.is_terminal());
    }

    #[test]
    fn caller_visibility() {
        assert!(Caller::player(1).can_see(1));
        assert!(!Caller::player(1).can_see(2));
        assert!(Caller::admin(5).can_see(2));
    }

    #[test]
    fn restricted_accounts_cannot_debit() {
        let mut account = Account::new(1, Role::Player, Utc::now());
        assert!(account.can_debit());
        account.is_restricted = true;
        assert!(!account.can_debit());
        account.is_restricted = false;
        account.is_active = false;
        assert!(!account.can_debit());
    }
}
