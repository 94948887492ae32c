//! Persistence capability used by the engine.
//!
//! Every engine operation is a single call to [`Store::atomically`]: the
//! closure reads and writes through a [`UnitOfWork`], and either all of its
//! writes become visible or none do.

use thiserror::Error;

use crate::Amount;
use crate::model::{
    Account, AccountId, EntryId, EntryKind, EntryStatus, Event, EventId, Game, GameId,
    LedgerEntry, Outcome, OutcomeId, Participant, ParticipantId, Tournament, TournamentId, Wager,
    WagerId, WagerKind, WagerStatus,
};

mod memory;
pub use memory::MemoryStore;

/// Default page size for listings.
pub const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unit of work could not be committed")]
    CommitFailed,
    #[error("duplicate key {1} in {0:?}")]
    DuplicateKey(Table, u64),
}

/// Id sequences, one per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Accounts,
    Entries,
    Wagers,
    Events,
    Outcomes,
    Games,
    Tournaments,
    Participants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// Ledger listing filter. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub account: Option<AccountId>,
    pub kind: Option<EntryKind>,
    pub status: Option<EntryStatus>,
    /// `None` returns every match.
    pub page: Option<Page>,
}

impl EntryFilter {
    pub fn account(account: AccountId) -> Self {
        Self {
            account: Some(account),
            ..Self::default()
        }
    }

    /// Completed entries of one account: the rows a balance must equal.
    pub fn completed(account: AccountId) -> Self {
        Self {
            account: Some(account),
            status: Some(EntryStatus::Completed),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.account.is_none_or(|a| a == entry.account)
            && self.kind.is_none_or(|k| k == entry.kind)
            && self.status.is_none_or(|s| s == entry.status)
    }
}

/// Wager listing filter. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct WagerFilter {
    pub account: Option<AccountId>,
    pub event: Option<EventId>,
    pub kind: Option<WagerKind>,
    pub status: Option<WagerStatus>,
    /// `None` returns every match.
    pub page: Option<Page>,
}

impl WagerFilter {
    pub fn pending_on(event: EventId) -> Self {
        Self {
            event: Some(event),
            status: Some(WagerStatus::Pending),
            ..Self::default()
        }
    }

    pub fn matches(&self, wager: &Wager) -> bool {
        self.account.is_none_or(|a| a == wager.account)
            && self.event.is_none_or(|e| Some(e) == wager.event)
            && self.kind.is_none_or(|k| k == wager.kind)
            && self.status.is_none_or(|s| s == wager.status)
    }
}

/// Reads and writes staged inside one atomic unit.
///
/// Reads observe the unit's own earlier writes. Ledger entries can only be
/// appended.
pub trait UnitOfWork {
    fn next_id(&mut self, table: Table) -> Result<u64, StoreError>;

    fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;
    fn accounts(&self) -> Result<Vec<Account>, StoreError>;
    fn put_account(&mut self, account: &Account) -> Result<(), StoreError>;

    fn entry(&self, id: EntryId) -> Result<Option<LedgerEntry>, StoreError>;
    fn entries(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, StoreError>;
    /// Sum of `amount` over every match, ignoring pagination. `None` when
    /// the total does not fit an [`Amount`].
    fn entry_sum(&self, filter: &EntryFilter) -> Result<Option<Amount>, StoreError>;
    fn append_entry(&mut self, entry: LedgerEntry) -> Result<(), StoreError>;

    fn wager(&self, id: WagerId) -> Result<Option<Wager>, StoreError>;
    fn wagers(&self, filter: &WagerFilter) -> Result<Vec<Wager>, StoreError>;
    fn put_wager(&mut self, wager: &Wager) -> Result<(), StoreError>;

    fn event(&self, id: EventId) -> Result<Option<Event>, StoreError>;
    fn put_event(&mut self, event: &Event) -> Result<(), StoreError>;
    fn outcome(&self, id: OutcomeId) -> Result<Option<Outcome>, StoreError>;
    /// Outcomes of one event in creation order.
    fn outcomes(&self, event: EventId) -> Result<Vec<Outcome>, StoreError>;
    fn put_outcome(&mut self, outcome: &Outcome) -> Result<(), StoreError>;

    fn game(&self, id: GameId) -> Result<Option<Game>, StoreError>;
    fn put_game(&mut self, game: &Game) -> Result<(), StoreError>;

    fn tournament(&self, id: TournamentId) -> Result<Option<Tournament>, StoreError>;
    fn put_tournament(&mut self, tournament: &Tournament) -> Result<(), StoreError>;
    /// Participants of one tournament in join order.
    fn participants(&self, tournament: TournamentId) -> Result<Vec<Participant>, StoreError>;
    fn put_participant(&mut self, participant: &Participant) -> Result<(), StoreError>;
    fn remove_participant(&mut self, id: ParticipantId) -> Result<(), StoreError>;
}

/// A store that runs closures as atomic units of work.
pub trait Store: Send + Sync {
    /// Run `work` in one unit. Its writes are committed only if it returns
    /// `Ok` and the commit itself succeeds; otherwise nothing changes.
    ///
    /// Units touching the same rows never interleave.
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>;
}
