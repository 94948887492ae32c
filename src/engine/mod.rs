//! Wager and settlement engine.
//!
//! The engine owns a [`Store`] and exposes every balance-moving operation:
//! deposits, withdrawals and transfers, event bets and their settlement,
//! instant games, and tournaments. Each operation is exactly one unit of work
//! against the store, and every balance change goes through the enforcer in
//! `balance`. Also replays async streams of [`Command`]s.

use chrono::Utc;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::Amount;
use crate::draw::RandomSource;
use crate::model::{Account, AccountId, Caller, Command, EntryDraft, LedgerEntry, Role};
use crate::store::{MemoryStore, Store, Table, UnitOfWork};

mod balance;
mod event;
mod funds;
mod game;
mod query;
mod tournament;

mod error;
pub use error::{CoreError, ErrorBody, ErrorKind, Resource, StateError};
pub use event::SettlementReport;
pub use game::PlayResult;
pub use query::{BalanceAudit, BetSummary, LedgerSummary};
pub use tournament::{LeaderboardEntry, PRIZE_SHARES};

/// The wager engine, generic over its persistence layer.
pub struct Engine<S = MemoryStore> {
    store: S,
}

/// Public API
impl Engine<MemoryStore> {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for Engine<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> Engine<S> {
    pub fn with_store(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register an account. Credentials live with the identity provider; this
    /// only creates the balance row.
    pub fn open_account(&self, role: Role) -> Result<Account, CoreError> {
        let result = self.atomically(|tx| {
            let account = Account::new(tx.next_id(Table::Accounts)?, role, Utc::now());
            tx.put_account(&account)?;
            Ok(account)
        });
        if let Ok(account) = &result {
            info!(account = account.id, role = ?role, "account opened");
        }
        result
    }

    /// Resolve the trusted caller pair for `account` from its stored role.
    pub fn caller(&self, account: AccountId) -> Result<Caller, CoreError> {
        self.atomically(|tx| {
            let row = tx
                .account(account)?
                .ok_or(CoreError::NotFound(Resource::Account, account))?;
            Ok(Caller {
                account,
                is_admin: row.role == Role::Administrator,
            })
        })
    }

    /// Block or unblock debits on an account (admin only).
    pub fn set_restricted(
        &self,
        caller: Caller,
        account: AccountId,
        restricted: bool,
    ) -> Result<Account, CoreError> {
        self.update_account(caller, account, |row| row.is_restricted = restricted)
    }

    /// Activate or deactivate an account (admin only).
    pub fn set_active(
        &self,
        caller: Caller,
        account: AccountId,
        active: bool,
    ) -> Result<Account, CoreError> {
        self.update_account(caller, account, |row| row.is_active = active)
    }

    /// The balance enforcer as a standalone unit of work: apply `delta` to
    /// `account` together with `legs`, all or nothing.
    pub fn apply_balance_delta(
        &self,
        account: AccountId,
        delta: Amount,
        legs: Vec<EntryDraft>,
    ) -> Result<(Account, Vec<LedgerEntry>), CoreError> {
        let result = self.atomically(|tx| balance::apply_delta(tx, account, delta, legs, Utc::now()));
        Self::log_result("balance delta", account, Some(delta), &result);
        result
    }

    /// Run the engine with the given command stream. Rejected commands are
    /// logged and skipped.
    pub async fn run<R>(
        &self,
        mut stream: impl Stream<Item = Command> + Unpin,
        rng: &mut R,
    ) where
        R: RandomSource + ?Sized,
    {
        while let Some(command) = stream.next().await {
            // a rejected command must not stop the run
            let _ = self.apply(command, rng);
        }
    }

    /// Apply a single command, resolving the acting account's role first as
    /// the transport layer would.
    pub fn apply<R>(&self, command: Command, rng: &mut R) -> Result<(), CoreError>
    where
        R: RandomSource + ?Sized,
    {
        let name = command.name();
        let result = self.dispatch(command, rng);
        if let Err(e) = &result {
            info!(command = name, reason = %e, "command skipped");
        }
        result
    }
}

/// Private API
impl<S: Store> Engine<S> {
    /// Run `work` as one unit of work against the store.
    fn atomically<T>(
        &self,
        work: impl FnOnce(&mut dyn UnitOfWork) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        self.store.atomically(work)
    }

    fn update_account(
        &self,
        caller: Caller,
        account: AccountId,
        change: impl FnOnce(&mut Account),
    ) -> Result<Account, CoreError> {
        require_admin(&caller)?;
        let result = self.atomically(|tx| {
            let mut row = tx
                .account(account)?
                .ok_or(CoreError::NotFound(Resource::Account, account))?;
            change(&mut row);
            tx.put_account(&row)?;
            Ok(row)
        });
        Self::log_result("account update", account, None, &result);
        result
    }

    fn dispatch<R>(&self, command: Command, rng: &mut R) -> Result<(), CoreError>
    where
        R: RandomSource + ?Sized,
    {
        match command {
            Command::OpenAccount { role } => {
                self.open_account(role)?;
            }
            Command::Deposit { account, amount } => {
                self.deposit(self.caller(account)?, amount)?;
            }
            Command::Withdrawal { account, amount } => {
                self.withdraw(self.caller(account)?, amount)?;
            }
            Command::Transfer { from, to, amount } => {
                self.transfer(self.caller(from)?, to, amount)?;
            }
            Command::CreateEvent { account, name } => {
                self.create_event(self.caller(account)?, &name)?;
            }
            Command::AddOutcome {
                account,
                event,
                name,
                odds,
            } => {
                self.add_outcome(self.caller(account)?, event, &name, odds)?;
            }
            Command::StartEvent { account, event } => {
                self.start_event(self.caller(account)?, event)?;
            }
            Command::PlaceBet {
                account,
                event,
                outcome,
                amount,
            } => {
                self.place_bet(self.caller(account)?, event, outcome, amount)?;
            }
            Command::Settle {
                account,
                event,
                outcome,
            } => {
                self.settle(self.caller(account)?, event, outcome)?;
            }
            Command::Cancel { account, event } => {
                self.cancel(self.caller(account)?, event)?;
            }
            Command::CreateGame {
                account,
                category,
                min_bet,
                max_bet,
            } => {
                let name = format!("{category:?}");
                self.create_game(self.caller(account)?, &name, category, min_bet, max_bet)?;
            }
            Command::Play {
                account,
                game,
                amount,
            } => {
                self.play(self.caller(account)?, game, amount, rng)?;
            }
            Command::SetRestricted {
                account,
                target,
                restricted,
            } => {
                self.set_restricted(self.caller(account)?, target, restricted)?;
            }
            Command::SetActive {
                account,
                target,
                active,
            } => {
                self.set_active(self.caller(account)?, target, active)?;
            }
            Command::SetOutcomeOdds {
                account,
                outcome,
                odds,
            } => {
                self.set_outcome_odds(self.caller(account)?, outcome, odds)?;
            }
            Command::SetGameStatus {
                account,
                game,
                status,
            } => {
                self.set_game_status(self.caller(account)?, game, status)?;
            }
            Command::CreateTournament {
                account,
                name,
                entry_fee,
                prize_pool,
                max_participants,
            } => {
                self.create_tournament(
                    self.caller(account)?,
                    &name,
                    entry_fee,
                    prize_pool,
                    max_participants,
                )?;
            }
            Command::OpenTournament {
                account,
                tournament,
            } => {
                self.open_tournament(self.caller(account)?, tournament)?;
            }
            Command::StartTournament {
                account,
                tournament,
            } => {
                self.start_tournament(self.caller(account)?, tournament)?;
            }
            Command::JoinTournament {
                account,
                tournament,
            } => {
                self.join(self.caller(account)?, tournament)?;
            }
            Command::LeaveTournament {
                account,
                tournament,
            } => {
                self.leave(self.caller(account)?, tournament)?;
            }
            Command::UpdateScore {
                account,
                tournament,
                participant,
                delta,
            } => {
                self.update_score(self.caller(account)?, tournament, participant, delta)?;
            }
            Command::EndTournament {
                account,
                tournament,
            } => {
                self.end_tournament(self.caller(account)?, tournament)?;
            }
            Command::CancelTournament {
                account,
                tournament,
            } => {
                self.cancel_tournament(self.caller(account)?, tournament)?;
            }
        }
        Ok(())
    }

    /// Small helper to log operation results
    fn log_result<T>(
        operation: &str,
        account: AccountId,
        amount: Option<Amount>,
        result: &Result<T, CoreError>,
    ) {
        match (result, amount) {
            (Ok(_), Some(amt)) => {
                info!(account = %account, amount = %amt, "{operation} applied");
            }
            (Ok(_), None) => {
                info!(account = %account, "{operation} applied");
            }
            (Err(e), _) if e.kind() == ErrorKind::StoreFailure => {
                warn!(account = %account, reason = %e, "{operation} failed in store");
            }
            (Err(e), Some(amt)) => {
                info!(account = %account, amount = %amt, reason = %e, "{operation} rejected");
            }
            (Err(e), None) => {
                info!(account = %account, reason = %e, "{operation} rejected");
            }
        }
    }
}

fn require_admin(caller: &Caller) -> Result<(), CoreError> {
    if caller.is_admin {
        Ok(())
    } else {
        Err(CoreError::Unauthorized(caller.account))
    }
}

fn require_positive(amount: Amount) -> Result<(), CoreError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(CoreError::InvalidAmount(amount))
    }
}
