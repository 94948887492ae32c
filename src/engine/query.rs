//! Read-only views: rows, listings, summaries and balance audits.

use serde::Serialize;

use super::{CoreError, Engine, Resource};
use crate::Amount;
use crate::model::{
    Account, AccountId, Caller, EntryId, EntryKind, Event, EventId, Game, GameId, LedgerEntry,
    Outcome, Tournament, TournamentId, Wager, WagerId, WagerStatus,
};
use crate::store::{EntryFilter, Store, UnitOfWork, WagerFilter};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BetSummary {
    pub total_bets: usize,
    pub total_wagered: Amount,
    /// Payouts of won wagers.
    pub total_won: Amount,
    /// Stakes of lost wagers.
    pub total_lost: Amount,
    /// Won wagers over all wagers, in basis points.
    pub win_rate_bps: u32,
}

/// Completed ledger totals by kind. Debit kinds are reported as positive
/// magnitudes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub total_deposits: Amount,
    pub total_withdrawals: Amount,
    pub total_bets: Amount,
    pub total_wins: Amount,
    pub net: Amount,
}

/// An account's stored balance next to the sum of its completed entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceAudit {
    #[serde(rename = "account_id")]
    pub account: AccountId,
    pub balance: Amount,
    pub ledger_total: Amount,
    pub is_active: bool,
    pub is_restricted: bool,
}

impl BalanceAudit {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.ledger_total
    }
}

impl<S: Store> Engine<S> {
    pub fn account(&self, caller: Caller, account: AccountId) -> Result<Account, CoreError> {
        self.atomically(|tx| load_account(tx, caller, account))
    }

    pub fn ledger_entry(&self, caller: Caller, entry: EntryId) -> Result<LedgerEntry, CoreError> {
        self.atomically(|tx| {
            tx.entry(entry)?
                .filter(|row| caller.can_see(row.account))
                .ok_or(CoreError::NotFound(Resource::LedgerEntry, entry))
        })
    }

    /// Entries matching `filter`, newest first. Players only ever see their
    /// own entries, whatever account the filter names.
    pub fn ledger_entries(
        &self,
        caller: Caller,
        mut filter: EntryFilter,
    ) -> Result<Vec<LedgerEntry>, CoreError> {
        if !caller.is_admin {
            filter.account = Some(caller.account);
        }
        self.atomically(|tx| Ok(tx.entries(&filter)?))
    }

    pub fn wager(&self, caller: Caller, wager: WagerId) -> Result<Wager, CoreError> {
        self.atomically(|tx| {
            tx.wager(wager)?
                .filter(|row| caller.can_see(row.account))
                .ok_or(CoreError::NotFound(Resource::Wager, wager))
        })
    }

    /// Wagers matching `filter`, newest first, scoped like
    /// [`ledger_entries`](Self::ledger_entries).
    pub fn wagers(&self, caller: Caller, mut filter: WagerFilter) -> Result<Vec<Wager>, CoreError> {
        if !caller.is_admin {
            filter.account = Some(caller.account);
        }
        self.atomically(|tx| Ok(tx.wagers(&filter)?))
    }

    pub fn bet_summary(&self, caller: Caller, account: AccountId) -> Result<BetSummary, CoreError> {
        self.atomically(|tx| {
            load_account(tx, caller, account)?;
            let wagers = tx.wagers(&WagerFilter {
                account: Some(account),
                ..WagerFilter::default()
            })?;

            let total = |status: Option<WagerStatus>, pick: fn(&Wager) -> Amount| {
                Amount::checked_sum(
                    wagers
                        .iter()
                        .filter(|w| status.is_none_or(|s| w.status == s))
                        .map(pick),
                )
                .ok_or(CoreError::Overflow)
            };
            let won = wagers
                .iter()
                .filter(|w| w.status == WagerStatus::Won)
                .count();
            let summary = BetSummary {
                total_bets: wagers.len(),
                total_wagered: total(None, |w| w.amount)?,
                total_won: total(Some(WagerStatus::Won), |w| w.payout)?,
                total_lost: total(Some(WagerStatus::Lost), |w| w.amount)?,
                win_rate_bps: match wagers.len() {
                    0 => 0,
                    n => (won * 10_000 / n) as u32,
                },
            };
            Ok(summary)
        })
    }

    pub fn ledger_summary(
        &self,
        caller: Caller,
        account: AccountId,
    ) -> Result<LedgerSummary, CoreError> {
        self.atomically(|tx| {
            load_account(tx, caller, account)?;
            let total = |kind: EntryKind| -> Result<Amount, CoreError> {
                tx.entry_sum(&EntryFilter {
                    kind: Some(kind),
                    ..EntryFilter::completed(account)
                })?
                .ok_or(CoreError::Overflow)
            };
            let deposits = total(EntryKind::Deposit)?;
            let withdrawals = total(EntryKind::Withdrawal)?;
            let bets = total(EntryKind::Bet)?;
            let wins = total(EntryKind::Win)?;
            // withdrawals and bets are stored as debits
            let net = Amount::checked_sum([deposits, withdrawals, wins, bets])
                .ok_or(CoreError::Overflow)?;
            let magnitude = |debits: Amount| debits.checked_neg().ok_or(CoreError::Overflow);
            Ok(LedgerSummary {
                total_deposits: deposits,
                total_withdrawals: magnitude(withdrawals)?,
                total_bets: magnitude(bets)?,
                total_wins: wins,
                net,
            })
        })
    }

    /// Compare one account's balance with its completed ledger.
    pub fn audit(&self, caller: Caller, account: AccountId) -> Result<BalanceAudit, CoreError> {
        self.atomically(|tx| {
            let row = load_account(tx, caller, account)?;
            audit_row(tx, row)
        })
    }

    /// Audit every account, in id order. Operator tooling only.
    pub fn audit_all(&self) -> Result<Vec<BalanceAudit>, CoreError> {
        self.atomically(|tx| {
            tx.accounts()?
                .into_iter()
                .map(|row| audit_row(tx, row))
                .collect()
        })
    }

    pub fn event(&self, event: EventId) -> Result<Event, CoreError> {
        self.atomically(|tx| {
            tx.event(event)?
                .ok_or(CoreError::NotFound(Resource::Event, event))
        })
    }

    /// Outcomes of `event` in creation order.
    pub fn outcomes(&self, event: EventId) -> Result<Vec<Outcome>, CoreError> {
        self.atomically(|tx| {
            if tx.event(event)?.is_none() {
                return Err(CoreError::NotFound(Resource::Event, event));
            }
            Ok(tx.outcomes(event)?)
        })
    }

    pub fn game(&self, game: GameId) -> Result<Game, CoreError> {
        self.atomically(|tx| {
            tx.game(game)?
                .ok_or(CoreError::NotFound(Resource::Game, game))
        })
    }

    pub fn tournament(&self, tournament: TournamentId) -> Result<Tournament, CoreError> {
        self.atomically(|tx| {
            tx.tournament(tournament)?
                .ok_or(CoreError::NotFound(Resource::Tournament, tournament))
        })
    }
}

/// Accounts the caller may not see are reported as missing.
fn load_account(
    tx: &dyn UnitOfWork,
    caller: Caller,
    account: AccountId,
) -> Result<Account, CoreError> {
    tx.account(account)?
        .filter(|_| caller.can_see(account))
        .ok_or(CoreError::NotFound(Resource::Account, account))
}

fn audit_row(tx: &dyn UnitOfWork, row: Account) -> Result<BalanceAudit, CoreError> {
    Ok(BalanceAudit {
        account: row.id,
        balance: row.balance,
        ledger_total: tx
            .entry_sum(&EntryFilter::completed(row.id))?
            .ok_or(CoreError::Overflow)?,
        is_active: row.is_active,
        is_restricted: row.is_restricted,
    })
}
