//! The only code that writes account balances.
//!
//! Every money-moving operation routes its balance change through
//! [`apply_delta`], inside the operation's unit of work, so a balance always
//! equals the sum of its account's completed ledger entries.

use chrono::{DateTime, Utc};

use super::{CoreError, Resource, StateError};
use crate::Amount;
use crate::model::{Account, AccountId, EntryDraft, EntryStatus, LedgerEntry};
use crate::store::{Table, UnitOfWork};

/// Apply `delta` to `account` and append `legs` as completed ledger entries.
///
/// - The legs must sum to `delta`
/// - Debit legs need an active, unrestricted account whose balance covers
///   their total
/// - The balance is written exactly once
pub(crate) fn apply_delta(
    tx: &mut dyn UnitOfWork,
    account: AccountId,
    delta: Amount,
    legs: Vec<EntryDraft>,
    now: DateTime<Utc>,
) -> Result<(Account, Vec<LedgerEntry>), CoreError> {
    let total =
        Amount::checked_sum(legs.iter().map(|leg| leg.amount)).ok_or(CoreError::Overflow)?;
    if total != delta {
        return Err(CoreError::Unbalanced {
            account,
            delta,
            entries: total,
        });
    }

    let mut row = tx
        .account(account)?
        .ok_or(CoreError::NotFound(Resource::Account, account))?;

    let debits = Amount::checked_sum(
        legs.iter()
            .map(|leg| leg.amount)
            .filter(|amount| amount.is_negative()),
    )
    .and_then(Amount::checked_neg)
    .ok_or(CoreError::Overflow)?;
    if debits.is_positive() {
        ensure_can_debit(&row, debits)?;
    }

    row.balance = row
        .balance
        .checked_add(delta)
        .ok_or(CoreError::InvalidAmount(delta))?;

    let mut written = Vec::with_capacity(legs.len());
    for leg in legs {
        let entry = LedgerEntry {
            id: tx.next_id(Table::Entries)?,
            account,
            kind: leg.kind,
            amount: leg.amount,
            status: EntryStatus::Completed,
            reference: leg.reference,
            description: leg.description,
            created_at: now,
        };
        tx.append_entry(entry.clone())?;
        written.push(entry);
    }
    tx.put_account(&row)?;

    Ok((row, written))
}

/// Check that `row` may be debited `amount`, without writing anything.
pub(crate) fn ensure_can_debit(row: &Account, amount: Amount) -> Result<(), CoreError> {
    if !row.can_debit() {
        let refused = if row.is_active {
            StateError::AccountRestricted(row.id)
        } else {
            StateError::AccountInactive(row.id)
        };
        return Err(refused.into());
    }
    if row.balance < amount {
        return Err(CoreError::InsufficientFunds {
            account: row.id,
            balance: row.balance,
            requested: amount,
        });
    }
    Ok(())
}
