//! Deposits, withdrawals and account-to-account transfers.

use chrono::Utc;

use super::{CoreError, Engine, Resource, StateError, balance, require_positive};
use crate::Amount;
use crate::model::{Account, AccountId, Caller, EntryDraft, EntryKind, LedgerEntry, Reference};
use crate::store::Store;

impl<S: Store> Engine<S> {
    /// Credit the caller's own account.
    pub fn deposit(&self, caller: Caller, amount: Amount) -> Result<Account, CoreError> {
        let result = self.deposit_inner(caller.account, amount);
        Self::log_result("deposit", caller.account, Some(amount), &result);
        result
    }

    /// Debit the caller's own account.
    pub fn withdraw(&self, caller: Caller, amount: Amount) -> Result<Account, CoreError> {
        let result = self.withdraw_inner(caller.account, amount);
        Self::log_result("withdrawal", caller.account, Some(amount), &result);
        result
    }

    /// Move `amount` from the caller to `to`. Returns the sender's entry.
    pub fn transfer(
        &self,
        caller: Caller,
        to: AccountId,
        amount: Amount,
    ) -> Result<LedgerEntry, CoreError> {
        let result = self.transfer_inner(caller.account, to, amount);
        Self::log_result("transfer", caller.account, Some(amount), &result);
        result
    }

    fn deposit_inner(&self, account: AccountId, amount: Amount) -> Result<Account, CoreError> {
        require_positive(amount)?;
        self.atomically(|tx| {
            let row = tx
                .account(account)?
                .ok_or(CoreError::NotFound(Resource::Account, account))?;
            if !row.is_active {
                return Err(StateError::AccountInactive(account).into());
            }
            let leg = EntryDraft::new(EntryKind::Deposit, amount, "Deposit");
            let (row, _) = balance::apply_delta(tx, account, amount, vec![leg], Utc::now())?;
            Ok(row)
        })
    }

    fn withdraw_inner(&self, account: AccountId, amount: Amount) -> Result<Account, CoreError> {
        require_positive(amount)?;
        self.atomically(|tx| {
            let leg = EntryDraft::new(EntryKind::Withdrawal, -amount, "Withdrawal");
            let (row, _) = balance::apply_delta(tx, account, -amount, vec![leg], Utc::now())?;
            Ok(row)
        })
    }

    fn transfer_inner(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<LedgerEntry, CoreError> {
        if from == to {
            return Err(StateError::SelfTransfer(from).into());
        }
        require_positive(amount)?;

        self.atomically(|tx| {
            if tx.account(to)?.is_none() {
                return Err(CoreError::NotFound(Resource::Account, to));
            }
            let now = Utc::now();

            let out = EntryDraft::new(EntryKind::Transfer, -amount, format!("Transfer to {to}"))
                .referencing(Reference::Account(to));
            let (_, mut sent) = balance::apply_delta(tx, from, -amount, vec![out], now)?;

            let inbound =
                EntryDraft::new(EntryKind::Transfer, amount, format!("Transfer from {from}"))
                    .referencing(Reference::Account(from));
            balance::apply_delta(tx, to, amount, vec![inbound], now)?;

            sent.pop()
                .ok_or(CoreError::Unbalanced {
                    account: from,
                    delta: -amount,
                    entries: Amount::ZERO,
                })
        })
    }
}
