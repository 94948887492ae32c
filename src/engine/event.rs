//! Sports-style events: catalogue admin, bet placement, settlement and
//! cancellation.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::{CoreError, Engine, Resource, StateError, balance, require_admin, require_positive};
use crate::model::{
    Caller, EntryDraft, EntryKind, Event, EventId, EventStatus, Outcome, OutcomeId, Reference,
    Wager, WagerKind, WagerStatus,
};
use crate::store::{Store, Table, UnitOfWork, WagerFilter};
use crate::{Amount, Odds};

/// What a settlement or cancellation did to the event's pending wagers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettlementReport {
    pub event: EventId,
    pub won: usize,
    pub lost: usize,
    pub refunded: usize,
    /// Total credited back to players, payouts or refunds.
    pub paid: Amount,
}

impl<S: Store> Engine<S> {
    pub fn create_event(&self, caller: Caller, name: &str) -> Result<Event, CoreError> {
        require_admin(&caller)?;
        let event = self.atomically(|tx| {
            let event = Event {
                id: tx.next_id(Table::Events)?,
                name: name.to_string(),
                status: EventStatus::Upcoming,
                created_at: Utc::now(),
            };
            tx.put_event(&event)?;
            Ok(event)
        })?;
        info!(event = event.id, name, "event created");
        Ok(event)
    }

    /// Move an upcoming event to live. Bets stay open.
    pub fn start_event(&self, caller: Caller, event: EventId) -> Result<Event, CoreError> {
        require_admin(&caller)?;
        self.atomically(|tx| {
            let mut row = load_event(tx, event)?;
            if row.status != EventStatus::Upcoming {
                return Err(StateError::EventNotUpcoming(event).into());
            }
            row.status = EventStatus::Live;
            tx.put_event(&row)?;
            Ok(row)
        })
    }

    pub fn add_outcome(
        &self,
        caller: Caller,
        event: EventId,
        name: &str,
        odds: Odds,
    ) -> Result<Outcome, CoreError> {
        require_admin(&caller)?;
        require_paying_odds(odds)?;
        self.atomically(|tx| {
            let row = load_event(tx, event)?;
            if row.status.is_terminal() {
                return Err(StateError::EventAlreadySettled(event).into());
            }
            let outcome = Outcome {
                id: tx.next_id(Table::Outcomes)?,
                event,
                name: name.to_string(),
                odds,
                is_winner: None,
            };
            tx.put_outcome(&outcome)?;
            Ok(outcome)
        })
    }

    /// Reprice an outcome. Wagers already placed keep the odds they were
    /// placed at.
    pub fn set_outcome_odds(
        &self,
        caller: Caller,
        outcome: OutcomeId,
        odds: Odds,
    ) -> Result<Outcome, CoreError> {
        require_admin(&caller)?;
        require_paying_odds(odds)?;
        self.atomically(|tx| {
            let mut row = tx
                .outcome(outcome)?
                .ok_or(CoreError::NotFound(Resource::Outcome, outcome))?;
            if load_event(tx, row.event)?.status.is_terminal() {
                return Err(StateError::EventAlreadySettled(row.event).into());
            }
            row.odds = odds;
            tx.put_outcome(&row)?;
            Ok(row)
        })
    }

    /// Stake `amount` on `outcome`, freezing its current odds on the wager.
    pub fn place_bet(
        &self,
        caller: Caller,
        event: EventId,
        outcome: OutcomeId,
        amount: Amount,
    ) -> Result<Wager, CoreError> {
        let result = self.place_bet_inner(caller, event, outcome, amount);
        Self::log_result("event bet", caller.account, Some(amount), &result);
        result
    }

    /// Settle `event` with `winner` as the winning outcome and pay every
    /// pending wager on it.
    pub fn settle(
        &self,
        caller: Caller,
        event: EventId,
        winner: OutcomeId,
    ) -> Result<SettlementReport, CoreError> {
        require_admin(&caller)?;
        let result = self.atomically(|tx| {
            let mut row = load_event(tx, event)?;
            // must come before any wager is touched
            if row.status.is_terminal() {
                return Err(StateError::EventAlreadySettled(event).into());
            }
            let outcomes = tx.outcomes(event)?;
            if !outcomes.iter().any(|o| o.id == winner) {
                return Err(CoreError::NotFound(Resource::Outcome, winner));
            }
            for mut outcome in outcomes {
                outcome.is_winner = Some(outcome.id == winner);
                tx.put_outcome(&outcome)?;
            }

            let now = Utc::now();
            let mut report = SettlementReport {
                event,
                ..SettlementReport::default()
            };
            for mut wager in tx.wagers(&WagerFilter::pending_on(event))? {
                wager.settled_at = Some(now);
                if wager.outcome == Some(winner) {
                    let payout = wager
                        .amount
                        .apply_odds(wager.odds)
                        .ok_or(CoreError::InvalidAmount(wager.amount))?;
                    wager.status = WagerStatus::Won;
                    wager.payout = payout;
                    let leg = EntryDraft::new(
                        EntryKind::Win,
                        payout,
                        format!("Event win: {}", row.name),
                    )
                    .referencing(Reference::Wager(wager.id));
                    balance::apply_delta(tx, wager.account, payout, vec![leg], now)?;
                    report.won += 1;
                    report.paid = report.paid.checked_add(payout).ok_or(CoreError::Overflow)?;
                } else {
                    wager.status = WagerStatus::Lost;
                    report.lost += 1;
                }
                tx.put_wager(&wager)?;
            }

            row.status = EventStatus::Completed;
            tx.put_event(&row)?;
            Ok(report)
        });
        log_settlement("settle", event, &result);
        result
    }

    /// Cancel `event` and refund the stake of every pending wager on it.
    pub fn cancel(&self, caller: Caller, event: EventId) -> Result<SettlementReport, CoreError> {
        require_admin(&caller)?;
        let result = self.atomically(|tx| {
            let mut row = load_event(tx, event)?;
            if row.status.is_terminal() {
                return Err(StateError::EventAlreadySettled(event).into());
            }

            let now = Utc::now();
            let mut report = SettlementReport {
                event,
                ..SettlementReport::default()
            };
            for mut wager in tx.wagers(&WagerFilter::pending_on(event))? {
                let leg = EntryDraft::new(
                    EntryKind::Refund,
                    wager.amount,
                    format!("Event cancelled: {}", row.name),
                )
                .referencing(Reference::Wager(wager.id));
                balance::apply_delta(tx, wager.account, wager.amount, vec![leg], now)?;

                wager.status = WagerStatus::Refunded;
                wager.settled_at = Some(now);
                tx.put_wager(&wager)?;
                report.refunded += 1;
                report.paid = report
                    .paid
                    .checked_add(wager.amount)
                    .ok_or(CoreError::Overflow)?;
            }

            row.status = EventStatus::Cancelled;
            tx.put_event(&row)?;
            Ok(report)
        });
        log_settlement("cancel", event, &result);
        result
    }

    fn place_bet_inner(
        &self,
        caller: Caller,
        event: EventId,
        outcome: OutcomeId,
        amount: Amount,
    ) -> Result<Wager, CoreError> {
        require_positive(amount)?;
        self.atomically(|tx| {
            let row = load_event(tx, event)?;
            if !row.status.is_bettable() {
                return Err(StateError::EventNotBettable(event).into());
            }
            let picked = tx
                .outcome(outcome)?
                .filter(|o| o.event == event)
                .ok_or(CoreError::NotFound(Resource::Outcome, outcome))?;

            let now = Utc::now();
            let wager = Wager {
                id: tx.next_id(Table::Wagers)?,
                account: caller.account,
                kind: WagerKind::Event,
                game: None,
                event: Some(event),
                outcome: Some(outcome),
                amount,
                odds: picked.odds,
                status: WagerStatus::Pending,
                payout: Amount::ZERO,
                settled_at: None,
                created_at: now,
            };
            let leg = EntryDraft::new(EntryKind::Bet, -amount, format!("Event bet: {}", row.name))
                .referencing(Reference::Wager(wager.id));
            balance::apply_delta(tx, caller.account, -amount, vec![leg], now)?;
            tx.put_wager(&wager)?;
            Ok(wager)
        })
    }
}

fn load_event(tx: &dyn UnitOfWork, event: EventId) -> Result<Event, CoreError> {
    tx.event(event)?
        .ok_or(CoreError::NotFound(Resource::Event, event))
}

/// Odds of 1.00 or less would never pay more than the stake.
fn require_paying_odds(odds: Odds) -> Result<(), CoreError> {
    if odds > Odds::EVEN {
        Ok(())
    } else {
        Err(CoreError::InvalidOdds(odds))
    }
}

fn log_settlement(operation: &str, event: EventId, result: &Result<SettlementReport, CoreError>) {
    match result {
        Ok(report) => info!(
            event,
            won = report.won,
            lost = report.lost,
            refunded = report.refunded,
            paid = %report.paid,
            "{operation} applied"
        ),
        Err(e) => info!(event, reason = %e, "{operation} rejected"),
    }
}
