//! Tournaments: lifecycle, registration, scoring and prize distribution.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::{CoreError, Engine, Resource, StateError, balance, require_admin};
use crate::Amount;
use crate::model::{
    AccountId, Caller, EntryDraft, EntryKind, Participant, Reference, Tournament, TournamentId,
    TournamentStatus,
};
use crate::store::{Store, Table, UnitOfWork};

/// Share of the prize pool, in percent, paid to ranks 1, 2 and 3.
pub const PRIZE_SHARES: [u8; 3] = [50, 30, 20];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    #[serde(rename = "account_id")]
    pub account: AccountId,
    pub score: i64,
    pub prize_won: Amount,
}

impl<S: Store> Engine<S> {
    pub fn create_tournament(
        &self,
        caller: Caller,
        name: &str,
        entry_fee: Amount,
        prize_pool: Amount,
        max_participants: usize,
    ) -> Result<Tournament, CoreError> {
        require_admin(&caller)?;
        if entry_fee.is_negative() {
            return Err(CoreError::InvalidAmount(entry_fee));
        }
        if prize_pool.is_negative() {
            return Err(CoreError::InvalidAmount(prize_pool));
        }
        if max_participants == 0 {
            return Err(CoreError::InvalidCapacity(max_participants));
        }
        let tournament = self.atomically(|tx| {
            let tournament = Tournament {
                id: tx.next_id(Table::Tournaments)?,
                name: name.to_string(),
                status: TournamentStatus::Draft,
                entry_fee,
                prize_pool,
                max_participants,
                created_at: Utc::now(),
            };
            tx.put_tournament(&tournament)?;
            Ok(tournament)
        })?;
        info!(tournament = tournament.id, name, "tournament created");
        Ok(tournament)
    }

    /// Draft to open: registration starts.
    pub fn open_tournament(
        &self,
        caller: Caller,
        tournament: TournamentId,
    ) -> Result<Tournament, CoreError> {
        require_admin(&caller)?;
        self.atomically(|tx| {
            let mut row = load_tournament(tx, tournament)?;
            if row.status != TournamentStatus::Draft {
                return Err(StateError::TournamentNotDraft(tournament).into());
            }
            row.status = TournamentStatus::Open;
            tx.put_tournament(&row)?;
            Ok(row)
        })
    }

    /// Open to in progress: registration closes and scoring starts.
    pub fn start_tournament(
        &self,
        caller: Caller,
        tournament: TournamentId,
    ) -> Result<Tournament, CoreError> {
        require_admin(&caller)?;
        self.atomically(|tx| {
            let mut row = load_tournament(tx, tournament)?;
            if row.status != TournamentStatus::Open {
                return Err(StateError::TournamentNotOpen(tournament).into());
            }
            row.status = TournamentStatus::InProgress;
            tx.put_tournament(&row)?;
            Ok(row)
        })
    }

    /// Register the caller, charging the entry fee.
    pub fn join(&self, caller: Caller, tournament: TournamentId) -> Result<Participant, CoreError> {
        let result = self.atomically(|tx| {
            let row = load_tournament(tx, tournament)?;
            if row.status != TournamentStatus::Open {
                return Err(StateError::TournamentNotOpen(tournament).into());
            }
            let roster = tx.participants(tournament)?;
            if roster.len() >= row.max_participants {
                return Err(StateError::TournamentFull(tournament).into());
            }
            if roster.iter().any(|p| p.account == caller.account) {
                return Err(CoreError::AlreadyJoined {
                    account: caller.account,
                    tournament,
                });
            }

            let now = Utc::now();
            if row.entry_fee.is_positive() {
                let leg = EntryDraft::new(
                    EntryKind::TournamentEntry,
                    -row.entry_fee,
                    format!("Tournament entry: {}", row.name),
                )
                .referencing(Reference::Tournament(tournament));
                balance::apply_delta(tx, caller.account, -row.entry_fee, vec![leg], now)?;
            }

            let participant = Participant {
                id: tx.next_id(Table::Participants)?,
                tournament,
                account: caller.account,
                score: 0,
                rank: None,
                prize_won: Amount::ZERO,
                joined_at: now,
            };
            tx.put_participant(&participant)?;
            Ok(participant)
        });
        Self::log_result("tournament join", caller.account, None, &result);
        result
    }

    /// Withdraw the caller before the tournament starts, refunding the fee.
    pub fn leave(&self, caller: Caller, tournament: TournamentId) -> Result<(), CoreError> {
        let result = self.atomically(|tx| {
            let row = load_tournament(tx, tournament)?;
            if !matches!(
                row.status,
                TournamentStatus::Draft | TournamentStatus::Open
            ) {
                return Err(StateError::TournamentNotOpen(tournament).into());
            }
            let participant = find_participant(tx, tournament, caller.account)?;

            if row.entry_fee.is_positive() {
                refund_fee(tx, &row, caller.account)?;
            }
            tx.remove_participant(participant.id)?;
            Ok(())
        });
        Self::log_result("tournament leave", caller.account, None, &result);
        result
    }

    /// Add `delta` points to `account`'s score. Scores only go up.
    pub fn update_score(
        &self,
        caller: Caller,
        tournament: TournamentId,
        account: AccountId,
        delta: i64,
    ) -> Result<Participant, CoreError> {
        require_admin(&caller)?;
        if delta < 0 {
            return Err(CoreError::InvalidScore(delta));
        }
        self.atomically(|tx| {
            let row = load_tournament(tx, tournament)?;
            if row.status != TournamentStatus::InProgress {
                return Err(StateError::TournamentNotActive(tournament).into());
            }
            let mut participant = find_participant(tx, tournament, account)?;
            participant.score = participant
                .score
                .checked_add(delta)
                .ok_or(CoreError::InvalidScore(delta))?;
            tx.put_participant(&participant)?;
            Ok(participant)
        })
    }

    /// Rank every participant and pay the top three their share of the
    /// prize pool. Returns the participants in rank order.
    pub fn end_tournament(
        &self,
        caller: Caller,
        tournament: TournamentId,
    ) -> Result<Vec<Participant>, CoreError> {
        require_admin(&caller)?;
        let result = self.atomically(|tx| {
            let mut row = load_tournament(tx, tournament)?;
            if row.status.is_terminal() {
                return Err(StateError::TournamentFinished(tournament).into());
            }
            if row.status != TournamentStatus::InProgress {
                return Err(StateError::TournamentNotActive(tournament).into());
            }

            let now = Utc::now();
            let mut ranked = tx.participants(tournament)?;
            rank_order(&mut ranked);
            for (position, participant) in ranked.iter_mut().enumerate() {
                participant.rank = Some(position as u32 + 1);
                let prize = PRIZE_SHARES
                    .get(position)
                    .map_or(Amount::ZERO, |share| row.prize_pool.percent(*share));
                if prize.is_positive() {
                    let leg = EntryDraft::new(
                        EntryKind::TournamentPrize,
                        prize,
                        format!("Tournament prize: {}", row.name),
                    )
                    .referencing(Reference::Tournament(tournament));
                    balance::apply_delta(tx, participant.account, prize, vec![leg], now)?;
                    participant.prize_won = prize;
                }
                tx.put_participant(participant)?;
            }

            row.status = TournamentStatus::Completed;
            tx.put_tournament(&row)?;
            Ok(ranked)
        });
        match &result {
            Ok(ranked) => info!(tournament, participants = ranked.len(), "tournament ended"),
            Err(e) => info!(tournament, reason = %e, "tournament end rejected"),
        }
        result
    }

    /// Cancel a tournament that has not finished and refund every entry fee.
    pub fn cancel_tournament(
        &self,
        caller: Caller,
        tournament: TournamentId,
    ) -> Result<Tournament, CoreError> {
        require_admin(&caller)?;
        let result = self.atomically(|tx| {
            let mut row = load_tournament(tx, tournament)?;
            if row.status.is_terminal() {
                return Err(StateError::TournamentFinished(tournament).into());
            }
            if row.entry_fee.is_positive() {
                for participant in tx.participants(tournament)? {
                    refund_fee(tx, &row, participant.account)?;
                }
            }
            row.status = TournamentStatus::Cancelled;
            tx.put_tournament(&row)?;
            Ok(row)
        });
        match &result {
            Ok(_) => info!(tournament, "tournament cancelled"),
            Err(e) => info!(tournament, reason = %e, "tournament cancel rejected"),
        }
        result
    }

    /// Current standings, highest score first.
    pub fn leaderboard(&self, tournament: TournamentId) -> Result<Vec<LeaderboardEntry>, CoreError> {
        self.atomically(|tx| {
            load_tournament(tx, tournament)?;
            let mut roster = tx.participants(tournament)?;
            rank_order(&mut roster);
            Ok(roster
                .into_iter()
                .enumerate()
                .map(|(position, p)| LeaderboardEntry {
                    rank: position as u32 + 1,
                    account: p.account,
                    score: p.score,
                    prize_won: p.prize_won,
                })
                .collect())
        })
    }
}

/// Highest score first. The sort is stable, so equal scores keep join order.
fn rank_order(participants: &mut [Participant]) {
    participants.sort_by(|a, b| b.score.cmp(&a.score));
}

fn load_tournament(tx: &dyn UnitOfWork, tournament: TournamentId) -> Result<Tournament, CoreError> {
    tx.tournament(tournament)?
        .ok_or(CoreError::NotFound(Resource::Tournament, tournament))
}

fn find_participant(
    tx: &dyn UnitOfWork,
    tournament: TournamentId,
    account: AccountId,
) -> Result<Participant, CoreError> {
    tx.participants(tournament)?
        .into_iter()
        .find(|p| p.account == account)
        .ok_or_else(|| StateError::NotParticipant { account, tournament }.into())
}

fn refund_fee(
    tx: &mut dyn UnitOfWork,
    tournament: &Tournament,
    account: AccountId,
) -> Result<(), CoreError> {
    let leg = EntryDraft::new(
        EntryKind::Refund,
        tournament.entry_fee,
        format!("Tournament refund: {}", tournament.name),
    )
    .referencing(Reference::Tournament(tournament.id));
    balance::apply_delta(tx, account, tournament.entry_fee, vec![leg], Utc::now())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{amount, assert_invariant, balance, engine_with_admin, funded_player};
    use super::*;
    use crate::Engine;
    use crate::store::EntryFilter;

    /// An in-progress tournament with a 1000 pool, a 100 fee and one
    /// participant per entry in `scores`, joined in order.
    fn running(engine: &Engine, admin: Caller, scores: &[i64]) -> (TournamentId, Vec<Caller>) {
        let t = engine
            .create_tournament(admin, "cup", amount(100), amount(1_000), 8)
            .unwrap()
            .id;
        engine.open_tournament(admin, t).unwrap();
        let players: Vec<_> = scores
            .iter()
            .map(|_| {
                let player = funded_player(engine, 100);
                engine.join(player, t).unwrap();
                player
            })
            .collect();
        engine.start_tournament(admin, t).unwrap();
        for (player, score) in players.iter().zip(scores) {
            engine
                .update_score(admin, t, player.account, *score)
                .unwrap();
        }
        (t, players)
    }

    // Registration

    #[test]
    fn join_charges_entry_fee() {
        let (engine, admin) = engine_with_admin();
        let player = funded_player(&engine, 250);
        let t = engine
            .create_tournament(admin, "cup", amount(100), amount(1_000), 2)
            .unwrap()
            .id;
        engine.open_tournament(admin, t).unwrap();

        let participant = engine.join(player, t).unwrap();
        assert_eq!(participant.score, 0);
        assert_eq!(participant.rank, None);
        assert_eq!(balance(&engine, player), amount(150));

        let fees = engine
            .ledger_entries(
                player,
                EntryFilter {
                    kind: Some(EntryKind::TournamentEntry),
                    ..EntryFilter::account(player.account)
                },
            )
            .unwrap();
        assert_eq!(fees.len(), 1);
        assert_eq!(fees[0].amount, amount(-100));
        assert_eq!(fees[0].reference, Some(Reference::Tournament(t)));
        assert_invariant(&engine);
    }

    #[test]
    fn join_enforces_status_capacity_and_uniqueness() {
        let (engine, admin) = engine_with_admin();
        let t = engine
            .create_tournament(admin, "cup", Amount::ZERO, Amount::ZERO, 1)
            .unwrap()
            .id;
        let first = funded_player(&engine, 0);
        let second = funded_player(&engine, 0);

        assert!(matches!(
            engine.join(first, t),
            Err(CoreError::InvalidState(StateError::TournamentNotOpen(_)))
        ));
        engine.open_tournament(admin, t).unwrap();
        engine.join(first, t).unwrap();
        assert!(matches!(
            engine.join(second, t),
            Err(CoreError::InvalidState(StateError::TournamentFull(_)))
        ));
        // capacity is checked before membership
        assert!(matches!(
            engine.join(first, t),
            Err(CoreError::InvalidState(StateError::TournamentFull(_)))
        ));
    }

    #[test]
    fn join_twice_is_a_conflict() {
        let (engine, admin) = engine_with_admin();
        let t = engine
            .create_tournament(admin, "cup", Amount::ZERO, Amount::ZERO, 4)
            .unwrap()
            .id;
        engine.open_tournament(admin, t).unwrap();
        let player = funded_player(&engine, 0);
        engine.join(player, t).unwrap();

        let err = engine.join(player, t).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyJoined { .. }));
        assert_eq!(err.kind(), crate::engine::ErrorKind::Conflict);
    }

    #[test]
    fn join_needs_the_fee() {
        let (engine, admin) = engine_with_admin();
        let t = engine
            .create_tournament(admin, "cup", amount(100), Amount::ZERO, 4)
            .unwrap()
            .id;
        engine.open_tournament(admin, t).unwrap();
        let player = funded_player(&engine, 99);

        assert!(matches!(
            engine.join(player, t),
            Err(CoreError::InsufficientFunds { .. })
        ));
        assert!(engine.leaderboard(t).unwrap().is_empty());
    }

    #[test]
    fn leave_refunds_before_start_only() {
        let (engine, admin) = engine_with_admin();
        let t = engine
            .create_tournament(admin, "cup", amount(100), Amount::ZERO, 4)
            .unwrap()
            .id;
        engine.open_tournament(admin, t).unwrap();
        let player = funded_player(&engine, 100);
        let stayer = funded_player(&engine, 100);
        engine.join(player, t).unwrap();
        engine.join(stayer, t).unwrap();

        engine.leave(player, t).unwrap();
        assert_eq!(balance(&engine, player), amount(100));
        assert!(matches!(
            engine.leave(player, t),
            Err(CoreError::InvalidState(StateError::NotParticipant { .. }))
        ));

        engine.start_tournament(admin, t).unwrap();
        assert!(matches!(
            engine.leave(stayer, t),
            Err(CoreError::InvalidState(StateError::TournamentNotOpen(_)))
        ));
        assert_eq!(balance(&engine, stayer), Amount::ZERO);
        assert_invariant(&engine);
    }

    // Scoring

    #[test]
    fn scores_accumulate_while_in_progress() {
        let (engine, admin) = engine_with_admin();
        let (t, players) = running(&engine, admin, &[10]);

        let participant = engine
            .update_score(admin, t, players[0].account, 5)
            .unwrap();
        assert_eq!(participant.score, 15);

        assert!(matches!(
            engine.update_score(admin, t, players[0].account, -1),
            Err(CoreError::InvalidScore(-1))
        ));
        assert!(matches!(
            engine.update_score(admin, t, 999, 1),
            Err(CoreError::InvalidState(StateError::NotParticipant { .. }))
        ));
        assert!(matches!(
            engine.update_score(players[0], t, players[0].account, 1),
            Err(CoreError::Unauthorized(_))
        ));
    }

    // End

    #[test]
    fn ending_pays_fifty_thirty_twenty() {
        let (engine, admin) = engine_with_admin();
        let (t, players) = running(&engine, admin, &[10, 30, 20]);

        let ranked = engine.end_tournament(admin, t).unwrap();
        let order: Vec<_> = ranked.iter().map(|p| (p.account, p.rank)).collect();
        assert_eq!(
            order,
            vec![
                (players[1].account, Some(1)),
                (players[2].account, Some(2)),
                (players[0].account, Some(3)),
            ]
        );
        assert_eq!(balance(&engine, players[1]), amount(500));
        assert_eq!(balance(&engine, players[2]), amount(300));
        assert_eq!(balance(&engine, players[0]), amount(200));

        let prizes = engine
            .ledger_entries(
                admin,
                EntryFilter {
                    kind: Some(EntryKind::TournamentPrize),
                    ..EntryFilter::default()
                },
            )
            .unwrap();
        assert_eq!(prizes.len(), 3);

        assert!(matches!(
            engine.end_tournament(admin, t),
            Err(CoreError::InvalidState(StateError::TournamentFinished(_)))
        ));
        assert_eq!(
            engine.tournament(t).unwrap().status,
            TournamentStatus::Completed
        );
        assert_invariant(&engine);
    }

    #[test]
    fn ties_keep_join_order_and_late_ranks_get_nothing() {
        let (engine, admin) = engine_with_admin();
        let (t, players) = running(&engine, admin, &[5, 5, 5, 5]);

        let ranked = engine.end_tournament(admin, t).unwrap();
        let accounts: Vec<_> = ranked.iter().map(|p| p.account).collect();
        let joined: Vec<_> = players.iter().map(|p| p.account).collect();
        assert_eq!(accounts, joined);
        assert_eq!(ranked[3].rank, Some(4));
        assert_eq!(ranked[3].prize_won, Amount::ZERO);
        assert_eq!(balance(&engine, players[3]), Amount::ZERO);

        let board = engine.leaderboard(t).unwrap();
        assert_eq!(board[0].prize_won, amount(500));
        assert_eq!(board[3].rank, 4);
    }

    #[test]
    fn empty_pool_still_ranks_everyone() {
        let (engine, admin) = engine_with_admin();
        let t = engine
            .create_tournament(admin, "friendly", Amount::ZERO, Amount::ZERO, 4)
            .unwrap()
            .id;
        engine.open_tournament(admin, t).unwrap();
        let a = funded_player(&engine, 0);
        let b = funded_player(&engine, 0);
        engine.join(a, t).unwrap();
        engine.join(b, t).unwrap();
        engine.start_tournament(admin, t).unwrap();
        engine.update_score(admin, t, b.account, 3).unwrap();

        let ranked = engine.end_tournament(admin, t).unwrap();
        assert_eq!(ranked[0].account, b.account);
        assert!(ranked.iter().all(|p| p.rank.is_some()));
        assert!(ranked.iter().all(|p| p.prize_won == Amount::ZERO));
        assert!(
            engine
                .ledger_entries(admin, EntryFilter::default())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn failed_commit_pays_no_one() {
        let (engine, admin) = engine_with_admin();
        let (t, players) = running(&engine, admin, &[3, 2, 1]);

        engine.store().fail_next_commit();
        assert!(matches!(
            engine.end_tournament(admin, t),
            Err(CoreError::Store(_))
        ));
        for player in &players {
            assert_eq!(balance(&engine, *player), Amount::ZERO);
        }
        assert_eq!(
            engine.tournament(t).unwrap().status,
            TournamentStatus::InProgress
        );
        assert!(engine.leaderboard(t).unwrap().iter().all(|e| e.prize_won == Amount::ZERO));
        assert_invariant(&engine);
    }

    #[test]
    fn end_requires_in_progress() {
        let (engine, admin) = engine_with_admin();
        let t = engine
            .create_tournament(admin, "cup", Amount::ZERO, amount(100), 4)
            .unwrap()
            .id;
        assert!(matches!(
            engine.end_tournament(admin, t),
            Err(CoreError::InvalidState(StateError::TournamentNotActive(_)))
        ));
    }

    // Cancel

    #[test]
    fn cancel_refunds_every_fee() {
        let (engine, admin) = engine_with_admin();
        let (t, players) = running(&engine, admin, &[1, 2]);

        let cancelled = engine.cancel_tournament(admin, t).unwrap();
        assert_eq!(cancelled.status, TournamentStatus::Cancelled);
        for player in &players {
            assert_eq!(balance(&engine, *player), amount(100));
        }
        assert!(matches!(
            engine.cancel_tournament(admin, t),
            Err(CoreError::InvalidState(StateError::TournamentFinished(_)))
        ));
        assert_invariant(&engine);
    }

    #[test]
    fn creation_is_validated() {
        let (engine, admin) = engine_with_admin();
        assert!(matches!(
            engine.create_tournament(admin, "cup", amount(-1), Amount::ZERO, 4),
            Err(CoreError::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.create_tournament(admin, "cup", Amount::ZERO, Amount::ZERO, 0),
            Err(CoreError::InvalidCapacity(0))
        ));
        let t = engine
            .create_tournament(admin, "cup", Amount::ZERO, Amount::ZERO, 4)
            .unwrap()
            .id;
        assert!(matches!(
            engine.start_tournament(admin, t),
            Err(CoreError::InvalidState(StateError::TournamentNotOpen(_)))
        ));
        engine.open_tournament(admin, t).unwrap();
        assert!(matches!(
            engine.open_tournament(admin, t),
            Err(CoreError::InvalidState(StateError::TournamentNotDraft(_)))
        ));
    }
}
