//! Instant games: catalogue admin and single-round play.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::{CoreError, Engine, Resource, StateError, balance, require_admin, require_positive};
use crate::draw::{self, Dice, Draw, RandomSource, Reels};
use crate::model::{
    Caller, EntryDraft, EntryKind, Game, GameCategory, GameId, GameStatus, Reference, Wager,
    WagerKind, WagerStatus,
};
use crate::store::{Store, Table};
use crate::{Amount, Odds};

/// Result of one round, as returned to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayResult {
    pub wager: Wager,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reels: Option<Reels>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dice: Option<Dice>,
    /// Sum of the dice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<u8>,
    pub won: bool,
    pub payout: Amount,
    pub multiplier: Odds,
    pub new_balance: Amount,
}

impl<S: Store> Engine<S> {
    pub fn create_game(
        &self,
        caller: Caller,
        name: &str,
        category: GameCategory,
        min_bet: Amount,
        max_bet: Amount,
    ) -> Result<Game, CoreError> {
        require_admin(&caller)?;
        require_positive(min_bet)?;
        if max_bet < min_bet {
            return Err(CoreError::InvalidAmount(max_bet));
        }
        let game = self.atomically(|tx| {
            let game = Game {
                id: tx.next_id(Table::Games)?,
                name: name.to_string(),
                category,
                status: GameStatus::Active,
                min_bet,
                max_bet,
            };
            tx.put_game(&game)?;
            Ok(game)
        })?;
        info!(game = game.id, category = ?category, "game created");
        Ok(game)
    }

    pub fn set_game_status(
        &self,
        caller: Caller,
        game: GameId,
        status: GameStatus,
    ) -> Result<Game, CoreError> {
        require_admin(&caller)?;
        self.atomically(|tx| {
            let mut row = tx
                .game(game)?
                .ok_or(CoreError::NotFound(Resource::Game, game))?;
            row.status = status;
            tx.put_game(&row)?;
            Ok(row)
        })
    }

    /// Play one round of `game`, staking `amount`. The wager is settled in the
    /// same unit of work it is created in.
    pub fn play<R>(
        &self,
        caller: Caller,
        game: GameId,
        amount: Amount,
        rng: &mut R,
    ) -> Result<PlayResult, CoreError>
    where
        R: RandomSource + ?Sized,
    {
        let result = self.play_inner(caller, game, amount, rng);
        Self::log_result("play", caller.account, Some(amount), &result);
        result
    }

    fn play_inner<R>(
        &self,
        caller: Caller,
        game: GameId,
        amount: Amount,
        rng: &mut R,
    ) -> Result<PlayResult, CoreError>
    where
        R: RandomSource + ?Sized,
    {
        self.atomically(|tx| {
            let row = tx
                .game(game)?
                .ok_or(CoreError::NotFound(Resource::Game, game))?;
            if row.status != GameStatus::Active {
                return Err(StateError::GameInactive(game).into());
            }
            if amount < row.min_bet || amount > row.max_bet {
                return Err(CoreError::BetOutOfRange {
                    game,
                    amount,
                    min: row.min_bet,
                    max: row.max_bet,
                });
            }

            let (resolve, label): (fn(&mut R) -> Draw, _) = match row.category {
                GameCategory::Slots => (|rng| Draw::Slots(draw::spin(rng)), "Slot machine"),
                GameCategory::Dice => (|rng| Draw::Dice(draw::roll(rng)), "Dice game"),
                GameCategory::Other => return Err(StateError::GameNotPlayable(game).into()),
            };

            // a refused round must not consume draws
            let player = tx
                .account(caller.account)?
                .ok_or(CoreError::NotFound(Resource::Account, caller.account))?;
            balance::ensure_can_debit(&player, amount)?;

            let round = resolve(rng);
            let multiplier = round.multiplier();
            let won = !multiplier.is_zero();
            let payout = amount
                .apply_odds(multiplier)
                .ok_or(CoreError::InvalidAmount(amount))?;

            let now = Utc::now();
            let wager = Wager {
                id: tx.next_id(Table::Wagers)?,
                account: caller.account,
                kind: WagerKind::Game,
                game: Some(game),
                event: None,
                outcome: None,
                amount,
                odds: multiplier,
                status: if won { WagerStatus::Won } else { WagerStatus::Lost },
                payout,
                settled_at: Some(now),
                created_at: now,
            };

            let reference = Reference::Wager(wager.id);
            let mut legs = vec![
                EntryDraft::new(EntryKind::Bet, -amount, format!("{label} bet"))
                    .referencing(reference),
            ];
            if won {
                legs.push(
                    EntryDraft::new(EntryKind::Win, payout, format!("{label} win"))
                        .referencing(reference),
                );
            }
            let delta = payout.checked_sub(amount).ok_or(CoreError::Overflow)?;
            let (account, _) = balance::apply_delta(tx, caller.account, delta, legs, now)?;
            tx.put_wager(&wager)?;

            let (reels, dice) = match round {
                Draw::Slots(reels) => (Some(reels), None),
                Draw::Dice(dice) => (None, Some(dice)),
            };
            Ok(PlayResult {
                wager,
                reels,
                target: dice.map(|[a, b]| a + b),
                dice,
                won,
                payout,
                multiplier,
                new_balance: account.balance,
            })
        })
    }
}
