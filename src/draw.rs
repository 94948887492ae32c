//! Instant-game resolvers.
//!
//! Every draw goes through a [`RandomSource`] supplied by the caller, so the
//! resolvers are deterministic for a given sequence of draws.

use rand::Rng;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;

use crate::Odds;

/// Uniform integer draws.
pub trait RandomSource {
    /// A value drawn uniformly from `0..upper`. `upper` is never zero.
    fn draw(&mut self, upper: u32) -> u32;
}

impl RandomSource for ChaCha20Rng {
    fn draw(&mut self, upper: u32) -> u32 {
        self.gen_range(0..upper)
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted.
///
/// Each value is reduced modulo the requested bound.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDraws {
    draws: Vec<u32>,
    cursor: usize,
}

impl ScriptedDraws {
    pub fn new(draws: Vec<u32>) -> Self {
        Self {
            draws,
            cursor: 0,
        }
    }
}

impl RandomSource for ScriptedDraws {
    fn draw(&mut self, upper: u32) -> u32 {
        if self.draws.is_empty() {
            return 0;
        }
        let value = self.draws[self.cursor % self.draws.len()];
        self.cursor += 1;
        value % upper
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    Cherry,
    Lemon,
    Orange,
    Grape,
    Strawberry,
    Star,
    Seven,
}

impl Symbol {
    pub const ALL: [Symbol; 7] = [
        Symbol::Cherry,
        Symbol::Lemon,
        Symbol::Orange,
        Symbol::Grape,
        Symbol::Strawberry,
        Symbol::Star,
        Symbol::Seven,
    ];

    /// Payout for three of a kind.
    pub fn multiplier(self) -> Odds {
        let whole = match self {
            Symbol::Cherry => 2,
            Symbol::Lemon => 3,
            Symbol::Orange => 4,
            Symbol::Grape => 5,
            Symbol::Strawberry => 10,
            Symbol::Star => 20,
            Symbol::Seven => 50,
        };
        Odds::from_hundredths(whole * 100)
    }
}

pub type Reels = [Symbol; 3];
pub type Dice = [u8; 2];

pub fn spin(rng: &mut (impl RandomSource + ?Sized)) -> Reels {
    let mut reel = || Symbol::ALL[rng.draw(Symbol::ALL.len() as u32) as usize];
    [reel(), reel(), reel()]
}

/// Three of a kind pays the symbol's multiplier, a pair pays a quarter of it.
/// Pairs are looked up as (0,1), then (1,2), then (0,2).
pub fn slot_multiplier(reels: &Reels) -> Odds {
    let [a, b, c] = *reels;
    if a == b && b == c {
        return a.multiplier();
    }
    let paired = if a == b {
        Some(a)
    } else if b == c {
        Some(b)
    } else if a == c {
        Some(a)
    } else {
        None
    };
    paired.map_or(Odds::ZERO, |symbol| symbol.multiplier().quarter())
}

pub fn roll(rng: &mut (impl RandomSource + ?Sized)) -> Dice {
    let mut die = || rng.draw(6) as u8 + 1;
    [die(), die()]
}

/// Tiers are checked in order: 7, then 2 or 11, then doubles, then 8 to 10.
pub fn dice_multiplier(dice: &Dice) -> Odds {
    let [first, second] = *dice;
    let hundredths = match first + second {
        7 => 400,
        2 | 11 => 700,
        _ if first == second => 300,
        8..=10 => 150,
        _ => 0,
    };
    Odds::from_hundredths(hundredths)
}

/// Outcome of one instant-game round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Draw {
    Slots(Reels),
    Dice(Dice),
}

impl Draw {
    pub fn multiplier(&self) -> Odds {
        match self {
            Draw::Slots(reels) => slot_multiplier(reels),
            Draw::Dice(dice) => dice_multiplier(dice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use super::Symbol::*;

    fn odds(hundredths: u32) -> Odds {
        Odds::from_hundredths(hundredths)
    }

    #[test]
    fn three_of_a_kind_pays_full_multiplier() {
        assert_eq!(slot_multiplier(&[Strawberry; 3]), odds(1_000));
        assert_eq!(slot_multiplier(&[Seven; 3]), odds(5_000));
        assert_eq!(slot_multiplier(&[Cherry; 3]), odds(200));
    }

    #[test]
    fn pair_pays_a_quarter() {
        assert_eq!(slot_multiplier(&[Star, Star, Lemon]), odds(500));
        assert_eq!(slot_multiplier(&[Lemon, Grape, Grape]), odds(125));
        assert_eq!(slot_multiplier(&[Orange, Cherry, Orange]), odds(100));
    }

    #[test]
    fn no_match_pays_nothing() {
        assert_eq!(slot_multiplier(&[Cherry, Lemon, Orange]), Odds::ZERO);
    }

    #[test]
    fn spin_reads_one_draw_per_reel() {
        let mut draws = ScriptedDraws::new(vec![4, 4, 4]);
        assert_eq!(spin(&mut draws), [Strawberry; 3]);

        let mut draws = ScriptedDraws::new(vec![0, 6, 13]);
        assert_eq!(spin(&mut draws), [Cherry, Seven, Seven]);
    }

    #[test]
    fn dice_tiers() {
        assert_eq!(dice_multiplier(&[3, 4]), odds(400));
        assert_eq!(dice_multiplier(&[1, 6]), odds(400));
        assert_eq!(dice_multiplier(&[1, 1]), odds(700));
        assert_eq!(dice_multiplier(&[5, 6]), odds(700));
        assert_eq!(dice_multiplier(&[2, 2]), odds(300));
        assert_eq!(dice_multiplier(&[4, 4]), odds(300));
        assert_eq!(dice_multiplier(&[6, 6]), odds(300));
        assert_eq!(dice_multiplier(&[2, 6]), odds(150));
        assert_eq!(dice_multiplier(&[4, 6]), odds(150));
        assert_eq!(dice_multiplier(&[1, 2]), Odds::ZERO);
        assert_eq!(dice_multiplier(&[1, 5]), Odds::ZERO);
    }

    #[test]
    fn roll_maps_draws_to_faces() {
        let mut draws = ScriptedDraws::new(vec![2, 3]);
        assert_eq!(roll(&mut draws), [3, 4]);
    }

    #[test]
    fn seeded_rng_stays_in_range() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        for _ in 0..1_000 {
            let [a, b] = roll(&mut rng);
            assert!((1..=6).contains(&a) && (1..=6).contains(&b));
        }
    }

    #[test]
    fn empty_script_draws_zero() {
        let mut draws = ScriptedDraws::default();
        assert_eq!(draws.draw(6), 0);
    }
}
