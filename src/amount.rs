use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to read a decimal string as an [`Amount`] or [`Odds`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseAmountError {
    #[error("'{0}' is not a decimal number")]
    Malformed(String),
    #[error("'{0}' has more than two decimal places")]
    TooPrecise(String),
    #[error("'{0}' is out of range")]
    OutOfRange(String),
}

/// Parse a decimal string into hundredths without going through floats.
fn parse_hundredths(input: &str) -> Result<i64, ParseAmountError> {
    let malformed = || ParseAmountError::Malformed(input.to_string());
    let s = input.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(malformed());
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(malformed());
    }
    if frac.len() > 2 {
        return Err(ParseAmountError::TooPrecise(input.to_string()));
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| ParseAmountError::OutOfRange(input.to_string()))?
    };
    let frac: i64 = format!("{frac:0<2}").parse().map_err(|_| malformed())?;

    let value = whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| ParseAmountError::OutOfRange(input.to_string()))?;
    Ok(if negative { -value } else { value })
}

/// Money in minor currency units (cents). Positive credits, negative debits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    const SCALE: i64 = 100;

    pub const fn from_minor(value: i64) -> Self {
        Amount(value)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    pub fn checked_neg(self) -> Option<Amount> {
        self.0.checked_neg().map(Amount)
    }

    /// Total of `amounts`, or `None` when it does not fit an `Amount`.
    ///
    /// Accumulates in i128 so only the final total is range checked.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Amount>) -> Option<Amount> {
        let total: i128 = amounts.into_iter().map(|a| i128::from(a.0)).sum();
        i64::try_from(total).ok().map(Amount)
    }

    /// Stake multiplied by `odds`, rounded toward zero. `None` on overflow.
    pub fn apply_odds(self, odds: Odds) -> Option<Amount> {
        let scaled = i128::from(self.0) * i128::from(odds.0) / i128::from(Odds::SCALE);
        i64::try_from(scaled).ok().map(Amount)
    }

    /// `percent` of this amount, rounded toward zero.
    pub fn percent(self, percent: u8) -> Amount {
        // |self * percent / 100| <= |self|, so the narrowing cannot fail
        Amount((i128::from(self.0) * i128::from(percent) / 100) as i64)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / Self::SCALE as u64;
        let frac = abs % Self::SCALE as u64;
        write!(f, "{sign}{whole}.{frac:02}")
    }
}

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hundredths(s).map(Amount)
    }
}

impl std::ops::Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Amount(-self.0)
    }
}

/// Payout multiplier with two decimals: `Odds::from_hundredths(300)` is 3.00x.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Odds(u32);

impl Odds {
    pub const ZERO: Odds = Odds(0);
    pub const EVEN: Odds = Odds(100);
    const SCALE: u32 = 100;

    pub const fn from_hundredths(value: u32) -> Self {
        Odds(value)
    }

    pub const fn hundredths(self) -> u32 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// A quarter of these odds, rounded down.
    pub fn quarter(self) -> Odds {
        Odds(self.0 / 4)
    }
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / Self::SCALE, self.0 % Self::SCALE)
    }
}

impl FromStr for Odds {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = parse_hundredths(s)?;
        u32::try_from(value)
            .map(Odds)
            .map_err(|_| ParseAmountError::OutOfRange(s.to_string()))
    }
}
