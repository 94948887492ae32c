use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::engine::BalanceAudit;
use crate::model::{AccountId, Command, GameCategory, GameStatus, Role};
use crate::{Amount, Odds};

/// Errors that can occur when reading command rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open commands file: {0}")]
    Open(csv::Error),

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized command type '{kind}'")]
    UnrecognizedType { line: usize, kind: String },

    #[error("line {line}: {kind} missing {field}")]
    MissingField {
        line: usize,
        kind: String,
        field: &'static str,
    },

    #[error("line {line}: invalid {field} '{value}'")]
    InvalidValue {
        line: usize,
        field: &'static str,
        value: String,
    },
}

/// One command per row. Columns a command does not use are left empty.
///
/// - `target` the row acted on: an event, game, tournament or account
/// - `item` a bet's outcome, the participant of a score update, or the
///   capacity of a new tournament
/// - `amount` money, odds or a score delta
/// - `limit` the maximum bet of a new game or the prize pool of a new
///   tournament
/// - `detail` a role, name, game category, game status or `true`/`false`
#[derive(Debug, Deserialize)]
struct InputRow {
    r#type: String,
    account: Option<AccountId>,
    target: Option<u64>,
    item: Option<u64>,
    amount: Option<String>,
    limit: Option<String>,
    detail: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    account: AccountId,
    balance: String,
    ledger: String,
    active: bool,
    restricted: bool,
}

/// Field accessors that report the line and command on failure.
struct Row {
    line: usize,
    inner: InputRow,
}

impl Row {
    fn missing(&self, field: &'static str) -> CsvError {
        CsvError::MissingField {
            line: self.line,
            kind: self.inner.r#type.clone(),
            field,
        }
    }

    fn account(&self) -> Result<AccountId, CsvError> {
        self.inner.account.ok_or_else(|| self.missing("account"))
    }

    fn target(&self) -> Result<u64, CsvError> {
        self.inner.target.ok_or_else(|| self.missing("target"))
    }

    fn item(&self) -> Result<u64, CsvError> {
        self.inner.item.ok_or_else(|| self.missing("item"))
    }

    fn capacity(&self) -> Result<usize, CsvError> {
        let item = self.item()?;
        usize::try_from(item).map_err(|_| self.invalid("item", item.to_string()))
    }

    fn detail(&self) -> Result<String, CsvError> {
        self.inner
            .detail
            .clone()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| self.missing("detail"))
    }

    fn parsed<T: std::str::FromStr>(
        &self,
        field: &'static str,
        raw: &Option<String>,
    ) -> Result<T, CsvError> {
        let raw = raw
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| self.missing(field))?;
        raw.parse().map_err(|_| CsvError::InvalidValue {
            line: self.line,
            field,
            value: raw.to_string(),
        })
    }

    fn amount(&self) -> Result<Amount, CsvError> {
        self.parsed("amount", &self.inner.amount)
    }

    fn odds(&self) -> Result<Odds, CsvError> {
        self.parsed("amount", &self.inner.amount)
    }

    fn score(&self) -> Result<i64, CsvError> {
        self.parsed("amount", &self.inner.amount)
    }

    fn limit(&self) -> Result<Amount, CsvError> {
        self.parsed("limit", &self.inner.limit)
    }

    fn flag(&self) -> Result<bool, CsvError> {
        self.parsed("detail", &self.inner.detail)
    }

    fn invalid(&self, field: &'static str, value: String) -> CsvError {
        CsvError::InvalidValue {
            line: self.line,
            field,
            value,
        }
    }

    fn role(&self) -> Result<Role, CsvError> {
        let detail = self.detail()?;
        match detail.as_str() {
            "player" => Ok(Role::Player),
            "admin" | "administrator" => Ok(Role::Administrator),
            _ => Err(self.invalid("detail", detail)),
        }
    }

    fn category(&self) -> Result<GameCategory, CsvError> {
        let detail = self.detail()?;
        match detail.as_str() {
            "slots" => Ok(GameCategory::Slots),
            "dice" => Ok(GameCategory::Dice),
            "other" => Ok(GameCategory::Other),
            _ => Err(self.invalid("detail", detail)),
        }
    }

    fn status(&self) -> Result<GameStatus, CsvError> {
        let detail = self.detail()?;
        match detail.as_str() {
            "active" => Ok(GameStatus::Active),
            "inactive" => Ok(GameStatus::Inactive),
            "hidden" => Ok(GameStatus::Hidden),
            _ => Err(self.invalid("detail", detail)),
        }
    }

    fn into_command(self) -> Result<Command, CsvError> {
        let command = match self.inner.r#type.as_str() {
            "open_account" => Command::OpenAccount { role: self.role()? },
            "deposit" => Command::Deposit {
                account: self.account()?,
                amount: self.amount()?,
            },
            "withdrawal" => Command::Withdrawal {
                account: self.account()?,
                amount: self.amount()?,
            },
            "transfer" => Command::Transfer {
                from: self.account()?,
                to: self.target()?,
                amount: self.amount()?,
            },
            "create_event" => Command::CreateEvent {
                account: self.account()?,
                name: self.detail()?,
            },
            "add_outcome" => Command::AddOutcome {
                account: self.account()?,
                event: self.target()?,
                name: self.detail()?,
                odds: self.odds()?,
            },
            "start_event" => Command::StartEvent {
                account: self.account()?,
                event: self.target()?,
            },
            "place_bet" => Command::PlaceBet {
                account: self.account()?,
                event: self.target()?,
                outcome: self.item()?,
                amount: self.amount()?,
            },
            "settle" => Command::Settle {
                account: self.account()?,
                event: self.target()?,
                outcome: self.item()?,
            },
            "cancel" => Command::Cancel {
                account: self.account()?,
                event: self.target()?,
            },
            "create_game" => Command::CreateGame {
                account: self.account()?,
                category: self.category()?,
                min_bet: self.amount()?,
                max_bet: self.limit()?,
            },
            "play" => Command::Play {
                account: self.account()?,
                game: self.target()?,
                amount: self.amount()?,
            },
            "set_restricted" => Command::SetRestricted {
                account: self.account()?,
                target: self.target()?,
                restricted: self.flag()?,
            },
            "set_active" => Command::SetActive {
                account: self.account()?,
                target: self.target()?,
                active: self.flag()?,
            },
            "set_outcome_odds" => Command::SetOutcomeOdds {
                account: self.account()?,
                outcome: self.target()?,
                odds: self.odds()?,
            },
            "set_game_status" => Command::SetGameStatus {
                account: self.account()?,
                game: self.target()?,
                status: self.status()?,
            },
            "create_tournament" => Command::CreateTournament {
                account: self.account()?,
                name: self.detail()?,
                entry_fee: self.amount()?,
                prize_pool: self.limit()?,
                max_participants: self.capacity()?,
            },
            "open_tournament" => Command::OpenTournament {
                account: self.account()?,
                tournament: self.target()?,
            },
            "start_tournament" => Command::StartTournament {
                account: self.account()?,
                tournament: self.target()?,
            },
            "join_tournament" => Command::JoinTournament {
                account: self.account()?,
                tournament: self.target()?,
            },
            "leave_tournament" => Command::LeaveTournament {
                account: self.account()?,
                tournament: self.target()?,
            },
            "update_score" => Command::UpdateScore {
                account: self.account()?,
                tournament: self.target()?,
                participant: self.item()?,
                delta: self.score()?,
            },
            "end_tournament" => Command::EndTournament {
                account: self.account()?,
                tournament: self.target()?,
            },
            "cancel_tournament" => Command::CancelTournament {
                account: self.account()?,
                tournament: self.target()?,
            },
            other => {
                return Err(CsvError::UnrecognizedType {
                    line: self.line,
                    kind: other.to_string(),
                });
            }
        };
        Ok(command)
    }
}

/// Read commands from a csv file
pub fn read_commands(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Command, CsvError>>, CsvError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(CsvError::Open)?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let inner = result.map_err(|source| CsvError::Parse { line, source })?;
            Row { line, inner }.into_command()
        }))
}

/// Write one row per audited account in csv format
pub fn write_accounts(
    writer: impl io::Write,
    audits: impl IntoIterator<Item = BalanceAudit>,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);

    for audit in audits {
        let row = OutputRow {
            account: audit.account,
            balance: audit.balance.to_string(),
            ledger: audit.ledger_total.to_string(),
            active: audit.is_active,
            restricted: audit.is_restricted,
        };
        writer.serialize(&row)?;
    }

    writer.flush()?;
    Ok(())
}
