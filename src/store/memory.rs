//! In-process store.
//!
//! All tables sit behind one mutex held for the whole unit of work, so units
//! are serialized. Writes are staged in an overlay and folded into the tables
//! only at commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::{EntryFilter, Page, Store, StoreError, Table, UnitOfWork, WagerFilter};
use crate::Amount;
use crate::model::{
    Account, AccountId, EntryId, Event, EventId, Game, GameId, LedgerEntry, Outcome, OutcomeId,
    Participant, ParticipantId, Tournament, TournamentId, Wager, WagerId,
};

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    entries: BTreeMap<EntryId, LedgerEntry>,
    wagers: BTreeMap<WagerId, Wager>,
    events: BTreeMap<EventId, Event>,
    outcomes: BTreeMap<OutcomeId, Outcome>,
    games: BTreeMap<GameId, Game>,
    tournaments: BTreeMap<TournamentId, Tournament>,
    participants: BTreeMap<ParticipantId, Participant>,
    sequences: HashMap<Table, u64>,
}

impl Tables {
    fn apply(&mut self, writes: Writes) {
        writes.accounts.commit(&mut self.accounts);
        self.entries.extend(writes.entries);
        writes.wagers.commit(&mut self.wagers);
        writes.events.commit(&mut self.events);
        writes.outcomes.commit(&mut self.outcomes);
        writes.games.commit(&mut self.games);
        writes.tournaments.commit(&mut self.tournaments);
        writes.participants.commit(&mut self.participants);
        self.sequences.extend(writes.sequences);
    }
}

/// Pending upserts (`Some`) and deletes (`None`) for one table.
#[derive(Debug)]
struct Staged<T> {
    rows: BTreeMap<u64, Option<T>>,
}

impl<T> Default for Staged<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Clone> Staged<T> {
    fn get(&self, base: &BTreeMap<u64, T>, id: u64) -> Option<T> {
        match self.rows.get(&id) {
            Some(row) => row.clone(),
            None => base.get(&id).cloned(),
        }
    }

    /// Rows visible to the unit, ascending by id.
    fn scan(&self, base: &BTreeMap<u64, T>, keep: impl Fn(&T) -> bool) -> Vec<T> {
        let mut visible: BTreeMap<u64, &T> = base
            .iter()
            .filter(|(id, _)| !self.rows.contains_key(*id))
            .map(|(id, row)| (*id, row))
            .collect();
        for (id, row) in &self.rows {
            if let Some(row) = row {
                visible.insert(*id, row);
            }
        }
        visible
            .into_values()
            .filter(|row| keep(row))
            .cloned()
            .collect()
    }

    fn put(&mut self, id: u64, row: T) {
        self.rows.insert(id, Some(row));
    }

    fn remove(&mut self, id: u64) {
        self.rows.insert(id, None);
    }

    fn commit(self, into: &mut BTreeMap<u64, T>) {
        for (id, row) in self.rows {
            match row {
                Some(row) => {
                    into.insert(id, row);
                }
                None => {
                    into.remove(&id);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Writes {
    accounts: Staged<Account>,
    entries: BTreeMap<EntryId, LedgerEntry>,
    wagers: Staged<Wager>,
    events: Staged<Event>,
    outcomes: Staged<Outcome>,
    games: Staged<Game>,
    tournaments: Staged<Tournament>,
    participants: Staged<Participant>,
    sequences: HashMap<Table, u64>,
}

struct MemoryTx<'a> {
    base: &'a Tables,
    writes: Writes,
}

impl<'a> MemoryTx<'a> {
    fn new(base: &'a Tables) -> Self {
        Self {
            base,
            writes: Writes::default(),
        }
    }

    fn into_writes(self) -> Writes {
        self.writes
    }

    fn visible_entries(&self, filter: &EntryFilter) -> impl Iterator<Item = &LedgerEntry> {
        self.base
            .entries
            .values()
            .chain(self.writes.entries.values())
            .filter(move |e| filter.matches(e))
    }
}

/// Newest first, then the requested page.
fn paginate<T>(mut rows: Vec<T>, page: Option<Page>) -> Vec<T> {
    rows.reverse();
    match page {
        Some(page) => rows
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect(),
        None => rows,
    }
}

impl UnitOfWork for MemoryTx<'_> {
    fn next_id(&mut self, table: Table) -> Result<u64, StoreError> {
        let current = self
            .writes
            .sequences
            .get(&table)
            .or_else(|| self.base.sequences.get(&table))
            .copied()
            .unwrap_or(0);
        let next = current + 1;
        self.writes.sequences.insert(table, next);
        Ok(next)
    }

    fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.writes.accounts.get(&self.base.accounts, id))
    }

    fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.writes.accounts.scan(&self.base.accounts, |_| true))
    }

    fn put_account(&mut self, account: &Account) -> Result<(), StoreError> {
        self.writes.accounts.put(account.id, account.clone());
        Ok(())
    }

    fn entry(&self, id: EntryId) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self
            .writes
            .entries
            .get(&id)
            .or_else(|| self.base.entries.get(&id))
            .cloned())
    }

    fn entries(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = self.visible_entries(filter).cloned().collect();
        Ok(paginate(rows, filter.page))
    }

    fn entry_sum(&self, filter: &EntryFilter) -> Result<Option<Amount>, StoreError> {
        Ok(Amount::checked_sum(
            self.visible_entries(filter).map(|e| e.amount),
        ))
    }

    fn append_entry(&mut self, entry: LedgerEntry) -> Result<(), StoreError> {
        if self.base.entries.contains_key(&entry.id) || self.writes.entries.contains_key(&entry.id)
        {
            return Err(StoreError::DuplicateKey(Table::Entries, entry.id));
        }
        self.writes.entries.insert(entry.id, entry);
        Ok(())
    }

    fn wager(&self, id: WagerId) -> Result<Option<Wager>, StoreError> {
        Ok(self.writes.wagers.get(&self.base.wagers, id))
    }

    fn wagers(&self, filter: &WagerFilter) -> Result<Vec<Wager>, StoreError> {
        let rows = self
            .writes
            .wagers
            .scan(&self.base.wagers, |w| filter.matches(w));
        Ok(paginate(rows, filter.page))
    }

    fn put_wager(&mut self, wager: &Wager) -> Result<(), StoreError> {
        self.writes.wagers.put(wager.id, wager.clone());
        Ok(())
    }

    fn event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        Ok(self.writes.events.get(&self.base.events, id))
    }

    fn put_event(&mut self, event: &Event) -> Result<(), StoreError> {
        self.writes.events.put(event.id, event.clone());
        Ok(())
    }

    fn outcome(&self, id: OutcomeId) -> Result<Option<Outcome>, StoreError> {
        Ok(self.writes.outcomes.get(&self.base.outcomes, id))
    }

    fn outcomes(&self, event: EventId) -> Result<Vec<Outcome>, StoreError> {
        Ok(self
            .writes
            .outcomes
            .scan(&self.base.outcomes, |o| o.event == event))
    }

    fn put_outcome(&mut self, outcome: &Outcome) -> Result<(), StoreError> {
        self.writes.outcomes.put(outcome.id, outcome.clone());
        Ok(())
    }

    fn game(&self, id: GameId) -> Result<Option<Game>, StoreError> {
        Ok(self.writes.games.get(&self.base.games, id))
    }

    fn put_game(&mut self, game: &Game) -> Result<(), StoreError> {
        self.writes.games.put(game.id, game.clone());
        Ok(())
    }

    fn tournament(&self, id: TournamentId) -> Result<Option<Tournament>, StoreError> {
        Ok(self.writes.tournaments.get(&self.base.tournaments, id))
    }

    fn put_tournament(&mut self, tournament: &Tournament) -> Result<(), StoreError> {
        self.writes
            .tournaments
            .put(tournament.id, tournament.clone());
        Ok(())
    }

    fn participants(&self, tournament: TournamentId) -> Result<Vec<Participant>, StoreError> {
        Ok(self
            .writes
            .participants
            .scan(&self.base.participants, |p| p.tournament == tournament))
    }

    fn put_participant(&mut self, participant: &Participant) -> Result<(), StoreError> {
        self.writes
            .participants
            .put(participant.id, participant.clone());
        Ok(())
    }

    fn remove_participant(&mut self, id: ParticipantId) -> Result<(), StoreError> {
        self.writes.participants.remove(id);
        Ok(())
    }
}

/// The bundled [`Store`]: tables in memory, one unit of work at a time.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next unit of work fail at commit time, after its closure has
    /// run, as if the store went away mid-flight.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

impl Store for MemoryStore {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        // staged writes only reach the tables on commit, so a unit that panicked
        // left them intact
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);

        let (value, writes) = {
            let mut tx = MemoryTx::new(&tables);
            let unit: &mut dyn UnitOfWork = &mut tx;
            let value = work(unit)?;
            (value, tx.into_writes())
        };

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            debug!("discarding unit of work on injected commit failure");
            return Err(StoreError::CommitFailed.into());
        }

        tables.apply(writes);
        Ok(value)
    }
}
