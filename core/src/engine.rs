//! The night engine: one (player, date) session end to end.
//!
//! DATA FLOW (fixed):
//!   1. Daily adjustment feed → ProbabilityModel → ProbabilityResult
//!   2. NightScheduler tick → CustomerPool draw over the day's spawn stream
//!   3. Emitted events → event log in the store, and back to the caller
//!
//! RULES:
//!   - The probability table is computed once per night and never mutated.
//!   - All randomness flows through the SeededStreamProvider.
//!   - Every emitted event is recorded in the event log.

use crate::{
    command::SessionCommand,
    config::NightConfig,
    customer_pool::{CustomerPool, CustomerRecord, NightCustomerState},
    error::{NightError, NightResult},
    event::{EventLogEntry, NightEvent},
    persistence::StateStore,
    probability::{ProbabilityModel, ProbabilityResult, RawAdjustment},
    rng::{SeededStreamProvider, StreamScope},
    scheduler::{NightScheduler, SessionPhase},
    snapshot::{checkpoint_key, NightSnapshot},
    types::PlayerId,
};
use chrono::NaiveDate;

pub const SPAWN_STREAM: &str = "night_spawn";
pub const GUARANTEE_STREAM: &str = "night_guarantee";

pub struct NightEngine {
    pub player_id: PlayerId,
    pub date:      NaiveDate,
    session_id:    String,
    probabilities: ProbabilityResult,
    provider:      SeededStreamProvider,
    scheduler:     NightScheduler,
    event_seq:     u64,
}

impl NightEngine {
    pub fn new(
        player_id: &str,
        date: NaiveDate,
        config: &NightConfig,
        catalog: Vec<CustomerRecord>,
        feed: &[RawAdjustment],
        store: Box<dyn StateStore>,
    ) -> Self {
        Self::with_carry_over(player_id, date, config, catalog, feed, store, None)
    }

    /// Start a night that inherits last night's cooldowns.
    pub fn with_carry_over(
        player_id: &str,
        date: NaiveDate,
        config: &NightConfig,
        catalog: Vec<CustomerRecord>,
        feed: &[RawAdjustment],
        store: Box<dyn StateStore>,
        previous: Option<&NightCustomerState>,
    ) -> Self {
        let pool = CustomerPool::start_session(catalog, config.pool.clone(), previous);
        Self {
            player_id:     player_id.to_string(),
            date,
            session_id:    session_id(player_id, date),
            probabilities: ProbabilityModel::compute_from_feed(feed),
            provider:      SeededStreamProvider::new(store, config.autosave),
            scheduler:     NightScheduler::new(pool, config),
            event_seq:     0,
        }
    }

    /// Rebuild a night from the checkpoint stored for (player, date).
    pub fn resume(
        player_id: &str,
        date: NaiveDate,
        config: &NightConfig,
        catalog: Vec<CustomerRecord>,
        feed: &[RawAdjustment],
        store: Box<dyn StateStore>,
    ) -> NightResult<Self> {
        let key = checkpoint_key(player_id, date);
        let blob = store
            .load(&key)?
            .ok_or_else(|| NightError::CheckpointMissing { key: key.clone() })?;
        let snapshot: NightSnapshot = serde_json::from_str(&blob)?;

        let pool = CustomerPool::restore(catalog, config.pool.clone(), snapshot.customers)?;
        log::info!(
            "engine: resumed {player_id} {date} in phase {:?}",
            snapshot.scheduler.phase
        );
        Ok(Self {
            player_id:     player_id.to_string(),
            date,
            session_id:    session_id(player_id, date),
            probabilities: ProbabilityModel::compute_from_feed(feed),
            provider:      SeededStreamProvider::new(store, config.autosave),
            scheduler:     NightScheduler::restore(pool, config, snapshot.scheduler),
            event_seq:     snapshot.event_seq,
        })
    }

    pub fn probabilities(&self) -> &ProbabilityResult {
        &self.probabilities
    }

    pub fn scheduler(&self) -> &NightScheduler {
        &self.scheduler
    }

    pub fn provider(&self) -> &SeededStreamProvider {
        &self.provider
    }

    pub fn phase(&self) -> SessionPhase {
        self.scheduler.phase()
    }

    pub fn start(&mut self) -> NightResult<Vec<NightEvent>> {
        let mut stream =
            self.provider
                .stream(StreamScope::Daily(self.date), GUARANTEE_STREAM, &self.player_id);
        let guarantees = self.scheduler.start(&mut stream)?;
        stream.flush()?;

        let events = vec![NightEvent::SessionStarted {
            player_id:  self.player_id.clone(),
            date:       self.date.format("%Y-%m-%d").to_string(),
            guarantees,
        }];
        self.record(&events)?;
        Ok(events)
    }

    /// Advance the night by `dt` seconds.
    pub fn tick(&mut self, dt: f64) -> NightResult<Vec<NightEvent>> {
        let was_finished = self.phase() == SessionPhase::Finished;
        let mut stream =
            self.provider
                .stream(StreamScope::Daily(self.date), SPAWN_STREAM, &self.player_id);
        let events = self.scheduler.tick(dt, &self.probabilities, &mut stream)?;
        stream.flush()?;

        self.after(events, was_finished)
    }

    pub fn complete_visit(&mut self, customer_id: &str) -> NightResult<Vec<NightEvent>> {
        let was_finished = self.phase() == SessionPhase::Finished;
        let events = self.scheduler.complete_visit(customer_id)?;
        self.after(events, was_finished)
    }

    /// Closing time reached.
    pub fn begin_closing(&mut self) -> NightResult<Vec<NightEvent>> {
        let events = self.scheduler.begin_closing()?;
        self.after(events, false)
    }

    /// Route a command from the presentation layer.
    pub fn apply(&mut self, command: &SessionCommand) -> NightResult<Vec<NightEvent>> {
        match command {
            SessionCommand::Start => self.start(),
            SessionCommand::Tick { dt } => self.tick(*dt),
            SessionCommand::CompleteVisit { customer_id } => self.complete_visit(customer_id),
            SessionCommand::Close => self.begin_closing(),
            SessionCommand::Checkpoint => {
                self.checkpoint()?;
                Ok(Vec::new())
            }
            SessionCommand::GetState | SessionCommand::Quit => Ok(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> NightSnapshot {
        NightSnapshot {
            player_id: self.player_id.clone(),
            date:      self.date,
            scheduler: self.scheduler.state().clone(),
            customers: self.scheduler.pool().state().clone(),
            event_seq: self.event_seq,
        }
    }

    /// Save the whole night as one blob, after any held stream state.
    pub fn checkpoint(&self) -> NightResult<()> {
        self.provider.flush_all()?;
        let key = checkpoint_key(&self.player_id, self.date);
        let json = serde_json::to_string(&self.snapshot())?;
        self.provider.with_store(|store| store.save(&key, &json))?;
        log::debug!("engine: checkpoint saved under {key}");
        Ok(())
    }

    /// Record events; checkpoint when this call finished the night.
    fn after(&mut self, events: Vec<NightEvent>, was_finished: bool) -> NightResult<Vec<NightEvent>> {
        self.record(&events)?;
        if !was_finished && self.phase() == SessionPhase::Finished {
            self.checkpoint()?;
        }
        Ok(events)
    }

    fn record(&mut self, events: &[NightEvent]) -> NightResult<()> {
        for event in events {
            let entry = EventLogEntry {
                id:         None,
                session_id: self.session_id.clone(),
                seq:        self.event_seq,
                source:     "scheduler".to_string(),
                event_type: event.type_name().to_string(),
                payload:    serde_json::to_string(event)?,
            };
            self.provider.with_store(|store| store.append_event(&entry))?;
            self.event_seq += 1;
        }
        Ok(())
    }
}

fn session_id(player_id: &str, date: NaiveDate) -> String {
    format!("{player_id}/{}", date.format("%Y-%m-%d"))
}
