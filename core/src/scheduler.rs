//! Night scheduler: decides who arrives and when.
//!
//! PHASES (one direction only):
//!   Idle → Running → Closing → Finished
//!
//! RULES:
//!   - Driven by an external per-frame caller; nothing here blocks.
//!   - An empty pool is a stall, never an error. The spawn timer holds at
//!     the threshold and the next tick tries again.
//!   - Closing forces every unvisited guarantee into the queue and ends
//!     once they have all visited or the closing timeout runs out.

use crate::{
    config::{NightConfig, PacingConfig},
    customer_pool::CustomerPool,
    error::{NightError, NightResult},
    event::NightEvent,
    probability::ProbabilityResult,
    rng::RandomStream,
    types::{CustomerId, Seconds},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Running,
    Closing,
    Finished,
}

/// Scheduler-owned fields that a checkpoint must carry besides the pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerState {
    pub phase:           SessionPhase,
    pub elapsed:         Seconds,
    pub closing_elapsed: Seconds,
    pub forced:          Vec<CustomerId>,
    pub stalled:         bool,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            phase:           SessionPhase::Idle,
            elapsed:         0.0,
            closing_elapsed: 0.0,
            forced:          Vec::new(),
            stalled:         false,
        }
    }
}

pub struct NightScheduler {
    pool:            CustomerPool,
    pacing:          PacingConfig,
    closing_timeout: Seconds,
    state:           SchedulerState,
}

impl NightScheduler {
    pub fn new(pool: CustomerPool, config: &NightConfig) -> Self {
        Self::restore(pool, config, SchedulerState::default())
    }

    pub fn restore(pool: CustomerPool, config: &NightConfig, state: SchedulerState) -> Self {
        Self {
            pool,
            pacing: config.pacing.clone(),
            closing_timeout: config.closing_timeout_secs,
            state,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn pool(&self) -> &CustomerPool {
        &self.pool
    }

    /// Seconds until the next spawn threshold is crossed.
    pub fn next_spawn_in(&self) -> Seconds {
        let threshold = self.pacing.interval_after(self.pool.state.total_spawned);
        (threshold - self.pool.state.spawn_timer).max(0.0)
    }

    /// Idle → Running. Resets the spawn clock and reserves guarantees.
    pub fn start(&mut self, guarantee_stream: &mut RandomStream<'_>) -> NightResult<Vec<CustomerId>> {
        self.transition(SessionPhase::Idle, SessionPhase::Running)?;
        self.pool.state.spawn_timer = 0.0;
        self.pool.state.total_spawned = 0;
        self.state.elapsed = 0.0;
        self.state.closing_elapsed = 0.0;
        self.state.stalled = false;

        let n = self.pool.config().guarantee_count;
        let guarantees = self.pool.reserve_guarantee(n, guarantee_stream)?;
        log::info!("scheduler: running with {} guarantee(s)", guarantees.len());
        Ok(guarantees)
    }

    /// Advance the session clock by `dt` seconds.
    pub fn tick(
        &mut self,
        dt: Seconds,
        probabilities: &ProbabilityResult,
        stream: &mut RandomStream<'_>,
    ) -> NightResult<Vec<NightEvent>> {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        match self.state.phase {
            SessionPhase::Idle | SessionPhase::Finished => Ok(Vec::new()),
            SessionPhase::Running => {
                self.state.elapsed += dt;
                self.spawn_due(dt, probabilities, stream)
            }
            SessionPhase::Closing => {
                self.state.elapsed += dt;
                self.state.closing_elapsed += dt;
                self.try_finish()
            }
        }
    }

    fn spawn_due(
        &mut self,
        dt: Seconds,
        probabilities: &ProbabilityResult,
        stream: &mut RandomStream<'_>,
    ) -> NightResult<Vec<NightEvent>> {
        let mut events = Vec::new();
        self.pool.state.spawn_timer += dt;

        loop {
            let threshold = self.pacing.interval_after(self.pool.state.total_spawned);
            if self.pool.state.spawn_timer < threshold {
                break;
            }
            match self.pool.draw_next(probabilities, stream)? {
                Some(id) => {
                    self.pool.state.spawn_timer -= threshold;
                    self.pool.state.total_spawned += 1;
                    self.state.stalled = false;
                    events.push(self.arrival(&id, false)?);
                }
                None => {
                    self.pool.state.spawn_timer = threshold;
                    if !self.state.stalled {
                        self.state.stalled = true;
                        log::debug!("scheduler: stalled at {:.2}s, nobody drawable", self.state.elapsed);
                        events.push(NightEvent::SpawnStalled { at: self.state.elapsed });
                    }
                    break;
                }
            }
        }
        Ok(events)
    }

    /// Running → Closing. Forces every pending guarantee into the queue.
    pub fn begin_closing(&mut self) -> NightResult<Vec<NightEvent>> {
        self.transition(SessionPhase::Running, SessionPhase::Closing)?;
        self.state.closing_elapsed = 0.0;

        let pending: Vec<CustomerId> = self.pool.state.guarantee.clone();
        let mut events = vec![NightEvent::SessionClosing {
            at: self.state.elapsed,
            pending_guarantees: pending.clone(),
        }];
        for id in &pending {
            let already_queued = self.pool.state.queued.contains(id);
            if !already_queued {
                self.pool.force_queue(id)?;
                self.pool.state.total_spawned += 1;
                events.push(self.arrival(id, true)?);
            }
            self.state.forced.push(id.clone());
        }
        log::info!("scheduler: closing, {} guarantee(s) forced in", pending.len());

        events.extend(self.try_finish()?);
        Ok(events)
    }

    /// A queued customer has finished. Valid in any phase after Idle.
    pub fn complete_visit(&mut self, id: &str) -> NightResult<Vec<NightEvent>> {
        if self.state.phase == SessionPhase::Idle {
            return Err(NightError::IllegalTransition {
                from: SessionPhase::Idle,
                to:   SessionPhase::Running,
            });
        }
        let mut events = self.visit(id)?;
        if self.state.phase == SessionPhase::Closing {
            events.extend(self.try_finish()?);
        }
        Ok(events)
    }

    fn visit(&mut self, id: &str) -> NightResult<Vec<NightEvent>> {
        let expired = self.pool.complete_visit(id)?;
        let mut events = vec![NightEvent::VisitCompleted {
            at:          self.state.elapsed,
            customer_id: id.to_string(),
            visit_count: self.pool.state.global_visit_count,
        }];
        if !expired.is_empty() {
            events.push(NightEvent::CooldownExpired {
                at:           self.state.elapsed,
                customer_ids: expired,
            });
        }
        Ok(events)
    }

    /// Closing → Finished once no guarantee is pending. On timeout the
    /// stragglers' visits are completed here.
    fn try_finish(&mut self) -> NightResult<Vec<NightEvent>> {
        if self.state.phase != SessionPhase::Closing {
            return Ok(Vec::new());
        }
        let mut events = Vec::new();
        let mut timed_out = false;
        if !self.pool.state.guarantee.is_empty() {
            if self.state.closing_elapsed < self.closing_timeout {
                return Ok(events);
            }
            timed_out = true;
            let stragglers = self.pool.state.guarantee.clone();
            log::warn!(
                "scheduler: closing timed out after {:.1}s with {} guarantee(s) unvisited",
                self.state.closing_elapsed,
                stragglers.len()
            );
            for id in &stragglers {
                self.pool.force_queue(id)?;
                events.extend(self.visit(id)?);
            }
        }

        self.state.phase = SessionPhase::Finished;
        log::info!(
            "scheduler: finished after {:.1}s, {} spawned, {} visits",
            self.state.elapsed,
            self.pool.state.total_spawned,
            self.pool.state.global_visit_count
        );
        events.push(NightEvent::SessionClosed {
            at:            self.state.elapsed,
            guarantee_ids: self.state.forced.clone(),
            timed_out,
        });
        Ok(events)
    }

    fn arrival(&self, id: &str, forced: bool) -> NightResult<NightEvent> {
        let record = self
            .pool
            .record(id)
            .ok_or_else(|| NightError::UnknownCustomer { id: id.to_string() })?;
        Ok(NightEvent::CustomerArrived {
            at:          self.state.elapsed,
            customer_id: record.id.clone(),
            identity:    record.identity,
            mood:        record.mood,
            gender:      record.gender,
            forced,
        })
    }

    fn transition(&mut self, from: SessionPhase, to: SessionPhase) -> NightResult<()> {
        if self.state.phase != from {
            return Err(NightError::IllegalTransition { from: self.state.phase, to });
        }
        self.state.phase = to;
        Ok(())
    }
}
