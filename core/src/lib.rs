//! Nightly visit-probability model and customer scheduling engine.
//!
//! Leaves first:
//!   - probability:   daily adjustments → normalized, gender-split table
//!   - rng:           persisted, reproducible random streams
//!   - customer_pool: available / queued / cooldown partitions for a night
//!   - scheduler:     spawn pacing, closing and guarantee returns
//!   - engine:        one (player, date) night wired end to end

pub mod command;
pub mod config;
pub mod customer_pool;
pub mod engine;
pub mod error;
pub mod event;
pub mod persistence;
pub mod probability;
pub mod rng;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod types;

pub use customer_pool::{CustomerPool, CustomerRecord, NightCustomerState};
pub use engine::NightEngine;
pub use error::{NightError, NightResult};
pub use event::NightEvent;
pub use persistence::{MemoryStore, StateStore};
pub use probability::{Adjustment, ProbabilityModel, ProbabilityResult, RawAdjustment, Scope};
pub use rng::{RandomStream, SeededStreamProvider, StreamKey, StreamScope};
pub use scheduler::{NightScheduler, SessionPhase};
pub use store::NightStore;
