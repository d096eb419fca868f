//! Checkpoint serialization: full night state to and from JSON.
//!
//! A checkpoint captures everything needed to resume a night after a
//! restart: the customer partitions and counters plus the scheduler's
//! phase and clocks. RNG streams persist themselves and are not copied.

use crate::{
    customer_pool::NightCustomerState,
    scheduler::SchedulerState,
    types::PlayerId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NightSnapshot {
    pub player_id: PlayerId,
    pub date:      NaiveDate,
    pub scheduler: SchedulerState,
    pub customers: NightCustomerState,
    /// Next event-log sequence number.
    pub event_seq: u64,
}

/// `night/{playerId}/{date}/checkpoint`
pub fn checkpoint_key(player_id: &str, date: NaiveDate) -> String {
    format!("night/{player_id}/{}/checkpoint", date.format("%Y-%m-%d"))
}
