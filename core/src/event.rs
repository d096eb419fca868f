//! Events published outward to the presentation layer.
//!
//! RULE: The core never knows how events are rendered.
//! Variants are appended, never removed or reordered.

use crate::types::{CustomerId, Gender, Identity, MoodState, PlayerId, Seconds};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NightEvent {
    SessionStarted {
        player_id:  PlayerId,
        date:       String,
        guarantees: Vec<CustomerId>,
    },
    CustomerArrived {
        at:          Seconds,
        customer_id: CustomerId,
        identity:    Identity,
        mood:        MoodState,
        gender:      Gender,
        /// True for guarantees pushed in at close.
        forced:      bool,
    },
    /// The spawn threshold passed but nobody was drawable.
    SpawnStalled {
        at: Seconds,
    },
    VisitCompleted {
        at:          Seconds,
        customer_id: CustomerId,
        visit_count: u64,
    },
    CooldownExpired {
        at:           Seconds,
        customer_ids: Vec<CustomerId>,
    },
    SessionClosing {
        at:                Seconds,
        pending_guarantees: Vec<CustomerId>,
    },
    SessionClosed {
        at:             Seconds,
        guarantee_ids:  Vec<CustomerId>,
        timed_out:      bool,
    },
}

impl NightEvent {
    /// Stable name for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. }  => "session_started",
            Self::CustomerArrived { .. } => "customer_arrived",
            Self::SpawnStalled { .. }    => "spawn_stalled",
            Self::VisitCompleted { .. }  => "visit_completed",
            Self::CooldownExpired { .. } => "cooldown_expired",
            Self::SessionClosing { .. }  => "session_closing",
            Self::SessionClosed { .. }   => "session_closed",
        }
    }
}

/// The event log entry as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub session_id: String,
    pub seq:        u64,
    pub source:     String,
    pub event_type: String,
    pub payload:    String, // JSON-serialized NightEvent
}
