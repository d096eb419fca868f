//! Shared primitive types used across the entire night core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, unique identifier for a catalog customer.
pub type CustomerId = String;

/// The save-slot / player identifier streams and checkpoints are keyed by.
pub type PlayerId = String;

/// Elapsed session time in seconds.
pub type Seconds = f64;

/// Customer archetype. Five values, fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    Employee,
    Manager,
    Freelancer,
    Boss,
    Student,
}

impl Identity {
    /// Canonical order: identity-major iteration uses this.
    pub const ALL: [Identity; 5] = [
        Identity::Employee,
        Identity::Manager,
        Identity::Freelancer,
        Identity::Boss,
        Identity::Student,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Employee   => "employee",
            Self::Manager    => "manager",
            Self::Freelancer => "freelancer",
            Self::Boss       => "boss",
            Self::Student    => "student",
        }
    }

    /// Case-insensitive lookup. `owner` is accepted for `Boss`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "employee" | "worker"  => Some(Self::Employee),
            "manager"              => Some(Self::Manager),
            "freelancer"           => Some(Self::Freelancer),
            "boss" | "owner"       => Some(Self::Boss),
            "student"              => Some(Self::Student),
            _ => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Behavioral state a customer walks in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodState {
    Busy,
    Irritable,
    Melancholy,
    Picky,
    Friendly,
}

impl MoodState {
    pub const ALL: [MoodState; 5] = [
        MoodState::Busy,
        MoodState::Irritable,
        MoodState::Melancholy,
        MoodState::Picky,
        MoodState::Friendly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Busy       => "busy",
            Self::Irritable  => "irritable",
            Self::Melancholy => "melancholy",
            Self::Picky      => "picky",
            Self::Friendly   => "friendly",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "busy"                   => Some(Self::Busy),
            "irritable" | "angry"    => Some(Self::Irritable),
            "melancholy" | "sad"     => Some(Self::Melancholy),
            "picky"                  => Some(Self::Picky),
            "friendly"               => Some(Self::Friendly),
            _ => None,
        }
    }
}

impl fmt::Display for MoodState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Genders are symmetric in the probability table: each gets half of a
/// combination's normalized share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Male   => "male",
            Self::Female => "female",
        })
    }
}
