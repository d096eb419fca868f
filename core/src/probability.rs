//! Daily visit-probability model.
//!
//! Turns the flat base distribution plus the day's adjustment feed into a
//! normalized, gender-split table over all 25 identity × mood combinations.
//! Pure computation: no RNG, no store.

use crate::types::{Gender, Identity, MoodState};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Every combination starts here, in percent.
pub const BASE_PROBABILITY: f64 = 4.0;
/// Running adjustment is held inside ±this many percent.
pub const MAX_ADJUSTMENT: f64 = 15.0;
pub const MIN_CLAMPED: f64 = 0.5;
pub const MAX_CLAMPED: f64 = 30.0;
pub const COMBINATION_COUNT: usize = Identity::ALL.len() * MoodState::ALL.len();

/// Which values of one axis an adjustment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope<T> {
    Any,
    Specific(T),
}

impl<T: PartialEq> Scope<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Scope::Any => true,
            Scope::Specific(v) => v == value,
        }
    }
}

/// One entry of the upstream daily feed, exactly as it arrives.
/// Empty strings mean "every value of this axis".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAdjustment {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub state: String,
    pub delta_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub identity:      Scope<Identity>,
    pub mood:          Scope<MoodState>,
    pub delta_percent: f64,
}

impl Adjustment {
    pub fn new(identity: Scope<Identity>, mood: Scope<MoodState>, delta_percent: f64) -> Self {
        Self { identity, mood, delta_percent }
    }

    /// Returns None for entries that cannot be applied: unknown axis names
    /// or a non-finite delta.
    pub fn from_raw(raw: &RawAdjustment) -> Option<Self> {
        if !raw.delta_percent.is_finite() {
            return None;
        }
        let identity = if raw.identity.trim().is_empty() {
            Scope::Any
        } else {
            Scope::Specific(Identity::parse(&raw.identity)?)
        };
        let mood = if raw.state.trim().is_empty() {
            Scope::Any
        } else {
            Scope::Specific(MoodState::parse(&raw.state)?)
        };
        Some(Self { identity, mood, delta_percent: raw.delta_percent })
    }

    fn applies_to(&self, identity: Identity, mood: MoodState) -> bool {
        self.identity.matches(&identity) && self.mood.matches(&mood)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationProbability {
    pub identity:   Identity,
    pub mood:       MoodState,
    pub base:       f64,
    /// Accumulated delta, held in [-15, 15].
    pub adjustment: f64,
    pub raw:        f64,
    /// Always in [0.5, 30].
    pub clamped:    f64,
    pub normalized: f64,
    /// Share for each gender: normalized / 2. Genders are symmetric, so
    /// this one value serves both.
    pub per_gender: f64,
}

impl CombinationProbability {
    fn fresh(identity: Identity, mood: MoodState) -> Self {
        Self {
            identity,
            mood,
            base:       BASE_PROBABILITY,
            adjustment: 0.0,
            raw:        BASE_PROBABILITY,
            clamped:    BASE_PROBABILITY,
            normalized: 0.0,
            per_gender: 0.0,
        }
    }

    fn apply(&mut self, delta: f64) {
        self.adjustment = (self.adjustment + delta).clamp(-MAX_ADJUSTMENT, MAX_ADJUSTMENT);
        self.raw = self.base + self.adjustment;
        self.clamped = self.raw.clamp(MIN_CLAMPED, MAX_CLAMPED);
    }
}

/// Output of one `compute` call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityResult {
    entries:                  Vec<CombinationProbability>,
    pub clamped_sum:          f64,
    /// 100 / clamped_sum, or 0 when the uniform fallback was used.
    pub normalization_factor: f64,
}

impl ProbabilityResult {
    /// Identity-major, mood-minor.
    pub fn entries(&self) -> &[CombinationProbability] {
        &self.entries
    }

    pub fn entry(&self, identity: Identity, mood: MoodState) -> &CombinationProbability {
        &self.entries[index_of(identity, mood)]
    }


    pub fn normalized_sum(&self) -> f64 {
        self.entries.iter().map(|e| e.normalized).sum()
    }

    /// Male plus female over every combination.
    pub fn gender_sum(&self) -> f64 {
        self.entries.iter().map(|e| e.per_gender * Gender::ALL.len() as f64).sum()
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "visit probabilities: clamped_sum={:.3} factor={:.5}",
            self.clamped_sum, self.normalization_factor
        );
        for e in &self.entries {
            let _ = writeln!(
                out,
                "  {:<10} {:<10} adj={:+6.2} clamped={:6.2} norm={:6.3}% each_gender={:6.3}%",
                e.identity.name(),
                e.mood.name(),
                e.adjustment,
                e.clamped,
                e.normalized,
                e.per_gender
            );
        }
        out
    }
}

fn index_of(identity: Identity, mood: MoodState) -> usize {
    identity as usize * MoodState::ALL.len() + mood as usize
}

pub struct ProbabilityModel;

impl ProbabilityModel {
    pub fn compute(adjustments: &[Adjustment]) -> ProbabilityResult {
        let mut entries: Vec<CombinationProbability> = Identity::ALL
            .iter()
            .flat_map(|&id| MoodState::ALL.iter().map(move |&mood| CombinationProbability::fresh(id, mood)))
            .collect();

        for adj in adjustments {
            if !adj.delta_percent.is_finite() {
                continue;
            }
            for entry in entries.iter_mut().filter(|e| adj.applies_to(e.identity, e.mood)) {
                entry.apply(adj.delta_percent);
            }
        }

        let clamped_sum: f64 = entries.iter().map(|e| e.clamped).sum();
        let normalization_factor = if clamped_sum > 0.0 {
            for e in &mut entries {
                e.normalized = e.clamped / clamped_sum * 100.0;
            }
            100.0 / clamped_sum
        } else {
            // Unreachable while the clamp floor is positive.
            log::warn!("visit probabilities collapsed to zero; using uniform distribution");
            let uniform = 100.0 / COMBINATION_COUNT as f64;
            for e in &mut entries {
                e.normalized = uniform;
            }
            0.0
        };
        for e in &mut entries {
            e.per_gender = e.normalized / Gender::ALL.len() as f64;
        }

        log::debug!(
            "probability: {} adjustments, clamped_sum={clamped_sum:.3}",
            adjustments.len()
        );

        ProbabilityResult { entries, clamped_sum, normalization_factor }
    }

    /// Convert and apply the raw daily feed. Entries that do not parse are
    /// dropped.
    pub fn compute_from_feed(feed: &[RawAdjustment]) -> ProbabilityResult {
        let parsed: Vec<Adjustment> = feed
            .iter()
            .filter_map(|raw| {
                let adj = Adjustment::from_raw(raw);
                if adj.is_none() {
                    log::warn!(
                        "ignoring adjustment identity={:?} state={:?} delta={}",
                        raw.identity, raw.state, raw.delta_percent
                    );
                }
                adj
            })
            .collect();
        Self::compute(&parsed)
    }
}
