//! Per-night customer pool.
//!
//! Every catalog id sits in exactly one of three partitions:
//!   available → queued → cooldown → available
//! `guarantee` and `visited` are tags on top of the partitions:
//!   - guarantee ids stay in `available` but are never weighted-drawn;
//!     the scheduler forces them in at close.
//!   - visited records who completed a visit tonight.

use crate::{
    config::PoolConfig,
    error::{NightError, NightResult},
    probability::ProbabilityResult,
    rng::RandomStream,
    types::{CustomerId, Gender, Identity, MoodState, Seconds},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Static catalog entry. The pool never mutates these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    pub id:       CustomerId,
    pub identity: Identity,
    #[serde(alias = "state")]
    pub mood:     MoodState,
    pub gender:   Gender,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub portrait: Option<String>,
    /// Relative weight inside the customer's identity × mood × gender bucket.
    pub visit_percent: f64,
}

/// Mutable per-session state. Serialized whole as the checkpoint blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NightCustomerState {
    pub queued:    VecDeque<CustomerId>,
    /// id → completed visits left before the id is drawable again.
    pub cooldown:  BTreeMap<CustomerId, u32>,
    pub available: BTreeSet<CustomerId>,
    pub guarantee: Vec<CustomerId>,
    #[serde(default)]
    pub guarantees_reserved: bool,
    pub visited:   BTreeSet<CustomerId>,
    pub global_visit_count: u64,
    pub total_spawned: u32,
    pub spawn_timer: Seconds,
}

impl NightCustomerState {
    pub fn is_guarantee(&self, id: &str) -> bool {
        self.guarantee.iter().any(|g| g == id)
    }
}

pub struct CustomerPool {
    catalog: BTreeMap<CustomerId, CustomerRecord>,
    config:  PoolConfig,
    pub(crate) state: NightCustomerState,
}

impl CustomerPool {
    /// Fresh night: every catalog id available, counters at zero.
    pub fn new(catalog: Vec<CustomerRecord>, config: PoolConfig) -> Self {
        Self::start_session(catalog, config, None)
    }

    /// Like `new`, but keeps last night's cooldown counters and visit
    /// counter when `carried_over` is given.
    pub fn start_session(
        catalog: Vec<CustomerRecord>,
        config: PoolConfig,
        carried_over: Option<&NightCustomerState>,
    ) -> Self {
        let catalog: BTreeMap<CustomerId, CustomerRecord> =
            catalog.into_iter().map(|c| (c.id.clone(), c)).collect();

        let mut state = NightCustomerState::default();
        if let Some(prev) = carried_over {
            state.global_visit_count = prev.global_visit_count;
            state.cooldown = prev
                .cooldown
                .iter()
                .filter(|(id, left)| **left > 0 && catalog.contains_key(*id))
                .map(|(id, left)| (id.clone(), *left))
                .collect();
        }
        state.available = catalog
            .keys()
            .filter(|id| !state.cooldown.contains_key(*id))
            .cloned()
            .collect();

        log::info!(
            "pool: session start with {} customers ({} available, {} cooling)",
            catalog.len(),
            state.available.len(),
            state.cooldown.len()
        );
        let pool = Self { catalog, config, state };
        debug_assert!(pool.partitions_consistent(), "pool partitions broken at start");
        pool
    }

    /// Rebuild from a checkpointed state. Catalog ids the state does not
    /// mention become available; ids the catalog no longer has are an error.
    pub fn restore(
        catalog: Vec<CustomerRecord>,
        config: PoolConfig,
        mut state: NightCustomerState,
    ) -> NightResult<Self> {
        let catalog: BTreeMap<CustomerId, CustomerRecord> =
            catalog.into_iter().map(|c| (c.id.clone(), c)).collect();

        let mentioned = state
            .available
            .iter()
            .chain(state.queued.iter())
            .chain(state.cooldown.keys())
            .chain(state.guarantee.iter())
            .chain(state.visited.iter());
        for id in mentioned {
            if !catalog.contains_key(id) {
                return Err(NightError::UnknownCustomer { id: id.clone() });
            }
        }
        for id in catalog.keys() {
            let placed = state.available.contains(id)
                || state.queued.contains(id)
                || state.cooldown.contains_key(id);
            if !placed {
                log::debug!("pool: restore adds new catalog id {id} to available");
                state.available.insert(id.clone());
            }
        }

        let pool = Self { catalog, config, state };
        debug_assert!(pool.partitions_consistent(), "pool partitions broken on restore");
        Ok(pool)
    }

    pub fn state(&self) -> &NightCustomerState {
        &self.state
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn record(&self, id: &str) -> Option<&CustomerRecord> {
        self.catalog.get(id)
    }

    pub fn catalog_len(&self) -> usize {
        self.catalog.len()
    }

    /// Hold back the last `n` ids of a shuffled view of `available`.
    /// Guarantees are fixed once reserved; later calls return the current set.
    pub fn reserve_guarantee(
        &mut self,
        n: usize,
        stream: &mut RandomStream<'_>,
    ) -> NightResult<Vec<CustomerId>> {
        if self.state.guarantees_reserved {
            return Ok(self.state.guarantee.clone());
        }
        let mut view: Vec<CustomerId> = self.state.available.iter().cloned().collect();
        stream.shuffle(&mut view)?;
        let take = n.min(view.len());
        self.state.guarantee = view.split_off(view.len() - take);
        self.state.guarantees_reserved = true;

        log::info!("pool: reserved {} guarantee(s): {:?}", take, self.state.guarantee);
        Ok(self.state.guarantee.clone())
    }

    /// Pick a bucket by its per-gender probability, then a customer inside
    /// it by visit percent, and queue them. None when nobody is drawable.
    pub fn draw_next(
        &mut self,
        probabilities: &ProbabilityResult,
        stream: &mut RandomStream<'_>,
    ) -> NightResult<Option<CustomerId>> {
        let mut members: HashMap<(Identity, MoodState, Gender), Vec<(CustomerId, f64)>> =
            HashMap::new();
        for id in &self.state.available {
            if self.state.is_guarantee(id) {
                continue;
            }
            let Some(c) = self.catalog.get(id) else { continue };
            if !(c.visit_percent > 0.0) {
                continue;
            }
            members
                .entry((c.identity, c.mood, c.gender))
                .or_default()
                .push((c.id.clone(), c.visit_percent));
        }
        if members.is_empty() {
            return Ok(None);
        }

        // Bucket order follows the probability table so draws are stable.
        let mut buckets = Vec::new();
        let mut bucket_weights = Vec::new();
        for entry in probabilities.entries() {
            for gender in Gender::ALL {
                let bucket = (entry.identity, entry.mood, gender);
                if members.contains_key(&bucket) {
                    buckets.push(bucket);
                    bucket_weights.push(entry.per_gender);
                }
            }
        }
        let Some(bucket) = stream.weighted_pick(&buckets, &bucket_weights)? else {
            return Ok(None);
        };

        let candidates = members.remove(&bucket).unwrap_or_default();
        let (ids, weights): (Vec<CustomerId>, Vec<f64>) = candidates.into_iter().unzip();
        let Some(id) = stream.weighted_pick(&ids, &weights)? else {
            return Ok(None);
        };

        self.state.available.remove(&id);
        self.state.queued.push_back(id.clone());
        log::debug!(
            "pool: drew {id} from {}/{}/{} ({} available)",
            bucket.0,
            bucket.1,
            bucket.2,
            self.state.available.len()
        );
        debug_assert!(self.partitions_consistent(), "pool partitions broken after draw");
        Ok(Some(id))
    }

    /// Move an available id straight to the queue, bypassing the draw.
    pub fn force_queue(&mut self, id: &str) -> NightResult<()> {
        if self.state.queued.iter().any(|q| q == id) {
            return Ok(());
        }
        if !self.state.available.remove(id) {
            return Err(self.partition_error(id, "available"));
        }
        self.state.queued.push_back(id.to_string());
        debug_assert!(self.partitions_consistent(), "pool partitions broken after force");
        Ok(())
    }

    /// Finish a queued customer's visit. Ticks everyone else's cooldown
    /// once, then starts this customer's. Returns ids whose cooldown ran out.
    pub fn complete_visit(&mut self, id: &str) -> NightResult<Vec<CustomerId>> {
        let Some(pos) = self.state.queued.iter().position(|q| q == id) else {
            return Err(self.partition_error(id, "queued"));
        };
        self.state.queued.remove(pos);
        self.state.visited.insert(id.to_string());
        self.state.global_visit_count += 1;
        self.state.guarantee.retain(|g| g != id);

        let expired = self.tick_cooldown();

        if self.config.cooldown_visits > 0 {
            self.state.cooldown.insert(id.to_string(), self.config.cooldown_visits);
        } else {
            self.state.available.insert(id.to_string());
        }
        log::debug!(
            "pool: {id} visited (total {}), cooldown {}",
            self.state.global_visit_count,
            self.config.cooldown_visits
        );
        debug_assert!(self.partitions_consistent(), "pool partitions broken after visit");
        Ok(expired)
    }

    /// Decrement every cooling id once; ids reaching zero become available.
    pub fn tick_cooldown(&mut self) -> Vec<CustomerId> {
        let mut expired = Vec::new();
        for (id, left) in self.state.cooldown.iter_mut() {
            *left = left.saturating_sub(1);
            if *left == 0 {
                expired.push(id.clone());
            }
        }
        for id in &expired {
            self.state.cooldown.remove(id);
            self.state.available.insert(id.clone());
        }
        expired
    }

    fn partition_error(&self, id: &str, expected: &'static str) -> NightError {
        if self.catalog.contains_key(id) {
            NightError::WrongPartition { id: id.to_string(), expected }
        } else {
            NightError::UnknownCustomer { id: id.to_string() }
        }
    }

    /// Each catalog id in exactly one partition; guarantees not cooling.
    fn partitions_consistent(&self) -> bool {
        let s = &self.state;
        let every_id_once = self.catalog.keys().all(|id| {
            let hits = usize::from(s.available.contains(id))
                + s.queued.iter().filter(|q| *q == id).count()
                + usize::from(s.cooldown.contains_key(id));
            hits == 1
        });
        let sizes_match =
            s.available.len() + s.queued.len() + s.cooldown.len() == self.catalog.len();
        let guarantees_live = s
            .guarantee
            .iter()
            .all(|g| s.available.contains(g) || s.queued.contains(g));
        every_id_once && sizes_match && guarantees_live
    }
}
