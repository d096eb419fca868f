//! Deterministic, persisted random streams.
//!
//! RULE: Nothing in the night core may call any platform RNG.
//! All randomness flows through RandomStream instances handed out by
//! the SeededStreamProvider.
//!
//! Each stream is keyed by (scope, player, date, stream name):
//!   - A stream with no stored state is seeded from an FNV-1a hash of
//!     `player|date|stream` and its initial state is stored at once.
//!   - Every draw loads the stored generator, runs one operation, and
//!     writes the advanced generator back before returning.
//!   - With autosave off the advanced generator is held by the provider,
//!     one per key, until a flush writes it back. Every handle on the key
//!     draws from that one generator.
//!   - Draws against the same key are serialized by a per-key lock, so
//!     the current state always matches the last completed draw.

use crate::{
    error::{NightError, NightResult},
    persistence::StateStore,
};
use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
pub const FNV_PRIME: u32 = 0x0100_0193;

/// Stands in for the date when hashing a Persistent stream's seed.
pub const PERSISTENT_DATE_MARKER: &str = "epoch";

/// 32-bit FNV-1a over the UTF-8 bytes of `input`.
pub fn fnv1a32(input: &str) -> u32 {
    input.bytes().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Daily streams restart every in-game day; Persistent ones live for the save.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamScope {
    Daily(NaiveDate),
    Persistent,
}

impl StreamScope {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Daily(_)   => "daily",
            Self::Persistent => "persistent",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub scope:     StreamScope,
    pub player_id: String,
    pub stream:    String,
}

impl StreamKey {
    pub fn new(scope: StreamScope, stream: &str, player_id: &str) -> Self {
        Self {
            scope,
            player_id: player_id.to_string(),
            stream:    stream.to_string(),
        }
    }

    /// `rng/{scope}/{playerId}/{dateOrEmpty}/{streamKey}`
    pub fn storage_key(&self) -> String {
        let date = match self.scope {
            StreamScope::Daily(d)   => d.format("%Y-%m-%d").to_string(),
            StreamScope::Persistent => String::new(),
        };
        format!("rng/{}/{}/{}/{}", self.scope.name(), self.player_id, date, self.stream)
    }

    fn date_stamp(&self) -> String {
        match self.scope {
            StreamScope::Daily(d)   => d.format("%Y-%m-%d").to_string(),
            StreamScope::Persistent => PERSISTENT_DATE_MARKER.to_string(),
        }
    }

    pub fn seed(&self) -> u32 {
        fnv1a32(&format!("{}|{}|{}", self.player_id, self.date_stamp(), self.stream))
    }
}

/// Owns the persistence collaborator and hands out streams over it.
pub struct SeededStreamProvider {
    store:     Mutex<Box<dyn StateStore>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Un-flushed generators by storage key. Only used with autosave off.
    held:      Mutex<HashMap<String, Pcg32>>,
    autosave:  bool,
}

impl SeededStreamProvider {
    pub fn new(store: Box<dyn StateStore>, autosave: bool) -> Self {
        Self {
            store: Mutex::new(store),
            key_locks: Mutex::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            autosave,
        }
    }

    pub fn autosave(&self) -> bool {
        self.autosave
    }

    pub fn stream(&self, scope: StreamScope, stream: &str, player_id: &str) -> RandomStream<'_> {
        RandomStream::new(self, StreamKey::new(scope, stream, player_id))
    }

    /// Run `f` with exclusive access to the underlying store.
    pub fn with_store<T>(
        &self,
        f: impl FnOnce(&mut dyn StateStore) -> NightResult<T>,
    ) -> NightResult<T> {
        let mut guard = self.lock_store("store")?;
        f(&mut **guard)
    }

    /// Forget a stream's stored state. Its next draw reseeds from the key.
    pub fn reset(&self, key: &StreamKey) -> NightResult<()> {
        let storage_key = key.storage_key();
        let lock = self.key_lock(&storage_key)?;
        let _key_guard = lock
            .lock()
            .map_err(|_| NightError::LockPoisoned { key: storage_key.clone() })?;
        self.lock_held(&storage_key)?.remove(&storage_key);
        let mut store = self.lock_store(&storage_key)?;
        store.remove(&storage_key)
    }

    /// Write every held generator back to the store.
    pub fn flush_all(&self) -> NightResult<()> {
        let keys: Vec<String> = self.lock_held("held")?.keys().cloned().collect();
        for storage_key in keys {
            self.flush_key(&storage_key)?;
        }
        Ok(())
    }

    fn flush_key(&self, storage_key: &str) -> NightResult<()> {
        let lock = self.key_lock(storage_key)?;
        let _key_guard = lock
            .lock()
            .map_err(|_| NightError::LockPoisoned { key: storage_key.to_string() })?;
        let rng = self.lock_held(storage_key)?.remove(storage_key);
        match rng {
            Some(rng) => self.persist(storage_key, &rng),
            None => Ok(()),
        }
    }

    fn lock_held(&self, key: &str) -> NightResult<MutexGuard<'_, HashMap<String, Pcg32>>> {
        self.held
            .lock()
            .map_err(|_| NightError::LockPoisoned { key: key.to_string() })
    }

    fn lock_store(&self, key: &str) -> NightResult<MutexGuard<'_, Box<dyn StateStore>>> {
        self.store
            .lock()
            .map_err(|_| NightError::LockPoisoned { key: key.to_string() })
    }

    fn key_lock(&self, storage_key: &str) -> NightResult<Arc<Mutex<()>>> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| NightError::LockPoisoned { key: storage_key.to_string() })?;
        Ok(locks
            .entry(storage_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Resume stored state, or seed fresh and store it. State that cannot
    /// be read or decoded counts as absent and is overwritten.
    fn load_or_seed(&self, key: &StreamKey, storage_key: &str) -> NightResult<Pcg32> {
        let stored = self.lock_store(storage_key)?.load(storage_key);
        match stored {
            Ok(Some(blob)) => match serde_json::from_str::<Pcg32>(&blob) {
                Ok(rng) => return Ok(rng),
                Err(e) => log::warn!("rng: corrupt state under {storage_key} ({e}); reseeding"),
            },
            Ok(None) => {}
            Err(e) => log::warn!("rng: cannot read state under {storage_key} ({e}); reseeding"),
        }
        let seed = key.seed();
        let rng = Pcg32::seed_from_u64(u64::from(seed));
        self.persist(storage_key, &rng)?;
        log::debug!("rng: seeded {storage_key} with {seed:#010x}");
        Ok(rng)
    }

    fn persist(&self, storage_key: &str, rng: &Pcg32) -> NightResult<()> {
        let blob = serde_json::to_string(rng)?;
        let mut store = self.lock_store(storage_key)?;
        store.save(storage_key, &blob)
    }
}

/// A handle on one keyed stream. Never holds a generator of its own.
pub struct RandomStream<'a> {
    provider:    &'a SeededStreamProvider,
    key:         StreamKey,
    storage_key: String,
}

impl<'a> RandomStream<'a> {
    fn new(provider: &'a SeededStreamProvider, key: StreamKey) -> Self {
        let storage_key = key.storage_key();
        Self { provider, key, storage_key }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Acquire the key, run one operation, write the result back.
    fn run<T>(&mut self, op: impl FnOnce(&mut Pcg32) -> T) -> NightResult<T> {
        let lock = self.provider.key_lock(&self.storage_key)?;
        let _key_guard = lock
            .lock()
            .map_err(|_| NightError::LockPoisoned { key: self.storage_key.clone() })?;

        let held = self.provider.lock_held(&self.storage_key)?.remove(&self.storage_key);
        let mut rng = match held {
            Some(rng) => rng,
            None => self.provider.load_or_seed(&self.key, &self.storage_key)?,
        };
        let out = op(&mut rng);
        if self.provider.autosave {
            self.provider.persist(&self.storage_key, &rng)?;
        } else {
            self.provider
                .lock_held(&self.storage_key)?
                .insert(self.storage_key.clone(), rng);
        }
        Ok(out)
    }

    /// Write this key's held generator back. No-op under autosave.
    pub fn flush(&mut self) -> NightResult<()> {
        self.provider.flush_key(&self.storage_key)
    }

    /// Uniform integer in [min, max_exclusive). An empty range yields `min`.
    pub fn range_i32(&mut self, min: i32, max_exclusive: i32) -> NightResult<i32> {
        if max_exclusive <= min {
            return Ok(min);
        }
        self.run(|rng| rng.gen_range(min..max_exclusive))
    }

    /// Uniform float in [min, max]. An empty range or a non-finite bound
    /// yields `min`.
    pub fn range_f64(&mut self, min: f64, max: f64) -> NightResult<f64> {
        if !(max > min) || !min.is_finite() || !max.is_finite() {
            return Ok(min);
        }
        // Interpolating keeps spans wider than f64::MAX finite.
        self.run(|rng| {
            let u = rng.gen::<f64>();
            (min * (1.0 - u) + max * u).clamp(min, max)
        })
    }

    /// Uniform float in [0, 1).
    pub fn unit(&mut self) -> NightResult<f64> {
        self.run(|rng| rng.gen::<f64>())
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) -> NightResult<()> {
        self.run(|rng| fisher_yates(rng, items))
    }

    /// Index of the picked weight, or None when no weight is positive.
    pub fn weighted_index(&mut self, weights: &[f64]) -> NightResult<Option<usize>> {
        self.run(|rng| weighted_index(rng, weights))
    }

    /// `items` and `weights` are parallel; extra entries in either are ignored.
    pub fn weighted_pick<T: Clone>(&mut self, items: &[T], weights: &[f64]) -> NightResult<Option<T>> {
        let n = items.len().min(weights.len());
        let idx = self.weighted_index(&weights[..n])?;
        Ok(idx.map(|i| items[i].clone()))
    }

    /// Sample up to `k` items without replacement. `source` is untouched.
    pub fn deal<T: Clone>(&mut self, source: &[T], k: usize) -> NightResult<Vec<T>> {
        let picked = self.run(|rng| dealt_indices(rng, source.len(), k))?;
        Ok(picked.into_iter().map(|i| source[i].clone()).collect())
    }

    /// Sample up to `k` items without replacement and take them out of
    /// `source`. Remaining items keep their relative order.
    pub fn deal_remove<T>(&mut self, source: &mut Vec<T>, k: usize) -> NightResult<Vec<T>> {
        let picked = self.run(|rng| dealt_indices(rng, source.len(), k))?;
        let mut slots: Vec<Option<T>> = source.drain(..).map(Some).collect();
        let dealt: Vec<T> = picked.iter().filter_map(|&i| slots[i].take()).collect();
        source.extend(slots.into_iter().flatten());
        Ok(dealt)
    }
}

/// In-place Fisher–Yates, last index down to 1.
fn fisher_yates<T>(rng: &mut Pcg32, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Cumulative scan: first positive-weight item whose running total
/// reaches the roll.
fn weighted_index(rng: &mut Pcg32, weights: &[f64]) -> Option<usize> {
    let total: f64 = weights.iter().copied().filter(|w| *w > 0.0).sum();
    if !(total > 0.0) {
        return None;
    }
    let roll = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (i, &w) in weights.iter().enumerate() {
        if !(w > 0.0) {
            continue;
        }
        cumulative += w;
        last_positive = Some(i);
        if cumulative >= roll {
            return Some(i);
        }
    }
    // Float rounding can leave the roll a hair above the final total.
    last_positive
}

fn dealt_indices(rng: &mut Pcg32, len: usize, k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    fisher_yates(rng, &mut order);
    order.truncate(k.min(len));
    order
}
