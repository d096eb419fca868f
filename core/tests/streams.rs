//! Seeded stream tests: reproducibility, persistence, corrupt state,
//! and the sampling helpers.

use chrono::NaiveDate;
use nightdesk_core::{
    error::{NightError, NightResult},
    persistence::{MemoryStore, StateStore},
    rng::{SeededStreamProvider, StreamKey, StreamScope},
};

/// Store whose reads always fail; writes land in the inner MemoryStore.
struct UnreadableStore(MemoryStore);

impl StateStore for UnreadableStore {
    fn exists(&self, key: &str) -> NightResult<bool> {
        self.0.exists(key)
    }

    fn save(&mut self, key: &str, blob: &str) -> NightResult<()> {
        self.0.save(key, blob)
    }

    fn load(&self, _key: &str) -> NightResult<Option<String>> {
        Err(NightError::Other(anyhow::anyhow!("disk unavailable")))
    }

    fn remove(&mut self, key: &str) -> NightResult<()> {
        self.0.remove(key)
    }
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

fn provider(autosave: bool) -> SeededStreamProvider {
    SeededStreamProvider::new(Box::new(MemoryStore::new()), autosave)
}

fn draw_sequence(p: &SeededStreamProvider, scope: StreamScope, stream: &str) -> Vec<i32> {
    let mut s = p.stream(scope, stream, "p1");
    (0..16).map(|_| s.range_i32(0, 1_000_000).unwrap()).collect()
}

fn stored_blob(p: &SeededStreamProvider, key: &str) -> Option<String> {
    p.with_store(|store| store.load(key)).unwrap()
}

#[test]
fn independent_providers_produce_identical_sequences() {
    let a = provider(true);
    let b = provider(true);

    let scope = StreamScope::Daily(day());
    assert_eq!(draw_sequence(&a, scope, "spawn"), draw_sequence(&b, scope, "spawn"));

    let mut sa = a.stream(scope, "mixed", "p1");
    let mut sb = b.stream(scope, "mixed", "p1");
    let mut va: Vec<u32> = (0..20).collect();
    let mut vb: Vec<u32> = (0..20).collect();
    sa.shuffle(&mut va).unwrap();
    sb.shuffle(&mut vb).unwrap();
    assert_eq!(va, vb);
    assert_eq!(sa.unit().unwrap(), sb.unit().unwrap());
    assert_eq!(
        sa.weighted_pick(&["x", "y", "z"], &[1.0, 2.0, 3.0]).unwrap(),
        sb.weighted_pick(&["x", "y", "z"], &[1.0, 2.0, 3.0]).unwrap()
    );
}

#[test]
fn different_keys_give_different_sequences() {
    let p = provider(true);
    let today = draw_sequence(&p, StreamScope::Daily(day()), "spawn");
    let tomorrow = draw_sequence(&p, StreamScope::Daily(day().succ_opt().unwrap()), "spawn");
    let other = draw_sequence(&p, StreamScope::Daily(day()), "guarantee");
    let forever = draw_sequence(&p, StreamScope::Persistent, "spawn");

    assert_ne!(today, tomorrow);
    assert_ne!(today, other);
    assert_ne!(today, forever);
}

#[test]
fn initial_state_is_stored_on_first_access() {
    let p = provider(false);
    let key = StreamKey::new(StreamScope::Persistent, "loot", "p1").storage_key();
    assert!(stored_blob(&p, &key).is_none());

    let mut s = p.stream(StreamScope::Persistent, "loot", "p1");
    let first = s.unit().unwrap();
    let _ = s.unit().unwrap();

    // Autosave is off, so the store still holds the seed state.
    let blob = stored_blob(&p, &key).expect("seed state stored");
    let mut copy = MemoryStore::new();
    copy.save(&key, &blob).unwrap();
    let replay = SeededStreamProvider::new(Box::new(copy), true);
    assert_eq!(replay.stream(StreamScope::Persistent, "loot", "p1").unit().unwrap(), first);
}

#[test]
fn stored_state_resumes_where_it_left_off() {
    let p = provider(true);
    let scope = StreamScope::Daily(day());
    let key = StreamKey::new(scope, "spawn", "p1").storage_key();

    let mut s = p.stream(scope, "spawn", "p1");
    for _ in 0..3 {
        s.range_i32(0, 100).unwrap();
    }
    let blob = stored_blob(&p, &key).unwrap();
    let next = s.range_i32(0, 100).unwrap();

    let mut copy = MemoryStore::new();
    copy.save(&key, &blob).unwrap();
    let resumed = SeededStreamProvider::new(Box::new(copy), true);
    assert_eq!(resumed.stream(scope, "spawn", "p1").range_i32(0, 100).unwrap(), next);
}

#[test]
fn flush_writes_held_state_when_autosave_is_off() {
    let p = provider(false);
    let key = StreamKey::new(StreamScope::Persistent, "loot", "p1").storage_key();
    let mut s = p.stream(StreamScope::Persistent, "loot", "p1");
    s.unit().unwrap();
    let seeded = stored_blob(&p, &key).unwrap();

    s.flush().unwrap();
    assert_ne!(stored_blob(&p, &key).unwrap(), seeded);
}

#[test]
fn corrupt_state_is_replaced_by_fresh_seed() {
    let scope = StreamScope::Daily(day());
    let key = StreamKey::new(scope, "spawn", "p1").storage_key();

    let mut broken = MemoryStore::new();
    broken.save(&key, "not a generator").unwrap();
    let p = SeededStreamProvider::new(Box::new(broken), true);
    let recovered = draw_sequence(&p, scope, "spawn");

    assert_eq!(recovered, draw_sequence(&provider(true), scope, "spawn"));
    let blob = stored_blob(&p, &key).unwrap();
    assert!(serde_json::from_str::<rand_pcg::Pcg32>(&blob).is_ok());
}

#[test]
fn reset_reseeds_from_the_key() {
    let p = provider(true);
    let scope = StreamScope::Persistent;
    let first = draw_sequence(&p, scope, "spawn");
    assert_ne!(draw_sequence(&p, scope, "spawn"), first);

    p.reset(&StreamKey::new(scope, "spawn", "p1")).unwrap();
    assert_eq!(draw_sequence(&p, scope, "spawn"), first);
}

#[test]
fn weighted_pick_matches_weights() {
    const TRIALS: usize = 100_000;
    let p = provider(false);
    let mut s = p.stream(StreamScope::Persistent, "weights", "p1");
    let items = [0usize, 1, 2, 3];
    let weights = [1.0, 2.0, 3.0, 4.0];

    let mut counts = [0usize; 4];
    for _ in 0..TRIALS {
        let i = s.weighted_pick(&items, &weights).unwrap().unwrap();
        counts[i] += 1;
    }
    for (i, count) in counts.iter().enumerate() {
        let observed = *count as f64 / TRIALS as f64;
        let expected = weights[i] / 10.0;
        assert!(
            (observed - expected).abs() < expected * 0.05,
            "item {i}: observed {observed:.4}, expected {expected:.2}"
        );
    }
}

#[test]
fn weighted_pick_without_positive_weight_is_none() {
    let p = provider(true);
    let mut s = p.stream(StreamScope::Persistent, "weights", "p1");
    assert_eq!(s.weighted_pick(&["a", "b"], &[0.0, -1.0]).unwrap(), None);
    assert_eq!(s.weighted_pick::<&str>(&[], &[]).unwrap(), None);
    assert_eq!(s.weighted_pick(&["a", "b"], &[0.0, 5.0]).unwrap(), Some("b"));
}

#[test]
fn ranges_respect_bounds() {
    let p = provider(false);
    let mut s = p.stream(StreamScope::Persistent, "ranges", "p1");
    for _ in 0..1_000 {
        let i = s.range_i32(-3, 4).unwrap();
        assert!((-3..4).contains(&i));
        let f = s.range_f64(1.5, 2.5).unwrap();
        assert!((1.5..=2.5).contains(&f));
        let u = s.unit().unwrap();
        assert!((0.0..1.0).contains(&u));
    }
    assert_eq!(s.range_i32(5, 5).unwrap(), 5);
    assert_eq!(s.range_f64(2.0, 1.0).unwrap(), 2.0);
}

#[test]
fn ranges_with_huge_or_infinite_bounds_do_not_panic() {
    let p = provider(true);
    let mut s = p.stream(StreamScope::Persistent, "ranges", "p1");
    for _ in 0..100 {
        let wide = s.range_f64(f64::MIN, f64::MAX).unwrap();
        assert!(wide.is_finite());
    }
    assert_eq!(s.range_f64(f64::NEG_INFINITY, 0.0).unwrap(), f64::NEG_INFINITY);
    assert_eq!(s.range_f64(0.0, f64::INFINITY).unwrap(), 0.0);
    assert!(s.range_f64(f64::NAN, 1.0).unwrap().is_nan());
}

#[test]
fn handles_on_one_key_share_the_held_generator() {
    let shared = provider(false);
    let mut a = shared.stream(StreamScope::Persistent, "x", "p1");
    let mut b = shared.stream(StreamScope::Persistent, "x", "p1");
    let a1 = a.unit().unwrap();
    let b1 = b.unit().unwrap();
    let a2 = a.unit().unwrap();
    assert_ne!(a1, b1);

    let single = provider(false);
    let mut s = single.stream(StreamScope::Persistent, "x", "p1");
    let expected: Vec<f64> = (0..3).map(|_| s.unit().unwrap()).collect();
    assert_eq!(vec![a1, b1, a2], expected);

    // A handle opened later continues the same sequence.
    let mut late = shared.stream(StreamScope::Persistent, "x", "p1");
    assert_eq!(late.unit().unwrap(), s.unit().unwrap());
}

#[test]
fn flush_all_writes_every_held_key() {
    let p = provider(false);
    let mut loot = p.stream(StreamScope::Persistent, "loot", "p1");
    let mut spawn = p.stream(StreamScope::Daily(day()), "spawn", "p1");
    loot.unit().unwrap();
    spawn.unit().unwrap();
    let loot_key = loot.storage_key().to_string();
    let spawn_key = spawn.storage_key().to_string();
    let loot_seed = stored_blob(&p, &loot_key).unwrap();
    let spawn_seed = stored_blob(&p, &spawn_key).unwrap();

    p.flush_all().unwrap();
    assert_ne!(stored_blob(&p, &loot_key).unwrap(), loot_seed);
    assert_ne!(stored_blob(&p, &spawn_key).unwrap(), spawn_seed);

    // Flushed state resumes in a fresh provider.
    let mut copy = MemoryStore::new();
    copy.save(&loot_key, &stored_blob(&p, &loot_key).unwrap()).unwrap();
    let resumed = SeededStreamProvider::new(Box::new(copy), true);
    assert_eq!(
        resumed.stream(StreamScope::Persistent, "loot", "p1").unit().unwrap(),
        loot.unit().unwrap()
    );
}

#[test]
fn unreadable_state_is_reseeded() {
    let scope = StreamScope::Daily(day());
    // Autosave off: the first draw reseeds, the rest use the held generator.
    let p = SeededStreamProvider::new(Box::new(UnreadableStore(MemoryStore::new())), false);
    let recovered = draw_sequence(&p, scope, "spawn");
    assert_eq!(recovered, draw_sequence(&provider(true), scope, "spawn"));
    let key = StreamKey::new(scope, "spawn", "p1").storage_key();
    assert!(p.with_store(|store| store.exists(&key)).unwrap());
}

#[test]
fn deal_leaves_source_untouched() {
    let p = provider(true);
    let mut s = p.stream(StreamScope::Persistent, "deal", "p1");
    let source: Vec<u32> = (0..10).collect();

    let hand = s.deal(&source, 4).unwrap();
    assert_eq!(hand.len(), 4);
    assert_eq!(source, (0..10).collect::<Vec<_>>());
    let mut unique = hand.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 4);

    assert_eq!(s.deal(&source, 50).unwrap().len(), 10);
}

#[test]
fn deal_remove_takes_cards_out_of_source() {
    let p = provider(true);
    let mut s = p.stream(StreamScope::Persistent, "deal", "p1");
    let mut source: Vec<u32> = (0..10).collect();

    let hand = s.deal_remove(&mut source, 3).unwrap();
    assert_eq!(hand.len(), 3);
    assert_eq!(source.len(), 7);
    for card in &hand {
        assert!(!source.contains(card));
    }
    // Survivors keep their order.
    assert!(source.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn concurrent_draws_on_one_key_never_interleave() {
    let shared = provider(true);
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let mut s = shared.stream(StreamScope::Persistent, "busy", "p1");
                for _ in 0..250 {
                    s.unit().unwrap();
                }
            });
        }
    });

    let sequential = provider(true);
    let mut s = sequential.stream(StreamScope::Persistent, "busy", "p1");
    for _ in 0..1_000 {
        s.unit().unwrap();
    }
    let after_shared = shared.stream(StreamScope::Persistent, "busy", "p1").unit().unwrap();
    assert_eq!(after_shared, s.unit().unwrap());
}
