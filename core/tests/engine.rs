//! End-to-end night tests: determinism, event logging, checkpoint and
//! resume, command routing.

use chrono::NaiveDate;
use nightdesk_core::{
    command::SessionCommand,
    config::{load_adjustments, load_catalog, NightConfig},
    customer_pool::{CustomerRecord, NightCustomerState},
    engine::NightEngine,
    error::NightError,
    event::NightEvent,
    persistence::{MemoryStore, StateStore},
    probability::RawAdjustment,
    scheduler::SessionPhase,
    snapshot::{checkpoint_key, NightSnapshot},
    store::NightStore,
    types::{Identity, MoodState},
};

const PLAYER: &str = "p1";

fn data_dir() -> String {
    format!("{}/../data", env!("CARGO_MANIFEST_DIR"))
}

fn night() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

fn catalog() -> Vec<CustomerRecord> {
    load_catalog(&data_dir()).expect("catalog loads")
}

fn feed() -> Vec<RawAdjustment> {
    load_adjustments(&format!("{}/feed/adjustments.json", data_dir())).expect("feed loads")
}

fn memory_engine() -> NightEngine {
    NightEngine::new(
        PLAYER,
        night(),
        &NightConfig::default_test(),
        catalog(),
        &feed(),
        Box::new(MemoryStore::new()),
    )
}

/// Shared-cache in-memory database. The returned handle keeps it alive.
fn shared_store(name: &str) -> NightStore {
    let store = NightStore::open(&format!("file:{name}?mode=memory&cache=shared")).unwrap();
    store.migrate().unwrap();
    store
}

/// Half-second ticks; the front of the line finishes every third second.
fn drive(engine: &mut NightEngine, steps: std::ops::Range<u32>) -> Vec<NightEvent> {
    let mut events = Vec::new();
    for step in steps {
        events.extend(engine.tick(0.5).unwrap());
        if step % 6 == 5 {
            if let Some(front) = engine.scheduler().pool().state().queued.front().cloned() {
                events.extend(engine.complete_visit(&front).unwrap());
            }
        }
    }
    events
}

/// Close up and serve the line until the night is over.
fn finish(engine: &mut NightEngine) -> Vec<NightEvent> {
    let mut events = engine.begin_closing().unwrap();
    while engine.phase() == SessionPhase::Closing {
        match engine.scheduler().pool().state().queued.front().cloned() {
            Some(front) => events.extend(engine.complete_visit(&front).unwrap()),
            None => events.extend(engine.tick(0.5).unwrap()),
        }
    }
    events
}

fn full_night(engine: &mut NightEngine) -> Vec<NightEvent> {
    let mut events = engine.start().unwrap();
    events.extend(drive(engine, 0..120));
    events.extend(finish(engine));
    events
}

#[test]
fn same_inputs_give_same_night() {
    let a = full_night(&mut memory_engine());
    let b = full_night(&mut memory_engine());
    assert_eq!(a, b);

    let arrived = a.iter().filter(|e| matches!(e, NightEvent::CustomerArrived { .. })).count();
    assert!(arrived > 5, "only {arrived} arrivals");
    assert!(matches!(a.last(), Some(NightEvent::SessionClosed { .. })));
}

#[test]
fn another_date_gives_another_night() {
    let mut other = NightEngine::new(
        PLAYER,
        night().succ_opt().unwrap(),
        &NightConfig::default_test(),
        catalog(),
        &feed(),
        Box::new(MemoryStore::new()),
    );
    let ids = |events: &[NightEvent]| -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                NightEvent::CustomerArrived { customer_id, .. } => Some(customer_id.clone()),
                _ => None,
            })
            .collect()
    };
    assert_ne!(ids(&full_night(&mut memory_engine())), ids(&full_night(&mut other)));
}

#[test]
fn feed_shapes_the_probability_table() {
    let engine = memory_engine();
    let entry = engine.probabilities().entry(Identity::Manager, MoodState::Irritable);
    assert_eq!(entry.adjustment, 15.0);
    assert!((engine.probabilities().normalized_sum() - 100.0).abs() < 1e-9);
}

#[test]
fn every_event_lands_in_the_log() {
    let holder = shared_store("engine_event_log");
    let mut engine = NightEngine::new(
        PLAYER,
        night(),
        &NightConfig::default_test(),
        catalog(),
        &feed(),
        Box::new(holder.reopen().unwrap()),
    );
    let events = full_night(&mut engine);

    let session = "p1/2026-10-19";
    let logged = holder.events_for_session(session).unwrap();
    assert_eq!(logged.len(), events.len());
    for (i, (entry, event)) in logged.iter().zip(&events).enumerate() {
        assert_eq!(entry.seq, i as u64);
        assert_eq!(entry.event_type, event.type_name());
        assert_eq!(entry.source, "scheduler");
        let payload: NightEvent = serde_json::from_str(&entry.payload).unwrap();
        assert_eq!(&payload, event);
    }

    let arrived = events.iter().filter(|e| matches!(e, NightEvent::CustomerArrived { .. })).count();
    assert_eq!(holder.event_count(session, "customer_arrived").unwrap(), arrived as i64);
    assert_eq!(holder.event_count(session, "session_closed").unwrap(), 1);

    let streams = holder.keys_with_prefix("rng/daily/p1/2026-10-19/").unwrap();
    assert_eq!(
        streams,
        vec![
            "rng/daily/p1/2026-10-19/night_guarantee".to_string(),
            "rng/daily/p1/2026-10-19/night_spawn".to_string(),
        ]
    );
}

#[test]
fn resumed_night_continues_identically() {
    let reference = full_night(&mut memory_engine());

    let holder = shared_store("engine_resume");
    let config = NightConfig::default_test();
    let mut first = NightEngine::new(
        PLAYER,
        night(),
        &config,
        catalog(),
        &feed(),
        Box::new(holder.reopen().unwrap()),
    );
    let mut events = first.start().unwrap();
    events.extend(drive(&mut first, 0..60));
    first.checkpoint().unwrap();
    let saved = first.snapshot();
    drop(first);

    let mut resumed = NightEngine::resume(
        PLAYER,
        night(),
        &config,
        catalog(),
        &feed(),
        Box::new(holder.reopen().unwrap()),
    )
    .unwrap();
    assert_eq!(resumed.snapshot(), saved);
    assert_eq!(resumed.phase(), SessionPhase::Running);

    events.extend(drive(&mut resumed, 60..120));
    events.extend(finish(&mut resumed));
    assert_eq!(events, reference);

    let logged = holder.events_for_session("p1/2026-10-19").unwrap();
    let seqs: Vec<u64> = logged.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..reference.len() as u64).collect::<Vec<_>>());
}

#[test]
fn checkpoint_blob_survives_resume_byte_for_byte() {
    let holder = shared_store("engine_checkpoint_bytes");
    let config = NightConfig::default_test();
    let mut engine = NightEngine::new(
        PLAYER,
        night(),
        &config,
        catalog(),
        &feed(),
        Box::new(holder.reopen().unwrap()),
    );
    engine.start().unwrap();
    drive(&mut engine, 0..40);
    engine.checkpoint().unwrap();
    drop(engine);

    let key = checkpoint_key(PLAYER, night());
    let blob = holder.load(&key).unwrap().expect("checkpoint stored");
    let resumed = NightEngine::resume(
        PLAYER,
        night(),
        &config,
        catalog(),
        &feed(),
        Box::new(holder.reopen().unwrap()),
    )
    .unwrap();
    assert_eq!(serde_json::to_string(&resumed.snapshot()).unwrap(), blob);
}

#[test]
fn finishing_writes_a_checkpoint() {
    let mut engine = memory_engine();
    full_night(&mut engine);

    let key = checkpoint_key(PLAYER, night());
    let blob = engine
        .provider()
        .with_store(|store| store.load(&key))
        .unwrap()
        .expect("checkpoint written at close");
    let snapshot: NightSnapshot = serde_json::from_str(&blob).unwrap();
    assert_eq!(snapshot.scheduler.phase, SessionPhase::Finished);
    assert_eq!(snapshot.customers, *engine.scheduler().pool().state());
    assert!(snapshot.customers.guarantee.is_empty());
}

#[test]
fn resume_without_checkpoint_fails() {
    let err = NightEngine::resume(
        PLAYER,
        night(),
        &NightConfig::default_test(),
        catalog(),
        &feed(),
        Box::new(MemoryStore::new()),
    )
    .err()
    .unwrap();
    assert!(matches!(err, NightError::CheckpointMissing { ref key } if key == "night/p1/2026-10-19/checkpoint"));
}

#[test]
fn commands_route_to_the_engine() {
    let mut engine = memory_engine();

    let started = engine.apply(&SessionCommand::Start).unwrap();
    assert!(matches!(started[0], NightEvent::SessionStarted { .. }));
    assert_eq!(engine.phase(), SessionPhase::Running);

    let mut arrived = Vec::new();
    while arrived.is_empty() {
        arrived = engine.apply(&SessionCommand::Tick { dt: 1.0 }).unwrap();
    }
    let NightEvent::CustomerArrived { customer_id, .. } = &arrived[0] else {
        panic!("expected an arrival, got {:?}", arrived[0]);
    };
    let visit = engine
        .apply(&SessionCommand::CompleteVisit { customer_id: customer_id.clone() })
        .unwrap();
    assert!(matches!(visit[0], NightEvent::VisitCompleted { visit_count: 1, .. }));

    assert!(engine.apply(&SessionCommand::Checkpoint).unwrap().is_empty());
    assert!(engine.apply(&SessionCommand::GetState).unwrap().is_empty());
    engine.apply(&SessionCommand::Close).unwrap();
    assert_ne!(engine.phase(), SessionPhase::Running);
    assert!(engine.apply(&SessionCommand::Start).is_err());

    let cmd: SessionCommand = serde_json::from_str(r#"{"cmd":"tick","dt":0.25}"#).unwrap();
    assert_eq!(cmd, SessionCommand::Tick { dt: 0.25 });
    let cmd: SessionCommand =
        serde_json::from_str(r#"{"cmd":"complete_visit","customer_id":"c-001"}"#).unwrap();
    assert_eq!(cmd, SessionCommand::CompleteVisit { customer_id: "c-001".to_string() });
}

#[test]
fn carry_over_starts_with_last_nights_cooldowns() {
    let mut yesterday = NightCustomerState::default();
    yesterday.cooldown.insert("c-001".to_string(), 2);
    yesterday.global_visit_count = 9;

    let engine = NightEngine::with_carry_over(
        PLAYER,
        night(),
        &NightConfig::default_test(),
        catalog(),
        &feed(),
        Box::new(MemoryStore::new()),
        Some(&yesterday),
    );
    let state = engine.scheduler().pool().state();
    assert_eq!(state.cooldown.get("c-001"), Some(&2));
    assert!(!state.available.contains("c-001"));
    assert_eq!(state.global_visit_count, 9);
}
