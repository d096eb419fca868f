//! night-runner: headless night simulator.
//!
//! Usage:
//!   night-runner --player p1 --date 2026-10-19 --seconds 300 --db night.db
//!   night-runner --player p1 --date 2026-10-19 --ipc-mode

use anyhow::{Context, Result};
use chrono::NaiveDate;
use nightdesk_core::{
    command::SessionCommand,
    config::{load_adjustments, load_catalog, NightConfig},
    engine::NightEngine,
    event::NightEvent,
    scheduler::SessionPhase,
    store::NightStore,
    types::{CustomerId, Seconds},
};
use std::collections::VecDeque;
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Serialize)]
struct UiState<'a> {
    phase:         SessionPhase,
    elapsed:       Seconds,
    next_spawn_in: Seconds,
    queued:        Vec<CustomerId>,
    available:     usize,
    cooling:       usize,
    visited:       usize,
    guarantees:    &'a [CustomerId],
    events:        &'a [NightEvent],
}

/// One customer served at a time, in arrival order.
struct Counter {
    service_secs: Seconds,
    line:         VecDeque<CustomerId>,
    current:      Option<(CustomerId, Seconds)>,
}

impl Counter {
    fn new(service_secs: Seconds) -> Self {
        Self { service_secs, line: VecDeque::new(), current: None }
    }

    fn admit(&mut self, events: &[NightEvent]) {
        for event in events {
            if let NightEvent::CustomerArrived { customer_id, .. } = event {
                self.line.push_back(customer_id.clone());
            }
        }
    }

    /// Returns ids whose visit finished during `dt`.
    fn serve(&mut self, dt: Seconds) -> Vec<CustomerId> {
        let mut done = Vec::new();
        let mut budget = dt;
        loop {
            if self.current.is_none() {
                match self.line.pop_front() {
                    Some(id) => self.current = Some((id, self.service_secs)),
                    None => break,
                }
            }
            let Some((id, left)) = self.current.as_mut() else { break };
            if *left > budget {
                *left -= budget;
                break;
            }
            budget -= *left;
            done.push(id.clone());
            self.current = None;
        }
        done
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let player = parse_str(&args, "--player", "player-1");
    let date = parse_str(&args, "--date", "2026-10-19");
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .with_context(|| format!("--date must be YYYY-MM-DD, got {date}"))?;
    let seconds = parse_arg(&args, "--seconds", 300.0f64);
    let dt = parse_arg(&args, "--dt", 0.5f64);
    let service_secs = parse_arg(&args, "--service-secs", 6.0f64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = parse_str(&args, "--db", ":memory:");
    let data_dir = parse_str(&args, "--data-dir", "./data");
    let feed_path = parse_str(&args, "--feed", &format!("{data_dir}/feed/adjustments.json"));

    if !ipc_mode {
        println!("night-runner");
        println!("  player:    {player}");
        println!("  date:      {date}");
        println!("  seconds:   {seconds}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = NightConfig::load(&data_dir)?;
    let catalog = load_catalog(&data_dir)?;
    let feed = load_adjustments(&feed_path)?;

    // For :memory: use SQLite shared-memory URI so the engine's connection
    // and the summary connection see the same database.
    let db_effective: String = if db == ":memory:" {
        format!("file:nightrun_{}?mode=memory&cache=shared", wall_clock_secs())
    } else {
        db.clone()
    };
    let store = NightStore::open(&db_effective)?;
    store.migrate()?;

    let engine_store = Box::new(store.reopen()?);
    let resume = args.iter().any(|a| a == "--resume");
    let mut engine = if resume {
        NightEngine::resume(&player, date, &config, catalog, &feed, engine_store)?
    } else {
        NightEngine::new(&player, date, &config, catalog, &feed, engine_store)
    };

    if ipc_mode {
        run_ipc_loop(&mut engine)?;
    } else {
        log::debug!("{}", engine.probabilities().summary());
        run_night(&mut engine, seconds, dt, service_secs, config.closing_timeout_secs)?;
        print_summary(&engine, &store)?;
    }
    Ok(())
}

fn run_night(
    engine: &mut NightEngine,
    seconds: Seconds,
    dt: Seconds,
    service_secs: Seconds,
    closing_timeout: Seconds,
) -> Result<()> {
    let dt = dt.max(0.01);
    let mut counter = Counter::new(service_secs);
    if engine.phase() == SessionPhase::Idle {
        engine.start()?;
    }

    let mut clock = 0.0;
    while clock < seconds && engine.phase() == SessionPhase::Running {
        let events = engine.tick(dt)?;
        counter.admit(&events);
        for id in counter.serve(dt) {
            engine.complete_visit(&id)?;
        }
        clock += dt;
    }

    if engine.phase() == SessionPhase::Running {
        let events = engine.begin_closing()?;
        counter.admit(&events);
    }
    let mut closing = 0.0;
    while engine.phase() == SessionPhase::Closing && closing <= closing_timeout + dt {
        let events = engine.tick(dt)?;
        counter.admit(&events);
        for id in counter.serve(dt) {
            if engine.scheduler().pool().state().queued.contains(&id) {
                engine.complete_visit(&id)?;
            }
        }
        closing += dt;
    }
    engine.checkpoint()?;
    Ok(())
}

fn run_ipc_loop(engine: &mut NightEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: SessionCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };
        if cmd == SessionCommand::Quit {
            break;
        }

        match engine.apply(&cmd) {
            Ok(events) => {
                let state = build_ui_state(engine, &events);
                writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
            }
            Err(e) => {
                log::warn!("command {cmd:?} failed: {e}");
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
            }
        }
        stdout.flush()?;
    }
    engine.checkpoint()?;
    Ok(())
}

fn build_ui_state<'a>(engine: &'a NightEngine, events: &'a [NightEvent]) -> UiState<'a> {
    let scheduler = engine.scheduler();
    let customers = scheduler.pool().state();
    UiState {
        phase:         scheduler.phase(),
        elapsed:       scheduler.state().elapsed,
        next_spawn_in: scheduler.next_spawn_in(),
        queued:        customers.queued.iter().cloned().collect(),
        available:     customers.available.len(),
        cooling:       customers.cooldown.len(),
        visited:       customers.visited.len(),
        guarantees:    &customers.guarantee,
        events,
    }
}

fn print_summary(engine: &NightEngine, store: &NightStore) -> Result<()> {
    let session_id = format!("{}/{}", engine.player_id, engine.date.format("%Y-%m-%d"));
    let customers = engine.scheduler().pool().state();
    let arrivals = store.event_count(&session_id, "customer_arrived")?;
    let stalls = store.event_count(&session_id, "spawn_stalled")?;
    let closed = store.events_for_session(&session_id)?
        .into_iter()
        .filter(|e| e.event_type == "session_closed")
        .map(|e| e.payload)
        .last();

    println!("=== NIGHT SUMMARY ===");
    println!("  session:        {session_id}");
    println!("  phase:          {:?}", engine.phase());
    println!("  arrivals:       {arrivals}");
    println!("  visits:         {}", customers.global_visit_count);
    println!("  unique visited: {}", customers.visited.len());
    println!("  still queued:   {}", customers.queued.len());
    println!("  cooling:        {}", customers.cooldown.len());
    println!("  stalls:         {stalls}");
    match closed {
        Some(payload) => println!("  closed with:    {payload}"),
        None => println!("  (session did not close)"),
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn parse_str(args: &[String], flag: &str, default: &str) -> String {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
        .unwrap_or_else(|| default.to_string())
}

fn wall_clock_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
