//! The key/value persistence contract the core is written against.
//!
//! RULE: The core never interprets stored blobs beyond round-tripping
//! them. RNG state and session checkpoints both go through this trait.

use crate::{error::NightResult, event::EventLogEntry};
use std::collections::HashMap;

pub trait StateStore: Send {
    fn exists(&self, key: &str) -> NightResult<bool>;

    fn save(&mut self, key: &str, blob: &str) -> NightResult<()>;

    /// None when nothing is stored under `key`.
    fn load(&self, key: &str) -> NightResult<Option<String>>;

    fn remove(&mut self, key: &str) -> NightResult<()>;

    /// Outward event log. Stores that do not keep one drop entries.
    fn append_event(&mut self, _entry: &EventLogEntry) -> NightResult<()> {
        Ok(())
    }
}

/// In-process store. Used by tests and by the runner's `:memory:` mode.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    blobs:  HashMap<String, String>,
    events: Vec<EventLogEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[EventLogEntry] {
        &self.events
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(String::as_str)
    }
}

impl StateStore for MemoryStore {
    fn exists(&self, key: &str) -> NightResult<bool> {
        Ok(self.blobs.contains_key(key))
    }

    fn save(&mut self, key: &str, blob: &str) -> NightResult<()> {
        self.blobs.insert(key.to_string(), blob.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> NightResult<Option<String>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn remove(&mut self, key: &str) -> NightResult<()> {
        self.blobs.remove(key);
        Ok(())
    }

    fn append_event(&mut self, entry: &EventLogEntry) -> NightResult<()> {
        self.events.push(entry.clone());
        Ok(())
    }
}
