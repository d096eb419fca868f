use crate::{customer_pool::CustomerRecord, probability::RawAdjustment, types::Seconds};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// Completed visits (by anyone) a customer sits out after their own.
    pub cooldown_visits: u32,
    /// Customers held back at session start and forced in at close.
    pub guarantee_count: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cooldown_visits: 3,
            guarantee_count: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PacingConfig {
    /// Threshold before the first arrival.
    pub base_interval_secs: Seconds,
    /// The threshold never drops below this.
    pub min_interval_secs:  Seconds,
    /// Threshold reduction per customer already spawned.
    pub acceleration_secs:  Seconds,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: 8.0,
            min_interval_secs:  3.0,
            acceleration_secs:  0.25,
        }
    }
}

impl PacingConfig {
    /// Spawn threshold once `spawned` customers have arrived tonight.
    pub fn interval_after(&self, spawned: u32) -> Seconds {
        let floor = self.min_interval_secs.max(f64::EPSILON);
        (self.base_interval_secs - self.acceleration_secs * f64::from(spawned)).max(floor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NightConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default = "default_closing_timeout")]
    pub closing_timeout_secs: Seconds,
    /// Persist every stream draw as it happens.
    #[serde(default = "default_autosave")]
    pub autosave: bool,
}

fn default_closing_timeout() -> Seconds {
    60.0
}

fn default_autosave() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    customers: Vec<CustomerRecord>,
}

impl NightConfig {
    /// Load from the data/ directory.
    /// In tests, use NightConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/config/night_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: NightConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            pool: PoolConfig::default(),
            pacing: PacingConfig {
                base_interval_secs: 5.0,
                min_interval_secs:  2.0,
                acceleration_secs:  0.5,
            },
            closing_timeout_secs: 30.0,
            autosave: true,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.pacing.min_interval_secs > 0.0) {
            anyhow::bail!("pacing.min_interval_secs must be > 0");
        }
        if self.pacing.base_interval_secs < self.pacing.min_interval_secs {
            anyhow::bail!("pacing.base_interval_secs must be >= min_interval_secs");
        }
        if self.pacing.acceleration_secs < 0.0 {
            anyhow::bail!("pacing.acceleration_secs must be >= 0");
        }
        if !(self.closing_timeout_secs >= 0.0) {
            anyhow::bail!("closing_timeout_secs must be >= 0");
        }
        Ok(())
    }
}

/// Load the static customer catalog. Duplicate ids are rejected.
pub fn load_catalog(data_dir: &str) -> anyhow::Result<Vec<CustomerRecord>> {
    let path = format!("{data_dir}/catalog/customers.json");
    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    let file: CatalogFile = serde_json::from_str(&content)?;

    let mut seen = HashSet::new();
    for c in &file.customers {
        if !seen.insert(c.id.as_str()) {
            anyhow::bail!("Duplicate customer id '{}' in {path}", c.id);
        }
    }
    Ok(file.customers)
}

/// Load one day's adjustment feed: a JSON array of
/// `{identity, state, deltaPercent}`.
pub fn load_adjustments(path: &str) -> anyhow::Result<Vec<RawAdjustment>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    Ok(serde_json::from_str(&content)?)
}
