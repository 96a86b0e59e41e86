// Factory configuration
//
// Layering: built-in defaults → optional JSON file (FACTORY_CONFIG_FILE)
// → individual FACTORY_* environment variables. The worker count and tick
// period are derived from target rate and assembly time unless overridden.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::factory::error::{FactoryError, Result};
use crate::types::{
    DEFAULT_ASSEMBLY_MS, DEFAULT_A_PERIOD_MS, DEFAULT_B_PERIOD_MS, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_POOL_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_GRACE_FACTOR, DEFAULT_TARGET_RATE,
    MAX_DERIVED_RATE, MAX_QUEUE_CAPACITY, MAX_WORKERS, RECIPE,
};

pub const CONFIG_FILE_ENV: &str = "FACTORY_CONFIG_FILE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Max buffered units per kind
    pub channel_capacity: usize,
    pub a_period_ms: u64,
    pub b_period_ms: u64,
    /// Fixed processing delay per product
    pub assembly_ms: u64,
    /// Products per second
    pub target_rate: f64,
    /// Overrides the derived `ceil(rate × assembly time)`
    pub workers: Option<usize>,
    /// Overrides the derived `1 / rate`
    pub tick_period_ms: Option<u64>,
    pub pool_queue_capacity: usize,
    /// Overrides the derived `2 × assembly time`; never shorter than one assembly
    pub shutdown_grace_ms: Option<u64>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            a_period_ms: DEFAULT_A_PERIOD_MS,
            b_period_ms: DEFAULT_B_PERIOD_MS,
            assembly_ms: DEFAULT_ASSEMBLY_MS,
            target_rate: DEFAULT_TARGET_RATE,
            workers: None,
            tick_period_ms: None,
            pool_queue_capacity: DEFAULT_POOL_QUEUE_CAPACITY,
            shutdown_grace_ms: None,
        }
    }
}

impl FactoryConfig {
    /// Defaults, then the JSON file named by `FACTORY_CONFIG_FILE`, then env overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_json_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Missing fields fall back to defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FactoryError::ConfigSource(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            FactoryError::ConfigSource(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_override("FACTORY_CHANNEL_CAPACITY")? {
            self.channel_capacity = v;
        }
        if let Some(v) = env_override("FACTORY_A_PERIOD_MS")? {
            self.a_period_ms = v;
        }
        if let Some(v) = env_override("FACTORY_B_PERIOD_MS")? {
            self.b_period_ms = v;
        }
        if let Some(v) = env_override("FACTORY_ASSEMBLY_MS")? {
            self.assembly_ms = v;
        }
        if let Some(v) = env_override("FACTORY_TARGET_RATE")? {
            self.target_rate = v;
        }
        if let Some(v) = env_override("FACTORY_WORKERS")? {
            self.workers = Some(v);
        }
        if let Some(v) = env_override("FACTORY_TICK_PERIOD_MS")? {
            self.tick_period_ms = Some(v);
        }
        if let Some(v) = env_override("FACTORY_POOL_QUEUE_CAPACITY")? {
            self.pool_queue_capacity = v;
        }
        if let Some(v) = env_override("FACTORY_SHUTDOWN_GRACE_MS")? {
            self.shutdown_grace_ms = Some(v);
        }
        Ok(())
    }

    /// Reject configurations the factory cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 || self.channel_capacity > MAX_QUEUE_CAPACITY {
            return Err(invalid(format!(
                "channel_capacity must be between 1 and {}, got {}",
                MAX_QUEUE_CAPACITY, self.channel_capacity
            )));
        }
        if self.a_period_ms == 0 || self.b_period_ms == 0 {
            return Err(invalid(format!(
                "source periods must be positive (A: {} ms, B: {} ms)",
                self.a_period_ms, self.b_period_ms
            )));
        }
        if self.assembly_ms == 0 {
            return Err(invalid("assembly_ms must be positive"));
        }
        if !self.target_rate.is_finite() || self.target_rate <= 0.0 {
            return Err(invalid(format!(
                "target_rate must be a positive number, got {}",
                self.target_rate
            )));
        }
        match self.workers {
            Some(0) => return Err(invalid("workers must be positive")),
            Some(workers) if workers > MAX_WORKERS => {
                return Err(invalid(format!(
                    "workers must be at most {}, got {}",
                    MAX_WORKERS, workers
                )))
            }
            Some(_) => {}
            None => {
                // Checked in f64 before the cast can saturate
                let in_flight = self.target_rate * self.assembly_duration().as_secs_f64();
                if in_flight > MAX_WORKERS as f64 {
                    return Err(invalid(format!(
                        "target_rate {} × assembly {:?} needs {:.0} workers, more than {}; set workers explicitly",
                        self.target_rate,
                        self.assembly_duration(),
                        in_flight.ceil(),
                        MAX_WORKERS
                    )));
                }
            }
        }
        match self.tick_period_ms {
            Some(0) => return Err(invalid("tick_period_ms must be positive")),
            Some(_) => {}
            None if self.target_rate > MAX_DERIVED_RATE => {
                return Err(invalid(format!(
                    "target_rate {} exceeds {}/s, the fastest derivable tick; set tick_period_ms explicitly",
                    self.target_rate, MAX_DERIVED_RATE
                )))
            }
            None => {}
        }
        if self.pool_queue_capacity == 0 || self.pool_queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(invalid(format!(
                "pool_queue_capacity must be between 1 and {}, got {}",
                MAX_QUEUE_CAPACITY, self.pool_queue_capacity
            )));
        }
        if let Some(grace_ms) = self.shutdown_grace_ms {
            if grace_ms < self.assembly_ms {
                return Err(invalid(format!(
                    "shutdown_grace_ms ({}) must cover one assembly ({} ms)",
                    grace_ms, self.assembly_ms
                )));
            }
        }
        Ok(())
    }

    pub fn a_period(&self) -> Duration {
        Duration::from_millis(self.a_period_ms)
    }

    pub fn b_period(&self) -> Duration {
        Duration::from_millis(self.b_period_ms)
    }

    pub fn assembly_duration(&self) -> Duration {
        Duration::from_millis(self.assembly_ms)
    }

    /// How long shutdown waits for in-flight assemblies before aborting them
    pub fn shutdown_grace(&self) -> Duration {
        match self.shutdown_grace_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.assembly_duration() * DEFAULT_SHUTDOWN_GRACE_FACTOR as u32,
        }
    }

    /// W = ceil(R × D), at least one
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            let in_flight = self.target_rate * self.assembly_duration().as_secs_f64();
            (in_flight.ceil() as usize).max(1)
        })
    }

    /// T = 1 / R, at least one millisecond
    pub fn tick_period(&self) -> Duration {
        match self.tick_period_ms {
            Some(ms) => Duration::from_millis(ms),
            None if self.target_rate.is_finite() && self.target_rate > 0.0 => {
                Duration::from_secs_f64(1.0 / self.target_rate).max(Duration::from_millis(1))
            }
            None => Duration::from_millis(1),
        }
    }

    /// Highest sustainable throughput given the target, source supply and worker count
    pub fn achievable_rate(&self) -> f64 {
        let a_supply = 1000.0 / self.a_period_ms.max(1) as f64 / RECIPE.a_units as f64;
        let b_supply = 1000.0 / self.b_period_ms.max(1) as f64 / RECIPE.b_units as f64;
        let pool_capacity = self.worker_count() as f64 / self.assembly_duration().as_secs_f64();
        let demand = 1.0 / self.tick_period().as_secs_f64();

        [self.target_rate, demand, a_supply, b_supply, pool_capacity]
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    }
}

fn invalid(message: impl Into<String>) -> FactoryError {
    FactoryError::InvalidConfig(message.into())
}

fn env_override<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| FactoryError::ConfigSource(format!("{}='{}': {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}
