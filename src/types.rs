// Shared record types and reference-scenario defaults for the assembly pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default capacity of each unit channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 500;
/// Default interval between kind-A emissions
pub const DEFAULT_A_PERIOD_MS: u64 = 50;
/// Default interval between kind-B emissions
pub const DEFAULT_B_PERIOD_MS: u64 = 150;
/// Default processing delay per product
pub const DEFAULT_ASSEMBLY_MS: u64 = 5000;
/// Default target throughput in products per second
pub const DEFAULT_TARGET_RATE: f64 = 10.0;
/// Default capacity of the worker pool's job queue
pub const DEFAULT_POOL_QUEUE_CAPACITY: usize = 1000;
/// Shutdown waits this many assembly times for in-flight assemblers by default
pub const DEFAULT_SHUTDOWN_GRACE_FACTOR: u64 = 2;
/// Upper bound on the worker count, explicit or derived
pub const MAX_WORKERS: usize = 10_000;
/// Upper bound on unit channel and job queue capacity
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;
/// Highest rate a derived tick period can pace (one tick per millisecond)
pub const MAX_DERIVED_RATE: f64 = 1000.0;

/// The two kinds of unit the sources emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    A,
    B,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::A => write!(f, "A"),
            UnitKind::B => write!(f, "B"),
        }
    }
}

/// A fungible token. Units of the same kind are indistinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub kind: UnitKind,
}

impl Unit {
    pub const fn new(kind: UnitKind) -> Self {
        Self { kind }
    }
}

/// Consumption ratio per product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recipe {
    pub a_units: u64,
    pub b_units: u64,
}

/// 2 units of kind A + 1 unit of kind B
pub const RECIPE: Recipe = Recipe {
    a_units: 2,
    b_units: 1,
};

/// Identity of a worker slot in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// A completed product. Reported once, then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub created_at: DateTime<Utc>,
    pub worker: WorkerId,
    /// Sequence number of the job that produced it
    pub job_seq: u64,
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Molecule #{} created by {} time: {}",
            self.job_seq,
            self.worker,
            self.created_at.to_rfc3339()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipe_ratio() {
        assert_eq!(RECIPE.a_units, 2);
        assert_eq!(RECIPE.b_units, 1);
    }

    #[test]
    fn test_product_report_line() {
        let product = Product {
            created_at: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            worker: WorkerId(7),
            job_seq: 42,
        };

        let line = product.to_string();
        assert!(line.contains("worker-7"));
        assert!(line.contains("#42"));
        assert!(line.contains("2024-05-01T12:00:00"));
    }
}
