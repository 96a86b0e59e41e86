// Stage 2: Molecule Assembler
//
// One assembly consumes one recipe (2 × A, 1 × B) and yields one product:
// 1. take A
// 2. take A
// 3. take B
// 4. hold for the assembly duration
// 5. report the product to the sink
//
// Every assembler acquires in that same order, so no circular wait can form
// between concurrent assemblers. Shutdown interrupts a blocked take with
// `Cancelled`; units already taken by that assembly are discarded and counted,
// never put back.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::channel::BoundedChannel;
use super::error::{FactoryError, Result};
use crate::factory_debug;
use crate::types::{Product, Unit, UnitKind, WorkerId, RECIPE};

/// Receives every completed product
#[cfg_attr(test, mockall::automock)]
pub trait ProductSink: Send + Sync {
    fn report(&self, product: &Product);
}

/// Default sink: one log line per product
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProductSink for LogSink {
    fn report(&self, product: &Product) {
        info!("🧪 {}", product);
    }
}

#[derive(Default)]
struct AssemblerCounters {
    a_taken: AtomicU64,
    b_taken: AtomicU64,
    a_discarded: AtomicU64,
    b_discarded: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    closed: AtomicU64,
}

/// Units an in-progress assembly is holding
#[derive(Debug, Default, Clone, Copy)]
struct Held {
    a: u64,
    b: u64,
}

/// An assembly between its first take and its outcome. Dropping it unresolved
/// (the worker task was aborted) counts the job as cancelled and its units as discarded.
struct InFlight<'a> {
    assembler: &'a MoleculeAssembler,
    worker: WorkerId,
    job_seq: u64,
    held: Held,
    resolved: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.assembler
                .abandon(self.worker, self.job_seq, self.held, &FactoryError::Cancelled);
        }
    }
}

pub struct MoleculeAssembler {
    channel_a: Arc<BoundedChannel<Unit>>,
    channel_b: Arc<BoundedChannel<Unit>>,
    assembly_duration: Duration,
    sink: Arc<dyn ProductSink>,
    counters: AssemblerCounters,
}

impl MoleculeAssembler {
    pub fn new(
        channel_a: Arc<BoundedChannel<Unit>>,
        channel_b: Arc<BoundedChannel<Unit>>,
        assembly_duration: Duration,
        sink: Arc<dyn ProductSink>,
    ) -> Self {
        Self {
            channel_a,
            channel_b,
            assembly_duration,
            sink,
            counters: AssemblerCounters::default(),
        }
    }

    pub fn assembly_duration(&self) -> Duration {
        self.assembly_duration
    }

    /// Run one assembly on behalf of `worker`
    pub async fn assemble(
        &self,
        worker: WorkerId,
        job_seq: u64,
        token: &CancellationToken,
    ) -> Result<Product> {
        let mut in_flight = InFlight {
            assembler: self,
            worker,
            job_seq,
            held: Held::default(),
            resolved: false,
        };

        if let Err(e) = self.acquire_recipe(&mut in_flight.held, token).await {
            in_flight.resolved = true;
            self.abandon(worker, job_seq, in_flight.held, &e);
            return Err(e);
        }

        factory_debug!(
            "⚗️ ASSEMBLER[{}]: job #{} holds recipe, assembling for {:?}",
            worker,
            job_seq,
            self.assembly_duration
        );

        // In-flight assemblies run to completion; the pool's grace period bounds shutdown
        tokio::time::sleep(self.assembly_duration).await;
        in_flight.resolved = true;

        let product = Product {
            created_at: Utc::now(),
            worker,
            job_seq,
        };
        self.sink.report(&product);
        self.counters.completed.fetch_add(1, Ordering::AcqRel);

        Ok(product)
    }

    async fn acquire_recipe(&self, held: &mut Held, token: &CancellationToken) -> Result<()> {
        for _ in 0..RECIPE.a_units {
            take_unit(&self.channel_a, UnitKind::A, token).await?;
            held.a += 1;
            self.counters.a_taken.fetch_add(1, Ordering::AcqRel);
        }

        for _ in 0..RECIPE.b_units {
            take_unit(&self.channel_b, UnitKind::B, token).await?;
            held.b += 1;
            self.counters.b_taken.fetch_add(1, Ordering::AcqRel);
        }

        Ok(())
    }

    fn abandon(&self, worker: WorkerId, job_seq: u64, held: Held, reason: &FactoryError) {
        match reason {
            FactoryError::Closed => self.counters.closed.fetch_add(1, Ordering::AcqRel),
            _ => self.counters.cancelled.fetch_add(1, Ordering::AcqRel),
        };

        if held.a > 0 || held.b > 0 {
            self.counters.a_discarded.fetch_add(held.a, Ordering::AcqRel);
            self.counters.b_discarded.fetch_add(held.b, Ordering::AcqRel);
            info!(
                "🗑️ ASSEMBLER[{}]: job #{} abandoned ({}), discarding {} A + {} B",
                worker, job_seq, reason, held.a, held.b
            );
        } else {
            factory_debug!(
                "🗑️ ASSEMBLER[{}]: job #{} abandoned ({}) before taking any unit",
                worker,
                job_seq,
                reason
            );
        }
    }

    pub fn get_stats(&self) -> AssemblerStats {
        AssemblerStats {
            a_units_taken: self.counters.a_taken.load(Ordering::Acquire),
            b_units_taken: self.counters.b_taken.load(Ordering::Acquire),
            a_units_discarded: self.counters.a_discarded.load(Ordering::Acquire),
            b_units_discarded: self.counters.b_discarded.load(Ordering::Acquire),
            products_completed: self.counters.completed.load(Ordering::Acquire),
            cancelled: self.counters.cancelled.load(Ordering::Acquire),
            closed: self.counters.closed.load(Ordering::Acquire),
        }
    }
}

async fn take_unit(
    channel: &BoundedChannel<Unit>,
    kind: UnitKind,
    token: &CancellationToken,
) -> Result<Unit> {
    let unit = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(FactoryError::Cancelled),
        unit = channel.take() => unit?,
    };
    debug_assert_eq!(unit.kind, kind);
    Ok(unit)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub a_units_taken: u64,
    pub b_units_taken: u64,
    pub a_units_discarded: u64,
    pub b_units_discarded: u64,
    pub products_completed: u64,
    pub cancelled: u64,
    pub closed: u64,
}

impl AssemblerStats {
    pub fn units_discarded(&self) -> u64 {
        self.a_units_discarded + self.b_units_discarded
    }
}
