// Stage 3: Bounded Worker Pool
//
// A fixed set of worker tasks pulls assembly jobs from a bounded queue and
// runs them one at a time, so at most `worker_count` assemblies are in flight.
// Submitting never waits: a full queue reports `PoolSaturated` and the caller
// keeps the demand; a closed queue reports `Closed`.

use anyhow::Result;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::assembler::MoleculeAssembler;
use super::channel::{BoundedChannel, TryPutError};
use super::error::FactoryError;
use crate::factory_debug;
use crate::types::WorkerId;

/// One unit of demand: assemble a single product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyJob {
    pub seq: u64,
}

#[derive(Default)]
struct PoolCounters {
    submitted: AtomicU64,
    saturated: AtomicU64,
    active: AtomicUsize,
    completed: AtomicU64,
    cancelled: AtomicU64,
    closed: AtomicU64,
}

/// Marks a worker busy for one job. Dropped unresolved (worker aborted), the job counts as cancelled.
struct ActiveJob<'a> {
    counters: &'a PoolCounters,
    resolved: bool,
}

impl<'a> ActiveJob<'a> {
    fn begin(counters: &'a PoolCounters) -> Self {
        counters.active.fetch_add(1, Ordering::AcqRel);
        Self {
            counters,
            resolved: false,
        }
    }
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::AcqRel);
        if !self.resolved {
            self.counters.cancelled.fetch_add(1, Ordering::AcqRel);
        }
    }
}

pub struct BoundedWorkerPool {
    worker_count: usize,
    queue: Arc<BoundedChannel<AssemblyJob>>,
    counters: Arc<PoolCounters>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BoundedWorkerPool {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(FactoryError::InvalidConfig("worker count must be positive".into()).into());
        }
        let queue = BoundedChannel::new("assembly-jobs", queue_capacity)?;

        info!(
            "🏭 WORKER_POOL: Creating pool ({} workers, queue capacity {})",
            worker_count, queue_capacity
        );

        Ok(Self {
            worker_count,
            queue: Arc::new(queue),
            counters: Arc::new(PoolCounters::default()),
            worker_handles: Mutex::new(Vec::with_capacity(worker_count)),
        })
    }

    /// Spawn the workers. Each runs jobs until the queue is closed and drained.
    pub fn start(&self, assembler: Arc<MoleculeAssembler>, shutdown: &CancellationToken) -> Result<()> {
        let mut worker_handles = self.lock_handles();
        if !worker_handles.is_empty() {
            return Ok(());
        }

        for index in 0..self.worker_count {
            let worker = WorkerId(index);
            let queue = self.queue.clone();
            let counters = self.counters.clone();
            let assembler = assembler.clone();
            let token = shutdown.clone();

            worker_handles.push(tokio::spawn(async move {
                run_worker(worker, queue, assembler, counters, token).await;
            }));
        }

        info!(
            "✅ WORKER_POOL: Started {} workers (assembly time {:?})",
            self.worker_count,
            assembler.assembly_duration()
        );

        Ok(())
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.worker_handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue one job without waiting
    pub fn submit(&self, job: AssemblyJob) -> Result<(), FactoryError> {
        match self.queue.try_put(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Err(TryPutError::Full(_)) => {
                self.counters.saturated.fetch_add(1, Ordering::AcqRel);
                Err(FactoryError::PoolSaturated)
            }
            Err(TryPutError::Closed(_)) => Err(FactoryError::Closed),
        }
    }

    /// Stop accepting jobs. Already queued jobs still reach a worker.
    pub fn shutdown(&self) {
        if !self.queue.is_closed() {
            info!(
                "🛑 WORKER_POOL: No longer accepting jobs ({} queued, {} active)",
                self.queue.len(),
                self.counters.active.load(Ordering::Acquire)
            );
        }
        self.queue.close();
    }

    /// Wait up to `grace` for every worker to exit, then abort the rest
    pub async fn join(&self, grace: Duration) -> PoolShutdownReport {
        let handles = std::mem::take(&mut *self.lock_handles());
        let aborts: Vec<_> = handles.iter().map(|handle| handle.abort_handle()).collect();
        let total = handles.len();

        match tokio::time::timeout(grace, futures::future::join_all(handles)).await {
            Ok(results) => {
                let panicked = results.iter().filter(|result| result.is_err()).count();
                if panicked > 0 {
                    error!("❌ WORKER_POOL: {} workers panicked", panicked);
                }
                info!("✅ WORKER_POOL: All {} workers exited", total);
                PoolShutdownReport {
                    workers_exited: total - panicked,
                    workers_aborted: 0,
                    workers_panicked: panicked,
                }
            }
            Err(_) => {
                let stragglers = aborts.iter().filter(|abort| !abort.is_finished()).count();
                for abort in &aborts {
                    abort.abort();
                }
                // Aborted jobs settle their accounting when their futures drop
                while aborts.iter().any(|abort| !abort.is_finished()) {
                    tokio::task::yield_now().await;
                }
                warn!(
                    "⚠️ WORKER_POOL: {} workers force-terminated after {:?} grace period",
                    stragglers, grace
                );
                PoolShutdownReport {
                    workers_exited: total - stragglers,
                    workers_aborted: stragglers,
                    workers_panicked: 0,
                }
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn get_stats(&self) -> PoolStats {
        PoolStats {
            worker_count: self.worker_count,
            active_workers: self.counters.active.load(Ordering::Acquire),
            queued_jobs: self.queue.len(),
            jobs_submitted: self.counters.submitted.load(Ordering::Acquire),
            saturated_submits: self.counters.saturated.load(Ordering::Acquire),
            jobs_completed: self.counters.completed.load(Ordering::Acquire),
            jobs_cancelled: self.counters.cancelled.load(Ordering::Acquire),
            jobs_closed: self.counters.closed.load(Ordering::Acquire),
            is_accepting: !self.queue.is_closed(),
        }
    }
}

async fn run_worker(
    worker: WorkerId,
    queue: Arc<BoundedChannel<AssemblyJob>>,
    assembler: Arc<MoleculeAssembler>,
    counters: Arc<PoolCounters>,
    token: CancellationToken,
) {
    let mut jobs_run = 0u64;

    while let Ok(job) = queue.take().await {
        let mut active = ActiveJob::begin(&counters);
        let outcome = assembler.assemble(worker, job.seq, &token).await;
        active.resolved = true;
        drop(active);
        jobs_run += 1;

        match outcome {
            Ok(_) => {
                counters.completed.fetch_add(1, Ordering::AcqRel);
            }
            Err(FactoryError::Cancelled) => {
                counters.cancelled.fetch_add(1, Ordering::AcqRel);
            }
            Err(FactoryError::Closed) => {
                counters.closed.fetch_add(1, Ordering::AcqRel);
            }
            Err(e) => {
                error!("❌ WORKER_POOL[{}]: job #{} failed: {}", worker, job.seq, e);
            }
        }
    }

    factory_debug!("🛑 WORKER_POOL[{}]: exiting after {} jobs", worker, jobs_run);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub worker_count: usize,
    pub active_workers: usize,
    pub queued_jobs: usize,
    pub jobs_submitted: u64,
    pub saturated_submits: u64,
    pub jobs_completed: u64,
    pub jobs_cancelled: u64,
    pub jobs_closed: u64,
    pub is_accepting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolShutdownReport {
    pub workers_exited: usize,
    pub workers_aborted: usize,
    pub workers_panicked: usize,
}
