// Stage 4: Rate Scheduler
//
// Converts a target throughput R into demand: one assembly job per tick,
// tick period T = 1/R. With assembly time D the pool needs W = R × D workers
// to keep every worker busy, at which point realized throughput converges to R.
//
// A tick never waits. If the pool queue is saturated the tick's demand is kept
// as backlog and flushed on a later tick, so slow-downs add latency and never
// lose products.

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::FactoryError;
use super::pacer::Pacer;
use super::worker_pool::{AssemblyJob, BoundedWorkerPool};

const STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Where scheduled jobs go
pub trait JobQueue: Send + Sync {
    fn submit(&self, job: AssemblyJob) -> Result<(), FactoryError>;
}

impl JobQueue for BoundedWorkerPool {
    fn submit(&self, job: AssemblyJob) -> Result<(), FactoryError> {
        BoundedWorkerPool::submit(self, job)
    }
}

#[derive(Default)]
struct SchedulerCounters {
    ticks: AtomicU64,
    submitted: AtomicU64,
    backlog: AtomicU64,
    saturated_ticks: AtomicU64,
}

pub struct RateScheduler {
    period: Duration,
    counters: Arc<SchedulerCounters>,
    worker_handle: Option<tokio::task::JoinHandle<()>>,
    stop_token: Option<CancellationToken>,
}

impl RateScheduler {
    pub fn new(period: Duration) -> Self {
        info!(
            "⏱️ RATE_SCHEDULER: Creating scheduler (tick period {:?} → {:.2} jobs/s)",
            period,
            1.0 / period.as_secs_f64().max(f64::EPSILON)
        );

        Self {
            period,
            counters: Arc::new(SchedulerCounters::default()),
            worker_handle: None,
            stop_token: None,
        }
    }

    /// Start ticking. The first job is submitted immediately.
    pub fn start(&mut self, queue: Arc<dyn JobQueue>, shutdown: &CancellationToken) -> Result<()> {
        if self.worker_handle.is_some() {
            return Ok(());
        }

        let token = shutdown.child_token();
        let period = self.period;
        let counters = self.counters.clone();
        let loop_token = token.clone();

        self.worker_handle = Some(tokio::spawn(async move {
            run_scheduler(period, queue, counters, loop_token).await;
        }));
        self.stop_token = Some(token);

        info!("✅ RATE_SCHEDULER: Started");
        Ok(())
    }

    /// Stop issuing ticks and wait for the loop to exit
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.stop_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.worker_handle.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                abort.abort();
                warn!("⚠️ RATE_SCHEDULER: force-terminated after timeout");
            }
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker_handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn get_stats(&self) -> SchedulerStats {
        SchedulerStats {
            period: self.period,
            ticks: self.counters.ticks.load(Ordering::Acquire),
            jobs_submitted: self.counters.submitted.load(Ordering::Acquire),
            backlog: self.counters.backlog.load(Ordering::Acquire),
            saturated_ticks: self.counters.saturated_ticks.load(Ordering::Acquire),
            is_running: self.is_running(),
        }
    }
}

async fn run_scheduler(
    period: Duration,
    queue: Arc<dyn JobQueue>,
    counters: Arc<SchedulerCounters>,
    token: CancellationToken,
) {
    let mut pacer = Pacer::fixed_rate(period);
    let mut next_seq = 0u64;
    let mut backlog = 0u64;

    info!("🚀 RATE_SCHEDULER: Ticking every {:?}", pacer.period());

    'ticks: while pacer.tick_or_cancel(&token).await.is_some() {
        counters.ticks.fetch_add(1, Ordering::AcqRel);
        backlog += 1;

        while backlog > 0 {
            match queue.submit(AssemblyJob { seq: next_seq }) {
                Ok(()) => {
                    next_seq += 1;
                    backlog -= 1;
                    counters.submitted.fetch_add(1, Ordering::AcqRel);
                }
                Err(FactoryError::PoolSaturated) => {
                    let saturated = counters.saturated_ticks.fetch_add(1, Ordering::AcqRel) + 1;
                    if saturated <= 3 || saturated % 100 == 0 {
                        warn!(
                            "⏸️ RATE_SCHEDULER: Pool saturated, {} jobs held back",
                            backlog
                        );
                    }
                    break;
                }
                Err(e) => {
                    info!("🛑 RATE_SCHEDULER: Job queue unavailable ({}), stopping", e);
                    counters.backlog.store(backlog, Ordering::Release);
                    break 'ticks;
                }
            }
        }

        counters.backlog.store(backlog, Ordering::Release);
    }

    info!(
        "🛑 RATE_SCHEDULER: Stopped after {} ticks ({} jobs submitted, {} held back)",
        counters.ticks.load(Ordering::Acquire),
        next_seq,
        backlog
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    pub period: Duration,
    pub ticks: u64,
    pub jobs_submitted: u64,
    pub backlog: u64,
    pub saturated_ticks: u64,
    pub is_running: bool,
}
