// Factory lifecycle controller
//
// Owns every stage of the pipeline and drives it as a unit:
// - start(): sources first (warm buffers), then the scheduler, then the pool
// - shutdown(): stop ticks, cancel sources, close channels, drain the pool
//
// The channels are built once here and handed to each stage by Arc; there is
// no process-wide state.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::assembler::{AssemblerStats, MoleculeAssembler, ProductSink};
use super::atom_source::{AtomSource, SourceStats};
use super::channel::{BoundedChannel, ChannelStats};
use super::scheduler::{RateScheduler, SchedulerStats};
use super::worker_pool::{BoundedWorkerPool, PoolShutdownReport, PoolStats};
use crate::config::FactoryConfig;
use crate::types::{Unit, UnitKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryState {
    Idle,
    Running,
    Stopped,
}

/// Complete assembly pipeline
pub struct MoleculeFactory {
    run_id: Uuid,
    config: FactoryConfig,

    channel_a: Arc<BoundedChannel<Unit>>,
    channel_b: Arc<BoundedChannel<Unit>>,
    source_a: AtomSource,
    source_b: AtomSource,
    assembler: Arc<MoleculeAssembler>,
    pool: Arc<BoundedWorkerPool>,
    scheduler: RateScheduler,

    shutdown: CancellationToken,
    state: FactoryState,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
}

impl MoleculeFactory {
    /// Build every stage. Fails on an invalid configuration; nothing is spawned yet.
    pub fn new(config: FactoryConfig, sink: Arc<dyn ProductSink>) -> Result<Self> {
        config.validate().context("refusing to build factory")?;

        let run_id = Uuid::new_v4();
        info!(
            "🏗️ FACTORY[{}]: Building pipeline (capacity {}, {} workers, tick {:?}, assembly {:?})",
            run_id,
            config.channel_capacity,
            config.worker_count(),
            config.tick_period(),
            config.assembly_duration()
        );

        let channel_a = Arc::new(BoundedChannel::new("A", config.channel_capacity)?);
        let channel_b = Arc::new(BoundedChannel::new("B", config.channel_capacity)?);

        let source_a = AtomSource::new(UnitKind::A, config.a_period(), channel_a.clone());
        let source_b = AtomSource::new(UnitKind::B, config.b_period(), channel_b.clone());

        let assembler = Arc::new(MoleculeAssembler::new(
            channel_a.clone(),
            channel_b.clone(),
            config.assembly_duration(),
            sink,
        ));
        let pool = Arc::new(BoundedWorkerPool::new(
            config.worker_count(),
            config.pool_queue_capacity,
        )?);
        let scheduler = RateScheduler::new(config.tick_period());

        Ok(Self {
            run_id,
            config,
            channel_a,
            channel_b,
            source_a,
            source_b,
            assembler,
            pool,
            scheduler,
            shutdown: CancellationToken::new(),
            state: FactoryState::Idle,
            started_at: None,
            stopped_at: None,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn state(&self) -> FactoryState {
        self.state
    }

    /// Start every stage. A stopped factory cannot be restarted.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            FactoryState::Running => return Ok(()),
            FactoryState::Stopped => {
                return Err(anyhow::anyhow!(
                    "factory {} already shut down; build a new one",
                    self.run_id
                ))
            }
            FactoryState::Idle => {}
        }

        info!("🚀 FACTORY[{}]: Starting pipeline...", self.run_id);

        let achievable = self.config.achievable_rate();
        if achievable < self.config.target_rate * 0.99 {
            warn!(
                "⚠️ FACTORY[{}]: Target {:.2}/s exceeds what sources and workers can sustain ({:.2}/s)",
                self.run_id, self.config.target_rate, achievable
            );
        }

        self.source_a
            .start(&self.shutdown)
            .context("starting source A")?;
        self.source_b
            .start(&self.shutdown)
            .context("starting source B")?;

        let queue: Arc<dyn super::scheduler::JobQueue> = self.pool.clone();
        self.scheduler
            .start(queue, &self.shutdown)
            .context("starting rate scheduler")?;

        self.pool
            .start(self.assembler.clone(), &self.shutdown)
            .context("starting worker pool")?;

        self.state = FactoryState::Running;
        self.started_at = Some(Instant::now());

        info!(
            "✅ FACTORY[{}]: Running (target {:.2} products/s)",
            self.run_id, self.config.target_rate
        );
        Ok(())
    }

    /// A token that triggers the same cancellation `shutdown()` uses
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Orderly stop. In-flight assemblies finish; blocked or queued ones resolve as cancelled.
    pub async fn shutdown(&mut self) -> Result<ShutdownSummary> {
        if self.state == FactoryState::Running {
            info!("🛑 FACTORY[{}]: Shutting down...", self.run_id);

            // 1. No new demand
            self.scheduler.stop().await?;

            // 2. No new units; blocked assemblers give up
            self.shutdown.cancel();
            self.source_a.stop().await?;
            self.source_b.stop().await?;

            // 3. Channels refuse further puts
            self.channel_a.close();
            self.channel_b.close();

            // 4. Pool drains its queue and waits for in-flight work
            self.pool.shutdown();
            let pool_report = self.pool.join(self.config.shutdown_grace()).await;

            self.state = FactoryState::Stopped;
            self.stopped_at = Some(Instant::now());

            let summary = ShutdownSummary {
                stats: self.get_stats(),
                pool: pool_report,
            };
            info!(
                "✅ FACTORY[{}]: Stopped after {:?}: {} products, {} jobs cancelled, {} units discarded, {} workers aborted",
                self.run_id,
                summary.stats.uptime,
                summary.stats.assembler.products_completed,
                summary.stats.pool.jobs_cancelled + summary.stats.pool.jobs_closed,
                summary.stats.assembler.units_discarded(),
                summary.pool.workers_aborted
            );
            return Ok(summary);
        }

        self.shutdown.cancel();
        self.state = FactoryState::Stopped;
        Ok(ShutdownSummary {
            stats: self.get_stats(),
            pool: PoolShutdownReport {
                workers_exited: 0,
                workers_aborted: 0,
                workers_panicked: 0,
            },
        })
    }

    /// Start, wait for `signal` (or an external cancel of the shutdown token), then shut down
    pub async fn run_until<F>(&mut self, signal: F) -> Result<ShutdownSummary>
    where
        F: Future<Output = ()>,
    {
        self.start()?;

        let token = self.shutdown.clone();
        tokio::select! {
            _ = signal => info!("📶 FACTORY[{}]: Shutdown signal received", self.run_id),
            _ = token.cancelled() => info!("📶 FACTORY[{}]: Shutdown requested", self.run_id),
        }

        self.shutdown().await
    }

    pub fn get_stats(&self) -> FactoryStats {
        let uptime = match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => stop.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };
        let assembler = self.assembler.get_stats();
        let realized_rate = if uptime.is_zero() {
            0.0
        } else {
            assembler.products_completed as f64 / uptime.as_secs_f64()
        };

        FactoryStats {
            run_id: self.run_id,
            state: self.state,
            uptime,
            realized_rate,
            channel_a: self.channel_a.get_stats(),
            channel_b: self.channel_b.get_stats(),
            source_a: self.source_a.get_stats(),
            source_b: self.source_b.get_stats(),
            scheduler: self.scheduler.get_stats(),
            pool: self.pool.get_stats(),
            assembler,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FactoryStats {
    pub run_id: Uuid,
    pub state: FactoryState,
    pub uptime: Duration,
    /// Products per second since start
    pub realized_rate: f64,
    pub channel_a: ChannelStats,
    pub channel_b: ChannelStats,
    pub source_a: SourceStats,
    pub source_b: SourceStats,
    pub scheduler: SchedulerStats,
    pub pool: PoolStats,
    pub assembler: AssemblerStats,
}

#[derive(Debug, Clone)]
pub struct ShutdownSummary {
    pub stats: FactoryStats,
    pub pool: PoolShutdownReport,
}
