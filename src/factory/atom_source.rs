// Stage 1: Atom Sources
//
// Each source owns one unit kind and one channel. On every period it puts a
// single unit. A full channel suspends the put, which throttles the source
// instead of discarding units. Shutdown is checked between ticks and also
// interrupts a blocked put.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::channel::{BoundedChannel, TryPutError};
use super::error::FactoryError;
use super::pacer::Pacer;
use crate::factory_debug;
use crate::types::{Unit, UnitKind};

const STOP_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Default)]
struct SourceCounters {
    produced: AtomicU64,
    blocked_puts: AtomicU64,
    blocked: AtomicBool,
}

/// Periodic producer of one unit kind
pub struct AtomSource {
    pub kind: UnitKind,
    period: Duration,
    channel: Arc<BoundedChannel<Unit>>,

    counters: Arc<SourceCounters>,

    // Worker task handle and its private cancellation
    worker_handle: Option<tokio::task::JoinHandle<()>>,
    stop_token: Option<CancellationToken>,
}

impl AtomSource {
    pub fn new(kind: UnitKind, period: Duration, channel: Arc<BoundedChannel<Unit>>) -> Self {
        info!(
            "⚛️ ATOM_SOURCE[{}]: Creating source (period: {:?}, channel: '{}')",
            kind,
            period,
            channel.name()
        );

        Self {
            kind,
            period,
            channel,
            counters: Arc::new(SourceCounters::default()),
            worker_handle: None,
            stop_token: None,
        }
    }

    /// Spawn the production loop. It stops when `shutdown` or `stop()` cancels it.
    pub fn start(&mut self, shutdown: &CancellationToken) -> Result<()> {
        if self.worker_handle.is_some() {
            return Ok(());
        }

        let token = shutdown.child_token();
        let kind = self.kind;
        let period = self.period;
        let channel = self.channel.clone();
        let counters = self.counters.clone();
        let loop_token = token.clone();

        let worker_handle = tokio::spawn(async move {
            run_source(kind, period, channel, counters, loop_token).await;
        });

        self.worker_handle = Some(worker_handle);
        self.stop_token = Some(token);
        info!("✅ ATOM_SOURCE[{}]: Started production loop", self.kind);

        Ok(())
    }

    /// Cancel this source and wait for its loop to exit
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.stop_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.worker_handle.take() {
            let abort = handle.abort_handle();
            match tokio::time::timeout(STOP_TIMEOUT, handle).await {
                Ok(_) => info!("✅ ATOM_SOURCE[{}]: shut down gracefully", self.kind),
                Err(_) => {
                    abort.abort();
                    warn!(
                        "⚠️ ATOM_SOURCE[{}]: force-terminated after timeout",
                        self.kind
                    );
                }
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

    pub fn get_stats(&self) -> SourceStats {
        SourceStats {
            kind: self.kind,
            period: self.period,
            units_produced: self.counters.produced.load(Ordering::Acquire),
            blocked_puts: self.counters.blocked_puts.load(Ordering::Acquire),
            is_blocked: self.counters.blocked.load(Ordering::Acquire),
            is_running: self.is_running(),
        }
    }
}

async fn run_source(
    kind: UnitKind,
    period: Duration,
    channel: Arc<BoundedChannel<Unit>>,
    counters: Arc<SourceCounters>,
    token: CancellationToken,
) {
    let mut pacer = Pacer::fixed_delay(period);

    info!(
        "🚀 ATOM_SOURCE[{}]: Producing one unit every {:?}",
        kind, period
    );

    let exit = loop {
        if pacer.tick_or_cancel(&token).await.is_none() {
            break FactoryError::Cancelled;
        }

        if let Err(e) = put_unit(kind, &channel, &counters, &token).await {
            break e;
        }

        let produced = counters.produced.fetch_add(1, Ordering::AcqRel) + 1;
        factory_debug!("⚛️ ATOM_SOURCE[{}]: unit #{} queued", kind, produced);

        // Rate-limited logging
        if produced <= 3 || produced % 1000 == 0 {
            info!(
                "⚛️ ATOM_SOURCE[{}]: {} units produced (channel at {}/{})",
                kind,
                produced,
                channel.len(),
                channel.capacity()
            );
        }
    };

    info!(
        "🛑 ATOM_SOURCE[{}]: Production loop exiting ({}, produced {} units)",
        kind,
        exit,
        counters.produced.load(Ordering::Acquire)
    );
}

async fn put_unit(
    kind: UnitKind,
    channel: &BoundedChannel<Unit>,
    counters: &SourceCounters,
    token: &CancellationToken,
) -> Result<(), FactoryError> {
    let unit = match channel.try_put(Unit::new(kind)) {
        Ok(()) => return Ok(()),
        Err(TryPutError::Closed(_)) => return Err(FactoryError::Closed),
        Err(TryPutError::Full(unit)) => unit,
    };

    counters.blocked.store(true, Ordering::Release);
    let blocked = counters.blocked_puts.fetch_add(1, Ordering::AcqRel) + 1;
    if blocked <= 3 || blocked % 100 == 0 {
        warn!(
            "⏸️ ATOM_SOURCE[{}]: Channel '{}' full, put suspended (backpressure #{})",
            kind,
            channel.name(),
            blocked
        );
    }

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => Err(FactoryError::Cancelled),
        put = channel.put(unit) => put,
    };
    counters.blocked.store(false, Ordering::Release);
    result
}

#[derive(Debug, Clone)]
pub struct SourceStats {
    pub kind: UnitKind,
    pub period: Duration,
    pub units_produced: u64,
    pub blocked_puts: u64,
    pub is_blocked: bool,
    pub is_running: bool,
}
