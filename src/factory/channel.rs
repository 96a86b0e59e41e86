// Bounded unit channel with blocking backpressure
//
// A fixed-capacity FIFO shared by one producer and any number of consumers:
// - put() suspends while the channel is full
// - take() suspends while the channel is empty
// - close() fails pending/future puts and lets takers drain what is left
//
// The count invariant 0 <= len <= capacity is held under the state mutex,
// and wakeups go through two Notify handles so nothing spins.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::info;

use super::error::{FactoryError, Result};
use crate::factory_debug;

/// Rejected non-blocking put; the item is handed back
#[derive(Debug, PartialEq, Eq)]
pub enum TryPutError<T> {
    Full(T),
    Closed(T),
}

struct ChannelState<T> {
    items: VecDeque<T>,
    closed: bool,
    total_put: u64,
    total_taken: u64,
    blocked_puts: u64,
    blocked_takes: u64,
}

pub struct BoundedChannel<T> {
    name: String,
    capacity: usize,
    state: Mutex<ChannelState<T>>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> BoundedChannel<T> {
    /// Create a channel holding at most `capacity` items
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self> {
        let name = name.into();
        if capacity == 0 {
            return Err(FactoryError::InvalidConfig(format!(
                "channel '{}' capacity must be positive",
                name
            )));
        }

        info!(
            "📦 CHANNEL[{}]: Created bounded channel (capacity: {})",
            name, capacity
        );

        Ok(Self {
            name,
            capacity,
            state: Mutex::new(ChannelState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                total_put: 0,
                total_taken: 0,
                blocked_puts: 0,
                blocked_takes: 0,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, ChannelState<T>> {
        // No critical section can panic half-way, so poisoning is ignored
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert without waiting
    pub fn try_put(&self, item: T) -> std::result::Result<(), TryPutError<T>> {
        {
            let mut state = self.lock_state();
            if state.closed {
                return Err(TryPutError::Closed(item));
            }
            if state.items.len() >= self.capacity {
                return Err(TryPutError::Full(item));
            }
            state.items.push_back(item);
            state.total_put += 1;
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove without waiting. `Ok(None)` means empty but still open.
    pub fn try_take(&self) -> Result<Option<T>> {
        let (item, more_left) = {
            let mut state = self.lock_state();
            match state.items.pop_front() {
                Some(item) => {
                    state.total_taken += 1;
                    (item, !state.items.is_empty())
                }
                None if state.closed => return Err(FactoryError::Closed),
                None => return Ok(None),
            }
        };

        self.not_full.notify_one();
        if more_left {
            // Pass the wakeup on in case the woken taker was not the one that got here
            self.not_empty.notify_one();
        }
        Ok(Some(item))
    }

    /// Insert, suspending while the channel is full.
    ///
    /// Cancel safe: dropping the future before it resolves leaves the item out of the channel.
    pub async fn put(&self, mut item: T) -> Result<()> {
        let mut waited = false;

        loop {
            // Register interest before checking so a take between check and await is not missed
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_put(item) {
                Ok(()) => return Ok(()),
                Err(TryPutError::Closed(_)) => return Err(FactoryError::Closed),
                Err(TryPutError::Full(returned)) => {
                    item = returned;
                    if !waited {
                        waited = true;
                        self.lock_state().blocked_puts += 1;
                        factory_debug!("⏸️ CHANNEL[{}]: put blocked (full)", self.name);
                    }
                    notified.await;
                }
            }
        }
    }

    /// Remove, suspending while the channel is empty.
    ///
    /// Fails with `Closed` once the channel is closed and drained. Cancel safe.
    pub async fn take(&self) -> Result<T> {
        let mut waited = false;

        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_take()? {
                return Ok(item);
            }

            if !waited {
                waited = true;
                self.lock_state().blocked_takes += 1;
                factory_debug!("⏸️ CHANNEL[{}]: take blocked (empty)", self.name);
            }
            notified.await;
        }
    }

    /// Stop accepting items. Remaining items can still be taken.
    pub fn close(&self) {
        let remaining = {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.items.len()
        };

        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();

        info!(
            "🔒 CHANNEL[{}]: Closed ({} items left to drain)",
            self.name, remaining
        );
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock_state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Snapshot of occupancy and lifetime counters
    pub fn get_stats(&self) -> ChannelStats {
        let state = self.lock_state();
        ChannelStats {
            name: self.name.clone(),
            capacity: self.capacity,
            len: state.items.len(),
            total_put: state.total_put,
            total_taken: state.total_taken,
            blocked_puts: state.blocked_puts,
            blocked_takes: state.blocked_takes,
            closed: state.closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStats {
    pub name: String,
    pub capacity: usize,
    pub len: usize,
    pub total_put: u64,
    pub total_taken: u64,
    pub blocked_puts: u64,
    pub blocked_takes: u64,
    pub closed: bool,
}
