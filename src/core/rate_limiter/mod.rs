//! Sliding-window request rate limiting
//!
//! One 60-second timestamp window shared by every concurrent caller. The
//! window lives behind [`WindowStore`] so a multi-process deployment can
//! substitute a shared atomic store without touching the limiter; the
//! default in-memory store covers the single-process case. Time comes from
//! an injectable [`Clock`] so tests run against tokio's paused clock.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

pub const WINDOW_SECONDS: u64 = 60;
pub const DEFAULT_LIMIT_PER_MINUTE: usize = 60;

/// Unix-seconds time source
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_unix(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Storage for the request-timestamp window.
///
/// The limiter serializes its read-filter-append cycles with its own mutex,
/// so a store only needs individual reads and writes to be atomic.
#[async_trait]
pub trait WindowStore: Send + Sync + std::fmt::Debug {
    async fn read(&self) -> Vec<u64>;
    async fn write(&self, timestamps: Vec<u64>);
}

#[derive(Debug, Default)]
pub struct InMemoryWindowStore {
    timestamps: Mutex<Vec<u64>>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    async fn read(&self) -> Vec<u64> {
        self.timestamps.lock().clone()
    }

    async fn write(&self, timestamps: Vec<u64>) {
        *self.timestamps.lock() = timestamps;
    }
}

#[derive(Debug)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    limit: usize,
    /// Serializes read-filter-append cycles across concurrent callers
    update_lock: AsyncMutex<()>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize) -> Self {
        Self::with_parts(
            Arc::new(InMemoryWindowStore::new()),
            Arc::new(SystemClock),
            limit,
        )
    }

    pub fn with_parts(
        store: Arc<dyn WindowStore>,
        clock: Arc<dyn Clock>,
        limit: usize,
    ) -> Self {
        Self {
            store,
            clock,
            limit,
            update_lock: AsyncMutex::new(()),
        }
    }

    /// Block until a request slot is free, then claim it.
    ///
    /// A limit below one disables limiting. Cancellation-safe: dropping the
    /// future before it resolves claims nothing.
    pub async fn acquire(&self) {
        if self.limit < 1 {
            return;
        }

        loop {
            let wait_seconds = {
                let _guard = self.update_lock.lock().await;
                let now = self.clock.now_unix();
                let mut window: Vec<u64> = self
                    .store
                    .read()
                    .await
                    .into_iter()
                    .filter(|&t| t + WINDOW_SECONDS > now)
                    .collect();

                if window.len() < self.limit {
                    window.push(now);
                    self.store.write(window).await;
                    return;
                }

                let oldest = window.iter().copied().min().unwrap_or(now);
                // Minimum 1s so clock skew cannot spin this loop hot
                (oldest + WINDOW_SECONDS).saturating_sub(now).max(1)
            };

            tracing::debug!(wait_seconds, "rate window full, waiting for slot");
            tokio::time::sleep(Duration::from_secs(wait_seconds)).await;
        }
    }

    /// Requests currently counted against the window
    pub async fn in_flight(&self) -> usize {
        let now = self.clock.now_unix();
        self.store
            .read()
            .await
            .into_iter()
            .filter(|&t| t + WINDOW_SECONDS > now)
            .count()
    }
}
