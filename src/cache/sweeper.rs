//! Periodic evidence-cache sweep.
//!
//! Runs as a background task on a fixed interval. Unlike an unmanaged loop,
//! the task is owned by a [`SweepHandle`]: stopping or dropping the handle
//! ends it.

use log::{error, info};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use super::evidence_cache::EvidenceCache;
use crate::types::now_ms;

/// Statistics from one sweep.
#[derive(Debug, Clone)]
pub struct SweepStats {
    pub entries_removed: usize,
    pub entries_remaining: usize,
    pub duration_ms: u64,
    pub timestamp: u64,
}

pub struct EvidenceSweeper {
    cache: Arc<EvidenceCache>,
    interval: Duration,
    /// Timestamp of the last completed sweep
    last_sweep_at: Arc<RwLock<u64>>,
}

impl EvidenceSweeper {
    pub fn new(cache: Arc<EvidenceCache>) -> Self {
        let interval = Duration::from_secs(cache.sweep_config().interval_secs);
        Self::with_interval(cache, interval)
    }

    pub fn with_interval(cache: Arc<EvidenceCache>, interval: Duration) -> Self {
        Self {
            cache,
            interval,
            last_sweep_at: Arc::new(RwLock::new(now_ms())),
        }
    }

    /// Milliseconds since UNIX epoch of the last sweep, or creation time if
    /// none has run.
    pub fn last_sweep(&self) -> u64 {
        *self.last_sweep_at.read()
    }

    /// Spawn the background task. Returns `None` when sweeping is disabled.
    /// Must be called from within a tokio runtime.
    pub fn start(self: Arc<Self>) -> Option<SweepHandle> {
        if !self.cache.sweep_config().enabled {
            info!("Evidence cache sweep is disabled, skipping");
            return None;
        }
        if self.interval.is_zero() {
            error!("Evidence cache sweep interval is zero, not starting");
            return None;
        }

        info!(
            "Starting evidence cache sweep with {}-second interval",
            self.interval.as_secs()
        );

        let token = CancellationToken::new();
        let child = token.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep_now();
                    }
                }
            }
            info!("Evidence cache sweep stopped");
        });

        Some(SweepHandle {
            token,
            task: Some(task),
        })
    }

    /// Run one sweep immediately.
    pub fn sweep_now(&self) -> SweepStats {
        let start = now_ms();
        let removed = self.cache.sweep();
        let finished = now_ms();
        *self.last_sweep_at.write() = finished;

        let stats = SweepStats {
            entries_removed: removed,
            entries_remaining: self.cache.len(),
            duration_ms: finished.saturating_sub(start),
            timestamp: finished,
        };
        info!(
            "Evidence cache sweep completed: {} removed, {} remaining in {}ms",
            stats.entries_removed, stats.entries_remaining, stats.duration_ms
        );
        stats
    }
}

/// Owns a running sweep task.
pub struct SweepHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Signal the task and wait for it to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Evidence cache sweep task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
