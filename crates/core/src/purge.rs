// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic purge scheduling (spec.md §4.9).
//!
//! Each purgeable subsystem (results spool, task cache, download cache, ...)
//! registers its own TTL. The loop computes a shared sleep interval —
//! `min(60 min, gcd(TTLs in minutes))` — wakes on that cadence, and invokes
//! `purge` on every registered subsystem, passing it a snapshot of
//! transactions still owned by a live worker so purge never deletes a spool
//! entry out from under its worker.
//!
//! With no registered purgeables the interval defaults to 60 minutes.

use async_trait::async_trait;
use std::time::Duration;

/// A subsystem with its own TTL-driven cleanup (spool, task cache, ...).
#[async_trait]
pub trait Purgeable: Send + Sync {
    /// A label used only for logging.
    fn name(&self) -> &str;

    /// This subsystem's own retention TTL.
    fn ttl(&self) -> Duration;

    /// Remove entries older than `ttl`, skipping anything named in
    /// `ongoing_transactions`. Returns the number of entries removed.
    async fn purge(&self, ttl: Duration, ongoing_transactions: &[String]) -> usize;
}

const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);
const MAX_INTERVAL_MINUTES: u64 = 60;

/// `min(60 min, gcd(all registered TTLs in minutes))`, clamped to at least
/// one minute so a misconfigured zero-TTL purgeable can't spin the loop. With
/// no purgeables registered, defaults to the 60 minute cap.
pub fn sleep_interval(ttls: &[Duration]) -> Duration {
    let minutes: Vec<u64> = ttls.iter().map(|d| (d.as_secs() / 60).max(1)).collect();
    let combined = minutes.into_iter().fold(0u64, gcd);
    let minutes = if combined == 0 { MAX_INTERVAL_MINUTES } else { combined };
    Duration::from_secs(minutes.max(1) * 60).min(MAX_INTERVAL)
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Drives the periodic sweep over a fixed set of purgeables, reading the
/// ongoing-transaction snapshot from a caller-supplied closure (backed by
/// `ThreadContainer::names` in the agent binary).
pub struct PurgeLoop<F> {
    purgeables: Vec<Box<dyn Purgeable>>,
    interval: Duration,
    ongoing: F,
}

impl<F> PurgeLoop<F>
where
    F: Fn() -> Vec<String> + Send + Sync + 'static,
{
    pub fn new(purgeables: Vec<Box<dyn Purgeable>>, ongoing: F) -> Self {
        let ttls: Vec<Duration> = purgeables.iter().map(|p| p.ttl()).collect();
        let interval = sleep_interval(&ttls);
        Self { purgeables, interval, ongoing }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep across all registered purgeables.
    pub async fn sweep_once(&self) {
        let ongoing = (self.ongoing)();
        for purgeable in &self.purgeables {
            let removed = purgeable.purge(purgeable.ttl(), &ongoing).await;
            if removed > 0 {
                tracing::info!(purgeable = purgeable.name(), removed, "purge swept entries");
            }
        }
    }

    /// Run forever, sleeping `interval` between sweeps. Intended to be spawned
    /// as the dedicated purge task (spec.md §5 scheduling model).
    pub async fn run(self) {
        loop {
            tokio::time::sleep(self.interval).await;
            self.sweep_once().await;
        }
    }
}

#[cfg(test)]
#[path = "purge_tests.rs"]
mod tests;
