//! Active Expiry
//!
//! Every shard runs its own background task that periodically samples random
//! keys and removes the expired ones. This is called "active expiry" as opposed
//! to "lazy expiry" (which happens on access).
//!
//! ## Why Do We Need This?
//!
//! Lazy expiry (checking on access) is efficient but has a problem:
//! If a key expires and is never accessed again, it will stay in memory forever!
//!
//! ## Design
//!
//! Scanning a whole hot shard every tick is too expensive, so each tick:
//! 1. Draws `sample_size` random keys (fewer if the shard is smaller)
//! 2. Removes the ones that have expired
//! 3. If at least `threshold` of the drawn keys were expired, draws again
//!    right away, up to `max_rounds` draws per tick
//!
//! The work done is therefore proportional to how many keys are actually
//! expiring. Removal of any single key is best-effort, not guaranteed.
//!
//! The task sleeps without holding any lock and stops as soon as its
//! cancellation token fires.

use crate::storage::error::{Result, StorageError};
use crate::storage::shard::Shard;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Configuration for the per-shard expiry tasks.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Time between sampling cycles (default: 1s)
    pub period: Duration,

    /// Keys drawn per sampling round (default: 20)
    pub sample_size: usize,

    /// If this fraction of a round's keys were expired, sample again (default: 0.2)
    pub threshold: f64,

    /// Upper bound on sampling rounds within one cycle (default: 16)
    pub max_rounds: usize,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            sample_size: 20,
            threshold: 0.2,
            max_rounds: 16,
        }
    }
}

impl ExpiryConfig {
    /// Checks that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(StorageError::InvalidExpiryConfig("period must be non-zero"));
        }
        if self.sample_size == 0 {
            return Err(StorageError::InvalidExpiryConfig(
                "sample size must be at least 1",
            ));
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(StorageError::InvalidExpiryConfig(
                "threshold must be in (0, 1]",
            ));
        }
        if self.max_rounds == 0 {
            return Err(StorageError::InvalidExpiryConfig(
                "max rounds must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Summary of one expiry cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Sampling rounds performed
    pub rounds: usize,
    /// Keys drawn across all rounds
    pub sampled: usize,
    /// Keys removed across all rounds
    pub expired: usize,
}

/// Runs one expiry cycle against `shard`.
pub(crate) fn run_cycle<V: Clone>(shard: &Shard<V>, config: &ExpiryConfig) -> CycleReport {
    let mut report = CycleReport::default();

    loop {
        let outcome = shard.expire_sample(config.sample_size);
        if outcome.sampled == 0 {
            break;
        }

        report.rounds += 1;
        report.sampled += outcome.sampled;
        report.expired += outcome.expired;

        let rate = outcome.expired as f64 / outcome.sampled as f64;
        trace!(
            round = report.rounds,
            sampled = outcome.sampled,
            expired = outcome.expired,
            "Expiry sampling round"
        );

        if rate < config.threshold {
            break;
        }

        if report.rounds >= config.max_rounds {
            warn!(
                rounds = report.rounds,
                expired = report.expired,
                "Expiry round limit reached, deferring to next tick"
            );
            break;
        }
    }

    report
}

/// Spawns the expiry task for one shard on `handle`.
pub(crate) fn spawn<V>(
    handle: &Handle,
    id: usize,
    shard: Arc<Shard<V>>,
    config: ExpiryConfig,
    token: CancellationToken,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    handle.spawn(expiry_loop(id, shard, config, token))
}

/// The per-shard expiry loop.
async fn expiry_loop<V>(
    id: usize,
    shard: Arc<Shard<V>>,
    config: ExpiryConfig,
    token: CancellationToken,
) where
    V: Clone + Send + Sync + 'static,
{
    loop {
        // Wait for the period or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(config.period) => {}
            _ = token.cancelled() => {
                debug!(shard = id, "Expiry task received shutdown signal");
                return;
            }
        }

        let report = run_cycle(&shard, &config);

        if report.expired > 0 {
            debug!(
                shard = id,
                expired = report.expired,
                rounds = report.rounds,
                keys_remaining = shard.len(),
                "Expired keys cleaned up"
            );
        }
    }
}
