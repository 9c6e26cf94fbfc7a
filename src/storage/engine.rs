//! Sharded Storage Engine
//!
//! This module implements [`Storage`], the public face of the cache. It owns a
//! fixed set of shards and routes every key to exactly one of them.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Instead of one big lock, each shard has its own `RwLock`.
//! 2. **Lazy + Active Expiry**: Keys are checked on access, and each shard runs
//!    a background task sampling its keys for expired entries.
//! 3. **Fixed Routing**: The shard count never changes, so `djb2(key) % shards`
//!    always picks the same shard for a key.
//! 4. **Owned Lifecycle**: Shard tasks hang off a child of the caller's
//!    cancellation token and can be joined at shutdown.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Storage                              │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  │ keys[]  │ │ keys[]  │ │ keys[]  │ │ keys[]  │           │
//! │  └────▲────┘ └────▲────┘ └────▲────┘ └────▲────┘           │
//! │       │           │           │           │                 │
//! │   expiry task  expiry task expiry task expiry task          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only one shard lock is ever held at a time, so there is no lock ordering
//! between shards.

use crate::storage::error::{Result, StorageError};
use crate::storage::expiry::{self, ExpiryConfig};
use crate::storage::hash::shard_index;
use crate::storage::shard::Shard;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A sharded in-memory cache with per-key TTL.
///
/// Values are returned by clone, so large values are best stored behind an
/// `Arc` or as `bytes::Bytes`.
///
/// # Thread Safety
///
/// All operations take `&self`; share the storage across threads or tasks
/// with an `Arc`.
///
/// # Example
///
/// ```
/// use icepeak::Storage;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> icepeak::Result<()> {
/// let storage = Storage::new(4, CancellationToken::new())?;
///
/// storage.set("name", "icepeak".to_string(), None);
/// assert_eq!(storage.get("name"), Some("icepeak".to_string()));
///
/// storage.set("session", "abc123".to_string(), Some(Duration::from_secs(60)));
/// storage.remove("session");
/// assert_eq!(storage.get("session"), None);
///
/// storage.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct Storage<V> {
    /// Fixed set of shards; never resized after construction
    shards: Box<[Arc<Shard<V>>]>,

    /// Expiry task of each shard, drained by `join`
    tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Child of the caller's token, cancelled on shutdown or drop
    token: CancellationToken,

    /// Statistics: GET operations that found a value
    hit_count: AtomicU64,

    /// Statistics: GET operations that found nothing
    miss_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total REMOVE operations
    del_count: AtomicU64,
}

impl<V> std::fmt::Debug for Storage<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("shards", &self.shards.len())
            .field("hit_count", &self.hit_count.load(Ordering::Relaxed))
            .field("miss_count", &self.miss_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl<V> Storage<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a storage with `shard_count` shards and default expiry settings.
    ///
    /// Must be called from within a Tokio runtime, since every shard starts
    /// its expiry task immediately. The tasks stop when `token` (or the
    /// storage itself) is cancelled.
    ///
    /// # Errors
    ///
    /// [`StorageError::InvalidShardCount`] if `shard_count` is zero,
    /// [`StorageError::NoRuntime`] outside a Tokio runtime.
    pub fn new(shard_count: usize, token: CancellationToken) -> Result<Self> {
        Self::with_config(shard_count, ExpiryConfig::default(), token)
    }

    /// Creates a storage with one shard per available logical processor.
    pub fn with_default_shards(token: CancellationToken) -> Result<Self> {
        let shard_count = std::thread::available_parallelism().map_or(1, usize::from);
        Self::new(shard_count, token)
    }

    /// Creates a storage with custom expiry settings.
    pub fn with_config(
        shard_count: usize,
        config: ExpiryConfig,
        token: CancellationToken,
    ) -> Result<Self> {
        if shard_count == 0 {
            return Err(StorageError::InvalidShardCount);
        }
        config.validate()?;
        let handle = Handle::try_current().map_err(|_| StorageError::NoRuntime)?;

        let token = token.child_token();
        let shards: Box<[Arc<Shard<V>>]> =
            (0..shard_count).map(|_| Arc::new(Shard::new())).collect();

        let tasks = shards
            .iter()
            .enumerate()
            .map(|(id, shard)| {
                expiry::spawn(
                    &handle,
                    id,
                    Arc::clone(shard),
                    config.clone(),
                    token.clone(),
                )
            })
            .collect();

        info!(
            shards = shard_count,
            period_ms = config.period.as_millis() as u64,
            "Storage initialized"
        );

        Ok(Self {
            shards,
            tasks: Mutex::new(tasks),
            token,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
        })
    }

    /// Gets the shard for a given key.
    #[inline]
    fn shard(&self, key: &str) -> &Shard<V> {
        &self.shards[shard_index(key, self.shards.len())]
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key was never set, was removed, or has expired.
    /// An expired entry found here is removed on the spot.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.shard(key).get(key);

        if value.is_some() {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
        }

        value
    }

    /// Sets a key-value pair, replacing any previous value.
    ///
    /// The expiry is always replaced as well: `Some(ttl)` makes the key
    /// expire `ttl` from now, and `None` makes it persistent even if the
    /// previous value had a TTL. The last write wins, policy included.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let key = key.into();
        self.shard(&key).set(key, value, ttl);
    }

    /// Removes a key.
    ///
    /// Returns the removed value if the key was present and live. Removing a
    /// missing key does nothing.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.del_count.fetch_add(1, Ordering::Relaxed);
        self.shard(key).remove(key)
    }

    /// Checks if a key exists (and is not expired).
    pub fn contains(&self, key: &str) -> bool {
        self.shard(key).contains(key)
    }

    /// Returns the number of stored entries across all shards.
    ///
    /// Expired entries that neither a read nor the expiry task has reclaimed
    /// yet are included.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns the number of stored entries in each shard, in shard order.
    pub fn shard_lens(&self) -> Vec<usize> {
        self.shards.iter().map(|shard| shard.len()).collect()
    }

    /// Clears all data from every shard.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.clear();
        }
    }

    /// Scans every shard and removes all expired entries.
    ///
    /// Unlike the sampling tasks this visits every key, so it is meant for
    /// occasional manual use.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were cleaned up.
    pub fn purge_expired(&self) -> u64 {
        self.shards.iter().map(|shard| shard.purge_expired()).sum()
    }

    /// Returns storage statistics.
    pub fn stats(&self) -> StorageStats {
        let hits = self.hit_count.load(Ordering::Relaxed);
        let misses = self.miss_count.load(Ordering::Relaxed);

        StorageStats {
            keys: self.len() as u64,
            shards: self.shards.len(),
            get_ops: hits + misses,
            hits,
            misses,
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            lazy_expired: self.shards.iter().map(|s| s.lazy_expired()).sum(),
            active_expired: self.shards.iter().map(|s| s.active_expired()).sum(),
        }
    }
}

impl<V> Storage<V> {
    /// Stops every shard expiry task and waits for them to finish.
    ///
    /// The caller's token is left untouched. Foreground operations keep
    /// working afterwards; expired keys are then only reclaimed lazily.
    pub async fn shutdown(&self) -> Result<()> {
        self.token.cancel();
        self.join().await?;
        info!(shards = self.shards.len(), "Storage shut down");
        Ok(())
    }

    /// Waits for every shard expiry task to finish.
    ///
    /// Returns once the caller's token (or [`shutdown`](Self::shutdown)) has
    /// stopped them. Calling it again returns immediately.
    pub async fn join(&self) -> Result<()> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.await?;
        }
        Ok(())
    }
}

impl<V> Drop for Storage<V> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Storage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of stored entries, including unreclaimed expired ones
    pub keys: u64,
    /// Number of shards
    pub shards: usize,
    /// Total GET operations
    pub get_ops: u64,
    /// GET operations that returned a value
    pub hits: u64,
    /// GET operations that returned nothing
    pub misses: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total REMOVE operations
    pub del_ops: u64,
    /// Expired entries removed by reads
    pub lazy_expired: u64,
    /// Expired entries removed by the expiry tasks or a purge
    pub active_expired: u64,
}
