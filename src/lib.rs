//! # icepeak - A Sharded In-Process Key-Value Cache
//!
//! icepeak is an in-memory key-value cache with per-key time-to-live (TTL)
//! expiration, meant to live inside another process. Keys are spread over
//! independently locked shards so concurrent readers and writers rarely
//! contend with each other.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Storage                                   │
//! │                                                                         │
//! │   get / set / remove ──> djb2(key) % shards ──┐                         │
//! │                                               ▼                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐                     │   │
//! │  │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │                     │   │
//! │  │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │                     │   │
//! │  │  └───▲────┘ └───▲────┘ └───▲────┘ └───▲────┘                     │   │
//! │  └──────┼──────────┼──────────┼──────────┼──────────────────────────┘   │
//! │         │          │          │          │                              │
//! │  ┌──────┴──────────┴──────────┴──────────┴──────────────────────────┐   │
//! │  │            Expiry tasks (one Tokio task per shard)               │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use icepeak::Storage;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> icepeak::Result<()> {
//! let shutdown = CancellationToken::new();
//! let storage = Storage::with_default_shards(shutdown.clone())?;
//!
//! storage.set("key1", 1, Some(Duration::from_millis(100)));
//! assert_eq!(storage.get("key1"), Some(1));
//!
//! // Stops every shard's expiry task
//! shutdown.cancel();
//! storage.join().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Highlights
//!
//! ### Thread Safety
//!
//! Every shard has its own `RwLock` guarding both its map and its key list.
//! Only one shard lock is held at a time, so operations on different shards
//! never wait on each other.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is read, we check if it's expired
//! 2. **Active**: Each shard's task samples random keys every second and
//!    keeps sampling while many of them turn out to be expired
//!
//! A reader never sees an expired value, and memory is reclaimed even for
//! keys that are never read again.
//!
//! ### Last Write Wins
//!
//! `set` always replaces both the value and the expiry. Setting a key
//! without a TTL makes it persistent, even if it previously had one.

pub mod storage;

// Re-export commonly used types for convenience
pub use storage::{ExpiryConfig, Result, Storage, StorageError, StorageStats};

/// Version of icepeak
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
