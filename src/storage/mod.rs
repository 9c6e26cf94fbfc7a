//! Storage Engine Module
//!
//! This module provides the core storage functionality for icepeak.
//! It includes a thread-safe, sharded key-value store with TTL support
//! and one background expiry task per shard.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Storage                              │
//! │            shard = djb2(key) % shard_count                  │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...N     │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └────▲────┘ └────▲────┘ └────▲────┘ └────▲────┘           │
//! └───────┼───────────┼───────────┼───────────┼─────────────────┘
//!         │           │           │           │
//!   ┌─────┴───────────┴───────────┴───────────┴─────┐
//!   │   per-shard expiry tasks (random sampling)    │
//!   └───────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Sharded Storage**: independent shards reduce lock contention
//! - **RwLock**: Multiple concurrent readers, exclusive writers
//! - **TTL Support**: Keys can have time-to-live expiry
//! - **Lazy Expiry**: Expired keys are cleaned on access
//! - **Active Expiry**: Background sampling cleans orphaned expired keys
//!
//! ## Example
//!
//! ```
//! use icepeak::storage::{ExpiryConfig, Storage};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> icepeak::Result<()> {
//! let config = ExpiryConfig {
//!     period: Duration::from_millis(100),
//!     ..Default::default()
//! };
//! let storage = Storage::with_config(8, config, CancellationToken::new())?;
//!
//! storage.set("user:1", 42u64, Some(Duration::from_secs(3600)));
//! assert_eq!(storage.get("user:1"), Some(42));
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod expiry;
pub mod hash;
mod shard;

// Re-export commonly used types
pub use engine::{Storage, StorageStats};
pub use error::{Result, StorageError};
pub use expiry::{CycleReport, ExpiryConfig};
pub use hash::{djb2, shard_index};
