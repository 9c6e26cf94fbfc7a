//! icepeak demo
//!
//! Builds a storage, stores a value with a short TTL and reads it back
//! before and after the TTL elapses.

use anyhow::Context;
use bytes::Bytes;
use icepeak::Storage;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Demo configuration
struct Config {
    /// Number of shards (None = one per logical processor)
    shards: Option<usize>,
    /// TTL of the demo key
    ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shards: None,
            ttl: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--shards" | "-s" => {
                    if i + 1 < args.len() {
                        config.shards = Some(args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid shard count");
                            std::process::exit(1);
                        }));
                        i += 2;
                    } else {
                        eprintln!("Error: --shards requires a value");
                        std::process::exit(1);
                    }
                }
                "--ttl-ms" | "-t" => {
                    if i + 1 < args.len() {
                        let ms: u64 = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid TTL");
                            std::process::exit(1);
                        });
                        config.ttl = Duration::from_millis(ms);
                        i += 2;
                    } else {
                        eprintln!("Error: --ttl-ms requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("icepeak version {}", icepeak::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }
}

fn print_help() {
    println!(
        r#"
icepeak - A Sharded In-Process Key-Value Cache (demo)

USAGE:
    icepeak [OPTIONS]

OPTIONS:
    -s, --shards <N>     Number of shards (default: logical processors)
    -t, --ttl-ms <MS>    TTL of the demo key in milliseconds (default: 100)
    -v, --version        Print version information
    -h, --help           Print this help message

Set RUST_LOG=debug to watch the expiry tasks work.
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let shutdown = CancellationToken::new();
    let storage: Storage<Bytes> = match config.shards {
        Some(shards) => Storage::new(shards, shutdown.clone()),
        None => Storage::with_default_shards(shutdown.clone()),
    }
    .context("failed to create storage")?;
    info!(shards = storage.shard_count(), "Storage ready");

    storage.set("key1", Bytes::from("1"), Some(config.ttl));
    println!("{:?}", storage.get("key1"));

    tokio::time::sleep(config.ttl + Duration::from_millis(50)).await;
    println!("{:?}", storage.get("key1"));

    shutdown.cancel();
    storage.join().await.context("shard task failed")?;

    info!(stats = ?storage.stats(), "Demo finished");
    Ok(())
}
