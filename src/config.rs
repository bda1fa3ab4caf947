use dotenvy::dotenv;
use eyre::Result;
use std::{env, str::FromStr, time::Duration};
use tracing::{info, warn};

use crate::cache::DEFAULT_CAPACITY;
use crate::rpc::DEFAULT_BATCH_SIZE;

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_http_url: String,
    pub rpc_batch_size: usize,
    pub confirmations: u64,
    pub port: u16,
    pub poll_interval: Duration,
    pub lookback: Duration,
    pub block_time_override: Option<Duration>,
    pub cache_capacity: usize,
    pub findings_history: usize,
    pub trace_native_transfers: bool,
    pub start_block: Option<u64>,
}

/// Chain-specific parameters the detector needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub chain_id: u64,
    pub average_block_time: Duration,
    pub native_symbol: &'static str,
}

impl NetworkProfile {
    pub fn for_chain(chain_id: u64) -> Self {
        let (block_ms, native_symbol) = match chain_id {
            1 => (12_000, "ETH"),
            10 => (2_000, "ETH"),
            56 => (3_000, "BNB"),
            137 => (2_000, "MATIC"),
            250 => (1_000, "FTM"),
            42161 => (250, "ETH"),
            43114 => (2_000, "AVAX"),
            _ => (12_000, "ETH"),
        };
        Self {
            chain_id,
            average_block_time: Duration::from_millis(block_ms),
            native_symbol,
        }
    }

    pub fn with_block_time(mut self, block_time: Option<Duration>) -> Self {
        if let Some(t) = block_time.filter(|t| !t.is_zero()) {
            self.average_block_time = t;
        }
        self
    }

    /// Number of blocks spanning `window`, at least one
    pub fn blocks_in(&self, window: Duration) -> u64 {
        let block_ms = self.average_block_time.as_millis().max(1);
        let blocks = window.as_millis() / block_ms;
        u64::try_from(blocks).unwrap_or(u64::MAX).max(1)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|raw| raw.trim().parse().ok())
}

pub fn load() -> Result<Config> {
    dotenv().ok();

    // RPC URL (fallback to polygon-rpc.com)
    let rpc_http_url = env::var("RPC_HTTP_URL")
        .or_else(|_| env::var("ETH_RPC"))
        .unwrap_or_else(|_| "https://polygon-rpc.com".to_string());

    let cfg = Config {
        rpc_http_url,
        rpc_batch_size: env_or("RPC_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
        confirmations: env_or("CONFIRMATIONS", 2),
        port: env_or("PORT", 8080),
        poll_interval: Duration::from_millis(env_or("POLL_INTERVAL_MS", 2_000)),
        lookback: Duration::from_secs(env_or("LOOKBACK_SECS", 600)),
        block_time_override: env_opt::<u64>("AVERAGE_BLOCK_TIME_MS").map(Duration::from_millis),
        cache_capacity: env_or("CACHE_CAPACITY", DEFAULT_CAPACITY),
        findings_history: env_or("FINDINGS_HISTORY", 1_000),
        trace_native_transfers: env_or("TRACE_NATIVE_TRANSFERS", true),
        start_block: env_opt("START_BLOCK"),
    };

    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}
