use async_trait::async_trait;
use eyre::Result;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::cache::ClassificationCache;
use crate::config::{Config, NetworkProfile};
use crate::detector::DrainDetector;
use crate::error::RpcError;
use crate::oracle::ChainSource;
use crate::parser::{self, TxEvent};
use crate::rpc::RpcClient;
use crate::state::SharedState;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(120);

/// Per-block transaction data the monitor ingests
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn fetch_block(&self, block: u64) -> Result<Vec<TxEvent>, RpcError>;
}

/// Block header, Transfer logs and (optionally) call traces over JSON-RPC
pub struct RpcBlockSource {
    client: RpcClient,
    trace_native: bool,
}

impl RpcBlockSource {
    pub fn new(client: RpcClient, trace_native: bool) -> Self {
        Self { client, trace_native }
    }
}

#[async_trait]
impl BlockSource for RpcBlockSource {
    async fn fetch_block(&self, block: u64) -> Result<Vec<TxEvent>, RpcError> {
        let client = &self.client;
        let (header, logs) = tokio::try_join!(client.get_block(block), client.get_transfer_logs(block))?;

        let traces = if self.trace_native {
            match client.trace_block(block).await {
                Ok(traces) => traces,
                Err(e) => {
                    warn!("trace_block {} failed, native transfers skipped: {}", block, e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(parser::group_by_transaction(&header, block, &logs, &traces))
    }
}

pub async fn run(cfg: Config, state: SharedState) -> Result<()> {
    let client = RpcClient::new(&cfg.rpc_http_url)?.with_batch_size(cfg.rpc_batch_size);
    let source = RpcBlockSource::new(client.clone(), cfg.trace_native_transfers);

    let chain_id = client.chain_id().await?;
    let network = NetworkProfile::for_chain(chain_id).with_block_time(cfg.block_time_override);
    let lookback_blocks = network.blocks_in(cfg.lookback);
    info!(
        "Monitoring chain {} (block time {:?}, lookback {} blocks)",
        chain_id, network.average_block_time, lookback_blocks
    );

    let mut detector = DrainDetector::new(
        client.clone(),
        ClassificationCache::new(cfg.cache_capacity),
        lookback_blocks,
        network.native_symbol,
    );

    let mut next_block = cfg.start_block;
    let mut retry_delay = cfg.poll_interval;

    loop {
        match client.block_number().await {
            Ok(latest_block) => {
                retry_delay = cfg.poll_interval;
                let target_block = latest_block.saturating_sub(cfg.confirmations);
                let mut block = *next_block.get_or_insert(target_block);

                while block <= target_block {
                    match process_block(&source, &mut detector, &state, block).await {
                        Ok(()) => {
                            block += 1;
                            next_block = Some(block);
                        }
                        Err(e) => {
                            warn!("Fetching block {} failed, retrying next round: {}", block, e);
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!("RPC failed this round: {}", e);
                retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
            }
        }

        sleep(retry_delay).await;
    }
}

/// Resolve the previous block, then ingest this one.
///
/// Block data is fetched first so a fetch failure leaves the pending ledger untouched.
async fn process_block<B: BlockSource, C: ChainSource>(
    source: &B,
    detector: &mut DrainDetector<C>,
    state: &SharedState,
    block: u64,
) -> Result<(), RpcError> {
    let txs = source.fetch_block(block).await?;

    match detector.handle_block(block).await {
        Ok(findings) => {
            for f in &findings {
                warn!(
                    "🚨 Asset drained: {} {} from {} (block {}, txs {:?})",
                    f.symbol, f.asset, f.address, f.block_number, f.tx_hashes
                );
            }
            state.record_findings(findings.iter().map(|f| f.to_alert()));
        }
        Err(e) => {
            error!("Resolution of block {} failed, findings dropped: {}", block.saturating_sub(1), e);
            state.record_failure();
        }
    }

    let applied: usize = txs.iter().map(|tx| detector.handle_transaction(tx)).sum();
    debug!("Block {}: {} txs, {} transfers recorded", block, txs.len(), applied);

    state.mark_block(block, detector.ledger().len(), detector.cache().sizes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetId;
    use crate::state::AppState;
    use crate::test_utils::{addr, token_tx, MockChain};
    use std::collections::{HashMap, HashSet};

    const LOOKBACK: u64 = 50;
    const N: u64 = 2_000;

    /// Serves canned blocks; blocks listed in `failing` answer with a gateway error
    #[derive(Default)]
    struct CannedBlocks {
        blocks: HashMap<u64, Vec<TxEvent>>,
        failing: HashSet<u64>,
    }

    #[async_trait]
    impl BlockSource for CannedBlocks {
        async fn fetch_block(&self, block: u64) -> Result<Vec<TxEvent>, RpcError> {
            if self.failing.contains(&block) {
                return Err(RpcError::Status(reqwest::StatusCode::BAD_GATEWAY));
            }
            Ok(self.blocks.get(&block).cloned().unwrap_or_default())
        }
    }

    fn drained_contract() -> (MockChain, TxEvent) {
        let (c, t, x, sender) = (addr(0xc0), addr(0x7e), addr(0x0a), addr(0xee));
        let chain = MockChain::default()
            .contract(c)
            .symbol(t, "TKN")
            .balance(N + 1 - LOOKBACK, c, AssetId::Token(t), 100);
        (chain, token_tx(1, sender, t, c, x, 100, N))
    }

    #[tokio::test]
    async fn drain_is_reported_when_the_next_block_arrives() {
        let (chain, tx) = drained_contract();
        let mut detector = DrainDetector::new(chain, ClassificationCache::new(100), LOOKBACK, "ETH");
        let source = CannedBlocks {
            blocks: HashMap::from([(N, vec![tx])]),
            ..Default::default()
        };
        let state = AppState::shared(10);

        process_block(&source, &mut detector, &state, N).await.unwrap();
        assert!(state.recent(10).is_empty());
        assert_eq!(detector.ledger().len(), 2);

        process_block(&source, &mut detector, &state, N + 1).await.unwrap();
        let alerts = state.recent(10);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metadata.block_number, N);
        assert!(detector.ledger().is_empty());
        assert_eq!(detector.chain().batches_at(N).len(), 1);

        let status = state.status();
        assert_eq!(status.last_block, N + 1);
        assert_eq!(status.blocks_processed, 2);
        assert_eq!(status.failed_resolutions, 0);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_the_pending_ledger() {
        let (chain, tx) = drained_contract();
        let mut detector = DrainDetector::new(chain, ClassificationCache::new(100), LOOKBACK, "ETH");
        let mut source = CannedBlocks {
            blocks: HashMap::from([(N, vec![tx])]),
            failing: HashSet::from([N + 1]),
        };
        let state = AppState::shared(10);

        process_block(&source, &mut detector, &state, N).await.unwrap();
        assert!(process_block(&source, &mut detector, &state, N + 1).await.is_err());

        // Nothing was resolved and nothing was queried
        assert_eq!(detector.ledger().len(), 2);
        assert!(detector.chain().balance_calls.lock().unwrap().is_empty());
        assert_eq!(state.status().last_block, N);

        // The retry resolves the same ledger
        source.failing.clear();
        process_block(&source, &mut detector, &state, N + 1).await.unwrap();
        assert_eq!(state.recent(10).len(), 1);
        assert!(detector.ledger().is_empty());
    }

    #[tokio::test]
    async fn failed_resolution_is_counted_and_ingestion_continues() {
        let (mut chain, tx) = drained_contract();
        chain.failing_batches.insert(N);
        let mut detector = DrainDetector::new(chain, ClassificationCache::new(100), LOOKBACK, "ETH");
        let next = token_tx(2, addr(0xee), addr(0x7e), addr(0xc1), addr(0x0a), 5, N + 1);
        let source = CannedBlocks {
            blocks: HashMap::from([(N, vec![tx]), (N + 1, vec![next])]),
            ..Default::default()
        };
        let state = AppState::shared(10);

        process_block(&source, &mut detector, &state, N).await.unwrap();
        process_block(&source, &mut detector, &state, N + 1).await.unwrap();

        let status = state.status();
        assert_eq!(status.failed_resolutions, 1);
        assert!(state.recent(10).is_empty());
        // Block N+1's own transfer (sender and receiver) is pending for the next round
        assert_eq!(detector.ledger().len(), 2);
        assert_eq!(status.pending_records, 2);
    }
}
