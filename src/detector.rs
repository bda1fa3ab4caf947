// src/detector.rs
use alloy::primitives::{Address, U256};
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::ClassificationCache;
use crate::error::DetectorError;
use crate::finding::build_finding;
use crate::ledger::TransferLedger;
use crate::models::{AddressClassification, AssetId, DrainFinding, TransferRecord};
use crate::oracle::{BalanceOracle, BalanceQuery, ChainSource};
use crate::parser::TxEvent;

pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Drain detection for one chain.
///
/// Transactions of block N accumulate in the ledger; the arrival of block N+1 resolves
/// them. Resolution takes `&mut self`, so only one block is ever in flight.
pub struct DrainDetector<C: ChainSource> {
    chain: C,
    ledger: TransferLedger,
    cache: ClassificationCache,
    lookback_blocks: u64,
    native_symbol: String,
}

impl<C: ChainSource> DrainDetector<C> {
    pub fn new(
        chain: C,
        cache: ClassificationCache,
        lookback_blocks: u64,
        native_symbol: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            ledger: TransferLedger::new(),
            cache,
            lookback_blocks,
            native_symbol: native_symbol.into(),
        }
    }

    pub fn ledger(&self) -> &TransferLedger {
        &self.ledger
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// Fold one transaction's transfers into the ledger. Returns how many were applied.
    pub fn handle_transaction(&mut self, tx: &TxEvent) -> usize {
        let mut applied = 0;
        for t in &tx.token_transfers {
            if self.ledger.record_token_transfer(t.asset, t.from, t.to, t.value, tx.hash, tx.from, tx.block_number) {
                applied += 1;
            }
        }
        for c in &tx.native_calls {
            if self.ledger.record_native_transfer(c.from, c.to, c.value, tx.hash, tx.from, &c.call_type, tx.block_number) {
                applied += 1;
            }
        }
        applied
    }

    /// Resolve the ledger accumulated before `block_number` arrived.
    ///
    /// The ledger is emptied before any query runs, so a failed resolution drops
    /// that block's findings instead of replaying stale deltas.
    pub async fn handle_block(&mut self, block_number: u64) -> Result<Vec<DrainFinding>, DetectorError> {
        let records = self.ledger.take();
        self.resolve(records, block_number).await
    }

    async fn resolve(&self, records: Vec<TransferRecord>, block_number: u64) -> Result<Vec<DrainFinding>, DetectorError> {
        // Only addresses that had more withdrawn than deposited
        let candidates: Vec<TransferRecord> = records
            .into_iter()
            .filter(|r| r.net_value.is_negative())
            .filter(|r| r.address != Address::ZERO)
            .filter(|r| !self.cache.is_ignored(&r.address))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        info!("processing block {} ({} outflow candidates)", block_number, candidates.len());

        let oracle = BalanceOracle::new(&self.chain);

        // Fully drained as of the block the transfers landed in
        let queries: Vec<BalanceQuery> = candidates.iter().map(balance_query).collect();
        let balances = oracle
            .current_balances(&queries, block_number.saturating_sub(1))
            .await?;
        let drained: Vec<TransferRecord> = candidates
            .into_iter()
            .zip(balances)
            .filter(|(_, balance)| balance.is_zero())
            .map(|(r, _)| r)
            .collect();
        if drained.is_empty() {
            debug!("block {}: no zero balances", block_number);
            return Ok(Vec::new());
        }

        // Externally-owned and ignored addresses drop out here
        let classes = self.classify_all(drained.iter().map(|r| r.address)).await;
        let contracts: Vec<TransferRecord> = drained
            .into_iter()
            .filter(|r| classes.get(&r.address) == Some(&AddressClassification::Contract))
            .collect();
        if contracts.is_empty() {
            debug!("block {}: no drained contracts", block_number);
            return Ok(Vec::new());
        }

        let lookback_block = block_number.saturating_sub(self.lookback_blocks);
        let queries: Vec<BalanceQuery> = contracts.iter().map(balance_query).collect();
        let (symbols, past_balances) = tokio::join!(
            self.symbols_for(contracts.iter().map(|r| r.asset)),
            oracle.historical_balances(&queries, lookback_block),
        );

        let mut findings = Vec::new();
        for (record, past) in contracts.iter().zip(past_balances) {
            // Empty before the drain too: nothing was lost, and nothing will be next time
            if past == U256::ZERO {
                debug!("ignoring {} from now on: empty at block {}", record.address, lookback_block);
                self.cache.set(record.address, AddressClassification::Ignored);
                continue;
            }
            let symbol = symbols
                .get(&record.asset)
                .map(String::as_str)
                .unwrap_or(UNKNOWN_SYMBOL);
            findings.push(build_finding(record, symbol));
        }

        info!(
            "previous block processed in {}ms ({} findings)",
            started.elapsed().as_millis(),
            findings.len()
        );
        Ok(findings)
    }

    async fn classify_all(&self, addresses: impl Iterator<Item = Address>) -> HashMap<Address, AddressClassification> {
        let unique: HashSet<Address> = addresses.collect();
        let lookups = unique.into_iter().map(|a| async move { (a, self.classify(a).await) });
        join_all(lookups).await.into_iter().collect()
    }

    async fn classify(&self, address: Address) -> AddressClassification {
        if let Some(known) = self.cache.get(&address) {
            return known;
        }
        match self.chain.has_code(address).await {
            Ok(has_code) => {
                let class = if has_code {
                    AddressClassification::Contract
                } else {
                    AddressClassification::ExternalAccount
                };
                self.cache.set(address, class);
                class
            }
            Err(e) => {
                // Not memoised; the next block retries
                warn!("code lookup for {} failed: {}", address, e);
                AddressClassification::ExternalAccount
            }
        }
    }

    async fn symbols_for(&self, assets: impl Iterator<Item = AssetId>) -> HashMap<AssetId, String> {
        let unique: HashSet<AssetId> = assets.collect();
        let lookups = unique.into_iter().map(|a| async move { (a, self.symbol(a).await) });
        join_all(lookups).await.into_iter().collect()
    }

    async fn symbol(&self, asset: AssetId) -> String {
        if let Some(symbol) = self.cache.symbol(&asset) {
            return symbol;
        }
        let resolved = match asset {
            AssetId::Native => Ok(self.native_symbol.clone()),
            AssetId::Token(token) => self.chain.token_symbol(token).await,
        };
        match resolved {
            Ok(symbol) => {
                self.cache.set_symbol(asset, symbol.clone());
                symbol
            }
            Err(e) => {
                debug!("symbol lookup for {} failed: {}", asset, e);
                UNKNOWN_SYMBOL.to_string()
            }
        }
    }
}

fn balance_query(record: &TransferRecord) -> BalanceQuery {
    BalanceQuery {
        address: record.address,
        asset: record.asset,
    }
}
