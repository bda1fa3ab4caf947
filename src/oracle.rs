// src/oracle.rs
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use tracing::debug;

use crate::error::{DetectorError, RpcError};
use crate::models::AssetId;

/// One balance lookup: `address`'s holding of `asset`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BalanceQuery {
    pub address: Address,
    pub asset: AssetId,
}

/// Chain data the drain pipeline needs. Implemented by the JSON-RPC client.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Execute all balance lookups in one round-trip pinned to `block`.
    ///
    /// The outer error is a transport failure; inner errors are per-call failures.
    async fn batch_balances(
        &self,
        queries: &[BalanceQuery],
        block: u64,
    ) -> Result<Vec<Result<U256, RpcError>>, RpcError>;

    /// Whether the address has deployed bytecode at the latest block
    async fn has_code(&self, address: Address) -> Result<bool, RpcError>;

    /// ERC20 `symbol()` of a token contract
    async fn token_symbol(&self, asset: Address) -> Result<String, RpcError>;
}

/// Balance lookups with the two failure policies the pipeline relies on
pub struct BalanceOracle<'a, C: ChainSource> {
    chain: &'a C,
}

impl<'a, C: ChainSource> BalanceOracle<'a, C> {
    pub fn new(chain: &'a C) -> Self {
        Self { chain }
    }

    /// Balances as of `block`. Any failure, batch-wide or per call, fails the whole lookup.
    pub async fn current_balances(
        &self,
        queries: &[BalanceQuery],
        block: u64,
    ) -> Result<Vec<U256>, DetectorError> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        let to_err = |source: RpcError| DetectorError::CurrentBalance { block, source };

        let results = self.chain.batch_balances(queries, block).await.map_err(to_err)?;
        if results.len() != queries.len() {
            return Err(to_err(RpcError::MissingResult(format!(
                "{} of {} balance calls",
                queries.len() - results.len().min(queries.len()),
                queries.len()
            ))));
        }
        results.into_iter().map(|r| r.map_err(to_err)).collect()
    }

    /// Balances as of `block`; failed lookups read as zero.
    pub async fn historical_balances(&self, queries: &[BalanceQuery], block: u64) -> Vec<U256> {
        if queries.is_empty() {
            return Vec::new();
        }
        match self.chain.batch_balances(queries, block).await {
            Ok(results) => {
                let mut balances: Vec<U256> = results
                    .into_iter()
                    .zip(queries)
                    .map(|(r, q)| {
                        r.unwrap_or_else(|e| {
                            debug!("historical balance of {} ({}) at {} failed: {}", q.address, q.asset, block, e);
                            U256::ZERO
                        })
                    })
                    .collect();
                balances.resize(queries.len(), U256::ZERO);
                balances
            }
            Err(e) => {
                debug!("historical balance batch at {} failed: {}", block, e);
                vec![U256::ZERO; queries.len()]
            }
        }
    }
}
