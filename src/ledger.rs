// src/ledger.rs
use alloy::primitives::{Address, B256, I256, U256};
use std::collections::HashMap;

use crate::models::{AssetId, LedgerKey, TransferRecord, TxOrigin};

/// Call type of a plain value-carrying internal call in trace output
pub const VALUE_CALL_TYPE: &str = "call";

/// Net value deltas for every (address, asset) touched by the block being ingested.
///
/// Updates are additions on a commutative group, so the final state does not depend
/// on the order transfers arrive in.
#[derive(Debug, Default)]
pub struct TransferLedger {
    records: HashMap<LedgerKey, TransferRecord>,
}

impl TransferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ERC20 `Transfer` emitted by `asset`.
    ///
    /// Returns false when the transfer was skipped: zero value, or the token contract
    /// itself is the sender (mints and self-transfers).
    #[allow(clippy::too_many_arguments)]
    pub fn record_token_transfer(
        &mut self,
        asset: Address,
        from: Address,
        to: Address,
        value: U256,
        tx_hash: B256,
        origin: Address,
        block_number: u64,
    ) -> bool {
        if value.is_zero() || asset == from {
            return false;
        }
        self.apply(AssetId::Token(asset), from, to, value, tx_hash, origin, block_number);
        true
    }

    /// Record native value moved by an internal call. Only `call` frames count.
    #[allow(clippy::too_many_arguments)]
    pub fn record_native_transfer(
        &mut self,
        from: Address,
        to: Address,
        value: U256,
        tx_hash: B256,
        origin: Address,
        call_type: &str,
        block_number: u64,
    ) -> bool {
        if value.is_zero() || call_type != VALUE_CALL_TYPE {
            return false;
        }
        self.apply(AssetId::Native, from, to, value, tx_hash, origin, block_number);
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &mut self,
        asset: AssetId,
        from: Address,
        to: Address,
        value: U256,
        tx_hash: B256,
        origin: Address,
        block_number: u64,
    ) {
        let delta = to_signed(value);

        let sender = self.entry(from, asset, block_number);
        sender.net_value = sender.net_value.saturating_sub(delta);
        sender
            .txs
            .entry(to)
            .or_default()
            .push(TxOrigin { tx_hash, origin });

        let receiver = self.entry(to, asset, block_number);
        receiver.net_value = receiver.net_value.saturating_add(delta);
    }

    fn entry(&mut self, address: Address, asset: AssetId, block_number: u64) -> &mut TransferRecord {
        self.records
            .entry(LedgerKey::new(address, asset))
            .or_insert_with(|| TransferRecord::new(address, asset, block_number))
    }

    pub fn get(&self, address: Address, asset: AssetId) -> Option<&TransferRecord> {
        self.records.get(&LedgerKey::new(address, asset))
    }

    /// Read-only view of the current records, ordered by key
    pub fn snapshot(&self) -> Vec<&TransferRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by_key(|r| r.key());
        records
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }

    /// Move every record out and leave the ledger empty
    pub fn take(&mut self) -> Vec<TransferRecord> {
        let mut records: Vec<_> = self.records.drain().map(|(_, r)| r).collect();
        records.sort_by_key(|r| r.key());
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// Values above i256::MAX are not real balances; clamp instead of wrapping negative.
fn to_signed(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}
