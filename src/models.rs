// src/models.rs
use alloy::primitives::{Address, B256, I256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Asset tracked by the ledger: the chain's base currency or an ERC20 contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetId {
    Native,
    Token(Address),
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Native => f.write_str("native"),
            AssetId::Token(addr) => write!(f, "{addr}"),
        }
    }
}

/// Composite key of one ledger record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerKey {
    pub address: Address,
    pub asset: AssetId,
}

impl LedgerKey {
    pub fn new(address: Address, asset: AssetId) -> Self {
        Self { address, asset }
    }
}

/// Transaction that moved value out of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOrigin {
    pub tx_hash: B256,
    pub origin: Address, // EOA that sent the transaction
}

/// Net movement of one asset for one address within the unresolved block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub asset: AssetId,
    pub address: Address,
    pub net_value: I256,
    pub block_number: u64,
    /// counterparty -> outgoing transactions, in arrival order
    pub txs: BTreeMap<Address, Vec<TxOrigin>>,
}

impl TransferRecord {
    pub fn new(address: Address, asset: AssetId, block_number: u64) -> Self {
        Self {
            asset,
            address,
            net_value: I256::ZERO,
            block_number,
            txs: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.address, self.asset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClassification {
    Contract,
    ExternalAccount,
    /// Suppressed for the rest of the run
    Ignored,
}

/// A confirmed drain, ready to be rendered as an alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainFinding {
    pub address: Address,
    pub asset: AssetId,
    pub symbol: String,
    pub initiators: Vec<Address>,
    pub tx_hashes: Vec<B256>,
    pub block_number: u64,
    pub counterparties: Vec<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FindingType {
    Exploit,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMetadata {
    pub contract: String,
    pub asset: String,
    pub initiators: Vec<String>,
    pub tx_hashes: Vec<String>,
    pub block_number: u64,
}

/// Serialisable alert record (addresses kept as strings for the API)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub name: String,
    pub description: String,
    pub alert_id: String,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub metadata: AlertMetadata,
    pub addresses: Vec<String>,
    pub detected_at: DateTime<Utc>,
}
