// src/finding.rs
use alloy::primitives::{Address, B256};
use chrono::Utc;
use std::collections::HashSet;

use crate::models::{Alert, AlertMetadata, DrainFinding, FindingType, Severity, TransferRecord};

pub const ALERT_NAME: &str = "Asset drained";
pub const ALERT_ID: &str = "ASSET-DRAINED";

/// Build a finding from a confirmed record, deduplicating provenance in first-seen order
pub fn build_finding(record: &TransferRecord, symbol: &str) -> DrainFinding {
    let mut initiators: Vec<Address> = Vec::new();
    let mut tx_hashes: Vec<B256> = Vec::new();
    let mut seen_initiators = HashSet::new();
    let mut seen_hashes = HashSet::new();

    for tx in record.txs.values().flatten() {
        if seen_initiators.insert(tx.origin) {
            initiators.push(tx.origin);
        }
        if seen_hashes.insert(tx.tx_hash) {
            tx_hashes.push(tx.tx_hash);
        }
    }

    DrainFinding {
        address: record.address,
        asset: record.asset,
        symbol: symbol.to_string(),
        initiators,
        tx_hashes,
        block_number: record.block_number,
        counterparties: record.txs.keys().copied().collect(),
    }
}

impl DrainFinding {
    pub fn to_alert(&self) -> Alert {
        Alert {
            name: ALERT_NAME.to_string(),
            description: format!("All {} tokens were drained from {}", self.symbol, self.address),
            alert_id: ALERT_ID.to_string(),
            severity: Severity::High,
            finding_type: FindingType::Exploit,
            metadata: AlertMetadata {
                contract: self.address.to_string(),
                asset: self.asset.to_string(),
                initiators: self.initiators.iter().map(|a| a.to_string()).collect(),
                tx_hashes: self.tx_hashes.iter().map(|h| h.to_string()).collect(),
                block_number: self.block_number,
            },
            addresses: self.counterparties.iter().map(|a| a.to_string()).collect(),
            detected_at: Utc::now(),
        }
    }
}
