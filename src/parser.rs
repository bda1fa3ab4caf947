// src/parser.rs
use alloy::primitives::{Address, B256, U256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::rpc::{parse_quantity, Block, Log, Trace, TRANSFER_TOPIC};

/// A decoded ERC20 Transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    pub asset: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub tx_hash: B256,
}

/// Value moved by one internal call frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCall {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub call_type: String,
    pub tx_hash: B256,
}

/// Everything the ledger needs from one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEvent {
    pub hash: B256,
    pub from: Address,
    pub block_number: u64,
    pub token_transfers: Vec<TokenTransfer>,
    pub native_calls: Vec<NativeCall>,
}

fn topic_to_address(topic: &str) -> Option<Address> {
    // topics[1] and topics[2] are 32-byte (padded) hex strings; address is the last 20 bytes
    let s = topic.trim_start_matches("0x");
    let bytes = hex::decode(s).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    let addr_bytes: [u8; 20] = bytes[12..32].try_into().ok()?;
    Some(Address::from(addr_bytes))
}

/// Decode a single log into `TokenTransfer`.
///
/// ERC721 shares the Transfer topic but indexes the token id as a fourth topic,
/// so only three-topic logs with a one-word payload qualify.
pub fn decode_transfer(log: &Log) -> Option<TokenTransfer> {
    if log.topics.len() != 3 || !log.topics[0].eq_ignore_ascii_case(TRANSFER_TOPIC) {
        return None;
    }

    let from = topic_to_address(&log.topics[1])?;
    let to = topic_to_address(&log.topics[2])?;

    let data = hex::decode(log.data.trim_start_matches("0x")).ok()?;
    if data.len() != 32 {
        return None;
    }
    let value = U256::from_be_slice(&data);

    Some(TokenTransfer {
        asset: log.address.parse().ok()?,
        from,
        to,
        value,
        tx_hash: log.tx_hash.parse().ok()?,
    })
}

/// Decode a value-carrying call frame. Creates, suicides and rewards are skipped.
pub fn decode_trace(trace: &Trace) -> Option<NativeCall> {
    if trace.trace_type != "call" || trace.error.is_some() {
        return None;
    }
    let action = &trace.action;
    let value = parse_quantity(action.value.as_deref()?).ok()?;

    Some(NativeCall {
        from: action.from.as_deref()?.parse().ok()?,
        to: action.to.as_deref()?.parse().ok()?,
        value,
        call_type: action.call_type.clone()?,
        tx_hash: trace.tx_hash.as_deref()?.parse().ok()?,
    })
}

/// Split a block's logs and traces into per-transaction events, in block order
pub fn group_by_transaction(block: &Block, block_number: u64, logs: &[Log], traces: &[Trace]) -> Vec<TxEvent> {
    let mut events: Vec<TxEvent> = Vec::with_capacity(block.transactions.len());
    let mut index: HashMap<B256, usize> = HashMap::new();

    for tx in &block.transactions {
        let (Ok(hash), Ok(from)) = (tx.hash.parse::<B256>(), tx.from.parse::<Address>()) else {
            debug!("skipping undecodable transaction {}", tx.hash);
            continue;
        };
        index.insert(hash, events.len());
        events.push(TxEvent {
            hash,
            from,
            block_number,
            token_transfers: Vec::new(),
            native_calls: Vec::new(),
        });
    }

    for transfer in logs.iter().filter_map(decode_transfer) {
        match index.get(&transfer.tx_hash) {
            Some(&i) => events[i].token_transfers.push(transfer),
            None => debug!("transfer log from unknown tx {}", transfer.tx_hash),
        }
    }

    // A reverted frame undoes every call nested under it
    let reverted: HashSet<(Option<&str>, &[u64])> = traces
        .iter()
        .filter(|t| t.error.is_some())
        .map(|t| (t.tx_hash.as_deref(), t.trace_address.as_slice()))
        .collect();
    let undone = |t: &Trace| {
        (0..=t.trace_address.len()).any(|n| reverted.contains(&(t.tx_hash.as_deref(), &t.trace_address[..n])))
    };

    for call in traces.iter().filter(|t| !undone(t)).filter_map(decode_trace) {
        if let Some(&i) = index.get(&call.tx_hash) {
            events[i].native_calls.push(call);
        }
    }

    events
}
