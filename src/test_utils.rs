//! In-memory chain and transaction builders shared by the unit tests

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::RpcError;
use crate::models::AssetId;
use crate::oracle::{BalanceQuery, ChainSource};
use crate::parser::{NativeCall, TokenTransfer, TxEvent};

#[derive(Default)]
pub struct MockChain {
    pub balances: HashMap<(u64, Address, AssetId), U256>,
    pub contracts: HashSet<Address>,
    pub symbols: HashMap<Address, String>,
    pub failing_batches: HashSet<u64>,
    pub failing_calls: HashSet<(u64, Address)>,
    pub balance_calls: Mutex<Vec<(u64, Vec<BalanceQuery>)>>,
    pub code_calls: Mutex<Vec<Address>>,
}

impl MockChain {
    pub fn balance(mut self, block: u64, who: Address, asset: AssetId, amount: u64) -> Self {
        self.balances.insert((block, who, asset), U256::from(amount));
        self
    }

    pub fn contract(mut self, who: Address) -> Self {
        self.contracts.insert(who);
        self
    }

    pub fn symbol(mut self, token: Address, symbol: &str) -> Self {
        self.symbols.insert(token, symbol.to_string());
        self
    }

    pub fn batches_at(&self, block: u64) -> Vec<Vec<BalanceQuery>> {
        self.balance_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(b, _)| *b == block)
            .map(|(_, q)| q.clone())
            .collect()
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn batch_balances(
        &self,
        queries: &[BalanceQuery],
        block: u64,
    ) -> Result<Vec<Result<U256, RpcError>>, RpcError> {
        self.balance_calls.lock().unwrap().push((block, queries.to_vec()));
        if self.failing_batches.contains(&block) {
            return Err(RpcError::Status(reqwest::StatusCode::BAD_GATEWAY));
        }
        Ok(queries
            .iter()
            .map(|q| {
                if self.failing_calls.contains(&(block, q.address)) {
                    return Err(RpcError::Node { code: -32000, message: "execution reverted".into() });
                }
                Ok(self
                    .balances
                    .get(&(block, q.address, q.asset))
                    .copied()
                    .unwrap_or(U256::ZERO))
            })
            .collect())
    }

    async fn has_code(&self, address: Address) -> Result<bool, RpcError> {
        self.code_calls.lock().unwrap().push(address);
        Ok(self.contracts.contains(&address))
    }

    async fn token_symbol(&self, asset: Address) -> Result<String, RpcError> {
        self.symbols
            .get(&asset)
            .cloned()
            .ok_or_else(|| RpcError::decode("symbol", "0x"))
    }
}

pub fn addr(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub fn token_tx(hash: u8, sender: Address, asset: Address, from: Address, to: Address, value: u64, block: u64) -> TxEvent {
    TxEvent {
        hash: B256::repeat_byte(hash),
        from: sender,
        block_number: block,
        token_transfers: vec![TokenTransfer {
            asset,
            from,
            to,
            value: U256::from(value),
            tx_hash: B256::repeat_byte(hash),
        }],
        native_calls: Vec::new(),
    }
}

pub fn native_tx(hash: u8, sender: Address, from: Address, to: Address, value: u64, block: u64) -> TxEvent {
    TxEvent {
        hash: B256::repeat_byte(hash),
        from: sender,
        block_number: block,
        token_transfers: Vec::new(),
        native_calls: vec![NativeCall {
            from,
            to,
            value: U256::from(value),
            call_type: "call".to_string(),
            tx_hash: B256::repeat_byte(hash),
        }],
    }
}
