// src/rpc.rs
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::RpcError;
use crate::models::AssetId;
use crate::oracle::{BalanceQuery, ChainSource};

alloy::sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function symbol() external view returns (string);
    }
}

/// ERC20 Transfer event topic keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,

    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlockTransaction {
    pub hash: String,
    pub from: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Block {
    #[serde(default)]
    pub transactions: Vec<BlockTransaction>,
}

/// Parity-style trace frame as returned by `trace_block`
#[derive(Debug, Deserialize, Clone)]
pub struct Trace {
    pub action: TraceAction,
    #[serde(rename = "transactionHash")]
    pub tx_hash: Option<String>,
    #[serde(rename = "type")]
    pub trace_type: String,
    /// Path of this frame in the call tree; the top-level call is empty
    #[serde(rename = "traceAddress", default)]
    pub trace_address: Vec<u64>,
    /// Set when the frame reverted; its value never moved
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TraceAction {
    #[serde(rename = "callType")]
    pub call_type: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    #[allow(dead_code)]
    jsonrpc: String,
    id: u64,
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

impl<T> RpcResponse<T> {
    fn into_result(self, method: &str) -> Result<T, RpcError> {
        if let Some(err) = self.error {
            return Err(RpcError::Node {
                code: err.code,
                message: err.message,
            });
        }
        self.result
            .ok_or_else(|| RpcError::MissingResult(method.to_string()))
    }
}

pub fn block_tag(block: u64) -> String {
    format!("0x{:x}", block)
}

/// Parse a hex quantity such as `0x1bc16d674ec80000`
pub fn parse_quantity(value: &str) -> Result<U256, RpcError> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).map_err(|_| RpcError::decode("quantity", value))
}

pub fn parse_u64(value: &str) -> Result<u64, RpcError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|_| RpcError::decode("block number", value))
}

fn decode_hex(value: &str) -> Result<Vec<u8>, RpcError> {
    hex::decode(value.trim_start_matches("0x")).map_err(|_| RpcError::decode("hex data", value))
}

/// First ABI word of an `eth_call` return as uint256
pub fn decode_uint_word(value: &str) -> Result<U256, RpcError> {
    let bytes = decode_hex(value)?;
    if bytes.len() < 32 {
        return Err(RpcError::decode("uint256 return", value));
    }
    Ok(U256::from_be_slice(&bytes[..32]))
}

/// Decode a `symbol()` return, accepting ABI `string` and legacy `bytes32` tokens
pub fn decode_symbol(data: &[u8]) -> Option<String> {
    let raw = if data.len() >= 64 {
        let offset: usize = U256::from_be_slice(&data[..32]).try_into().ok()?;
        let start = offset.checked_add(32)?;
        let len: usize = U256::from_be_slice(data.get(offset..start)?).try_into().ok()?;
        data.get(start..start.checked_add(len)?)?.to_vec()
    } else if data.len() == 32 {
        data.iter().copied().take_while(|b| *b != 0).collect()
    } else {
        return None;
    };

    let symbol = String::from_utf8(raw).ok()?;
    let symbol = symbol.trim_matches(char::from(0)).trim().to_string();
    (!symbol.is_empty()).then_some(symbol)
}

fn balance_call(query: &BalanceQuery, block: u64) -> (&'static str, Value) {
    match query.asset {
        AssetId::Native => (
            "eth_getBalance",
            json!([query.address.to_string(), block_tag(block)]),
        ),
        AssetId::Token(token) => {
            let data = IERC20::balanceOfCall { owner: query.address }.abi_encode();
            (
                "eth_call",
                json!([
                    { "to": token.to_string(), "data": format!("0x{}", hex::encode(data)) },
                    block_tag(block)
                ]),
            )
        }
    }
}

fn decode_balance(query: &BalanceQuery, value: Value) -> Result<U256, RpcError> {
    let text = value
        .as_str()
        .ok_or_else(|| RpcError::decode("balance", value.to_string()))?;
    match query.asset {
        AssetId::Native => parse_quantity(text),
        AssetId::Token(_) => decode_uint_word(text),
    }
}

/// Calls per JSON-RPC batch; public providers commonly reject larger arrays
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Feed `items` to `send` in order, at most `size` at a time, and concatenate the replies.
/// The first failed chunk fails the whole run.
pub async fn in_chunks<T, R, F, Fut>(items: Vec<T>, size: usize, mut send: F) -> Result<Vec<R>, RpcError>
where
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<Vec<R>, RpcError>>,
{
    let size = size.max(1);
    let mut out = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        let chunk: Vec<T> = items.by_ref().take(size).collect();
        out.extend(send(chunk).await?);
    }
    Ok(out)
}

/// JSON-RPC over HTTP
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
    batch_size: usize,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        debug!("📡 Sending {} → {}", method, self.url);

        let resp = self.client.post(&self.url).json(&payload).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(RpcError::Status(resp.status()));
        }
        let text = resp.text().await?;
        let parsed: RpcResponse<T> = serde_json::from_str(&text)?;
        parsed.into_result(method)
    }

    /// Send the calls as JSON-RPC batches of at most `batch_size`; results come back in call order
    pub async fn batch(&self, calls: Vec<(&'static str, Value)>) -> Result<Vec<Result<Value, RpcError>>, RpcError> {
        in_chunks(calls, self.batch_size, |chunk| self.send_batch(chunk)).await
    }

    async fn send_batch(&self, calls: Vec<(&'static str, Value)>) -> Result<Vec<Result<Value, RpcError>>, RpcError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let payload: Vec<Value> = calls
            .iter()
            .enumerate()
            .map(|(id, (method, params))| {
                json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
            })
            .collect();

        debug!("📡 Sending batch of {} calls → {}", payload.len(), self.url);

        let resp = self.client.post(&self.url).json(&payload).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(RpcError::Status(resp.status()));
        }
        let text = resp.text().await?;
        let replies: Vec<RpcResponse<Value>> = serde_json::from_str(&text)?;

        // Nodes may answer a batch out of order
        let mut by_id: HashMap<u64, RpcResponse<Value>> =
            replies.into_iter().map(|r| (r.id, r)).collect();
        Ok(calls
            .iter()
            .enumerate()
            .map(|(id, (method, _))| match by_id.remove(&(id as u64)) {
                Some(reply) => reply.into_result(method),
                None => Err(RpcError::MissingResult(method.to_string())),
            })
            .collect())
    }

    /// Get the latest block number with retries
    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let mut attempt = 1;
        loop {
            match self.request::<String>("eth_blockNumber", json!([])).await {
                Ok(hex) => return parse_u64(&hex),
                Err(e) if attempt < 3 => {
                    warn!("⚠️ eth_blockNumber failed (attempt {}): {}. Retrying...", attempt, e);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        let hex: String = self.request("eth_chainId", json!([])).await?;
        parse_u64(&hex)
    }

    pub async fn get_block(&self, block: u64) -> Result<Block, RpcError> {
        self.request("eth_getBlockByNumber", json!([block_tag(block), true]))
            .await
    }

    /// All ERC20-shaped Transfer logs emitted in one block
    pub async fn get_transfer_logs(&self, block: u64) -> Result<Vec<Log>, RpcError> {
        self.request(
            "eth_getLogs",
            json!([{
                "fromBlock": block_tag(block),
                "toBlock": block_tag(block),
                "topics": [TRANSFER_TOPIC]
            }]),
        )
        .await
    }

    pub async fn trace_block(&self, block: u64) -> Result<Vec<Trace>, RpcError> {
        self.request("trace_block", json!([block_tag(block)])).await
    }
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn batch_balances(
        &self,
        queries: &[BalanceQuery],
        block: u64,
    ) -> Result<Vec<Result<U256, RpcError>>, RpcError> {
        let calls = queries.iter().map(|q| balance_call(q, block)).collect();
        let replies = self.batch(calls).await?;
        Ok(replies
            .into_iter()
            .zip(queries)
            .map(|(reply, q)| reply.and_then(|v| decode_balance(q, v)))
            .collect())
    }

    async fn has_code(&self, address: Address) -> Result<bool, RpcError> {
        let code: String = self
            .request("eth_getCode", json!([address.to_string(), "latest"]))
            .await?;
        Ok(!code.trim_start_matches("0x").is_empty())
    }

    async fn token_symbol(&self, asset: Address) -> Result<String, RpcError> {
        let data = IERC20::symbolCall {}.abi_encode();
        let out: String = self
            .request(
                "eth_call",
                json!([
                    { "to": asset.to_string(), "data": format!("0x{}", hex::encode(data)) },
                    "latest"
                ]),
            )
            .await?;
        let bytes = decode_hex(&out)?;
        decode_symbol(&bytes).ok_or_else(|| RpcError::decode("symbol", out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(n: u64) -> Vec<u8> {
        U256::from(n).to_be_bytes::<32>().to_vec()
    }

    #[test]
    fn decodes_abi_string_symbol() {
        let mut data = word(32);
        data.extend(word(4));
        let mut text = b"USDC".to_vec();
        text.resize(32, 0);
        data.extend(text);
        assert_eq!(decode_symbol(&data).as_deref(), Some("USDC"));
    }

    #[test]
    fn decodes_bytes32_symbol() {
        let mut data = b"MKR".to_vec();
        data.resize(32, 0);
        assert_eq!(decode_symbol(&data).as_deref(), Some("MKR"));
    }

    #[test]
    fn rejects_truncated_symbol() {
        let mut data = word(32);
        data.extend(word(40));
        data.extend(b"SHORT".to_vec());
        assert_eq!(decode_symbol(&data), None);
        assert_eq!(decode_symbol(&[1, 2, 3]), None);
    }

    #[test]
    fn parses_quantities() {
        assert_eq!(parse_quantity("0x0").unwrap(), U256::ZERO);
        assert_eq!(parse_quantity("0x").unwrap(), U256::ZERO);
        assert_eq!(parse_quantity("0x64").unwrap(), U256::from(100));
        assert!(parse_quantity("0xzz").is_err());
        assert_eq!(parse_u64("0x10").unwrap(), 16);
    }

    #[test]
    fn decodes_balance_of_return() {
        let hex = format!("0x{}", hex::encode(word(1_000)));
        assert_eq!(decode_uint_word(&hex).unwrap(), U256::from(1_000));
        assert!(decode_uint_word("0x").is_err());
    }

    #[test]
    fn balance_calls_pick_method_by_asset() {
        let holder = Address::repeat_byte(0x11);
        let token = Address::repeat_byte(0x22);

        let (method, params) = balance_call(&BalanceQuery { address: holder, asset: AssetId::Native }, 255);
        assert_eq!(method, "eth_getBalance");
        assert_eq!(params[1], "0xff");

        let (method, params) = balance_call(&BalanceQuery { address: holder, asset: AssetId::Token(token) }, 16);
        assert_eq!(method, "eth_call");
        let data = params[0]["data"].as_str().unwrap();
        // balanceOf(address) selector
        assert!(data.starts_with("0x70a08231"));
        assert!(data.ends_with(&hex::encode(holder.as_slice())));
        assert_eq!(params[1], "0x10");
    }

    #[tokio::test]
    async fn chunked_calls_keep_call_order() {
        let mut sizes = Vec::new();
        let out = in_chunks((0..7u32).collect(), 3, |chunk: Vec<u32>| {
            sizes.push(chunk.len());
            async move { Ok(chunk.into_iter().map(|n| n * 10).collect::<Vec<_>>()) }
        })
        .await
        .unwrap();

        assert_eq!(out, vec![0, 10, 20, 30, 40, 50, 60]);
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn failed_chunk_stops_the_run() {
        let mut sent = 0;
        let result = in_chunks((0..5u32).collect(), 2, |chunk: Vec<u32>| {
            sent += 1;
            let fail = sent == 2;
            async move {
                if fail {
                    Err(RpcError::Status(StatusCode::PAYLOAD_TOO_LARGE))
                } else {
                    Ok(chunk)
                }
            }
        })
        .await;

        assert!(matches!(result, Err(RpcError::Status(code)) if code == StatusCode::PAYLOAD_TOO_LARGE));
        assert_eq!(sent, 2);
    }

    #[test]
    fn error_replies_become_node_errors() {
        let reply: RpcResponse<Value> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32000,"message":"execution reverted"}}"#,
        )
        .unwrap();
        match reply.into_result("eth_call") {
            Err(RpcError::Node { code, .. }) => assert_eq!(code, -32000),
            other => panic!("unexpected {:?}", other),
        }
    }
}
