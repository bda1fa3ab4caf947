// src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rpc returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid json-rpc payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("no result for {0}")]
    MissingResult(String),

    #[error("malformed {what}: {value}")]
    Decode { what: &'static str, value: String },
}

impl RpcError {
    pub fn decode(what: &'static str, value: impl Into<String>) -> Self {
        RpcError::Decode {
            what,
            value: value.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DetectorError {
    /// A false zero would confirm a drain that never happened, so this one is never defaulted
    #[error("current balance query at block {block} failed: {source}")]
    CurrentBalance {
        block: u64,
        #[source]
        source: RpcError,
    },
}
