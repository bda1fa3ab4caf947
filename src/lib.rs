//! Detection of fully drained contract balances on EVM chains.
//!
//! Transfers of each block are folded into a [`ledger::TransferLedger`]; when the next
//! block arrives the [`detector::DrainDetector`] checks every net outflow against
//! current and historical balances and emits [`models::DrainFinding`]s.

pub mod api;
pub mod cache;
pub mod config;
pub mod detector;
pub mod error;
pub mod finding;
pub mod ledger;
pub mod models;
pub mod monitor;
pub mod oracle;
pub mod parser;
pub mod rpc;
pub mod state;

#[cfg(test)]
pub(crate) mod test_utils;
