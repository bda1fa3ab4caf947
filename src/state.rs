// src/state.rs
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::cache::CacheSizes;
use crate::models::Alert;

pub type SharedState = Arc<AppState>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub last_block: u64,
    pub blocks_processed: u64,
    pub failed_resolutions: u64,
    pub findings_total: u64,
    pub pending_records: u64,
    pub cached_addresses: usize,
    pub cached_symbols: usize,
}

/// What the monitor publishes for the API: recent alerts plus progress counters
pub struct AppState {
    findings: Mutex<VecDeque<Alert>>,
    history: usize,
    last_block: AtomicU64,
    blocks_processed: AtomicU64,
    failed_resolutions: AtomicU64,
    findings_total: AtomicU64,
    pending_records: AtomicU64,
    cache_sizes: Mutex<CacheSizes>,
}

impl AppState {
    pub fn shared(history: usize) -> SharedState {
        Arc::new(Self {
            findings: Mutex::new(VecDeque::with_capacity(history.min(1_024))),
            history: history.max(1),
            last_block: AtomicU64::new(0),
            blocks_processed: AtomicU64::new(0),
            failed_resolutions: AtomicU64::new(0),
            findings_total: AtomicU64::new(0),
            pending_records: AtomicU64::new(0),
            cache_sizes: Mutex::new(CacheSizes::default()),
        })
    }

    pub fn record_findings(&self, alerts: impl IntoIterator<Item = Alert>) {
        let mut findings = self.findings.lock().unwrap_or_else(|p| p.into_inner());
        for alert in alerts {
            if findings.len() == self.history {
                findings.pop_front();
            }
            findings.push_back(alert);
            self.findings_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self) {
        self.failed_resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_block(&self, block: u64, pending_records: usize, sizes: CacheSizes) {
        self.last_block.store(block, Ordering::Relaxed);
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
        self.pending_records.store(pending_records as u64, Ordering::Relaxed);
        *self.cache_sizes.lock().unwrap_or_else(|p| p.into_inner()) = sizes;
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        let findings = self.findings.lock().unwrap_or_else(|p| p.into_inner());
        findings.iter().rev().take(limit).cloned().collect()
    }

    pub fn status(&self) -> Status {
        let sizes = *self.cache_sizes.lock().unwrap_or_else(|p| p.into_inner());
        Status {
            last_block: self.last_block.load(Ordering::Relaxed),
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            failed_resolutions: self.failed_resolutions.load(Ordering::Relaxed),
            findings_total: self.findings_total.load(Ordering::Relaxed),
            pending_records: self.pending_records.load(Ordering::Relaxed),
            cached_addresses: sizes.addresses,
            cached_symbols: sizes.symbols,
        }
    }
}
