// src/cache.rs
//! Process-lifetime memo of address classifications and asset symbols.
//!
//! Both stores are bounded LRUs; eviction is silent. Classification is keyed by
//! address only, so an address marked `Ignored` stays suppressed for every asset.

use alloy::primitives::Address;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::models::{AddressClassification, AssetId};

pub const DEFAULT_CAPACITY: usize = 100_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheSizes {
    pub addresses: usize,
    pub symbols: usize,
}

pub struct ClassificationCache {
    addresses: Mutex<LruCache<Address, AddressClassification>>,
    symbols: Mutex<LruCache<AssetId, String>>,
}

impl ClassificationCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            addresses: Mutex::new(LruCache::new(cap)),
            symbols: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn get(&self, address: &Address) -> Option<AddressClassification> {
        lock(&self.addresses).get(address).copied()
    }

    pub fn set(&self, address: Address, classification: AddressClassification) {
        lock(&self.addresses).put(address, classification);
    }

    /// Counts as a use: an address suppressed every block must not age out.
    pub fn is_ignored(&self, address: &Address) -> bool {
        matches!(
            lock(&self.addresses).get(address),
            Some(AddressClassification::Ignored)
        )
    }

    pub fn symbol(&self, asset: &AssetId) -> Option<String> {
        lock(&self.symbols).get(asset).cloned()
    }

    pub fn set_symbol(&self, asset: AssetId, symbol: String) {
        lock(&self.symbols).put(asset, symbol);
    }

    pub fn sizes(&self) -> CacheSizes {
        CacheSizes {
            addresses: lock(&self.addresses).len(),
            symbols: lock(&self.symbols).len(),
        }
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// A poisoned lock only means another holder panicked mid-insert; the LRU itself is still valid.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = ClassificationCache::new(2);
        cache.set(addr(1), AddressClassification::Contract);
        cache.set(addr(2), AddressClassification::ExternalAccount);
        // touch 1 so 2 becomes the eviction victim
        assert_eq!(cache.get(&addr(1)), Some(AddressClassification::Contract));
        cache.set(addr(3), AddressClassification::Contract);

        assert_eq!(cache.get(&addr(2)), None);
        assert!(cache.get(&addr(1)).is_some());
        assert_eq!(cache.sizes().addresses, 2);
    }

    #[test]
    fn ignored_overrides_contract() {
        let cache = ClassificationCache::default();
        cache.set(addr(1), AddressClassification::Contract);
        assert!(!cache.is_ignored(&addr(1)));
        cache.set(addr(1), AddressClassification::Ignored);
        assert!(cache.is_ignored(&addr(1)));
        assert_eq!(cache.get(&addr(1)), Some(AddressClassification::Ignored));
    }

    #[test]
    fn checking_ignored_keeps_the_entry_fresh() {
        let cache = ClassificationCache::new(2);
        cache.set(addr(1), AddressClassification::Ignored);
        cache.set(addr(2), AddressClassification::Contract);

        assert!(cache.is_ignored(&addr(1)));
        cache.set(addr(3), AddressClassification::Contract);

        assert!(cache.is_ignored(&addr(1)));
        assert_eq!(cache.get(&addr(2)), None);
    }

    #[test]
    fn symbol_store_is_independent() {
        let cache = ClassificationCache::new(1);
        cache.set(addr(1), AddressClassification::Contract);
        cache.set_symbol(AssetId::Token(addr(9)), "DAI".to_string());
        cache.set_symbol(AssetId::Native, "ETH".to_string());

        assert_eq!(cache.symbol(&AssetId::Native).as_deref(), Some("ETH"));
        assert_eq!(cache.symbol(&AssetId::Token(addr(9))), None);
        assert_eq!(cache.get(&addr(1)), Some(AddressClassification::Contract));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache = ClassificationCache::new(0);
        cache.set(addr(1), AddressClassification::Contract);
        assert_eq!(cache.sizes(), CacheSizes { addresses: 1, symbols: 0 });
    }
}
