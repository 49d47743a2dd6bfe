//! Time-bounded in-memory cache of reconciled medication records.
//!
//! Keys are normalized medication names; values carry their insertion
//! instant and entries older than the TTL behave as misses on read. There
//! is no eviction beyond TTL-on-read: entries for names nobody asks about
//! again sit in memory until process restart, which is acceptable for the
//! bounded vocabulary of medication names this service sees.
//!
//! The cache is shared across requests; two requests racing on the same
//! missing key may both re-resolve it, and the later write wins. That is
//! deliberate — availability over hit-rate precision.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::schema::ReconciledRecord;

#[derive(Debug, Clone)]
struct CacheEntry {
    record: ReconciledRecord,
    created_at: Instant,
}

/// Concurrent TTL map from normalized name to reconciled record.
#[derive(Debug, Clone)]
pub struct MedicationCache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl MedicationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Return the record for `key` only if it is younger than the TTL.
    /// Stale entries are indistinguishable from absent ones.
    pub fn get(&self, key: &str) -> Option<ReconciledRecord> {
        let store = self.inner.read().unwrap();
        let entry = store.get(key)?;
        if entry.created_at.elapsed() < self.ttl {
            tracing::debug!("cache hit for '{}'", key);
            Some(entry.record.clone())
        } else {
            tracing::debug!("cache entry for '{}' is stale", key);
            None
        }
    }

    /// Unconditional overwrite, timestamped now.
    pub fn set(&self, key: &str, record: ReconciledRecord) {
        let mut store = self.inner.write().unwrap();
        store.insert(
            key.to_string(),
            CacheEntry {
                record,
                created_at: Instant::now(),
            },
        );
        tracing::debug!("cached record for '{}'", key);
    }

    /// Number of entries currently held, fresh or stale.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get_returns_record_unchanged() {
        let cache = MedicationCache::new(Duration::from_secs(60));
        let record = ReconciledRecord::default_for("ibuprofen");
        cache.set("ibuprofen", record.clone());

        let got = cache.get("ibuprofen").unwrap();
        assert_eq!(got.name, record.name);
        assert_eq!(got.confidence, record.confidence);
        assert_eq!(got.data_source, record.data_source);
    }

    #[test]
    fn test_missing_key_is_none() {
        let cache = MedicationCache::new(Duration::from_secs(60));
        assert!(cache.get("aspirin").is_none());
    }

    #[test]
    fn test_expired_entry_behaves_as_miss() {
        let cache = MedicationCache::new(Duration::from_millis(10));
        cache.set("aspirin", ReconciledRecord::default_for("aspirin"));
        assert!(cache.get("aspirin").is_some());

        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("aspirin").is_none());
        // The stale entry is still physically present until overwritten.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_set_overwrites() {
        let cache = MedicationCache::new(Duration::from_secs(60));
        cache.set("aspirin", ReconciledRecord::default_for("aspirin"));
        let mut updated = ReconciledRecord::default_for("aspirin");
        updated.confidence = 0.9;
        cache.set("aspirin", updated);

        assert_eq!(cache.get("aspirin").unwrap().confidence, 0.9);
        assert_eq!(cache.len(), 1);
    }
}
