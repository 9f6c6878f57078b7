//! Last-known-value cache shared between poll loops and readers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use crate::snmp::{Oid, SnmpTarget};

/// Stable identity of one polled quantity.
///
/// SNMP keys are `host:port:oid`, so two data sources pointing at the same
/// agent counter share a key. Other backends use `source:interface:metric`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn snmp(target: &SnmpTarget, oid: &Oid) -> Self {
        Self(format!("{}:{}:{}", target.host, target.port, oid))
    }

    pub fn named(data_source: &str, interface: &str, metric: &str) -> Self {
        Self(format!("{}:{}:{}", data_source, interface, metric))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Latest value per key. No history, no expiry: a value stays visible until
/// the next successful poll replaces it.
#[derive(Debug, Default)]
pub struct MetricCache {
    entries: RwLock<HashMap<CacheKey, u64>>,
}

impl MetricCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &CacheKey, value: u64) {
        // Entries are plain values, so a poisoned lock is still consistent.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.clone(), value);
    }

    /// `None` means the key has never been written.
    pub fn get(&self, key: &CacheKey) -> Option<u64> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).copied()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_get_unknown_key() {
        let cache = MetricCache::new();
        assert_eq!(cache.get(&CacheKey::named("ds", "eth0", "in")), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_overwrites() {
        let cache = MetricCache::new();
        let key = CacheKey::named("ds", "eth0", "in");
        cache.set(&key, 10);
        cache.set(&key, 20);
        assert_eq!(cache.get(&key), Some(20));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_snmp_key_ignores_community() {
        let oid: Oid = "1.3.6.1.2.1.2.2.1.10.1".parse().unwrap();
        let a = SnmpTarget {
            host: "10.0.0.1".to_string(),
            port: 161,
            community: "public".to_string(),
        };
        let b = SnmpTarget {
            community: "private".to_string(),
            ..a.clone()
        };
        assert_eq!(CacheKey::snmp(&a, &oid), CacheKey::snmp(&b, &oid));
        assert_eq!(
            CacheKey::snmp(&a, &oid).to_string(),
            "10.0.0.1:161:1.3.6.1.2.1.2.2.1.10.1"
        );
    }

    #[test]
    fn test_concurrent_writers_distinct_keys() {
        let cache = Arc::new(MetricCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let key = CacheKey::named("ds", &format!("eth{}", i), "in");
                    for v in 0..1000 {
                        cache.set(&key, v);
                        assert!(cache.get(&key).is_some());
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 8);
        assert_eq!(cache.get(&CacheKey::named("ds", "eth3", "in")), Some(999));
    }
}
