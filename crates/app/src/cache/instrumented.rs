//! Cache region decorator that feeds [`CacheMonitor`].

use super::monitor::CacheMonitor;
use clinic_monitor_domain::RegionName;
use clinic_monitor_ports::CacheStorePort;
use std::future::Future;
use std::sync::Arc;

/// A cache region whose reads, writes, and removals are counted.
pub struct InstrumentedCache<V> {
    region: RegionName,
    store: Arc<dyn CacheStorePort<V>>,
    monitor: Arc<CacheMonitor>,
}

impl<V: 'static> InstrumentedCache<V> {
    /// Wrap `store` and register the region, using the store as size probe.
    pub fn new(
        region: RegionName,
        store: Arc<dyn CacheStorePort<V>>,
        monitor: Arc<CacheMonitor>,
    ) -> Self {
        let probe_store = Arc::clone(&store);
        monitor.register_region(&region, Some(Arc::new(move || probe_store.estimated_size())));
        Self {
            region,
            store,
            monitor,
        }
    }

    /// Region name.
    #[must_use]
    pub const fn region(&self) -> &RegionName {
        &self.region
    }

    /// Read a value, counting a hit or a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.store.get(key);
        self.monitor.on_get(&self.region, key, value.is_some());
        value
    }

    /// Store a value; entries pushed out by capacity count as evictions.
    pub fn put(&self, key: &str, value: V) {
        for evicted in self.store.put(key, value) {
            self.monitor.on_evict(&self.region, &evicted);
        }
    }

    /// Remove one entry, returning whether it was present.
    pub fn evict(&self, key: &str) -> bool {
        let removed = self.store.evict(key);
        if removed {
            self.monitor.on_evict(&self.region, key);
        }
        removed
    }

    /// Remove every entry, returning how many were removed.
    pub fn clear(&self) -> usize {
        let removed = self.store.clear();
        self.monitor
            .on_evict_many(&self.region, u64::try_from(removed).unwrap_or(u64::MAX));
        removed
    }
}

impl<V: Clone + 'static> InstrumentedCache<V> {
    /// Cache-aside read: on a miss, `load` runs and its value is stored.
    pub fn get_or_insert_with(&self, key: &str, load: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = load();
        self.put(key, value.clone());
        value
    }

    /// Async cache-aside read; a failed load stores nothing.
    pub async fn get_or_try_insert_with<E, F, Fut>(&self, key: &str, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = load().await?;
        self.put(key, value.clone());
        Ok(value)
    }
}
