//! Key/value cache region contract.

/// One named cache region.
///
/// Values are cloned out so that callers never hold a lock on the store.
pub trait CacheStorePort<V>: Send + Sync {
    /// Unexpired value for `key`.
    fn get(&self, key: &str) -> Option<V>;

    /// Insert or replace a value; returns keys evicted to make room.
    fn put(&self, key: &str, value: V) -> Vec<Box<str>>;

    /// Remove `key`; returns true when an entry was removed.
    fn evict(&self, key: &str) -> bool;

    /// Remove every entry; returns how many were removed.
    fn clear(&self) -> usize;

    /// Best-effort entry count, `None` when unknown.
    fn estimated_size(&self) -> Option<u64>;
}
