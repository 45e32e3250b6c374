//! In-memory cache region with LRU capacity and expire-after-write.

use clinic_monitor_ports::{CacheStorePort, ClockPort};
use clinic_monitor_shared::{ErrorCode, ErrorEnvelope, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// One named region held in memory.
pub struct MemoryCacheStore<V> {
    max_entries: usize,
    ttl: Duration,
    clock: Arc<dyn ClockPort>,
    state: Mutex<StoreState<V>>,
}

struct StoreState<V> {
    entries: HashMap<Box<str>, StoreEntry<V>>,
    order: VecDeque<Box<str>>,
}

struct StoreEntry<V> {
    value: V,
    written_at: Duration,
}

impl<V> MemoryCacheStore<V> {
    /// Create a region holding at most `max_entries` values for `ttl` each.
    pub fn new(max_entries: usize, ttl: Duration, clock: Arc<dyn ClockPort>) -> Result<Self> {
        if max_entries == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "cache max_entries must be greater than zero",
            ));
        }
        if ttl.is_zero() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "cache ttl must be greater than zero",
            ));
        }
        Ok(Self {
            max_entries,
            ttl,
            clock,
            state: Mutex::new(StoreState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        })
    }

    fn touch(state: &mut StoreState<V>, key: &str) {
        if let Some(position) = state.order.iter().position(|entry| entry.as_ref() == key) {
            state.order.remove(position);
        }
        state.order.push_back(key.into());
    }

    fn forget(state: &mut StoreState<V>, key: &str) -> bool {
        if let Some(position) = state.order.iter().position(|entry| entry.as_ref() == key) {
            state.order.remove(position);
        }
        state.entries.remove(key).is_some()
    }
}

impl<V: Clone + Send> CacheStorePort<V> for MemoryCacheStore<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let expired = now.saturating_sub(state.entries.get(key)?.written_at) >= self.ttl;
        if expired {
            Self::forget(&mut state, key);
            return None;
        }
        Self::touch(&mut state, key);
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    fn put(&self, key: &str, value: V) -> Vec<Box<str>> {
        let written_at = self.clock.now();
        let mut state = self.state.lock();
        state.entries.insert(key.into(), StoreEntry { value, written_at });
        Self::touch(&mut state, key);

        let mut evicted = Vec::new();
        while state.entries.len() > self.max_entries {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            if state.entries.remove(&oldest).is_some() {
                evicted.push(oldest);
            }
        }
        evicted
    }

    fn evict(&self, key: &str) -> bool {
        Self::forget(&mut self.state.lock(), key)
    }

    fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.entries.len();
        state.entries.clear();
        state.order.clear();
        removed
    }

    fn estimated_size(&self) -> Option<u64> {
        u64::try_from(self.state.lock().entries.len()).ok()
    }
}
