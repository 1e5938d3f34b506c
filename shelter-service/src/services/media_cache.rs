use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
    time::Instant,
};
use uuid::Uuid;

/// Escalation level at which scavenging drops everything.
const FULL_CLEAR_LEVEL: u32 = 3;

struct Record {
    value: Arc<[u8]>,
    timestamp: Instant,
}

#[derive(Default)]
struct Inner {
    records: HashMap<Uuid, Record>,
    index: BTreeMap<Instant, Vec<Uuid>>,
    current_size: u64,
}

impl Inner {
    fn insert(&mut self, key: Uuid, value: Arc<[u8]>) {
        let timestamp = Instant::now();
        self.current_size += value.len() as u64;
        self.index.entry(timestamp).or_default().push(key);
        self.records.insert(key, Record { value, timestamp });
    }

    fn remove(&mut self, key: &Uuid) -> bool {
        let Some(record) = self.records.remove(key) else {
            return false;
        };
        self.current_size -= record.value.len() as u64;
        if let Some(keys) = self.index.get_mut(&record.timestamp) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.index.remove(&record.timestamp);
            }
        }
        true
    }

    fn scavenge(&mut self, level: u32) {
        if level >= FULL_CLEAR_LEVEL {
            self.records.clear();
            self.index.clear();
            self.current_size = 0;
            return;
        }

        let buckets = self.index.len();
        let to_evict = buckets * (3 + level as usize) / 10;
        for _ in 0..to_evict {
            let Some((_, keys)) = self.index.pop_first() else {
                break;
            };
            for key in keys {
                if let Some(record) = self.records.remove(&key) {
                    self.current_size -= record.value.len() as u64;
                }
            }
        }
    }
}

/// Bounded in-process cache of media bytes.
///
/// Not an LRU: reads do not refresh a record. When a new record does not fit,
/// the oldest 30%, 40% then 50% of insertion-time buckets are evicted in turn,
/// and finally the whole cache.
pub struct MediaCache {
    max_size: u64,
    record_limit: u64,
    inner: Mutex<Inner>,
}

impl MediaCache {
    pub fn new(max_size: u64, record_limit: u64) -> Self {
        Self {
            max_size,
            record_limit,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Insert `value` unless it is already resident or exceeds a size ceiling.
    pub fn add(&self, key: Uuid, value: impl Into<Arc<[u8]>>) {
        let value: Arc<[u8]> = value.into();
        let size = value.len() as u64;
        if size > self.record_limit || size > self.max_size {
            tracing::debug!(blob_id = %key, size, "Media record too large to cache");
            return;
        }

        let Ok(mut inner) = self.inner.lock() else {
            tracing::error!("Media cache mutex poisoned");
            return;
        };
        if inner.records.contains_key(&key) {
            return;
        }

        let mut level = 0;
        while inner.current_size + size > self.max_size {
            tracing::debug!(level, current_size = inner.current_size, "Scavenging media cache");
            inner.scavenge(level);
            level += 1;
        }
        inner.insert(key, value);
    }

    pub fn get(&self, key: &Uuid) -> Option<Arc<[u8]>> {
        let inner = self.inner.lock().ok()?;
        inner.records.get(key).map(|r| Arc::clone(&r.value))
    }

    pub fn delete(&self, key: &Uuid) -> bool {
        self.inner
            .lock()
            .map(|mut inner| inner.remove(key))
            .unwrap_or(false)
    }

    /// Evict at the given escalation level. Level 3 and above clears the cache.
    pub fn scavenge(&self, level: u32) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.scavenge(level);
        }
    }

    pub fn current_size(&self) -> u64 {
        self.inner.lock().map(|i| i.current_size).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}
