use dashmap::DashMap;

/// Keyed record storage shared by the gate components.
///
/// Every closure runs while the implementation holds exclusive access to the
/// key, so a read-then-write inside one call is atomic with respect to other
/// requests touching the same key. Different keys may proceed in parallel.
pub trait RecordStore<V>: Send + Sync {
    /// Create the record with `init` if absent, then mutate it with `f`.
    fn upsert<R>(&self, key: &str, init: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R;

    /// Mutate the record if present. Returns `None` when the key is absent.
    fn update<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R>;

    fn insert(&self, key: String, value: V);

    /// Take the record out of the store.
    fn remove(&self, key: &str) -> Option<V>;

    /// Keep only the records for which `keep` returns true.
    fn retain(&self, keep: impl FnMut(&str, &mut V) -> bool);

    fn len(&self) -> usize;
}

// In-process store backed by a sharded concurrent map
pub struct MemoryStore<V> {
    map: DashMap<String, V>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send + Sync> RecordStore<V> for MemoryStore<V> {
    fn upsert<R>(&self, key: &str, init: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R {
        // entry() holds the shard write lock until the guard drops
        let mut entry = self.map.entry(key.to_string()).or_insert_with(init);
        f(entry.value_mut())
    }

    fn update<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.map.get_mut(key).map(|mut entry| f(entry.value_mut()))
    }

    fn insert(&self, key: String, value: V) {
        self.map.insert(key, value);
    }

    fn remove(&self, key: &str) -> Option<V> {
        self.map.remove(key).map(|(_, value)| value)
    }

    fn retain(&self, mut keep: impl FnMut(&str, &mut V) -> bool) {
        self.map.retain(|key, value| keep(key, value));
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn upsert_creates_then_mutates() {
        let store = MemoryStore::<u32>::new();
        let first = store.upsert("a", || 0, |v| {
            *v += 1;
            *v
        });
        let second = store.upsert("a", || 100, |v| {
            *v += 1;
            *v
        });
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn update_skips_missing_keys() {
        let store = MemoryStore::<u32>::new();
        assert_eq!(store.update("missing", |v| *v), None);
        store.insert("present".to_string(), 7);
        assert_eq!(store.update("present", |v| *v), Some(7));
    }

    #[test]
    fn remove_is_single_take() {
        let store = MemoryStore::<u32>::new();
        store.insert("k".to_string(), 1);
        assert_eq!(store.remove("k"), Some(1));
        assert_eq!(store.remove("k"), None);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn retain_drops_rejected_records() {
        let store = MemoryStore::<u32>::new();
        for i in 0..10 {
            store.insert(format!("k{}", i), i);
        }
        store.retain(|_, v| *v % 2 == 0);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn concurrent_upserts_do_not_lose_increments() {
        let store = Arc::new(MemoryStore::<u32>::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        store.upsert("shared", || 0, |v| *v += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.update("shared", |v| *v), Some(8000));
    }
}
