//! Keyed table of shared values behind a single lock.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;

/// Map from key to `Arc<V>` with atomic find-or-create.
///
/// Every operation holds the one table lock for its full duration, so two
/// concurrent [`ConcurrentTable::find_or_insert_with`] calls for the same key
/// observe a single value.
pub struct ConcurrentTable<K, V> {
    entries: Mutex<AHashMap<K, Arc<V>>>,
}

impl<K, V> ConcurrentTable<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(AHashMap::new()),
        }
    }

    /// Insert or replace, returning the previous value.
    pub fn insert(&self, key: K, value: Arc<V>) -> Option<Arc<V>> {
        self.entries.lock().insert(key, value)
    }

    pub fn find<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.lock().get(key).cloned()
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.lock().remove(key)
    }

    /// Remove `key` only while it still maps to `expected` (pointer identity).
    pub fn remove_if_same<Q>(&self, key: &Q, expected: &Arc<V>) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut entries = self.entries.lock();
        let same = entries
            .get(key)
            .map_or(false, |current| Arc::ptr_eq(current, expected));
        if same {
            entries.remove(key);
        }
        same
    }

    /// Return the value for `key`, creating it with `create` if absent.
    ///
    /// The boolean is `true` when this call created the value. `create` runs
    /// under the table lock and must not touch the table.
    pub fn find_or_insert_with<F>(&self, key: K, create: F) -> (Arc<V>, bool)
    where
        F: FnOnce(&K) -> V,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key) {
            return (Arc::clone(existing), false);
        }
        let value = Arc::new(create(&key));
        entries.insert(key, Arc::clone(&value));
        (value, true)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry, returning how many were held.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }
}

impl<K: Eq + Hash + Clone, V> ConcurrentTable<K, V> {
    pub fn keys(&self) -> Vec<K> {
        self.entries.lock().keys().cloned().collect()
    }
}

impl<K: Eq + Hash, V> Default for ConcurrentTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for ConcurrentTable<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentTable")
            .field("len", &self.entries.lock().len())
            .finish()
    }
}
