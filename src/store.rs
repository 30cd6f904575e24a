use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;

/// A concurrent key-value store.
///
/// Used both as the handler registry (task type to handler) and as
/// the results store (task ID to result).  Implementations serialize
/// access internally; callers never lock around them.  Puts are
/// last-write-wins.
pub trait KvStore<K, V>: Send + Sync {
    fn put(&self, key: K, value: V);
    fn get(&self, key: &K) -> Option<V>;
}

/// An in-memory [`KvStore`] guarded by a read-write lock.
///
/// Nothing is ever evicted.
#[derive(Debug)]
pub struct MemoryStore<K, V> {
    data: RwLock<HashMap<K, V>>,
}

impl<K, V> MemoryStore<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize { self.data.read().len() }

    pub fn is_empty(&self) -> bool { self.data.read().is_empty() }
}

impl<K, V> Default for MemoryStore<K, V> {
    fn default() -> Self { Self::new() }
}

impl<K, V> KvStore<K, V> for MemoryStore<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn put(&self, key: K, value: V) { self.data.write().insert(key, value); }

    fn get(&self, key: &K) -> Option<V> { self.data.read().get(key).cloned() }
}
