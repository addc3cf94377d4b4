use std::sync::Arc;

/// Ordered listener table keyed by `K`.
///
/// Each listener gets a handle id at registration; removal is by handle id,
/// by key, or wholesale. Emission works on a snapshot so listeners may add or
/// remove listeners while being called.
pub(crate) struct Listeners<K, F: ?Sized> {
    next_id: u64,
    entries: Vec<Entry<K, F>>,
}

struct Entry<K, F: ?Sized> {
    id: u64,
    key: K,
    listener: Arc<F>,
}

impl<K: PartialEq, F: ?Sized> Listeners<K, F> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, key: K, listener: Arc<F>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry { id, key, listener });
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub(crate) fn remove_key(&mut self, key: &K) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.key != *key);
        before - self.entries.len()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub(crate) fn count(&self, key: &K) -> usize {
        self.entries.iter().filter(|entry| entry.key == *key).count()
    }

    /// Listeners for `key`, in registration order.
    pub(crate) fn snapshot(&self, key: &K) -> Vec<Arc<F>> {
        self.entries
            .iter()
            .filter(|entry| entry.key == *key)
            .map(|entry| Arc::clone(&entry.listener))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Callback = dyn Fn(i32) -> i32 + Send + Sync;

    #[test]
    fn snapshot_keeps_registration_order() {
        let mut table: Listeners<&str, Callback> = Listeners::new();
        table.add("a", Arc::new(|x| x + 1));
        table.add("b", Arc::new(|x| x * 10));
        table.add("a", Arc::new(|x| x + 2));

        let results: Vec<i32> = table.snapshot(&"a").iter().map(|f| f(1)).collect();
        assert_eq!(results, vec![2, 3]);
        assert_eq!(table.count(&"b"), 1);
    }

    #[test]
    fn removal_by_id_key_and_all() {
        let mut table: Listeners<&str, Callback> = Listeners::new();
        let first = table.add("a", Arc::new(|x| x));
        table.add("a", Arc::new(|x| x));
        table.add("b", Arc::new(|x| x));

        assert!(table.remove(first));
        assert!(!table.remove(first));
        assert_eq!(table.count(&"a"), 1);

        assert_eq!(table.remove_key(&"a"), 1);
        assert_eq!(table.clear(), 1);
        assert!(table.snapshot(&"b").is_empty());
    }
}
