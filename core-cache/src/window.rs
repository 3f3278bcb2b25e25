//! Insertion-ordered map with FIFO eviction.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Map whose entries leave in the order they arrived.
///
/// Reads never reorder entries: the oldest insertion is always evicted
/// first, however often it is read.
#[derive(Debug)]
pub struct RetentionWindow<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K, V> Default for RetentionWindow<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }
}

impl<K, V> RetentionWindow<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert at the tail unless `key` is present. Returns whether it was inserted.
    pub fn put_if_absent(&mut self, key: K, value: V) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
        true
    }

    /// Remove and return the head of the window.
    pub fn evict_oldest(&mut self) -> Option<(K, V)> {
        while let Some(key) = self.order.pop_front() {
            if let Some(value) = self.entries.remove(&key) {
                return Some((key, value));
            }
        }
        None
    }

    /// Evict from the head until at most `max` entries remain.
    pub fn evict_over(&mut self, max: usize) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        while self.entries.len() > max {
            match self.evict_oldest() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys from oldest to newest.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter()
    }
}
