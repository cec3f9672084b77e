use std::cmp::Ordering;
use std::collections::HashMap;

use httpscope_types::TopEntry;

/// Running per-key counts for one dimension
///
/// Keys whose count drops to zero are removed immediately, so the table never
/// holds zero entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: HashMap<String, u64>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `by` to the count for `key`
    pub fn increment(&mut self, key: &str, by: u64) {
        if by == 0 {
            return;
        }
        match self.counts.get_mut(key) {
            Some(count) => *count += by,
            None => {
                self.counts.insert(key.to_string(), by);
            }
        }
    }

    /// Subtract `by` from the count for `key`, deleting the entry at zero
    pub fn decrement(&mut self, key: &str, by: u64) {
        if by == 0 {
            return;
        }
        match self.counts.get_mut(key) {
            Some(count) if *count > by => *count -= by,
            Some(count) => {
                debug_assert_eq!(*count, by, "decrement below zero for key {key}");
                self.counts.remove(key);
            }
            None => debug_assert!(false, "decrement of absent key {key}"),
        }
    }

    /// Current count for `key`, 0 if absent
    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Up to `n` entries ordered by descending count.
    ///
    /// Equal counts are ordered by key.
    pub fn top(&self, n: usize) -> Vec<TopEntry> {
        if n == 0 || self.counts.is_empty() {
            return Vec::new();
        }

        let mut entries: Vec<(&String, &u64)> = self.counts.iter().collect();
        if n < entries.len() {
            entries.select_nth_unstable_by(n - 1, rank);
            entries.truncate(n);
        }
        entries.sort_unstable_by(rank);

        entries
            .into_iter()
            .map(|(key, count)| (key.clone(), *count))
            .collect()
    }

    /// Sum of all counts
    pub fn sum(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

fn rank(a: &(&String, &u64), b: &(&String, &u64)) -> Ordering {
    b.1.cmp(a.1).then_with(|| a.0.cmp(b.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_get() {
        let mut table = FrequencyTable::new();
        table.increment("/a", 1);
        table.increment("/a", 2);
        assert_eq!(table.get("/a"), 3);
        assert_eq!(table.get("/b"), 0);
    }

    #[test]
    fn test_zero_increment_creates_no_entry() {
        let mut table = FrequencyTable::new();
        table.increment("/a", 0);
        assert!(table.is_empty());
        table.decrement("/a", 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_decrement_to_zero_removes_entry() {
        let mut table = FrequencyTable::new();
        table.increment("/a", 5);
        table.decrement("/a", 2);
        assert_eq!(table.get("/a"), 3);
        table.decrement("/a", 3);
        assert_eq!(table.len(), 0);
        assert!(table.iter().all(|(_, v)| v > 0));
    }

    #[test]
    fn test_top_is_descending_and_bounded() {
        let mut table = FrequencyTable::new();
        for (key, count) in [("/a", 5), ("/b", 9), ("/c", 1), ("/d", 7)] {
            table.increment(key, count);
        }

        let top = table.top(3);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0], ("/b".to_string(), 9));
        assert_eq!(top[1], ("/d".to_string(), 7));
        assert_eq!(top[2], ("/a".to_string(), 5));

        assert_eq!(table.top(10).len(), 4);
        assert!(table.top(0).is_empty());
    }

    #[test]
    fn test_sum() {
        let mut table = FrequencyTable::new();
        table.increment("/a", 100);
        table.increment("/b", 50);
        assert_eq!(table.sum(), 150);
    }
}
