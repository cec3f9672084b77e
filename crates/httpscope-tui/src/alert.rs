use std::collections::HashSet;

/// Alert status of one key at one refresh
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlertState {
    #[default]
    Normal,
    /// At or above the threshold
    Alert,
    /// Back under the threshold for the first time after an alert
    Cleared,
}

impl AlertState {
    pub fn is_alert(&self) -> bool {
        matches!(self, AlertState::Alert)
    }
}

/// Tracks which keys are currently over a threshold across refreshes
#[derive(Debug, Default)]
pub struct AlertTracker {
    threshold: Option<u64>,
    alerted: HashSet<String>,
}

impl AlertTracker {
    /// A threshold of `None` or 0 disables the tracker
    pub fn new(threshold: Option<u64>) -> Self {
        Self {
            threshold: threshold.filter(|&t| t > 0),
            alerted: HashSet::new(),
        }
    }

    pub fn threshold(&self) -> Option<u64> {
        self.threshold
    }

    /// Replace the threshold and forget every alert
    pub fn set_threshold(&mut self, threshold: Option<u64>) {
        self.threshold = threshold.filter(|&t| t > 0);
        self.alerted.clear();
    }

    /// Record the latest value for `key`
    pub fn observe(&mut self, key: &str, value: u64) -> AlertState {
        let Some(threshold) = self.threshold else {
            return AlertState::Normal;
        };

        if value >= threshold {
            if !self.alerted.contains(key) {
                self.alerted.insert(key.to_string());
            }
            AlertState::Alert
        } else if self.alerted.remove(key) {
            AlertState::Cleared
        } else {
            AlertState::Normal
        }
    }

    /// Forget alerts for keys that were not shown this refresh
    pub fn retain_visible<'a, I>(&mut self, visible: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let visible: HashSet<&str> = visible.into_iter().collect();
        self.alerted.retain(|key| visible.contains(key.as_str()));
    }

    pub fn reset(&mut self) {
        self.alerted.clear();
    }

    pub fn is_alerted(&self, key: &str) -> bool {
        self.alerted.contains(key)
    }

    pub fn alerted_count(&self) -> usize {
        self.alerted.len()
    }
}
