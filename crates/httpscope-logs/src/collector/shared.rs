use std::sync::Arc;

use parking_lot::Mutex;

use httpscope_types::{Dimension, Record, Summary, TopEntry, UriMetric};

use super::Collector;

/// Thread-safe handle to one collector
///
/// Every call takes the lock once and holds it for the whole operation,
/// including any eviction the collector performs, so readers never observe a
/// record that has left the queue but not yet the counters.
#[derive(Clone)]
pub struct SharedCollector {
    inner: Arc<Mutex<Box<dyn Collector>>>,
}

impl SharedCollector {
    pub fn new<C: Collector + 'static>(collector: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(collector))),
        }
    }

    pub fn add(&self, record: Record) {
        self.inner.lock().add(record);
    }

    pub fn remove(&self, record: &Record) {
        self.inner.lock().remove(record);
    }

    pub fn summary(&self) -> Summary {
        self.inner.lock().summary()
    }

    pub fn top(&self, dimension: Dimension, count: usize) -> Vec<TopEntry> {
        self.inner.lock().top(dimension, count)
    }

    pub fn lookup(&self, uri: &str, metric: UriMetric) -> u64 {
        self.inner.lock().lookup(uri, metric)
    }

    /// Run several queries under a single lock acquisition
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Collector) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut **guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::SlidingWindow;
    use chrono::{TimeDelta, Utc};
    use httpscope_types::SystemClock;
    use std::thread;

    #[test]
    fn test_concurrent_producer_and_reader_stay_consistent() {
        let window = SlidingWindow::new(TimeDelta::milliseconds(50), Arc::new(SystemClock));
        let shared = SharedCollector::new(window);

        let producer = {
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 0..2000u64 {
                    let uri = format!("/{}", i % 7);
                    shared.add(Record::new(uri, Utc::now(), i % 13, 200, "GET"));
                }
            })
        };

        let reader = {
            let shared = shared.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    shared.with(|c| {
                        let summary = c.summary();
                        let hits: u64 = c.top(Dimension::Hits, usize::MAX).iter().map(|e| e.1).sum();
                        let size: u64 = c.top(Dimension::Size, usize::MAX).iter().map(|e| e.1).sum();
                        assert_eq!(summary.hits, hits);
                        assert_eq!(summary.size, size);
                    });
                }
            })
        };

        producer.join().unwrap();
        reader.join().unwrap();
    }

    #[test]
    fn test_with_sees_one_snapshot() {
        let window = SlidingWindow::new(TimeDelta::seconds(60), Arc::new(SystemClock));
        let shared = SharedCollector::new(window);
        shared.add(Record::new("/a", Utc::now(), 100, 200, "GET"));

        let (hits, size) = shared.with(|c| {
            (
                c.lookup("/a", UriMetric::Hits),
                c.lookup("/a", UriMetric::Size),
            )
        });
        assert_eq!((hits, size), (1, 100));
    }
}
