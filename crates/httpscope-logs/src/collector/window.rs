use std::collections::VecDeque;
use std::sync::Arc;

use chrono::TimeDelta;

use httpscope_types::{Clock, Dimension, Record, Summary, TopEntry, UriMetric};

use super::{Collector, Cumulative};

/// Aggregate over the records seen within the last `retention`
///
/// Records are queued in arrival order and reversed out of the owned
/// [`Cumulative`] once they fall behind `now - retention`. Every query evicts
/// first, so reads reflect the window as of the call.
pub struct SlidingWindow {
    /// Arrival-ordered records, oldest at the front
    queue: VecDeque<Record>,

    /// How long a record stays in the window
    retention: TimeDelta,

    aggregate: Cumulative,
}

impl SlidingWindow {
    pub fn new(retention: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue: VecDeque::new(),
            retention,
            aggregate: Cumulative::new(clock),
        }
    }

    /// Remove every queued record older than `now - retention`.
    ///
    /// Returns how many records were evicted.
    pub fn evict_stale(&mut self) -> usize {
        let cutoff = self.aggregate.now() - self.retention;
        let mut evicted = 0;

        while self
            .queue
            .front()
            .is_some_and(|oldest| oldest.timestamp < cutoff)
        {
            if let Some(oldest) = self.queue.pop_front() {
                self.aggregate.remove(&oldest);
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::trace!(evicted, remaining = self.queue.len(), "evicted stale records");
        }
        evicted
    }

    /// Evict, then admit `record` unless it predates the window start.
    ///
    /// Returns whether the record was admitted.
    pub fn add(&mut self, record: Record) -> bool {
        self.evict_stale();

        if record.timestamp < self.aggregate.started_at() {
            tracing::debug!(
                uri = %record.uri,
                timestamp = %record.timestamp,
                started_at = %self.aggregate.started_at(),
                "dropping record older than window start"
            );
            return false;
        }

        self.aggregate.add(&record);
        self.queue.push_back(record);
        true
    }

    pub fn summary(&mut self) -> Summary {
        self.evict_stale();
        self.aggregate.summary()
    }

    pub fn top(&mut self, dimension: Dimension, count: usize) -> Vec<TopEntry> {
        self.evict_stale();
        self.aggregate.top(dimension, count)
    }

    pub fn lookup(&mut self, uri: &str, metric: UriMetric) -> u64 {
        self.evict_stale();
        self.aggregate.lookup(uri, metric)
    }

    /// Number of records currently queued
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn retention(&self) -> TimeDelta {
        self.retention
    }

    /// The owned aggregate, as of the last eviction
    pub fn aggregate(&self) -> &Cumulative {
        &self.aggregate
    }
}

impl Collector for SlidingWindow {
    fn add(&mut self, record: Record) {
        SlidingWindow::add(self, record);
    }

    fn summary(&mut self) -> Summary {
        SlidingWindow::summary(self)
    }

    fn top(&mut self, dimension: Dimension, count: usize) -> Vec<TopEntry> {
        SlidingWindow::top(self, dimension, count)
    }

    fn lookup(&mut self, uri: &str, metric: UriMetric) -> u64 {
        SlidingWindow::lookup(self, uri, metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use httpscope_types::ManualClock;
    use proptest::prelude::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn window(retention_secs: i64) -> (SlidingWindow, ManualClock) {
        let clock = ManualClock::new(start());
        let window = SlidingWindow::new(
            TimeDelta::seconds(retention_secs),
            Arc::new(clock.clone()),
        );
        (window, clock)
    }

    fn record_at(uri: &str, offset_secs: i64) -> Record {
        Record::new(uri, start() + TimeDelta::seconds(offset_secs), 10, 200, "GET")
    }

    #[test]
    fn test_records_expire_after_retention() {
        let (mut window, clock) = window(10);
        assert!(window.add(record_at("/a", 0)));
        assert!(window.add(record_at("/b", 5)));
        assert_eq!(window.summary().hits, 2);

        // cutoff = 11s: /a (0s) is stale, /b (5s) is not
        clock.set(start() + TimeDelta::seconds(11));
        assert_eq!(window.summary().hits, 1);
        assert_eq!(window.lookup("/a", UriMetric::Hits), 0);
        assert_eq!(window.lookup("/b", UriMetric::Hits), 1);

        clock.set(start() + TimeDelta::seconds(16));
        assert_eq!(window.summary().hits, 0);
        assert!(window.is_empty());
        assert!(window.aggregate().table(Dimension::Hits).is_empty());
    }

    #[test]
    fn test_record_at_cutoff_is_kept() {
        let (mut window, clock) = window(10);
        window.add(record_at("/a", 0));
        clock.set(start() + TimeDelta::seconds(10));
        assert_eq!(window.evict_stale(), 0);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_eviction_moves_window_start_to_evicted_timestamp() {
        let (mut window, clock) = window(10);
        window.add(record_at("/a", 2));
        window.add(record_at("/a", 4));

        clock.set(start() + TimeDelta::seconds(13));
        assert_eq!(window.evict_stale(), 1);
        assert_eq!(window.aggregate().started_at(), start() + TimeDelta::seconds(2));
        assert_eq!(window.summary().interval, TimeDelta::seconds(11));
    }

    #[test]
    fn test_record_older_than_window_start_is_dropped() {
        let (mut window, clock) = window(10);
        window.add(record_at("/a", 5));
        clock.set(start() + TimeDelta::seconds(20));
        window.evict_stale();

        // started_at is now 5s; a late record stamped 3s must not be admitted
        assert!(!window.add(record_at("/late", 3)));
        assert_eq!(window.lookup("/late", UriMetric::Hits), 0);
        assert!(window.is_empty());
    }

    #[test]
    fn test_record_before_creation_is_dropped() {
        let (mut window, _) = window(60);
        // created_at is start - 1s
        assert!(!window.add(record_at("/old", -30)));
        assert!(window.add(record_at("/new", 0)));
        assert_eq!(window.summary().hits, 1);
    }

    #[test]
    fn test_top_evicts_before_answering() {
        let (mut window, clock) = window(10);
        window.add(record_at("/a", 0));
        window.add(record_at("/a", 1));
        window.add(record_at("/b", 8));

        clock.set(start() + TimeDelta::seconds(12));
        assert_eq!(window.top(Dimension::Hits, 5), vec![("/b".to_string(), 1)]);
    }

    #[test]
    fn test_works_through_collector_trait() {
        let (window, _) = window(10);
        let mut collector: Box<dyn Collector> = Box::new(window);
        collector.add(record_at("/a", 0));
        assert_eq!(collector.summary().hits, 1);
        assert_eq!(collector.lookup("/a", UriMetric::Size), 10);
    }

    proptest! {
        /// After eviction, hits equal the records stamped at or after now - T
        #[test]
        fn window_counts_recent_records(
            gaps in prop::collection::vec(1i64..5, 1..60),
            retention in 1i64..40,
            tail in 0i64..50
        ) {
            let (mut window, clock) = window(retention);
            let mut stamps = Vec::new();
            let mut offset = 0;
            for gap in gaps {
                offset += gap;
                let stamp = start() + TimeDelta::seconds(offset);
                clock.set(stamp);
                window.add(Record::new("/a", stamp, 1, 200, "GET"));
                stamps.push(stamp);
            }

            clock.advance(TimeDelta::seconds(tail));
            let cutoff = clock.now() - TimeDelta::seconds(retention);
            let expected = stamps.iter().filter(|s| **s >= cutoff).count() as u64;

            let summary = window.summary();
            prop_assert_eq!(summary.hits, expected);
            prop_assert_eq!(summary.size, expected);
            prop_assert_eq!(window.len() as u64, expected);
        }
    }
}
