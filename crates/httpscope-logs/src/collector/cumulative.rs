use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use httpscope_types::{Clock, Dimension, Record, Summary, TopEntry, UriMetric};

use super::Collector;
use crate::table::FrequencyTable;

/// Running totals across all dimensions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub hits: u64,
    pub size: u64,
}

/// In-memory aggregate of every record added and not yet removed
///
/// `add` and `remove` touch exactly the same tables for a given record, so
/// `totals.hits` always equals the sum of the hits table and `totals.size`
/// the sum of the size table.
pub struct Cumulative {
    totals: Totals,
    tables: [FrequencyTable; 6],
    clock: Arc<dyn Clock>,
    created_at: DateTime<Utc>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Cumulative {
    /// Create an empty aggregate. The window start is one second before now.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let created_at = now - TimeDelta::seconds(1);
        Self {
            totals: Totals::default(),
            tables: Default::default(),
            clock,
            created_at,
            started_at: created_at,
            updated_at: now,
        }
    }

    pub fn add(&mut self, record: &Record) {
        self.apply(record, Direction::Up);
        self.updated_at = self.clock.now();
    }

    /// Reverse `add` for the same record and move the window start to its timestamp
    pub fn remove(&mut self, record: &Record) {
        self.apply(record, Direction::Down);
        self.started_at = record.timestamp;
        self.updated_at = self.clock.now();
    }

    fn apply(&mut self, record: &Record, direction: Direction) {
        let status = record.status.to_string();
        let mut touch = |dimension: Dimension, key: &str, by: u64| {
            let table = &mut self.tables[dimension.index()];
            match direction {
                Direction::Up => table.increment(key, by),
                Direction::Down => table.decrement(key, by),
            }
        };

        touch(Dimension::Hits, &record.uri, 1);
        touch(Dimension::Size, &record.uri, record.size);
        touch(Dimension::Status, &status, 1);
        touch(Dimension::Method, &record.method, 1);
        if let Some(referer) = &record.referer {
            touch(Dimension::Referer, referer, 1);
        }
        if let Some(user) = &record.user {
            touch(Dimension::User, user, 1);
        }

        match direction {
            Direction::Up => {
                self.totals.hits += 1;
                self.totals.size += record.size;
            }
            Direction::Down => {
                self.totals.hits -= 1;
                self.totals.size -= record.size;
            }
        }
    }

    pub fn summary(&self) -> Summary {
        Summary {
            hits: self.totals.hits,
            size: self.totals.size,
            interval: self.clock.now() - self.started_at,
        }
    }

    pub fn top(&self, dimension: Dimension, count: usize) -> Vec<TopEntry> {
        self.tables[dimension.index()].top(count)
    }

    pub fn lookup(&self, uri: &str, metric: UriMetric) -> u64 {
        self.tables[Dimension::from(metric).index()].get(uri)
    }

    /// Move the window start to `candidate` unless it predates `created_at`
    pub fn reset_start(&mut self, candidate: DateTime<Utc>) {
        if candidate > self.created_at {
            self.started_at = candidate;
        }
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn table(&self, dimension: Dimension) -> &FrequencyTable {
        &self.tables[dimension.index()]
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

impl Collector for Cumulative {
    fn add(&mut self, record: Record) {
        Cumulative::add(self, &record);
    }

    fn remove(&mut self, record: &Record) {
        Cumulative::remove(self, record);
    }

    fn summary(&mut self) -> Summary {
        Cumulative::summary(self)
    }

    fn top(&mut self, dimension: Dimension, count: usize) -> Vec<TopEntry> {
        Cumulative::top(self, dimension, count)
    }

    fn lookup(&mut self, uri: &str, metric: UriMetric) -> u64 {
        Cumulative::lookup(self, uri, metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpscope_types::ManualClock;
    use proptest::prelude::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn aggregate() -> (Cumulative, ManualClock) {
        let clock = ManualClock::new(start());
        (Cumulative::new(Arc::new(clock.clone())), clock)
    }

    fn record(uri: &str, size: u64) -> Record {
        Record::new(uri, start(), size, 200, "GET")
    }

    fn assert_consistent(agg: &Cumulative) {
        assert_eq!(agg.totals().hits, agg.table(Dimension::Hits).sum());
        assert_eq!(agg.totals().size, agg.table(Dimension::Size).sum());
        for dim in Dimension::ALL {
            assert!(agg.table(dim).iter().all(|(_, v)| v > 0));
        }
    }

    #[test]
    fn test_concrete_example() {
        let (mut agg, _) = aggregate();
        for _ in 0..3 {
            agg.add(&record("/a", 100));
        }
        agg.add(&record("/b", 50));

        assert_eq!(agg.top(Dimension::Hits, 1), vec![("/a".to_string(), 3)]);
        assert_eq!(agg.lookup("/a", UriMetric::Size), 300);
        assert_eq!(agg.lookup("/b", UriMetric::Hits), 1);
        assert_eq!(agg.lookup("/c", UriMetric::Hits), 0);

        let summary = agg.summary();
        assert_eq!(summary.hits, 4);
        assert_eq!(summary.size, 350);
    }

    #[test]
    fn test_optional_fields_only_counted_when_present() {
        let (mut agg, _) = aggregate();
        agg.add(&record("/a", 10).with_referer("http://example.com/"));
        agg.add(&record("/a", 10).with_user("frank"));
        agg.add(&record("/a", 10));

        assert_eq!(agg.table(Dimension::Referer).sum(), 1);
        assert_eq!(agg.table(Dimension::User).sum(), 1);
        assert_eq!(agg.top(Dimension::Status, 5), vec![("200".to_string(), 3)]);
        assert_eq!(agg.top(Dimension::Method, 5), vec![("GET".to_string(), 3)]);
    }

    #[test]
    fn test_remove_deletes_zero_entries() {
        let (mut agg, _) = aggregate();
        let r = record("/a", 100).with_user("frank").with_referer("-ref-");
        agg.add(&r);
        agg.remove(&r);

        for dim in Dimension::ALL {
            assert!(agg.table(dim).is_empty(), "{:?} not empty", dim);
        }
        assert_eq!(agg.totals(), Totals::default());
    }

    #[test]
    fn test_zero_size_record() {
        let (mut agg, _) = aggregate();
        let r = record("/a", 0);
        agg.add(&r);
        assert_eq!(agg.lookup("/a", UriMetric::Hits), 1);
        assert_eq!(agg.lookup("/a", UriMetric::Size), 0);
        assert_consistent(&agg);
        agg.remove(&r);
        assert_consistent(&agg);
    }

    #[test]
    fn test_remove_advances_started_at() {
        let (mut agg, clock) = aggregate();
        let mut r = record("/a", 1);
        r.timestamp = start() + TimeDelta::seconds(5);
        agg.add(&r);
        clock.advance(TimeDelta::seconds(30));
        agg.remove(&r);

        assert_eq!(agg.started_at(), r.timestamp);
        assert_eq!(agg.updated_at(), start() + TimeDelta::seconds(30));
        assert_eq!(agg.summary().interval, TimeDelta::seconds(25));
        assert!(agg.started_at() <= agg.updated_at());
    }

    #[test]
    fn test_initial_interval_is_one_second() {
        let (agg, _) = aggregate();
        assert_eq!(agg.summary().interval, TimeDelta::seconds(1));
        assert_eq!(agg.created_at(), agg.started_at());
    }

    #[test]
    fn test_reset_start_guards_created_at() {
        let (mut agg, _) = aggregate();
        let created = agg.created_at();

        agg.reset_start(created - TimeDelta::seconds(10));
        assert_eq!(agg.started_at(), created);

        agg.reset_start(created);
        assert_eq!(agg.started_at(), created);

        let later = created + TimeDelta::seconds(30);
        agg.reset_start(later);
        assert_eq!(agg.started_at(), later);

        // Only created_at bounds the candidate, the clock does not
        let ahead = agg.now() + TimeDelta::seconds(90);
        agg.reset_start(ahead);
        assert_eq!(agg.started_at(), ahead);
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        (
            prop::sample::select(vec!["/", "/a", "/b", "/api", "/static"]),
            0u64..5000,
            prop::sample::select(vec![200u16, 301, 404, 500]),
            prop::sample::select(vec!["GET", "POST", "HEAD"]),
            prop::option::of(prop::sample::select(vec!["http://a/", "http://b/"])),
            prop::option::of(prop::sample::select(vec!["alice", "bob"])),
        )
            .prop_map(|(uri, size, status, method, referer, user)| Record {
                uri: uri.to_string(),
                timestamp: start(),
                size,
                status,
                method: method.to_string(),
                referer: referer.map(String::from),
                user: user.map(String::from),
            })
    }

    proptest! {
        /// add then remove restores every table exactly
        #[test]
        fn add_remove_round_trip(
            base in prop::collection::vec(arb_record(), 0..30),
            extra in arb_record()
        ) {
            let (mut agg, _) = aggregate();
            for r in &base {
                agg.add(r);
            }
            let before: Vec<FrequencyTable> =
                Dimension::ALL.iter().map(|d| agg.table(*d).clone()).collect();
            let totals = agg.totals();

            agg.add(&extra);
            agg.remove(&extra);

            let after: Vec<FrequencyTable> =
                Dimension::ALL.iter().map(|d| agg.table(*d).clone()).collect();
            prop_assert_eq!(before, after);
            prop_assert_eq!(totals, agg.totals());
        }

        /// Interleaved add/remove (removing only previously added records)
        /// keeps every entry positive and totals equal to table sums
        #[test]
        fn interleaved_ops_stay_consistent(
            ops in prop::collection::vec((arb_record(), any::<bool>()), 1..80)
        ) {
            let (mut agg, _) = aggregate();
            let mut live: Vec<Record> = Vec::new();

            for (r, remove) in ops {
                if remove && !live.is_empty() {
                    let victim = live.remove(0);
                    agg.remove(&victim);
                } else {
                    agg.add(&r);
                    live.push(r);
                }

                prop_assert_eq!(agg.totals().hits, agg.table(Dimension::Hits).sum());
                prop_assert_eq!(agg.totals().size, agg.table(Dimension::Size).sum());
                prop_assert_eq!(agg.totals().hits, live.len() as u64);
                for dim in Dimension::ALL {
                    prop_assert!(agg.table(dim).iter().all(|(_, v)| v > 0));
                }
            }
        }

        /// top(k) is bounded by k and sorted descending
        #[test]
        fn top_is_bounded_and_descending(
            records in prop::collection::vec(arb_record(), 0..60),
            k in 0usize..8
        ) {
            let (mut agg, _) = aggregate();
            for r in &records {
                agg.add(r);
            }
            for dim in Dimension::ALL {
                let top = agg.top(dim, k);
                prop_assert!(top.len() <= k);
                for pair in top.windows(2) {
                    prop_assert!(pair[0].1 >= pair[1].1);
                }
            }
        }
    }
}
