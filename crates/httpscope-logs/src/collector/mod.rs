//! Collectors aggregate records into per-dimension frequency tables

mod cumulative;
mod shared;
mod window;

pub use cumulative::{Cumulative, Totals};
pub use shared::SharedCollector;
pub use window::SlidingWindow;

use httpscope_types::{Dimension, Record, Summary, TopEntry, UriMetric};

/// Capability set shared by every collector variant.
///
/// Queries take `&mut self` because windowed collectors evict stale records
/// before answering.
pub trait Collector: Send {
    /// Aggregate one record
    fn add(&mut self, record: Record);

    /// Reverse the effect of a previously added record.
    ///
    /// Collectors that only support eviction-driven removal ignore this.
    fn remove(&mut self, _record: &Record) {}

    /// Totals and the time since the window start
    fn summary(&mut self) -> Summary;

    /// Up to `count` entries of `dimension`, highest count first
    fn top(&mut self, dimension: Dimension, count: usize) -> Vec<TopEntry>;

    /// Current hits or bytes for one URI, 0 if absent
    fn lookup(&mut self, uri: &str, metric: UriMetric) -> u64;
}

impl<C: Collector + ?Sized> Collector for Box<C> {
    fn add(&mut self, record: Record) {
        (**self).add(record)
    }

    fn remove(&mut self, record: &Record) {
        (**self).remove(record)
    }

    fn summary(&mut self) -> Summary {
        (**self).summary()
    }

    fn top(&mut self, dimension: Dimension, count: usize) -> Vec<TopEntry> {
        (**self).top(dimension, count)
    }

    fn lookup(&mut self, uri: &str, metric: UriMetric) -> u64 {
        (**self).lookup(uri, metric)
    }
}
