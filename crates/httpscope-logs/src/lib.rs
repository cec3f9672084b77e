//! Log processing for httpscope
//!
//! This crate provides access-log parsing, the cumulative and sliding-window
//! collectors, and the transports that feed them.

mod collector;
mod parser;
mod table;
mod transport;

pub use collector::{Collector, Cumulative, SharedCollector, SlidingWindow, Totals};
pub use parser::{ClfParser, LogFormat, LogParser, ParseSetupError, W3cParser};
pub use table::FrequencyTable;
pub use transport::{ChannelTransport, DirectTransport, Transport};

// Re-export types used in our public API
pub use httpscope_types::{Clock, Dimension, Record, Summary, SystemClock, TopEntry, UriMetric};
