//! Shared types for httpscope
//!
//! This crate contains data structures used across multiple httpscope crates.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

// ============================================================================
// Record
// ============================================================================

/// One normalized access-log line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Request URI reduced to its first path segment (`/a/b/c` -> `/a`)
    pub uri: String,

    /// Time the request was logged
    pub timestamp: DateTime<Utc>,

    /// Response body size in bytes
    pub size: u64,

    /// HTTP status code
    pub status: u16,

    /// HTTP method
    pub method: String,

    /// Referer header, if the log carried one
    pub referer: Option<String>,

    /// Authenticated user, if the log carried one
    pub user: Option<String>,
}

impl Record {
    /// Create a record with no referer or user
    pub fn new(
        uri: impl Into<String>,
        timestamp: DateTime<Utc>,
        size: u64,
        status: u16,
        method: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            timestamp,
            size,
            status,
            method: method.into(),
            referer: None,
            user: None,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Reduce a raw request URI to its first path segment.
///
/// Doubled slashes are collapsed first, so `//a//b` becomes `/a`.
pub fn normalize_uri(raw: &str) -> String {
    let collapsed = raw.replace("//", "/");
    let mut parts = collapsed.split('/');
    match (parts.next(), parts.next()) {
        (Some(first), Some(second)) => format!("{}/{}", first, second),
        (Some(first), None) => first.to_string(),
        _ => String::new(),
    }
}

// ============================================================================
// Dimensions
// ============================================================================

/// Named axis of aggregation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Hits per URI
    Hits,
    /// Bytes per URI
    Size,
    Status,
    Method,
    Referer,
    User,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Self::Hits,
        Self::Size,
        Self::Status,
        Self::Method,
        Self::Referer,
        Self::User,
    ];

    /// Index into per-dimension storage
    pub fn index(&self) -> usize {
        match self {
            Self::Hits => 0,
            Self::Size => 1,
            Self::Status => 2,
            Self::Method => 3,
            Self::Referer => 4,
            Self::User => 5,
        }
    }
}

/// The per-URI dimensions that can be looked up by key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UriMetric {
    Hits,
    Size,
}

impl From<UriMetric> for Dimension {
    fn from(metric: UriMetric) -> Self {
        match metric {
            UriMetric::Hits => Dimension::Hits,
            UriMetric::Size => Dimension::Size,
        }
    }
}

// ============================================================================
// Query results
// ============================================================================

/// Window totals reported by a collector
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Summary {
    pub hits: u64,
    pub size: u64,
    /// Time elapsed since the window start marker
    pub interval: TimeDelta,
}

impl Summary {
    /// Human readable interval, e.g. "2 minutes 5 seconds"
    pub fn interval_label(&self) -> String {
        format_interval(self.interval)
    }
}

/// One (key, count) pair returned by `top`
pub type TopEntry = (String, u64);

/// Format a duration the way the dashboard header shows it
pub fn format_interval(interval: TimeDelta) -> String {
    let total = interval.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    for (value, unit) in [
        (days, "day"),
        (hours, "hour"),
        (minutes, "minute"),
        (seconds, "second"),
    ] {
        if value > 0 {
            let plural = if value > 1 { "s" } else { "" };
            parts.push(format!("{} {}{}", value, unit, plural));
        }
    }

    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(" ")
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Source of "now" for window arithmetic
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock, shared between clones
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
