use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use httpscope_logs::{Dimension, SharedCollector, Summary, TopEntry, UriMetric};

use super::Action;
use crate::alert::{AlertState, AlertTracker};

/// Largest top-N the dashboard renders
pub const MAX_TOP_COUNT: usize = 15;

/// Entries shown in the status code and method lines
const SUMMARY_TOP: usize = 5;

/// Which ranking the main table shows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TopView {
    /// URIs by hits, with bytes alongside
    #[default]
    Hits,
    /// URIs by bytes, with hits alongside
    Bytes,
    Referers,
    Users,
}

impl TopView {
    pub fn dimension(&self) -> Dimension {
        match self {
            TopView::Hits => Dimension::Hits,
            TopView::Bytes => Dimension::Size,
            TopView::Referers => Dimension::Referer,
            TopView::Users => Dimension::User,
        }
    }

    /// Metric looked up per row for the extra column
    pub fn secondary(&self) -> Option<UriMetric> {
        match self {
            TopView::Hits => Some(UriMetric::Size),
            TopView::Bytes => Some(UriMetric::Hits),
            TopView::Referers | TopView::Users => None,
        }
    }

    /// Column headers: key, value, then the secondary column if any
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            TopView::Hits => &["URI", "Hits", "Bytes"],
            TopView::Bytes => &["URI", "Bytes", "Hits"],
            TopView::Referers => &["Referer", "Hits"],
            TopView::Users => &["User", "Hits"],
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TopView::Hits => "Top sections by hits",
            TopView::Bytes => "Top sections by bytes",
            TopView::Referers => "Top referers",
            TopView::Users => "Top users",
        }
    }
}

/// Alert thresholds; `None` or 0 disables one
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Thresholds {
    pub total_hits: Option<u64>,
    pub total_size: Option<u64>,
    /// Per-section hits
    pub hits: Option<u64>,
    /// Per-section bytes
    pub size: Option<u64>,
}

impl Thresholds {
    fn for_view(&self, view: TopView) -> Option<u64> {
        match view {
            TopView::Hits => self.hits,
            TopView::Bytes => self.size,
            TopView::Referers | TopView::Users => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DisplayConfig {
    pub refresh: Duration,
    pub top_count: usize,
    pub thresholds: Thresholds,
}

impl DisplayConfig {
    /// Requested top-N, capped to what fits on screen
    pub fn top_count(&self) -> usize {
        self.top_count.min(MAX_TOP_COUNT)
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh: Duration::from_secs(10),
            top_count: 12,
            thresholds: Thresholds::default(),
        }
    }
}

/// One row of the main table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopRow {
    pub key: String,
    pub value: u64,
    pub secondary: Option<u64>,
    pub alert: AlertState,
}

/// Everything rendered for one refresh, read under a single collector lock
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub summary: Summary,
    pub statuses: Vec<TopEntry>,
    pub methods: Vec<TopEntry>,
    pub view: TopView,
    pub rows: Vec<TopRow>,
    pub total_hits: AlertState,
    pub total_size: AlertState,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Alert lines for the totals, in display order
    pub fn alert_messages(&self) -> Vec<(String, AlertState)> {
        [
            (self.total_hits, "hits"),
            (self.total_size, "bytes transferred"),
        ]
        .into_iter()
        .filter_map(|(state, what)| match state {
            AlertState::Alert => Some((format!("Alert for {}", what), state)),
            AlertState::Cleared => Some((format!("Alert cleared for {}", what), state)),
            AlertState::Normal => None,
        })
        .collect()
    }
}

/// UI-specific transient state
#[derive(Debug, Default)]
pub struct UiState {
    /// Is help overlay visible?
    pub help_visible: bool,

    /// Error message to display (if any)
    pub error_message: Option<String>,
}

/// Global application state
pub struct AppState {
    pub config: DisplayConfig,

    /// Current ranking in the main table
    pub view: TopView,

    /// Last refresh result, `None` before the first one
    pub snapshot: Option<Snapshot>,

    pub ui_state: UiState,

    /// Whether app should quit
    pub should_quit: bool,

    /// Dirty flag for rendering - only render when true
    pub render_dirty: bool,

    last_refresh: Option<Instant>,
    refresh_requested: bool,

    total_hits_alert: AlertTracker,
    total_size_alert: AlertTracker,
    row_alerts: AlertTracker,
}

impl AppState {
    pub fn new(config: DisplayConfig) -> Self {
        let view = TopView::default();
        let thresholds = config.thresholds;

        Self {
            view,
            snapshot: None,
            ui_state: UiState::default(),
            should_quit: false,
            render_dirty: true,
            last_refresh: None,
            refresh_requested: true,
            total_hits_alert: AlertTracker::new(thresholds.total_hits),
            total_size_alert: AlertTracker::new(thresholds.total_size),
            row_alerts: AlertTracker::new(thresholds.for_view(view)),
            config,
        }
    }

    /// Apply a user or timer action
    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Quit => {
                self.should_quit = true;
            }
            Action::ShowView(view) => {
                self.set_view(view);
            }
            Action::ToggleHelp => {
                self.ui_state.help_visible = !self.ui_state.help_visible;
                self.render_dirty = true;
            }
            Action::Refresh => {
                self.refresh_requested = true;
            }
            Action::ShowError(msg) => {
                self.show_error(msg);
            }
            Action::DismissError => {
                self.dismiss_error();
            }
            Action::Tick => {}
            Action::Render => {
                self.render_dirty = true;
            }
        }
    }

    /// Switch the main table. Alerts of the previous table are forgotten.
    pub fn set_view(&mut self, view: TopView) {
        if view == self.view {
            return;
        }
        self.view = view;
        self.row_alerts
            .set_threshold(self.config.thresholds.for_view(view));
        self.refresh_requested = true;
    }

    /// Whether the collector should be queried now
    pub fn refresh_due(&self, now: Instant) -> bool {
        if self.refresh_requested {
            return true;
        }
        match self.last_refresh {
            Some(last) => now.duration_since(last) >= self.config.refresh,
            None => true,
        }
    }

    /// Query the collector and update alert state
    pub fn refresh(&mut self, collector: &SharedCollector) {
        let view = self.view;
        let count = self.config.top_count();

        let (summary, statuses, methods, ranked) = collector.with(|c| {
            let summary = c.summary();
            let statuses = c.top(Dimension::Status, SUMMARY_TOP);
            let methods = c.top(Dimension::Method, SUMMARY_TOP);
            let ranked: Vec<(String, u64, Option<u64>)> = c
                .top(view.dimension(), count)
                .into_iter()
                .map(|(key, value)| {
                    let secondary = view.secondary().map(|metric| c.lookup(&key, metric));
                    (key, value, secondary)
                })
                .collect();
            (summary, statuses, methods, ranked)
        });

        let total_hits = self.total_hits_alert.observe("hits", summary.hits);
        let total_size = self.total_size_alert.observe("size", summary.size);

        let rows: Vec<TopRow> = ranked
            .into_iter()
            .map(|(key, value, secondary)| {
                let alert = self.row_alerts.observe(&key, value);
                TopRow {
                    key,
                    value,
                    secondary,
                    alert,
                }
            })
            .collect();
        self.row_alerts
            .retain_visible(rows.iter().map(|row| row.key.as_str()));

        self.snapshot = Some(Snapshot {
            summary,
            statuses,
            methods,
            view,
            rows,
            total_hits,
            total_size,
            taken_at: Utc::now(),
        });
        self.last_refresh = Some(Instant::now());
        self.refresh_requested = false;
        self.render_dirty = true;
    }

    /// Show an error message
    pub fn show_error(&mut self, msg: String) {
        self.ui_state.error_message = Some(msg);
        self.render_dirty = true;
    }

    /// Dismiss the error message
    pub fn dismiss_error(&mut self) {
        self.ui_state.error_message = None;
        self.render_dirty = true;
    }

    pub fn row_alerts(&self) -> &AlertTracker {
        &self.row_alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpscope_logs::{Cumulative, Record, SystemClock};
    use std::sync::Arc;

    fn collector_with(records: &[(&str, u64, u16, &str)]) -> SharedCollector {
        let collector = SharedCollector::new(Cumulative::new(Arc::new(SystemClock)));
        for (uri, size, status, method) in records {
            collector.add(Record::new(*uri, Utc::now(), *size, *status, *method));
        }
        collector
    }

    fn config(thresholds: Thresholds) -> DisplayConfig {
        DisplayConfig {
            thresholds,
            ..DisplayConfig::default()
        }
    }

    #[test]
    fn test_refresh_builds_snapshot() {
        let collector = collector_with(&[
            ("/a", 100, 200, "GET"),
            ("/a", 100, 200, "GET"),
            ("/a", 100, 404, "POST"),
            ("/b", 50, 200, "GET"),
        ]);
        let mut state = AppState::new(DisplayConfig::default());
        state.refresh(&collector);

        let snapshot = state.snapshot.as_ref().unwrap();
        assert_eq!(snapshot.summary.hits, 4);
        assert_eq!(snapshot.summary.size, 350);
        assert_eq!(snapshot.statuses[0], ("200".to_string(), 3));
        assert_eq!(snapshot.methods[0], ("GET".to_string(), 3));
        assert_eq!(snapshot.rows[0].key, "/a");
        assert_eq!(snapshot.rows[0].value, 3);
        assert_eq!(snapshot.rows[0].secondary, Some(300));
        assert!(snapshot.alert_messages().is_empty());
    }

    #[test]
    fn test_bytes_view_looks_up_hits() {
        let collector = collector_with(&[("/a", 10, 200, "GET"), ("/b", 500, 200, "GET")]);
        let mut state = AppState::new(DisplayConfig::default());
        state.apply(Action::ShowView(TopView::Bytes));
        assert!(state.refresh_due(Instant::now()));
        state.refresh(&collector);

        let rows = &state.snapshot.as_ref().unwrap().rows;
        assert_eq!(rows[0].key, "/b");
        assert_eq!(rows[0].value, 500);
        assert_eq!(rows[0].secondary, Some(1));
    }

    #[test]
    fn test_total_alert_then_cleared_once() {
        let collector = collector_with(&[("/a", 1, 200, "GET"), ("/a", 1, 200, "GET")]);
        let mut state = AppState::new(config(Thresholds {
            total_hits: Some(2),
            ..Thresholds::default()
        }));

        state.refresh(&collector);
        let snapshot = state.snapshot.as_ref().unwrap();
        assert_eq!(snapshot.total_hits, AlertState::Alert);
        assert_eq!(snapshot.alert_messages()[0].0, "Alert for hits");

        collector.remove(&Record::new("/a", Utc::now(), 1, 200, "GET"));
        state.refresh(&collector);
        let snapshot = state.snapshot.as_ref().unwrap();
        assert_eq!(snapshot.total_hits, AlertState::Cleared);
        assert_eq!(snapshot.alert_messages()[0].0, "Alert cleared for hits");

        state.refresh(&collector);
        assert_eq!(state.snapshot.as_ref().unwrap().total_hits, AlertState::Normal);
    }

    #[test]
    fn test_switching_view_clears_row_alerts() {
        let collector = collector_with(&[("/a", 10, 200, "GET"), ("/a", 10, 200, "GET")]);
        let mut state = AppState::new(config(Thresholds {
            hits: Some(2),
            ..Thresholds::default()
        }));

        state.refresh(&collector);
        assert_eq!(state.snapshot.as_ref().unwrap().rows[0].alert, AlertState::Alert);
        assert!(state.row_alerts().is_alerted("/a"));

        state.apply(Action::ShowView(TopView::Referers));
        assert_eq!(state.row_alerts().alerted_count(), 0);
        state.refresh(&collector);
        assert!(state.snapshot.as_ref().unwrap().rows.is_empty());
    }

    #[test]
    fn test_top_count_is_capped() {
        let records: Vec<(String, u64)> = (0..20).map(|i| (format!("/s{}", i), i)).collect();
        let collector = SharedCollector::new(Cumulative::new(Arc::new(SystemClock)));
        for (uri, size) in &records {
            collector.add(Record::new(uri.as_str(), Utc::now(), *size, 200, "GET"));
        }

        let mut state = AppState::new(DisplayConfig {
            top_count: 50,
            ..DisplayConfig::default()
        });
        state.refresh(&collector);
        assert_eq!(state.snapshot.as_ref().unwrap().rows.len(), MAX_TOP_COUNT);
    }

    #[test]
    fn test_refresh_due_follows_interval() {
        let collector = collector_with(&[]);
        let mut state = AppState::new(DisplayConfig {
            refresh: Duration::from_secs(10),
            ..DisplayConfig::default()
        });
        assert!(state.refresh_due(Instant::now()));

        state.refresh(&collector);
        let now = Instant::now();
        assert!(!state.refresh_due(now));
        assert!(state.refresh_due(now + Duration::from_secs(10)));

        state.apply(Action::Refresh);
        assert!(state.refresh_due(now));
    }

    #[test]
    fn test_quit_and_help_actions() {
        let mut state = AppState::new(DisplayConfig::default());
        state.apply(Action::ToggleHelp);
        assert!(state.ui_state.help_visible);
        state.apply(Action::ToggleHelp);
        assert!(!state.ui_state.help_visible);
        state.apply(Action::Quit);
        assert!(state.should_quit);
    }
}
