use httpscope_tail::MonitorStats;
use httpscope_types::TopEntry;
use ratatui::{
    Frame,
    layout::{Constraint, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table},
};

use crate::app::{AppState, Snapshot, TopView};
use crate::ui::components::{StatusBar, dashboard_hints};
use crate::ui::{Layout, Theme};

/// Live statistics screen
pub struct DashboardScreen;

impl DashboardScreen {
    pub fn render(frame: &mut Frame, state: &AppState, stats: &MonitorStats) {
        let messages = Self::messages(state);
        let areas = Layout::dashboard(frame.area(), messages.len() as u16);

        Self::render_header(frame, areas.header, state.snapshot.as_ref());

        match &state.snapshot {
            Some(snapshot) => {
                Self::render_summary(frame, areas.summary, snapshot);
                Self::render_table(frame, areas.table, snapshot);
            }
            None => {
                let waiting = Paragraph::new(Span::styled("Waiting for data...", Theme::text_dim()));
                frame.render_widget(waiting, areas.summary);
            }
        }

        frame.render_widget(Paragraph::new(messages), areas.alerts);

        let mut status_bar = StatusBar::new()
            .hints(dashboard_hints())
            .right(format!("{} records", stats.delivered()));
        if stats.unmatched() > 0 {
            status_bar = status_bar.warning(format!("[{} unmatched]", stats.unmatched()));
        }
        frame.render_widget(status_bar, areas.status_bar);
    }

    fn render_header(frame: &mut Frame, area: Rect, snapshot: Option<&Snapshot>) {
        let interval = snapshot
            .map(|s| s.summary.interval_label())
            .unwrap_or_else(|| "0 seconds".to_string());

        let title = Line::from(vec![
            Span::styled("httpscope", Theme::title()),
            Span::styled(" │ ", Theme::text_dim()),
            Span::styled(
                format!("Statistics for the last {}", interval),
                Theme::text_highlight(),
            ),
        ]);
        frame.render_widget(Paragraph::new(title), area);
    }

    fn render_summary(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
        let totals = Line::from(vec![
            Span::styled("Total: ", Theme::text()),
            Span::styled(
                format!("{} hits ", snapshot.summary.hits),
                Theme::alert(snapshot.total_hits),
            ),
            Span::styled(
                format!("{} bytes transferred", snapshot.summary.size),
                Theme::alert(snapshot.total_size),
            ),
        ]);

        let statuses = Self::entry_line("Top Status Codes: ", &snapshot.statuses, |code| {
            Theme::status_code(code)
        });
        let methods = Self::entry_line("Methods: ", &snapshot.methods, |_| Theme::text());

        frame.render_widget(Paragraph::new(vec![totals, statuses, methods]), area);
    }

    fn entry_line<'a>(
        label: &'a str,
        entries: &'a [TopEntry],
        style: impl Fn(&str) -> Style,
    ) -> Line<'a> {
        let mut spans = vec![Span::styled(label, Theme::text())];
        for (key, count) in entries {
            spans.push(Span::styled(format!("{}({}) ", key, count), style(key.as_str())));
        }
        Line::from(spans)
    }

    fn render_table(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
        let view = snapshot.view;
        let header = Row::new(view.columns().iter().copied()).style(Theme::table_header());

        let rows = snapshot.rows.iter().map(|row| {
            let mut cells = vec![row.key.clone(), row.value.to_string()];
            if let Some(secondary) = row.secondary {
                cells.push(secondary.to_string());
            }
            Row::new(cells).style(Theme::alert(row.alert))
        });

        let table = Table::new(rows, Self::widths(view))
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Theme::border())
                    .title(Span::styled(format!(" {} ", view.title()), Theme::title())),
            );
        frame.render_widget(table, area);
    }

    fn widths(view: TopView) -> Vec<Constraint> {
        match view.secondary() {
            Some(_) => vec![
                Constraint::Min(20),
                Constraint::Length(12),
                Constraint::Length(14),
            ],
            None => vec![Constraint::Min(20), Constraint::Length(12)],
        }
    }

    /// Total alerts first, then any error
    fn messages(state: &AppState) -> Vec<Line<'static>> {
        let mut lines: Vec<Line<'static>> = state
            .snapshot
            .iter()
            .flat_map(|s| s.alert_messages())
            .map(|(text, alert)| Line::from(Span::styled(text, Theme::alert(alert))))
            .collect();

        if let Some(err) = &state.ui_state.error_message {
            lines.push(Line::from(Span::styled(err.clone(), Theme::error())));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{DisplayConfig, Thresholds};
    use chrono::Utc;
    use httpscope_logs::{Cumulative, Record, SharedCollector, SystemClock};
    use ratatui::{Terminal, backend::TestBackend};
    use std::sync::Arc;

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let area = buffer.area;
        let mut text = String::new();
        for y in 0..area.height {
            for x in 0..area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    fn draw(state: &AppState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let stats = MonitorStats::default();
        terminal
            .draw(|frame| DashboardScreen::render(frame, state, &stats))
            .unwrap();
        screen_text(&terminal)
    }

    #[test]
    fn test_renders_waiting_before_first_refresh() {
        let state = AppState::new(DisplayConfig::default());
        let text = draw(&state);
        assert!(text.contains("Statistics for the last 0 seconds"));
        assert!(text.contains("Waiting for data"));
    }

    #[test]
    fn test_renders_snapshot_and_alerts() {
        let collector = SharedCollector::new(Cumulative::new(Arc::new(SystemClock)));
        collector.add(Record::new("/api", Utc::now(), 120, 200, "GET"));
        collector.add(Record::new("/api", Utc::now(), 80, 503, "POST"));

        let mut state = AppState::new(DisplayConfig {
            thresholds: Thresholds {
                total_hits: Some(2),
                ..Thresholds::default()
            },
            ..DisplayConfig::default()
        });
        state.refresh(&collector);

        let text = draw(&state);
        assert!(text.contains("Total: 2 hits 200 bytes transferred"));
        assert!(text.contains("Top Status Codes:"));
        assert!(text.contains("503(1)"));
        assert!(text.contains("/api"));
        assert!(text.contains("Alert for hits"));
        assert!(text.contains("Top sections by hits"));
    }
}
