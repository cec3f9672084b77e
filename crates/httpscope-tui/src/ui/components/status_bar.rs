use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::Widget,
};

use crate::ui::Theme;

/// Status bar showing keyboard shortcuts on the left and counters on the right
pub struct StatusBar<'a> {
    hints: Vec<(&'a str, &'a str)>,
    warning: Option<String>,
    right_text: Option<String>,
}

impl<'a> StatusBar<'a> {
    pub fn new() -> Self {
        Self {
            hints: Vec::new(),
            warning: None,
            right_text: None,
        }
    }

    /// Add keyboard hints as (key, description) pairs
    pub fn hints<I>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.hints = hints.into_iter().collect();
        self
    }

    /// Highlighted text shown after the hints
    pub fn warning<S: Into<String>>(mut self, text: S) -> Self {
        self.warning = Some(text.into());
        self
    }

    /// Set text to display on the right side
    pub fn right<S: Into<String>>(mut self, text: S) -> Self {
        self.right_text = Some(text.into());
        self
    }
}

impl Default for StatusBar<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        buf.set_style(area, Theme::status_bar());

        let mut spans = Vec::new();
        for (i, (key, desc)) in self.hints.iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(" ", Theme::status_bar()));
            }
            spans.push(Span::styled(format!("[{}]", key), Theme::status_bar_key()));
            spans.push(Span::styled(*desc, Theme::status_bar()));
        }
        if let Some(warning) = self.warning {
            spans.push(Span::styled(" ", Theme::status_bar()));
            spans.push(Span::styled(warning, Theme::status_bar_warning()));
        }

        let line = Line::from(spans);
        let line_width = line.width() as u16;
        buf.set_line(area.x + 1, area.y, &line, area.width.saturating_sub(2));

        if let Some(right) = self.right_text {
            let right_width = Line::from(right.as_str()).width() as u16;
            let right_x = area.x + area.width.saturating_sub(right_width + 1);
            if right_x > area.x + line_width + 2 {
                let span = Span::styled(right.as_str(), Theme::status_bar());
                buf.set_span(right_x, area.y, &span, right_width);
            }
        }
    }
}

/// Hints for the dashboard screen
pub fn dashboard_hints() -> Vec<(&'static str, &'static str)> {
    vec![
        ("h", "Hits"),
        ("b", "Bytes"),
        ("r", "Referers"),
        ("u", "Users"),
        ("Space", "Refresh"),
        ("?", "Help"),
        ("q", "Quit"),
    ]
}
