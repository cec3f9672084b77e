use ratatui::style::{Color, Modifier, Style};

use crate::alert::AlertState;

/// Color theme for the application
pub struct Theme;

impl Theme {
    // Base colors
    pub const BG: Color = Color::Reset;
    pub const FG: Color = Color::White;
    pub const FG_DIM: Color = Color::DarkGray;

    // Accent colors
    pub const PRIMARY: Color = Color::Cyan;
    pub const HIGHLIGHT: Color = Color::Yellow;

    // Alert colors
    pub const ALERT: Color = Color::Red;
    pub const ALERT_CLEARED: Color = Color::Green;

    // Status code classes
    pub const STATUS_2XX: Color = Color::Green;
    pub const STATUS_3XX: Color = Color::Yellow;
    pub const STATUS_4XX: Color = Color::Cyan;
    pub const STATUS_5XX: Color = Color::Red;

    pub fn border() -> Style {
        Style::default().fg(Self::FG_DIM)
    }

    // Text styles
    pub fn title() -> Style {
        Style::default()
            .fg(Self::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text() -> Style {
        Style::default().fg(Self::FG)
    }

    pub fn text_dim() -> Style {
        Style::default().fg(Self::FG_DIM)
    }

    pub fn text_highlight() -> Style {
        Style::default()
            .fg(Self::HIGHLIGHT)
            .add_modifier(Modifier::BOLD)
    }

    /// Reversed bar above the top table
    pub fn table_header() -> Style {
        Style::default().add_modifier(Modifier::REVERSED | Modifier::BOLD)
    }

    /// Style for a value depending on its alert state
    pub fn alert(state: AlertState) -> Style {
        match state {
            AlertState::Normal => Self::text(),
            AlertState::Alert => Style::default()
                .fg(Self::ALERT)
                .add_modifier(Modifier::BOLD),
            AlertState::Cleared => Style::default().fg(Self::ALERT_CLEARED),
        }
    }

    /// Color for an HTTP status code by class
    pub fn status_code(code: &str) -> Style {
        let color = match code.as_bytes().first() {
            Some(b'2') => Self::STATUS_2XX,
            Some(b'3') => Self::STATUS_3XX,
            Some(b'4') => Self::STATUS_4XX,
            Some(b'5') => Self::STATUS_5XX,
            _ => Self::FG,
        };
        Style::default().fg(color)
    }

    // Status bar
    pub fn status_bar() -> Style {
        Style::default().fg(Self::FG_DIM).bg(Color::DarkGray)
    }

    pub fn status_bar_key() -> Style {
        Style::default()
            .fg(Self::HIGHLIGHT)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD)
    }

    pub fn status_bar_warning() -> Style {
        Style::default()
            .fg(Self::ALERT)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD)
    }

    // Error
    pub fn error() -> Style {
        Style::default().fg(Self::ALERT).add_modifier(Modifier::BOLD)
    }
}
