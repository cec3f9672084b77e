use ratatui::layout::{Constraint, Direction, Layout as RatatuiLayout, Rect};

/// Areas of the dashboard screen
pub struct DashboardAreas {
    pub header: Rect,
    pub summary: Rect,
    pub table: Rect,
    pub alerts: Rect,
    pub status_bar: Rect,
}

/// Layout helper for consistent screen layouts
pub struct Layout;

impl Layout {
    /// Header, the totals/status/method block, the top table, alert lines and
    /// the status bar, top to bottom
    pub fn dashboard(area: Rect, alert_lines: u16) -> DashboardAreas {
        let chunks = RatatuiLayout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),           // Header
                Constraint::Length(3),           // Totals, statuses, methods
                Constraint::Min(3),              // Top table
                Constraint::Length(alert_lines), // Alert messages
                Constraint::Length(1),           // Status bar
            ])
            .split(area);

        DashboardAreas {
            header: chunks[0],
            summary: chunks[1],
            table: chunks[2],
            alerts: chunks[3],
            status_bar: chunks[4],
        }
    }

    /// Rectangle of at most `width` x `height` centered in `area`
    pub fn centered(area: Rect, width: u16, height: u16) -> Rect {
        let width = width.min(area.width.saturating_sub(4));
        let height = height.min(area.height.saturating_sub(4));
        let x = area.x + area.width.saturating_sub(width) / 2;
        let y = area.y + area.height.saturating_sub(height) / 2;
        Rect::new(x, y, width, height)
    }
}
