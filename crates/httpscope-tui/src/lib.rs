//! TUI components for httpscope
//!
//! This crate provides the live statistics dashboard: alert tracking,
//! state management, keybindings, event handling, and UI components.

pub mod alert;
pub mod app;
pub mod config;
pub mod tui;
pub mod ui;

pub use alert::{AlertState, AlertTracker};
pub use app::{Action, AppState, DisplayConfig, Snapshot, Thresholds, TopRow, TopView, UiState};
pub use config::{KeyBinding, KeyBindings, KeyContext};
pub use tui::{Event, EventHandler, Tui};
pub use ui::components::{HelpOverlay, StatusBar, dashboard_hints};
pub use ui::screens::DashboardScreen;
pub use ui::{Layout, Theme};
