mod action;
mod state;

pub use action::Action;
pub use state::{AppState, DisplayConfig, MAX_TOP_COUNT, Snapshot, Thresholds, TopRow, TopView, UiState};
