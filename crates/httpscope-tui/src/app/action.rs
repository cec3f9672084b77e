use crate::app::TopView;

/// All possible actions in the application (command pattern)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Quit,

    // Views
    ShowView(TopView),
    ToggleHelp,

    /// Re-query the collector right away
    Refresh,

    // Error handling
    ShowError(String),
    DismissError,

    // Tick (for periodic updates)
    Tick,

    // Render request
    Render,
}
