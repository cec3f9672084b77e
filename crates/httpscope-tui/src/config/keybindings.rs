use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;

use crate::app::{Action, TopView};

/// A key combination
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyBinding {
    pub fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::NONE,
        }
    }

    pub fn ctrl(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::CONTROL,
        }
    }

    pub fn from_event(event: &KeyEvent) -> Self {
        Self {
            code: event.code,
            modifiers: event.modifiers,
        }
    }
}

/// Context for keybindings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyContext {
    Global,
    Dashboard,
    /// Help overlay is open
    Help,
}

/// Keybinding configuration
pub struct KeyBindings {
    bindings: HashMap<KeyContext, HashMap<KeyBinding, Action>>,
}

impl KeyBindings {
    pub fn new() -> Self {
        let mut bindings = HashMap::new();

        // Global bindings
        let mut global = HashMap::new();
        global.insert(KeyBinding::new(KeyCode::Char('?')), Action::ToggleHelp);
        global.insert(KeyBinding::ctrl(KeyCode::Char('c')), Action::Quit);
        global.insert(KeyBinding::new(KeyCode::Char('q')), Action::Quit);
        bindings.insert(KeyContext::Global, global);

        // Dashboard bindings - one key per table
        let mut dashboard = HashMap::new();
        dashboard.insert(KeyBinding::new(KeyCode::Char('h')), Action::ShowView(TopView::Hits));
        dashboard.insert(KeyBinding::new(KeyCode::Char('b')), Action::ShowView(TopView::Bytes));
        dashboard.insert(
            KeyBinding::new(KeyCode::Char('r')),
            Action::ShowView(TopView::Referers),
        );
        dashboard.insert(KeyBinding::new(KeyCode::Char('u')), Action::ShowView(TopView::Users));
        dashboard.insert(KeyBinding::new(KeyCode::Char(' ')), Action::Refresh);
        dashboard.insert(KeyBinding::new(KeyCode::Esc), Action::Quit);
        bindings.insert(KeyContext::Dashboard, dashboard);

        // Help overlay swallows Esc instead of quitting
        let mut help = HashMap::new();
        help.insert(KeyBinding::new(KeyCode::Esc), Action::ToggleHelp);
        bindings.insert(KeyContext::Help, help);

        Self { bindings }
    }

    /// Look up action for key event in given context
    pub fn get_action(&self, context: KeyContext, key: &KeyEvent) -> Option<Action> {
        let binding = KeyBinding::from_event(key);

        // First check context-specific bindings
        if let Some(action) = self
            .bindings
            .get(&context)
            .and_then(|context_bindings| context_bindings.get(&binding))
        {
            return Some(action.clone());
        }

        // Fall back to global bindings
        self.bindings
            .get(&KeyContext::Global)?
            .get(&binding)
            .cloned()
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_view_keys() {
        let bindings = KeyBindings::new();
        assert_eq!(
            bindings.get_action(KeyContext::Dashboard, &key(KeyCode::Char('b'))),
            Some(Action::ShowView(TopView::Bytes))
        );
        assert_eq!(
            bindings.get_action(KeyContext::Dashboard, &key(KeyCode::Char(' '))),
            Some(Action::Refresh)
        );
    }

    #[test]
    fn test_global_fallback() {
        let bindings = KeyBindings::new();
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(bindings.get_action(KeyContext::Help, &ctrl_c), Some(Action::Quit));
        assert_eq!(
            bindings.get_action(KeyContext::Dashboard, &key(KeyCode::Char('?'))),
            Some(Action::ToggleHelp)
        );
        assert_eq!(bindings.get_action(KeyContext::Dashboard, &key(KeyCode::Char('x'))), None);
    }

    #[test]
    fn test_esc_closes_help_before_quitting() {
        let bindings = KeyBindings::new();
        assert_eq!(
            bindings.get_action(KeyContext::Help, &key(KeyCode::Esc)),
            Some(Action::ToggleHelp)
        );
        assert_eq!(
            bindings.get_action(KeyContext::Dashboard, &key(KeyCode::Esc)),
            Some(Action::Quit)
        );
        // View keys are inert while help is open
        assert_eq!(bindings.get_action(KeyContext::Help, &key(KeyCode::Char('h'))), None);
    }
}
