//! Screen identifiers and back-stack navigation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Every screen the application can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Scenarios,
    PromptEditor,
    Chat,
    Exports,
    History,
}

impl Screen {
    /// Screens reachable from the tab bar, in display order.
    pub const TABS: [Screen; 4] = [
        Screen::Scenarios,
        Screen::Chat,
        Screen::Exports,
        Screen::History,
    ];

    /// Screen every back stack starts from.
    pub const ROOT: Screen = Screen::Scenarios;

    pub fn route(self) -> &'static str {
        match self {
            Screen::Scenarios => "scenarios",
            Screen::PromptEditor => "prompt_editor",
            Screen::Chat => "chat",
            Screen::Exports => "exports",
            Screen::History => "history",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Screen::Scenarios => "Scenarios",
            Screen::PromptEditor => "Edit prompt",
            Screen::Chat => "Chat",
            Screen::Exports => "Exports",
            Screen::History => "History",
        }
    }

    /// Returns true for screens shown in the tab bar.
    pub fn is_tab(self) -> bool {
        Self::TABS.contains(&self)
    }

    /// Looks a screen up by route.
    pub fn from_route(route: &str) -> Result<Self> {
        let route = route.trim().to_lowercase();
        [
            Screen::Scenarios,
            Screen::PromptEditor,
            Screen::Chat,
            Screen::Exports,
            Screen::History,
        ]
        .into_iter()
        .find(|screen| screen.route() == route)
        .ok_or_else(|| Error::validation(format!("unknown route: {route}"), Some("route".into())))
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A back stack of screens rooted at [`Screen::ROOT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    stack: Vec<Screen>,
}

impl Navigator {
    pub fn new() -> Self {
        Self {
            stack: vec![Screen::ROOT],
        }
    }

    pub fn current(&self) -> Screen {
        self.stack.last().copied().unwrap_or(Screen::ROOT)
    }

    /// Screens from root to current.
    pub fn stack(&self) -> &[Screen] {
        &self.stack
    }

    /// Shows `screen`. Tabs pop back to the root first, and navigating to the
    /// current screen does nothing.
    pub fn navigate(&mut self, screen: Screen) {
        if self.current() == screen {
            return;
        }
        if screen.is_tab() {
            self.stack.truncate(1);
            if screen == Screen::ROOT {
                return;
            }
        }
        self.stack.push(screen);
    }

    /// Pops the current screen. Returns false at the root.
    pub fn back(&mut self) -> bool {
        if self.stack.len() > 1 {
            self.stack.pop();
            true
        } else {
            false
        }
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_round_trip() {
        for screen in [
            Screen::Scenarios,
            Screen::PromptEditor,
            Screen::Chat,
            Screen::Exports,
            Screen::History,
        ] {
            assert_eq!(Screen::from_route(screen.route()).unwrap(), screen);
        }
        assert!(Screen::from_route("settings").is_err());
        assert!(!Screen::PromptEditor.is_tab());
    }

    #[test]
    fn tabs_are_single_top() {
        let mut nav = Navigator::new();
        nav.navigate(Screen::Chat);
        nav.navigate(Screen::Chat);
        assert_eq!(nav.stack(), &[Screen::Scenarios, Screen::Chat]);

        nav.navigate(Screen::History);
        assert_eq!(nav.stack(), &[Screen::Scenarios, Screen::History]);

        nav.navigate(Screen::Scenarios);
        assert_eq!(nav.stack(), &[Screen::Scenarios]);
    }

    #[test]
    fn editor_pushes_and_back_pops() {
        let mut nav = Navigator::new();
        nav.navigate(Screen::PromptEditor);
        nav.navigate(Screen::Chat);
        assert_eq!(nav.current(), Screen::Chat);
        assert!(nav.back());
        assert_eq!(nav.current(), Screen::Scenarios);
        assert!(!nav.back());
    }
}
