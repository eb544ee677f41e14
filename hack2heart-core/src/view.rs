use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Sidebar,
    Panel,
}

/// Top-level screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum View {
    #[default]
    Welcome,
    Profile,
    Home,
    Chat,
    Explore,
    Upload,
    MyCode,
}

impl View {
    pub const ALL: [View; 7] = [
        View::Welcome,
        View::Profile,
        View::Home,
        View::Chat,
        View::Explore,
        View::Upload,
        View::MyCode,
    ];

    pub fn identifier(self) -> &'static str {
        match self {
            View::Welcome => "hack2heart.sidebar-welcome",
            View::Profile => "hack2heart.sidebar-profile",
            View::Home => "hack2heart.sidebar-home",
            View::Chat => "hack2heart.sidebar-chat",
            View::Explore => "hack2heart.panel-explore",
            View::Upload => "hack2heart.panel-upload",
            View::MyCode => "hack2heart.panel-mycode",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            View::Welcome => "welcome",
            View::Profile => "profile",
            View::Home => "home",
            View::Chat => "chat",
            View::Explore => "explore",
            View::Upload => "upload",
            View::MyCode => "mycode",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            View::Welcome => "Welcome Sidebar",
            View::Profile => "Profile Sidebar",
            View::Home => "Home Sidebar",
            View::Chat => "Chat Sidebar",
            View::Explore => "Explore Panel",
            View::Upload => "Upload Panel",
            View::MyCode => "My Code Panel",
        }
    }

    pub fn surface(self) -> Surface {
        match self {
            View::Welcome | View::Profile | View::Home | View::Chat => Surface::Sidebar,
            View::Explore | View::Upload | View::MyCode => Surface::Panel,
        }
    }

    /// Exact lookup by canonical identifier or short name.
    pub fn parse(identifier: &str) -> Option<Self> {
        let identifier = identifier.trim();
        if identifier == "my-code" {
            return Some(View::MyCode);
        }
        View::ALL
            .into_iter()
            .find(|view| view.identifier() == identifier || view.short_name() == identifier)
    }

    /// Lookup that falls back to [`View::Welcome`] for anything unrecognised.
    pub fn from_identifier(identifier: &str) -> Self {
        Self::parse(identifier).unwrap_or_default()
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Current screen plus its free-form options (e.g. a chat room id).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewRouter {
    current: View,
    options: Option<Value>,
}

impl ViewRouter {
    pub fn new(initial: Option<&str>) -> Self {
        Self {
            current: initial.map(View::from_identifier).unwrap_or_default(),
            options: None,
        }
    }

    pub fn current(&self) -> View {
        self.current
    }

    pub fn options(&self) -> Option<&Value> {
        self.options.as_ref()
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.as_ref()?.get(key)?.as_str()
    }

    /// Replace the view and options wholesale. Previous options are dropped
    /// even when the new message carries none.
    pub fn route(&mut self, identifier: &str, options: Option<Value>) -> View {
        self.current = View::from_identifier(identifier);
        self.options = options;
        self.current
    }

    pub fn show(&mut self, view: View, options: Option<Value>) {
        self.current = view;
        self.options = options;
    }
}
