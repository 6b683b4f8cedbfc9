//! User-visible notices

use std::fmt;

/// User action a failure is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ResolveSession,
    Fetch,
    Subscribe,
    Add,
    Delete,
    Login,
    Logout,
}

impl Action {
    pub fn describe(&self) -> &'static str {
        match self {
            Action::ResolveSession => "check your session",
            Action::Fetch => "load bookmarks",
            Action::Subscribe => "keep bookmarks live",
            Action::Add => "add bookmark",
            Action::Delete => "delete bookmark",
            Action::Login => "start sign-in",
            Action::Logout => "sign out",
        }
    }
}

/// Something the user should see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Blocking validation alert; the action was not attempted
    Validation(String),
    /// A backend call failed; the view kept its last good state
    ServiceError { action: Action, message: String },
}

impl Notice {
    pub fn service(action: Action, err: impl fmt::Display) -> Self {
        Notice::ServiceError {
            action,
            message: err.to_string(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, Notice::Validation(_))
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Validation(message) => f.write_str(message),
            Notice::ServiceError { action, message } => {
                write!(f, "Could not {}: {}", action.describe(), message)
            }
        }
    }
}
