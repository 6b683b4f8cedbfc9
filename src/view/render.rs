//! Terminal rendering of the bookmark view

use std::fmt::Write;

use super::state::ViewState;

pub const HEADER: &str = "🔖 Smart Bookmark Manager";
pub const LOADING_TEXT: &str = "Loading bookmarks...";
pub const EMPTY_TEXT: &str = "No bookmarks yet. Add your first one 🚀";

/// Which branch of the view is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Unauthenticated,
    AuthenticatedLoading,
    AuthenticatedEmpty,
    AuthenticatedPopulated,
}

impl RenderState {
    /// Derive the branch from its three drivers. Loading wins over the
    /// list length so a stale list is never shown while loading.
    pub fn derive(authenticated: bool, loading: bool, len: usize) -> Self {
        match (authenticated, loading, len) {
            (false, _, _) => RenderState::Unauthenticated,
            (true, true, _) => RenderState::AuthenticatedLoading,
            (true, false, 0) => RenderState::AuthenticatedEmpty,
            (true, false, _) => RenderState::AuthenticatedPopulated,
        }
    }
}

/// Label of the sign-in control for an OAuth provider
pub fn sign_in_label(provider: &str) -> String {
    let name = match provider {
        "github" => "GitHub".to_string(),
        "gitlab" => "GitLab".to_string(),
        "linkedin" | "linkedin_oidc" => "LinkedIn".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    };
    format!("Sign in with {}", name)
}

/// Label of the add control
pub fn add_label(state: &ViewState) -> &'static str {
    if state.is_adding() {
        "Adding..."
    } else {
        "Add"
    }
}

/// Render the view as plain text
pub fn render(state: &ViewState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", HEADER);
    let _ = writeln!(out);

    match state.session().identity() {
        None => {
            let _ = writeln!(out, "[ {} ]", sign_in_label(state.provider()));
            if let Some(redirect) = state.redirect() {
                let _ = writeln!(out, "Open this link to continue: {}", redirect.url);
            }
        }
        Some(identity) => {
            let _ = writeln!(out, "Logged in as {}    [ Logout ]", identity.display_name());
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Title: {:<24} URL: {:<32} [ {} ]",
                state.draft().title,
                state.draft().url,
                add_label(state)
            );
            let _ = writeln!(out);

            match state.render_state() {
                RenderState::AuthenticatedLoading => {
                    let _ = writeln!(out, "{}", LOADING_TEXT);
                }
                RenderState::AuthenticatedEmpty => {
                    let _ = writeln!(out, "{}", EMPTY_TEXT);
                }
                _ => {
                    for bookmark in state.bookmarks() {
                        let _ = writeln!(out, "• {}", bookmark.title);
                        let _ = writeln!(out, "  {}", bookmark.url);
                        let _ = writeln!(out, "  id: {}", bookmark.id);
                    }
                }
            }
        }
    }

    if let Some(notice) = state.latest_notice() {
        let _ = writeln!(out);
        let _ = writeln!(out, "! {}", notice);
    }

    out
}
