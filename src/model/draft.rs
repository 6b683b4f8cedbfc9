//! Add-form draft
//!
//! The draft is transient client-local input. It is checked against the
//! current session before an insert is issued:
//!
//! 1. empty title, empty url, or no session: silent no-op
//! 2. url not starting with [`URL_PREFIX`]: validation alert
//! 3. otherwise: ready to insert, tagged with the session's owner id

use super::bookmark::NewBookmark;
use super::session::Session;

/// Case-sensitive lexical prefix every submitted url must carry
pub const URL_PREFIX: &str = "http";

/// Unsaved add-form input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub title: String,
    pub url: String,
}

/// Outcome of checking a draft before submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftCheck {
    /// Preconditions hold; this is the insert to issue
    Ready(NewBookmark),
    /// A field is empty or there is no session
    Incomplete,
    /// The url does not begin with `http`
    InvalidUrl,
}

impl Draft {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.url.is_empty()
    }

    pub fn clear(&mut self) {
        self.title.clear();
        self.url.clear();
    }

    /// Check the draft against the current session.
    ///
    /// Only a prefix check is done on the url; it is not parsed.
    pub fn check(&self, session: &Session) -> DraftCheck {
        let identity = match session.identity() {
            Some(identity) if !self.title.is_empty() && !self.url.is_empty() => identity,
            _ => return DraftCheck::Incomplete,
        };

        if !self.url.starts_with(URL_PREFIX) {
            return DraftCheck::InvalidUrl;
        }

        DraftCheck::Ready(NewBookmark::new(
            self.title.clone(),
            self.url.clone(),
            identity.id.clone(),
        ))
    }
}
