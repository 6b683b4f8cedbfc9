//! Session types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque user identifier issued by the auth service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The authenticated user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: UserId::new(id),
            email,
        }
    }

    /// Name shown in the "Logged in as" line
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Resolved session state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    Authenticated(Identity),
    #[default]
    Unauthenticated,
}

impl Session {
    pub fn from_identity(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => Session::Authenticated(identity),
            None => Session::Unauthenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated(_))
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Session::Authenticated(identity) => Some(identity),
            Session::Unauthenticated => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_identity() {
        let session = Session::from_identity(Some(Identity::new("u1", None)));
        assert!(session.is_authenticated());
        assert_eq!(session.identity().unwrap().id.as_str(), "u1");

        let session = Session::from_identity(None);
        assert_eq!(session, Session::Unauthenticated);
        assert!(session.identity().is_none());
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let with_email = Identity::new("u1", Some("ada@example.com".to_string()));
        assert_eq!(with_email.display_name(), "ada@example.com");

        let without_email = Identity::new("u1", None);
        assert_eq!(without_email.display_name(), "u1");
    }
}
