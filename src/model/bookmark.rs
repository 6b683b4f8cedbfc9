//! Bookmark rows
//!
//! A bookmark is owned by exactly one user and is never mutated in place:
//! it is created by an insert and destroyed by a delete. Identifiers and
//! `created_at` are assigned by the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::session::UserId;

/// Opaque bookmark identifier, as assigned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkId(String);

impl BookmarkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookmarkId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A stored bookmark as returned by the data access layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub title: String,
    pub url: String,
    /// Owner of the row
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; `id` and `created_at` are filled in by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: UserId,
}

impl NewBookmark {
    pub fn new(title: impl Into<String>, url: impl Into<String>, user_id: UserId) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookmark_deserialize_row() {
        let json = r#"{
            "id": "6f1c2a9e-0000-4000-8000-000000000001",
            "title": "Rust",
            "url": "https://www.rust-lang.org",
            "user_id": "user-1",
            "created_at": "2024-01-01T12:00:00+00:00"
        }"#;
        let bookmark: Bookmark = serde_json::from_str(json).unwrap();

        assert_eq!(bookmark.id.as_str(), "6f1c2a9e-0000-4000-8000-000000000001");
        assert_eq!(bookmark.title, "Rust");
        assert_eq!(bookmark.user_id, UserId::new("user-1"));
        assert_eq!(bookmark.created_at.timestamp(), 1704110400);
    }

    #[test]
    fn test_new_bookmark_serializes_owner() {
        let new = NewBookmark::new("A", "http://a", UserId::new("owner"));
        let json = serde_json::to_value(&new).unwrap();

        assert_eq!(json["title"], "A");
        assert_eq!(json["url"], "http://a");
        assert_eq!(json["user_id"], "owner");
        assert!(json.get("id").is_none());
    }
}
