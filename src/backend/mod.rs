//! Backend Capabilities
//!
//! The bookmark view never talks to the network directly. It is handed
//! three capabilities, each a trait so that the managed service and the
//! in-memory test double are interchangeable:
//!
//! - [`AuthService`]: resolve, start and end the session
//! - [`AuthorizedDataAccess`]: list, insert and delete bookmark rows
//! - [`ChangeFeed`]: row-level change notifications for a table
//!
//! ## Trust boundary
//!
//! Queries issued through [`AuthorizedDataAccess`] are unscoped: no owner
//! filter is added on the client. The service's row-level security policy
//! restricts every select and delete to the caller's own rows, and an
//! implementation of this trait is a statement that such a policy is in
//! force. [`MemoryBackend`] enforces the same rule in-process.
//!
//! ## Implementations
//!
//! - [`SupabaseClient`]: GoTrue auth + PostgREST over HTTP
//! - [`RealtimeClient`]: Phoenix channel over a websocket
//! - [`MemoryBackend`]: in-process, for tests

mod error;
mod memory;
mod realtime;
mod rest;

pub use error::{BackendError, BackendResult};
pub use memory::{CallCounts, MemoryBackend, MemoryOp};
pub use realtime::{InboundMessage, PhoenixMessage, RealtimeClient, RealtimeConfig};
pub use rest::{SupabaseClient, SupabaseConfig};

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

use crate::model::{Bookmark, BookmarkId, Identity, NewBookmark};

/// Authentication capability
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Identity behind the current session, if any
    async fn current_identity(&self) -> BackendResult<Option<Identity>>;

    /// Start an OAuth redirect flow for the given provider
    async fn oauth_redirect(&self, provider: &str) -> BackendResult<AuthRedirect>;

    /// End the current session
    async fn sign_out(&self) -> BackendResult<()>;
}

/// Data access capability, scoped to the caller by the service
#[async_trait]
pub trait AuthorizedDataAccess: Send + Sync {
    /// All bookmarks visible to the caller, newest first
    async fn list_bookmarks(&self) -> BackendResult<Vec<Bookmark>>;

    /// Insert one bookmark
    async fn insert_bookmark(&self, bookmark: &NewBookmark) -> BackendResult<()>;

    /// Delete the bookmark with this id (no-op if not visible)
    async fn delete_bookmark(&self, id: &BookmarkId) -> BackendResult<()>;
}

/// Change notification capability
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a standing subscription
    async fn subscribe(&self, filter: ChangeFilter) -> BackendResult<Subscription>;

    /// Release a subscription obtained from [`ChangeFeed::subscribe`]
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> BackendResult<()>;
}

/// Where the OAuth flow continues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRedirect {
    pub provider: String,
    pub url: String,
}

/// Row operations a subscription listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventMask {
    #[default]
    All,
    Insert,
    Update,
    Delete,
}

impl EventMask {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventMask::All => "*",
            EventMask::Insert => "INSERT",
            EventMask::Update => "UPDATE",
            EventMask::Delete => "DELETE",
        }
    }

    pub fn matches(&self, kind: ChangeKind) -> bool {
        match self {
            EventMask::All => true,
            EventMask::Insert => kind == ChangeKind::Insert,
            EventMask::Update => kind == ChangeKind::Update,
            EventMask::Delete => kind == ChangeKind::Delete,
        }
    }
}

/// Table-level subscription filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub schema: String,
    pub table: String,
    pub events: EventMask,
}

impl ChangeFilter {
    /// Every insert, update and delete on `schema.table`
    pub fn all_rows(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            events: EventMask::All,
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.table == event.table && self.schema == event.schema && self.events.matches(event.kind)
    }
}

/// Row operation reported by the change feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// One row-level change notification
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    pub commit_timestamp: Option<String>,
}

/// Identifies an open subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(String);

impl SubscriptionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub(crate) fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open subscription: its handle plus the stream of notifications.
///
/// The stream ends when the subscription is released or the channel dies.
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}
