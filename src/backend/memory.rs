//! In-memory backend
//!
//! Implements all three capabilities against a row list held in process.
//! Row-level visibility follows the managed service's policy: a caller
//! only sees and deletes their own rows, and may only insert rows they
//! own. Every call is counted and each operation can be made to fail,
//! which is what the view tests lean on.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use super::{
    AuthRedirect, AuthService, AuthorizedDataAccess, BackendError, BackendResult, ChangeEvent,
    ChangeFeed, ChangeFilter, ChangeKind, Subscription, SubscriptionHandle,
};
use crate::model::{Bookmark, BookmarkId, Identity, NewBookmark};

const SCHEMA: &str = "public";
const TABLE: &str = "bookmarks";

/// Operations that can be switched to failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    Identity,
    SignOut,
    List,
    Insert,
    Delete,
    Subscribe,
}

/// How many times each capability method was called
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub identity: usize,
    pub oauth: usize,
    pub sign_out: usize,
    pub list: usize,
    pub insert: usize,
    pub delete: usize,
    pub subscribe: usize,
    pub unsubscribe: usize,
}

#[derive(Default)]
struct Inner {
    rows: Vec<Bookmark>,
    current_user: Option<Identity>,
    subscribers: HashMap<SubscriptionHandle, (ChangeFilter, mpsc::UnboundedSender<ChangeEvent>)>,
    failing: HashMap<MemoryOp, bool>,
    calls: CallCounts,
    inserts: Vec<NewBookmark>,
    deletes: Vec<BookmarkId>,
    last_created: Option<DateTime<Utc>>,
}

impl Inner {
    fn fails(&self, op: MemoryOp) -> bool {
        self.failing.get(&op).copied().unwrap_or(false)
    }

    fn owner_matches(&self, row: &Bookmark) -> bool {
        self.current_user
            .as_ref()
            .map(|user| user.id == row.user_id)
            .unwrap_or(false)
    }

    /// Strictly increasing server timestamps
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created = match self.last_created {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_created = Some(created);
        created
    }

    fn notify(&mut self, kind: ChangeKind) {
        let event = ChangeEvent {
            kind,
            schema: SCHEMA.to_string(),
            table: TABLE.to_string(),
            commit_timestamp: Some(Utc::now().to_rfc3339()),
        };

        self.subscribers.retain(|_, (filter, sender)| {
            !filter.matches(&event) || sender.send(event.clone()).is_ok()
        });
    }
}

/// In-process implementation of every backend capability
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with a signed-in user
    pub fn signed_in(identity: Identity) -> Self {
        let backend = Self::new();
        backend.set_user(Some(identity));
        backend
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the user the service considers signed in
    pub fn set_user(&self, identity: Option<Identity>) {
        self.inner().current_user = identity;
    }

    /// Insert a row as-is, without notifying subscribers
    pub fn seed(&self, bookmark: Bookmark) {
        let mut inner = self.inner();
        if inner.last_created.map_or(true, |last| bookmark.created_at > last) {
            inner.last_created = Some(bookmark.created_at);
        }
        inner.rows.push(bookmark);
    }

    /// Make an operation fail with `Unavailable` until switched back
    pub fn set_failing(&self, op: MemoryOp, failing: bool) {
        self.inner().failing.insert(op, failing);
    }

    /// Push a change notification to matching subscribers
    pub fn emit(&self, kind: ChangeKind) {
        self.inner().notify(kind);
    }

    pub fn calls(&self) -> CallCounts {
        self.inner().calls.clone()
    }

    /// Every insert payload received, in order
    pub fn inserts(&self) -> Vec<NewBookmark> {
        self.inner().inserts.clone()
    }

    /// Every delete id received, in order
    pub fn deletes(&self) -> Vec<BookmarkId> {
        self.inner().deletes.clone()
    }

    /// All stored rows, regardless of owner
    pub fn rows(&self) -> Vec<Bookmark> {
        self.inner().rows.clone()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner().subscribers.len()
    }
}

#[async_trait]
impl AuthService for MemoryBackend {
    async fn current_identity(&self) -> BackendResult<Option<Identity>> {
        let mut inner = self.inner();
        inner.calls.identity += 1;

        if inner.fails(MemoryOp::Identity) {
            return Err(BackendError::Unavailable);
        }
        Ok(inner.current_user.clone())
    }

    async fn oauth_redirect(&self, provider: &str) -> BackendResult<AuthRedirect> {
        self.inner().calls.oauth += 1;

        Ok(AuthRedirect {
            provider: provider.to_string(),
            url: format!("memory://authorize?provider={}", urlencoding::encode(provider)),
        })
    }

    async fn sign_out(&self) -> BackendResult<()> {
        let mut inner = self.inner();
        inner.calls.sign_out += 1;

        if inner.fails(MemoryOp::SignOut) {
            return Err(BackendError::Unavailable);
        }
        inner.current_user = None;
        Ok(())
    }
}

#[async_trait]
impl AuthorizedDataAccess for MemoryBackend {
    async fn list_bookmarks(&self) -> BackendResult<Vec<Bookmark>> {
        let mut inner = self.inner();
        inner.calls.list += 1;

        if inner.fails(MemoryOp::List) {
            return Err(BackendError::Unavailable);
        }

        let mut visible: Vec<Bookmark> = inner
            .rows
            .iter()
            .filter(|row| inner.owner_matches(row))
            .cloned()
            .collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(visible)
    }

    async fn insert_bookmark(&self, bookmark: &NewBookmark) -> BackendResult<()> {
        let mut inner = self.inner();
        inner.calls.insert += 1;
        inner.inserts.push(bookmark.clone());

        if inner.fails(MemoryOp::Insert) {
            return Err(BackendError::Unavailable);
        }

        let owner_ok = inner
            .current_user
            .as_ref()
            .map(|user| user.id == bookmark.user_id)
            .unwrap_or(false);
        if !owner_ok {
            return Err(BackendError::Unauthorized(
                "new row violates row-level security policy".to_string(),
            ));
        }

        let created_at = inner.next_created_at();
        inner.rows.push(Bookmark {
            id: BookmarkId::new(uuid::Uuid::new_v4().to_string()),
            title: bookmark.title.clone(),
            url: bookmark.url.clone(),
            user_id: bookmark.user_id.clone(),
            created_at,
        });
        inner.notify(ChangeKind::Insert);

        Ok(())
    }

    async fn delete_bookmark(&self, id: &BookmarkId) -> BackendResult<()> {
        let mut inner = self.inner();
        inner.calls.delete += 1;
        inner.deletes.push(id.clone());

        if inner.fails(MemoryOp::Delete) {
            return Err(BackendError::Unavailable);
        }

        let position = inner
            .rows
            .iter()
            .position(|row| &row.id == id && inner.owner_matches(row));

        // Deleting an invisible or missing row affects nothing
        if let Some(position) = position {
            inner.rows.remove(position);
            inner.notify(ChangeKind::Delete);
        }

        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, filter: ChangeFilter) -> BackendResult<Subscription> {
        let mut inner = self.inner();
        inner.calls.subscribe += 1;

        if inner.fails(MemoryOp::Subscribe) {
            return Err(BackendError::Unavailable);
        }

        let handle = SubscriptionHandle::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.insert(handle.clone(), (filter, tx));

        Ok(Subscription { handle, events: rx })
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> BackendResult<()> {
        let mut inner = self.inner();
        inner.calls.unsubscribe += 1;

        inner
            .subscribers
            .remove(&handle)
            .map(|_| ())
            .ok_or(BackendError::Closed)
    }
}
