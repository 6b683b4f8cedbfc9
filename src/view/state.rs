//! View State Machine
//!
//! All of the bookmark view's state lives in one [`ViewState`]. It changes
//! only through [`ViewState::apply`], which takes one [`ViewEvent`] and
//! returns the [`Effect`]s the runtime has to carry out. No I/O happens
//! here.
//!
//! # Event sources
//!
//! ```text
//! auth resolution ─┐
//! fetch completion ├─► apply(event) ─► state' + effects ─► runtime
//! change feed ─────┤
//! user input ──────┘
//! ```
//!
//! The list is never patched locally: inserts and deletes converge
//! through the refetch that their change notification triggers.

use crate::backend::{AuthRedirect, BackendResult, ChangeEvent, SubscriptionHandle};
use crate::model::{Bookmark, BookmarkId, Draft, DraftCheck, Identity, NewBookmark, Session};

use super::notice::{Action, Notice};
use super::render::RenderState;

/// Shown when the url fails the prefix check
pub const INVALID_URL_ALERT: &str = "URL must start with http or https";

/// Inputs to the state machine
#[derive(Debug)]
pub enum ViewEvent {
    /// The view was created
    Mounted,
    /// Session resolution finished
    SessionResolved(BackendResult<Option<Identity>>),
    /// A list fetch finished
    ListFetched(BackendResult<Vec<Bookmark>>),
    /// The change subscription is open
    Subscribed(SubscriptionHandle),
    /// Opening the change subscription failed
    SubscriptionFailed(crate::backend::BackendError),
    /// The change stream ended without being released
    SubscriptionClosed,
    /// A row changed somewhere in the table
    ChangeNotified(ChangeEvent),
    TitleChanged(String),
    UrlChanged(String),
    AddRequested,
    AddSettled(BackendResult<()>),
    DeleteRequested(BookmarkId),
    DeleteSettled(BookmarkId, BackendResult<()>),
    LoginRequested,
    LoginSettled(BackendResult<AuthRedirect>),
    LogoutRequested,
    LogoutSettled(BackendResult<()>),
    NoticeDismissed,
    /// The view is going away
    Unmounted,
}

impl ViewEvent {
    /// Completion of a call the runtime spawned
    pub fn is_completion(&self) -> bool {
        matches!(
            self,
            ViewEvent::SessionResolved(_)
                | ViewEvent::ListFetched(_)
                | ViewEvent::AddSettled(_)
                | ViewEvent::DeleteSettled(..)
                | ViewEvent::LoginSettled(_)
                | ViewEvent::LogoutSettled(_)
        )
    }
}

/// Work the runtime performs on behalf of the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ResolveSession,
    FetchList,
    Subscribe,
    Unsubscribe,
    Insert(NewBookmark),
    Delete(BookmarkId),
    BeginLogin,
    SignOut,
}

/// Session, list, draft and flags of the bookmark view
#[derive(Debug, Clone)]
pub struct ViewState {
    session: Session,
    bookmarks: Vec<Bookmark>,
    draft: Draft,
    loading: bool,
    adding: bool,
    /// A subscription has been requested and not yet released
    subscribed: bool,
    subscription: Option<SubscriptionHandle>,
    redirect: Option<AuthRedirect>,
    notices: Vec<Notice>,
    /// OAuth provider offered on the sign-in control
    provider: String,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            session: Session::Unauthenticated,
            bookmarks: Vec::new(),
            draft: Draft::default(),
            loading: true,
            adding: false,
            subscribed: false,
            subscription: None,
            redirect: None,
            notices: Vec::new(),
            provider: "google".to_string(),
        }
    }
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Add control is disabled while an insert is in flight
    pub fn is_adding(&self) -> bool {
        self.adding
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn subscription(&self) -> Option<&SubscriptionHandle> {
        self.subscription.as_ref()
    }

    /// OAuth redirect produced by the last login request
    pub fn redirect(&self) -> Option<&AuthRedirect> {
        self.redirect.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn latest_notice(&self) -> Option<&Notice> {
        self.notices.last()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn render_state(&self) -> RenderState {
        RenderState::derive(
            self.session.is_authenticated(),
            self.loading,
            self.bookmarks.len(),
        )
    }

    /// Apply one event and return the effects to run
    pub fn apply(&mut self, event: ViewEvent) -> Vec<Effect> {
        match event {
            ViewEvent::Mounted => {
                self.loading = true;
                vec![Effect::ResolveSession]
            }

            ViewEvent::SessionResolved(Ok(Some(identity))) => self.session_gained(identity),

            ViewEvent::SessionResolved(Ok(None)) => self.session_lost(),

            ViewEvent::SessionResolved(Err(e)) => {
                tracing::warn!(error = %e, "Session resolution failed, continuing signed out");
                self.notices.push(Notice::service(Action::ResolveSession, &e));
                self.session_lost()
            }

            ViewEvent::ListFetched(result) => {
                if !self.session.is_authenticated() {
                    tracing::debug!("Discarding list fetched without a session");
                    return Vec::new();
                }

                match result {
                    Ok(bookmarks) => {
                        tracing::debug!(count = bookmarks.len(), "Bookmark list replaced");
                        self.bookmarks = bookmarks;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Bookmark fetch failed, keeping last list");
                        self.notices.push(Notice::service(Action::Fetch, &e));
                    }
                }
                self.loading = false;
                Vec::new()
            }

            ViewEvent::Subscribed(handle) => {
                if self.subscribed {
                    self.subscription = Some(handle);
                }
                Vec::new()
            }

            ViewEvent::SubscriptionFailed(e) => {
                tracing::warn!(error = %e, "Change subscription failed");
                self.subscribed = false;
                self.subscription = None;
                self.notices.push(Notice::service(Action::Subscribe, &e));
                Vec::new()
            }

            ViewEvent::SubscriptionClosed => {
                if !self.subscribed {
                    return Vec::new();
                }
                tracing::warn!("Change stream ended, live updates stopped");
                self.notices.push(Notice::service(
                    Action::Subscribe,
                    "live update channel closed",
                ));
                self.release_subscription()
            }

            ViewEvent::ChangeNotified(change) => {
                if !self.session.is_authenticated() {
                    return Vec::new();
                }
                tracing::debug!(kind = ?change.kind, table = %change.table, "Change notified, refetching");
                vec![Effect::FetchList]
            }

            ViewEvent::TitleChanged(title) => {
                self.draft.title = title;
                Vec::new()
            }

            ViewEvent::UrlChanged(url) => {
                self.draft.url = url;
                Vec::new()
            }

            ViewEvent::AddRequested => {
                if self.adding {
                    return Vec::new();
                }

                match self.draft.check(&self.session) {
                    DraftCheck::Incomplete => Vec::new(),
                    DraftCheck::InvalidUrl => {
                        self.notices
                            .push(Notice::Validation(INVALID_URL_ALERT.to_string()));
                        Vec::new()
                    }
                    DraftCheck::Ready(bookmark) => {
                        self.adding = true;
                        vec![Effect::Insert(bookmark)]
                    }
                }
            }

            ViewEvent::AddSettled(result) => {
                self.adding = false;
                match result {
                    Ok(()) => self.draft.clear(),
                    Err(e) => {
                        tracing::warn!(error = %e, "Insert failed, keeping draft");
                        self.notices.push(Notice::service(Action::Add, &e));
                    }
                }
                Vec::new()
            }

            ViewEvent::DeleteRequested(id) => vec![Effect::Delete(id)],

            ViewEvent::DeleteSettled(id, result) => {
                if let Err(e) = result {
                    tracing::warn!(bookmark_id = %id, error = %e, "Delete failed");
                    self.notices.push(Notice::service(Action::Delete, &e));
                }
                Vec::new()
            }

            ViewEvent::LoginRequested => vec![Effect::BeginLogin],

            ViewEvent::LoginSettled(Ok(redirect)) => {
                self.redirect = Some(redirect);
                Vec::new()
            }

            ViewEvent::LoginSettled(Err(e)) => {
                self.notices.push(Notice::service(Action::Login, &e));
                Vec::new()
            }

            ViewEvent::LogoutRequested => vec![Effect::SignOut],

            ViewEvent::LogoutSettled(result) => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Sign-out request failed, clearing session locally");
                    self.notices.push(Notice::service(Action::Logout, &e));
                }
                self.draft.clear();
                self.adding = false;
                self.session_lost()
            }

            ViewEvent::NoticeDismissed => {
                self.notices.clear();
                Vec::new()
            }

            ViewEvent::Unmounted => self.release_subscription(),
        }
    }

    fn session_gained(&mut self, identity: Identity) -> Vec<Effect> {
        let same_user = self
            .session
            .identity()
            .map(|current| current.id == identity.id)
            .unwrap_or(false);

        if !same_user {
            tracing::info!(user_id = %identity.id, "Session resolved");
            self.bookmarks.clear();
            self.loading = true;
        }
        self.session = Session::Authenticated(identity);

        let mut effects = vec![Effect::FetchList];
        if !self.subscribed {
            self.subscribed = true;
            effects.push(Effect::Subscribe);
        }
        effects
    }

    fn session_lost(&mut self) -> Vec<Effect> {
        if self.session.is_authenticated() {
            tracing::info!("Session ended");
        }
        self.session = Session::Unauthenticated;
        self.bookmarks.clear();
        self.loading = false;
        self.release_subscription()
    }

    fn release_subscription(&mut self) -> Vec<Effect> {
        self.subscription = None;
        if std::mem::replace(&mut self.subscribed, false) {
            vec![Effect::Unsubscribe]
        } else {
            Vec::new()
        }
    }
}
