//! Bookmark view runtime
//!
//! Owns a [`ViewState`] and carries out the effects it asks for. Backend
//! calls run as spawned tasks that post their result back onto one event
//! queue; the runtime applies queued events one at a time, so state is
//! only ever touched from here.
//!
//! The change subscription is the one resource with a lifetime. It sits
//! in an `Option` and is released with `take()`, which makes a second
//! release a no-op. Its forwarding task is aborted on release and when
//! the runtime is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::{
    AuthService, AuthorizedDataAccess, BackendError, ChangeFeed, ChangeFilter, SubscriptionHandle,
};
use crate::model::BookmarkId;

use super::state::{Effect, ViewEvent, ViewState};

/// The capabilities the view is handed
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<dyn AuthService>,
    pub data: Arc<dyn AuthorizedDataAccess>,
    pub changes: Arc<dyn ChangeFeed>,
}

impl Services {
    pub fn new(
        auth: Arc<dyn AuthService>,
        data: Arc<dyn AuthorizedDataAccess>,
        changes: Arc<dyn ChangeFeed>,
    ) -> Self {
        Self {
            auth,
            data,
            changes,
        }
    }

    /// One backend serving all three capabilities
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: AuthService + AuthorizedDataAccess + ChangeFeed + 'static,
    {
        Self {
            auth: backend.clone(),
            data: backend.clone(),
            changes: backend,
        }
    }
}

/// Per-view settings
#[derive(Debug, Clone)]
pub struct ViewOptions {
    /// OAuth provider used by login
    pub provider: String,
    /// What the change subscription listens to
    pub filter: ChangeFilter,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            filter: ChangeFilter::all_rows("public", "bookmarks"),
        }
    }
}

struct ActiveSubscription {
    handle: SubscriptionHandle,
    forwarder: JoinHandle<()>,
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// The bookmark view: state plus the machinery that drives it
pub struct BookmarkView {
    state: ViewState,
    services: Services,
    options: ViewOptions,
    events_tx: mpsc::UnboundedSender<ViewEvent>,
    events_rx: mpsc::UnboundedReceiver<ViewEvent>,
    subscription: Option<ActiveSubscription>,
    /// Spawned backend calls whose completion has not been applied yet
    in_flight: usize,
}

impl BookmarkView {
    pub fn new(services: Services, options: ViewOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            state: ViewState::with_provider(options.provider.clone()),
            services,
            options,
            events_tx,
            events_rx,
            subscription: None,
            in_flight: 0,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Backend calls still outstanding
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub async fn mount(&mut self) {
        tracing::debug!("Mounting bookmark view");
        self.dispatch(ViewEvent::Mounted).await;
    }

    /// Release the subscription. Safe to call more than once.
    pub async fn unmount(&mut self) {
        tracing::debug!("Unmounting bookmark view");
        self.dispatch(ViewEvent::Unmounted).await;
        // Release anything the state machine no longer tracks
        if self.subscription.is_some() {
            self.execute(Effect::Unsubscribe).await;
        }
    }

    pub async fn set_draft(&mut self, title: impl Into<String>, url: impl Into<String>) {
        self.dispatch(ViewEvent::TitleChanged(title.into())).await;
        self.dispatch(ViewEvent::UrlChanged(url.into())).await;
    }

    pub async fn add(&mut self) {
        self.dispatch(ViewEvent::AddRequested).await;
    }

    pub async fn delete(&mut self, id: BookmarkId) {
        self.dispatch(ViewEvent::DeleteRequested(id)).await;
    }

    pub async fn login(&mut self) {
        self.dispatch(ViewEvent::LoginRequested).await;
    }

    pub async fn logout(&mut self) {
        self.dispatch(ViewEvent::LogoutRequested).await;
    }

    /// Apply one event and run what it produces
    pub async fn dispatch(&mut self, event: ViewEvent) {
        if event.is_completion() {
            self.in_flight = self.in_flight.saturating_sub(1);
        }

        let effects = self.state.apply(event);
        for effect in effects {
            self.execute(effect).await;
        }
    }

    /// Wait for the next queued event and apply it
    pub async fn step(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.dispatch(event).await;
        }
    }

    /// Apply events until no backend call is outstanding and the queue
    /// is empty
    pub async fn settle(&mut self) {
        loop {
            if self.in_flight > 0 {
                self.step().await;
                continue;
            }

            match self.events_rx.try_recv() {
                Ok(event) => self.dispatch(event).await,
                Err(_) => break,
            }
        }
    }

    /// Settle, then keep applying events until none arrives for `quiet`.
    ///
    /// Change notifications travel separately from call completions, so a
    /// mutation's refetch can land after [`BookmarkView::settle`] returns.
    pub async fn settle_quiet(&mut self, quiet: Duration) {
        loop {
            self.settle().await;

            match tokio::time::timeout(quiet, self.events_rx.recv()).await {
                Ok(Some(event)) => self.dispatch(event).await,
                _ => break,
            }
        }
    }

    /// Apply events as they arrive until `shutdown` resolves, calling
    /// `on_render` after each one, then unmount.
    pub async fn run_until<S, R>(&mut self, shutdown: S, mut on_render: R)
    where
        S: Future<Output = ()>,
        R: FnMut(&ViewState),
    {
        tokio::pin!(shutdown);
        on_render(&self.state);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => {
                            self.dispatch(event).await;
                            on_render(&self.state);
                        }
                        None => break,
                    }
                }
            }
        }

        self.unmount().await;
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::ResolveSession => {
                let auth = self.services.auth.clone();
                self.spawn_call(
                    async move { ViewEvent::SessionResolved(auth.current_identity().await) },
                    |e| ViewEvent::SessionResolved(Err(e)),
                );
            }
            Effect::FetchList => {
                let data = self.services.data.clone();
                self.spawn_call(
                    async move { ViewEvent::ListFetched(data.list_bookmarks().await) },
                    |e| ViewEvent::ListFetched(Err(e)),
                );
            }
            Effect::Insert(bookmark) => {
                let data = self.services.data.clone();
                self.spawn_call(
                    async move { ViewEvent::AddSettled(data.insert_bookmark(&bookmark).await) },
                    |e| ViewEvent::AddSettled(Err(e)),
                );
            }
            Effect::Delete(id) => {
                let data = self.services.data.clone();
                let settled_id = id.clone();
                self.spawn_call(
                    async move {
                        let result = data.delete_bookmark(&id).await;
                        ViewEvent::DeleteSettled(id, result)
                    },
                    move |e| ViewEvent::DeleteSettled(settled_id, Err(e)),
                );
            }
            Effect::BeginLogin => {
                let auth = self.services.auth.clone();
                let provider = self.options.provider.clone();
                self.spawn_call(
                    async move { ViewEvent::LoginSettled(auth.oauth_redirect(&provider).await) },
                    |e| ViewEvent::LoginSettled(Err(e)),
                );
            }
            Effect::SignOut => {
                let auth = self.services.auth.clone();
                self.spawn_call(
                    async move { ViewEvent::LogoutSettled(auth.sign_out().await) },
                    |e| ViewEvent::LogoutSettled(Err(e)),
                );
            }
            Effect::Subscribe => self.open_subscription().await,
            Effect::Unsubscribe => self.release_subscription().await,
        }
    }

    /// Run `call` on its own task. Every spawned call posts exactly one
    /// completion; if the task dies, `on_abort` builds it instead.
    fn spawn_call<F, A>(&mut self, call: F, on_abort: A)
    where
        F: Future<Output = ViewEvent> + Send + 'static,
        A: FnOnce(BackendError) -> ViewEvent + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let event = match tokio::spawn(call).await {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(error = %e, "Backend call aborted");
                    on_abort(BackendError::Aborted(e.to_string()))
                }
            };
            // Receiver only goes away with the view
            let _ = tx.send(event);
        });
    }

    async fn open_subscription(&mut self) {
        let subscription = match self.services.changes.subscribe(self.options.filter.clone()).await {
            Ok(subscription) => subscription,
            Err(e) => {
                let _ = self.events_tx.send(ViewEvent::SubscriptionFailed(e));
                return;
            }
        };

        let handle = subscription.handle;
        let mut events = subscription.events;
        let tx = self.events_tx.clone();

        let forwarder = tokio::spawn(async move {
            while let Some(change) = events.recv().await {
                if tx.send(ViewEvent::ChangeNotified(change)).is_err() {
                    return;
                }
            }
            let _ = tx.send(ViewEvent::SubscriptionClosed);
        });

        tracing::info!(subscription = %handle, "Change subscription open");
        let _ = self.events_tx.send(ViewEvent::Subscribed(handle.clone()));

        // A previous subscription that was never released goes first
        if let Some(previous) = self.subscription.replace(ActiveSubscription { handle, forwarder }) {
            self.unsubscribe(previous).await;
        }
    }

    async fn release_subscription(&mut self) {
        if let Some(active) = self.subscription.take() {
            self.unsubscribe(active).await;
        }
    }

    async fn unsubscribe(&self, active: ActiveSubscription) {
        let handle = active.handle.clone();
        drop(active);

        match self.services.changes.unsubscribe(handle.clone()).await {
            Ok(()) => tracing::info!(subscription = %handle, "Change subscription released"),
            Err(e) => {
                tracing::warn!(subscription = %handle, error = %e, "Failed to release subscription")
            }
        }
    }
}

impl Drop for BookmarkView {
    fn drop(&mut self) {
        if let Some(active) = self.subscription.take() {
            tracing::debug!(subscription = %active.handle, "View dropped with open subscription");
        }
    }
}
