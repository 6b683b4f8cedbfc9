//! # Smartmarks
//!
//! Smart Bookmark Manager - a live-updating, per-user bookmark list over a
//! managed Postgres backend.
//!
//! ## Features
//!
//! - **Delegated auth**: OAuth sign-in and sessions live in the backend
//! - **Row-level ownership**: every query is scoped to the caller by the
//!   backend's security policy
//! - **Live updates**: a realtime channel triggers a full refetch on any
//!   insert, update or delete
//! - **Pure view logic**: one state machine, events in, effects out
//!
//! ## Modules
//!
//! - [`model`]: bookmarks, sessions and the add-form draft
//! - [`backend`]: capability traits plus REST, realtime and in-memory
//!   implementations
//! - [`view`]: the bookmark view state machine, runtime and renderer
//! - [`config`]: TOML configuration with environment overrides
//! - [`session_store`]: access token persistence between runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smartmarks::backend::MemoryBackend;
//! use smartmarks::model::Identity;
//! use smartmarks::view::{render, BookmarkView, Services, ViewOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = Arc::new(MemoryBackend::signed_in(Identity::new("u1", None)));
//!     let mut view = BookmarkView::new(Services::from_backend(backend), ViewOptions::default());
//!
//!     view.mount().await;
//!     view.set_draft("Rust", "https://www.rust-lang.org").await;
//!     view.add().await;
//!     view.settle_quiet(std::time::Duration::from_millis(100)).await;
//!
//!     println!("{}", render(view.state()));
//!     view.unmount().await;
//! }
//! ```

pub mod backend;
pub mod config;
pub mod logging;
pub mod model;
pub mod session_store;
pub mod view;

// Re-export top-level types for convenience
pub use model::{Bookmark, BookmarkId, Draft, DraftCheck, Identity, NewBookmark, Session, UserId};

pub use backend::{
    AuthRedirect, AuthService, AuthorizedDataAccess, BackendError, BackendResult, ChangeEvent,
    ChangeFeed, ChangeFilter, ChangeKind, EventMask, MemoryBackend, RealtimeClient,
    SupabaseClient, SupabaseConfig, Subscription, SubscriptionHandle,
};

pub use view::{
    render, Action, BookmarkView, Effect, Notice, RenderState, Services, ViewEvent, ViewOptions,
    ViewState,
};

pub use config::{
    generate_default_config, AuthConfig, BackendConfig, Config, ConfigError, LoggingConfig,
    RealtimeConfig as ConfigRealtimeConfig,
};

pub use session_store::{SessionStore, SessionStoreError, StoredSession};
