//! Bookmark View
//!
//! The single component of the application. It bootstraps the session,
//! keeps the bookmark list in sync with the backend, dispatches user
//! mutations and derives what should be shown.
//!
//! - [`state`]: pure state machine, events in, effects out
//! - [`runtime`]: executes effects against the backend capabilities
//! - [`render`]: render-state derivation and text output
//! - [`notice`]: user-visible alerts and recoverable errors

pub mod notice;
pub mod render;
pub mod runtime;
pub mod state;

pub use notice::{Action, Notice};
pub use render::{render, sign_in_label, RenderState};
pub use runtime::{BookmarkView, Services, ViewOptions};
pub use state::{Effect, ViewEvent, ViewState, INVALID_URL_ALERT};
