//! Data model
//!
//! Plain data types shared by the backend capabilities and the view:
//!
//! - **bookmark**: `Bookmark` rows and the `NewBookmark` insert payload
//! - **session**: the resolved `Session` (authenticated identity or none)
//! - **draft**: client-local add-form input and its validation

pub mod bookmark;
pub mod draft;
pub mod session;

pub use bookmark::{Bookmark, BookmarkId, NewBookmark};
pub use draft::{Draft, DraftCheck, URL_PREFIX};
pub use session::{Identity, Session, UserId};
