//! Binds bookmark toggles on a schedule page to a [`BookmarkModel`].
//!
//! [`BookmarkModel`]: crate::bookmarks::BookmarkModel

mod dom_binder;
mod page;

pub use dom_binder::{
    DomBinder, BOOKMARK_CLASS, EMPTY_CLASS, EVENT_ID_ATTRIBUTE, FILLED_CLASS, STATUS_ATTRIBUTE,
};
pub use page::{AttributeMutation, MutationSource, NodeId, Page, PageError};
