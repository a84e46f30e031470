use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, warn};

use super::page::{MutationSource, NodeId, Page, PageError};
use crate::bookmarks::{BookmarkModel, StatusChange, Subscription};

pub const BOOKMARK_CLASS: &str = "bookmark";
pub const FILLED_CLASS: &str = "is-filled";
pub const EMPTY_CLASS: &str = "is-empty";
pub const EVENT_ID_ATTRIBUTE: &str = "data-event-id";
pub const STATUS_ATTRIBUTE: &str = "bookmark-status";

struct Binding {
    button: NodeId,
    container: NodeId,
    event_id: String,
    _subscription: Subscription,
}

/// Keeps the bookmark toggles of a page in step with a model.
///
/// Clicks and external edits of a container's `bookmark-status` attribute are
/// written to the model; model changes, local or synchronized, are reflected
/// back onto the page. Dropping the binder releases its model subscriptions.
pub struct DomBinder {
    model: Arc<BookmarkModel>,
    page: Arc<Mutex<Page>>,
    bindings: Vec<Binding>,
}

impl DomBinder {
    /// Binds every `button.bookmark` on the page.
    ///
    /// A toggle without an enclosing `[data-event-id]` container is left
    /// disabled; the rest of the page is still bound.
    pub fn bind(model: Arc<BookmarkModel>, page: Arc<Mutex<Page>>) -> Result<Self, PageError> {
        let mut bindings = Vec::new();
        let weak_page = Arc::downgrade(&page);
        {
            let mut page = page.lock().unwrap();
            for button in page.query_by_class(BOOKMARK_CLASS) {
                let Some(container) = page.closest_with_attribute(button, EVENT_ID_ATTRIBUTE)?
                else {
                    warn!(
                        "Bookmark toggle {:?} has no enclosing [{}] element, leaving it disabled",
                        button, EVENT_ID_ATTRIBUTE
                    );
                    continue;
                };
                let event_id = page
                    .attribute(container, EVENT_ID_ATTRIBUTE)?
                    .unwrap_or_default()
                    .to_string();

                render(&mut page, button, container, model.get_status(&event_id))?;
                page.set_disabled(button, false)?;

                let subscription = model.on_change(&event_id, {
                    let page = weak_page.clone();
                    move |change: &StatusChange| reflect(&page, button, container, change.bookmarked)
                });
                bindings.push(Binding {
                    button,
                    container,
                    event_id,
                    _subscription: subscription,
                });
            }
            // The initial render is not a user edit
            page.take_mutations();
        }
        info!("Bound {} bookmark toggles", bindings.len());

        Ok(Self {
            model,
            page,
            bindings,
        })
    }

    pub fn bound_count(&self) -> usize {
        self.bindings.len()
    }

    /// Toggles the bookmark behind a button, as a user click would.
    /// Returns the new value, or None if the button is not bound.
    pub fn click(&self, button: NodeId) -> Result<Option<bool>, PageError> {
        let Some(binding) = self.bindings.iter().find(|b| b.button == button) else {
            debug!("Click on unbound node {:?}", button);
            return Ok(None);
        };
        let bookmarked = {
            let mut page = self.page.lock().unwrap();
            let bookmarked = !is_status_true(page.attribute(binding.container, STATUS_ATTRIBUTE)?);
            render(&mut page, binding.button, binding.container, bookmarked)?;
            bookmarked
        };
        // Page lock released: the model notifies synchronously and the
        // callback takes it again
        self.model.set_status(&binding.event_id, bookmarked);
        Ok(Some(bookmarked))
    }

    /// Forwards `bookmark-status` edits made by the page itself to the model.
    ///
    /// Edits written by the binder are skipped so that reflecting model state
    /// onto the page never loops back. Returns the number of edits forwarded.
    pub fn flush_mutations(&self) -> Result<usize, PageError> {
        let mut updates = Vec::new();
        {
            let mut page = self.page.lock().unwrap();
            for mutation in page.take_mutations() {
                if mutation.source == MutationSource::Binder || mutation.attribute != STATUS_ATTRIBUTE
                {
                    continue;
                }
                let bookmarked = is_status_true(page.attribute(mutation.target, STATUS_ATTRIBUTE)?);
                for binding in self.bindings.iter().filter(|b| b.container == mutation.target) {
                    updates.push((binding.event_id.clone(), bookmarked));
                }
            }
        }

        let forwarded = updates.len();
        for (event_id, bookmarked) in updates {
            self.model.set_status(&event_id, bookmarked);
        }
        Ok(forwarded)
    }

    /// Releases every model subscription held by this binder.
    pub fn unbind(self) {
        debug!("Unbinding {} bookmark toggles", self.bindings.len());
    }
}

fn is_status_true(value: Option<&str>) -> bool {
    value == Some("true")
}

fn render(
    page: &mut Page,
    button: NodeId,
    container: NodeId,
    bookmarked: bool,
) -> Result<(), PageError> {
    page.set_attribute_from(
        container,
        STATUS_ATTRIBUTE,
        if bookmarked { "true" } else { "false" },
        MutationSource::Binder,
    )?;
    let (add, remove) = if bookmarked {
        (FILLED_CLASS, EMPTY_CLASS)
    } else {
        (EMPTY_CLASS, FILLED_CLASS)
    };
    page.remove_class(button, remove)?;
    page.add_class(button, add)
}

fn reflect(page: &Weak<Mutex<Page>>, button: NodeId, container: NodeId, bookmarked: bool) {
    let Some(page) = page.upgrade() else {
        return;
    };
    let mut page = page.lock().unwrap();
    if let Err(err) = render(&mut page, button, container, bookmarked) {
        warn!("Failed to reflect bookmark state on {:?}: {}", container, err);
    }
}
