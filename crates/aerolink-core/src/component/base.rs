//! # Component Base
//!
//! State shared by every component instance: its kind, the store it
//! publishes into, and the `changed` / `published` / `observed` flags.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Component Change Batching                          │
//! │                                                                         │
//! │   backend event                                                         │
//! │     ├── update field A  ──► mark_changed()                              │
//! │     ├── update field B  ──► mark_changed()                              │
//! │     └── notify_updated() ─► changed? ─yes─► store.notify_updated(kind)  │
//! │                                      └─no──► nothing                    │
//! │                                                                         │
//! │   Observers see A and B together, in one notification.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::{Component, ComponentKind};
use crate::store::{ComponentStore, WeakStore};

type ObservationHook = Rc<dyn Fn(bool)>;

pub struct ComponentBase {
    kind: ComponentKind,
    store: WeakStore,
    changed: Cell<bool>,
    published: Cell<bool>,
    observed: Cell<bool>,
    hook: RefCell<Option<ObservationHook>>,
}

impl fmt::Debug for ComponentBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBase")
            .field("kind", &self.kind)
            .field("changed", &self.changed.get())
            .field("published", &self.published.get())
            .field("observed", &self.observed.get())
            .finish()
    }
}

impl ComponentBase {
    pub fn new(kind: ComponentKind, store: &ComponentStore) -> Self {
        ComponentBase {
            kind,
            store: store.downgrade(),
            changed: Cell::new(false),
            published: Cell::new(false),
            observed: Cell::new(false),
            hook: RefCell::new(None),
        }
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn is_published(&self) -> bool {
        self.published.get()
    }

    /// True while at least one store observer can see this instance.
    pub fn is_observed(&self) -> bool {
        self.observed.get()
    }

    pub fn is_changed(&self) -> bool {
        self.changed.get()
    }

    /// Records that some field changed since the last notification.
    pub fn mark_changed(&self) {
        self.changed.set(true);
    }

    /// Flushes pending changes to observers in a single notification.
    ///
    /// Returns true if a notification was sent. The dirty flag is cleared
    /// even when the instance is not published.
    pub fn notify_updated(&self) -> bool {
        if !self.changed.replace(false) || !self.published.get() {
            return false;
        }
        match self.store.upgrade() {
            Some(store) => {
                store.notify_updated(self.kind);
                true
            }
            None => false,
        }
    }

    /// Installs the callback fired when the observed state flips
    /// (`true` on first observer, `false` on no more observers).
    pub fn on_observation_changed(&self, hook: impl Fn(bool) + 'static) {
        *self.hook.borrow_mut() = Some(Rc::new(hook));
    }

    /// Publishes `component` (which must wrap this base) or, if already
    /// published, flushes pending changes.
    pub(crate) fn publish(&self, component: Component) {
        if self.published.get() {
            self.notify_updated();
            return;
        }
        self.changed.set(false);
        if let Some(store) = self.store.upgrade() {
            store.add(component);
        }
    }

    pub(crate) fn unpublish(&self) {
        if !self.published.get() {
            return;
        }
        if let Some(store) = self.store.upgrade() {
            store.remove(self.kind);
        }
        self.published.set(false);
    }

    pub(crate) fn set_published(&self, published: bool) {
        self.published.set(published);
    }

    /// Updates the observed state, firing the hook on an actual change.
    pub(crate) fn set_observed(&self, observed: bool) {
        if self.observed.replace(observed) == observed {
            return;
        }
        trace!(kind = %self.kind, observed, "Observation state changed");
        let hook = self.hook.borrow().clone();
        if let Some(hook) = hook {
            hook(observed);
        }
    }
}
