//! # Sessions
//!
//! A session owns every [`ComponentRef`] issued under it, in a slot arena.
//! Ending the session force-releases each of them.
//!
//! ## Session State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌─────────┐   suspend()    ┌───────────┐                              │
//! │   │ Resumed │ ─────────────► │ Suspended │  notifications are held;     │
//! │   │         │ ◄───────────── │           │  one per reference is        │
//! │   └────┬────┘   resume()     └─────┬─────┘  delivered on resume         │
//! │        │                           │                                    │
//! │        └────────── close() ────────┴────────►  ┌────────┐               │
//! │                                                │ Closed │  every ref    │
//! │                                                └────────┘  released     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The arena holds the reference state. A [`ComponentRef`] is a key into it,
//! and the store observer behind each reference holds only a weak handle to
//! the session.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use tracing::{debug, trace};

use crate::component::{Component, ComponentKind};
use crate::error::{CoreError, CoreResult};
use crate::reference::ComponentRef;
use crate::store::{ComponentStore, ObserverId};

new_key_type! {
    /// Arena slot of one issued reference.
    pub struct RefKey;
}

/// Reference change callback. Receives the freshly fetched value.
pub type RefCallback = Rc<dyn Fn(Option<&Component>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Resumed,
    Suspended,
    Closed,
}

struct RefEntry {
    store: ComponentStore,
    kind: ComponentKind,
    observer: Option<ObserverId>,
    value: Option<Component>,
    callback: RefCallback,
    /// A notification arrived while the session was suspended.
    pending: bool,
}

impl RefEntry {
    fn detach(self) {
        if let Some(observer) = self.observer {
            self.store.unregister_observer(observer);
        }
    }
}

pub(crate) struct SessionInner {
    state: Cell<SessionState>,
    refs: RefCell<SlotMap<RefKey, RefEntry>>,
}

/// Owner of a group of component references.
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("references", &self.reference_count())
            .finish()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            inner: Rc::new(SessionInner {
                state: Cell::new(SessionState::Resumed),
                refs: RefCell::new(SlotMap::with_key()),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    /// Number of live references issued by this session.
    pub fn reference_count(&self) -> usize {
        self.inner.refs.borrow().len()
    }

    /// Creates a reference on `kind`. Shorthand for [`ComponentRef::new`].
    pub fn component_ref(
        &self,
        store: &ComponentStore,
        kind: ComponentKind,
        callback: impl Fn(Option<&Component>) + 'static,
    ) -> CoreResult<ComponentRef> {
        ComponentRef::new(self, store, kind, callback)
    }

    /// Holds reference notifications until [`resume`](Self::resume).
    /// Values returned by `get` stay current.
    pub fn suspend(&self) {
        if self.inner.state.get() == SessionState::Resumed {
            self.inner.state.set(SessionState::Suspended);
            debug!(references = self.reference_count(), "Session suspended");
        }
    }

    /// Delivers one notification to every reference that missed at least
    /// one while suspended.
    pub fn resume(&self) {
        if self.inner.state.get() != SessionState::Suspended {
            return;
        }
        self.inner.state.set(SessionState::Resumed);

        let keys: Vec<RefKey> = self
            .inner
            .refs
            .borrow()
            .iter()
            .filter(|(_, entry)| entry.pending)
            .map(|(key, _)| key)
            .collect();
        debug!(pending = keys.len(), "Session resumed");

        for key in keys {
            // a callback may have suspended or closed the session again
            if self.inner.state.get() != SessionState::Resumed {
                return;
            }
            // or released a reference still in the list
            let delivery = {
                let mut refs = self.inner.refs.borrow_mut();
                refs.get_mut(key).filter(|entry| entry.pending).map(|entry| {
                    entry.pending = false;
                    (Rc::clone(&entry.callback), entry.value.clone())
                })
            };
            if let Some((callback, value)) = delivery {
                callback(value.as_ref());
            }
        }
    }

    /// Releases every reference and refuses new ones.
    pub fn close(&self) {
        if self.inner.state.replace(SessionState::Closed) == SessionState::Closed {
            return;
        }
        let entries: Vec<RefEntry> = {
            let mut refs = self.inner.refs.borrow_mut();
            refs.drain().map(|(_, entry)| entry).collect()
        };
        debug!(released = entries.len(), "Session closed");
        for entry in entries {
            entry.detach();
        }
    }

    pub(crate) fn inner(&self) -> &Rc<SessionInner> {
        &self.inner
    }
}

// =============================================================================
// Arena Operations
// =============================================================================

impl SessionInner {
    /// Issues a new reference slot, subscribes it to the store, captures the
    /// current value and delivers the initial notification if one exists.
    pub(crate) fn attach(
        self: &Rc<Self>,
        store: &ComponentStore,
        kind: ComponentKind,
        callback: RefCallback,
    ) -> CoreResult<RefKey> {
        if self.state.get() == SessionState::Closed {
            return Err(CoreError::SessionClosed);
        }

        let key = self.refs.borrow_mut().insert(RefEntry {
            store: store.clone(),
            kind,
            observer: None,
            value: None,
            callback,
            pending: false,
        });

        let session = Rc::downgrade(self);
        let observer = store.register_observer(kind, move || {
            if let Some(session) = Weak::upgrade(&session) {
                session.on_store_change(key);
            }
        });

        let value = store.get(kind);
        let present = value.is_some();
        if let Some(entry) = self.refs.borrow_mut().get_mut(key) {
            entry.observer = Some(observer);
            entry.value = value;
        }
        trace!(kind = %kind, present, "Reference attached");

        if present {
            self.deliver(key);
        }
        Ok(key)
    }

    /// Drops a slot and its store subscription. Returns false if the slot
    /// was already released.
    pub(crate) fn release(&self, key: RefKey) -> bool {
        let entry = self.refs.borrow_mut().remove(key);
        match entry {
            Some(entry) => {
                trace!(kind = %entry.kind, "Reference released");
                entry.detach();
                true
            }
            None => false,
        }
    }

    pub(crate) fn value(&self, key: RefKey) -> Option<Component> {
        self.refs.borrow().get(key).and_then(|entry| entry.value.clone())
    }

    pub(crate) fn contains(&self, key: RefKey) -> bool {
        self.refs.borrow().contains_key(key)
    }

    fn on_store_change(&self, key: RefKey) {
        let target = self
            .refs
            .borrow()
            .get(key)
            .map(|entry| (entry.store.clone(), entry.kind));
        let Some((store, kind)) = target else {
            return;
        };
        let value = store.get(kind);
        if let Some(entry) = self.refs.borrow_mut().get_mut(key) {
            entry.value = value;
        }
        self.deliver(key);
    }

    /// Invokes the callback of `key` now, or marks it pending if suspended.
    fn deliver(&self, key: RefKey) {
        let delivery = {
            let mut refs = self.refs.borrow_mut();
            let Some(entry) = refs.get_mut(key) else {
                return;
            };
            if self.state.get() == SessionState::Suspended {
                entry.pending = true;
                None
            } else {
                Some((Rc::clone(&entry.callback), entry.value.clone()))
            }
        };
        if let Some((callback, value)) = delivery {
            callback(value.as_ref());
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        for (_, entry) in self.refs.get_mut().drain() {
            entry.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::GpsCore;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<bool>>>;

    /// Callback recording whether each notification carried a value.
    fn recorder() -> (Log, impl Fn(Option<&Component>) + 'static) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let writer = Rc::clone(&log);
        (log, move |value: Option<&Component>| writer.borrow_mut().push(value.is_some()))
    }

    #[test]
    fn test_suspended_notifications_coalesce() {
        let store = ComponentStore::new();
        let session = Session::new();
        let (log, callback) = recorder();
        let reference = session.component_ref(&store, ComponentKind::Gps, callback).unwrap();

        session.suspend();
        let gps = GpsCore::new(&store);
        gps.publish();
        gps.update_fixed(true).notify_updated();
        assert!(log.borrow().is_empty());
        assert!(reference.get().is_some());

        session.resume();
        assert_eq!(*log.borrow(), vec![true]);
        session.resume();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_close_releases_everything() {
        let store = ComponentStore::new();
        let session = Session::new();
        let (log, callback) = recorder();
        let gps_ref = session.component_ref(&store, ComponentKind::Gps, callback).unwrap();
        let _other = session
            .component_ref(&store, ComponentKind::Geofence, |_| {})
            .unwrap();
        assert_eq!(session.reference_count(), 2);
        assert_eq!(store.observer_count(ComponentKind::Gps), 1);

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.reference_count(), 0);
        assert_eq!(store.observer_count(ComponentKind::Gps), 0);
        assert!(gps_ref.is_released());

        GpsCore::new(&store).publish();
        assert!(gps_ref.get().is_none());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_closed_session_refuses_references() {
        let store = ComponentStore::new();
        let session = Session::new();
        session.close();
        let result = session.component_ref(&store, ComponentKind::Gps, |_| {});
        assert!(matches!(result, Err(CoreError::SessionClosed)));

        // closed is terminal
        session.resume();
        session.suspend();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_release_during_resume_skips_released_reference() {
        let store = ComponentStore::new();
        let session = Session::new();
        let (log, callback) = recorder();
        let victim = Rc::new(session.component_ref(&store, ComponentKind::Gps, callback).unwrap());

        let killer_target = Rc::clone(&victim);
        let _killer = session
            .component_ref(&store, ComponentKind::Gps, move |_| killer_target.release())
            .unwrap();

        session.suspend();
        GpsCore::new(&store).publish();
        session.resume();

        // either order is legal; if the killer ran first the victim stays silent
        assert!(log.borrow().len() <= 1);
        assert!(victim.is_released());
    }

    #[test]
    fn test_dropping_session_handle_keeps_refs_alive() {
        let store = ComponentStore::new();
        let (log, callback) = recorder();
        let reference = {
            let session = Session::new();
            session.component_ref(&store, ComponentKind::Gps, callback).unwrap()
        };
        GpsCore::new(&store).publish();
        assert_eq!(*log.borrow(), vec![true]);
        drop(reference);
        assert_eq!(store.observer_count(ComponentKind::Gps), 0);
    }
}
