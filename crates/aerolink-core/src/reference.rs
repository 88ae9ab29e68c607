//! # Component References
//!
//! Session-scoped, auto-refreshing handle on "the component of kind X".
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   store add / remove / notify_updated (kind or sub-kind)                │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   session arena slot ── re-fetch store.get(kind) ──► value              │
//! │        │                                                                │
//! │        └── session resumed? ──yes──► callback(value)                    │
//! │                              └─no──► pending, one callback on resume    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The callback fires on every store notification even if the fetched
//! instance is the same one. After [`ComponentRef::release`], `get` returns
//! `None` and the callback never fires again.

use std::fmt;
use std::rc::Rc;

use crate::component::{Component, ComponentApi, ComponentKind};
use crate::error::CoreResult;
use crate::session::{RefKey, Session, SessionInner};
use crate::store::ComponentStore;

/// Live handle on the current component of one kind.
///
/// Released explicitly, when dropped, or when its session closes.
pub struct ComponentRef {
    session: Rc<SessionInner>,
    key: RefKey,
    kind: ComponentKind,
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("kind", &self.kind)
            .field("released", &self.is_released())
            .finish()
    }
}

impl ComponentRef {
    /// Subscribes to `kind` and captures its current value.
    ///
    /// If a component is already published, `callback` fires once before
    /// this returns (or on resume, if the session is suspended).
    ///
    /// # Errors
    ///
    /// [`CoreError::SessionClosed`](crate::error::CoreError::SessionClosed)
    /// if `session` has been closed.
    pub fn new(
        session: &Session,
        store: &ComponentStore,
        kind: ComponentKind,
        callback: impl Fn(Option<&Component>) + 'static,
    ) -> CoreResult<Self> {
        let inner = Rc::clone(session.inner());
        let key = inner.attach(store, kind, Rc::new(callback))?;
        Ok(ComponentRef {
            session: inner,
            key,
            kind,
        })
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Most recently observed value.
    pub fn get(&self) -> Option<Component> {
        self.session.value(self.key)
    }

    /// Most recently observed value as a concrete type. `None` if absent or
    /// of another type (e.g. a plain magnetometer read as 3-step).
    pub fn get_as<T: ComponentApi>(&self) -> Option<Rc<T>> {
        self.get().and_then(|component| T::from_component(&component))
    }

    pub fn is_released(&self) -> bool {
        !self.session.contains(self.key)
    }

    /// Unsubscribes. Safe to call more than once, including from inside
    /// the reference's own callback.
    pub fn release(&self) {
        self.session.release(self.key);
    }
}

impl Drop for ComponentRef {
    fn drop(&mut self) {
        self.session.release(self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::magnetometer::{Magnetometer3StepCore, MagnetometerCore};
    use crate::component::testing::NullMagnetometerBackend;
    use crate::component::GpsCore;
    use std::cell::{Cell, RefCell};

    fn counting_ref(session: &Session, store: &ComponentStore, kind: ComponentKind) -> (ComponentRef, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0));
        let hits = Rc::clone(&count);
        let reference = ComponentRef::new(session, store, kind, move |_| hits.set(hits.get() + 1)).unwrap();
        (reference, count)
    }

    #[test]
    fn test_tracks_store_value() {
        let store = ComponentStore::new();
        let session = Session::new();
        let (reference, count) = counting_ref(&session, &store, ComponentKind::Gps);
        assert!(reference.get().is_none());
        assert_eq!(count.get(), 0);

        let gps = GpsCore::new(&store);
        gps.publish();
        assert!(reference.get_as::<GpsCore>().is_some_and(|got| Rc::ptr_eq(&got, &gps)));
        assert_eq!(count.get(), 1);

        gps.update_satellite_count(7).notify_updated();
        assert_eq!(count.get(), 2);
        assert_eq!(reference.get_as::<GpsCore>().unwrap().satellite_count(), 7);

        gps.unpublish();
        assert!(reference.get().is_none());
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_initial_notification_when_present() {
        let store = ComponentStore::new();
        let session = Session::new();
        GpsCore::new(&store).publish();

        let seen = Rc::new(RefCell::new(None));
        let writer = Rc::clone(&seen);
        let reference = ComponentRef::new(&session, &store, ComponentKind::Gps, move |value| {
            *writer.borrow_mut() = value.map(Component::kind);
        })
        .unwrap();
        assert_eq!(*seen.borrow(), Some(ComponentKind::Gps));
        assert!(reference.get().is_some());
    }

    #[test]
    fn test_release_is_final() {
        let store = ComponentStore::new();
        let session = Session::new();
        let (reference, count) = counting_ref(&session, &store, ComponentKind::Gps);
        let gps = GpsCore::new(&store);
        gps.publish();
        assert_eq!(count.get(), 1);

        reference.release();
        reference.release();
        assert!(reference.is_released());
        assert!(reference.get().is_none());
        assert_eq!(store.observer_count(ComponentKind::Gps), 0);

        gps.update_fixed(true).notify_updated();
        gps.unpublish();
        assert_eq!(count.get(), 1);
        assert_eq!(session.reference_count(), 0);
    }

    #[test]
    fn test_drop_releases() {
        let store = ComponentStore::new();
        let session = Session::new();
        let (reference, _count) = counting_ref(&session, &store, ComponentKind::Geofence);
        assert_eq!(store.observer_count(ComponentKind::Geofence), 1);
        drop(reference);
        assert_eq!(store.observer_count(ComponentKind::Geofence), 0);
        assert_eq!(session.reference_count(), 0);
    }

    #[test]
    fn test_super_kind_reference_sees_refinement() {
        let store = ComponentStore::new();
        let session = Session::new();
        let (reference, count) = counting_ref(&session, &store, ComponentKind::Magnetometer);

        let refined = Magnetometer3StepCore::new(&store, Rc::new(NullMagnetometerBackend));
        refined.publish();
        assert_eq!(count.get(), 1);
        assert!(reference.get().and_then(|c| c.as_magnetometer().map(|m| m.calibration_state())).is_some());
        assert!(reference.get_as::<Magnetometer3StepCore>().is_some());
        assert!(reference.get_as::<MagnetometerCore>().is_none());

        refined.unpublish();
        assert!(reference.get().is_none());
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_callback_may_release_itself() {
        let store = ComponentStore::new();
        let session = Session::new();
        let slot: Rc<RefCell<Option<ComponentRef>>> = Rc::new(RefCell::new(None));
        let count = Rc::new(Cell::new(0));

        let hits = Rc::clone(&count);
        let own = Rc::clone(&slot);
        let reference = ComponentRef::new(&session, &store, ComponentKind::Gps, move |_| {
            hits.set(hits.get() + 1);
            if let Some(me) = own.borrow_mut().take() {
                me.release();
            }
        })
        .unwrap();
        *slot.borrow_mut() = Some(reference);

        let gps = GpsCore::new(&store);
        gps.publish();
        gps.update_fixed(true).notify_updated();
        assert_eq!(count.get(), 1);
        assert_eq!(store.observer_count(ComponentKind::Gps), 0);
    }

    #[test]
    fn test_notifies_even_without_identity_change() {
        let store = ComponentStore::new();
        let session = Session::new();
        let (_reference, count) = counting_ref(&session, &store, ComponentKind::Gps);
        GpsCore::new(&store).publish();
        store.notify_updated(ComponentKind::Gps);
        store.notify_updated(ComponentKind::Gps);
        assert_eq!(count.get(), 3);
    }
}
