//! # Component Store
//!
//! Single source of truth for which components currently exist.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ComponentStore                                │
//! │                                                                         │
//! │  components                         observers (slot arena)              │
//! │  ──────────                         ─────────────────────               │
//! │  Magnetometer3Step ─┐               ObserverId ─► (kind, callback)      │
//! │  Magnetometer ──────┴─► instance X                                      │
//! │  Geofence ──────────► instance G    by_kind                             │
//! │                                     ───────                             │
//! │                                     Magnetometer ─► [o1, o2]            │
//! │                                     Geofence     ─► [o3]                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A published instance is stored under its own kind and every ancestor
//! kind. Notifications walk the same chain, so an observer of a super-kind
//! hears about every sub-kind instance.
//!
//! ## Notification Rules
//! - `add`, `remove` and `notify_updated` invoke each matching observer
//!   exactly once, synchronously, after the store has been updated.
//! - An instance is "observed" while at least one observer is registered on
//!   any kind of its ancestry and it is still in the store. Its observation
//!   hook fires on each change of that state, never on a net-zero sequence.
//! - No borrow of the store is held while callbacks run, so observers may
//!   call back into the store.
//!
//! The store is `!Send`: it lives on the main context and nowhere else.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use slotmap::{new_key_type, SlotMap};
use tracing::{debug, trace};

use crate::component::{Component, ComponentApi, ComponentKind};

new_key_type! {
    /// Handle returned by [`ComponentStore::register_observer`].
    pub struct ObserverId;
}

/// Store observer callback.
pub type Observer = Rc<dyn Fn()>;

struct ObserverEntry {
    kind: ComponentKind,
    callback: Observer,
}

#[derive(Default)]
struct StoreState {
    components: HashMap<ComponentKind, Component>,
    observers: SlotMap<ObserverId, ObserverEntry>,
    by_kind: HashMap<ComponentKind, Vec<ObserverId>>,
}

impl StoreState {
    /// Callbacks to run for a change of `kind`, most specific level first.
    fn callbacks_for(&self, kind: ComponentKind) -> Vec<Observer> {
        kind.ancestry()
            .filter_map(|level| self.by_kind.get(&level))
            .flatten()
            .filter_map(|id| self.observers.get(*id))
            .map(|entry| Rc::clone(&entry.callback))
            .collect()
    }

    fn has_observer_on_chain(&self, kind: ComponentKind) -> bool {
        kind.ancestry()
            .any(|level| self.by_kind.get(&level).is_some_and(|ids| !ids.is_empty()))
    }

    fn holds(&self, component: &Component) -> bool {
        self.components.values().any(|stored| stored.ptr_eq(component))
    }

    /// Whether `component` should currently be considered observed.
    fn is_observed(&self, component: &Component) -> bool {
        self.holds(component) && self.has_observer_on_chain(component.kind())
    }
}

// =============================================================================
// Store Handle
// =============================================================================

/// Keyed, hierarchy-aware registry of published components.
#[derive(Clone, Default)]
pub struct ComponentStore {
    state: Rc<RefCell<StoreState>>,
}

/// Non-owning store handle held by components.
#[derive(Clone, Default)]
pub struct WeakStore {
    state: Weak<RefCell<StoreState>>,
}

impl WeakStore {
    pub fn upgrade(&self) -> Option<ComponentStore> {
        self.state.upgrade().map(|state| ComponentStore { state })
    }
}

impl fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        let mut kinds: Vec<_> = state.components.keys().copied().collect();
        kinds.sort();
        f.debug_struct("ComponentStore")
            .field("components", &kinds)
            .field("observers", &state.observers.len())
            .finish()
    }
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            state: Rc::downgrade(&self.state),
        }
    }

    // =========================================================================
    // Publication
    // =========================================================================

    /// Installs `component` under its kind and every ancestor kind, then
    /// notifies the observers of that chain.
    ///
    /// An instance displaced by this one is marked unpublished once it no
    /// longer appears anywhere in the store.
    pub fn add(&self, component: Component) {
        let kind = component.kind();
        let displaced: Vec<Component> = {
            let mut state = self.state.borrow_mut();
            let mut displaced: Vec<Component> = Vec::new();
            for level in kind.ancestry() {
                if let Some(previous) = state.components.insert(level, component.clone()) {
                    if !previous.ptr_eq(&component) && !displaced.iter().any(|d| d.ptr_eq(&previous)) {
                        displaced.push(previous);
                    }
                }
            }
            displaced
        };
        debug!(kind = %kind, displaced = displaced.len(), "Component added");

        component.base().set_published(true);
        for previous in &displaced {
            self.refresh_lifecycle(previous);
        }
        self.refresh_observed(&component);
        self.notify_changed(kind);
    }

    /// Clears `kind` and every ancestor kind, then notifies the observers of
    /// that chain. Observers are notified even if nothing was published.
    ///
    /// A removed instance becomes unobserved even while observers remain
    /// registered on its chain, since none of them can reach it any more.
    pub fn remove(&self, kind: ComponentKind) {
        let removed: Vec<Component> = {
            let mut state = self.state.borrow_mut();
            let mut removed: Vec<Component> = Vec::new();
            for level in kind.ancestry() {
                if let Some(previous) = state.components.remove(&level) {
                    if !removed.iter().any(|r| r.ptr_eq(&previous)) {
                        removed.push(previous);
                    }
                }
            }
            removed
        };
        debug!(kind = %kind, removed = removed.len(), "Component removed");

        for component in &removed {
            self.refresh_lifecycle(component);
        }
        self.notify_changed(kind);
    }

    /// Current instance for `kind`, if any.
    pub fn get(&self, kind: ComponentKind) -> Option<Component> {
        self.state.borrow().components.get(&kind).cloned()
    }

    /// Current instance for `T::KIND`, as its concrete type.
    pub fn get_as<T: ComponentApi>(&self) -> Option<Rc<T>> {
        self.get(T::KIND).and_then(|component| T::from_component(&component))
    }

    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.state.borrow().components.contains_key(&kind)
    }

    /// Re-notifies the observers of an already published `kind`. Does
    /// nothing if `kind` is not published.
    pub fn notify_updated(&self, kind: ComponentKind) {
        if self.contains(kind) {
            self.notify_changed(kind);
        }
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Subscribes `observer` to `kind` (and therefore to every sub-kind).
    pub fn register_observer(&self, kind: ComponentKind, observer: impl Fn() + 'static) -> ObserverId {
        let (id, current) = {
            let mut state = self.state.borrow_mut();
            let id = state.observers.insert(ObserverEntry {
                kind,
                callback: Rc::new(observer),
            });
            state.by_kind.entry(kind).or_default().push(id);
            (id, state.components.get(&kind).cloned())
        };
        trace!(kind = %kind, "Observer registered");

        if let Some(component) = current {
            self.refresh_observed(&component);
        }
        id
    }

    /// Unsubscribes an observer. Returns false if `id` was not registered.
    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        let (kind, current) = {
            let mut state = self.state.borrow_mut();
            let Some(entry) = state.observers.remove(id) else {
                return false;
            };
            if let Some(ids) = state.by_kind.get_mut(&entry.kind) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    state.by_kind.remove(&entry.kind);
                }
            }
            (entry.kind, state.components.get(&entry.kind).cloned())
        };
        trace!(kind = %kind, "Observer unregistered");

        if let Some(component) = current {
            self.refresh_observed(&component);
        }
        true
    }

    /// Number of observers registered directly on `kind`.
    pub fn observer_count(&self, kind: ComponentKind) -> usize {
        self.state.borrow().by_kind.get(&kind).map_or(0, Vec::len)
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Drops every component, notifies every observer once, then forgets
    /// all observers.
    pub fn destroy(&self) {
        let (components, callbacks) = {
            let mut state = self.state.borrow_mut();
            let mut components: Vec<Component> = Vec::new();
            for (_, component) in state.components.drain() {
                if !components.iter().any(|c| c.ptr_eq(&component)) {
                    components.push(component);
                }
            }
            let callbacks: Vec<Observer> = state
                .observers
                .values()
                .map(|entry| Rc::clone(&entry.callback))
                .collect();
            (components, callbacks)
        };
        debug!(
            components = components.len(),
            observers = callbacks.len(),
            "Destroying component store"
        );

        for component in &components {
            component.base().set_observed(false);
            component.base().set_published(false);
        }
        for callback in callbacks {
            callback();
        }

        let mut state = self.state.borrow_mut();
        state.observers.clear();
        state.by_kind.clear();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn notify_changed(&self, kind: ComponentKind) {
        let callbacks = self.state.borrow().callbacks_for(kind);
        trace!(kind = %kind, observers = callbacks.len(), "Notifying observers");
        for callback in callbacks {
            callback();
        }
    }

    fn refresh_observed(&self, component: &Component) {
        let observed = self.state.borrow().is_observed(component);
        component.base().set_observed(observed);
    }

    fn refresh_lifecycle(&self, component: &Component) {
        let still_held = self.state.borrow().holds(component);
        self.refresh_observed(component);
        if !still_held {
            component.base().set_published(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::magnetometer::{Magnetometer3StepCore, MagnetometerCore};
    use crate::component::testing::NullMagnetometerBackend;
    use crate::component::GpsCore;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
        let count = Rc::new(Cell::new(0));
        let hits = Rc::clone(&count);
        (count, move || hits.set(hits.get() + 1))
    }

    fn observation_log(component: &Component) -> Rc<RefCell<Vec<bool>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let writer = Rc::clone(&log);
        component
            .base()
            .on_observation_changed(move |observed| writer.borrow_mut().push(observed));
        log
    }

    fn three_step(store: &ComponentStore) -> Component {
        Component::Magnetometer3Step(Magnetometer3StepCore::new(
            store,
            Rc::new(NullMagnetometerBackend),
        ))
    }

    #[test]
    fn test_super_kind_observer_sees_sub_kind() {
        let store = ComponentStore::new();
        let (count, observer) = counter();
        store.register_observer(ComponentKind::Magnetometer, observer);

        let x = three_step(&store);
        let observed = observation_log(&x);

        store.add(x.clone());
        assert_eq!(count.get(), 1);
        assert!(store.get(ComponentKind::Magnetometer).unwrap().ptr_eq(&x));
        assert!(store.get(ComponentKind::Magnetometer3Step).unwrap().ptr_eq(&x));
        assert_eq!(*observed.borrow(), vec![true]);

        store.remove(ComponentKind::Magnetometer3Step);
        assert_eq!(count.get(), 2);
        assert!(store.get(ComponentKind::Magnetometer).is_none());
        assert!(store.get(ComponentKind::Magnetometer3Step).is_none());
        // the only observer no longer sees X
        assert_eq!(*observed.borrow(), vec![true, false]);
        assert!(!x.base().is_published());
    }

    #[test]
    fn test_removed_instance_unobserved_despite_remaining_observers() {
        let store = ComponentStore::new();
        store.register_observer(ComponentKind::Magnetometer, || {});
        store.register_observer(ComponentKind::Magnetometer3Step, || {});
        let x = three_step(&store);
        let log = observation_log(&x);

        store.add(x.clone());
        store.remove(ComponentKind::Magnetometer3Step);
        assert_eq!(*log.borrow(), vec![true, false]);
        assert!(!x.base().is_observed());
        assert_eq!(store.observer_count(ComponentKind::Magnetometer), 1);
        assert_eq!(store.observer_count(ComponentKind::Magnetometer3Step), 1);

        // re-publishing the same instance makes it observed again
        store.add(x.clone());
        assert_eq!(*log.borrow(), vec![true, false, true]);
    }

    #[test]
    fn test_unregistered_observer_stops_firing() {
        let store = ComponentStore::new();
        let (count, observer) = counter();
        let id = store.register_observer(ComponentKind::Magnetometer, observer);
        store.add(three_step(&store));
        assert_eq!(count.get(), 1);

        assert!(store.unregister_observer(id));
        assert!(!store.unregister_observer(id));
        store.notify_updated(ComponentKind::Magnetometer3Step);
        store.remove(ComponentKind::Magnetometer3Step);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_add_remove_sequences() {
        let store = ComponentStore::new();
        let a = Component::Gps(GpsCore::new(&store));
        let b = Component::Gps(GpsCore::new(&store));

        store.add(a.clone());
        store.add(b.clone());
        assert!(store.get(ComponentKind::Gps).unwrap().ptr_eq(&b));
        assert!(!a.base().is_published());
        assert!(b.base().is_published());

        store.remove(ComponentKind::Gps);
        assert!(store.get(ComponentKind::Gps).is_none());

        store.add(a.clone());
        store.remove(ComponentKind::Gps);
        store.add(b.clone());
        assert!(store.get(ComponentKind::Gps).unwrap().ptr_eq(&b));
    }

    #[test]
    fn test_remove_notifies_even_when_absent() {
        let store = ComponentStore::new();
        let (count, observer) = counter();
        store.register_observer(ComponentKind::Geofence, observer);
        store.remove(ComponentKind::Geofence);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_notify_updated_requires_published_component() {
        let store = ComponentStore::new();
        let (count, observer) = counter();
        store.register_observer(ComponentKind::Gps, observer);

        store.notify_updated(ComponentKind::Gps);
        assert_eq!(count.get(), 0);

        store.add(Component::Gps(GpsCore::new(&store)));
        store.notify_updated(ComponentKind::Gps);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_observed_edges_follow_total_count() {
        let store = ComponentStore::new();
        let x = three_step(&store);
        let log = observation_log(&x);
        store.add(x.clone());
        assert!(log.borrow().is_empty());

        // 0 -> 1 across the chain
        let first = store.register_observer(ComponentKind::Magnetometer3Step, || {});
        let second = store.register_observer(ComponentKind::Magnetometer, || {});
        assert_eq!(*log.borrow(), vec![true]);

        // net-zero churn while already observed
        let third = store.register_observer(ComponentKind::Magnetometer, || {});
        store.unregister_observer(third);
        store.unregister_observer(first);
        assert_eq!(*log.borrow(), vec![true]);

        // 1 -> 0
        store.unregister_observer(second);
        assert_eq!(*log.borrow(), vec![true, false]);
        assert!(!x.base().is_observed());
    }

    #[test]
    fn test_add_with_existing_observer_marks_observed() {
        let store = ComponentStore::new();
        store.register_observer(ComponentKind::Magnetometer, || {});
        let x = three_step(&store);
        let log = observation_log(&x);
        store.add(x);
        assert_eq!(*log.borrow(), vec![true]);
    }

    #[test]
    fn test_plain_kind_observer_ignores_parent_only_instance() {
        let store = ComponentStore::new();
        let (count, observer) = counter();
        store.register_observer(ComponentKind::Magnetometer3Step, observer);

        let plain = Component::Magnetometer(MagnetometerCore::new(&store));
        store.add(plain);
        assert_eq!(count.get(), 0);
        assert!(store.get(ComponentKind::Magnetometer3Step).is_none());
    }

    #[test]
    fn test_observer_may_reenter_store() {
        let store = ComponentStore::new();
        let seen = Rc::new(Cell::new(false));
        let reader = store.clone();
        let flag = Rc::clone(&seen);
        store.register_observer(ComponentKind::Gps, move || {
            flag.set(reader.get(ComponentKind::Gps).is_some());
        });
        store.add(Component::Gps(GpsCore::new(&store)));
        assert!(seen.get());
    }

    #[test]
    fn test_destroy_notifies_everyone_once() {
        let store = ComponentStore::new();
        let (gps_count, gps_observer) = counter();
        let (mag_count, mag_observer) = counter();
        store.register_observer(ComponentKind::Gps, gps_observer);
        store.register_observer(ComponentKind::Magnetometer, mag_observer);
        let x = three_step(&store);
        store.add(x.clone());
        assert_eq!(mag_count.get(), 1);

        store.destroy();
        assert_eq!(gps_count.get(), 1);
        assert_eq!(mag_count.get(), 2);
        assert!(store.get(ComponentKind::Magnetometer).is_none());
        assert!(!x.base().is_published());
        assert_eq!(store.observer_count(ComponentKind::Gps), 0);
    }

    #[test]
    fn test_typed_get() {
        let store = ComponentStore::new();
        assert!(store.get_as::<GpsCore>().is_none());
        let gps = GpsCore::new(&store);
        store.add(Component::Gps(Rc::clone(&gps)));
        assert!(Rc::ptr_eq(&store.get_as::<GpsCore>().unwrap(), &gps));
    }
}
