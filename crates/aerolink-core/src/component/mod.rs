//! # Components
//!
//! Component instances published into the [`ComponentStore`](crate::store::ComponentStore).
//!
//! ## Module Organization
//! - [`kind`] - descriptors and their parent table
//! - [`base`] - flags shared by every instance
//! - [`gps`] - GPS instrument
//! - [`geofence`] - geofence peripheral with optimistic settings
//! - [`magnetometer`] - magnetometer and its 3-step calibration refinement
//!
//! Backends build a core, fill it, then call `publish`. Later field updates
//! are batched with `update_*` calls and flushed with `notify_updated`.

use std::rc::Rc;

use serde::Serialize;

pub mod base;
pub mod geofence;
pub mod gps;
pub mod kind;
pub mod magnetometer;

pub use base::ComponentBase;
pub use geofence::{GeofenceBackend, GeofenceCenter, GeofenceCore, GeofenceMode};
pub use gps::{GpsCore, GpsLocation};
pub use kind::{Ancestry, ComponentFamily, ComponentKind};
pub use magnetometer::{
    Axis, CalibrationProcess, CalibrationState, Magnetometer, Magnetometer3StepBackend,
    Magnetometer3StepCore, MagnetometerCore,
};

// =============================================================================
// Component Union
// =============================================================================

/// A published component instance. Cloning shares the instance.
#[derive(Debug, Clone)]
pub enum Component {
    Gps(Rc<GpsCore>),
    Geofence(Rc<GeofenceCore>),
    Magnetometer(Rc<MagnetometerCore>),
    Magnetometer3Step(Rc<Magnetometer3StepCore>),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        self.base().kind()
    }

    pub fn base(&self) -> &ComponentBase {
        match self {
            Component::Gps(core) => core.base(),
            Component::Geofence(core) => core.base(),
            Component::Magnetometer(core) => core.base(),
            Component::Magnetometer3Step(core) => core.base(),
        }
    }

    /// True if both handles share the same instance.
    pub fn ptr_eq(&self, other: &Component) -> bool {
        match (self, other) {
            (Component::Gps(a), Component::Gps(b)) => Rc::ptr_eq(a, b),
            (Component::Geofence(a), Component::Geofence(b)) => Rc::ptr_eq(a, b),
            (Component::Magnetometer(a), Component::Magnetometer(b)) => Rc::ptr_eq(a, b),
            (Component::Magnetometer3Step(a), Component::Magnetometer3Step(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_gps(&self) -> Option<&Rc<GpsCore>> {
        match self {
            Component::Gps(core) => Some(core),
            _ => None,
        }
    }

    pub fn as_geofence(&self) -> Option<&Rc<GeofenceCore>> {
        match self {
            Component::Geofence(core) => Some(core),
            _ => None,
        }
    }

    /// Any magnetometer, including refined ones.
    pub fn as_magnetometer(&self) -> Option<&dyn Magnetometer> {
        match self {
            Component::Magnetometer(core) => Some(&**core as &dyn Magnetometer),
            Component::Magnetometer3Step(core) => Some(&**core as &dyn Magnetometer),
            _ => None,
        }
    }

    pub fn as_magnetometer_3step(&self) -> Option<&Rc<Magnetometer3StepCore>> {
        match self {
            Component::Magnetometer3Step(core) => Some(core),
            _ => None,
        }
    }

    /// Serializable view of the instance's current state.
    pub fn snapshot(&self) -> ComponentSnapshot {
        match self {
            Component::Gps(core) => ComponentSnapshot::Gps(core.snapshot()),
            Component::Geofence(core) => ComponentSnapshot::Geofence(core.snapshot()),
            Component::Magnetometer(core) => ComponentSnapshot::Magnetometer(core.snapshot()),
            Component::Magnetometer3Step(core) => ComponentSnapshot::Magnetometer3Step(core.snapshot()),
        }
    }
}

/// Point-in-time copy of a component's state, tagged by kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentSnapshot {
    Gps(gps::GpsSnapshot),
    Geofence(geofence::GeofenceSnapshot),
    Magnetometer(magnetometer::MagnetometerSnapshot),
    #[serde(rename = "magnetometer_3step")]
    Magnetometer3Step(magnetometer::Magnetometer3StepSnapshot),
}

// =============================================================================
// Typed Access
// =============================================================================

/// Links a concrete core type to its kind.
pub trait ComponentApi: Sized + 'static {
    const KIND: ComponentKind;

    /// Extracts the concrete instance from a stored component.
    fn from_component(component: &Component) -> Option<Rc<Self>>;
}

impl ComponentApi for GpsCore {
    const KIND: ComponentKind = ComponentKind::Gps;

    fn from_component(component: &Component) -> Option<Rc<Self>> {
        component.as_gps().cloned()
    }
}

impl ComponentApi for GeofenceCore {
    const KIND: ComponentKind = ComponentKind::Geofence;

    fn from_component(component: &Component) -> Option<Rc<Self>> {
        component.as_geofence().cloned()
    }
}

impl ComponentApi for MagnetometerCore {
    const KIND: ComponentKind = ComponentKind::Magnetometer;

    fn from_component(component: &Component) -> Option<Rc<Self>> {
        match component {
            Component::Magnetometer(core) => Some(Rc::clone(core)),
            _ => None,
        }
    }
}

impl ComponentApi for Magnetometer3StepCore {
    const KIND: ComponentKind = ComponentKind::Magnetometer3Step;

    fn from_component(component: &Component) -> Option<Rc<Self>> {
        component.as_magnetometer_3step().cloned()
    }
}

// =============================================================================
// Test Backends
// =============================================================================


#[cfg(test)]
mod tests {
    use super::testing::NullMagnetometerBackend;
    use super::*;
    use crate::store::ComponentStore;

    #[test]
    fn test_magnetometer_view_covers_refinement() {
        let store = ComponentStore::new();
        let plain = Component::Magnetometer(MagnetometerCore::new(&store));
        let refined = Component::Magnetometer3Step(Magnetometer3StepCore::new(
            &store,
            Rc::new(NullMagnetometerBackend),
        ));
        let gps = Component::Gps(GpsCore::new(&store));

        assert!(plain.as_magnetometer().is_some());
        assert!(refined.as_magnetometer().is_some());
        assert!(gps.as_magnetometer().is_none());
        assert!(plain.as_magnetometer_3step().is_none());
        assert_eq!(refined.kind(), ComponentKind::Magnetometer3Step);
    }

    #[test]
    fn test_ptr_eq_distinguishes_instances() {
        let store = ComponentStore::new();
        let core = GpsCore::new(&store);
        let a = Component::Gps(Rc::clone(&core));
        let b = Component::Gps(core);
        let c = Component::Gps(GpsCore::new(&store));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }

    #[test]
    fn test_snapshot_is_tagged_by_kind() {
        let store = ComponentStore::new();
        let gps = GpsCore::new(&store);
        gps.update_fixed(true).update_satellite_count(9);
        let json = serde_json::to_value(Component::Gps(gps).snapshot()).unwrap();
        assert_eq!(json["kind"], "gps");
        assert_eq!(json["fixed"], true);
        assert_eq!(json["satellite_count"], 9);

        let mag = Component::Magnetometer3Step(Magnetometer3StepCore::new(
            &store,
            Rc::new(NullMagnetometerBackend),
        ));
        let json = serde_json::to_value(mag.snapshot()).unwrap();
        assert_eq!(json["kind"], "magnetometer_3step");
    }
}
