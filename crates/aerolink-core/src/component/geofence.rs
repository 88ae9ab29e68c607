//! # Geofence
//!
//! Geofence peripheral: three optimistic settings plus a device-reported
//! center.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Setting Change Routing                            │
//! │                                                                         │
//! │   max_altitude ─┐                                                       │
//! │   max_distance ─┼──► on_setting_change(from_user)                       │
//! │   mode ─────────┘        ├── mark_changed()                             │
//! │                          └── from_user? ──► notify_updated() now        │
//! │                                 (backend changes wait for the backend's │
//! │                                  own notify_updated)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Component, ComponentBase, ComponentKind};
use crate::setting::{
    exact_setting_value, ChangeListener, DoubleRange, DoubleSetting, EnumSetting, RollbackPolicy,
    SettingController, SettingValue,
};
use crate::store::ComponentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceMode {
    /// Only the altitude is limited.
    Altitude,
    /// Altitude and distance from the center are limited.
    Cylinder,
}

exact_setting_value!(GeofenceMode);

/// Device commands. Each returns false if the command could not be sent.
pub trait GeofenceBackend {
    fn set_max_altitude(&self, altitude: f64) -> bool;

    fn set_max_distance(&self, distance: f64) -> bool;

    fn set_mode(&self, mode: GeofenceMode) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeofenceCenter {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeofenceSnapshot {
    pub max_altitude: f64,
    pub max_distance: f64,
    pub mode: GeofenceMode,
    pub updating: bool,
    pub center: Option<GeofenceCenter>,
}

pub struct GeofenceCore {
    base: ComponentBase,
    max_altitude: DoubleSetting,
    max_distance: DoubleSetting,
    mode: EnumSetting<GeofenceMode>,
    center: Cell<Option<GeofenceCenter>>,
}

impl fmt::Debug for GeofenceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeofenceCore")
            .field("base", &self.base)
            .field("max_altitude", &self.max_altitude)
            .field("max_distance", &self.max_distance)
            .field("mode", &self.mode)
            .finish()
    }
}

impl GeofenceCore {
    /// Builds an unpublished geofence. Bounds start empty until the device
    /// reports them.
    pub fn new(store: &ComponentStore, backend: Rc<dyn GeofenceBackend>, policy: RollbackPolicy) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<GeofenceCore>| {
            let controller = |name: &str| SettingController::new(name, policy.clone(), setting_listener(weak));

            let altitude_backend = Rc::clone(&backend);
            let distance_backend = Rc::clone(&backend);
            let mode_backend = backend;

            GeofenceCore {
                base: ComponentBase::new(ComponentKind::Geofence, store),
                max_altitude: DoubleSetting::new(
                    0.0,
                    DoubleRange::new(0.0, 0.0),
                    controller("geofence.max_altitude"),
                    move |altitude: &f64| altitude_backend.set_max_altitude(*altitude),
                ),
                max_distance: DoubleSetting::new(
                    0.0,
                    DoubleRange::new(0.0, 0.0),
                    controller("geofence.max_distance"),
                    move |distance: &f64| distance_backend.set_max_distance(*distance),
                ),
                mode: EnumSetting::new(
                    GeofenceMode::Altitude,
                    [GeofenceMode::Altitude, GeofenceMode::Cylinder],
                    controller("geofence.mode"),
                    move |mode: &GeofenceMode| mode_backend.set_mode(*mode),
                ),
                center: Cell::new(None),
            }
        })
    }

    pub fn base(&self) -> &ComponentBase {
        &self.base
    }

    pub fn max_altitude(&self) -> &DoubleSetting {
        &self.max_altitude
    }

    pub fn max_distance(&self) -> &DoubleSetting {
        &self.max_distance
    }

    pub fn mode(&self) -> &EnumSetting<GeofenceMode> {
        &self.mode
    }

    /// Center of the cylinder, `None` until the device reports one.
    pub fn center(&self) -> Option<GeofenceCenter> {
        self.center.get()
    }

    pub fn snapshot(&self) -> GeofenceSnapshot {
        GeofenceSnapshot {
            max_altitude: self.max_altitude.value(),
            max_distance: self.max_distance.value(),
            mode: self.mode.value(),
            updating: self.max_altitude.is_updating()
                || self.max_distance.is_updating()
                || self.mode.is_updating(),
            center: self.center(),
        }
    }

    // =========================================================================
    // Backend Updates
    // =========================================================================

    /// Sets the center, stamped with the current time. The same position
    /// keeps its old timestamp.
    pub fn update_center(&self, latitude: f64, longitude: f64) -> &Self {
        let same = self.center.get().is_some_and(|center| {
            center.latitude.same_as(&latitude) && center.longitude.same_as(&longitude)
        });
        if !same {
            self.center.set(Some(GeofenceCenter {
                latitude,
                longitude,
                timestamp: Utc::now(),
            }));
            self.base.mark_changed();
        }
        self
    }

    pub fn reset_center(&self) -> &Self {
        if self.center.take().is_some() {
            self.base.mark_changed();
        }
        self
    }

    /// Keeps every optimistic value and stops waiting for confirmation.
    pub fn cancel_settings_rollbacks(&self) -> &Self {
        self.max_altitude.cancel_rollback();
        self.max_distance.cancel_rollback();
        self.mode.cancel_rollback();
        self
    }

    pub fn publish(self: &Rc<Self>) {
        self.base.publish(Component::Geofence(Rc::clone(self)));
    }

    /// Unpublishes and disarms pending rollbacks.
    pub fn unpublish(&self) {
        self.base.unpublish();
        self.cancel_settings_rollbacks();
    }

    pub fn notify_updated(&self) -> bool {
        self.base.notify_updated()
    }

    fn on_setting_change(&self, from_user: bool) {
        self.base.mark_changed();
        if from_user {
            self.base.notify_updated();
        }
    }
}

fn setting_listener(core: &Weak<GeofenceCore>) -> ChangeListener {
    let core = Weak::clone(core);
    Rc::new(move |from_user| {
        if let Some(core) = core.upgrade() {
            core.on_setting_change(from_user);
        }
    })
}
