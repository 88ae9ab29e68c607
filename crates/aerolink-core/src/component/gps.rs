//! GPS instrument.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Component, ComponentBase, ComponentKind};
use crate::setting::SettingValue;
use crate::store::ComponentStore;

/// Last location reported by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GpsSnapshot {
    pub fixed: bool,
    pub satellite_count: u32,
    pub location: Option<GpsLocation>,
}

pub struct GpsCore {
    base: ComponentBase,
    fixed: Cell<bool>,
    satellite_count: Cell<u32>,
    location: Cell<Option<GpsLocation>>,
}

impl fmt::Debug for GpsCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpsCore")
            .field("base", &self.base)
            .field("fixed", &self.fixed.get())
            .field("satellite_count", &self.satellite_count.get())
            .finish()
    }
}

impl GpsCore {
    pub fn new(store: &ComponentStore) -> Rc<Self> {
        Rc::new(GpsCore {
            base: ComponentBase::new(ComponentKind::Gps, store),
            fixed: Cell::new(false),
            satellite_count: Cell::new(0),
            location: Cell::new(None),
        })
    }

    pub fn base(&self) -> &ComponentBase {
        &self.base
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed.get()
    }

    pub fn satellite_count(&self) -> u32 {
        self.satellite_count.get()
    }

    pub fn last_known_location(&self) -> Option<GpsLocation> {
        self.location.get()
    }

    pub fn snapshot(&self) -> GpsSnapshot {
        GpsSnapshot {
            fixed: self.is_fixed(),
            satellite_count: self.satellite_count(),
            location: self.last_known_location(),
        }
    }

    // =========================================================================
    // Backend Updates
    // =========================================================================

    pub fn update_fixed(&self, fixed: bool) -> &Self {
        if self.fixed.replace(fixed) != fixed {
            self.base.mark_changed();
        }
        self
    }

    pub fn update_satellite_count(&self, count: u32) -> &Self {
        if self.satellite_count.replace(count) != count {
            self.base.mark_changed();
        }
        self
    }

    /// Stores a new location stamped with the current time. A position
    /// identical to the last one keeps the old timestamp.
    pub fn update_location(&self, latitude: f64, longitude: f64, altitude: Option<f64>) -> &Self {
        let same = self.location.get().is_some_and(|last| {
            last.latitude.same_as(&latitude)
                && last.longitude.same_as(&longitude)
                && last.altitude.same_as(&altitude)
        });
        if !same {
            self.location.set(Some(GpsLocation {
                latitude,
                longitude,
                altitude,
                timestamp: Utc::now(),
            }));
            self.base.mark_changed();
        }
        self
    }

    pub fn publish(self: &Rc<Self>) {
        self.base.publish(Component::Gps(Rc::clone(self)));
    }

    pub fn unpublish(&self) {
        self.base.unpublish();
    }

    pub fn notify_updated(&self) -> bool {
        self.base.notify_updated()
    }
}
