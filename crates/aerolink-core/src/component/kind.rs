//! # Component Kinds
//!
//! The closed set of component descriptors and their static parent table.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Descriptor Forest                              │
//! │                                                                         │
//! │   Instrument                     Peripheral                             │
//! │   ──────────                     ──────────                             │
//! │   Gps                            Geofence                               │
//! │                                  Magnetometer                           │
//! │                                     └── Magnetometer3Step               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An observer registered on `Magnetometer` sees a published
//! `Magnetometer3Step` instance, because the sub-kind's ancestry includes
//! its parent.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Gps,
    Geofence,
    Magnetometer,
    Magnetometer3Step,
}

/// Broad grouping of component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentFamily {
    /// Read-only telemetry.
    Instrument,
    /// Feature with its own settings and commands.
    Peripheral,
}

/// Static sub-kind -> super-kind table.
const PARENTS: &[(ComponentKind, ComponentKind)] = &[(
    ComponentKind::Magnetometer3Step,
    ComponentKind::Magnetometer,
)];

impl ComponentKind {
    pub const ALL: [ComponentKind; 4] = [
        ComponentKind::Gps,
        ComponentKind::Geofence,
        ComponentKind::Magnetometer,
        ComponentKind::Magnetometer3Step,
    ];

    /// The kind this one refines, if any.
    pub fn parent(self) -> Option<ComponentKind> {
        PARENTS
            .iter()
            .find(|(child, _)| *child == self)
            .map(|(_, parent)| *parent)
    }

    /// This kind followed by each ancestor up to the root.
    pub fn ancestry(self) -> Ancestry {
        Ancestry { next: Some(self) }
    }

    /// True if `self` is `other` or refines it.
    pub fn is_a(self, other: ComponentKind) -> bool {
        self.ancestry().any(|kind| kind == other)
    }

    pub fn family(self) -> ComponentFamily {
        match self {
            ComponentKind::Gps => ComponentFamily::Instrument,
            ComponentKind::Geofence
            | ComponentKind::Magnetometer
            | ComponentKind::Magnetometer3Step => ComponentFamily::Peripheral,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ComponentKind::Gps => "gps",
            ComponentKind::Geofence => "geofence",
            ComponentKind::Magnetometer => "magnetometer",
            ComponentKind::Magnetometer3Step => "magnetometer_3step",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Iterator over a kind and its ancestors, most specific first.
#[derive(Debug, Clone)]
pub struct Ancestry {
    next: Option<ComponentKind>,
}

impl Iterator for Ancestry {
    type Item = ComponentKind;

    fn next(&mut self) -> Option<ComponentKind> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestry_most_specific_first() {
        let chain: Vec<_> = ComponentKind::Magnetometer3Step.ancestry().collect();
        assert_eq!(
            chain,
            vec![ComponentKind::Magnetometer3Step, ComponentKind::Magnetometer]
        );
        assert_eq!(ComponentKind::Gps.ancestry().count(), 1);
    }

    #[test]
    fn test_parent_table_is_acyclic() {
        for kind in ComponentKind::ALL {
            assert!(kind.ancestry().take(ComponentKind::ALL.len() + 1).count() <= ComponentKind::ALL.len());
        }
    }

    #[test]
    fn test_is_a() {
        assert!(ComponentKind::Magnetometer3Step.is_a(ComponentKind::Magnetometer));
        assert!(ComponentKind::Magnetometer.is_a(ComponentKind::Magnetometer));
        assert!(!ComponentKind::Magnetometer.is_a(ComponentKind::Magnetometer3Step));
        assert!(!ComponentKind::Gps.is_a(ComponentKind::Geofence));
    }

    #[test]
    fn test_display_and_family() {
        assert_eq!(ComponentKind::Magnetometer3Step.to_string(), "magnetometer_3step");
        assert_eq!(ComponentKind::Gps.family(), ComponentFamily::Instrument);
        assert_eq!(ComponentKind::Geofence.family(), ComponentFamily::Peripheral);
    }
}
