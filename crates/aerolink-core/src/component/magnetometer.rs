//! # Magnetometer
//!
//! `MagnetometerCore` reports the calibration state only.
//! `Magnetometer3StepCore` refines it with a guided calibration process
//! (one axis at a time) and is published under both kinds.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Component, ComponentBase, ComponentKind};
use crate::store::ComponentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationState {
    Calibrated,
    #[default]
    Required,
    Recommended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Roll,
    Pitch,
    Yaw,
}

/// Common view over every magnetometer kind.
pub trait Magnetometer {
    fn base(&self) -> &ComponentBase;

    fn calibration_state(&self) -> CalibrationState;
}

#[derive(Debug, Clone, Serialize)]
pub struct MagnetometerSnapshot {
    pub calibration_state: CalibrationState,
}

// =============================================================================
// Plain Magnetometer
// =============================================================================

#[derive(Debug)]
pub struct MagnetometerCore {
    base: ComponentBase,
    calibration_state: Cell<CalibrationState>,
}

impl MagnetometerCore {
    pub fn new(store: &ComponentStore) -> Rc<Self> {
        Rc::new(MagnetometerCore {
            base: ComponentBase::new(ComponentKind::Magnetometer, store),
            calibration_state: Cell::new(CalibrationState::default()),
        })
    }

    pub fn base(&self) -> &ComponentBase {
        &self.base
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration_state.get()
    }

    pub fn update_calibration_state(&self, state: CalibrationState) -> &Self {
        if self.calibration_state.replace(state) != state {
            self.base.mark_changed();
        }
        self
    }

    pub fn snapshot(&self) -> MagnetometerSnapshot {
        MagnetometerSnapshot {
            calibration_state: self.calibration_state(),
        }
    }

    pub fn publish(self: &Rc<Self>) {
        self.base.publish(Component::Magnetometer(Rc::clone(self)));
    }

    pub fn unpublish(&self) {
        self.base.unpublish();
    }

    pub fn notify_updated(&self) -> bool {
        self.base.notify_updated()
    }
}

impl Magnetometer for MagnetometerCore {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn calibration_state(&self) -> CalibrationState {
        self.calibration_state.get()
    }
}

// =============================================================================
// 3-Step Calibration
// =============================================================================

/// Device commands of the 3-step calibration.
pub trait Magnetometer3StepBackend {
    fn start_calibration_process(&self);

    fn cancel_calibration_process(&self);
}

/// Progress of a running calibration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CalibrationProcess {
    pub current_axis: Option<Axis>,
    pub calibrated_axes: BTreeSet<Axis>,
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Magnetometer3StepSnapshot {
    pub calibration_state: CalibrationState,
    pub calibration_process: Option<CalibrationProcess>,
}

pub struct Magnetometer3StepCore {
    base: ComponentBase,
    calibration_state: Cell<CalibrationState>,
    process: RefCell<Option<CalibrationProcess>>,
    backend: Rc<dyn Magnetometer3StepBackend>,
}

impl fmt::Debug for Magnetometer3StepCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Magnetometer3StepCore")
            .field("base", &self.base)
            .field("calibration_state", &self.calibration_state.get())
            .field("process", &*self.process.borrow())
            .finish()
    }
}

impl Magnetometer3StepCore {
    pub fn new(store: &ComponentStore, backend: Rc<dyn Magnetometer3StepBackend>) -> Rc<Self> {
        Rc::new(Magnetometer3StepCore {
            base: ComponentBase::new(ComponentKind::Magnetometer3Step, store),
            calibration_state: Cell::new(CalibrationState::default()),
            process: RefCell::new(None),
            backend,
        })
    }

    pub fn base(&self) -> &ComponentBase {
        &self.base
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration_state.get()
    }

    /// Current calibration progress, `None` when no process runs.
    pub fn calibration_process(&self) -> Option<CalibrationProcess> {
        self.process.borrow().clone()
    }

    pub fn snapshot(&self) -> Magnetometer3StepSnapshot {
        Magnetometer3StepSnapshot {
            calibration_state: self.calibration_state(),
            calibration_process: self.calibration_process(),
        }
    }

    // =========================================================================
    // User Commands
    // =========================================================================

    /// Starts a calibration process. Does nothing if one is running.
    pub fn start_calibration_process(&self) {
        if self.process.borrow().is_some() {
            return;
        }
        *self.process.borrow_mut() = Some(CalibrationProcess::default());
        debug!(kind = %self.base.kind(), "Calibration process started");
        self.backend.start_calibration_process();
        self.base.mark_changed();
        self.base.notify_updated();
    }

    /// Cancels the running calibration process, if any.
    pub fn cancel_calibration_process(&self) {
        if self.process.borrow().is_none() {
            return;
        }
        self.backend.cancel_calibration_process();
        *self.process.borrow_mut() = None;
        debug!(kind = %self.base.kind(), "Calibration process canceled");
        self.base.mark_changed();
        self.base.notify_updated();
    }

    // =========================================================================
    // Backend Updates
    // =========================================================================

    pub fn update_calibration_state(&self, state: CalibrationState) -> &Self {
        if self.calibration_state.replace(state) != state {
            self.base.mark_changed();
        }
        self
    }

    pub fn update_current_axis(&self, axis: Option<Axis>) -> &Self {
        self.update_process(|process| {
            if process.current_axis == axis {
                return false;
            }
            process.current_axis = axis;
            true
        })
    }

    pub fn update_calibrated_axes(&self, axes: impl IntoIterator<Item = Axis>) -> &Self {
        let axes: BTreeSet<Axis> = axes.into_iter().collect();
        self.update_process(move |process| {
            if process.calibrated_axes == axes {
                return false;
            }
            process.calibrated_axes = axes;
            true
        })
    }

    pub fn update_failed(&self, failed: bool) -> &Self {
        self.update_process(|process| {
            if process.failed == failed {
                return false;
            }
            process.failed = failed;
            true
        })
    }

    /// The device ended the process on its own.
    pub fn calibration_process_stopped(&self) -> &Self {
        if self.process.borrow_mut().take().is_some() {
            self.base.mark_changed();
        }
        self
    }

    pub fn publish(self: &Rc<Self>) {
        self.base.publish(Component::Magnetometer3Step(Rc::clone(self)));
    }

    pub fn unpublish(&self) {
        self.base.unpublish();
    }

    pub fn notify_updated(&self) -> bool {
        self.base.notify_updated()
    }

    /// Applies `update` to the running process; ignored when none runs.
    fn update_process(&self, update: impl FnOnce(&mut CalibrationProcess) -> bool) -> &Self {
        let changed = self.process.borrow_mut().as_mut().is_some_and(update);
        if changed {
            self.base.mark_changed();
        }
        self
    }
}

impl Magnetometer for Magnetometer3StepCore {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn calibration_state(&self) -> CalibrationState {
        self.calibration_state.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::testing::CountingMagnetometerBackend;
    use crate::store::ComponentStore;

    fn published(store: &ComponentStore) -> (Rc<Magnetometer3StepCore>, Rc<CountingMagnetometerBackend>, Rc<Cell<u32>>) {
        let backend = Rc::new(CountingMagnetometerBackend::default());
        let core = Magnetometer3StepCore::new(store, backend.clone());
        let count = Rc::new(Cell::new(0));
        let hits = Rc::clone(&count);
        store.register_observer(ComponentKind::Magnetometer, move || hits.set(hits.get() + 1));
        core.publish();
        (core, backend, count)
    }

    #[test]
    fn test_start_and_cancel_notify_immediately() {
        let store = ComponentStore::new();
        let (core, backend, count) = published(&store);
        assert_eq!(count.get(), 1);

        core.start_calibration_process();
        core.start_calibration_process();
        assert_eq!(backend.started.get(), 1);
        assert_eq!(count.get(), 2);
        assert_eq!(core.calibration_process(), Some(CalibrationProcess::default()));

        core.cancel_calibration_process();
        core.cancel_calibration_process();
        assert_eq!(backend.canceled.get(), 1);
        assert_eq!(count.get(), 3);
        assert!(core.calibration_process().is_none());
    }

    #[test]
    fn test_progress_updates_are_batched() {
        let store = ComponentStore::new();
        let (core, _backend, count) = published(&store);
        core.start_calibration_process();
        let before = count.get();

        core.update_current_axis(Some(Axis::Roll))
            .update_calibrated_axes([Axis::Roll])
            .update_failed(false);
        assert!(core.notify_updated());
        assert_eq!(count.get(), before + 1);

        let process = core.calibration_process().unwrap();
        assert_eq!(process.current_axis, Some(Axis::Roll));
        assert!(process.calibrated_axes.contains(&Axis::Roll));
        assert!(!process.failed);
    }

    #[test]
    fn test_progress_ignored_without_process() {
        let store = ComponentStore::new();
        let (core, _backend, _count) = published(&store);
        core.update_current_axis(Some(Axis::Yaw)).update_failed(true);
        assert!(!core.base().is_changed());

        core.start_calibration_process();
        core.calibration_process_stopped();
        assert!(core.base().is_changed());
        assert!(core.calibration_process().is_none());
    }

    #[test]
    fn test_calibration_state_through_trait() {
        let store = ComponentStore::new();
        let plain = MagnetometerCore::new(&store);
        plain.update_calibration_state(CalibrationState::Calibrated);
        let view: &dyn Magnetometer = &*plain;
        assert_eq!(view.calibration_state(), CalibrationState::Calibrated);
        assert!(view.base().is_changed());
    }
}
