//! # Setting Controller
//!
//! Per-setting rollback bookkeeping. A setting owns one controller; the
//! controller owns at most one armed timer and one rollback closure.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use aerolink_tasks::TimerHandle;
use tracing::{debug, warn};

use super::RollbackPolicy;

/// Receives every change of a setting. The flag is true for changes
/// originating from the user side (optimistic apply, timeout rollback) and
/// false for changes reported by the backend.
pub type ChangeListener = Rc<dyn Fn(bool)>;

struct PendingRollback {
    timer: TimerHandle,
    rollback: Box<dyn FnOnce()>,
}

struct ControllerInner {
    name: String,
    policy: RollbackPolicy,
    listener: ChangeListener,
    pending: RefCell<Option<PendingRollback>>,
}

/// Optimistic-update and timeout-rollback state machine of one setting.
#[derive(Clone)]
pub struct SettingController {
    inner: Rc<ControllerInner>,
}

impl fmt::Debug for SettingController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingController")
            .field("name", &self.inner.name)
            .field("updating", &self.has_pending_rollback())
            .finish()
    }
}

impl SettingController {
    pub fn new(name: impl Into<String>, policy: RollbackPolicy, listener: ChangeListener) -> Self {
        SettingController {
            inner: Rc::new(ControllerInner {
                name: name.into(),
                policy,
                listener,
                pending: RefCell::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True while a rollback timer is armed (the setting is "updating").
    pub fn has_pending_rollback(&self) -> bool {
        self.inner.pending.borrow().is_some()
    }

    /// Arms the rollback timer after an optimistic change and reports the
    /// change as user-originated.
    ///
    /// If a rollback is already pending, its timer is canceled first and
    /// its closure is kept instead of `rollback`: a timeout must restore
    /// the value from before the first of the superseding changes.
    pub fn post_rollback(&self, rollback: impl FnOnce() + 'static) {
        let superseded = self.inner.pending.borrow_mut().take();
        let rollback: Box<dyn FnOnce()> = match superseded {
            Some(previous) => {
                previous.timer.cancel();
                debug!(setting = %self.inner.name, "Rollback superseded");
                previous.rollback
            }
            None => Box::new(rollback),
        };

        let weak: Weak<ControllerInner> = Rc::downgrade(&self.inner);
        let timeout = self.inner.policy.timeout();
        let armed = self.inner.policy.scheduler().schedule(
            timeout,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_timeout();
                }
            }),
        );

        match armed {
            Ok(timer) => {
                debug!(setting = %self.inner.name, timeout_ms = timeout.as_millis() as u64, "Rollback armed");
                *self.inner.pending.borrow_mut() = Some(PendingRollback { timer, rollback });
            }
            Err(err) => {
                warn!(setting = %self.inner.name, error = %err, "Could not arm rollback timer, keeping value");
            }
        }

        self.notify_change(true);
    }

    /// Disarms a pending rollback without restoring the old value.
    ///
    /// Returns true if a rollback was pending.
    pub fn cancel_rollback(&self) -> bool {
        let pending = self.inner.pending.borrow_mut().take();
        match pending {
            Some(pending) => {
                pending.timer.cancel();
                debug!(setting = %self.inner.name, "Rollback canceled");
                true
            }
            None => false,
        }
    }

    /// Forwards a change to the owning component.
    pub fn notify_change(&self, from_user: bool) {
        (self.inner.listener)(from_user);
    }
}

impl ControllerInner {
    fn on_timeout(&self) {
        let pending = self.pending.borrow_mut().take();
        if let Some(pending) = pending {
            debug!(setting = %self.name, "Rollback timed out, restoring previous value");
            (pending.rollback)();
            (self.listener)(true);
        }
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.timer.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerolink_tasks::ManualScheduler;
    use std::cell::Cell;
    use std::time::Duration;

    struct Fixture {
        scheduler: ManualScheduler,
        controller: SettingController,
        changes: Rc<RefCell<Vec<bool>>>,
    }

    fn fixture() -> Fixture {
        let scheduler = ManualScheduler::new();
        let changes = Rc::new(RefCell::new(Vec::new()));
        let writer = Rc::clone(&changes);
        let policy = RollbackPolicy::new(Rc::new(scheduler.clone()), Duration::from_secs(5));
        let controller = SettingController::new(
            "test",
            policy,
            Rc::new(move |from_user| writer.borrow_mut().push(from_user)),
        );
        Fixture {
            scheduler,
            controller,
            changes,
        }
    }

    #[test]
    fn test_post_rollback_arms_timer_and_notifies() {
        let f = fixture();
        f.controller.post_rollback(|| {});
        assert!(f.controller.has_pending_rollback());
        assert_eq!(f.scheduler.pending(), 1);
        assert_eq!(*f.changes.borrow(), vec![true]);
    }

    #[test]
    fn test_timeout_runs_rollback_once() {
        let f = fixture();
        let rolled_back = Rc::new(Cell::new(0));
        let counter = Rc::clone(&rolled_back);
        f.controller.post_rollback(move || counter.set(counter.get() + 1));

        assert_eq!(f.scheduler.advance(Duration::from_millis(4999)), 0);
        assert_eq!(f.scheduler.advance(Duration::from_millis(1)), 1);
        assert_eq!(rolled_back.get(), 1);
        assert!(!f.controller.has_pending_rollback());
        assert_eq!(*f.changes.borrow(), vec![true, true]);
    }

    #[test]
    fn test_cancel_rollback_disarms() {
        let f = fixture();
        let rolled_back = Rc::new(Cell::new(false));
        let flag = Rc::clone(&rolled_back);
        f.controller.post_rollback(move || flag.set(true));

        assert!(f.controller.cancel_rollback());
        assert!(!f.controller.cancel_rollback());
        assert_eq!(f.scheduler.fire_all(), 0);
        assert!(!rolled_back.get());
        assert_eq!(*f.changes.borrow(), vec![true]);
    }

    #[test]
    fn test_superseding_keeps_single_timer_and_first_rollback() {
        let f = fixture();
        let restored = Rc::new(Cell::new(""));
        let first = Rc::clone(&restored);
        let second = Rc::clone(&restored);
        f.controller.post_rollback(move || first.set("first"));
        f.scheduler.advance(Duration::from_secs(3));
        f.controller.post_rollback(move || second.set("second"));

        assert_eq!(f.scheduler.pending(), 1);
        // the first deadline no longer applies
        assert_eq!(f.scheduler.advance(Duration::from_secs(3)), 0);
        assert_eq!(f.scheduler.advance(Duration::from_secs(2)), 1);
        assert_eq!(restored.get(), "first");
    }

    #[test]
    fn test_dropping_controller_disarms_timer() {
        let f = fixture();
        f.controller.post_rollback(|| {});
        let Fixture {
            scheduler,
            controller,
            changes,
        } = f;
        drop(controller);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(*changes.borrow(), vec![true]);
    }
}
