//! # One-Shot Timers
//!
//! [`Scheduler`] is the seam between code that needs delayed callbacks
//! (rollback timers) and the thing that fires them.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Scheduler Implementations                      │
//! │                                                                         │
//! │  MainContext        tokio sleep on the main LocalSet (production)       │
//! │  ManualScheduler    virtual clock advanced by the test (feature         │
//! │                     "testing")                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A [`TimerHandle`] fires at most once. Canceling it is synchronous: once
//! `cancel` returns, the callback will not run.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::error::ExecutorResult;

/// Callback fired by a scheduler on the main context.
pub type TimerCallback = Box<dyn FnOnce()>;

/// Something that can arm one-shot timers on the main context.
pub trait Scheduler {
    /// Arms a timer that runs `callback` after `delay`.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> ExecutorResult<TimerHandle>;

    /// Disarms a timer. Returns false if it already fired or was canceled.
    fn unschedule(&self, timer: &TimerHandle) -> bool {
        timer.cancel()
    }
}

// =============================================================================
// Timer Handle
// =============================================================================

struct TimerState {
    armed: Cell<bool>,
    abort: RefCell<Option<AbortHandle>>,
}

/// Handle to an armed (or spent) one-shot timer.
#[derive(Clone)]
pub struct TimerHandle {
    state: Rc<TimerState>,
}

impl TimerHandle {
    pub(crate) fn armed() -> Self {
        TimerHandle {
            state: Rc::new(TimerState {
                armed: Cell::new(true),
                abort: RefCell::new(None),
            }),
        }
    }

    /// A handle that is not armed. Handy as the initial value for
    /// [`crate::MainContext::reschedule`].
    pub fn idle() -> Self {
        TimerHandle {
            state: Rc::new(TimerState {
                armed: Cell::new(false),
                abort: RefCell::new(None),
            }),
        }
    }

    /// True while the timer is armed and has not fired.
    pub fn is_pending(&self) -> bool {
        self.state.armed.get()
    }

    /// Disarms the timer. Returns false if it already fired or was canceled.
    pub fn cancel(&self) -> bool {
        if !self.state.armed.replace(false) {
            return false;
        }
        if let Some(abort) = self.state.abort.borrow_mut().take() {
            abort.abort();
        }
        true
    }

    /// Marks the timer as fired. Returns true if the callback should run.
    pub(crate) fn fire(&self) -> bool {
        self.state.abort.borrow_mut().take();
        self.state.armed.replace(false)
    }

    pub(crate) fn set_abort(&self, handle: AbortHandle) {
        *self.state.abort.borrow_mut() = Some(handle);
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::idle()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("pending", &self.is_pending())
            .finish()
    }
}

// =============================================================================
// Manual Scheduler (tests)
// =============================================================================

#[cfg(any(test, feature = "testing"))]
pub use manual::ManualScheduler;

#[cfg(any(test, feature = "testing"))]
mod manual {
    use super::*;

    struct Entry {
        due: Duration,
        seq: u64,
        timer: TimerHandle,
        callback: TimerCallback,
    }

    #[derive(Default)]
    struct ManualState {
        now: Duration,
        seq: u64,
        entries: Vec<Entry>,
    }

    /// Deterministic scheduler driven by a virtual clock.
    ///
    /// Nothing fires until the test calls [`ManualScheduler::advance`].
    /// Timers due at the same instant fire in scheduling order.
    #[derive(Clone, Default)]
    pub struct ManualScheduler {
        state: Rc<RefCell<ManualState>>,
    }

    impl ManualScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Current virtual time.
        pub fn now(&self) -> Duration {
            self.state.borrow().now
        }

        /// Number of timers still armed.
        pub fn pending(&self) -> usize {
            self.state
                .borrow()
                .entries
                .iter()
                .filter(|entry| entry.timer.is_pending())
                .count()
        }

        /// Moves the clock forward, firing every timer that falls due.
        /// Returns how many callbacks ran.
        pub fn advance(&self, by: Duration) -> usize {
            let target = self.state.borrow().now + by;
            let mut fired = 0;
            while let Some(entry) = self.next_due(target) {
                self.state.borrow_mut().now = entry.due;
                if entry.timer.fire() {
                    (entry.callback)();
                    fired += 1;
                }
            }
            self.state.borrow_mut().now = target;
            fired
        }

        /// Fires every armed timer regardless of its deadline.
        pub fn fire_all(&self) -> usize {
            let mut fired = 0;
            while let Some(entry) = self.next_due(Duration::MAX) {
                if entry.timer.fire() {
                    (entry.callback)();
                    fired += 1;
                }
            }
            fired
        }

        fn next_due(&self, limit: Duration) -> Option<Entry> {
            let mut state = self.state.borrow_mut();
            state.entries.retain(|entry| entry.timer.is_pending());
            let index = state
                .entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.due <= limit)
                .min_by_key(|(_, entry)| (entry.due, entry.seq))
                .map(|(index, _)| index)?;
            Some(state.entries.remove(index))
        }
    }

    impl Scheduler for ManualScheduler {
        fn schedule(&self, delay: Duration, callback: TimerCallback) -> ExecutorResult<TimerHandle> {
            let timer = TimerHandle::armed();
            let mut state = self.state.borrow_mut();
            let due = state.now + delay;
            state.seq += 1;
            let seq = state.seq;
            state.entries.push(Entry {
                due,
                seq,
                timer: timer.clone(),
                callback,
            });
            Ok(timer)
        }
    }
}
