//! # Tasks
//!
//! A [`Task`] is the main-context view of a unit of background work.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Task<T> States                               │
//! │                                                                         │
//! │              ┌──────────────────────────────────┐                       │
//! │              │             Pending              │                       │
//! │              │  listeners queued, worker busy   │                       │
//! │              └──┬──────────────┬─────────────┬──┘                       │
//! │       job Ok(v) │   job Err(e) │   cancel()  │ dispose()                │
//! │                 ▼              ▼             ▼                          │
//! │        ┌────────────┐ ┌────────────┐ ┌─────────────┐                    │
//! │        │ Success(v) │ │ Failure(e) │ │  Canceled   │   (immutable)      │
//! │        └────────────┘ └────────────┘ └─────────────┘                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A task settles exactly once. Listeners registered while pending run on
//! the main context when it settles; listeners registered afterwards run
//! synchronously inside `when_complete`.
//!
//! `Task` is `!Send`: it can only be observed and canceled from the main
//! context that created it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::AbortHandle;
use tracing::debug;

use crate::error::TaskError;

// =============================================================================
// Outcome
// =============================================================================

/// Final state of a task.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    /// The job returned a value.
    Success(T),
    /// The job failed or panicked.
    Failure(TaskError),
    /// The task was canceled, or the executor was disposed first.
    Canceled,
}

impl<T> TaskOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskOutcome::Canceled)
    }

    /// Returns the value of a successful task.
    pub fn value(&self) -> Option<&T> {
        match self {
            TaskOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the error of a failed task.
    pub fn error(&self) -> Option<&TaskError> {
        match self {
            TaskOutcome::Failure(err) => Some(err),
            _ => None,
        }
    }
}

// =============================================================================
// Cancel Token
// =============================================================================

/// Cancellation flag shared between a task and its background job.
///
/// Jobs that want to stop early poll [`CancelToken::is_canceled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }
}

// =============================================================================
// Task
// =============================================================================

type Listener<T> = Box<dyn FnOnce(&TaskOutcome<T>)>;

enum TaskState<T> {
    Pending {
        listeners: Vec<Listener<T>>,
        abort: Option<AbortHandle>,
    },
    Complete(Rc<TaskOutcome<T>>),
}

pub(crate) struct TaskInner<T> {
    name: String,
    token: CancelToken,
    state: RefCell<TaskState<T>>,
}

/// Handle to a unit of work whose result is delivered on the main context.
pub struct Task<T> {
    inner: Rc<TaskInner<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Task {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl<T: 'static> Task<T> {
    /// Creates a pending task. Settled later through [`Task::settle`].
    pub(crate) fn pending(name: impl Into<String>, token: CancelToken) -> Self {
        Task {
            inner: Rc::new(TaskInner {
                name: name.into(),
                token,
                state: RefCell::new(TaskState::Pending {
                    listeners: Vec::new(),
                    abort: None,
                }),
            }),
        }
    }

    fn settled(name: &str, outcome: TaskOutcome<T>) -> Self {
        Task {
            inner: Rc::new(TaskInner {
                name: name.to_string(),
                token: CancelToken::new(),
                state: RefCell::new(TaskState::Complete(Rc::new(outcome))),
            }),
        }
    }

    /// An already successful task.
    pub fn success(value: T) -> Self {
        Self::settled("success", TaskOutcome::Success(value))
    }

    /// An already failed task.
    pub fn failure(err: TaskError) -> Self {
        Self::settled("failure", TaskOutcome::Failure(err))
    }

    /// An already canceled task.
    pub fn canceled() -> Self {
        Self::settled("canceled", TaskOutcome::Canceled)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_complete(&self) -> bool {
        matches!(*self.inner.state.borrow(), TaskState::Complete(_))
    }

    pub fn is_canceled(&self) -> bool {
        self.outcome().is_some_and(|outcome| outcome.is_canceled())
    }

    /// The final outcome, once the task has settled.
    pub fn outcome(&self) -> Option<Rc<TaskOutcome<T>>> {
        match &*self.inner.state.borrow() {
            TaskState::Complete(outcome) => Some(Rc::clone(outcome)),
            TaskState::Pending { .. } => None,
        }
    }

    /// Registers a completion listener.
    ///
    /// Runs immediately, before this call returns, if the task has
    /// already settled.
    pub fn when_complete(&self, listener: impl FnOnce(&TaskOutcome<T>) + 'static) {
        let settled = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                TaskState::Pending { listeners, .. } => {
                    listeners.push(Box::new(listener));
                    return;
                }
                TaskState::Complete(outcome) => Rc::clone(outcome),
            }
        };
        listener(&settled);
    }

    /// Cancels the task.
    ///
    /// Returns false if the task had already settled (including a previous
    /// cancel). A job that already started keeps running on its worker but
    /// its result is discarded; it can poll its [`CancelToken`] to stop.
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    pub(crate) fn set_abort(&self, handle: AbortHandle) {
        if let TaskState::Pending { abort, .. } = &mut *self.inner.state.borrow_mut() {
            *abort = Some(handle);
        }
    }

    /// Settles the task and runs its listeners. No-op if already settled.
    pub(crate) fn settle(&self, outcome: TaskOutcome<T>) -> bool {
        self.inner.settle(outcome)
    }

    pub(crate) fn control(&self) -> Rc<dyn TaskControl> {
        Rc::clone(&self.inner) as Rc<dyn TaskControl>
    }
}

impl<T: 'static> TaskInner<T> {
    fn settle(&self, outcome: TaskOutcome<T>) -> bool {
        let outcome = Rc::new(outcome);
        let listeners = {
            let mut state = self.state.borrow_mut();
            let previous = std::mem::replace(&mut *state, TaskState::Complete(Rc::clone(&outcome)));
            match previous {
                TaskState::Pending { listeners, .. } => listeners,
                done @ TaskState::Complete(_) => {
                    *state = done;
                    return false;
                }
            }
        };

        debug!(
            task = %self.name,
            canceled = outcome.is_canceled(),
            listeners = listeners.len(),
            "Task complete"
        );
        for listener in listeners {
            listener(&outcome);
        }
        true
    }

    fn cancel(&self) -> bool {
        let abort = match &mut *self.state.borrow_mut() {
            TaskState::Complete(_) => return false,
            TaskState::Pending { abort, .. } => abort.take(),
        };
        self.token.cancel();
        if let Some(abort) = abort {
            abort.abort();
        }
        self.settle(TaskOutcome::Canceled)
    }
}

// =============================================================================
// Type-Erased Control
// =============================================================================

/// Operations on a task that do not depend on its value type.
///
/// Used by [`crate::TaskGroup`] and by the main loop to cancel everything
/// still pending at dispose time.
pub(crate) trait TaskControl {
    fn cancel(&self) -> bool;
    fn is_complete(&self) -> bool;
    fn name(&self) -> &str;
}

impl<T: 'static> TaskControl for TaskInner<T> {
    fn cancel(&self) -> bool {
        TaskInner::cancel(self)
    }

    fn is_complete(&self) -> bool {
        matches!(*self.state.borrow(), TaskState::Complete(_))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
