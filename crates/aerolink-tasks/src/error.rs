//! # Executor Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Executor Error Categories                          │
//! │                                                                         │
//! │  ┌──────────────────────────┐  ┌──────────────────────────────────────┐ │
//! │  │  ExecutorError           │  │  TaskError                           │ │
//! │  │  (caller did something   │  │  (background job went wrong,         │ │
//! │  │   illegal)               │  │   delivered through the Task)        │ │
//! │  │                          │  │                                      │ │
//! │  │  NotOnMainThread         │  │  Failed(BoxError)                    │ │
//! │  │  AlreadyOnMainThread     │  │  Panicked(message)                   │ │
//! │  │  Disposed                │  │                                      │ │
//! │  │  StartFailed             │  │                                      │ │
//! │  └──────────────────────────┘  └──────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `ExecutorError` is returned synchronously to the caller. `TaskError` is
//! never returned from an executor call: it only ever shows up inside a
//! completed [`crate::TaskOutcome`].

use thiserror::Error;

/// Boxed error produced by a background job.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for executor operations.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors raised by the executor when its threading contract is violated
/// or when it is used after teardown.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    // =========================================================================
    // Contract Violations
    // =========================================================================
    /// A main-only operation was called from another thread.
    #[error("operation must be called from the main context")]
    NotOnMainThread,

    /// `post_on_main` was called from the main context itself.
    #[error("already on the main context, call directly instead of posting")]
    AlreadyOnMainThread,

    // =========================================================================
    // Lifecycle
    // =========================================================================
    /// The executor has been disposed.
    #[error("executor has been disposed")]
    Disposed,

    /// The main loop or worker pool could not be started.
    #[error("failed to start executor: {0}")]
    StartFailed(String),
}

impl ExecutorError {
    /// Returns true if this error signals a violated threading contract.
    ///
    /// These are programming errors. Callers are expected to surface them
    /// loudly rather than retry.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ExecutorError::NotOnMainThread | ExecutorError::AlreadyOnMainThread
        )
    }
}

/// Failure of a background job, delivered through its task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The job returned an error.
    #[error("background job failed: {0}")]
    Failed(#[source] BoxError),

    /// The job panicked on its worker thread.
    #[error("background job panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Builds a `Failed` error from anything convertible into a boxed error.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        TaskError::Failed(err.into())
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
